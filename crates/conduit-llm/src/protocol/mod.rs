//! Wire format types for provider-specific API protocols
//!
//! Each module holds plain serde structs matching one provider family's JSON
//! format. They only exist at the boundary; the pipeline works on canonical
//! types. Pass-through providers speak the canonical format directly.

pub mod gemini;
pub mod openai;
