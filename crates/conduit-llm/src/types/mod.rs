//! Canonical request, response and stream types
//!
//! The canonical format mirrors the Messages API that clients speak; every
//! provider codec translates to and from these types.

mod message;
mod request;
mod response;
mod stream;
mod tool;

pub use message::{Content, ContentBlock, ImageSource, Message, Role};
pub use request::CanonicalRequest;
pub use response::{CanonicalResponse, StopReason, Usage};
pub use stream::{BlockDelta, ErrorBody, MessageDeltaBody, StreamEvent};
pub use tool::{Tool, ToolChoice};
