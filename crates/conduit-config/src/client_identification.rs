use serde::Deserialize;

/// How callers are identified for rate limiting
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientIdentificationConfig {
    /// Header whose value names the client
    pub header: String,
    /// Fall back to the first `x-forwarded-for` address
    pub trust_forwarded_for: bool,
}

impl Default for ClientIdentificationConfig {
    fn default() -> Self {
        Self {
            header: "x-api-key".to_owned(),
            trust_forwarded_for: true,
        }
    }
}
