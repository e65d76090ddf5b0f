use serde::Deserialize;

/// The subset of a push notification body the service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    pub after: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}
