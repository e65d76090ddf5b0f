use serde::{Deserialize, Serialize};

use super::repository::RepoPath;
use super::validator::ValidatorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookState {
    Enabled,
    Disabled,
    None,
}

/// A validator hook as mirrored from the remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRegistration {
    pub repository: RepoPath,
    pub validator: ValidatorKind,
    pub hook_id: Option<i64>,
    pub state: HookState,
}

/// One of the user's repositories with the state of each validator hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryHooks {
    pub repository: RepoPath,
    pub private: bool,
    pub hooks: Vec<HookRegistration>,
}
