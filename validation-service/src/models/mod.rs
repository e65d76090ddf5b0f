pub mod credential;
pub mod hook;
pub mod push;
pub mod repository;
pub mod result;
pub mod validator;

pub use credential::{AccessCredential, Session};
pub use hook::{HookRegistration, HookState, RepositoryHooks};
pub use push::PushPayload;
pub use repository::{is_valid_revision, RepoPath};
pub use result::{Badge, Diagnostic, HistoryEntry, ResultRecord, Severity, StoredResult};
pub use validator::ValidatorKind;
