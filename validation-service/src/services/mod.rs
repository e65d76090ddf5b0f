pub mod authenticator;
pub mod badges;
pub mod credential_store;
pub mod fetcher;
pub mod fs;
pub mod hooks;
pub mod metrics;
pub mod remote;
pub mod result_store;

pub use authenticator::{WebhookAuthenticator, SIGNATURE_HEADER};
pub use credential_store::{CredentialStore, FileCredentialStore, StoreError};
pub use fetcher::{FetchError, GitFetcher, RepositoryFetcher};
pub use hooks::HookManager;
pub use metrics::{get_metrics, init_metrics};
pub use remote::{GinClient, RemoteError, RemoteHost};
pub use result_store::{ResultStore, IN_PROGRESS_REPORT};
