#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use service_core::utils::signature::generate_signature;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use secrecy::Secret;
use validation_service::config::{ServiceAccount, ValidationConfig};
use validation_service::models::{AccessCredential, Badge, RepoPath, StoredResult, ValidatorKind};
use validation_service::services::{FetchError, GinClient, RemoteHost, RepositoryFetcher};
use validation_service::{build_router, AppState};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const HOOK_SECRET: &str = "test-hook-secret";
pub const SERVICE_USER: &str = "gin-valid";

pub const BIDS_CLEAN: &str = r#"{"issues":{"errors":[],"warnings":[]},"summary":{}}"#;
pub const BIDS_WARNINGS: &str =
    r#"{"issues":{"errors":[],"warnings":[{"key":"README_FILE_MISSING","reason":"No README"}]},"summary":{}}"#;
pub const BIDS_ERRORS: &str =
    r#"{"issues":{"errors":[{"key":"NOT_INCLUDED","reason":"Not BIDS"}],"warnings":[]},"summary":{}}"#;

/// Stands in for git: lays down a tree with one file once its gate opens.
pub struct FakeFetcher {
    pub gate: Arc<Semaphore>,
    pub fail: bool,
}

#[async_trait]
impl RepositoryFetcher for FakeFetcher {
    async fn fetch(
        &self,
        repo: &RepoPath,
        _revision: &str,
        _credential: &AccessCredential,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = self.gate.acquire() => {
                permit.expect("gate closed").forget();
            }
        }

        if self.fail {
            return Err(FetchError::Command {
                step: "clone",
                message: "repository not found".to_string(),
            });
        }

        let tree = workdir.join(&repo.repo);
        tokio::fs::create_dir_all(&tree).await.unwrap();
        tokio::fs::write(tree.join("dataset_description.json"), b"{}")
            .await
            .unwrap();
        Ok(tree)
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub remote: MockServer,
    pub gate: Arc<Semaphore>,
    pub home: TempDir,
}

pub struct TestOptions {
    pub bids_report: String,
    pub gated: bool,
    pub fetch_fails: bool,
    pub queue_size: usize,
    pub service_account: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            bids_report: BIDS_CLEAN.to_string(),
            gated: false,
            fetch_fails: false,
            queue_size: 16,
            service_account: false,
        }
    }
}

/// Write an executable shell script that prints `stdout`.
pub fn fake_tool(dir: &Path, name: &str, stdout: &str) -> String {
    let path = dir.join(name);
    let script = format!("#!/bin/sh\ncat <<'REPORT'\n{}\nREPORT\n", stdout);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestOptions::default()).await
    }

    pub async fn spawn_with(options: TestOptions) -> Self {
        let home = tempfile::tempdir().unwrap();
        let bin = home.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        let remote = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/v1/repos/[^/]+/[^/]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "full_name": "alice/ds001",
                "private": false
            })))
            .mount(&remote)
            .await;

        let mut config = ValidationConfig::with_home(home.path(), HOOK_SECRET);
        config.common.port = 0;
        config.remote.web_url = remote.uri();
        config.settings.root_url = "http://validation.test".to_string();
        config.executables.bids = fake_tool(&bin, "bids-validator", &options.bids_report);
        config.worker.queue_size = options.queue_size;
        config.worker.command_timeout_secs = 10;
        if options.service_account {
            config.settings.service_account = Some(ServiceAccount {
                username: SERVICE_USER.to_string(),
                password: Secret::new("service-password".to_string()),
            });
        }

        let permits = if options.gated { 0 } else { Semaphore::MAX_PERMITS };
        let gate = Arc::new(Semaphore::new(permits));
        let fetcher = Arc::new(FakeFetcher {
            gate: gate.clone(),
            fail: options.fetch_fails,
        });
        let client: Arc<dyn RemoteHost> =
            Arc::new(GinClient::new(remote.uri(), config.settings.client_id.clone()));

        let state = AppState::build(config, client, fetcher)
            .await
            .expect("Failed to build test state");
        let router = build_router(state.clone());

        TestApp {
            state,
            router,
            remote,
            gate,
            home,
        }
    }

    pub fn results_root(&self) -> PathBuf {
        self.home.path().join("results")
    }

    /// Store a credential for `owner` and bind `owner/repo` to it.
    pub async fn bind_repository(&self, owner: &str, repo: &str) {
        let credential = AccessCredential::new(owner, "test-token");
        self.state
            .credentials
            .save_credential(&credential)
            .await
            .unwrap();
        self.state
            .credentials
            .link_repository(owner, &RepoPath::new(owner, repo).unwrap())
            .await
            .unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, header::HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, header::HeaderMap, Bytes) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn push(&self, uri: &str, body: &str, signature: Option<&str>) -> (StatusCode, Bytes) {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            request = request.header("X-Gogs-Signature", signature);
        }
        let (status, _, body) = self
            .send(request.body(Body::from(body.to_string())).unwrap())
            .await;
        (status, body)
    }

    /// Push `body` signed with the shared secret.
    pub async fn signed_push(&self, uri: &str, body: &str) -> (StatusCode, Bytes) {
        let signature = generate_signature(HOOK_SECRET.as_bytes(), body.as_bytes()).unwrap();
        self.push(uri, body, Some(&signature)).await
    }

    pub async fn read_result(
        &self,
        validator: ValidatorKind,
        owner: &str,
        repo: &str,
        revision: &str,
    ) -> Option<StoredResult> {
        self.state
            .results
            .read(validator, &RepoPath::new(owner, repo).unwrap(), Some(revision))
            .await
            .unwrap()
    }

    /// Poll until the revision's result carries a terminal badge.
    pub async fn wait_for_terminal(
        &self,
        validator: ValidatorKind,
        owner: &str,
        repo: &str,
        revision: &str,
    ) -> StoredResult {
        for _ in 0..200 {
            if let Some(result) = self.read_result(validator, owner, repo, revision).await {
                if result.record.badge.is_terminal() {
                    return result;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("validation of {owner}/{repo}@{revision} did not finish");
    }

    /// Poll until the `latest` link of a repository points at `revision`.
    pub async fn wait_for_latest(&self, validator: ValidatorKind, owner: &str, repo: &str, revision: &str) {
        let link = self
            .results_root()
            .join(validator.as_str())
            .join(owner)
            .join(repo)
            .join("latest");
        for _ in 0..200 {
            if let Ok(target) = std::fs::read_link(&link) {
                if target.to_string_lossy() == revision {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("latest for {owner}/{repo} never pointed at {revision}");
    }
}

pub fn push_body(revision: &str) -> String {
    serde_json::json!({
        "ref": "refs/heads/master",
        "before": "0000000000000000000000000000000000000000",
        "after": revision,
        "commits": []
    })
    .to_string()
}

pub fn is_terminal(badge: Badge) -> bool {
    badge.is_terminal()
}
