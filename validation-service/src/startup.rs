//! Application wiring and server lifecycle.

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::ValidationConfig;
use crate::handlers;
use crate::services::{
    CredentialStore, FileCredentialStore, GinClient, GitFetcher, HookManager, RemoteHost,
    RepositoryFetcher, ResultStore, WebhookAuthenticator,
};
use crate::workers::{CommandExecutor, JobDispatcher, ValidationPipeline, ValidatorRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ValidationConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub results: ResultStore,
    pub registry: Arc<ValidatorRegistry>,
    pub dispatcher: JobDispatcher,
    pub hooks: HookManager,
    pub remote: Arc<dyn RemoteHost>,
    pub authenticator: WebhookAuthenticator,
}

impl AppState {
    /// Wire every component from `config` around the given remote host and fetcher.
    pub async fn build(
        config: ValidationConfig,
        remote: Arc<dyn RemoteHost>,
        fetcher: Arc<dyn RepositoryFetcher>,
    ) -> Result<Self, AppError> {
        prepare_directories(&config).await?;

        let credentials: Arc<dyn CredentialStore> = Arc::new(
            FileCredentialStore::new(&config.directories.tokens)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to open credential store: {}", e);
                    AppError::from(e)
                })?,
        );
        let results = ResultStore::new(&config.directories.results, config.labels.clone());

        let validators = config.supported_validators();
        let registry = Arc::new(ValidatorRegistry::new(
            &validators,
            &config.executables,
            &config.labels,
        ));

        let executor = CommandExecutor::new(Duration::from_secs(config.worker.command_timeout_secs));
        let pipeline = Arc::new(ValidationPipeline::new(
            results.clone(),
            remote.clone(),
            fetcher,
            registry.clone(),
            executor,
            &config.directories.temp,
        ));
        let dispatcher = JobDispatcher::start(&config.worker, pipeline);

        let hooks = HookManager::new(
            remote.clone(),
            credentials.clone(),
            config.settings.root_url.clone(),
            config.settings.hook_secret.clone(),
            validators,
        );
        let authenticator = WebhookAuthenticator::new(config.settings.hook_secret.clone());

        Ok(Self {
            config,
            credentials,
            results,
            registry,
            dispatcher,
            hooks,
            remote,
            authenticator,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/validate/:validator/:owner/:repo",
            post(handlers::validate::validate),
        )
        .route(
            "/status/:validator/:owner/:repo",
            get(handlers::status::status),
        )
        .route(
            "/results/:validator/:owner/:repo",
            get(handlers::results::latest_results),
        )
        .route(
            "/results/:validator/:owner/:repo/:revision",
            get(handlers::results::revision_results),
        )
        .route(
            "/history/:validator/:owner/:repo",
            get(handlers::results::history),
        )
        .route("/pubvalidate", post(handlers::validate::validate_public))
        .route("/login", post(handlers::session::login))
        .route("/logout", post(handlers::session::logout))
        .route("/repos", get(handlers::hooks::list_repositories))
        .route("/repos/:owner/:repo/hooks", get(handlers::hooks::list_hooks))
        .route(
            "/repos/:owner/:repo/:validator/enable",
            post(handlers::hooks::enable_hook),
        )
        .route(
            "/repos/:owner/:repo/hooks/:hook_id/disable",
            post(handlers::hooks::disable_hook),
        )
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Create the temp, results and token directories if missing.
async fn prepare_directories(config: &ValidationConfig) -> Result<(), AppError> {
    for dir in [
        &config.directories.temp,
        &config.directories.results,
        &config.directories.tokens,
    ] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            tracing::error!("Failed to create directory {}: {}", dir.display(), e);
            AppError::ConfigError(anyhow::anyhow!(
                "Cannot create directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Warn about executables that cannot be found; runs using them will fail.
fn check_executables(config: &ValidationConfig, registry: &ValidatorRegistry) {
    if !is_executable(&config.executables.git) {
        tracing::warn!(program = %config.executables.git, "git executable not found; fetching will fail");
    }
    for adapter in registry.adapters() {
        if !is_executable(adapter.executable()) {
            tracing::warn!(
                validator = %adapter.kind(),
                program = %adapter.executable(),
                "Validator executable not found; its runs will fail"
            );
        }
    }
}

/// Resolve `program` the way the process spawner will: a path is checked
/// directly, a bare name is searched on `PATH`.
fn is_executable(program: &str) -> bool {
    which::which(program).is_ok()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application against the configured remote host.
    pub async fn build(config: ValidationConfig) -> Result<Self, AppError> {
        let remote: Arc<dyn RemoteHost> = Arc::new(GinClient::new(
            config.remote.web_url.clone(),
            config.settings.client_id.clone(),
        ));
        let fetcher: Arc<dyn RepositoryFetcher> = Arc::new(GitFetcher::new(
            config.executables.git.clone(),
            config.remote.git_url.clone(),
            config.worker.annex_content,
            CommandExecutor::new(Duration::from_secs(config.worker.command_timeout_secs)),
        ));

        let state = AppState::build(config, remote, fetcher).await?;
        check_executables(&state.config, &state.registry);

        // Port 0 binds a random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            validators = ?state.registry.kinds(),
            "Validation service configured"
        );

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until a shutdown signal, then cancel outstanding validation jobs.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let dispatcher = self.state.dispatcher.clone();
        let router = build_router(self.state);

        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        dispatcher.shutdown();
        Ok(())
    }
}
