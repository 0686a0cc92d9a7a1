use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use ferry_blob::{BlobConfig, FsBlobStore};
use ferry_bundle::{BundleReaper, Ferry, MemoryRepository};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes::file_router;
use crate::{FerryState, ServerConfig};

/// Default request body ceiling, matching [`ServerConfig::default`]
const DEFAULT_BODY_LIMIT: usize = 200 * 1024 * 1024;

/// A [`Ferry`] wired into an axum router
#[derive(Clone)]
pub struct FerryApp {
    pub ferry: Arc<Ferry>,
    pub router: Router<()>,
}

impl FerryApp {
    pub fn new(ferry: Ferry) -> Self {
        Self::with_body_limit(ferry, DEFAULT_BODY_LIMIT)
    }

    pub fn with_body_limit(ferry: Ferry, max_body_bytes: usize) -> Self {
        let state = FerryState::new(ferry);
        let ferry = Arc::clone(&state.ferry);

        let router = Router::new()
            .nest("/api/files", file_router(state))
            .route("/health", get(|| async { "ok" }))
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .layer(CorsLayer::permissive())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            );

        Self { ferry, router }
    }

    /// Reclaim expired bundles in the background every `every`
    pub fn spawn_reaper(&self, every: Duration) -> JoinHandle<()> {
        let reaper = BundleReaper::with_interval(Arc::clone(&self.ferry), every);
        tokio::spawn(reaper.start())
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = ?listener.local_addr()?, "Ferry listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

/// Build the server described by `config`: blobs on disk under
/// `data_dir`, bundle records in memory.
pub async fn build(config: &ServerConfig) -> anyhow::Result<FerryApp> {
    let store = FsBlobStore::open(&config.data_dir, BlobConfig::new()).await?;
    let ferry = Ferry::builder(MemoryRepository::new(), store).build();
    Ok(FerryApp::with_body_limit(ferry, config.max_body_bytes()))
}
