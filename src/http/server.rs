//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with one method-agnostic handler
//! - Wire up middleware (tracing, timeouts)
//! - Build the request pipeline from configuration
//! - Serve the plain listener and the optional TLS listener
//! - Stop both listeners on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    response::Response,
    Extension, Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::{build_store, CacheLookup, CachePolicy, CachePurgeHandler, KeyValueStore, MemoryStore, ResponseCache};
use crate::config::schema::StoreKind;
use crate::config::ProxyConfig;
use crate::http::pipeline::{Exchange, Pipeline};
use crate::http::request::{RequestContextBuilder, RequestSequence, Scheme, X_REQUEST_ID};
use crate::http::response::ResponseDispatcher;
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;
use crate::net::{TransportError, TransportFactory};
use crate::observability::metrics;
use crate::proxy::ProxyForwarder;
use crate::security::Firewall;
use crate::translation::{GoogleTranslateClient, TranslationClient, TranslationError, TranslationOrchestrator};

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream client error: {0}")]
    Transport(#[from] TransportError),

    #[error("translation client error: {0}")]
    Translation(#[from] TranslationError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub builder: RequestContextBuilder,
    pub pipeline: Pipeline,
}

/// HTTP server for the translating proxy.
pub struct HttpServer {
    config: ProxyConfig,
    state: AppState,
    shutdown: Shutdown,
    memory_store: Option<MemoryStore>,
}

impl HttpServer {
    /// Create a server with the production store, translation client and
    /// upstream transports.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let memory_store = (config.cache.store.kind == StoreKind::Memory).then(MemoryStore::new);
        let store: Arc<dyn KeyValueStore> = match &memory_store {
            Some(memory) => Arc::new(memory.clone()),
            None => build_store(&config.cache.store),
        };
        let client = Arc::new(GoogleTranslateClient::new(&config.translation)?);
        let transports = TransportFactory::from_config(&config.upstream)?;

        let mut server = Self::with_collaborators(config, store, client, transports);
        server.memory_store = memory_store;
        Ok(server)
    }

    /// Create a server around caller-supplied collaborators.
    pub fn with_collaborators(
        config: ProxyConfig,
        store: Arc<dyn KeyValueStore>,
        client: Arc<dyn TranslationClient>,
        transports: TransportFactory,
    ) -> Self {
        let cache = ResponseCache::new(store, CachePolicy::new(&config.cache));
        // Translation may use at most half the request budget, leaving room
        // for the upstream fetch and the fallback page.
        let request_budget = Duration::from_secs(config.timeouts.request_secs);
        let orchestrator = Arc::new(
            TranslationOrchestrator::new(client, &config.translation).with_deadline_cap(request_budget / 2),
        );
        let dispatcher = ResponseDispatcher::new(cache.clone(), orchestrator);

        let pipeline = Pipeline::new()
            .stage(Arc::new(Firewall::new(&config.upstream, &config.purge)))
            .stage(Arc::new(CachePurgeHandler::new(cache.clone(), config.purge.bulk_marker.clone())))
            .stage(Arc::new(CacheLookup::new(cache.clone(), dispatcher.clone())))
            .stage(Arc::new(ProxyForwarder::new(transports, cache, dispatcher)));

        let state = AppState {
            builder: RequestContextBuilder::new(&config.upstream, Arc::new(RequestSequence::new())),
            pipeline,
        };

        Self {
            config,
            state,
            shutdown: Shutdown::new(),
            memory_store: None,
        }
    }

    /// Build the Axum router for one listener.
    #[allow(deprecated)]
    fn build_router(&self, scheme: Scheme) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.state.clone())
            .layer(Extension(scheme))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Handle used to stop [`run`](Self::run).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until shutdown is triggered.
    pub async fn run(self, listener: TcpListener) -> Result<(), StartupError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP listener starting");

        if let Some(memory) = self.memory_store.clone() {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let evicted = memory.purge_expired();
                            if evicted > 0 {
                                tracing::debug!(evicted, "Evicted expired cache entries");
                            }
                        }
                        _ = shutdown.wait() => break,
                    }
                }
            });
        }

        let tls_task = match &self.config.listener.tls {
            Some(tls) => {
                let tls_addr: SocketAddr = tls
                    .bind_address
                    .parse()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
                let rustls = load_tls_config(tls).await?;
                let handle = axum_server::Handle::new();

                let shutdown = self.shutdown.clone();
                let drain = handle.clone();
                tokio::spawn(async move {
                    shutdown.wait().await;
                    drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
                });

                let app = self
                    .build_router(Scheme::Https)
                    .into_make_service_with_connect_info::<SocketAddr>();
                tracing::info!(address = %tls_addr, "HTTPS listener starting");
                Some(tokio::spawn(async move {
                    axum_server::bind_rustls(tls_addr, rustls)
                        .handle(handle)
                        .serve(app)
                        .await
                }))
            }
            None => None,
        };

        let app = self
            .build_router(Scheme::Http)
            .into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        if let Some(task) = tls_task {
            match task.await {
                Ok(result) => result?,
                Err(e) => tracing::error!(error = %e, "HTTPS listener task failed"),
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Single entry point for every method and path.
async fn proxy_handler(
    State(state): State<AppState>,
    Extension(scheme): Extension<Scheme>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let ctx = state.builder.build(&parts, scheme, peer);
    let method = ctx.method.to_string();
    let request_id = HeaderValue::from_str(&ctx.id).ok();

    let mut response = state.pipeline.execute(Exchange::new(ctx, body)).await;

    if let Some(id) = request_id {
        response.headers_mut().insert(X_REQUEST_ID, id);
    }
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
