//! Relay server implementation
//! Owns the listener, routes the health probe and the forwarding prefix, and drains on shutdown

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::forward::Forwarder;
use crate::listener::{self, BindOutcome, BoundListener};
use crate::response::{
    apply_cors, health_response, preflight_response, proxy_error_response, text_response, RelayBody,
};
use crate::state::{RelayEndpoint, RelayState};
use hyper::body::Incoming;
use hyper::header::ACCESS_CONTROL_REQUEST_METHOD;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Local forwarding relay
pub struct RelayServer {
    config: Arc<RelayConfig>,
    forwarder: Arc<Forwarder>,
    state: watch::Sender<RelayState>,
}

impl RelayServer {
    /// Create a new relay; nothing is bound until [`RelayServer::bind`] or [`RelayServer::run`]
    pub fn new(config: RelayConfig) -> Self {
        let forwarder = Arc::new(Forwarder::new(&config));
        let (state, _) = watch::channel(RelayState::Unbound);

        Self {
            config: Arc::new(config),
            forwarder,
            state,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Subscribe to lifecycle changes. The current state is visible immediately.
    pub fn subscribe(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RelayState {
        self.state.borrow().clone()
    }

    /// Bind, serve until `shutdown` resolves, then drain
    pub async fn run<F>(self: Arc<Self>, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Acquire the listener: preferred port first, then the fallback range ascending
    pub async fn bind(&self) -> Result<BoundListener, RelayError> {
        let preferred = self.config.preferred_port;
        let range = self.config.fallback_ports;
        let candidates = self.config.candidate_ports();

        let outcome = listener::acquire(self.config.bind_address, &candidates, |port| {
            self.publish(RelayState::Binding { port })
        })
        .await;

        match outcome {
            BindOutcome::Bound(listener) => {
                let port = listener.port();
                let endpoint =
                    RelayEndpoint::new(&self.config.public_host(), port, &self.config.path_prefix);

                if port == preferred {
                    info!("Webhook relay running on {}", endpoint.base_url);
                } else {
                    info!(
                        "Webhook relay running on {} (alternative port, {} was unavailable)",
                        endpoint.base_url, preferred
                    );
                }
                info!("Proxying requests to: {}", self.config.upstream_origin);
                info!("Frontend should use: {} for webhook API calls", endpoint.api_url);

                self.publish(RelayState::Bound(endpoint));
                Ok(listener)
            }
            BindOutcome::Exhausted { attempted } => {
                error!(
                    "All ports are busy (tried {:?}), relay cannot start",
                    attempted
                );
                self.publish(RelayState::Stopped);
                Err(RelayError::BindExhausted {
                    preferred,
                    start: range.start,
                    end: range.end,
                })
            }
        }
    }

    /// Accept connections on `listener` until `shutdown` resolves.
    ///
    /// On shutdown the listener is closed first, then in-flight connections get
    /// the configured grace period to finish. Connections still open after that
    /// are aborted before the relay reports `Stopped`.
    pub async fn serve<F>(&self, listener: BoundListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let port = listener.port();
        let listener = listener.into_inner();
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let forwarder = self.forwarder.clone();
                    let conn = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(false)
                        .serve_connection(
                            TokioIo::new(stream),
                            service_fn(move |req| {
                                let forwarder = forwarder.clone();
                                async move { Self::handle_request(req, remote_addr, forwarder).await }
                            }),
                        );
                    let conn = graceful.watch(conn);

                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!("HTTP connection error from {}: {}", remote_addr, e);
                        }
                    });
                }
                // Reap finished connection tasks
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        drop(listener);
        self.publish(RelayState::ShuttingDown { port });
        info!("Relay shutting down, draining in-flight requests");

        tokio::select! {
            _ = graceful.shutdown() => info!("All connections drained"),
            _ = tokio::time::sleep(self.config.shutdown_grace) => {
                warn!(
                    "Shutdown grace period elapsed, aborting {} open connection(s)",
                    connections.len()
                );
                connections.abort_all();
            }
        }

        while connections.join_next().await.is_some() {}

        self.publish(RelayState::Stopped);
        info!("Relay stopped");
    }

    /// Best-effort notification; the state is stored even with no subscribers
    fn publish(&self, state: RelayState) {
        if self.state.receiver_count() == 0 {
            debug!("No relay state subscribers for {:?}", state);
        }
        self.state.send_replace(state);
    }

    /// Handle incoming request
    async fn handle_request(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        forwarder: Arc<Forwarder>,
    ) -> Result<Response<RelayBody>, Infallible> {
        let mut response = Self::route(req, remote_addr, &forwarder).await;
        apply_cors(response.headers_mut());
        Ok(response)
    }

    async fn route(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        forwarder: &Forwarder,
    ) -> Response<RelayBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        debug!("{} {} from {}", method, path, remote_addr);

        if method == Method::OPTIONS && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD) {
            return preflight_response();
        }

        if path == "/health" && (method == Method::GET || method == Method::HEAD) {
            return health_response();
        }

        let rest = match forwarder.strip_prefix(&path) {
            Some(rest) => rest,
            None => return text_response(StatusCode::NOT_FOUND, "Not Found"),
        };

        let result = match forwarder.target_uri(rest, req.uri().query()) {
            Ok(target) => forwarder.forward(req, target).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                error!("[PROXY ERROR] {} {}: {}", method, path, e);
                proxy_error_response(&e)
            }
        }
    }
}
