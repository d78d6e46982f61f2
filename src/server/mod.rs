//! # HTTP Server Module
//!
//! The UI-facing HTTP surface.
//!
//! Routes:
//! - `GET  /ping`
//! - `GET  /port`, `GET /port/state`
//! - `POST /port/connect?port=<name>&baudrate=<n>`, `POST /port/disconnect`
//! - `GET  /data/<channel>`, `GET /data/<channel>/history`
//! - `POST /data/<channel>/log`
//! - `POST /data/gps/target`
//!
//! Channel routes are registered per channel name, so an unknown channel is a
//! plain 404 from the router.

pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tracing::debug;

use crate::port::PortSupervisor;
use crate::sensors::gps::GpsData;
use crate::sensors::{ChannelEndpoint, Reading};
use crate::storage::Uploader;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    channels: Vec<Arc<dyn ChannelEndpoint>>,
    ports: Arc<PortSupervisor>,
    uploader: Arc<dyn Uploader>,
    bucket: Arc<str>,
}

impl AppState {
    pub fn new(
        channels: Vec<Arc<dyn ChannelEndpoint>>,
        ports: Arc<PortSupervisor>,
        uploader: Arc<dyn Uploader>,
        bucket: &str,
    ) -> Self {
        Self {
            channels,
            ports,
            uploader,
            bucket: Arc::from(bucket),
        }
    }

    pub fn channels(&self) -> &[Arc<dyn ChannelEndpoint>] {
        &self.channels
    }

    pub fn ports(&self) -> &Arc<PortSupervisor> {
        &self.ports
    }

    pub fn uploader(&self) -> &Arc<dyn Uploader> {
        &self.uploader
    }

    /// Upload destination for channel logs
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.channels.iter().map(|c| c.name()).collect();
        f.debug_struct("AppState")
            .field("channels", &names)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

/// Builds the router for `state`.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/port", get(handlers::available_ports))
        .route("/port/state", get(handlers::port_state))
        .route("/port/connect", post(handlers::connect_port))
        .route("/port/disconnect", post(handlers::disconnect_port));

    for endpoint in state.channels() {
        let base = format!("/data/{}", endpoint.name());

        let latest = Arc::clone(endpoint);
        let history = Arc::clone(endpoint);
        let log = Arc::clone(endpoint);
        router = router
            .route(&base, get(move || handlers::latest(Arc::clone(&latest))))
            .route(
                &format!("{}/history", base),
                get(move || handlers::history(Arc::clone(&history))),
            )
            .route(
                &format!("{}/log", base),
                post(move |state: State<AppState>| handlers::flush_log(state, Arc::clone(&log))),
            );

        if endpoint.name() == GpsData::KIND {
            router = router.route(&format!("{}/target", base), post(handlers::send_target));
        }
    }

    router
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;
    debug!(
        "{} {} -> {} ({:?})",
        method,
        uri,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}
