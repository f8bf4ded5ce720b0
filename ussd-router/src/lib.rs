//! USSD Router - menu-driven USSD session engine.
//!
//! This crate provides:
//! - A declarative menu tree with screen-scoped option matching
//! - Protocol adapters that turn carrier callbacks into normalized requests
//! - Session and screen-state stores with background eviction
//! - Deferred reply templates
//! - An axum HTTP surface
//!
//! ## Architecture
//!
//! ```text
//! Carrier → HTTP route → Adapter → Engine (screen → option → handler) → reply
//!                          ↓                    ↓
//!                    SessionStore        ScreenStateCache
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod adapter;
pub mod adapters;
pub mod demo;
pub mod engine;
pub mod menu;
pub mod request;
pub mod response;
pub mod routes;
pub mod session;
pub mod state;
pub mod sweeper;
pub mod template;
pub mod value;

pub use adapter::{AdapterRegistry, ProtocolAdapter};
pub use adapters::AfricasTalkingAdapter;
pub use engine::{Engine, EngineBuilder};
pub use menu::{MenuOption, MenuTree, RegisteredOption, RouteHandler};
pub use request::{TransportRequest, UssdRequest};
pub use response::{BufferedResponse, Disposition, TemplateValues};
pub use routes::build_router;
pub use session::{InMemorySessionStore, InputMode, Session, SessionStore};
pub use state::ScreenStateCache;
pub use sweeper::{Sweeper, Sweepers};
pub use template::TemplateRegistry;
pub use value::Value;

use std::net::SocketAddr;
use std::sync::Arc;
use ussd_common::config::Config;

/// Serve `engine` until Ctrl-C, then stop the eviction sweepers.
pub async fn start_server(config: &Config, engine: Arc<Engine>) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let mut sweepers = engine.start_sweepers();
    let router = build_router(Arc::clone(&engine), &config.server.path);

    tracing::info!(
        "Starting USSD router on {} (callback path {}, adapter {})",
        addr,
        config.server.path,
        engine.adapter_name()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweepers.shutdown().await;
    served?;
    tracing::info!("USSD router stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
