//! HTTP transport for OrderIQ.
//!
//! A thin Axum layer over the question-answering pipeline: `POST /ask`
//! flattens the request into a [`orderiq_pipeline::Question`], runs the
//! pipeline, and shapes the envelope into the transport response;
//! `POST /barcode` proxies the sibling barcode lookup capability.

pub mod api;
pub mod config;
pub mod server;
pub mod state;

pub use config::{AppConfig, ConfigError, WebConfig};
pub use server::WebServer;
pub use state::AppState;
