//! Inventory gateway: the single-process HTTP service wrapping the write
//! path, read surface, and the central-inventory sync worker.

pub mod config;
pub mod http;
pub mod state;
pub mod sync;

pub use config::GatewayConfig;
pub use http::build_router;
pub use state::{App, AppState};
