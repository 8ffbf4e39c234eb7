//! Inventory service core contracts and value types.
//!
//! This crate exposes the domain structures shared between the HTTP gateway,
//! the command engine, and the persistence layer. It also provides the typed
//! error taxonomy, precondition (`If-Match`/`ETag`) parsing, and validation
//! helpers for identifiers.
pub mod config;
pub mod error;
pub mod precondition;
pub mod types;
pub mod validate;

pub use error::*;
pub use precondition::*;
pub use types::*;
pub use validate::*;
