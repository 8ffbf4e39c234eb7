//! Durable persistence for the inventory service.
//!
//! Everything on disk is a single JSON document replaced atomically
//! (temp file + rename) with bounded retry. The event log is the system of
//! record; the stock store is the derived view the command core keeps in
//! step with it.

pub mod durable;
pub mod event_log;
pub mod stock_store;

pub use durable::{RetryPolicy, read_json, write_json};
pub use event_log::{AppendOutcome, EVENT_LOG_FILE, EventLog, EventLogDocument};
pub use stock_store::{STOCK_FILE, StockStore};
