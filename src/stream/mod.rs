//! Real-time streaming inference.
//!
//! - [`protocol`]: outbound JSON envelope types;
//! - [`connection`]: per-connection state, covering frame decoding, rate
//!   limiting, the session pipelines, and calibration status transitions;
//! - [`coordinator`]: per-client single-slot mailboxes and the inference
//!   worker pool;
//! - [`server`]: the axum WebSocket endpoint gluing it all together.

pub mod connection;
pub mod coordinator;
pub mod protocol;
pub mod server;

pub use connection::ConnectionState;
pub use coordinator::{Coordinator, ScorePayload};
pub use protocol::Envelope;
