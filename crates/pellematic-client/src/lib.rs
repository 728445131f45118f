//! Pellematic Client - HTTP access to the controller's JSON interface
//!
//! This crate wraps reqwest to provide:
//! - Status fetches with escalating timeouts and query-suffix detection
//! - The bytes -> charset -> repair -> JSON decode pipeline
//! - The GET-based command endpoint

pub mod query;
pub mod transport;

pub use query::{ClientError, DeviceClient, DeviceSnapshot, QuerySuffix, UnknownQuerySuffix};
pub use transport::{HttpTransport, DEFAULT_TIMEOUTS};
