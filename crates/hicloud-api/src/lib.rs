//! Hetzner Cloud API client for the hicloud console.
//!
//! [`CloudApi`] exposes one method per remote operation and talks JSON through a
//! [`Transport`]. The blocking reqwest implementation is behind the `http`
//! feature (on by default); [`MockTransport`] is always available for tests.

pub mod client;
pub mod error;
pub mod mock;
pub mod transport;
pub mod types;

pub use client::{CloudApi, DEFAULT_BASE_URL};
pub use error::{ApiError, ApiResult};
pub use mock::{MockTransport, RecordedCall};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{Method, Transport};
