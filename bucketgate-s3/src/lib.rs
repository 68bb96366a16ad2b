//! S3 object operations for bucketgate
//!
//! A site's requests are classified into a single operation, translated into
//! calls on an [`backend::ObjectBackend`] and answered with S3-compatible
//! headers and XML bodies.

pub mod backend;
pub mod conditional;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod multipart;
pub mod routing;
pub mod xml;

pub use backend::{MemoryBackend, ObjectBackend, SdkBackend};
pub use error::GatewayError;
pub use handlers::{router, S3State};
