//! Client authentication for bucketgate
//!
//! Sites may require HTTP Basic credentials from their clients. Requests to
//! the backend are signed by the backend client itself.

pub mod basic;

pub use basic::{challenge, require_basic_auth, BasicAuthError, BasicAuthState, UserTable};
