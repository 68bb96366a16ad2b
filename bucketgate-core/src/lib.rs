//! Core types for bucketgate
//!
//! This crate holds the site configuration model and the backend error model
//! shared by every other bucketgate crate.

pub mod error;
pub mod site;

pub use error::{BackendError, ErrorCode};
pub use site::{ConfigError, Options, Site, User};
