//! Generic HTTP request execution.
//!
//! This module is the only place in the crate that talks HTTP directly:
//!
//! - [`RequestSpec`] - a declarative description of a request (base URL,
//!   path, method, headers, query parameters, optional JSON body)
//! - [`NetworkClient`] - executes a spec and either decodes the JSON body
//!   into a typed value or returns the raw bytes
//! - [`NetworkError`] - the failure taxonomy every caller matches on
//!
//! Requests are cancellable by dropping (or aborting the task driving) the
//! returned future; a cancelled request never emits a result.

mod client;
mod request;

pub use client::{NetworkClient, NetworkError};
pub use request::RequestSpec;
