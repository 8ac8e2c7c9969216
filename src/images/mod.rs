//! Image download management.
//!
//! One [`ImageCache`] instance serves every row of the list:
//!
//! - downloads are deduplicated per URL (at most one transfer in flight
//!   for a given key, ever)
//! - completed images land in a bounded LRU cache and are served
//!   synchronously from then on
//! - transfers can be paused and resumed as rows scroll out of and back
//!   into view, without losing progress
//!
//! Download failures never propagate as errors; the caller's completion
//! callback receives the placeholder instead.

mod cache;

pub use cache::ImageCache;
