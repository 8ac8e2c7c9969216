//! Core of a remote-image list screen: paginated fetching with merged
//! triggers, debounced text search, and deduplicated, pausable image
//! downloads.
//!
//! This crate is the stateful half of an image browser. A presentation
//! layer renders rows and forwards user input; everything it needs to ask
//! for lives here:
//!
//! - [`net`] - generic HTTP request execution and the error taxonomy
//! - [`images`] - per-URL deduplicated image downloads backed by an LRU cache
//! - [`feed`] - the list state machine (fetch / refresh / load-more / search)
//! - [`config`] - TOML configuration with sensible defaults
//!
//! # Wiring
//!
//! ```ignore
//! let config = Config::load(&config_path)?;
//! let client = NetworkClient::new(&config)?;
//! let images = Arc::new(ImageCache::new(client.http(), config.image_cache_capacity));
//! let (controller, outputs) = FeedController::new(client, images, &config);
//!
//! controller.fetch();
//! // render rows from `outputs.updates`, surface `outputs.errors`, ...
//! ```

pub mod config;
pub mod feed;
pub mod images;
pub mod net;

pub use config::Config;
pub use feed::{FeedController, FeedOutputs, FeedSnapshot, ImageItem};
pub use images::ImageCache;
pub use net::{NetworkClient, NetworkError, RequestSpec};
