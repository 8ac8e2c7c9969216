//! The list feed state machine.
//!
//! This module owns everything between "the user did something" and "the
//! presentation layer has a new list to draw":
//!
//! - [`model`] - the wire model ([`ImageItem`]) and the paging request
//! - [`state`] - [`FeedState`] and the pure trigger/commit rules
//! - [`controller`] - the owner task that serializes every mutation,
//!   merges the Fetch / Refresh / LoadMore flows, debounces search input,
//!   and publishes snapshots over watch channels
//!
//! Three invariants the controller enforces:
//!
//! 1. `FeedState` is mutated only on its owner task; each fetch completion
//!    is applied atomically.
//! 2. Within one flow kind, only the latest request's result is applied;
//!    superseded requests are aborted and stale results discarded.
//! 3. LoadMore is ignored until the first page has landed and while any
//!    fetch is in flight.

mod controller;
mod model;
mod state;

pub use controller::{FeedController, FeedOutputs, FeedSnapshot};
pub use model::ImageItem;
pub use state::{FeedState, FlowKind};
