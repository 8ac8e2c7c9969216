//! The feed controller: a single owner task that serializes every state
//! mutation, plus the cheap cloneable handle the presentation layer holds.
//!
//! Triggers and completions are events on one queue. Fetches run as spawned
//! tasks and report back through the same queue, so each completion is
//! applied atomically with respect to `FeedState`. Within a flow kind the
//! latest request wins: a newer trigger aborts the previous task, and a
//! generation counter discards any result that still slips through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::model::{images_page, ImageItem};
use super::state::{FeedState, FlowKind};
use crate::config::Config;
use crate::images::ImageCache;
use crate::net::{NetworkClient, NetworkError};

/// Row height used when an item carries no usable dimensions.
const FALLBACK_ROW_HEIGHT: f64 = 200.0;

/// Point-in-time view published to the presentation layer: the filtered
/// items plus the query they were filtered with.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub items: Arc<Vec<ImageItem>>,
    pub search_query: String,
}

/// Output channels consumed by the presentation adapter.
pub struct FeedOutputs {
    /// Filtered-list stream. Emits on every committed state change.
    pub updates: watch::Receiver<FeedSnapshot>,
    /// Loading indicator stream.
    pub loading: watch::Receiver<bool>,
    /// Fetch failures, in completion order. Errors never interrupt the
    /// list; the presentation layer decides how to surface them.
    pub errors: mpsc::UnboundedReceiver<NetworkError>,
}

enum FeedEvent {
    Trigger(FlowKind),
    SearchInput(String),
    FetchDone {
        kind: FlowKind,
        generation: u64,
        page: u32,
        result: Result<Vec<ImageItem>, NetworkError>,
    },
}

/// Handle to the feed owner task.
///
/// Methods fall into three groups: the trigger surface (`fetch`, `refresh`,
/// `load_more`, `search`), read-only projections over the latest published
/// snapshot (`item_count`, `get_item`, ...), and the visibility hooks that
/// map row display transitions onto image transfer pause/resume.
///
/// Dropping the handle (together with [`FeedOutputs`]) shuts the owner task
/// down and aborts any in-flight fetches.
pub struct FeedController {
    events: mpsc::UnboundedSender<FeedEvent>,
    updates: watch::Receiver<FeedSnapshot>,
    images: Arc<ImageCache>,
}

impl FeedController {
    /// Spawn the owner task. Services are injected rather than global:
    /// the same `client`/`images` pair can be shared or swapped in tests.
    pub fn new(
        client: NetworkClient,
        images: Arc<ImageCache>,
        config: &Config,
    ) -> (Self, FeedOutputs) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = watch::channel(FeedSnapshot::default());
        let (loading_tx, loading_rx) = watch::channel(false);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let owner = Owner {
            state: FeedState::default(),
            client,
            base_url: config.base_url.clone(),
            page_size: config.page_size,
            debounce: Duration::from_millis(config.search_debounce_ms),
            // Weak: only the handle (and running fetch tasks) keep the
            // event queue alive, so dropping the handle ends the loop.
            events_tx: events_tx.downgrade(),
            updates_tx,
            loading_tx,
            errors_tx,
            in_flight: HashMap::new(),
            generation: 0,
            pending_search: None,
        };
        tokio::spawn(owner.run(events_rx));

        let controller = Self {
            events: events_tx,
            updates: updates_rx.clone(),
            images,
        };
        let outputs = FeedOutputs {
            updates: updates_rx,
            loading: loading_rx,
            errors: errors_rx,
        };
        (controller, outputs)
    }

    // ------------------------------------------------------------------
    // Trigger surface
    // ------------------------------------------------------------------

    /// Initial load: requests page 1 and replaces the list.
    pub fn fetch(&self) {
        self.send(FeedEvent::Trigger(FlowKind::Fetch));
    }

    /// Pull-to-refresh: resets pagination and replaces the list.
    pub fn refresh(&self) {
        self.send(FeedEvent::Trigger(FlowKind::Refresh));
    }

    /// Infinite scroll: appends the next page. Ignored until the first
    /// page has landed and while a fetch is in flight.
    pub fn load_more(&self) {
        self.send(FeedEvent::Trigger(FlowKind::LoadMore));
    }

    /// Raw search input. Debounced by the configured quiet period and
    /// deduplicated against the last accepted query; never fetches.
    pub fn search(&self, text: impl Into<String>) {
        self.send(FeedEvent::SearchInput(text.into()));
    }

    fn send(&self, event: FeedEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("feed owner task is gone, dropping event");
        }
    }

    // ------------------------------------------------------------------
    // Read-only projections over the latest snapshot
    // ------------------------------------------------------------------

    /// Number of items in the filtered view.
    pub fn item_count(&self) -> usize {
        self.updates.borrow().items.len()
    }

    /// Item at `index` in the filtered view. Out of range is `None`,
    /// never a fault.
    pub fn get_item(&self, index: usize) -> Option<ImageItem> {
        self.updates.borrow().items.get(index).cloned()
    }

    /// The last accepted search query.
    pub fn search_text(&self) -> String {
        self.updates.borrow().search_query.clone()
    }

    /// Row height for `index` when rendered `display_width` wide,
    /// preserving the image's aspect ratio. Items without usable
    /// dimensions get a fixed fallback height.
    pub fn row_height(&self, index: usize, display_width: f64) -> Option<f64> {
        let snapshot = self.updates.borrow();
        let item = snapshot.items.get(index)?;
        Some(match (item.width, item.height) {
            (Some(w), Some(h)) if w > 0 => display_width * f64::from(h) / f64::from(w),
            _ => FALLBACK_ROW_HEIGHT,
        })
    }

    // ------------------------------------------------------------------
    // Visibility hooks
    // ------------------------------------------------------------------

    /// Row scrolled into view: resume its image transfer if one is
    /// in flight.
    pub fn will_display(&self, index: usize) {
        if let Some(url) = self.download_url(index) {
            self.images.resume(&url);
        }
    }

    /// Row scrolled out of view: pause its image transfer so visible rows
    /// get the bandwidth.
    pub fn did_end_display(&self, index: usize) {
        if let Some(url) = self.download_url(index) {
            self.images.pause(&url);
        }
    }

    /// The image manager rows load through.
    pub fn images(&self) -> &Arc<ImageCache> {
        &self.images
    }

    fn download_url(&self, index: usize) -> Option<String> {
        self.updates.borrow().items.get(index)?.download_url.clone()
    }
}

// ============================================================================
// Owner task
// ============================================================================

struct InFlight {
    generation: u64,
    join: JoinHandle<()>,
}

struct PendingSearch {
    text: String,
    deadline: Instant,
}

/// The single logical owner of `FeedState`. Runs until every strong sender
/// on the event queue is gone.
struct Owner {
    state: FeedState,
    client: NetworkClient,
    base_url: String,
    page_size: u32,
    debounce: Duration,
    events_tx: mpsc::WeakUnboundedSender<FeedEvent>,
    updates_tx: watch::Sender<FeedSnapshot>,
    loading_tx: watch::Sender<bool>,
    errors_tx: mpsc::UnboundedSender<NetworkError>,
    /// At most one in-flight fetch per flow kind.
    in_flight: HashMap<FlowKind, InFlight>,
    generation: u64,
    pending_search: Option<PendingSearch>,
}

impl Owner {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<FeedEvent>) {
        tracing::debug!("feed owner task started");
        loop {
            let debounce_deadline = self.pending_search.as_ref().map(|p| p.deadline);
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = tokio::time::sleep_until(debounce_deadline.unwrap_or_else(Instant::now)),
                    if debounce_deadline.is_some() =>
                {
                    self.accept_pending_search();
                }
            }
        }

        // Handle dropped: nothing can observe results anymore.
        for (kind, task) in self.in_flight.drain() {
            task.join.abort();
            tracing::debug!(?kind, "aborted fetch on shutdown");
        }
        tracing::debug!("feed owner task stopped");
    }

    fn handle(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Trigger(kind) => self.handle_trigger(kind),
            FeedEvent::SearchInput(text) => {
                // Every keystroke restarts the quiet period.
                self.pending_search = Some(PendingSearch {
                    text,
                    deadline: Instant::now() + self.debounce,
                });
            }
            FeedEvent::FetchDone {
                kind,
                generation,
                page,
                result,
            } => self.handle_fetch_done(kind, generation, page, result),
        }
    }

    fn handle_trigger(&mut self, kind: FlowKind) {
        let Some(page) = self.state.accept_trigger(kind) else {
            tracing::debug!(?kind, "trigger ignored (first load pending or fetch in flight)");
            return;
        };
        let Some(events) = self.events_tx.upgrade() else {
            return; // handle already dropped
        };

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        // A newer trigger of the same kind supersedes the one in flight.
        if let Some(previous) = self.in_flight.remove(&kind) {
            previous.join.abort();
            tracing::debug!(?kind, "aborted superseded fetch");
        }

        let client = self.client.clone();
        let spec = images_page(&self.base_url, page, self.page_size);
        let join = tokio::spawn(async move {
            let result = client.request::<Vec<ImageItem>>(&spec).await;
            let _ = events.send(FeedEvent::FetchDone {
                kind,
                generation,
                page,
                result,
            });
        });
        self.in_flight.insert(kind, InFlight { generation, join });

        let _ = self.loading_tx.send(true);
        tracing::debug!(?kind, page, "fetch started");
    }

    fn handle_fetch_done(
        &mut self,
        kind: FlowKind,
        generation: u64,
        page: u32,
        result: Result<Vec<ImageItem>, NetworkError>,
    ) {
        // Only the latest request of this kind may commit.
        match self.in_flight.get(&kind) {
            Some(current) if current.generation == generation => {
                self.in_flight.remove(&kind);
            }
            _ => {
                tracing::debug!(?kind, generation, "discarding stale fetch result");
                return;
            }
        }

        match result {
            Ok(items) => {
                tracing::debug!(?kind, page, count = items.len(), "fetch committed");
                self.state.commit_success(kind, page, items);
                let _ = self.loading_tx.send(self.state.is_loading);
                self.publish();
            }
            Err(error) => {
                tracing::warn!(?kind, page, %error, "fetch failed");
                self.state.commit_failure();
                // Loading clears before the error surfaces, so an observer
                // woken by the error sees consistent state.
                let _ = self.loading_tx.send(self.state.is_loading);
                let _ = self.errors_tx.send(error);
            }
        }
    }

    fn accept_pending_search(&mut self) {
        let Some(pending) = self.pending_search.take() else {
            return;
        };
        // Dedup: re-accepting the current query changes nothing.
        if pending.text == self.state.search_query {
            tracing::debug!(query = %pending.text, "search input unchanged, ignoring");
            return;
        }
        self.state.search_query = pending.text;
        tracing::debug!(query = %self.state.search_query, "search accepted");
        self.publish();
    }

    fn publish(&self) {
        let snapshot = FeedSnapshot {
            items: Arc::new(self.state.filtered()),
            search_query: self.state.search_query.clone(),
        };
        let _ = self.updates_tx.send(snapshot);
    }
}
