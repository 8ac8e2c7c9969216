use super::model::ImageItem;

/// Which trigger produced a fetch. Each kind carries its own
/// "latest wins" semantics: a newer request of the same kind supersedes
/// the previous one, while different kinds may race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Fetch,
    Refresh,
    LoadMore,
}

/// Canonical list state. Owned exclusively by the controller task; every
/// mutation goes through the methods below, applied one event at a time.
#[derive(Debug, Clone)]
pub struct FeedState {
    /// The full, unfiltered list in insertion order.
    pub original_items: Vec<ImageItem>,
    /// Last successfully consumed page (1-based).
    pub current_page: u32,
    pub is_loading: bool,
    /// Set once the first page has ever landed; gates LoadMore.
    pub is_first_load_done: bool,
    /// Last accepted (post-debounce) search query.
    pub search_query: String,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            original_items: Vec::new(),
            current_page: 1,
            is_loading: false,
            is_first_load_done: false,
            search_query: String::new(),
        }
    }
}

impl FeedState {
    /// Accept or reject a trigger, returning the page it should request.
    ///
    /// `None` means the trigger is a no-op: LoadMore is ignored before the
    /// first page has landed and while a fetch is in flight, which is what
    /// prevents duplicate and premature page requests. Accepting marks the
    /// state loading; Refresh resets the page counter up front.
    pub fn accept_trigger(&mut self, kind: FlowKind) -> Option<u32> {
        let page = match kind {
            FlowKind::Fetch => 1,
            FlowKind::Refresh => {
                self.current_page = 1;
                1
            }
            FlowKind::LoadMore => {
                if !self.is_first_load_done || self.is_loading {
                    return None;
                }
                self.current_page + 1
            }
        };
        self.is_loading = true;
        Some(page)
    }

    /// Commit a successful fetch: Fetch and Refresh replace the list
    /// wholesale, LoadMore appends and advances the page counter to the
    /// page that was fetched.
    pub fn commit_success(&mut self, kind: FlowKind, page: u32, items: Vec<ImageItem>) {
        self.is_loading = false;
        self.is_first_load_done = true;
        match kind {
            FlowKind::Fetch | FlowKind::Refresh => self.original_items = items,
            FlowKind::LoadMore => {
                self.original_items.extend(items);
                self.current_page = page;
            }
        }
    }

    /// A failed fetch only clears the loading flag. The list and page
    /// counter stay as they were: a failed page is not consumed, so the
    /// next LoadMore requests the same page again.
    pub fn commit_failure(&mut self) {
        self.is_loading = false;
    }

    /// Derived projection of the items visible under the current query.
    /// Never persisted; recomputed on every state change.
    pub fn filtered(&self) -> Vec<ImageItem> {
        filter_items(&self.original_items, &self.search_query)
    }
}

/// The FilteredView rule: an empty query passes everything through in
/// order; otherwise keep items whose `author` or `id` contains the query
/// (case-sensitive).
pub(crate) fn filter_items(items: &[ImageItem], query: &str) -> Vec<ImageItem> {
    if query.is_empty() {
        return items.to_vec();
    }
    items.iter().filter(|i| i.matches(query)).cloned().collect()
}
