use bytes::Bytes;
use futures::StreamExt;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to an in-flight transfer for one URL key.
struct DownloadTask {
    join: JoinHandle<()>,
    /// `true` while the transfer is held between body chunks.
    paused: watch::Sender<bool>,
}

/// Shared tables, mutated from the caller's thread and from every transfer
/// task's completion path. Lock order: never hold both locks at once.
struct Shared {
    cache: Mutex<LruCache<String, Bytes>>,
    tasks: Mutex<HashMap<String, DownloadTask>>,
}

/// Deduplicating, pausable image downloader with a bounded in-memory cache.
///
/// Keys are absolute URL strings. The invariant this type exists to hold:
/// at most one transfer is in flight per key at any time. A second
/// `download` for a key that is already transferring resumes the existing
/// transfer instead of starting another.
///
/// The cache is LRU-bounded (the reference behavior was an unbounded cache
/// left to memory pressure; bounding it is a deliberate strengthening).
pub struct ImageCache {
    http: reqwest::Client,
    shared: Arc<Shared>,
}

/// Recover the guard from a poisoned mutex. The tables stay coherent under
/// poisoning: a panicked transfer task leaves at worst a stale entry.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ImageCache {
    /// `capacity` is the maximum number of cached images; values below 1
    /// are clamped to 1.
    pub fn new(http: reqwest::Client, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            http,
            shared: Arc::new(Shared {
                cache: Mutex::new(LruCache::new(capacity)),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Synchronous cache lookup. Never triggers a download. A hit counts
    /// as a use for LRU ordering.
    pub fn get_cached(&self, url: &str) -> Option<Bytes> {
        lock(&self.shared.cache).get(url).cloned()
    }

    /// Fetch the image for `url`, invoking `on_complete` exactly once with
    /// either the image bytes or `placeholder`.
    ///
    /// - Cache hit: `on_complete` runs synchronously with the cached bytes.
    /// - Transfer already in flight for this URL: the transfer is resumed
    ///   (a running one is unaffected) and `on_complete` is dropped; the
    ///   original caller's callback fires when the transfer finishes.
    /// - Otherwise a transfer is started. Success stores the bytes in the
    ///   cache; failure hands back `placeholder` and caches nothing. The
    ///   in-flight entry is removed on every exit path before the callback
    ///   runs, so a re-`download` after failure starts a fresh transfer.
    pub fn download(
        &self,
        url: &str,
        placeholder: Bytes,
        on_complete: impl FnOnce(Bytes) + Send + 'static,
    ) {
        if let Some(cached) = self.get_cached(url) {
            on_complete(cached);
            return;
        }

        let mut tasks = lock(&self.shared.tasks);
        if let Some(task) = tasks.get(url) {
            // Dedup invariant: one transfer per key. Continue it if paused.
            let _ = task.paused.send(false);
            tracing::debug!(url, "download already in flight, resuming");
            return;
        }

        let (paused_tx, paused_rx) = watch::channel(false);
        let http = self.http.clone();
        let shared = Arc::clone(&self.shared);
        let key = url.to_string();
        let task_key = key.clone();

        tracing::debug!(url, "starting image download");
        let join = tokio::spawn(async move {
            let result = transfer(&http, &task_key, paused_rx).await;

            // Bookkeeping before delivery: the in-flight entry must be gone
            // on every exit path by the time the caller observes completion.
            lock(&shared.tasks).remove(&task_key);

            match result {
                Ok(bytes) => {
                    lock(&shared.cache).put(task_key, bytes.clone());
                    on_complete(bytes);
                }
                Err(error) => {
                    tracing::warn!(url = %task_key, %error, "image download failed, serving placeholder");
                    on_complete(placeholder);
                }
            }
        });

        // The task's completion path takes the tasks lock we still hold,
        // so the entry is registered before the task can complete.
        tasks.insert(key, DownloadTask { join, paused: paused_tx });
    }

    /// Suspend the in-flight transfer for `url`, if any. The handle and its
    /// progress are kept; cache bookkeeping is unaffected.
    pub fn pause(&self, url: &str) {
        if let Some(task) = lock(&self.shared.tasks).get(url) {
            let _ = task.paused.send(true);
            tracing::trace!(url, "download paused");
        }
    }

    /// Continue a previously paused transfer for `url`, if any.
    pub fn resume(&self, url: &str) {
        if let Some(task) = lock(&self.shared.tasks).get(url) {
            let _ = task.paused.send(false);
            tracing::trace!(url, "download resumed");
        }
    }

    /// Abort and forget the in-flight transfer for `url`. No completion
    /// callback fires.
    pub fn cancel(&self, url: &str) {
        if let Some(task) = lock(&self.shared.tasks).remove(url) {
            task.join.abort();
            tracing::debug!(url, "download cancelled");
        }
    }
}

#[derive(Debug, Error)]
enum TransferError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("empty response body")]
    Empty,
}

/// Stream the image body, yielding to the pause gate between chunks.
///
/// Pausing stalls the read loop without dropping the connection, so a
/// resumed transfer continues from where it stopped.
async fn transfer(
    http: &reqwest::Client,
    url: &str,
    mut paused: watch::Receiver<bool>,
) -> Result<Bytes, TransferError> {
    wait_while_paused(&mut paused).await;

    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::Status(status.as_u16()));
    }

    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    loop {
        wait_while_paused(&mut paused).await;
        match stream.next().await {
            Some(chunk) => body.extend_from_slice(&chunk?),
            None => break,
        }
    }

    if body.is_empty() {
        return Err(TransferError::Empty);
    }
    Ok(Bytes::from(body))
}

/// Wait until the pause gate reads `false`. A closed channel counts as
/// resumed so an orphaned transfer can still finish.
async fn wait_while_paused(paused: &mut watch::Receiver<bool>) {
    while *paused.borrow_and_update() {
        if paused.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMAGE_BYTES: &[u8] = b"\x89PNG fake image payload";
    const PLACEHOLDER: &[u8] = b"placeholder";

    fn placeholder() -> Bytes {
        Bytes::from_static(PLACEHOLDER)
    }

    /// Start a download and get a channel that yields its completion.
    fn download_collect(cache: &ImageCache, url: &str) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        cache.download(url, placeholder(), move |bytes| {
            let _ = tx.send(bytes);
        });
        rx
    }

    async fn image_server(delay: Option<Duration>) -> MockServer {
        let server = MockServer::start().await;
        let mut template = ResponseTemplate::new(200).set_body_bytes(IMAGE_BYTES);
        if let Some(delay) = delay {
            template = template.set_delay(delay);
        }
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(template)
            .expect(1) // The dedup/cache invariant: one transfer, ever
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_download_then_cached_hit() {
        let server = image_server(None).await;
        let cache = ImageCache::new(reqwest::Client::new(), 16);
        let url = format!("{}/img.png", server.uri());

        assert!(cache.get_cached(&url).is_none());

        let mut rx = download_collect(&cache, &url);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(IMAGE_BYTES));

        // Second download is served synchronously from the cache; the mock's
        // expect(1) proves no second transfer happened.
        let mut rx = download_collect(&cache, &url);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(IMAGE_BYTES));
        assert_eq!(cache.get_cached(&url), Some(Bytes::from_static(IMAGE_BYTES)));
    }

    #[tokio::test]
    async fn test_concurrent_downloads_share_one_transfer() {
        let server = image_server(Some(Duration::from_millis(200))).await;
        let cache = ImageCache::new(reqwest::Client::new(), 16);
        let url = format!("{}/img.png", server.uri());

        let mut first = download_collect(&cache, &url);
        // Second call lands while the first transfer is still in flight.
        let mut second = download_collect(&cache, &url);

        assert_eq!(first.recv().await.unwrap(), Bytes::from_static(IMAGE_BYTES));
        // The deduplicated caller's callback was dropped, not queued.
        assert!(second.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_download_degrades_to_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = ImageCache::new(reqwest::Client::new(), 16);
        let url = format!("{}/missing.png", server.uri());

        let mut rx = download_collect(&cache, &url);
        assert_eq!(rx.recv().await.unwrap(), placeholder());
        // Failures are never cached.
        assert!(cache.get_cached(&url).is_none());
    }

    #[tokio::test]
    async fn test_pause_resume_completes_exactly_once() {
        let server = image_server(Some(Duration::from_millis(100))).await;
        let cache = ImageCache::new(reqwest::Client::new(), 16);
        let url = format!("{}/img.png", server.uri());

        let mut rx = download_collect(&cache, &url);
        cache.pause(&url);

        // Long enough for the response to have arrived; the paused gate
        // must hold the transfer open instead of completing it.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());

        cache.resume(&url);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(IMAGE_BYTES));

        // No duplicate delivery afterwards.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_suppresses_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(IMAGE_BYTES)
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let cache = ImageCache::new(reqwest::Client::new(), 16);
        let url = format!("{}/img.png", server.uri());

        let mut rx = download_collect(&cache, &url);
        cache.cancel(&url);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err(), "cancelled download must not call back");
        assert!(cache.get_cached(&url).is_none());

        // The key is free again: a new download starts a fresh transfer.
        let mut rx = download_collect(&cache, &url);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(IMAGE_BYTES));
    }

    #[tokio::test]
    async fn test_pause_resume_on_unknown_url_is_a_noop() {
        let cache = ImageCache::new(reqwest::Client::new(), 16);
        cache.pause("https://example.com/nothing.png");
        cache.resume("https://example.com/nothing.png");
        cache.cancel("https://example.com/nothing.png");
    }

    #[tokio::test]
    async fn test_lru_evicts_oldest_entry() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{name}.png")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(name.as_bytes()))
                .mount(&server)
                .await;
        }

        let cache = ImageCache::new(reqwest::Client::new(), 2);
        for name in ["a", "b", "c"] {
            let url = format!("{}/{name}.png", server.uri());
            let mut rx = download_collect(&cache, &url);
            rx.recv().await.unwrap();
        }

        // Capacity 2: "a" was evicted when "c" landed.
        assert!(cache.get_cached(&format!("{}/a.png", server.uri())).is_none());
        assert!(cache.get_cached(&format!("{}/b.png", server.uri())).is_some());
        assert!(cache.get_cached(&format!("{}/c.png", server.uri())).is_some());
    }
}
