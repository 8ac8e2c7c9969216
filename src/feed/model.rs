use serde::Deserialize;

use crate::net::RequestSpec;

/// One row of the image feed, as served by the paging API.
///
/// Every field is optional: the API may omit or null any of them, and `id`
/// is not unique (duplicates across pages are possible). Identity in the
/// list is positional; insertion order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageItem {
    pub id: Option<String>,
    pub author: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub url: Option<String>,
    pub download_url: Option<String>,
}

impl ImageItem {
    /// Case-sensitive substring match on `author` or `id`. Missing fields
    /// never match.
    pub(crate) fn matches(&self, query: &str) -> bool {
        self.author.as_deref().is_some_and(|a| a.contains(query))
            || self.id.as_deref().is_some_and(|id| id.contains(query))
    }
}

/// Request spec for one page of the feed:
/// `GET {base}/images?page={page}&limit={limit}`.
pub(crate) fn images_page(base_url: &str, page: u32, limit: u32) -> RequestSpec {
    RequestSpec::get(base_url, "/images")
        .query("page", page.to_string())
        .query("limit", limit.to_string())
}
