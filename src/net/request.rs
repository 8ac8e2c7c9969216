use reqwest::Method;
use serde_json::Value;
use url::Url;

use super::client::NetworkError;

/// Declarative description of an HTTP request.
///
/// A spec is inert data: nothing is validated until [`url`](Self::url) is
/// called at execution time, so composing one can never fail. The base URL
/// and path are concatenated textually (trailing/leading slashes are
/// normalized) rather than RFC-resolved, so a base of
/// `https://api.example.com/v2` keeps its `/v2` prefix.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub(crate) method: Method,
    pub(crate) base_url: String,
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            base_url: base_url.into(),
            path: path.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Shorthand for a GET spec.
    pub fn get(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::GET, base_url, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Attach body parameters, serialized as JSON at execution time.
    pub fn json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Compose the full request URL, appending query parameters.
    pub(crate) fn url(&self) -> Result<Url, NetworkError> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        let mut url =
            Url::parse(&joined).map_err(|_| NetworkError::InvalidUrl(joined.clone()))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_url_joins_base_and_path() {
        let spec = RequestSpec::get("https://api.example.com/v2/", "/images");
        assert_eq!(spec.url().unwrap().as_str(), "https://api.example.com/v2/images");
    }

    #[test]
    fn test_url_appends_query_params() {
        let spec = RequestSpec::get("https://api.example.com", "images")
            .query("page", "3")
            .query("limit", "100");
        assert_eq!(
            spec.url().unwrap().as_str(),
            "https://api.example.com/images?page=3&limit=100"
        );
    }

    #[test]
    fn test_unparseable_base_is_invalid_url() {
        let spec = RequestSpec::get("not a url", "/images");
        assert!(matches!(spec.url(), Err(NetworkError::InvalidUrl(_))));
    }

    #[test]
    fn test_base_path_prefix_is_preserved() {
        // RFC 3986 join would drop `/v2` for an absolute path; textual
        // concatenation keeps it.
        let spec = RequestSpec::get("https://api.example.com/v2", "/images");
        assert_eq!(spec.url().unwrap().path(), "/v2/images");
    }
}
