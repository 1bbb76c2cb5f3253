//! URL filtering: deciding which exchanges are worth keeping.

use erpeto_config::RecorderConfig;
use url::Url;

/// Decides whether a request URL is excluded from capture.
pub trait UrlFilter: Send + Sync {
    fn should_block(&self, url: &str) -> bool;
}

/// Blocks nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl UrlFilter for AllowAll {
    fn should_block(&self, _url: &str) -> bool {
        false
    }
}

/// Drops `data:` URLs, static assets, block-listed URLs and, when an origin
/// is set, every URL outside of it.
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    origin: Option<String>,
    ignored_extensions: Vec<String>,
    blocked_substrings: Vec<String>,
}

impl CaptureFilter {
    pub fn from_config(config: &RecorderConfig) -> Self {
        let origin = config
            .start_url
            .as_deref()
            .filter(|_| config.keep_only_same_origin)
            .map(origin_of);
        Self {
            origin,
            ignored_extensions: config.ignored_extensions.clone(),
            blocked_substrings: config.blocked_url_substrings.clone(),
        }
    }

    pub fn with_origin(mut self, url: &str) -> Self {
        self.origin = Some(origin_of(url));
        self
    }
}

impl UrlFilter for CaptureFilter {
    fn should_block(&self, url: &str) -> bool {
        if url.starts_with("data:") {
            return true;
        }

        let path = path_of(url);
        if self
            .ignored_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
        {
            return true;
        }

        if let Some(origin) = &self.origin
            && origin_of(url) != *origin
        {
            return true;
        }

        self.blocked_substrings
            .iter()
            .any(|blocked| url.contains(blocked.as_str()))
    }
}

/// Serialized origin of a URL, with default ports dropped. A URL that does
/// not parse, or whose origin is opaque, is its own origin.
pub fn origin_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.origin().is_tuple() => parsed.origin().ascii_serialization(),
        _ => url.to_string(),
    }
}

fn path_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> CaptureFilter {
        CaptureFilter::from_config(&RecorderConfig {
            start_url: Some("https://app.example.com/login".into()),
            blocked_url_substrings: vec!["/analytics".into()],
            ..RecorderConfig::default()
        })
    }

    #[test]
    fn origin_ignores_path_and_case() {
        assert_eq!(origin_of("HTTPS://App.example.com:8443/a?b#c"), "https://app.example.com:8443");
        assert_eq!(origin_of("https://a.com?x=1"), "https://a.com");
    }

    #[test]
    fn default_ports_share_an_origin() {
        assert_eq!(origin_of("https://a.test:443/x"), origin_of("https://a.test/"));
        assert_eq!(origin_of("http://a.test:80"), "http://a.test");
        assert_ne!(origin_of("http://a.test:8080/"), origin_of("http://a.test/"));
        assert_ne!(origin_of("https://a.test/"), origin_of("http://a.test/"));
    }

    #[test]
    fn unparsable_or_opaque_urls_are_their_own_origin() {
        assert_eq!(origin_of("not a url"), "not a url");
        assert_eq!(origin_of("about:blank"), "about:blank");
        assert_ne!(origin_of("about:blank"), origin_of("data:,x"));
    }

    #[test]
    fn same_origin_check_ignores_default_port() {
        let filter = CaptureFilter::default().with_origin("https://app.test:443/login");
        assert!(!filter.should_block("https://app.test/api"));
        assert!(filter.should_block("https://app.test:8443/api"));
    }

    #[test]
    fn blocks_data_urls_and_static_assets() {
        let filter = filter();
        assert!(filter.should_block("data:image/png;base64,AAAA"));
        assert!(filter.should_block("https://app.example.com/static/app.js"));
        assert!(filter.should_block("https://app.example.com/logo.svg?v=2"));
        assert!(!filter.should_block("https://app.example.com/api/data.json"));
    }

    #[test]
    fn blocks_other_origins() {
        let filter = filter();
        assert!(filter.should_block("https://cdn.example.com/api"));
        assert!(!filter.should_block("https://app.example.com/api"));
    }

    #[test]
    fn blocks_listed_substrings() {
        assert!(filter().should_block("https://app.example.com/analytics/collect"));
    }

    #[test]
    fn cross_origin_allowed_without_start_url() {
        let filter = CaptureFilter::from_config(&RecorderConfig::default());
        assert!(!filter.should_block("https://anything.test/"));
        assert!(filter.clone().with_origin("https://a.test/").should_block("https://b.test/"));
    }

    #[test]
    fn allow_all_blocks_nothing() {
        assert!(!AllowAll.should_block("data:,x"));
    }
}
