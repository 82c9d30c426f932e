//! Anti-forgery token discovery in landing-page HTML

use regex::Regex;
use std::sync::OnceLock;

/// Header carrying the token on mutating requests
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// One strategy for locating a token in a page
pub trait TokenExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, html: &str) -> Option<String>;
}

/// `<meta name="csrf-token" content="...">`
pub struct MetaTagExtractor;

impl TokenExtractor for MetaTagExtractor {
    fn name(&self) -> &'static str {
        "meta-tag"
    }

    fn extract(&self, html: &str) -> Option<String> {
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = RE
            .get_or_init(|| {
                Regex::new(r#"(?i)<meta\s+name=["']csrf-token["']\s+content=["']([^"']+)["']"#).ok()
            })
            .as_ref()?;
        re.captures(html).map(|caps| caps[1].to_string())
    }
}

/// `<input type="hidden" name="_csrf" value="...">`
pub struct HiddenInputExtractor;

impl TokenExtractor for HiddenInputExtractor {
    fn name(&self) -> &'static str {
        "hidden-input"
    }

    fn extract(&self, html: &str) -> Option<String> {
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = RE
            .get_or_init(|| {
                Regex::new(r#"(?i)<input[^>]*name=["']_csrf[^>]*value=["']([^"']+)["']"#).ok()
            })
            .as_ref()?;
        re.captures(html).map(|caps| caps[1].to_string())
    }
}

/// Ordered list of strategies; the first match wins
pub struct CsrfExtractor {
    strategies: Vec<Box<dyn TokenExtractor>>,
}

impl CsrfExtractor {
    pub fn new(strategies: Vec<Box<dyn TokenExtractor>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, html: &str) -> Option<String> {
        self.strategies.iter().find_map(|strategy| {
            let token = strategy.extract(html)?;
            log::debug!("CSRF token found via {}", strategy.name());
            Some(token)
        })
    }
}

impl Default for CsrfExtractor {
    fn default() -> Self {
        Self::new(vec![Box::new(MetaTagExtractor), Box::new(HiddenInputExtractor)])
    }
}
