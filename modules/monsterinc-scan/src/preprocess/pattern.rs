//! Auto-calibrate pattern detector. URLs are grouped by a structural
//! fingerprint (locale and variable-shaped path segments collapsed, noisy
//! query values collapsed) and each fingerprint admits at most
//! `max_similar_urls` URLs per detector lifetime.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use monsterinc_common::config::AutoCalibrateConfig;

/// Locale path segments seen on real sites, beyond the two-letter codes the
/// shape check already covers.
const COMMON_LOCALES: &[&str] = &[
    "en-us", "en-gb", "en-au", "en-ca", "en-in", "es-es", "es-mx", "fr-fr", "fr-ca", "de-de",
    "de-at", "de-ch", "it-it", "pt-br", "pt-pt", "zh-cn", "zh-tw", "zh-hk", "ja-jp", "ko-kr",
    "ru-ru", "nl-nl", "pl-pl", "sv-se", "tr-tr", "ar-sa", "hi-in", "latam", "mena",
];

/// Segments that act as a locale slot without being a language code.
const SPECIAL_TOKENS: &[&str] = &[
    "root", "default", "international", "worldwide", "global", "int", "www", "web", "mobile",
    "m", "api", "app",
];

/// Common ISO 639-2/3 three-letter language codes.
const ISO639_3: &[&str] = &[
    "eng", "spa", "fra", "deu", "ita", "por", "rus", "jpn", "kor", "zho", "ara", "hin", "nld",
    "pol", "swe", "nor", "dan", "fin", "tur", "ces", "ell", "heb", "tha", "vie", "ind", "ukr",
];

/// Path-segment prefixes that mark session-style identifiers.
const SESSION_PREFIXES: &[&str] = &["sid", "session", "token", "auth", "key", "id", "uid", "ref"];

const LOCALE_SLOT: &str = "<locale>";
const VARIABLE_SLOT: &str = "<variable>";

pub struct PatternDetector {
    config: AutoCalibrateConfig,
    /// fingerprint → URLs admitted so far.
    counts: RwLock<HashMap<String, usize>>,
    compound_locale: Regex,
}

impl PatternDetector {
    pub fn new(config: AutoCalibrateConfig) -> Self {
        Self {
            config,
            counts: RwLock::new(HashMap::new()),
            compound_locale: Regex::new(r"^[A-Za-z]{2}[-_][A-Za-z]{2}$").expect("valid regex"),
        }
    }

    /// Whether this URL should be dropped because its fingerprint already
    /// admitted `max_similar_urls` URLs. Admission is counted here: a `false`
    /// return has already consumed one slot.
    pub fn should_skip(&self, url_str: &str) -> bool {
        let Ok(url) = Url::parse(url_str) else {
            // Unparseable input is the normalizer's problem, not ours.
            return false;
        };
        let fingerprint = self.fingerprint(&url);

        let mut counts = self.counts.write().expect("pattern lock poisoned");
        let count = counts.entry(fingerprint.clone()).or_insert(0);
        if *count >= self.config.max_similar_urls {
            if self.config.enable_skip_logging {
                debug!(url = url_str, %fingerprint, "URL skipped by pattern cap");
            }
            return true;
        }
        *count += 1;
        false
    }

    /// Structural equivalence class of a URL:
    /// `scheme://host[:port]/seg/seg?key=value#frag` with locale segments
    /// collapsed to `<locale>`, variable-shaped segments and query values
    /// collapsed to `<variable>`, and ignored query keys dropped.
    pub fn fingerprint(&self, url: &Url) -> String {
        let mut out = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
        if let Some(port) = url.port() {
            out.push_str(&format!(":{port}"));
        }

        for segment in url.path().split('/').filter(|s| !s.is_empty()) {
            out.push('/');
            out.push_str(self.classify_segment(segment));
        }

        let query: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| {
                let key: &str = k;
                !self.config.ignore_parameters.iter().any(|p| p == key)
            })
            .map(|(k, v)| {
                if is_variable(&v) {
                    format!("{k}={VARIABLE_SLOT}")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect();
        if !query.is_empty() {
            out.push('?');
            out.push_str(&query.join("&"));
        }

        if let Some(fragment) = url.fragment() {
            out.push('#');
            out.push_str(fragment);
        }

        out
    }

    fn classify_segment<'a>(&self, segment: &'a str) -> &'a str {
        if self.is_locale(segment) {
            LOCALE_SLOT
        } else if is_variable(segment) {
            VARIABLE_SLOT
        } else {
            segment
        }
    }

    fn is_locale(&self, segment: &str) -> bool {
        let lower = segment.to_lowercase();
        if self.config.custom_locale_codes.iter().any(|c| c.eq_ignore_ascii_case(segment)) {
            return true;
        }
        if SPECIAL_TOKENS.contains(&lower.as_str()) || COMMON_LOCALES.contains(&lower.as_str()) {
            return true;
        }
        if !self.config.auto_detect_locales {
            return false;
        }
        // ISO 639-1 / ISO 3166 alpha-2 shape, common alpha-3 codes, and
        // compound language-country codes (en-US, pt_BR).
        (lower.len() == 2 && lower.bytes().all(|b| b.is_ascii_alphabetic()))
            || ISO639_3.contains(&lower.as_str())
            || self.compound_locale.is_match(segment)
    }

    /// Forget all fingerprint counts.
    pub fn reset(&self) {
        self.counts.write().expect("pattern lock poisoned").clear();
    }

    /// Copy of the fingerprint → admitted-count map.
    pub fn stats(&self) -> HashMap<String, usize> {
        self.counts.read().expect("pattern lock poisoned").clone()
    }
}

/// Variable-shaped tokens: numeric ids, hashes, UUIDs, percent-encoded
/// blobs, long opaque identifiers, and session-style prefixes.
fn is_variable(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    if token.len() >= 8 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return true;
    }
    if is_uuid_shaped(token) {
        return true;
    }
    if token.contains('%') {
        return true;
    }
    if token.len() > 16 && token.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return true;
    }
    let lower = token.to_lowercase();
    SESSION_PREFIXES
        .iter()
        .any(|p| lower.starts_with(p) && token.len() >= p.len() + 4)
}

fn is_uuid_shaped(token: &str) -> bool {
    if token.len() != 36 {
        return false;
    }
    token.bytes().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(max_similar_urls: usize) -> PatternDetector {
        PatternDetector::new(AutoCalibrateConfig {
            max_similar_urls,
            ..AutoCalibrateConfig::default()
        })
    }

    fn fingerprint_of(d: &PatternDetector, url: &str) -> String {
        d.fingerprint(&Url::parse(url).unwrap())
    }

    #[test]
    fn numeric_segments_collapse_to_variable() {
        let d = detector(10);
        assert_eq!(
            fingerprint_of(&d, "https://example.com/item/1"),
            "https://example.com/item/<variable>"
        );
        assert_eq!(
            fingerprint_of(&d, "https://example.com/item/42"),
            fingerprint_of(&d, "https://example.com/item/1")
        );
    }

    #[test]
    fn locale_segments_collapse() {
        let d = detector(10);
        let base = fingerprint_of(&d, "https://example.com/en/docs");
        assert_eq!(base, "https://example.com/<locale>/docs");
        assert_eq!(fingerprint_of(&d, "https://example.com/fr/docs"), base);
        assert_eq!(fingerprint_of(&d, "https://example.com/en-US/docs"), base);
        assert_eq!(fingerprint_of(&d, "https://example.com/www/docs"), base);
    }

    #[test]
    fn custom_locale_codes_and_detection_toggle() {
        let d = PatternDetector::new(AutoCalibrateConfig {
            auto_detect_locales: false,
            custom_locale_codes: vec!["shop-eu".to_string()],
            ..AutoCalibrateConfig::default()
        });
        assert_eq!(
            fingerprint_of(&d, "https://example.com/shop-eu/docs"),
            "https://example.com/<locale>/docs"
        );
        // Detection off: a bare language code stays literal.
        assert_eq!(
            fingerprint_of(&d, "https://example.com/en/docs"),
            "https://example.com/en/docs"
        );
    }

    #[test]
    fn hashes_uuids_and_session_tokens_are_variable() {
        let d = detector(10);
        let expected = "https://example.com/files/<variable>";
        for seg in [
            "deadbeef01",
            "550e8400-e29b-41d4-a716-446655440000",
            "abc%20def",
            "averylongopaqueidentifier",
            "session1234",
            "token-abc-def",
        ] {
            assert_eq!(
                fingerprint_of(&d, &format!("https://example.com/files/{seg}")),
                expected,
                "segment {seg}"
            );
        }
        assert_eq!(
            fingerprint_of(&d, "https://example.com/files/readme"),
            "https://example.com/files/readme"
        );
    }

    #[test]
    fn query_keys_kept_values_collapsed() {
        let d = PatternDetector::new(AutoCalibrateConfig {
            ignore_parameters: vec!["cb".to_string()],
            ..AutoCalibrateConfig::default()
        });
        assert_eq!(
            fingerprint_of(&d, "https://example.com/search?q=rust&page=2&cb=123456"),
            "https://example.com/search?q=rust&page=<variable>"
        );
    }

    #[test]
    fn cap_admits_then_skips() {
        let d = detector(2);
        assert!(!d.should_skip("https://example.com/item/1"));
        assert!(!d.should_skip("https://example.com/item/2"));
        assert!(d.should_skip("https://example.com/item/3"));
        assert!(d.should_skip("https://example.com/item/4"));

        let stats = d.stats();
        assert_eq!(stats.get("https://example.com/item/<variable>"), Some(&2));

        d.reset();
        assert!(!d.should_skip("https://example.com/item/5"));
    }
}
