//! URL normalizer — deterministic, idempotent rewrite of raw URL strings:
//! scheme fill-in, host lowercasing (via the parser), fragment and
//! tracking-parameter stripping.

use anyhow::Result;
use url::Url;

use monsterinc_common::config::UrlNormalizationConfig;
use monsterinc_common::MonsterIncError;

/// Query keys dropped when `strip_tracking_params` is on.
const TRACKING_PARAMS: &[&str] = &["utm_source", "utm_medium", "utm_campaign", "fbclid", "gclid"];

pub struct UrlNormalizer {
    config: UrlNormalizationConfig,
}

impl UrlNormalizer {
    pub fn new(config: UrlNormalizationConfig) -> Self {
        Self { config }
    }

    /// Normalize one raw URL string. Fails with a validation error for
    /// inputs that cannot be parsed even after scheme fill-in.
    pub fn normalize(&self, raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MonsterIncError::Validation("empty URL".to_string()).into());
        }

        let mut parsed = self.parse_with_scheme(trimmed)?;
        if parsed.host_str().is_none() {
            return Err(
                MonsterIncError::Validation(format!("invalid URL (no host): {trimmed}")).into(),
            );
        }

        if self.config.strip_fragments {
            parsed.set_fragment(None);
        }

        self.strip_params(&mut parsed);

        Ok(parsed.into())
    }

    /// Parse, prepending the configured default scheme for inputs that
    /// arrive without one ("example.com/login", "localhost:8080").
    fn parse_with_scheme(&self, raw: &str) -> Result<Url> {
        let with_default = || {
            let candidate = format!("{}://{}", self.config.default_scheme, raw);
            Url::parse(&candidate)
                .map_err(|e| MonsterIncError::Validation(format!("invalid URL {raw}: {e}")).into())
        };

        match Url::parse(raw) {
            // "localhost:8080" parses as scheme "localhost" — treat any
            // non-http scheme without a host as a missing-scheme input.
            Ok(url) if url.host_str().is_none() && !url.scheme().starts_with("http") => {
                with_default()
            }
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => with_default(),
            Err(e) => Err(MonsterIncError::Validation(format!("invalid URL {raw}: {e}")).into()),
        }
    }

    fn strip_params(&self, parsed: &mut Url) {
        if parsed.query().is_none() {
            return;
        }
        let mut strips: Vec<&str> = self
            .config
            .custom_strip_params
            .iter()
            .map(String::as_str)
            .collect();
        if self.config.strip_tracking_params {
            strips.extend(TRACKING_PARAMS);
        }
        if strips.is_empty() {
            return;
        }

        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let kept: Vec<(String, String)> = pairs
            .iter()
            .filter(|(k, _)| !strips.contains(&k.as_str()))
            .cloned()
            .collect();

        // Leave the query byte-identical when nothing was stripped.
        if kept.len() == pairs.len() {
            return;
        }
        if kept.is_empty() {
            parsed.set_query(None);
        } else {
            parsed.query_pairs_mut().clear().extend_pairs(kept);
        }
    }
}
