//! Request path classification.
//!
//! A path is first checked for exemption (static assets and the configured
//! exclude list), then for membership in the strict tier (the configured API
//! patterns). Pattern lists keep their configured order and the first match
//! wins; there is no specificity ranking.

use crate::cache::{CacheStats, LruStore};
use crate::config::ShieldConfig;
use globset::{GlobBuilder, GlobMatcher};
use std::fmt;
use tracing::{debug, trace, warn};

/// Extensions exempt without consulting any pattern list.
pub const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".map", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".ico",
];

/// Treatment selected for a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Skip sanitization entirely.
    Exempt,
    /// No HTML permitted in any string.
    Strict,
    /// Sanitize with the configured preset.
    Lenient,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Exempt => "exempt",
            Tier::Strict => "strict",
            Tier::Lenient => "lenient",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct CompiledPattern {
    source: String,
    matchers: Vec<GlobMatcher>,
}

impl CompiledPattern {
    fn compile(source: &str) -> Option<Self> {
        let mut globs = vec![source];
        // Ant-style: "/api/**" covers "/api" as well as everything below it.
        if let Some(prefix) = source.strip_suffix("/**") {
            if !prefix.is_empty() {
                globs.push(prefix);
            }
        }

        let mut matchers = Vec::with_capacity(globs.len());
        for glob in globs {
            match GlobBuilder::new(glob).literal_separator(true).build() {
                Ok(g) => matchers.push(g.compile_matcher()),
                Err(e) => {
                    warn!(
                        pattern = source,
                        error = %e,
                        "failed to compile path pattern; ignoring it"
                    );
                    return None;
                }
            }
        }

        Some(Self {
            source: source.to_string(),
            matchers,
        })
    }

    fn is_match(&self, path: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(path))
    }
}

/// Ordered list of compiled path globs.
///
/// `*` stays within one path segment, `**` spans segments. Invalid patterns
/// are logged and left out, so they never match.
pub struct PathPatterns {
    patterns: Vec<CompiledPattern>,
}

impl PathPatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| CompiledPattern::compile(p.as_ref()))
                .collect(),
        }
    }

    /// The first pattern matching `path`, in configured order.
    pub fn first_match(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.is_match(path))
            .map(|p| p.source.as_str())
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.first_match(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl fmt::Debug for PathPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.patterns.iter().map(|p| &p.source))
            .finish()
    }
}

/// Whether `path` ends with one of [`STATIC_EXTENSIONS`], ignoring case.
pub fn has_static_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Maps request paths to a [`Tier`], memoizing both decisions.
#[derive(Debug)]
pub struct PathClassifier {
    exclude: PathPatterns,
    api: PathPatterns,
    exempt_decisions: LruStore<bool>,
    strict_decisions: LruStore<bool>,
}

impl PathClassifier {
    pub fn new<E, A>(exclude_patterns: &[E], api_patterns: &[A], max_entries: usize) -> Self
    where
        E: AsRef<str>,
        A: AsRef<str>,
    {
        let exclude = PathPatterns::new(exclude_patterns);
        let api = PathPatterns::new(api_patterns);
        debug!(
            exclude = exclude.len(),
            api = api.len(),
            max_entries,
            "Path classifier ready"
        );
        Self {
            exclude,
            api,
            exempt_decisions: LruStore::new("exempt-paths", max_entries),
            strict_decisions: LruStore::new("strict-paths", max_entries),
        }
    }

    pub fn from_config(config: &ShieldConfig) -> Self {
        Self::new(
            &config.filter.exclude_patterns,
            &config.json.api_patterns,
            config.cache.path_max_entries,
        )
    }

    /// Classify `path`: exemption first, then the strict tier.
    pub fn classify(&self, path: &str) -> Tier {
        if self.is_exempt(path) {
            Tier::Exempt
        } else if self.is_strict(path) {
            Tier::Strict
        } else {
            Tier::Lenient
        }
    }

    /// Whether `path` skips filtering.
    pub fn is_exempt(&self, path: &str) -> bool {
        if has_static_extension(path) {
            return true;
        }
        if let Some(cached) = self.exempt_decisions.get(path) {
            return cached;
        }

        let matched = self.exclude.first_match(path);
        if let Some(pattern) = matched {
            trace!(path, pattern, "path exempt");
        }
        let exempt = matched.is_some();
        self.exempt_decisions.put(path, exempt);
        exempt
    }

    /// Whether `path` belongs to the strict tier.
    pub fn is_strict(&self, path: &str) -> bool {
        if let Some(cached) = self.strict_decisions.get(path) {
            return cached;
        }

        let matched = self.api.first_match(path);
        if let Some(pattern) = matched {
            trace!(path, pattern, "path in strict tier");
        }
        let strict = matched.is_some();
        self.strict_decisions.put(path, strict);
        strict
    }

    pub fn exclude_patterns(&self) -> &PathPatterns {
        &self.exclude
    }

    pub fn api_patterns(&self) -> &PathPatterns {
        &self.api
    }

    pub fn exempt_cache(&self) -> &LruStore<bool> {
        &self.exempt_decisions
    }

    pub fn strict_cache(&self) -> &LruStore<bool> {
        &self.strict_decisions
    }

    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.exempt_decisions.stats(), self.strict_decisions.stats())
    }
}

/// One-shot classification against explicit pattern lists, without caching.
pub fn classify_with<E, A>(path: &str, exclude_patterns: &[E], api_patterns: &[A]) -> Tier
where
    E: AsRef<str>,
    A: AsRef<str>,
{
    if has_static_extension(path) || PathPatterns::new(exclude_patterns).is_match(path) {
        Tier::Exempt
    } else if PathPatterns::new(api_patterns).is_match(path) {
        Tier::Strict
    } else {
        Tier::Lenient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_API_PATTERNS, DEFAULT_EXCLUDE_PATTERNS};

    fn classifier() -> PathClassifier {
        PathClassifier::new(DEFAULT_EXCLUDE_PATTERNS, DEFAULT_API_PATTERNS, 100)
    }

    #[test]
    fn test_static_extension_is_exempt() {
        let c = classifier();
        assert_eq!(c.classify("/api/theme.css"), Tier::Exempt);
        assert_eq!(c.classify("/deep/nested/APP.JS"), Tier::Exempt);
        assert!(c.exempt_cache().is_empty());
    }

    #[test]
    fn test_exclude_glob_wins_over_api() {
        let c = PathClassifier::new(&["/api/public/**"], &["/api/**"], 10);
        assert_eq!(c.classify("/api/public/info"), Tier::Exempt);
        assert_eq!(c.classify("/api/private/info"), Tier::Strict);
    }

    #[test]
    fn test_default_lists() {
        let c = classifier();
        assert_eq!(c.classify("/static/logo"), Tier::Exempt);
        assert_eq!(c.classify("/robots.txt"), Tier::Exempt);
        assert_eq!(c.classify("/api/users/1"), Tier::Strict);
        assert_eq!(c.classify("/v2/orders"), Tier::Strict);
        assert_eq!(c.classify("/board/write"), Tier::Lenient);
    }

    #[test]
    fn test_double_star_matches_bare_prefix() {
        let c = classifier();
        assert_eq!(c.classify("/api"), Tier::Strict);
        assert_eq!(c.classify("/apis"), Tier::Lenient);
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let patterns = PathPatterns::new(&["/files/*"]);
        assert!(patterns.is_match("/files/a"));
        assert!(!patterns.is_match("/files/a/b"));
    }

    #[test]
    fn test_first_match_in_configured_order() {
        let patterns = PathPatterns::new(&["/a/specific", "/a/**"]);
        assert_eq!(patterns.first_match("/a/specific"), Some("/a/specific"));
        assert_eq!(patterns.first_match("/a/other"), Some("/a/**"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let patterns = PathPatterns::new(&["/ok/**", "/bad/[", ""]);
        assert!(patterns.is_match("/ok/x"));
        assert!(!patterns.is_match("/bad/["));
    }

    #[test]
    fn test_decisions_are_cached() {
        let c = classifier();
        c.classify("/board/list");
        c.classify("/board/list");

        let (exempt, strict) = c.cache_stats();
        assert_eq!(exempt.misses, 1);
        assert_eq!(exempt.hits, 1);
        assert_eq!(strict.misses, 1);
        assert_eq!(strict.hits, 1);
    }

    #[test]
    fn test_decision_cache_is_bounded() {
        let c = PathClassifier::new(&[] as &[&str], &["/api/**"], 2);
        for path in ["/a", "/b", "/c"] {
            c.classify(path);
        }
        assert_eq!(c.strict_cache().len(), 2);
        assert!(!c.strict_cache().contains("/a"));
    }

    #[test]
    fn test_classify_with() {
        assert_eq!(classify_with("/x/site.css", &["/none"], &["/x/**"]), Tier::Exempt);
        assert_eq!(classify_with("/x/y", &["/none"], &["/x/**"]), Tier::Strict);
        assert_eq!(classify_with("/z", &["/none"], &["/x/**"]), Tier::Lenient);
    }
}
