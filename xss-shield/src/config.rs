//! Shield configuration.
//!
//! Every section has serde defaults, so a partial TOML or JSON document is a
//! valid configuration. Out-of-range values are corrected by
//! [`ShieldConfig::validate`] rather than rejected.

use crate::error::{Result, XssError};
use crate::policy::PolicyId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};

/// Default capacity of each per-policy sanitize cache.
pub const DEFAULT_SANITIZE_MAX_ENTRIES: usize = 1000;

/// Default capacity of the path decision caches.
pub const DEFAULT_PATH_MAX_ENTRIES: usize = 10_000;

/// Paths that select the strict tier when none are configured.
pub const DEFAULT_API_PATTERNS: &[&str] = &["/api/**", "/v1/**", "/v2/**"];

/// Paths exempt from filtering out of the box.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "/static/**",
    "/assets/**",
    "/css/**",
    "/scss/**",
    "/js/**",
    "/fonts/**",
    "/img/**",
    "/images/**",
    "/favicon.ico",
    "/favicon/**",
    "/robots.txt",
    "/humans.txt",
    "/manifest.json",
    "/sitemap.xml",
    "/webjars/**",
    "/plugins/**",
    "/swagger-ui/**",
    "/v3/api-docs/**",
    "/h2-console/**",
    "/csp-report",
    "**/*.css",
    "**/*.js",
    "**/*.map",
    "**/*.png",
    "**/*.jpg",
    "**/*.jpeg",
    "**/*.gif",
    "**/*.webp",
    "**/*.svg",
    "**/*.ico",
];

/// Sanitization strength preset for content outside the strict tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyLevel {
    #[serde(alias = "STRICT")]
    Strict,
    #[default]
    #[serde(alias = "NORMAL")]
    Normal,
    #[serde(alias = "LENIENT")]
    Lenient,
}

impl PolicyLevel {
    /// Policy applied to structured-payload fields on non-strict paths.
    pub fn policy(self) -> PolicyId {
        match self {
            PolicyLevel::Strict => PolicyId::Strict,
            PolicyLevel::Normal => PolicyId::Normal,
            PolicyLevel::Lenient => PolicyId::Lenient,
        }
    }
}

impl FromStr for PolicyLevel {
    type Err = XssError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(PolicyLevel::Strict),
            "normal" => Ok(PolicyLevel::Normal),
            "lenient" => Ok(PolicyLevel::Lenient),
            other => Err(XssError::InvalidConfig(format!("unknown policy level '{}'", other))),
        }
    }
}

/// What happens when a policy transform fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    /// Propagate the failure and abort the enclosing request.
    #[serde(alias = "THROW_EXCEPTION")]
    Throw,
    /// Log at error severity, then return the original value.
    #[default]
    #[serde(alias = "LOG_AND_CONTINUE")]
    LogAndContinue,
    /// Return the original value without logging.
    #[serde(alias = "RETURN_ORIGINAL")]
    ReturnOriginal,
}

impl FromStr for ErrorMode {
    type Err = XssError;

    /// Accepts the kebab-case names as well as the upper-case aliases.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "throw" | "throw-exception" => Ok(ErrorMode::Throw),
            "log-and-continue" => Ok(ErrorMode::LogAndContinue),
            "return-original" => Ok(ErrorMode::ReturnOriginal),
            other => Err(XssError::InvalidConfig(format!("unknown error mode '{}'", other))),
        }
    }
}

/// Severity of detection log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLogLevel {
    #[serde(alias = "INFO")]
    Info,
    #[default]
    #[serde(alias = "WARN")]
    Warn,
    #[serde(alias = "ERROR")]
    Error,
}

/// Request-parameter filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FilterConfig {
    pub enabled: bool,
    /// Glob patterns for paths that skip filtering entirely.
    pub exclude_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Structured-payload string field filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct JsonConfig {
    pub enabled: bool,
    /// Glob patterns for paths whose values may carry no HTML at all.
    pub api_patterns: Vec<String>,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_patterns: DEFAULT_API_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Memoize sanitize results per policy.
    pub sanitize_enabled: bool,
    pub sanitize_max_entries: usize,
    /// Capacity of each path decision cache.
    pub path_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sanitize_enabled: false,
            sanitize_max_entries: DEFAULT_SANITIZE_MAX_ENTRIES,
            path_max_entries: DEFAULT_PATH_MAX_ENTRIES,
        }
    }
}

/// Pattern detection. Detection only logs and counts; it never changes the
/// sanitized value or the policy choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DetectionConfig {
    pub enabled: bool,
    pub log_level: DetectionLogLevel,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: DetectionLogLevel::Warn,
        }
    }
}

/// Top-level shield configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ShieldConfig {
    /// Global switch. When false every value passes through untouched.
    pub enabled: bool,
    pub filter: FilterConfig,
    pub json: JsonConfig,
    pub cache: CacheConfig,
    pub detection: DetectionConfig,
    pub policy_level: PolicyLevel,
    pub on_error: ErrorMode,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: FilterConfig::default(),
            json: JsonConfig::default(),
            cache: CacheConfig::default(),
            detection: DetectionConfig::default(),
            policy_level: PolicyLevel::default(),
            on_error: ErrorMode::default(),
        }
    }
}

impl ShieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| XssError::ConfigParse(format!("TOML parse error: {}", e)))
    }

    /// Parse a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| XssError::ConfigParse(format!("JSON parse error: {}", e)))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_filter_enabled(mut self, enabled: bool) -> Self {
        self.filter.enabled = enabled;
        self
    }

    pub fn with_json_enabled(mut self, enabled: bool) -> Self {
        self.json.enabled = enabled;
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.filter.exclude_patterns = patterns;
        self
    }

    pub fn with_api_patterns(mut self, patterns: Vec<String>) -> Self {
        self.json.api_patterns = patterns;
        self
    }

    pub fn with_sanitize_cache(mut self, enabled: bool, max_entries: usize) -> Self {
        self.cache.sanitize_enabled = enabled;
        self.cache.sanitize_max_entries = max_entries;
        self
    }

    pub fn with_path_cache_entries(mut self, max_entries: usize) -> Self {
        self.cache.path_max_entries = max_entries;
        self
    }

    pub fn with_detection(mut self, enabled: bool, log_level: DetectionLogLevel) -> Self {
        self.detection.enabled = enabled;
        self.detection.log_level = log_level;
        self
    }

    pub fn with_policy_level(mut self, level: PolicyLevel) -> Self {
        self.policy_level = level;
        self
    }

    pub fn with_on_error(mut self, mode: ErrorMode) -> Self {
        self.on_error = mode;
        self
    }

    /// Correct out-of-range values to their documented defaults.
    ///
    /// Each correction is logged at warn level; none of them is fatal.
    pub fn validate(mut self) -> Self {
        if self.cache.sanitize_max_entries < 1 {
            warn!(
                value = self.cache.sanitize_max_entries,
                default = DEFAULT_SANITIZE_MAX_ENTRIES,
                "cache.sanitize-max-entries is less than 1, using default"
            );
            self.cache.sanitize_max_entries = DEFAULT_SANITIZE_MAX_ENTRIES;
        }

        if self.cache.path_max_entries < 1 {
            warn!(
                value = self.cache.path_max_entries,
                default = DEFAULT_PATH_MAX_ENTRIES,
                "cache.path-max-entries is less than 1, using default"
            );
            self.cache.path_max_entries = DEFAULT_PATH_MAX_ENTRIES;
        }

        self.filter.exclude_patterns = drop_blank(self.filter.exclude_patterns, "filter.exclude-patterns");
        self.json.api_patterns = drop_blank(self.json.api_patterns, "json.api-patterns");

        if self.json.api_patterns.is_empty() {
            info!(
                defaults = ?DEFAULT_API_PATTERNS,
                "json.api-patterns is empty, applying default patterns"
            );
            self.json.api_patterns = DEFAULT_API_PATTERNS.iter().map(|p| p.to_string()).collect();
        }

        self
    }
}

fn drop_blank(patterns: Vec<String>, key: &str) -> Vec<String> {
    let before = patterns.len();
    let kept: Vec<String> = patterns
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if kept.len() != before {
        warn!(key, dropped = before - kept.len(), "ignoring blank path patterns");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShieldConfig::new();
        assert!(config.enabled);
        assert!(config.filter.enabled);
        assert!(config.json.enabled);
        assert!(!config.cache.sanitize_enabled);
        assert_eq!(config.cache.sanitize_max_entries, 1000);
        assert_eq!(config.cache.path_max_entries, 10_000);
        assert_eq!(config.policy_level, PolicyLevel::Normal);
        assert_eq!(config.on_error, ErrorMode::LogAndContinue);
        assert_eq!(config.detection.log_level, DetectionLogLevel::Warn);
        assert!(config.filter.exclude_patterns.contains(&"**/*.css".to_string()));
    }

    #[test]
    fn test_validate_corrects_capacities() {
        let config = ShieldConfig::new()
            .with_sanitize_cache(true, 0)
            .with_path_cache_entries(0)
            .validate();

        assert_eq!(config.cache.sanitize_max_entries, DEFAULT_SANITIZE_MAX_ENTRIES);
        assert_eq!(config.cache.path_max_entries, DEFAULT_PATH_MAX_ENTRIES);
    }

    #[test]
    fn test_validate_restores_api_patterns() {
        let config = ShieldConfig::new()
            .with_api_patterns(vec!["  ".to_string()])
            .validate();

        assert_eq!(config.json.api_patterns, vec!["/api/**", "/v1/**", "/v2/**"]);
    }

    #[test]
    fn test_validate_trims_patterns() {
        let config = ShieldConfig::new()
            .with_exclude_patterns(vec![" /public/** ".to_string(), String::new()])
            .validate();

        assert_eq!(config.filter.exclude_patterns, vec!["/public/**"]);
    }

    #[test]
    fn test_from_toml() {
        let config = ShieldConfig::from_toml_str(
            r#"
            policy-level = "lenient"
            on-error = "THROW_EXCEPTION"

            [cache]
            sanitize-enabled = true
            sanitize-max-entries = 50

            [detection]
            log-level = "error"
            "#,
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.policy_level, PolicyLevel::Lenient);
        assert_eq!(config.on_error, ErrorMode::Throw);
        assert!(config.cache.sanitize_enabled);
        assert_eq!(config.cache.sanitize_max_entries, 50);
        assert_eq!(config.cache.path_max_entries, DEFAULT_PATH_MAX_ENTRIES);
        assert_eq!(config.detection.log_level, DetectionLogLevel::Error);
    }

    #[test]
    fn test_from_json() {
        let config = ShieldConfig::from_json_str(
            r#"{"enabled": false, "json": {"api-patterns": ["/rpc/**"]}}"#,
        )
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.json.api_patterns, vec!["/rpc/**"]);
        assert!(config.json.enabled);
    }

    #[test]
    fn test_enum_from_str() {
        assert_eq!("LENIENT".parse::<PolicyLevel>().unwrap(), PolicyLevel::Lenient);
        assert_eq!("THROW_EXCEPTION".parse::<ErrorMode>().unwrap(), ErrorMode::Throw);
        assert_eq!("return-original".parse::<ErrorMode>().unwrap(), ErrorMode::ReturnOriginal);
        assert!(matches!(
            "paranoid".parse::<PolicyLevel>(),
            Err(XssError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        let err = ShieldConfig::from_toml_str("policy-level = 3").unwrap_err();
        assert!(matches!(err, XssError::ConfigParse(_)));
    }
}
