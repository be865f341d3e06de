//! # XSS Shield
//!
//! Policy-driven Cross-Site Scripting (XSS) protection for request input.
//!
//! ## Features
//!
//! - ✅ **Allow-list Sanitization** - Strict, Normal, Lenient and Form policies
//! - ✅ **Layered Detection** - Raw, HTML-entity, URL and Base64 views of the input
//! - ✅ **Path Classification** - Exempt, strict (API) and lenient tiers from globs
//! - ✅ **Bounded Caches** - Per-policy LRU result caches and path decision caches
//! - ✅ **Error Policy** - Throw, log-and-continue, or return-original on failure
//! - ✅ **Field Overrides** - Declared fields and parameters keep their raw value
//!
//! ## Quick Start
//!
//! ```rust
//! use xss_shield::{PolicyId, RequestContext, ShieldConfig, XssShield};
//!
//! let shield = XssShield::new(ShieldConfig::default());
//!
//! // Policies directly
//! let clean = shield.sanitize(PolicyId::Normal, "<p>Hello</p><script>alert(1)</script>").unwrap();
//! assert_eq!(clean, "<p>Hello</p>");
//!
//! // Per request: the path selects the tier
//! let scope = shield.begin_request(RequestContext::new("/api/users"));
//! assert_eq!(scope.sanitize_param("name", "<b>bob</b>").unwrap(), "bob");
//! ```
//!
//! ## Policies
//!
//! ```rust
//! use xss_shield::{PolicyId, XssSanitizer};
//!
//! let sanitizer = XssSanitizer::new();
//!
//! // Links keep safe protocols and gain rel="nofollow"
//! assert_eq!(
//!     sanitizer.sanitize(PolicyId::Normal, r#"<a href="http://example.com">link</a>"#).unwrap(),
//!     r#"<a href="http://example.com" rel="nofollow">link</a>"#
//! );
//!
//! // Strict keeps text only
//! assert_eq!(sanitizer.sanitize(PolicyId::Strict, "<b>x</b>").unwrap(), "x");
//! ```
//!
//! ## Path Classification
//!
//! ```rust
//! use xss_shield::{ShieldConfig, Tier, XssShield};
//!
//! let shield = XssShield::new(ShieldConfig::default());
//!
//! assert_eq!(shield.classify("/css/site.css"), Tier::Exempt);
//! assert_eq!(shield.classify("/api/orders"), Tier::Strict);
//! assert_eq!(shield.classify("/board/write"), Tier::Lenient);
//! ```
//!
//! ## Detection
//!
//! ```rust
//! use xss_shield::{DecodeStage, PatternDetector};
//!
//! let detector = PatternDetector::default();
//! assert!(detector.detect("<img src=x onerror=alert(1)>"));
//! assert!(!detector.detect("<p>Hello World</p>"));
//!
//! // Encoded payloads are found through their decoded view
//! let found = PatternDetector::find("&lt;script&gt;alert(1)&lt;/script&gt;").unwrap();
//! assert_eq!(found.stage, DecodeStage::HtmlEntity);
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use xss_shield::{ErrorMode, PolicyLevel, ShieldConfig};
//!
//! let config = ShieldConfig::from_toml_str(r#"
//!     policy-level = "lenient"
//!     on-error = "THROW_EXCEPTION"
//!
//!     [cache]
//!     sanitize-enabled = true
//! "#).unwrap();
//!
//! assert_eq!(config.policy_level, PolicyLevel::Lenient);
//! assert_eq!(config.on_error, ErrorMode::Throw);
//! assert!(config.cache.sanitize_enabled);
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod error_policy;
pub mod metrics;
pub mod overrides;
pub mod policy;
pub mod sanitizer;
pub mod shield;

pub use cache::{CacheStats, LruStore};
pub use classifier::{PathClassifier, PathPatterns, Tier, classify_with};
pub use config::{
    CacheConfig, DetectionConfig, DetectionLogLevel, ErrorMode, FilterConfig, JsonConfig,
    PolicyLevel, ShieldConfig,
};
pub use context::RequestContext;
pub use detector::{DecodeStage, Detection, PatternDetector, Signature};
pub use encoder::XssEncoder;
pub use error::{Result, XssError};
pub use error_policy::on_failure;
pub use metrics::{MetricsSnapshot, ShieldMetrics};
pub use overrides::{HasSanitizationOverride, OverrideSchema, OverrideSource, OverrideTable};
pub use policy::{ContentPolicy, HtmlPolicy, HtmlPolicyBuilder, PolicyId, PolicySet};
pub use sanitizer::XssSanitizer;
pub use shield::{RequestScope, XssShield};
