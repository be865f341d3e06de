use crate::config::DetectionLogLevel;
use crate::context::RequestContext;
use crate::encoder::XssEncoder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::trace;

/// One class of injection syntax.
pub struct Signature {
    pub name: &'static str,
    pattern: Regex,
}

impl Signature {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).unwrap(),
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

// Evaluated in order; the first match names the detection.
static SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        Signature::new("script-tag", r"(?i)<script>(.*?)</script>"),
        Signature::new("src-single-quoted", r"(?is)src[\r\n]*=[\r\n]*'(.*?)'"),
        Signature::new("src-double-quoted", r#"(?is)src[\r\n]*=[\r\n]*"(.*?)""#),
        Signature::new("script-close", r"(?i)</script>"),
        Signature::new("script-open", r"(?is)<script(.*?)>"),
        Signature::new("eval-call", r"(?is)eval\((.*?)\)"),
        Signature::new("expression-call", r"(?is)expression\((.*?)\)"),
        Signature::new("javascript-uri", r"(?i)javascript:"),
        Signature::new("vbscript-uri", r"(?i)vbscript:"),
        Signature::new("onload-handler", r"(?is)onload(.*?)="),
        Signature::new("event-handler", r"(?i)(on[a-z]+)=[^>]+"),
        Signature::new("encoded-script-open", r"(?i)%(25)*3Cscript"),
        Signature::new("encoded-tag-close", r"(?i)%(25)*3E"),
        Signature::new("data-html-uri", r"(?i)data:text/html"),
        Signature::new("embedded-frame", r"(?i)<(?:iframe|object|embed)[^>]*>"),
    ]
});

/// Which view of the input produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Raw,
    HtmlEntity,
    Url,
    Base64,
}

impl DecodeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeStage::Raw => "raw",
            DecodeStage::HtmlEntity => "html-entity",
            DecodeStage::Url => "url",
            DecodeStage::Base64 => "base64",
        }
    }
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A positive detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub signature: &'static str,
    /// The substring that matched, taken from the decoded view.
    pub matched: String,
    pub stage: DecodeStage,
}

macro_rules! at_level {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            DetectionLogLevel::Info => tracing::info!($($arg)+),
            DetectionLogLevel::Warn => tracing::warn!($($arg)+),
            DetectionLogLevel::Error => tracing::error!($($arg)+),
        }
    };
}

/// Layered XSS pattern detector.
///
/// The signature set runs against the raw input, then against its HTML
/// entity, URL and Base64 decodings. A decoding that fails or changes nothing
/// is skipped; decoded text is only ever matched, never returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector {
    log_level: DetectionLogLevel,
}

impl PatternDetector {
    pub fn new(log_level: DetectionLogLevel) -> Self {
        Self { log_level }
    }

    pub fn log_level(&self) -> DetectionLogLevel {
        self.log_level
    }

    pub fn signatures() -> &'static [Signature] {
        &SIGNATURES
    }

    /// Check whether text contains a known attack pattern.
    pub fn detect(&self, input: &str) -> bool {
        self.inspect(input, None).is_some()
    }

    /// Name of the first signature that matched, if any.
    pub fn detect_verbose(&self, input: &str) -> Option<&'static str> {
        self.inspect(input, None).map(|d| d.signature)
    }

    /// Detect and log at the configured severity, with request details when a
    /// context is supplied.
    pub fn inspect(&self, input: &str, context: Option<&RequestContext>) -> Option<Detection> {
        let detection = Self::find(input)?;
        self.log(&detection, context);
        Some(detection)
    }

    /// Detect without logging.
    pub fn find(input: &str) -> Option<Detection> {
        if input.is_empty() {
            return None;
        }

        if let Some(found) = match_signatures(input, DecodeStage::Raw) {
            return Some(found);
        }

        let entity_decoded = XssEncoder::decode_html(input);
        if entity_decoded != input {
            if let Some(found) = match_signatures(&entity_decoded, DecodeStage::HtmlEntity) {
                return Some(found);
            }
        }

        match XssEncoder::decode_url(input) {
            Ok(url_decoded) if url_decoded != input => {
                if let Some(found) = match_signatures(&url_decoded, DecodeStage::Url) {
                    return Some(found);
                }
            }
            Ok(_) => {}
            Err(e) => trace!(error = %e, "url stage skipped"),
        }

        if XssEncoder::looks_like_base64(input) {
            match XssEncoder::decode_base64(input) {
                Ok(decoded) => {
                    if let Some(found) = match_signatures(&decoded, DecodeStage::Base64) {
                        return Some(found);
                    }
                }
                Err(e) => trace!(error = %e, "base64 stage skipped"),
            }
        }

        None
    }

    fn log(&self, detection: &Detection, context: Option<&RequestContext>) {
        match context {
            Some(ctx) => at_level!(
                self.log_level,
                path = %ctx.path,
                client_ip = ctx.client_ip.as_deref().unwrap_or("-"),
                user_agent = ctx.user_agent.as_deref().unwrap_or("-"),
                signature = detection.signature,
                matched = %detection.matched,
                stage = %detection.stage,
                "XSS pattern detected"
            ),
            None => at_level!(
                self.log_level,
                signature = detection.signature,
                matched = %detection.matched,
                stage = %detection.stage,
                "XSS pattern detected"
            ),
        }
    }
}

fn match_signatures(text: &str, stage: DecodeStage) -> Option<Detection> {
    SIGNATURES.iter().find_map(|sig| {
        sig.pattern.find(text).map(|m| Detection {
            signature: sig.name,
            matched: m.as_str().to_string(),
            stage,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> PatternDetector {
        PatternDetector::default()
    }

    #[test]
    fn test_script_injection() {
        assert!(detector().detect("<script>alert(1)</script>"));
        assert_eq!(
            detector().detect_verbose("<script>alert(1)</script>"),
            Some("script-tag")
        );
    }

    #[test]
    fn test_safe_content() {
        assert!(!detector().detect("Hello, this is safe."));
        assert!(!detector().detect("<p>Hello <strong>world</strong>!</p>"));
        assert!(!detector().detect(""));
    }

    #[test]
    fn test_event_handlers() {
        assert_eq!(
            detector().detect_verbose(r#"<body onload="init()">"#),
            Some("onload-handler")
        );
        assert_eq!(
            detector().detect_verbose("<div onmouseover=steal()>"),
            Some("event-handler")
        );
    }

    #[test]
    fn test_uri_schemes() {
        assert_eq!(
            detector().detect_verbose("JavaScript:alert(1)"),
            Some("javascript-uri")
        );
        assert_eq!(
            detector().detect_verbose("vbscript:msgbox(1)"),
            Some("vbscript-uri")
        );
    }

    #[test]
    fn test_eval_and_expression() {
        assert_eq!(detector().detect_verbose("eval(name)"), Some("eval-call"));
        assert_eq!(
            detector().detect_verbose("width: expression(alert(1))"),
            Some("expression-call")
        );
    }

    #[test]
    fn test_url_encoded_payload() {
        let found = PatternDetector::find("%3Cscript%3Ealert(1)%3C/script%3E").unwrap();
        assert_eq!(found.stage, DecodeStage::Raw);
        assert_eq!(found.signature, "encoded-script-open");

        let found = PatternDetector::find("%3Cimg%20src%3Dx%20onerror%3Dalert(1)").unwrap();
        assert_eq!(found.stage, DecodeStage::Url);
    }

    #[test]
    fn test_entity_encoded_payload() {
        let found = PatternDetector::find("&lt;script&gt;alert(1)&lt;/script&gt;").unwrap();
        assert_eq!(found.stage, DecodeStage::HtmlEntity);
        assert_eq!(found.signature, "script-tag");
        assert_eq!(found.matched, "<script>alert(1)</script>");
    }

    #[test]
    fn test_base64_payload() {
        let found = PatternDetector::find("PHNjcmlwdD5hbGVydCgxKTwvc2NyaXB0Pg==").unwrap();
        assert_eq!(found.stage, DecodeStage::Base64);
        assert_eq!(found.signature, "script-tag");
    }

    #[test]
    fn test_malformed_url_encoding_is_not_evidence() {
        assert!(!detector().detect("100% safe"));
    }

    #[test]
    fn test_signature_order() {
        let names: Vec<_> = PatternDetector::signatures().iter().map(|s| s.name).collect();
        assert_eq!(names.first(), Some(&"script-tag"));
        assert!(names.contains(&"encoded-tag-close"));
    }
}
