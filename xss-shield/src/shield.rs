use crate::classifier::{PathClassifier, Tier};
use crate::config::ShieldConfig;
use crate::context::RequestContext;
use crate::detector::{Detection, PatternDetector};
use crate::error::{Result, XssError};
use crate::error_policy;
use crate::metrics::ShieldMetrics;
use crate::overrides::{self, HasSanitizationOverride, OverrideSchema, OverrideSource, OverrideTable};
use crate::policy::{PolicyId, PolicySet};
use crate::sanitizer::XssSanitizer;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, trace};

/// Entry point tying classification, detection, sanitization and the error
/// policy together.
///
/// A shield is built once from a [`ShieldConfig`] and shared (typically in an
/// `Arc`) by every request. Per-request work goes through a
/// [`RequestScope`] obtained from [`XssShield::begin_request`].
pub struct XssShield {
    config: ShieldConfig,
    sanitizer: XssSanitizer,
    detector: PatternDetector,
    classifier: PathClassifier,
    metrics: Option<Arc<ShieldMetrics>>,
    param_overrides: Arc<dyn OverrideSource>,
    field_overrides: Arc<dyn OverrideSource>,
}

impl XssShield {
    /// Build a shield. The configuration is validated first; out-of-range
    /// values are corrected and logged.
    pub fn new(config: ShieldConfig) -> Self {
        let config = config.validate();
        let sanitizer = XssSanitizer::from_config(&config);
        let detector = PatternDetector::new(config.detection.log_level);
        let classifier = PathClassifier::from_config(&config);

        info!(
            enabled = config.enabled,
            policy_level = ?config.policy_level,
            on_error = ?config.on_error,
            sanitize_cache = config.cache.sanitize_enabled,
            "XSS shield initialized"
        );

        Self {
            config,
            sanitizer,
            detector,
            classifier,
            metrics: None,
            param_overrides: Arc::new(OverrideTable::new()),
            field_overrides: Arc::new(OverrideTable::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ShieldMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the policies. Only meant for startup; cached results are dropped.
    ///
    /// The configured level still applies: under [`PolicyLevel::Strict`] the
    /// form policy is replaced by the strict one.
    ///
    /// [`PolicyLevel::Strict`]: crate::config::PolicyLevel::Strict
    pub fn with_policies(mut self, policies: PolicySet) -> Self {
        let policies = policies.restricted_to(self.config.policy_level);
        self.sanitizer = self.sanitizer.with_policies(policies);
        self
    }

    pub fn with_param_overrides(mut self, source: impl OverrideSource + 'static) -> Self {
        self.param_overrides = Arc::new(source);
        self
    }

    pub fn with_field_overrides(mut self, source: impl OverrideSource + 'static) -> Self {
        self.field_overrides = Arc::new(source);
        self
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn sanitizer(&self) -> &XssSanitizer {
        &self.sanitizer
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    pub fn detector(&self) -> &PatternDetector {
        &self.detector
    }

    pub fn metrics(&self) -> Option<&Arc<ShieldMetrics>> {
        self.metrics.as_ref()
    }

    /// Policy applied to structured-payload fields outside the strict tier.
    pub fn preset(&self) -> PolicyId {
        self.config.policy_level.policy()
    }

    pub fn classify(&self, path: &str) -> Tier {
        self.classifier.classify(path)
    }

    /// Check `input` for attack patterns, logging a hit at the configured
    /// level.
    pub fn detect(&self, input: &str) -> bool {
        self.inspect_with(input, None).is_some()
    }

    pub fn sanitize(&self, policy: PolicyId, input: &str) -> Result<String> {
        self.sanitizer.sanitize(policy, input)
    }

    /// Resolve a sanitization failure with the configured error mode.
    pub fn on_failure(&self, err: XssError, original: &str) -> Result<String> {
        error_policy::on_failure(self.config.on_error, err, original)
    }

    /// Whether `identifier` is declared as a raw parameter or field.
    pub fn is_overridden(&self, identifier: &str) -> bool {
        overrides::is_overridden(self.param_overrides.as_ref(), identifier)
            || overrides::is_overridden(self.field_overrides.as_ref(), identifier)
    }

    /// True when `input` shows no attack pattern and the preset policy
    /// leaves it untouched.
    pub fn is_safe_string(&self, input: &str) -> bool {
        if self.inspect_with(input, None).is_some() {
            return false;
        }
        matches!(self.sanitize(self.preset(), input), Ok(clean) if clean == input)
    }

    pub fn escape(&self, input: &str) -> String {
        self.sanitizer.escape(input)
    }

    /// Sanitize with the preset, then escape for embedding as text.
    pub fn to_safe_output(&self, input: Option<&str>) -> Result<String> {
        self.sanitizer.to_safe_output(self.preset(), input)
    }

    /// Open the per-request scope for `context`. The path is classified once.
    pub fn begin_request(&self, context: RequestContext) -> RequestScope<'_> {
        let tier = self.classify(&context.path);
        trace!(path = %context.path, tier = %tier, "request scope opened");
        RequestScope {
            shield: self,
            context,
            tier,
        }
    }

    fn inspect_with(&self, input: &str, context: Option<&RequestContext>) -> Option<Detection> {
        let detection = self.detector.inspect(input, context)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_pattern_detected();
        }
        Some(detection)
    }

    fn sanitize_or_recover(&self, policy: PolicyId, value: &str) -> Result<String> {
        match self.sanitizer.sanitize(policy, value) {
            Ok(clean) => {
                self.record_sanitized(policy);
                Ok(clean)
            }
            Err(e) => self.on_failure(e, value),
        }
    }

    fn record_sanitized(&self, policy: PolicyId) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        match policy {
            PolicyId::Strict => metrics.record_strict_sanitized(),
            PolicyId::Form => metrics.record_form_sanitized(),
            PolicyId::Normal | PolicyId::Lenient => metrics.record_sanitized(),
        }
    }

    fn record_override(&self, surface: Surface) {
        if let Some(metrics) = &self.metrics {
            match surface {
                Surface::Param => metrics.record_param_override_skipped(),
                Surface::Field => metrics.record_field_override_skipped(),
            }
        }
    }
}

impl fmt::Debug for XssShield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XssShield")
            .field("config", &self.config)
            .field("sanitizer", &self.sanitizer)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
enum Surface {
    Param,
    Field,
}

/// Sanitization for one request.
///
/// The scope owns the request's [`RequestContext`]; detections logged through
/// it carry the request path, client address and user agent. The context is
/// released when the scope is dropped, on every exit path.
pub struct RequestScope<'a> {
    shield: &'a XssShield,
    context: RequestContext,
    tier: Tier,
}

impl<'a> RequestScope<'a> {
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Policy applied to query and form parameters.
    pub fn param_policy(&self) -> PolicyId {
        match self.tier {
            Tier::Strict => PolicyId::Strict,
            _ => PolicyId::Form,
        }
    }

    /// Policy applied to structured-payload string fields.
    pub fn field_policy(&self) -> PolicyId {
        match self.tier {
            Tier::Strict => PolicyId::Strict,
            _ => self.shield.preset(),
        }
    }

    fn params_active(&self) -> bool {
        let config = &self.shield.config;
        config.enabled && config.filter.enabled && self.tier != Tier::Exempt
    }

    fn fields_active(&self) -> bool {
        let config = &self.shield.config;
        config.enabled && config.json.enabled && self.tier != Tier::Exempt
    }

    /// Detect attack patterns in `value`, logging with this request's context.
    /// Returns `None` when detection is switched off.
    pub fn inspect(&self, value: &str) -> Option<Detection> {
        let config = &self.shield.config;
        if !config.enabled || !config.detection.enabled {
            return None;
        }
        self.shield.inspect_with(value, Some(&self.context))
    }

    /// Sanitize one request parameter.
    pub fn sanitize_param(&self, name: &str, value: &str) -> Result<String> {
        if !self.params_active() {
            return Ok(value.to_string());
        }
        if overrides::is_overridden(self.shield.param_overrides.as_ref(), name) {
            trace!(param = name, "parameter override; value kept");
            self.shield.record_override(Surface::Param);
            return Ok(value.to_string());
        }

        self.inspect(value);
        self.shield.sanitize_or_recover(self.param_policy(), value)
    }

    /// Sanitize every parameter, keeping order and duplicates.
    pub fn sanitize_params<I, K, V>(&self, params: I) -> Result<Vec<(String, String)>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        params
            .into_iter()
            .map(|(name, value)| {
                let name = name.as_ref();
                let clean = self.sanitize_param(name, value.as_ref())?;
                Ok((name.to_string(), clean))
            })
            .collect()
    }

    /// Sanitize one structured-payload string field.
    pub fn sanitize_field(&self, field: &str, value: &str) -> Result<String> {
        self.sanitize_field_with(Some(field), None, value)
    }

    /// Sanitize every string in a JSON document in place.
    ///
    /// A string's field is the nearest enclosing object key; array elements
    /// inherit the key of their array. Object keys are left as they are.
    pub fn sanitize_json(&self, value: &mut Value) -> Result<()> {
        self.sanitize_json_value(value, None, None, None)
    }

    /// Parse `json`, sanitize its string fields, then deserialize into `T`.
    ///
    /// A field keeps its raw value when the shield's field table lists it, or
    /// when the type owning the enclosing object marks it. `T` owns the
    /// top-level object (or each element of a top-level array); nested
    /// objects are owned by the schema `T` declares for them.
    pub fn deserialize<T>(&self, json: &str) -> Result<T>
    where
        T: DeserializeOwned + HasSanitizationOverride,
    {
        let mut value: Value = serde_json::from_str(json)?;
        self.sanitize_json_value(&mut value, None, None, Some(OverrideSchema::of::<T>()))?;
        Ok(serde_json::from_value(value)?)
    }

    fn sanitize_field_with(
        &self,
        field: Option<&str>,
        owner: Option<OverrideSchema>,
        value: &str,
    ) -> Result<String> {
        if !self.fields_active() {
            return Ok(value.to_string());
        }
        if let Some(field) = field {
            if self.field_overridden(field, owner) {
                trace!(field, "field override; value kept");
                self.shield.record_override(Surface::Field);
                return Ok(value.to_string());
            }
        }

        self.inspect(value);
        self.shield.sanitize_or_recover(self.field_policy(), value)
    }

    fn field_overridden(&self, field: &str, owner: Option<OverrideSchema>) -> bool {
        owner.is_some_and(|schema| schema.is_overridden(field))
            || overrides::is_overridden(self.shield.field_overrides.as_ref(), field)
    }

    /// `owner` holds the markers of the object `field` belongs to; `schema`
    /// the markers of the object `value` would be.
    fn sanitize_json_value(
        &self,
        value: &mut Value,
        field: Option<&str>,
        owner: Option<OverrideSchema>,
        schema: Option<OverrideSchema>,
    ) -> Result<()> {
        match value {
            Value::String(s) => {
                *s = self.sanitize_field_with(field, owner, s)?;
            }
            Value::Array(arr) => {
                for item in arr.iter_mut() {
                    self.sanitize_json_value(item, field, owner, schema)?;
                }
            }
            Value::Object(obj) => {
                for (key, val) in obj.iter_mut() {
                    let child = schema.and_then(|s| s.child(key));
                    self.sanitize_json_value(val, Some(key.as_str()), schema, child)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        trace!(path = %self.context.path, "request scope closed");
    }
}

impl fmt::Debug for RequestScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("context", &self.context)
            .field("tier", &self.tier)
            .finish()
    }
}
