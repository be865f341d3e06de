use crate::cache::{CacheStats, LruStore};
use crate::config::ShieldConfig;
use crate::encoder::XssEncoder;
use crate::error::Result;
use crate::policy::{PolicyId, PolicySet};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Applies allow-list policies, memoizing results per policy when enabled.
#[derive(Debug)]
pub struct XssSanitizer {
    policies: PolicySet,
    caches: Option<HashMap<PolicyId, LruStore<String>>>,
}

impl XssSanitizer {
    /// Create a sanitizer with the default policies and no caching
    pub fn new() -> Self {
        Self {
            policies: PolicySet::new(),
            caches: None,
        }
    }

    /// Create a sanitizer for a configuration: policies follow the preset
    /// level, caches follow the cache section.
    pub fn from_config(config: &ShieldConfig) -> Self {
        let sanitizer = Self::new().with_policies(PolicySet::for_level(config.policy_level));
        if config.cache.sanitize_enabled {
            sanitizer.with_cache(config.cache.sanitize_max_entries)
        } else {
            sanitizer
        }
    }

    /// Replace the policy set. Any cached results are discarded, since they
    /// were produced by the previous policies.
    pub fn with_policies(mut self, policies: PolicySet) -> Self {
        self.policies = policies;
        if let Some(caches) = &self.caches {
            caches.values().for_each(LruStore::clear);
        }
        self
    }

    /// Enable one bounded cache per policy.
    pub fn with_cache(mut self, max_entries: usize) -> Self {
        debug!(max_entries, "Enabling sanitize caches");
        self.caches = Some(
            PolicyId::ALL
                .iter()
                .map(|id| (*id, LruStore::new(id.as_str(), max_entries)))
                .collect(),
        );
        self
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    pub fn caching_enabled(&self) -> bool {
        self.caches.is_some()
    }

    /// Sanitize `input` with `policy`.
    ///
    /// Empty input is returned as-is and never cached.
    pub fn sanitize(&self, policy: PolicyId, input: &str) -> Result<String> {
        if input.is_empty() {
            return Ok(String::new());
        }

        match self.cache(policy) {
            Some(cache) => cache.get_or_try_insert_with(input, |key| {
                trace!(policy = %policy, "sanitize cache miss");
                self.policies.apply(policy, key)
            }),
            None => self.policies.apply(policy, input),
        }
    }

    /// Sanitize an optional value; absent stays absent.
    pub fn sanitize_opt(&self, policy: PolicyId, input: Option<&str>) -> Result<Option<String>> {
        input.map(|s| self.sanitize(policy, s)).transpose()
    }

    /// HTML-escape `input` without applying any policy.
    pub fn escape(&self, input: &str) -> String {
        XssEncoder::encode_html(input)
    }

    /// Sanitize with `policy`, then escape the result for embedding as text.
    /// Absent input yields an empty string.
    pub fn to_safe_output(&self, policy: PolicyId, input: Option<&str>) -> Result<String> {
        match input {
            Some(s) => Ok(self.escape(&self.sanitize(policy, s)?)),
            None => Ok(String::new()),
        }
    }

    pub fn cache(&self, policy: PolicyId) -> Option<&LruStore<String>> {
        self.caches.as_ref().and_then(|caches| caches.get(&policy))
    }

    pub fn cache_stats(&self, policy: PolicyId) -> Option<CacheStats> {
        self.cache(policy).map(LruStore::stats)
    }
}

impl Default for XssSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
