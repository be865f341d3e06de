//! Allow-list policies.
//!
//! Every policy is an immutable [`HtmlPolicy`] built once at startup. Elements
//! outside the allow-list are unwrapped (their text survives), while `script`
//! and `style` are dropped together with their content. Attribute values that
//! fail a protocol or pattern constraint lose the attribute, never the element.

use crate::config::PolicyLevel;
use crate::error::{Result, XssError};
use ammonia::Builder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Identity of a policy in the [`PolicySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyId {
    /// No elements at all; tags are stripped, text is kept.
    Strict,
    /// Structural and formatting elements, links, bounded inline styles.
    Normal,
    /// `Normal` plus images and a broader attribute set.
    Lenient,
    /// Basic emphasis only, used for request parameters.
    Form,
}

impl PolicyId {
    pub const ALL: [PolicyId; 4] = [
        PolicyId::Strict,
        PolicyId::Normal,
        PolicyId::Lenient,
        PolicyId::Form,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyId::Strict => "strict",
            PolicyId::Normal => "normal",
            PolicyId::Lenient => "lenient",
            PolicyId::Form => "form",
        }
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pure transform from untrusted text to text containing only allowed markup.
///
/// Implementations must be deterministic: the same input always yields the
/// same output, which is what makes memoizing results safe.
pub trait ContentPolicy: Send + Sync {
    fn id(&self) -> PolicyId;

    fn apply(&self, input: &str) -> Result<String>;
}

// Declarations accepted in `style` attributes.
static STYLE_DECLARATIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:color|background-color|font-size|font-weight|text-align|margin|padding|border|width|height)\s*:\s*[a-zA-Z0-9\s#%.,()-]+(?:\s*;\s*)?)*$",
    )
    .unwrap()
});

const TEXT_ELEMENTS: &[&str] = &[
    "p", "br", "strong", "b", "em", "i", "u", "span", "div", "ul", "ol", "li", "h1", "h2", "h3",
    "h4", "h5", "h6", "table", "thead", "tbody", "tr", "td", "th",
];

const FORM_ELEMENTS: &[&str] = &["strong", "b", "em", "i", "br"];

const LINK_PROTOCOLS: &[&str] = &["http", "https", "mailto"];
const IMAGE_PROTOCOLS: &[&str] = &["http", "https", "data"];

/// Protocol constraint on one URL-valued attribute of one element.
#[derive(Debug, Clone)]
pub struct UrlConstraint {
    pub element: &'static str,
    pub attribute: &'static str,
    pub protocols: Vec<&'static str>,
}

impl UrlConstraint {
    fn new(element: &'static str, attribute: &'static str, protocols: &[&'static str]) -> Self {
        Self {
            element,
            attribute,
            protocols: protocols.to_vec(),
        }
    }

    /// Relative references carry no scheme and are always allowed.
    fn permits(&self, value: &str) -> bool {
        match url_scheme(value) {
            Some(scheme) => self
                .protocols
                .iter()
                .any(|p| p.eq_ignore_ascii_case(scheme)),
            None => true,
        }
    }
}

fn url_scheme(value: &str) -> Option<&str> {
    let value = value.trim_start();
    let end = value.find([':', '/', '?', '#'])?;
    if value[end..].starts_with(':') && end > 0 {
        Some(&value[..end])
    } else {
        None
    }
}

/// Allow-list policy backed by an `ammonia` builder.
pub struct HtmlPolicy {
    id: PolicyId,
    elements: Vec<&'static str>,
    element_attributes: HashMap<&'static str, Vec<&'static str>>,
    global_attributes: Vec<&'static str>,
    url_constraints: Vec<UrlConstraint>,
    link_rel: Option<&'static str>,
    builder: Builder<'static>,
}

impl HtmlPolicy {
    /// Policy allowing no elements.
    pub fn strict() -> Self {
        HtmlPolicyBuilder::new(PolicyId::Strict).build()
    }

    /// Formatting, tables and `http`/`https`/`mailto` links.
    pub fn normal() -> Self {
        HtmlPolicyBuilder::new(PolicyId::Normal)
            .allow_elements(TEXT_ELEMENTS)
            .allow_global_attributes(&["class", "id"])
            .allow_styles()
            .allow_elements(&["a"])
            .allow_attributes_on("a", &["href"])
            .require_protocols("a", "href", LINK_PROTOCOLS)
            .link_rel("nofollow")
            .build()
    }

    /// `normal()` plus images with `http`/`https`/`data` sources.
    pub fn lenient() -> Self {
        HtmlPolicyBuilder::new(PolicyId::Lenient)
            .allow_elements(TEXT_ELEMENTS)
            .allow_elements(&["a"])
            .allow_attributes_on("a", &["href"])
            .require_protocols("a", "href", LINK_PROTOCOLS)
            .allow_elements(&["img"])
            .allow_attributes_on("img", &["src", "alt", "width", "height"])
            .require_protocols("img", "src", IMAGE_PROTOCOLS)
            .allow_global_attributes(&["class", "id"])
            .allow_styles()
            .link_rel("nofollow")
            .build()
    }

    /// Basic emphasis and line breaks, nothing else.
    pub fn form() -> Self {
        HtmlPolicyBuilder::new(PolicyId::Form)
            .allow_elements(FORM_ELEMENTS)
            .build()
    }

    pub fn allowed_elements(&self) -> &[&'static str] {
        &self.elements
    }

    pub fn allows_element(&self, element: &str) -> bool {
        self.elements.iter().any(|e| e.eq_ignore_ascii_case(element))
    }

    pub fn allows_attribute(&self, element: &str, attribute: &str) -> bool {
        self.global_attributes.iter().any(|a| *a == attribute)
            || self
                .element_attributes
                .get(element)
                .is_some_and(|attrs| attrs.iter().any(|a| *a == attribute))
    }

    pub fn url_constraints(&self) -> &[UrlConstraint] {
        &self.url_constraints
    }

    pub fn link_rel(&self) -> Option<&'static str> {
        self.link_rel
    }
}

impl fmt::Debug for HtmlPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlPolicy")
            .field("id", &self.id)
            .field("elements", &self.elements)
            .field("element_attributes", &self.element_attributes)
            .field("global_attributes", &self.global_attributes)
            .field("url_constraints", &self.url_constraints)
            .field("link_rel", &self.link_rel)
            .finish()
    }
}

impl ContentPolicy for HtmlPolicy {
    fn id(&self) -> PolicyId {
        self.id
    }

    fn apply(&self, input: &str) -> Result<String> {
        panic::catch_unwind(AssertUnwindSafe(|| self.builder.clean(input).to_string())).map_err(
            |payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "transform panicked".to_string());
                XssError::sanitization(self.id, reason)
            },
        )
    }
}

/// Declarative construction of an [`HtmlPolicy`].
#[derive(Debug)]
pub struct HtmlPolicyBuilder {
    id: PolicyId,
    elements: Vec<&'static str>,
    element_attributes: HashMap<&'static str, Vec<&'static str>>,
    global_attributes: Vec<&'static str>,
    url_constraints: Vec<UrlConstraint>,
    styles: bool,
    link_rel: Option<&'static str>,
}

impl HtmlPolicyBuilder {
    pub fn new(id: PolicyId) -> Self {
        Self {
            id,
            elements: Vec::new(),
            element_attributes: HashMap::new(),
            global_attributes: Vec::new(),
            url_constraints: Vec::new(),
            styles: false,
            link_rel: None,
        }
    }

    pub fn allow_elements(mut self, elements: &[&'static str]) -> Self {
        for element in elements {
            if !self.elements.contains(element) {
                self.elements.push(element);
            }
        }
        self
    }

    pub fn allow_attributes_on(mut self, element: &'static str, attributes: &[&'static str]) -> Self {
        let entry = self.element_attributes.entry(element).or_default();
        for attribute in attributes {
            if !entry.contains(attribute) {
                entry.push(attribute);
            }
        }
        self
    }

    pub fn allow_global_attributes(mut self, attributes: &[&'static str]) -> Self {
        for attribute in attributes {
            if !self.global_attributes.contains(attribute) {
                self.global_attributes.push(attribute);
            }
        }
        self
    }

    /// Allow `style` everywhere, restricted to a small declaration grammar.
    pub fn allow_styles(mut self) -> Self {
        self.styles = true;
        self.allow_global_attributes(&["style"])
    }

    pub fn require_protocols(
        mut self,
        element: &'static str,
        attribute: &'static str,
        protocols: &[&'static str],
    ) -> Self {
        self.url_constraints
            .push(UrlConstraint::new(element, attribute, protocols));
        self
    }

    /// Value of the `rel` attribute added to every anchor.
    pub fn link_rel(mut self, rel: &'static str) -> Self {
        self.link_rel = Some(rel);
        self
    }

    pub fn build(self) -> HtmlPolicy {
        let mut builder = Builder::default();

        builder
            .tags(self.elements.iter().copied().collect())
            .clean_content_tags(HashSet::from(["script", "style"]))
            .tag_attributes(
                self.element_attributes
                    .iter()
                    .map(|(element, attrs)| (*element, attrs.iter().copied().collect()))
                    .collect(),
            )
            .generic_attributes(self.global_attributes.iter().copied().collect())
            .url_schemes(
                self.url_constraints
                    .iter()
                    .flat_map(|c| c.protocols.iter().copied())
                    .collect(),
            )
            .link_rel(self.link_rel)
            .strip_comments(true);

        let constraints = self.url_constraints.clone();
        let styles = self.styles;
        builder.attribute_filter(move |element, attribute, value| {
            if styles && attribute == "style" && !STYLE_DECLARATIONS.is_match(value) {
                return None;
            }
            let violates = constraints
                .iter()
                .filter(|c| c.element == element && c.attribute == attribute)
                .any(|c| !c.permits(value));
            if violates {
                None
            } else {
                Some(Cow::Borrowed(value))
            }
        });

        HtmlPolicy {
            id: self.id,
            elements: self.elements,
            element_attributes: self.element_attributes,
            global_attributes: self.global_attributes,
            url_constraints: self.url_constraints,
            link_rel: self.link_rel,
            builder,
        }
    }
}

/// The four process-wide policies, read-only after construction.
#[derive(Clone)]
pub struct PolicySet {
    strict: Arc<dyn ContentPolicy>,
    normal: Arc<dyn ContentPolicy>,
    lenient: Arc<dyn ContentPolicy>,
    form: Arc<dyn ContentPolicy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self {
            strict: Arc::new(HtmlPolicy::strict()),
            normal: Arc::new(HtmlPolicy::normal()),
            lenient: Arc::new(HtmlPolicy::lenient()),
            form: Arc::new(HtmlPolicy::form()),
        }
    }

    /// Policies for a configured strength preset. Under `Strict` the form
    /// policy allows no elements either.
    pub fn for_level(level: PolicyLevel) -> Self {
        Self::new().restricted_to(level)
    }

    /// Apply the level's restrictions to this set: under
    /// [`PolicyLevel::Strict`] the form policy becomes the strict one.
    pub fn restricted_to(self, level: PolicyLevel) -> Self {
        if level == PolicyLevel::Strict {
            let strict = self.strict.clone();
            self.with_policy(PolicyId::Form, strict)
        } else {
            self
        }
    }

    /// Replace one policy, e.g. with an application-specific allow-list.
    pub fn with_policy(mut self, id: PolicyId, policy: Arc<dyn ContentPolicy>) -> Self {
        match id {
            PolicyId::Strict => self.strict = policy,
            PolicyId::Normal => self.normal = policy,
            PolicyId::Lenient => self.lenient = policy,
            PolicyId::Form => self.form = policy,
        }
        self
    }

    pub fn get(&self, id: PolicyId) -> &dyn ContentPolicy {
        match id {
            PolicyId::Strict => self.strict.as_ref(),
            PolicyId::Normal => self.normal.as_ref(),
            PolicyId::Lenient => self.lenient.as_ref(),
            PolicyId::Form => self.form.as_ref(),
        }
    }

    pub fn apply(&self, id: PolicyId, input: &str) -> Result<String> {
        self.get(id).apply(input)
    }
}

impl Default for PolicySet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicySet")
            .field("strict", &self.strict.id())
            .field("normal", &self.normal.id())
            .field("lenient", &self.lenient.id())
            .field("form", &self.form.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_strips_all_tags() {
        let policy = HtmlPolicy::strict();
        let clean = policy
            .apply("<b>Bold and </b><p>Paragraph</p>")
            .unwrap();

        assert_eq!(clean, "Bold and Paragraph");
    }

    #[test]
    fn test_strict_drops_script_content() {
        let policy = HtmlPolicy::strict();
        assert_eq!(policy.apply("a<script>alert(1)</script>b").unwrap(), "ab");
        assert_eq!(policy.apply("<img src=\"a.jpg\">").unwrap(), "");
    }

    #[test]
    fn test_normal_keeps_paragraph_drops_script() {
        let policy = HtmlPolicy::normal();
        let clean = policy
            .apply("<p>Hello</p><script>alert('x')</script>")
            .unwrap();

        assert_eq!(clean, "<p>Hello</p>");
    }

    #[test]
    fn test_normal_links_get_nofollow() {
        let policy = HtmlPolicy::normal();
        let clean = policy
            .apply(r#"<a href="http://example.com">link</a>"#)
            .unwrap();

        assert_eq!(clean, r#"<a href="http://example.com" rel="nofollow">link</a>"#);
    }

    #[test]
    fn test_normal_drops_unsafe_protocol_keeps_element() {
        let policy = HtmlPolicy::normal();
        let clean = policy
            .apply(r#"<a href="javascript:alert(1)">link</a>"#)
            .unwrap();

        assert_eq!(clean, r#"<a rel="nofollow">link</a>"#);
    }

    #[test]
    fn test_normal_unwraps_images() {
        let policy = HtmlPolicy::normal();
        let clean = policy
            .apply(r#"<p>x<img src="http://example.com/a.jpg"></p>"#)
            .unwrap();

        assert_eq!(clean, "<p>x</p>");
    }

    #[test]
    fn test_style_grammar() {
        let policy = HtmlPolicy::normal();
        assert_eq!(
            policy.apply(r#"<p style="color:red">test</p>"#).unwrap(),
            r#"<p style="color:red">test</p>"#
        );
        assert_eq!(
            policy
                .apply(r#"<p style="background:url(javascript:alert(1))">test</p>"#)
                .unwrap(),
            "<p>test</p>"
        );
    }

    #[test]
    fn test_lenient_allows_images() {
        let policy = HtmlPolicy::lenient();
        assert_eq!(
            policy
                .apply(r#"<img src="http://example.com/a.jpg">"#)
                .unwrap(),
            r#"<img src="http://example.com/a.jpg">"#
        );
        assert_eq!(
            policy.apply(r#"<img src="javascript:alert(1)" alt="x">"#).unwrap(),
            r#"<img alt="x">"#
        );
    }

    #[test]
    fn test_lenient_link_protocols_differ_from_images() {
        let policy = HtmlPolicy::lenient();
        let clean = policy
            .apply(r#"<a href="data:text/html,hi">link</a>"#)
            .unwrap();

        assert_eq!(clean, r#"<a rel="nofollow">link</a>"#);
    }

    #[test]
    fn test_form_policy() {
        let policy = HtmlPolicy::form();
        assert_eq!(
            policy.apply("<p><strong>bold</strong></p>").unwrap(),
            "<strong>bold</strong>"
        );
    }

    #[test]
    fn test_url_scheme() {
        assert_eq!(url_scheme("https://x"), Some("https"));
        assert_eq!(url_scheme(" JavaScript:alert(1)"), Some("JavaScript"));
        assert_eq!(url_scheme("/path:with-colon"), None);
        assert_eq!(url_scheme("page.html"), None);
        assert_eq!(url_scheme("#top"), None);
    }

    #[test]
    fn test_allow_list_queries() {
        let policy = HtmlPolicy::lenient();
        assert!(policy.allows_element("img"));
        assert!(policy.allows_attribute("img", "src"));
        assert!(policy.allows_attribute("div", "class"));
        assert!(!policy.allows_attribute("div", "onclick"));
        assert!(!HtmlPolicy::strict().allows_element("p"));
    }

    #[test]
    fn test_strict_level_collapses_form_policy() {
        let set = PolicySet::for_level(PolicyLevel::Strict);
        assert_eq!(set.apply(PolicyId::Form, "<b>x</b>").unwrap(), "x");

        let set = PolicySet::for_level(PolicyLevel::Normal);
        assert_eq!(set.apply(PolicyId::Form, "<b>x</b>").unwrap(), "<b>x</b>");
    }

    #[test]
    fn test_restriction_applies_to_custom_sets() {
        let custom = PolicySet::new().with_policy(PolicyId::Form, Arc::new(HtmlPolicy::lenient()));
        let set = custom.restricted_to(PolicyLevel::Strict);
        assert_eq!(set.apply(PolicyId::Form, "<b>x</b>").unwrap(), "x");
        assert_eq!(set.get(PolicyId::Form).id(), PolicyId::Strict);
    }
}
