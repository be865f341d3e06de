//! Per-request details attached to detection log events.

/// Path, client address and user agent of the request being processed.
///
/// A context belongs to exactly one request. It is passed explicitly (or
/// owned by a [`RequestScope`](crate::RequestScope)) instead of living in
/// thread-local storage, so nothing from one request can leak into the next
/// request served by the same worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub path: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Build a context from raw request parts.
    ///
    /// The client address is the first entry of `X-Forwarded-For` when that
    /// header is present and non-blank, otherwise `remote_addr`. Header names
    /// are matched case-insensitively.
    pub fn from_headers<I, K, V>(path: impl Into<String>, remote_addr: Option<&str>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut forwarded_for = None;
        let mut user_agent = None;
        for (name, value) in headers {
            let name = name.as_ref();
            if name.eq_ignore_ascii_case("x-forwarded-for") {
                forwarded_for = Some(value.as_ref().to_string());
            } else if name.eq_ignore_ascii_case("user-agent") {
                user_agent = Some(value.as_ref().to_string());
            }
        }

        let client_ip = forwarded_for
            .as_deref()
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .or_else(|| remote_addr.map(str::to_string));

        Self {
            path: path.into(),
            client_ip,
            user_agent,
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let ctx = RequestContext::from_headers(
            "/api/items",
            Some("10.0.0.1"),
            [
                ("X-Forwarded-For", " 203.0.113.7 , 10.0.0.2"),
                ("User-Agent", "curl/8.0"),
            ],
        );

        assert_eq!(ctx.path, "/api/items");
        assert_eq!(ctx.client_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_blank_forwarded_for_falls_back_to_remote() {
        let ctx = RequestContext::from_headers(
            "/",
            Some("10.0.0.1"),
            [("x-forwarded-for", "   ")],
        );

        assert_eq!(ctx.client_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.user_agent, None);
    }

    #[test]
    fn test_builder() {
        let ctx = RequestContext::new("/form")
            .with_client_ip("127.0.0.1")
            .with_user_agent("test");

        assert_eq!(ctx.client_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(ctx.user_agent.as_deref(), Some("test"));
    }
}
