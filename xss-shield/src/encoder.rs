use crate::error::{Result, XssError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;

static BASE64_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$").unwrap()
});

// Longest entity body we try to interpret, e.g. "#x0001F600".
const MAX_ENTITY_LEN: usize = 10;

/// Encoding and decoding helpers used by sanitization and detection.
pub struct XssEncoder;

impl XssEncoder {
    /// Encode HTML special characters
    pub fn encode_html(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                '&' => out.push_str("&amp;"),
                _ => out.push(c),
            }
        }
        out
    }

    /// Decode named and numeric HTML character references.
    ///
    /// References that are unknown, unterminated or out of range are left as
    /// they are.
    pub fn decode_html(text: &str) -> String {
        if !text.contains('&') {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let tail = &rest[amp + 1..];
            let decoded = tail
                .char_indices()
                .take(MAX_ENTITY_LEN + 1)
                .find(|(_, c)| *c == ';')
                .and_then(|(end, _)| decode_entity(&tail[..end]).map(|c| (c, end)));
            match decoded {
                Some((c, end)) => {
                    out.push(c);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = tail;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Decode `application/x-www-form-urlencoded` text.
    ///
    /// A `%` not followed by two hex digits is an error, matching what servlet
    /// containers do for malformed query strings.
    pub fn decode_url(text: &str) -> Result<String> {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let valid = bytes.len() > i + 2
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit();
                if !valid {
                    return Err(XssError::decode(
                        "url",
                        format!("incomplete escape sequence at byte {}", i),
                    ));
                }
                i += 3;
            } else {
                i += 1;
            }
        }

        let plus_as_space = text.replace('+', " ");
        Ok(percent_decode_str(&plus_as_space)
            .decode_utf8_lossy()
            .into_owned())
    }

    /// Whether `text` has the shape of standard, padded Base64.
    pub fn looks_like_base64(text: &str) -> bool {
        BASE64_GRAMMAR.is_match(text)
    }

    /// Decode standard Base64 into (lossy) UTF-8 text.
    pub fn decode_base64(text: &str) -> Result<String> {
        if !Self::looks_like_base64(text) {
            return Err(XssError::decode("base64", "not in base64 alphabet"));
        }
        let bytes = STANDARD
            .decode(text)
            .map_err(|e| XssError::decode("base64", e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn decode_entity(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match body {
        "lt" | "LT" => '<',
        "gt" | "GT" => '>',
        "amp" | "AMP" => '&',
        "quot" | "QUOT" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "colon" => ':',
        "semi" => ';',
        "lpar" => '(',
        "rpar" => ')',
        "sol" => '/',
        "bsol" => '\\',
        "equals" => '=',
        "excl" => '!',
        "period" => '.',
        "comma" => ',',
        "Tab" => '\t',
        "NewLine" => '\n',
        _ => return None,
    };
    Some(c)
}
