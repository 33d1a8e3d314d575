use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

use crate::error::Error;

/// Form-encoded key/value pairs. Keys are kept sorted, a key may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormValues(BTreeMap<String, Vec<String>>);

impl FormValues {
    /// Parses an `a=1&b=2` string.
    ///
    /// Semicolons are rejected rather than treated as separators.
    /// Malformed percent escapes and escapes that decode to invalid UTF-8
    /// are errors.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut values = FormValues::default();
        for pair in raw.split('&') {
            if pair.contains(';') {
                return Err("invalid semicolon separator in query".to_string());
            }
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            values.add(unescape(key)?, unescape(value)?);
        }
        Ok(values)
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Returns the first value for the key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates keys in sorted order together with their first value.
    pub fn first_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.first().map(|first| (k.as_str(), first.as_str())))
    }

    /// Encodes all values, keys sorted, spaces as `+`.
    pub fn encode(&self) -> String {
        let mut pairs = Vec::new();
        for (key, values) in &self.0 {
            for value in values {
                pairs.push(format!("{}={}", escape(key), escape(value)));
            }
        }
        pairs.join("&")
    }
}

fn escape(s: &str) -> String {
    urlencoding::encode(s).replace("%20", "+")
}

fn unescape(s: &str) -> Result<String, String> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        if bytes.len() <= i + 2 || !bytes[i + 1].is_ascii_hexdigit() || !bytes[i + 2].is_ascii_hexdigit() {
            let end = (i + 3).min(bytes.len());
            let escape = String::from_utf8_lossy(&bytes[i..end]);
            return Err(format!("invalid URL escape {escape:?}"));
        }
        i += 3;
    }
    let spaced = s.replace('+', " ");
    String::from_utf8(urlencoding::decode_binary(spaced.as_bytes()).into_owned())
        .map_err(|_| format!("invalid UTF-8 in {s:?}"))
}

/// The raw values of one invocation, keyed as the user supplied them.
#[derive(Debug, Clone, Default)]
pub struct RequestValues {
    pub header: HeaderMap,
    pub path: Vec<String>,
    pub query: FormValues,
    pub body: FormValues,
}

impl RequestValues {
    /// Parses `Name: Value` headers, positional path values and the query
    /// and body strings. Nothing is checked against an operation yet.
    pub fn parse(
        headers: &[String],
        path: Vec<String>,
        query: &str,
        body: &str,
    ) -> Result<Self, Error> {
        let mut header = HeaderMap::new();
        for raw in headers {
            let (name, value) = parse_header(raw).ok_or_else(|| Error::Parse {
                location: "header",
                message: format!("could not parse {raw:?}"),
            })?;
            header.insert(name, value);
        }
        let query = FormValues::parse(query).map_err(|message| Error::Parse {
            location: "query",
            message,
        })?;
        let body = FormValues::parse(body).map_err(|message| Error::Parse {
            location: "body",
            message,
        })?;

        Ok(RequestValues {
            header,
            path,
            query,
            body,
        })
    }
}

fn parse_header(raw: &str) -> Option<(HeaderName, HeaderValue)> {
    let (name, value) = raw.split_once(':')?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).ok()?;
    let value = HeaderValue::from_str(value.trim()).ok()?;
    Some((name, value))
}
