use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::body::is_json;
use crate::request::Request;

pub struct ApiClient {
    client: Client,
}

#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub output: String,
}

impl ApiClient {
    pub fn new(timeout: Option<u64>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(seconds) = timeout {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let client = builder.build().context("build http client")?;
        Ok(Self { client })
    }

    /// Sends the request and renders the response for display.
    pub fn execute(&self, request: Request, verbose: bool) -> Result<Response> {
        let method = Method::from_bytes(request.method.as_bytes())
            .with_context(|| format!("invalid method {}", request.method))?;
        log::debug!("request {} {}", method, request.url);

        let mut builder = self.client.request(method, &request.url).headers(request.headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }
        let resp = builder.send().context("send request")?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp.text().context("read response body")?;
        log::debug!("response {status}, {} bytes", text.len());

        Ok(Response {
            status,
            output: format_response(status, &headers, &text, verbose),
        })
    }
}

/// Pretty-prints JSON bodies. Verbose output starts with the status line
/// and the sorted response headers.
pub fn format_response(status: StatusCode, headers: &HeaderMap, text: &str, verbose: bool) -> String {
    let mut out = String::new();
    if verbose {
        out.push_str(&format!("HTTP {status}\n"));
        let mut lines: Vec<String> = headers
            .iter()
            .map(|(name, value)| {
                let value = String::from_utf8_lossy(value.as_bytes()).replace(['\n', '\r'], " ");
                format!("{name}: {value}")
            })
            .collect();
        lines.sort();
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let pretty = is_json(content_type)
        .then(|| serde_json::from_str::<Value>(text).ok())
        .flatten()
        .and_then(|value| serde_json::to_string_pretty(&value).ok());
    match pretty {
        Some(pretty) => out.push_str(&pretty),
        None => out.push_str(text.trim_end_matches('\n')),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        headers
    }

    #[test]
    fn pretty_prints_json_variants() {
        let out = format_response(
            StatusCode::OK,
            &headers("application/hal+json"),
            r#"{"name":"Shoe","id":1}"#,
            false,
        );
        assert_eq!(out, "{\n  \"name\": \"Shoe\",\n  \"id\": 1\n}");
    }

    #[test]
    fn leaves_other_bodies_alone() {
        let out = format_response(StatusCode::OK, &headers("text/plain"), "hello\n", false);
        assert_eq!(out, "hello");

        let out = format_response(StatusCode::OK, &headers("application/json"), "not json", false);
        assert_eq!(out, "not json");
    }

    #[test]
    fn verbose_adds_status_and_sorted_headers() {
        let out = format_response(StatusCode::NOT_FOUND, &headers("text/plain"), "missing", true);
        assert_eq!(
            out,
            "HTTP 404 Not Found\ncontent-type: text/plain\nx-request-id: abc\n\nmissing"
        );
    }
}
