use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use std::collections::HashMap;
use std::fmt;

use crate::auth::{self, AuthConfig};
use crate::body;
use crate::error::Error;
use crate::operation::Operation;
use crate::values::RequestValues;

/// A fully built request, ready to be sent.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    /// Adds the auth header. `run` executes the profile's credential command.
    pub fn authenticate<F>(&mut self, cfg: &AuthConfig, run: F) -> Result<(), Error>
    where
        F: FnOnce(&str) -> Result<String, String>,
    {
        auth::authenticate(&mut self.headers, cfg, run)?;
        Ok(())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.method, self.url)?;
        let mut headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("<binary>")))
            .collect();
        headers.sort();
        for (name, value) in headers {
            writeln!(f, "{name}: {value}")?;
        }
        if !self.body.is_empty() {
            writeln!(f)?;
            write!(f, "{}", String::from_utf8_lossy(&self.body))?;
        }
        Ok(())
    }
}

pub fn user_agent() -> String {
    format!(
        "{}/{} ({} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

impl Operation {
    /// Checks path arity, then required and enum constraints of every location.
    pub fn validate(&self, values: &RequestValues) -> Result<(), Error> {
        let want = self.parameters.path.len();
        if values.path.len() < want {
            return Err(Error::PathArity {
                got: values.path.len(),
                want,
            });
        }
        for (param, value) in self.parameters.path.iter().zip(&values.path) {
            param.validate(value)?;
        }
        self.parameters
            .header
            .validate(|name| values.header.get(name).and_then(|v| v.to_str().ok()))?;
        self.parameters.query.validate(|name| values.query.get(name))?;
        if self.has_body() {
            self.parameters.body.validate(|name| values.body.get(name))?;
        }
        Ok(())
    }

    /// Builds the request against `server_url`.
    ///
    /// Extra path values are ignored. Path values are substituted as given,
    /// without escaping.
    pub fn request(&self, server_url: &str, values: &RequestValues) -> Result<Request, Error> {
        if self.has_body() {
            body::check_format(&self.body_format)?;
        }
        self.validate(values)?;

        let mut path = self.substitute_path(&values.path);
        if !values.query.is_empty() {
            path.push('?');
            path.push_str(&values.query.encode());
        }
        let base = server_url.strip_suffix('/').unwrap_or(server_url);
        let body = body::request_body(self, &values.body)?;

        let mut headers = values.header.clone();
        if self.has_body() {
            headers.insert(CONTENT_TYPE, header_value("Content-Type", &self.body_format)?);
        }
        headers.insert(USER_AGENT, header_value("User-Agent", &user_agent())?);

        Ok(Request {
            method: self.method.clone(),
            url: format!("{base}{path}"),
            headers,
            body,
        })
    }

    /// Replaces each `{name}` token of the path template in a single pass.
    /// Substituted values are never scanned again, and tokens without a
    /// declared parameter are left as they are.
    fn substitute_path(&self, path_values: &[String]) -> String {
        let lookup: HashMap<&str, &str> = self
            .parameters
            .path
            .iter()
            .zip(path_values)
            .map(|(param, value)| (param.name.as_str(), value.as_str()))
            .collect();

        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            let token = &rest[start..=start + len];
            out.push_str(&rest[..start]);
            match lookup.get(&token[1..token.len() - 1]) {
                Some(value) => out.push_str(value),
                None => out.push_str(token),
            }
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        out
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader {
        name: name.to_string(),
    })
}
