// HTTP request and response types

use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};

/// Inbound request, bound into the container for the lifetime of one pass
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    /// Path without the query string
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: String,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request from a method and a URI path with optional query.
    pub fn new(method: impl Into<String>, uri: impl AsRef<str>) -> Self {
        let uri = uri.as_ref();
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self {
            method: method.into().to_uppercase(),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query: query.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// The `Accept` header, or `*/*` when absent.
    pub fn accept(&self) -> &str {
        self.header("accept").unwrap_or("*/*")
    }

    pub fn accepts(&self, mime: &str) -> bool {
        self.accept()
            .split(',')
            .any(|part| part.split(';').next().map(str::trim) == Some(mime))
    }

    /// Parse the query string into a map of parameters
    pub fn query_params(&self) -> HashMap<String, String> {
        self.query
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (key, value) = part.split_once('=').unwrap_or((part, ""));
                (key.to_string(), value.to_string())
            })
            .collect()
    }
}

/// Response builder shared by controllers and the kernel.
///
/// Text written into the body before an action returns is its direct output;
/// the dispatcher appends the action's return value after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_string(), value.into());
        self
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.insert(key.to_string(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Append to the body.
    pub fn write(&mut self, text: &str) {
        self.body.push_str(text);
    }

    /// Serialize `value` as the body and set a JSON content type.
    pub fn json<T: Serialize>(&mut self, value: &T) -> crate::Result<()> {
        self.body = serde_json::to_string(value)
            .map_err(|e| crate::Error::Internal(format!("JSON serialization failed: {}", e)))?;
        self.set_header("Content-Type", "application/json");
        Ok(())
    }

    /// Set `Content-Length` from the byte length of the body.
    pub fn set_content_length(&mut self) {
        let length = self.body.len().to_string();
        self.set_header("Content-Length", length);
    }

    /// Write a status line, headers and body to `out`.
    pub fn emit<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Status: {}", self.status)?;
        let mut names: Vec<_> = self.headers.keys().collect();
        names.sort();
        for name in names {
            writeln!(out, "{}: {}", name, self.headers[name])?;
        }
        writeln!(out)?;
        out.write_all(self.body.as_bytes())?;
        out.flush()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

/// One pass through the kernel: an HTTP request or a command line.
#[derive(Debug, Clone)]
pub enum Invocation {
    Http(Request),
    Cli(Vec<String>),
}
