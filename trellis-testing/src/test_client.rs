// Test client running requests through the kernel

use std::collections::BTreeMap;
use std::sync::Arc;
use trellis_core::{Application, Error, Request, Response};

/// Client sending requests to an application in-process.
///
/// Every request gets its own kernel and container, as in production.
#[derive(Clone)]
pub struct TestClient {
    app: Arc<Application>,
}

impl TestClient {
    pub fn new(app: Application) -> Self {
        Self { app: Arc::new(app) }
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    /// Make a GET request
    pub fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None)
    }

    /// Make a POST request
    pub fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request("POST", path, Some(body))
    }

    /// Make a PUT request
    pub fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request("PUT", path, Some(body))
    }

    /// Make a DELETE request
    pub fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None)
    }

    /// Make a PATCH request
    pub fn patch(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request("PATCH", path, Some(body))
    }

    /// Make a request with custom method
    pub fn request(&self, method: &str, path: &str, body: Option<Vec<u8>>) -> TestResponse {
        self.send(Request::new(method, path).with_body(body.unwrap_or_default()))
    }

    pub fn send(&self, request: Request) -> TestResponse {
        match self.app.handle(request) {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Error(error),
        }
    }

    /// Run a command line through the kernel.
    pub fn command(&self, args: &[&str]) -> TestResponse {
        let args = args.iter().map(|a| a.to_string()).collect();
        match self.app.run_command(args) {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Error(error),
        }
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    query_params: BTreeMap<String, String>,
}

impl TestRequestBuilder {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            query_params: BTreeMap::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Set the body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set JSON body
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Internal(e.to_string()))?;
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    /// Add a query parameter
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.insert(key.to_string(), value.to_string());
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        let uri = if self.query_params.is_empty() {
            self.path
        } else {
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{}?{}", self.path, params.join("&"))
        };

        self.headers
            .into_iter()
            .fold(Request::new(self.method, uri), |req, (k, v)| req.with_header(&k, v))
            .with_body(self.body)
    }
}

/// Response from a test request
#[derive(Debug)]
pub enum TestResponse {
    Success(Response),
    Error(Error),
}

impl TestResponse {
    /// Assert the response is successful
    pub fn assert_success(&self) -> &Response {
        match self {
            TestResponse::Success(response) => response,
            TestResponse::Error(error) => {
                panic!("Expected success response, got error: {:?}", error)
            }
        }
    }

    /// Assert the response is an error
    pub fn assert_error(&self) -> &Error {
        match self {
            TestResponse::Error(error) => error,
            TestResponse::Success(_) => {
                panic!("Expected error response, got success")
            }
        }
    }

    /// Get the status code
    pub fn status(&self) -> Option<u16> {
        match self {
            TestResponse::Success(response) => Some(response.status),
            TestResponse::Error(_) => None,
        }
    }

    /// Get the response body
    pub fn body_string(&self) -> Option<String> {
        match self {
            TestResponse::Success(response) => Some(response.body.clone()),
            TestResponse::Error(_) => None,
        }
    }

    /// Get the response body as JSON
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            TestResponse::Success(response) => serde_json::from_str(&response.body)
                .map_err(|e| format!("Serialization error: {}", e)),
            TestResponse::Error(error) => Err(format!("{:?}", error)),
        }
    }

    /// Get a header value, case-insensitively
    pub fn header(&self, key: &str) -> Option<&str> {
        match self {
            TestResponse::Success(response) => response.header(key),
            TestResponse::Error(_) => None,
        }
    }
}
