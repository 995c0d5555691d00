// Assertions over test responses

use crate::TestResponse;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status().unwrap_or(0);
    assert_eq!(
        actual, expected,
        "Expected status {}, got {} ({:?})",
        expected, actual, response
    );
}

/// Assert that the body equals `expected` exactly
pub fn assert_body(response: &TestResponse, expected: &str) {
    let body = response.body_string();
    assert_eq!(body.as_deref(), Some(expected), "Unexpected body");
}

/// Assert that a response body contains a string
pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string().unwrap_or_default();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

/// Assert that a response body contains JSON matching expected value
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let actual: T = response
        .body_json()
        .unwrap_or_else(|e| panic!("Failed to deserialize response body: {}", e));
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

/// Assert that a response has a specific header
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert that `Content-Length` equals the byte length of the body
pub fn assert_content_length(response: &TestResponse) {
    let body_len = response.body_string().map(|b| b.len());
    let header = response.header("Content-Length").and_then(|v| v.parse::<usize>().ok());
    assert_eq!(header, body_len, "Content-Length does not match body length");
}

/// Assert that a response is successful (2xx status)
pub fn assert_success(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (200..300).contains(&status),
        "Expected successful status (2xx), got {}",
        status
    );
}

/// Assert that a response is a client error (4xx status)
pub fn assert_client_error(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (400..500).contains(&status),
        "Expected client error status (4xx), got {}",
        status
    );
}

/// Assert that the kernel failed instead of producing a response
pub fn assert_kernel_error(response: &TestResponse) {
    assert!(
        matches!(response, TestResponse::Error(_)),
        "Expected the request to fail, got {:?}",
        response
    );
}

/// Assert that a response has JSON content type
pub fn assert_json_content_type(response: &TestResponse) {
    let content_type = response.header("Content-Type");
    assert!(
        content_type
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false),
        "Expected JSON content type, got {:?}",
        content_type
    );
}

/// Assert that a response has HTML content type
pub fn assert_html_content_type(response: &TestResponse) {
    let content_type = response.header("Content-Type");
    assert!(
        content_type
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false),
        "Expected HTML content type, got {:?}",
        content_type
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Error, Response};

    fn create_test_response(status: u16, body: &str) -> TestResponse {
        TestResponse::Success(Response::new(status).with_body(body))
    }

    #[test]
    fn test_assert_status_and_body() {
        let response = create_test_response(200, "OK");
        assert_status(&response, 200);
        assert_body(&response, "OK");
        assert_success(&response);
    }

    #[test]
    fn test_assert_client_error() {
        let response = create_test_response(404, "Not Found");
        assert_client_error(&response);
        assert_body_contains(&response, "Not");
    }

    #[test]
    fn test_assert_headers() {
        let mut response = Response::ok().with_body("{}");
        response.set_header("Content-Type", "application/json");
        response.set_content_length();
        let test_response = TestResponse::Success(response);
        assert_json_content_type(&test_response);
        assert_header(&test_response, "content-type", "application/json");
        assert_content_length(&test_response);
    }

    #[test]
    fn test_assert_html_content_type() {
        let response = Response::ok().with_header("Content-Type", "text/html");
        assert_html_content_type(&TestResponse::Success(response));
    }

    #[test]
    fn test_assert_kernel_error() {
        assert_kernel_error(&TestResponse::Error(Error::Command("none".into())));
    }

    #[test]
    #[should_panic(expected = "Expected status 201")]
    fn test_assert_status_fails() {
        assert_status(&create_test_response(200, "OK"), 201);
    }
}
