//! reqwest-backed transport
//!
//! Each virtual user owns one client so cookies set by a session login stay
//! with that user. Redirects are not followed: a `302` from the login form
//! is a meaningful status for the workflow.

use super::traits::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(default_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(default_timeout)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut req = self.client.request(method, &request.url);

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        // A caller-supplied content type wins for JSON bodies
        let has_content_type = request.header_value("content-type").is_some();
        match &request.body {
            Some(RequestBody::Json(value)) => {
                let json = serde_json::to_string(value)
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                if !has_content_type {
                    req = req.header("Content-Type", "application/json");
                }
                req = req.body(json);
            }
            Some(RequestBody::Form(fields)) => {
                req = req.form(fields);
            }
            None => {}
        }

        let res = req.send().await.map_err(|e| map_error(&request.url, e))?;
        let status = res.status().as_u16();

        let mut headers = HashMap::new();
        for (name, value) in res.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let body = res.text().await.map_err(|e| map_error(&request.url, e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_error(url: &str, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        assert!(ReqwestTransport::new(Duration::from_secs(30)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        let result = transport
            .send(HttpRequest::new(Method::Get, "http://127.0.0.1:1/"))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Request { .. }) | Err(TransportError::Timeout { .. })
        ));
    }
}
