use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload encodings used by the workflow
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// How a payload object goes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

impl BodyEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyEncoding::Json => "json",
            BodyEncoding::Form => "form",
        }
    }
}

impl RequestBody {
    /// Encode a payload. Form encoding flattens the top-level object; nested
    /// values are written as their JSON text.
    pub fn encode(payload: Value, encoding: BodyEncoding) -> Self {
        match encoding {
            BodyEncoding::Json => RequestBody::Json(payload),
            BodyEncoding::Form => {
                let fields = match payload {
                    Value::Object(map) => map
                        .into_iter()
                        .map(|(k, v)| {
                            let value = match v {
                                Value::String(s) => s,
                                other => other.to_string(),
                            };
                            (k, value)
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                RequestBody::Form(fields)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Set a header, replacing any earlier value with the same name
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        for (name, value) in headers {
            self = self.header(name, value.clone());
        }
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Fully received response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Transport seam between the workflow and the network.
///
/// One transport belongs to one virtual user; it may keep per-user state
/// such as a cookie jar.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_replaces_case_insensitively() {
        let req = HttpRequest::new(Method::Get, "http://x/")
            .header("Accept", "application/json")
            .header("accept", "text/event-stream");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header_value("ACCEPT"), Some("text/event-stream"));
    }

    #[test]
    fn test_form_encoding_flattens_object() {
        let body = RequestBody::encode(
            json!({"email": "a@b", "password": "pw", "remember": true}),
            BodyEncoding::Form,
        );
        match body {
            RequestBody::Form(fields) => {
                assert!(fields.contains(&("email".to_string(), "a@b".to_string())));
                assert!(fields.contains(&("remember".to_string(), "true".to_string())));
            }
            other => panic!("expected form body, got {:?}", other),
        }
    }

    #[test]
    fn test_response_headers_are_case_insensitive() {
        let res = HttpResponse::new(201, "").with_header("Content-Type", "text/event-stream");
        assert_eq!(res.content_type(), Some("text/event-stream"));
        assert_eq!(res.header("CONTENT-TYPE"), Some("text/event-stream"));
    }
}
