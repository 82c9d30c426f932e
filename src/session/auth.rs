//! Registration, login and session helpers.
//!
//! These build the request payloads for the setup steps and interpret their
//! responses. Issuing the requests and recording outcomes is left to the
//! workflow so every step is measured the same way.

use super::csrf::CsrfExtractor;
use super::identity::Identity;
use crate::error::DecodeError;
use crate::parser::types::Registration;
use crate::runner::context::Identifier;
use serde_json::{json, Value};

/// Result of fetching the landing page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStart {
    pub csrf_token: Option<String>,
}

/// Look for an anti-forgery token in the landing page. A page without one
/// is not an error.
pub fn establish_session(extractor: &CsrfExtractor, html: &str) -> SessionStart {
    SessionStart {
        csrf_token: extractor.extract(html),
    }
}

pub fn registration_payload(identity: &Identity, registration: &Registration) -> Value {
    json!({
        "name": identity.name,
        "email": identity.email,
        "password": identity.password,
        "user_type": registration.user_type,
        "membership_type": registration.membership_type,
    })
}

pub fn role_assignment_payload(user_id: &Identifier, role_ids: &[u64]) -> Value {
    json!({
        "user_id": user_id.to_json(),
        "role_ids": role_ids,
    })
}

pub fn credentials_payload(identity: &Identity) -> Value {
    json!({
        "email": identity.email,
        "password": identity.password,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registered {
    pub user_id: Option<Identifier>,
}

/// Read the new user's `id` from a registration response
pub fn parse_registration(body: &str) -> Result<Registered, DecodeError> {
    let value: Value = serde_json::from_str(body)?;
    Ok(Registered {
        user_id: Identifier::from_json(&value["id"]),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginGrant {
    pub token: Option<String>,
    /// `user.id`, used when registration did not yield an id
    pub user_id: Option<Identifier>,
}

impl LoginGrant {
    pub fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

/// Read an optional bearer token and nested user id from a login response.
///
/// A session login usually answers with HTML or a redirect; callers treat
/// a decode error here as "no grant", not as a failed login.
pub fn parse_login(body: &str) -> Result<LoginGrant, DecodeError> {
    let value: Value = serde_json::from_str(body)?;
    Ok(LoginGrant {
        token: bearer_token(&value),
        user_id: Identifier::from_json(&value["user"]["id"]),
    })
}

/// Bearer token from a `GET /api/users/session` response, if any
pub fn parse_session_token(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    bearer_token(&value)
}

fn bearer_token(value: &Value) -> Option<String> {
    value["token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::Config;

    fn registration() -> Registration {
        let config = Config::default();
        Registration {
            password: config.password,
            user_type: config.user_type,
            membership_type: config.membership_type,
            role_ids: config.role_ids,
        }
    }

    #[test]
    fn test_registration_payload() {
        let identity = Identity::with_suffix("2_5", "pw");
        let payload = registration_payload(&identity, &registration());
        assert_eq!(payload["email"], "loadtest_user2_5");
        assert_eq!(payload["name"], "LoadTest User 2_5");
        assert_eq!(payload["user_type"], "DANDILION_STAFF");
        assert_eq!(payload["membership_type"], "NOT_APPLICABLE");
    }

    #[test]
    fn test_role_assignment_echoes_id_type() {
        let id = Identifier::from_json(&json!(17)).unwrap();
        let payload = role_assignment_payload(&id, &[1]);
        assert_eq!(payload, json!({"user_id": 17, "role_ids": [1]}));
    }

    #[test]
    fn test_parse_registration() {
        let registered = parse_registration(r#"{"id": 12, "email": "x"}"#).unwrap();
        assert_eq!(registered.user_id.map(|id| id.to_string()), Some("12".to_string()));
        assert_eq!(parse_registration("{}").unwrap().user_id, None);
        assert!(parse_registration("<html>").is_err());
    }

    #[test]
    fn test_parse_login() {
        let grant = parse_login(r#"{"token": "abc", "user": {"id": "u-1"}}"#).unwrap();
        assert_eq!(grant.auth_header(), Some("Bearer abc".to_string()));
        assert_eq!(grant.user_id.map(|id| id.to_string()), Some("u-1".to_string()));

        let grant = parse_login(r#"{"ok": true}"#).unwrap();
        assert_eq!(grant, LoginGrant::default());
    }

    #[test]
    fn test_parse_session_token() {
        assert_eq!(parse_session_token(r#"{"token": "t"}"#), Some("t".to_string()));
        assert_eq!(parse_session_token(r#"{"token": ""}"#), None);
        assert_eq!(parse_session_token("not json"), None);
    }

    #[test]
    fn test_establish_session() {
        let extractor = CsrfExtractor::default();
        let start = establish_session(&extractor, r#"<meta name="csrf-token" content="c1">"#);
        assert_eq!(start.csrf_token, Some("c1".to_string()));
        assert_eq!(establish_session(&extractor, "<html/>"), SessionStart::default());
    }
}
