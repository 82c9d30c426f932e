use crate::session::csrf::CSRF_HEADER;
use crate::session::identity::Identity;
use serde_json::Value;
use std::fmt;

/// Server-assigned identifier, kept in the JSON shape the server used so it
/// can be echoed back unchanged in later payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier(Value);

impl Identifier {
    /// Accepts non-empty strings and numbers; anything else is not an id
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(value.clone())),
            Value::Number(_) => Some(Self(value.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        self.0.clone()
    }

    /// Compare against an id found in a response; `42` and `"42"` match
    pub fn matches(&self, other: &Value) -> bool {
        Identifier::from_json(other).is_some_and(|id| id.to_string() == self.to_string())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// A prior identifier a step cannot run without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    UserId,
    InteractionId,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::UserId => "userId",
            Dependency::InteractionId => "interactionId",
        }
    }
}

/// State of one iteration of one virtual user.
///
/// Created at iteration start and dropped at iteration end; nothing in here
/// is shared with other iterations.
#[derive(Debug, Clone)]
pub struct VirtualUserContext {
    pub vu: u32,
    pub iteration: u64,
    pub identity: Identity,
    /// Question asked in this iteration
    pub query: String,
    pub base_url: String,
    pub user_agent: String,
    pub csrf_token: Option<String>,
    /// Full `Authorization` header value
    pub auth_header: Option<String>,
    pub user_id: Option<Identifier>,
    pub interaction_id: Option<Identifier>,
    pub source_ids: Vec<Identifier>,
}

impl VirtualUserContext {
    pub fn new(
        vu: u32,
        iteration: u64,
        identity: Identity,
        query: &str,
        base_url: &str,
        user_agent: &str,
    ) -> Self {
        Self {
            vu,
            iteration,
            identity,
            query: query.to_string(),
            base_url: base_url.to_string(),
            user_agent: user_agent.to_string(),
            csrf_token: None,
            auth_header: None,
            user_id: None,
            interaction_id: None,
            source_ids: Vec::new(),
        }
    }

    pub fn set_bearer_token(&mut self, token: &str) {
        self.auth_header = Some(format!("Bearer {}", token));
    }

    pub fn has(&self, dependency: Dependency) -> bool {
        match dependency {
            Dependency::UserId => self.user_id.is_some(),
            Dependency::InteractionId => self.interaction_id.is_some(),
        }
    }

    /// First dependency in `required` that is not yet known
    pub fn missing(&self, required: &[Dependency]) -> Option<Dependency> {
        required.iter().copied().find(|d| !self.has(*d))
    }

    /// Headers sent with every API call
    pub fn base_headers(&self, accept: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Accept".to_string(), accept.to_string()),
            ("Origin".to_string(), self.base_url.clone()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        if let Some(ref token) = self.csrf_token {
            headers.push((CSRF_HEADER.to_string(), token.clone()));
        }
        if let Some(ref auth) = self.auth_header {
            headers.push(("Authorization".to_string(), auth.clone()));
        }
        headers
    }

    /// Substitute `{userId}`, `{interactionId}` and `{sourceId}` in a path
    /// template. Returns the dependency that could not be filled.
    pub fn render_path(
        &self,
        template: &str,
        source_id: Option<&Identifier>,
    ) -> Result<String, Dependency> {
        let mut path = template.to_string();
        if path.contains("{userId}") {
            let id = self.user_id.as_ref().ok_or(Dependency::UserId)?;
            path = path.replace("{userId}", &encode_segment(id));
        }
        if path.contains("{interactionId}") {
            let id = self
                .interaction_id
                .as_ref()
                .ok_or(Dependency::InteractionId)?;
            path = path.replace("{interactionId}", &encode_segment(id));
        }
        if let Some(id) = source_id {
            path = path.replace("{sourceId}", &encode_segment(id));
        }
        Ok(path)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Server-provided ids are opaque; keep them inside one path segment
fn encode_segment(id: &Identifier) -> String {
    urlencoding::encode(&id.to_string()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> VirtualUserContext {
        VirtualUserContext::new(
            1,
            0,
            Identity::with_suffix("1_1", "pw"),
            "What is a contract?",
            "http://localhost:8080",
            "load-agent",
        )
    }

    #[test]
    fn test_identifier_from_json() {
        assert!(Identifier::from_json(&json!(42)).is_some());
        assert!(Identifier::from_json(&json!("abc")).is_some());
        assert!(Identifier::from_json(&json!("")).is_none());
        assert!(Identifier::from_json(&json!(null)).is_none());
        assert!(Identifier::from_json(&json!({"id": 1})).is_none());
    }

    #[test]
    fn test_identifier_matching() {
        let id = Identifier::from_json(&json!(42)).unwrap();
        assert!(id.matches(&json!(42)));
        assert!(id.matches(&json!("42")));
        assert!(!id.matches(&json!(43)));
        assert_eq!(id.to_json(), json!(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_render_path() {
        let mut ctx = context();
        assert_eq!(
            ctx.render_path("/api/interactions/by_user/{userId}", None),
            Err(Dependency::UserId)
        );

        ctx.user_id = Identifier::from_json(&json!(7));
        ctx.interaction_id = Identifier::from_json(&json!("int-1"));
        assert_eq!(
            ctx.render_path("/api/interactions/by_user/{userId}", None),
            Ok("/api/interactions/by_user/7".to_string())
        );
        assert_eq!(
            ctx.render_path("/api/interactions/{interactionId}", None),
            Ok("/api/interactions/int-1".to_string())
        );
        let source = Identifier::from_json(&json!(99)).unwrap();
        assert_eq!(
            ctx.render_path("/api/sources/{sourceId}", Some(&source)),
            Ok("/api/sources/99".to_string())
        );
    }

    #[test]
    fn test_ids_stay_within_one_path_segment() {
        let mut ctx = context();
        ctx.interaction_id = Identifier::from_json(&json!("a/b?c#d"));
        assert_eq!(
            ctx.render_path("/api/interactions/{interactionId}", None),
            Ok("/api/interactions/a%2Fb%3Fc%23d".to_string())
        );
    }

    #[test]
    fn test_headers_follow_session_state() {
        let mut ctx = context();
        let headers = ctx.base_headers("application/json");
        assert!(!headers.iter().any(|(k, _)| k == CSRF_HEADER));
        assert!(!headers.iter().any(|(k, _)| k == "Authorization"));

        ctx.csrf_token = Some("tok".to_string());
        ctx.set_bearer_token("abc");
        let headers = ctx.base_headers("application/json");
        assert!(headers.contains(&(CSRF_HEADER.to_string(), "tok".to_string())));
        assert!(headers.contains(&("Authorization".to_string(), "Bearer abc".to_string())));
        assert!(headers.contains(&("Origin".to_string(), "http://localhost:8080".to_string())));
    }

    #[test]
    fn test_missing_dependency() {
        let mut ctx = context();
        let required = [Dependency::UserId, Dependency::InteractionId];
        assert_eq!(ctx.missing(&required), Some(Dependency::UserId));
        ctx.user_id = Identifier::from_json(&json!(1));
        assert_eq!(ctx.missing(&required), Some(Dependency::InteractionId));
        ctx.interaction_id = Identifier::from_json(&json!(2));
        assert_eq!(ctx.missing(&required), None);
    }
}
