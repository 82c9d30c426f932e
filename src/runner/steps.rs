//! Declarative step tables for each workflow

use super::context::Dependency;
use super::state::Phase;
use crate::driver::{BodyEncoding, Method};
use crate::parser::types::{LoginMode, WorkflowKind};

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_STREAM: &str = "text/event-stream";
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const ACCEPT_ANY_API: &str = "application/json, text/event-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedStatus {
    Any,
    OneOf(&'static [u16]),
}

impl ExpectedStatus {
    pub fn contains(&self, status: u16) -> bool {
        match self {
            ExpectedStatus::Any => true,
            ExpectedStatus::OneOf(codes) => codes.contains(&status),
        }
    }

    pub fn codes(&self) -> Vec<u16> {
        match self {
            ExpectedStatus::Any => Vec::new(),
            ExpectedStatus::OneOf(codes) => codes.to_vec(),
        }
    }
}

/// Request body a step sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    None,
    Registration,
    RoleAssignment,
    Credentials,
    /// `{user_id, question}`
    NewInteraction,
    /// `{interaction_id, user_id}`
    InteractionRef,
}

/// What to take from, or check in, a successful response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseHandler {
    None,
    CaptureCsrf,
    CaptureUserId,
    CaptureLogin,
    CaptureSessionToken,
    CaptureInteractionId,
    VerifyLifecycle,
    VerifyListed,
    CaptureSourceIds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowStepSpec {
    /// Also the key for pacing and timeout overrides
    pub name: &'static str,
    pub method: Method,
    /// May reference `{userId}`, `{interactionId}` and `{sourceId}`
    pub path: &'static str,
    pub payload: Payload,
    pub encoding: BodyEncoding,
    /// Second encoding tried once when the first attempt is not accepted
    pub fallback: Option<BodyEncoding>,
    pub expected: ExpectedStatus,
    pub accept: &'static str,
    /// Response must carry one of these content types; empty means unchecked
    pub content_types: &'static [&'static str],
    pub stream: bool,
    pub metric: &'static str,
    pub requires: &'static [Dependency],
    pub handler: ResponseHandler,
    /// Issue once per collected source id
    pub fan_out: bool,
    pub reaches: Option<Phase>,
}

const BASE: WorkflowStepSpec = WorkflowStepSpec {
    name: "",
    method: Method::Get,
    path: "/",
    payload: Payload::None,
    encoding: BodyEncoding::Json,
    fallback: None,
    expected: ExpectedStatus::OneOf(&[200]),
    accept: ACCEPT_JSON,
    content_types: &[],
    stream: false,
    metric: "",
    requires: &[],
    handler: ResponseHandler::None,
    fan_out: false,
    reaches: None,
};

pub const HOME_PAGE: WorkflowStepSpec = WorkflowStepSpec {
    name: "home_page",
    accept: ACCEPT_HTML,
    metric: "home_page_latency",
    handler: ResponseHandler::CaptureCsrf,
    ..BASE
};

pub const REGISTER: WorkflowStepSpec = WorkflowStepSpec {
    name: "register",
    method: Method::Post,
    path: "/api/users/",
    payload: Payload::Registration,
    expected: ExpectedStatus::OneOf(&[200, 201]),
    metric: "register_user_latency",
    handler: ResponseHandler::CaptureUserId,
    reaches: Some(Phase::Registered),
    ..BASE
};

pub const ASSIGN_ROLE: WorkflowStepSpec = WorkflowStepSpec {
    name: "assign_role",
    method: Method::Post,
    path: "/api/users/{userId}/roles",
    payload: Payload::RoleAssignment,
    expected: ExpectedStatus::OneOf(&[200, 201]),
    metric: "role_map_latency",
    requires: &[Dependency::UserId],
    ..BASE
};

pub const LOGIN_TOKEN: WorkflowStepSpec = WorkflowStepSpec {
    name: "login",
    method: Method::Post,
    path: "/api/users/authenticate",
    payload: Payload::Credentials,
    metric: "login_latency",
    handler: ResponseHandler::CaptureLogin,
    reaches: Some(Phase::LoggedIn),
    ..BASE
};

pub const LOGIN_SESSION: WorkflowStepSpec = WorkflowStepSpec {
    name: "login",
    method: Method::Post,
    path: "/login",
    payload: Payload::Credentials,
    encoding: BodyEncoding::Form,
    fallback: Some(BodyEncoding::Json),
    expected: ExpectedStatus::OneOf(&[200, 302]),
    accept: ACCEPT_HTML,
    metric: "login_latency",
    handler: ResponseHandler::CaptureLogin,
    reaches: Some(Phase::LoggedIn),
    ..BASE
};

pub const SESSION_PROBE: WorkflowStepSpec = WorkflowStepSpec {
    name: "session_probe",
    path: "/api/users/session",
    expected: ExpectedStatus::Any,
    accept: ACCEPT_ANY_API,
    metric: "session_probe_latency",
    handler: ResponseHandler::CaptureSessionToken,
    ..BASE
};

pub const CREATE_INTERACTION: WorkflowStepSpec = WorkflowStepSpec {
    name: "create_interaction",
    method: Method::Post,
    path: "/api/interactions/",
    payload: Payload::NewInteraction,
    expected: ExpectedStatus::OneOf(&[200, 201]),
    accept: ACCEPT_ANY_API,
    metric: "create_interaction_latency",
    requires: &[Dependency::UserId],
    handler: ResponseHandler::CaptureInteractionId,
    reaches: Some(Phase::InteractionCreated),
    ..BASE
};

pub const GENERATE_CITATIONS: WorkflowStepSpec = WorkflowStepSpec {
    name: "generate_citations",
    method: Method::Post,
    path: "/api/interactions/generate_citations",
    payload: Payload::InteractionRef,
    expected: ExpectedStatus::OneOf(&[201]),
    accept: ACCEPT_STREAM,
    content_types: &["text/event-stream"],
    stream: true,
    metric: "citations_latency",
    requires: &[Dependency::InteractionId],
    handler: ResponseHandler::VerifyLifecycle,
    reaches: Some(Phase::CitationsGenerated),
    ..BASE
};

pub const GENERATE_RESPONSE: WorkflowStepSpec = WorkflowStepSpec {
    name: "generate_response",
    path: "/api/interactions/generate_response",
    content_types: &["text/event-stream", "application/json"],
    metric: "response_latency",
    reaches: Some(Phase::ResponseGenerated),
    ..GENERATE_CITATIONS
};

pub const LIST_INTERACTIONS: WorkflowStepSpec = WorkflowStepSpec {
    name: "list_interactions",
    path: "/api/interactions/by_user/{userId}",
    accept: ACCEPT_ANY_API,
    content_types: &["application/json"],
    metric: "get_interactions_latency",
    requires: &[Dependency::UserId, Dependency::InteractionId],
    handler: ResponseHandler::VerifyListed,
    reaches: Some(Phase::Listed),
    ..BASE
};

pub const GENERATE_FOLLOWUP: WorkflowStepSpec = WorkflowStepSpec {
    name: "generate_followup",
    method: Method::Post,
    path: "/api/interactions/generate_followup",
    payload: Payload::InteractionRef,
    expected: ExpectedStatus::OneOf(&[200, 201]),
    accept: ACCEPT_ANY_API,
    metric: "followup_latency",
    requires: &[Dependency::InteractionId],
    reaches: Some(Phase::FollowupGenerated),
    ..BASE
};

pub const DELETE_INTERACTION: WorkflowStepSpec = WorkflowStepSpec {
    name: "delete_interaction",
    method: Method::Delete,
    path: "/api/interactions/{interactionId}",
    expected: ExpectedStatus::OneOf(&[200, 204]),
    accept: ACCEPT_ANY_API,
    metric: "delete_interaction_latency",
    requires: &[Dependency::InteractionId],
    handler: ResponseHandler::CaptureSourceIds,
    reaches: Some(Phase::InteractionDeleted),
    ..BASE
};

pub const DELETE_SOURCE: WorkflowStepSpec = WorkflowStepSpec {
    name: "delete_source",
    method: Method::Delete,
    path: "/api/sources/{sourceId}",
    expected: ExpectedStatus::OneOf(&[200, 204]),
    accept: ACCEPT_ANY_API,
    metric: "delete_source_latency",
    requires: &[Dependency::InteractionId],
    fan_out: true,
    reaches: Some(Phase::SourcesDeleted),
    ..BASE
};

pub const DELETE_USER: WorkflowStepSpec = WorkflowStepSpec {
    name: "delete_user",
    method: Method::Delete,
    path: "/api/users/{userId}",
    expected: ExpectedStatus::OneOf(&[200, 204]),
    metric: "delete_user_latency",
    requires: &[Dependency::UserId],
    ..BASE
};

/// Ordered steps of one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowPlan {
    pub setup: Vec<WorkflowStepSpec>,
    pub body: Vec<WorkflowStepSpec>,
    /// Runs on every path, after everything else
    pub cleanup: WorkflowStepSpec,
}

impl WorkflowPlan {
    pub fn for_scenario(workflow: WorkflowKind, login_mode: LoginMode) -> Self {
        let login = match login_mode {
            LoginMode::Token => LOGIN_TOKEN,
            LoginMode::Session => LOGIN_SESSION,
        };
        let body = match workflow {
            WorkflowKind::UserManagement => Vec::new(),
            WorkflowKind::Interaction => vec![
                SESSION_PROBE,
                CREATE_INTERACTION,
                GENERATE_CITATIONS,
                GENERATE_RESPONSE,
                LIST_INTERACTIONS,
                GENERATE_FOLLOWUP,
                DELETE_INTERACTION,
                DELETE_SOURCE,
            ],
        };

        Self {
            setup: vec![HOME_PAGE, REGISTER, ASSIGN_ROLE, login],
            body,
            cleanup: DELETE_USER,
        }
    }

    /// Setup and body steps in execution order, cleanup excluded
    pub fn steps(&self) -> impl Iterator<Item = &WorkflowStepSpec> {
        self.setup.iter().chain(self.body.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_plan_order() {
        let plan = WorkflowPlan::for_scenario(WorkflowKind::Interaction, LoginMode::Token);
        let names: Vec<_> = plan.steps().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "home_page",
                "register",
                "assign_role",
                "login",
                "session_probe",
                "create_interaction",
                "generate_citations",
                "generate_response",
                "list_interactions",
                "generate_followup",
                "delete_interaction",
                "delete_source",
            ]
        );
        assert_eq!(plan.cleanup.name, "delete_user");
    }

    #[test]
    fn test_user_management_plan_has_no_body() {
        let plan = WorkflowPlan::for_scenario(WorkflowKind::UserManagement, LoginMode::Session);
        assert!(plan.body.is_empty());
        assert_eq!(plan.setup[3].path, "/login");
        assert_eq!(plan.setup[3].fallback, Some(BodyEncoding::Json));
    }

    #[test]
    fn test_only_session_login_falls_back() {
        let plan = WorkflowPlan::for_scenario(WorkflowKind::Interaction, LoginMode::Session);
        let with_fallback: Vec<_> = plan
            .steps()
            .chain(std::iter::once(&plan.cleanup))
            .filter(|s| s.fallback.is_some())
            .map(|s| s.name)
            .collect();
        assert_eq!(with_fallback, vec!["login"]);
    }

    #[test]
    fn test_interaction_scoped_steps_require_interaction_id() {
        for spec in [
            GENERATE_CITATIONS,
            GENERATE_RESPONSE,
            LIST_INTERACTIONS,
            GENERATE_FOLLOWUP,
            DELETE_INTERACTION,
            DELETE_SOURCE,
        ] {
            assert!(
                spec.requires.contains(&Dependency::InteractionId),
                "{} must require an interaction",
                spec.name
            );
        }
    }

    #[test]
    fn test_expected_status() {
        assert!(ExpectedStatus::Any.contains(500));
        assert!(GENERATE_CITATIONS.expected.contains(201));
        assert!(!GENERATE_CITATIONS.expected.contains(200));
        assert_eq!(DELETE_USER.expected.codes(), vec![200, 204]);
    }
}
