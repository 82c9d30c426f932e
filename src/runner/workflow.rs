//! Per-iteration workflow orchestration.
//!
//! Steps run strictly one after another. A step whose data dependency is
//! missing is skipped and counted as a failure; every other step runs no
//! matter how earlier steps went. The cleanup step always runs last.

use super::context::{Dependency, Identifier, VirtualUserContext};
use super::state::{IterationReport, IterationState, Phase, StepOutcome};
use super::steps::{Payload, ResponseHandler, WorkflowPlan, WorkflowStepSpec};
use crate::driver::{BodyEncoding, HttpRequest, HttpResponse, HttpTransport, RequestBody};
use crate::error::{StepFailure, TransportError};
use crate::metrics::recorder::{HTTP_REQ_DURATION, ITERATION_DURATION, SSE_LIFECYCLE_RATE};
use crate::metrics::Recorder;
use crate::parser::sse;
use crate::parser::types::Scenario;
use crate::session::auth;
use crate::session::{CsrfExtractor, Identity};
use serde_json::{json, Value};
use std::time::Instant;

pub struct Workflow<'a> {
    scenario: &'a Scenario,
    plan: WorkflowPlan,
    transport: &'a dyn HttpTransport,
    recorder: &'a dyn Recorder,
    csrf: CsrfExtractor,
}

impl<'a> Workflow<'a> {
    pub fn new(
        scenario: &'a Scenario,
        transport: &'a dyn HttpTransport,
        recorder: &'a dyn Recorder,
    ) -> Self {
        Self {
            scenario,
            plan: WorkflowPlan::for_scenario(scenario.workflow, scenario.login_mode),
            transport,
            recorder,
            csrf: CsrfExtractor::default(),
        }
    }

    /// Fresh iteration context: new identity, random query from the corpus
    pub fn new_context(&self, vu: u32, iteration: u64) -> VirtualUserContext {
        let identity = Identity::generate(vu, &self.scenario.registration.password);
        let query = {
            let mut rng = rand::thread_rng();
            self.scenario.corpus.pick(&mut rng).to_string()
        };
        VirtualUserContext::new(
            vu,
            iteration,
            identity,
            &query,
            &self.scenario.base_url,
            &self.scenario.user_agent,
        )
    }

    /// Run one full iteration for a virtual user
    pub async fn iterate(&self, vu: u32, iteration: u64) -> IterationReport {
        let mut ctx = self.new_context(vu, iteration);
        self.run_iteration(&mut ctx).await
    }

    pub async fn run_iteration(&self, ctx: &mut VirtualUserContext) -> IterationReport {
        let mut state = IterationState::new(ctx.vu, ctx.iteration);
        log::debug!(
            "VU {} iteration {}: {} as {}",
            ctx.vu,
            ctx.iteration,
            self.scenario.workflow.as_str(),
            ctx.identity.email
        );

        for spec in self.plan.steps() {
            self.run_step(spec, ctx, &mut state).await;
        }

        self.run_step(&self.plan.cleanup, ctx, &mut state).await;
        state.advance(Phase::Cleaned);

        state.finish();
        let report = state.to_report();
        self.recorder
            .record_latency(ITERATION_DURATION, report.duration_ms);
        report
    }

    async fn run_step(
        &self,
        spec: &WorkflowStepSpec,
        ctx: &mut VirtualUserContext,
        state: &mut IterationState,
    ) {
        if spec.fan_out {
            self.run_fan_out(spec, ctx, state).await;
        } else if self.execute(spec, ctx, None, state).await {
            if let Some(phase) = spec.reaches {
                state.advance(phase);
            }
        }

        self.scenario.pacing.pause_after(spec.name).await;
    }

    /// One request per collected source id; each is independent
    async fn run_fan_out(
        &self,
        spec: &WorkflowStepSpec,
        ctx: &mut VirtualUserContext,
        state: &mut IterationState,
    ) {
        if let Some(missing) = ctx.missing(spec.requires) {
            self.skip(spec, missing, state);
            return;
        }

        let ids = ctx.source_ids.clone();
        if ids.is_empty() {
            log::info!("{}: nothing to delete", spec.name);
        }

        let mut all_succeeded = true;
        for id in &ids {
            all_succeeded &= self.execute(spec, ctx, Some(id), state).await;
        }

        if all_succeeded && state.phase == Phase::InteractionDeleted {
            if let Some(phase) = spec.reaches {
                state.advance(phase);
            }
        }
    }

    /// Issue one step and record its outcome. Returns whether the status
    /// was in the expected set.
    async fn execute(
        &self,
        spec: &WorkflowStepSpec,
        ctx: &mut VirtualUserContext,
        source_id: Option<&Identifier>,
        state: &mut IterationState,
    ) -> bool {
        if let Some(missing) = ctx.missing(spec.requires) {
            self.skip(spec, missing, state);
            return false;
        }
        let path = match ctx.render_path(spec.path, source_id) {
            Ok(path) => path,
            Err(missing) => {
                self.skip(spec, missing, state);
                return false;
            }
        };
        let url = ctx.url(&path);
        let payload = self.payload(spec, ctx);

        let mut latency_ms = 0;
        let mut result = self
            .send(spec, ctx, &url, payload.clone(), spec.encoding, &mut latency_ms)
            .await;

        if let Some(fallback) = spec.fallback {
            let accepted = matches!(&result, Ok(res) if spec.expected.contains(res.status));
            if !accepted {
                log::info!("{}: retrying with {} body", spec.name, fallback.as_str());
                result = self
                    .send(spec, ctx, &url, payload, fallback, &mut latency_ms)
                    .await;
            }
        }

        let mut failures = Vec::new();
        let (status, success) = match result {
            Err(source) => {
                failures.push(StepFailure::Transport {
                    step: spec.name.to_string(),
                    source,
                });
                (0, false)
            }
            Ok(response) => {
                let success = spec.expected.contains(response.status);
                if success {
                    log::info!("{}: HTTP {} in {}ms", spec.name, response.status, latency_ms);
                    failures.extend(check_content_type(spec, &response));
                    failures.extend(self.handle(spec, &response, ctx));
                } else {
                    failures.push(StepFailure::HttpStatus {
                        step: spec.name.to_string(),
                        status: response.status,
                        expected: spec.expected.codes(),
                    });
                }
                (response.status, success)
            }
        };

        let outcome = StepOutcome {
            step_name: spec.name.to_string(),
            metric: spec.metric.to_string(),
            http_status: status,
            latency_ms,
            success,
            failure: failures.first().map(StepFailure::kind),
        };
        for failure in &failures {
            self.fail(failure, state);
        }
        self.recorder.record_step(&outcome);
        state.record(&outcome);
        success
    }

    fn skip(&self, spec: &WorkflowStepSpec, missing: Dependency, state: &mut IterationState) {
        let failure = StepFailure::DependencyUnavailable {
            step: spec.name.to_string(),
            missing: missing.as_str(),
        };
        self.fail(&failure, state);

        let outcome = StepOutcome::skipped(spec.name, spec.metric);
        self.recorder.record_step(&outcome);
        state.record(&outcome);
    }

    fn fail(&self, failure: &StepFailure, state: &mut IterationState) {
        log::warn!("[{}] {}", failure.kind().as_str(), failure);
        self.recorder.increment_failure(1);
        state.record_failure();
    }

    async fn send(
        &self,
        spec: &WorkflowStepSpec,
        ctx: &VirtualUserContext,
        url: &str,
        payload: Option<Value>,
        encoding: BodyEncoding,
        latency_ms: &mut u64,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = HttpRequest::new(spec.method, url)
            .headers(&ctx.base_headers(spec.accept))
            .timeout(self.scenario.timeouts.for_step(spec.name));
        if spec.stream {
            request = request
                .header("Cache-Control", "no-cache")
                .header("Connection", "keep-alive");
        }
        if let Some(payload) = payload {
            log::debug!("{} {} {}", spec.method, url, payload);
            if encoding == BodyEncoding::Json {
                request = request.header("Content-Type", "application/json");
            }
            request = request.body(RequestBody::encode(payload, encoding));
        }

        let started = Instant::now();
        let result = self.transport.send(request).await;
        let elapsed = started.elapsed().as_millis() as u64;

        *latency_ms += elapsed;
        self.recorder.record_latency(HTTP_REQ_DURATION, elapsed);
        result
    }

    fn payload(&self, spec: &WorkflowStepSpec, ctx: &VirtualUserContext) -> Option<Value> {
        let user_id = ctx.user_id.as_ref().map(Identifier::to_json).unwrap_or(Value::Null);
        match spec.payload {
            Payload::None => None,
            Payload::Registration => Some(auth::registration_payload(
                &ctx.identity,
                &self.scenario.registration,
            )),
            Payload::RoleAssignment => ctx.user_id.as_ref().map(|id| {
                auth::role_assignment_payload(id, &self.scenario.registration.role_ids)
            }),
            Payload::Credentials => Some(auth::credentials_payload(&ctx.identity)),
            Payload::NewInteraction => Some(json!({
                "user_id": user_id,
                "question": ctx.query,
            })),
            Payload::InteractionRef => Some(json!({
                "interaction_id": ctx
                    .interaction_id
                    .as_ref()
                    .map(Identifier::to_json)
                    .unwrap_or(Value::Null),
                "user_id": user_id,
            })),
        }
    }

    /// Interpret a successful response, updating the context
    fn handle(
        &self,
        spec: &WorkflowStepSpec,
        response: &HttpResponse,
        ctx: &mut VirtualUserContext,
    ) -> Option<StepFailure> {
        let step = spec.name;
        let body = response.body.as_str();

        match spec.handler {
            ResponseHandler::None => None,

            ResponseHandler::CaptureCsrf => {
                let session = auth::establish_session(&self.csrf, body);
                if session.csrf_token.is_none() {
                    log::debug!("{}: no CSRF token on landing page", step);
                }
                ctx.csrf_token = session.csrf_token;
                None
            }

            ResponseHandler::CaptureUserId => match auth::parse_registration(body) {
                Ok(registered) => match registered.user_id {
                    Some(id) => {
                        log::info!("Registered {} with ID {}", ctx.identity.email, id);
                        ctx.user_id = Some(id);
                        None
                    }
                    None => Some(validation(step, "registration response has no id")),
                },
                Err(source) => Some(StepFailure::HardParse {
                    step: step.to_string(),
                    source,
                }),
            },

            ResponseHandler::CaptureLogin => {
                match auth::parse_login(body) {
                    Ok(grant) => {
                        if let Some(header) = grant.auth_header() {
                            ctx.auth_header = Some(header);
                        }
                        if ctx.user_id.is_none() {
                            ctx.user_id = grant.user_id;
                        }
                    }
                    Err(e) => log::debug!("{}: no JSON grant in response: {}", step, e),
                }
                log::info!("Logged in as {}", ctx.identity.email);
                None
            }

            ResponseHandler::CaptureSessionToken => {
                match auth::parse_session_token(body) {
                    Some(token) => ctx.set_bearer_token(&token),
                    None => log::debug!("{}: no session token", step),
                }
                None
            }

            ResponseHandler::CaptureInteractionId => match parse_json(step, body) {
                Ok(value) => match Identifier::from_json(&value["id"]) {
                    Some(id) => {
                        log::info!("Created interaction {}", id);
                        ctx.interaction_id = Some(id);
                        None
                    }
                    None => Some(validation(step, "interaction response has no id")),
                },
                Err(failure) => Some(failure),
            },

            ResponseHandler::VerifyLifecycle => match sse::decode(body) {
                Ok(decoded) => {
                    let lifecycle = decoded.lifecycle();
                    log::debug!("{}: {} events decoded", step, decoded.event_count());
                    self.recorder
                        .record_rate(SSE_LIFECYCLE_RATE, lifecycle.is_complete());
                    if lifecycle.is_complete() {
                        None
                    } else {
                        Some(validation(
                            step,
                            &format!(
                                "missing lifecycle events: {}",
                                lifecycle.missing().join(", ")
                            ),
                        ))
                    }
                }
                Err(source) => Some(StepFailure::HardParse {
                    step: step.to_string(),
                    source,
                }),
            },

            ResponseHandler::VerifyListed => {
                let value = match parse_json(step, body) {
                    Ok(value) => value,
                    Err(failure) => return Some(failure),
                };
                let Some(id) = ctx.interaction_id.as_ref() else {
                    return Some(validation(step, "no interaction to look for"));
                };
                let today = value["today"].as_array();
                let listed = today.is_some_and(|entries| {
                    entries.iter().any(|entry| id.matches(&entry["interaction_id"]))
                });
                if listed {
                    log::info!("Interaction {} found in today's list", id);
                    None
                } else if today.is_none() {
                    Some(validation(step, "response has no 'today' array"))
                } else {
                    Some(validation(
                        step,
                        &format!("interaction {} not in today's list", id),
                    ))
                }
            }

            ResponseHandler::CaptureSourceIds => {
                if body.trim().is_empty() {
                    return None;
                }
                match parse_json(step, body) {
                    Ok(value) => {
                        ctx.source_ids = value["source_associations"]
                            .as_array()
                            .map(|associations| {
                                associations
                                    .iter()
                                    .filter_map(|a| Identifier::from_json(&a["source_id"]))
                                    .collect()
                            })
                            .unwrap_or_default();
                        log::info!("Found {} sources to delete", ctx.source_ids.len());
                        None
                    }
                    Err(failure) => Some(failure),
                }
            }
        }
    }
}

fn check_content_type(spec: &WorkflowStepSpec, response: &HttpResponse) -> Option<StepFailure> {
    if spec.content_types.is_empty() {
        return None;
    }
    let content_type = response.content_type().unwrap_or("");
    if spec
        .content_types
        .iter()
        .any(|expected| content_type.contains(expected))
    {
        None
    } else {
        Some(validation(
            spec.name,
            &format!("unexpected content type '{}'", content_type),
        ))
    }
}

fn parse_json(step: &str, body: &str) -> Result<Value, StepFailure> {
    serde_json::from_str(body).map_err(|e| StepFailure::HardParse {
        step: step.to_string(),
        source: e.into(),
    })
}

fn validation(step: &str, detail: &str) -> StepFailure {
    StepFailure::Validation {
        step: step.to_string(),
        detail: detail.to_string(),
    }
}
