//! Pre/post policy checks with bounded retry and routing around one action.

use std::fmt;
use std::sync::{Arc, Weak};

use agent_actions::{
    Action, ActionError, ActionRegistry, ActionResult, CallContext, PolicyViolation, RouteFailure,
};
use agent_policy::{Assessment, Decision, FactExtractor, FieldMapping, Phase, PolicyEngine};
use agent_primitives::{ATTEMPT_KEY, ActionMetadata, Envelope, FEEDBACK_KEY};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{FailMode, SupervisorConfig};
use crate::observer::PolicyObserver;
use crate::state::{CallLifecycle, RetryContext, SupervisorEvent, SupervisorState};

/// Wraps actions so every call is assessed before and after it runs.
#[derive(Clone)]
pub struct Supervisor {
    engine: Arc<dyn PolicyEngine>,
    registry: Option<Weak<ActionRegistry>>,
    config: SupervisorConfig,
    observer: Option<Arc<dyn PolicyObserver>>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor consulting `engine` with the default configuration.
    #[must_use]
    pub fn new(engine: Arc<dyn PolicyEngine>) -> Self {
        Self {
            engine,
            registry: None,
            config: SupervisorConfig::default(),
            observer: None,
        }
    }

    /// Resolves route targets against `registry`.
    ///
    /// Only a weak handle is kept, so the registry may own supervised actions.
    #[must_use]
    pub fn with_registry(mut self, registry: &Arc<ActionRegistry>) -> Self {
        self.registry = Some(Arc::downgrade(registry));
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs an observer notified of every assessment.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PolicyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> SupervisorConfig {
        self.config
    }

    /// Supervises an action without field mappings.
    #[must_use]
    pub fn supervise<A>(&self, action: A) -> SupervisedAction
    where
        A: Action + 'static,
    {
        self.supervise_with(action, FieldMapping::new())
    }

    /// Supervises an action, projecting envelope fields through `mapping`.
    #[must_use]
    pub fn supervise_with<A>(&self, action: A, mapping: FieldMapping) -> SupervisedAction
    where
        A: Action + 'static,
    {
        SupervisedAction {
            inner: Arc::new(action),
            extractor: FactExtractor::new(mapping),
            supervisor: self.clone(),
        }
    }
}

/// An action whose calls pass through pre-check, invocation and post-check.
///
/// Exposes the wrapped action's metadata, so it registers under the same
/// name and is a drop-in replacement for it.
pub struct SupervisedAction {
    inner: Arc<dyn Action>,
    extractor: FactExtractor,
    supervisor: Supervisor,
}

impl fmt::Debug for SupervisedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedAction")
            .field("action", self.inner.metadata())
            .field("mapping", self.extractor.mapping())
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

/// What a route decision resolved to.
enum RouteOutcome {
    /// The target is the action already running.
    Stay,
    /// The call was handed off and this is its result.
    Delegated(ActionResult<Envelope>),
}

impl SupervisedAction {
    fn name(&self) -> &str {
        self.inner.metadata().name()
    }

    async fn assess(
        &self,
        ctx: &CallContext,
        envelope: &Envelope,
        phase: Phase,
    ) -> ActionResult<Assessment> {
        let facts = self
            .extractor
            .extract(envelope, self.inner.metadata(), phase);
        let assessment = match self.supervisor.engine.evaluate(&facts, self.name()).await {
            Ok(assessment) => assessment,
            Err(err) => match self.supervisor.config.fail_mode() {
                FailMode::Closed => return Err(ActionError::Engine(err)),
                FailMode::Open => {
                    warn!(
                        call_id = %ctx.call_id(),
                        action = self.name(),
                        %phase,
                        error = %err,
                        "policy engine failed; allowing call"
                    );
                    Assessment::allow()
                }
            },
        };

        if let Some(observer) = &self.supervisor.observer {
            observer.on_decision(ctx, self.name(), phase, &assessment);
        }
        Ok(assessment)
    }

    async fn invoke(&self, ctx: &CallContext, envelope: Envelope) -> ActionResult<Envelope> {
        if self.inner.cancellable() {
            tokio::select! {
                biased;
                () = ctx.cancelled() => Err(ActionError::Cancelled),
                result = self.inner.execute(ctx, envelope) => result,
            }
        } else {
            self.inner.execute(ctx, envelope).await
        }
    }

    async fn route(&self, ctx: &CallContext, target: &str, envelope: Envelope) -> RouteOutcome {
        if target == self.name() {
            return RouteOutcome::Stay;
        }

        let depth = ctx.route_depth() + 1;
        if depth > self.supervisor.config.max_route_depth() || ctx.has_visited(target) {
            return RouteOutcome::Delegated(Err(ActionError::route(
                target,
                RouteFailure::DepthExceeded { depth },
            )));
        }

        let Some(registry) = self.supervisor.registry.as_ref().and_then(Weak::upgrade) else {
            return RouteOutcome::Delegated(Err(ActionError::route(
                target,
                RouteFailure::RegistryUnavailable,
            )));
        };
        let Some(action) = registry.get(target) else {
            return RouteOutcome::Delegated(Err(ActionError::route(
                target,
                RouteFailure::Unregistered,
            )));
        };

        info!(
            call_id = %ctx.call_id(),
            from = self.name(),
            to = target,
            depth,
            "routing call"
        );
        let routed = ctx.routed_from(self.name());
        RouteOutcome::Delegated(action.execute(&routed, envelope).await)
    }

    async fn run(
        &self,
        ctx: &CallContext,
        lifecycle: &mut CallLifecycle,
        original: Envelope,
    ) -> ActionResult<Envelope> {
        let name = self.name().to_owned();
        let mut retry = RetryContext::new(self.supervisor.config.max_attempts());
        let mut inbound = original.clone();

        loop {
            ctx.check()?;

            match self.assess(ctx, &inbound, Phase::Pre).await?.into_decision() {
                Decision::Allow => {}
                Decision::Halt { reason } => {
                    lifecycle.transition(SupervisorEvent::Blocked);
                    return Err(
                        PolicyViolation::halt(name, Phase::Pre, reason, retry.attempt()).into(),
                    );
                }
                Decision::Retry { feedback } => {
                    if retry.feedback().is_none() || !retry.has_remaining() {
                        lifecycle.transition(SupervisorEvent::Blocked);
                        return Err(PolicyViolation::retry_exhausted(
                            name,
                            Phase::Pre,
                            feedback,
                            retry.attempt(),
                        )
                        .into());
                    }
                    inbound.insert_metadata(FEEDBACK_KEY, feedback.clone());
                    retry.record_feedback(feedback);
                }
                Decision::Route { target } => {
                    match self.route(ctx, &target, original.clone()).await {
                        RouteOutcome::Stay => {}
                        RouteOutcome::Delegated(result) => {
                            lifecycle.transition(SupervisorEvent::Redirected);
                            return result;
                        }
                    }
                }
            }

            lifecycle.transition(SupervisorEvent::Allowed);
            let attempt = retry.begin_attempt();
            inbound.insert_metadata(ATTEMPT_KEY, attempt);
            let mut output = self.invoke(ctx, inbound.clone()).await?;
            output.extend_labels(inbound.labels().iter().cloned())?;
            lifecycle.transition(SupervisorEvent::Invoked);

            match self.assess(ctx, &output, Phase::Post).await?.into_decision() {
                Decision::Allow => {
                    lifecycle.transition(SupervisorEvent::Accepted);
                    return Ok(output);
                }
                Decision::Halt { reason } => {
                    lifecycle.transition(SupervisorEvent::Blocked);
                    return Err(PolicyViolation::halt(name, Phase::Post, reason, attempt).into());
                }
                Decision::Retry { feedback } => {
                    if !retry.has_remaining() {
                        lifecycle.transition(SupervisorEvent::Blocked);
                        return Err(PolicyViolation::retry_exhausted(
                            name,
                            Phase::Post,
                            feedback,
                            attempt,
                        )
                        .into());
                    }
                    info!(
                        call_id = %ctx.call_id(),
                        action = %name,
                        attempt,
                        max_attempts = retry.max_attempts().get(),
                        feedback = %feedback,
                        "retrying with feedback"
                    );
                    lifecycle.transition(SupervisorEvent::RetryRequested);
                    inbound.insert_metadata(FEEDBACK_KEY, feedback.clone());
                    retry.record_feedback(feedback);
                    lifecycle.transition(SupervisorEvent::Resume);
                }
                Decision::Route { target } => {
                    match self.route(ctx, &target, original.clone()).await {
                        RouteOutcome::Stay => {
                            lifecycle.transition(SupervisorEvent::Accepted);
                            return Ok(output);
                        }
                        RouteOutcome::Delegated(result) => {
                            lifecycle.transition(SupervisorEvent::Redirected);
                            return result;
                        }
                    }
                }
            }
        }
    }
}

/// Marks a failed call as aborted unless a policy outcome already ended it.
fn settle(lifecycle: &mut CallLifecycle, result: &ActionResult<Envelope>) -> SupervisorState {
    if result.is_err() && !lifecycle.state().is_terminal() {
        lifecycle.transition(SupervisorEvent::Aborted);
    }
    lifecycle.state()
}

#[async_trait]
impl Action for SupervisedAction {
    fn metadata(&self) -> &ActionMetadata {
        self.inner.metadata()
    }

    async fn execute(&self, ctx: &CallContext, envelope: Envelope) -> ActionResult<Envelope> {
        let mut lifecycle = CallLifecycle::new(ctx.call_id());
        let result = self.run(ctx, &mut lifecycle, envelope).await;
        settle(&mut lifecycle, &result);
        result
    }

    fn cancellable(&self) -> bool {
        self.inner.cancellable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use agent_actions::{FnAction, ViolationKind};
    use agent_policy::{PolicyError, PolicyResult, RuleEngine};
    use agent_primitives::{CallId, FactSet};
    use serde_json::json;

    use crate::observer::CompositePolicyObserver;

    fn metadata(name: &str) -> ActionMetadata {
        ActionMetadata::new(name, "function").unwrap()
    }

    fn engine(rules: &str) -> Arc<RuleEngine> {
        let engine = RuleEngine::new();
        engine.load_source_str("test.dl", rules).unwrap();
        Arc::new(engine)
    }

    /// Action that counts invocations and records every inbound envelope.
    struct Recording {
        metadata: ActionMetadata,
        calls: AtomicUsize,
        seen: Mutex<Vec<Envelope>>,
        outputs: Vec<&'static str>,
    }

    impl Recording {
        fn new(name: &str, outputs: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                metadata: metadata(name),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                outputs,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Action for Recording {
        fn metadata(&self) -> &ActionMetadata {
            &self.metadata
        }

        async fn execute(&self, _ctx: &CallContext, envelope: Envelope) -> ActionResult<Envelope> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(envelope.clone());
            let text = self.outputs[call.min(self.outputs.len() - 1)];
            let mut output = envelope;
            output.set_payload(text);
            Ok(output)
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl PolicyEngine for FailingEngine {
        async fn evaluate(&self, _facts: &FactSet, _action: &str) -> PolicyResult<Assessment> {
            Err(PolicyError::backend("rule store offline"))
        }
    }

    #[tokio::test]
    async fn halt_blocks_before_invocation() {
        let engine = engine(r#"halt("Data Leakage Blocked") :- label("pii"), phase("pre")."#);
        let inner = Recording::new("llm_generate", vec!["ok"]);
        let action = Supervisor::new(engine).supervise(Arc::clone(&inner));

        let envelope = Envelope::new("ssn 123").with_label("pii").unwrap();
        let err = action
            .execute(&CallContext::new(), envelope)
            .await
            .expect_err("pii must be blocked");

        let violation = err.policy_violation().unwrap();
        assert_eq!(violation.kind(), ViolationKind::Halt);
        assert_eq!(violation.phase(), Phase::Pre);
        assert_eq!(violation.attempts(), 0);
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn retry_passes_feedback_to_next_attempt() {
        let engine = engine(
            r#"retry("Do not use DROP") :- phase("post"), output(Sql), :match(Sql, "(?i)\bDROP\b")."#,
        );
        let inner = Recording::new(
            "generate_sql",
            vec![
                "SELECT * FROM users; DROP TABLE users;",
                "SELECT * FROM users; DELETE FROM users;",
            ],
        );
        let mapping = FieldMapping::new().map("payload", "output").unwrap();
        let action = Supervisor::new(engine).supervise_with(Arc::clone(&inner), mapping);

        let output = action
            .execute(&CallContext::new(), Envelope::new("list users"))
            .await
            .unwrap();

        assert_eq!(
            output.payload().as_text(),
            Some("SELECT * FROM users; DELETE FROM users;")
        );
        assert_eq!(inner.calls(), 2);
        let seen = inner.seen.lock().unwrap();
        assert_eq!(seen[0].feedback(), None);
        assert_eq!(seen[0].metadata_value(ATTEMPT_KEY), Some(&json!(1)));
        assert_eq!(seen[1].feedback(), Some("Do not use DROP"));
        assert_eq!(seen[1].metadata_value(ATTEMPT_KEY), Some(&json!(2)));
    }

    #[tokio::test]
    async fn retry_exhaustion_carries_last_feedback() {
        let engine = engine(r#"retry("still wrong") :- phase("post")."#);
        let inner = Recording::new("stubborn", vec!["nope"]);
        let config = SupervisorConfig::default().with_max_attempts(NonZeroU32::new(2).unwrap());
        let action = Supervisor::new(engine)
            .with_config(config)
            .supervise(Arc::clone(&inner));

        let err = action
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .expect_err("budget exhausted");
        let violation = err.policy_violation().unwrap();
        assert_eq!(violation.kind(), ViolationKind::RetryExhausted);
        assert_eq!(violation.message(), "still wrong");
        assert_eq!(violation.attempts(), 2);
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn pre_check_retry_without_prior_attempt_fails() {
        let engine = engine(r#"retry("rephrase") :- phase("pre")."#);
        let inner = Recording::new("llm", vec!["ok"]);
        let action = Supervisor::new(engine).supervise(Arc::clone(&inner));

        let err = action
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .expect_err("nothing to correct yet");
        let violation = err.policy_violation().unwrap();
        assert_eq!(violation.kind(), ViolationKind::RetryExhausted);
        assert_eq!(violation.attempts(), 0);
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn execution_errors_are_not_retried() {
        let engine = engine(r#"retry("again") :- phase("post")."#);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let failing = FnAction::new(metadata("db_write"), move |_envelope| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ActionError::execution("connection refused")) }
        });
        let action = Supervisor::new(engine).supervise(failing);

        let err = action
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .expect_err("execution failure propagates");
        assert!(matches!(err, ActionError::Execution { .. }));
        assert!(!err.is_policy_violation());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn post_check_halt_counts_as_failure() {
        let engine = engine(r#"halt("PII in output") :- phase("post"), output(Text), :contains(Text, "ssn")."#);
        let inner = Recording::new("summarize", vec!["the ssn is 123"]);
        let mapping = FieldMapping::new().map("payload", "output").unwrap();
        let action = Supervisor::new(engine).supervise_with(Arc::clone(&inner), mapping);

        let err = action
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .expect_err("leak detected");
        let violation = err.policy_violation().unwrap();
        assert_eq!(violation.phase(), Phase::Post);
        assert_eq!(violation.attempts(), 1);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn inbound_labels_survive_a_fresh_output_envelope() {
        let engine = engine(r#"halt("pii leak") :- phase("post"), label("pii")."#);
        let fresh = FnAction::new(metadata("answer"), |_envelope| async {
            Ok(Envelope::new("answer with the ssn"))
        });
        let action = Supervisor::new(engine).supervise(fresh);

        let envelope = Envelope::new("ssn 123").with_label("pii").unwrap();
        let err = action
            .execute(&CallContext::new(), envelope)
            .await
            .expect_err("label carried into post-check");
        let violation = err.policy_violation().unwrap();
        assert_eq!(violation.kind(), ViolationKind::Halt);
        assert_eq!(violation.phase(), Phase::Post);
    }

    #[tokio::test]
    async fn output_keeps_inbound_labels() {
        let fresh = FnAction::new(metadata("answer"), |_envelope| async {
            Ok(Envelope::new("done").with_label("reviewed").unwrap())
        });
        let action = Supervisor::new(engine("")).supervise(fresh);

        let envelope = Envelope::new("q").with_label("internal").unwrap();
        let output = action
            .execute(&CallContext::new(), envelope)
            .await
            .unwrap();
        assert!(output.has_label("internal"));
        assert!(output.has_label("reviewed"));
    }

    #[tokio::test]
    async fn post_check_route_forwards_the_inbound_envelope() {
        let engine = engine(r#"route("fallback") :- phase("post"), action_operation("draft")."#);
        let registry = Arc::new(ActionRegistry::new());
        let draft = Recording::new("draft", vec!["draft output"]);
        let fallback = Recording::new("fallback", vec!["fallback output"]);
        registry.register(Arc::clone(&fallback)).unwrap();
        let action = Supervisor::new(engine)
            .with_registry(&registry)
            .supervise(Arc::clone(&draft));

        let output = action
            .execute(&CallContext::new(), Envelope::new("original question"))
            .await
            .unwrap();

        assert_eq!(output.payload().as_text(), Some("fallback output"));
        assert_eq!(draft.calls(), 1);
        let seen = fallback.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload().as_text(), Some("original question"));
        assert_eq!(seen[0].metadata_value(ATTEMPT_KEY), None);
    }

    #[tokio::test]
    async fn acyclic_route_chain_stops_at_max_depth() {
        let engine = engine(
            r#"
            route("b") :- action_operation("a").
            route("c") :- action_operation("b").
            route("d") :- action_operation("c").
            "#,
        );
        let registry = Arc::new(ActionRegistry::new());
        let supervisor = Supervisor::new(engine)
            .with_registry(&registry)
            .with_config(SupervisorConfig::default().with_max_route_depth(2));
        let chain: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|name| Recording::new(name, vec!["ok"]))
            .collect();
        for action in &chain {
            registry.register(supervisor.supervise(Arc::clone(action))).unwrap();
        }

        let err = registry
            .execute(&CallContext::new(), "a", Envelope::new("x"))
            .await
            .expect_err("chain too deep");
        assert!(matches!(
            err,
            ActionError::Route {
                ref target,
                reason: RouteFailure::DepthExceeded { depth: 3 },
            } if target == "d"
        ));
        assert!(chain.iter().all(|action| action.calls() == 0));
    }

    #[tokio::test]
    async fn route_without_registry_fails() {
        let engine = engine(r#"route("elsewhere") :- phase("pre")."#);
        let action = Supervisor::new(engine).supervise(Recording::new("a", vec!["ok"]));

        let err = action
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .expect_err("no registry");
        assert!(matches!(
            err,
            ActionError::Route {
                reason: RouteFailure::RegistryUnavailable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn self_route_is_allow() {
        let engine = engine(r#"route("classify") :- action_operation("classify")."#);
        let inner = Recording::new("classify", vec!["done"]);
        let action = Supervisor::new(engine).supervise(Arc::clone(&inner));

        let output = action
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .unwrap();
        assert_eq!(output.payload().as_text(), Some("done"));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn engine_failure_respects_fail_mode() {
        let inner = Recording::new("llm", vec!["ok"]);
        let closed = Supervisor::new(Arc::new(FailingEngine)).supervise(Arc::clone(&inner));
        let err = closed
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .expect_err("fail closed");
        assert!(matches!(err, ActionError::Engine(_)));
        assert_eq!(inner.calls(), 0);

        let open = Supervisor::new(Arc::new(FailingEngine))
            .with_config(SupervisorConfig::default().with_fail_mode(FailMode::Open))
            .supervise(Arc::clone(&inner));
        let output = open
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .unwrap();
        assert_eq!(output.payload().as_text(), Some("ok"));
    }

    #[tokio::test]
    async fn cancelled_call_never_invokes() {
        let inner = Recording::new("llm", vec!["ok"]);
        let action = Supervisor::new(engine("")).supervise(Arc::clone(&inner));
        let ctx = CallContext::new();
        ctx.cancel();

        let err = action
            .execute(&ctx, Envelope::new("x"))
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ActionError::Cancelled));
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellable_invocation_is_aborted() {
        let slow = FnAction::new(metadata("slow"), |envelope| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(envelope)
        })
        .abortable();
        let action = Supervisor::new(engine("")).supervise(slow);
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));

        let err = action
            .execute(&ctx, Envelope::new("x"))
            .await
            .expect_err("deadline passed");
        assert!(matches!(err, ActionError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn non_cancellable_result_is_still_checked() {
        let slow = FnAction::new(metadata("slow"), |mut envelope: Envelope| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            envelope.set_payload("finished");
            Ok(envelope)
        });
        let action = Supervisor::new(engine("")).supervise(slow);
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));

        let output = action.execute(&ctx, Envelope::new("x")).await.unwrap();
        assert_eq!(output.payload().as_text(), Some("finished"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_honoured_before_the_next_attempt() {
        let engine = engine(r#"retry("try again") :- phase("post")."#);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slow = FnAction::new(metadata("slow"), move |envelope| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(envelope)
            }
        });
        let action = Supervisor::new(engine).supervise(slow);
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));

        let err = action
            .execute(&ctx, Envelope::new("x"))
            .await
            .expect_err("deadline passed during the first attempt");
        assert!(matches!(err, ActionError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn settle_keeps_policy_outcomes() {
        let failed: ActionResult<Envelope> = Err(ActionError::Cancelled);

        let mut halted = CallLifecycle::new(CallId::random());
        halted.transition(SupervisorEvent::Blocked);
        assert_eq!(settle(&mut halted, &failed), SupervisorState::Halted);

        let mut invoking = CallLifecycle::new(CallId::random());
        invoking.transition(SupervisorEvent::Allowed);
        assert_eq!(settle(&mut invoking, &failed), SupervisorState::Failed);

        let mut pending = CallLifecycle::new(CallId::random());
        assert_eq!(settle(&mut pending, &Ok(Envelope::empty())), SupervisorState::PreCheck);
    }

    #[test]
    fn supervised_action_inherits_cancellability() {
        let plain = FnAction::new(metadata("plain"), |envelope| async { Ok(envelope) });
        let abortable =
            FnAction::new(metadata("abortable"), |envelope| async { Ok(envelope) }).abortable();
        let supervisor = Supervisor::new(engine(""));

        assert!(!supervisor.supervise(plain).cancellable());
        assert!(supervisor.supervise(abortable).cancellable());
    }

    #[tokio::test]
    async fn observer_sees_both_checkpoints() {
        #[derive(Default)]
        struct Phases(Mutex<Vec<Phase>>);

        impl PolicyObserver for Phases {
            fn on_decision(
                &self,
                _ctx: &CallContext,
                _action: &str,
                phase: Phase,
                _assessment: &Assessment,
            ) {
                self.0.lock().unwrap().push(phase);
            }
        }

        let phases = Arc::new(Phases::default());
        let observer = CompositePolicyObserver::new([Arc::clone(&phases) as Arc<dyn PolicyObserver>]);
        let action = Supervisor::new(engine(""))
            .with_observer(Arc::new(observer))
            .supervise(Recording::new("llm", vec!["ok"]));

        action
            .execute(&CallContext::new(), Envelope::new("x"))
            .await
            .unwrap();
        assert_eq!(phases.0.lock().unwrap().as_slice(), [Phase::Pre, Phase::Post]);
    }
}
