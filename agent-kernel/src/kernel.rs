//! Registration and invocation surface tying the engine, registry and
//! supervisor together.

use std::path::Path;
use std::sync::Arc;

use agent_actions::{Action, ActionRegistry, ActionResult, CallContext};
use agent_policy::{FieldMapping, PolicyEngine, PolicyResult, RuleEngine};
use agent_primitives::Envelope;

use crate::config::SupervisorConfig;
use crate::observer::{PolicyObserver, TracingPolicyObserver};
use crate::supervisor::{SupervisedAction, Supervisor};

/// Owns the rule engine and action registry for one governed process.
///
/// Actions registered through [`GovernanceKernel::register_action`] are
/// supervised, so invoking them by name always runs the policy checks.
#[derive(Debug)]
pub struct GovernanceKernel {
    engine: Arc<RuleEngine>,
    registry: Arc<ActionRegistry>,
    supervisor: Supervisor,
}

impl Default for GovernanceKernel {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl GovernanceKernel {
    /// Creates a kernel with an empty engine and registry, logging every
    /// assessment through [`TracingPolicyObserver`].
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingPolicyObserver))
    }

    /// Creates a kernel that reports assessments to `observer`.
    #[must_use]
    pub fn with_observer(config: SupervisorConfig, observer: Arc<dyn PolicyObserver>) -> Self {
        let engine = Arc::new(RuleEngine::new());
        let registry = Arc::new(ActionRegistry::new());
        let supervisor = Supervisor::new(Arc::clone(&engine) as Arc<dyn PolicyEngine>)
            .with_registry(&registry)
            .with_config(config)
            .with_observer(observer);
        Self {
            engine,
            registry,
            supervisor,
        }
    }

    /// Returns the rule engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    /// Returns the action registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// Returns the supervisor applied to registered actions.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Supervises `action` without wrapping it into the registry.
    #[must_use]
    pub fn supervise<A>(&self, action: A) -> SupervisedAction
    where
        A: Action + 'static,
    {
        self.supervisor.supervise(action)
    }

    /// Supervises and registers an action under its metadata name.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DuplicateAction`](agent_actions::ActionError::DuplicateAction)
    /// if the name is taken.
    pub fn register_action<A>(&self, action: A) -> ActionResult<()>
    where
        A: Action + 'static,
    {
        self.registry.register(self.supervisor.supervise(action))
    }

    /// Supervises and registers an action with declared field mappings.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DuplicateAction`](agent_actions::ActionError::DuplicateAction)
    /// if the name is taken.
    pub fn register_action_with<A>(&self, action: A, mapping: FieldMapping) -> ActionResult<()>
    where
        A: Action + 'static,
    {
        self.registry
            .register(self.supervisor.supervise_with(action, mapping))
    }

    /// Registers an action without supervision.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DuplicateAction`](agent_actions::ActionError::DuplicateAction)
    /// if the name is taken.
    pub fn register_raw<A>(&self, action: A) -> ActionResult<()>
    where
        A: Action + 'static,
    {
        self.registry.register(action)
    }

    /// Returns the registered action, supervised or raw.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.registry.get(name)
    }

    /// Invokes a registered action by name.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::UnknownAction`](agent_actions::ActionError::UnknownAction)
    /// for unregistered names, otherwise whatever the call produced.
    pub async fn execute_by_name(
        &self,
        ctx: &CallContext,
        name: &str,
        envelope: Envelope,
    ) -> ActionResult<Envelope> {
        self.registry.execute(ctx, name, envelope).await
    }

    /// Loads native rules under `name`. See [`RuleEngine::load_source_str`].
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`](agent_policy::PolicyError::Compile)
    /// when the text does not parse.
    pub fn load_rules_str(&self, name: &str, text: &str) -> PolicyResult<usize> {
        self.engine.load_source_str(name, text)
    }

    /// Loads scenarios under `name`. See [`RuleEngine::load_scenarios_str`].
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`](agent_policy::PolicyError::Compile)
    /// when a scenario does not compile.
    pub fn load_scenarios_str(&self, name: &str, text: &str) -> PolicyResult<usize> {
        self.engine.load_scenarios_str(name, text)
    }

    /// Loads a rule file. See [`RuleEngine::load_path`].
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Io`](agent_policy::PolicyError::Io) or
    /// [`PolicyError::Compile`](agent_policy::PolicyError::Compile).
    pub async fn load_path(&self, path: impl AsRef<Path>) -> PolicyResult<usize> {
        self.engine.load_path(path).await
    }

    /// Loads static facts. See [`RuleEngine::load_facts`].
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`](agent_policy::PolicyError::Compile)
    /// for anything other than ground facts.
    pub fn load_facts(&self, origin: &str, text: &str) -> PolicyResult<usize> {
        self.engine.load_facts(origin, text)
    }
}
