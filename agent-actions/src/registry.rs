//! Runtime registry of actions keyed by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use agent_primitives::{ActionMetadata, Envelope};
use tracing::debug;

use crate::action::Action;
use crate::context::CallContext;
use crate::error::{ActionError, ActionResult};

/// Registry that stores actions keyed by their metadata name.
#[derive(Default)]
pub struct ActionRegistry {
    inner: RwLock<HashMap<String, Arc<dyn Action>>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action under its metadata name.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DuplicateAction`] if the name is already present.
    pub fn register<A>(&self, action: A) -> ActionResult<()>
    where
        A: Action + 'static,
    {
        self.register_arc(Arc::new(action))
    }

    /// Registers a shared action under its metadata name.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DuplicateAction`] if the name is already present.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_arc(&self, action: Arc<dyn Action>) -> ActionResult<()> {
        let mut inner = self.inner.write().expect("action registry poisoned");
        let name = action.metadata().name().to_owned();
        if inner.contains_key(&name) {
            return Err(ActionError::DuplicateAction { name });
        }

        debug!(action = %name, kind = action.metadata().kind(), "action registered");
        inner.insert(name, action);
        Ok(())
    }

    /// Removes an action, returning whether it was registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.write().expect("action registry poisoned");
        inner.remove(name).is_some()
    }

    /// Returns the action registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        let inner = self.inner.read().expect("action registry poisoned");
        inner.get(name).cloned()
    }

    /// Returns `true` when an action is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Invokes a registered action by name.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::UnknownAction`] when the action is not found or
    /// propagates whatever the action returns.
    pub async fn execute(
        &self,
        ctx: &CallContext,
        name: &str,
        envelope: Envelope,
    ) -> ActionResult<Envelope> {
        let action = self.get(name).ok_or_else(|| ActionError::UnknownAction {
            name: name.to_owned(),
        })?;
        action.execute(ctx, envelope).await
    }

    /// Lists registered action names in sorted order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("action registry poisoned");
        let mut names: Vec<_> = inner.keys().cloned().collect();
        names.sort();
        names
    }

    /// Lists the metadata of all registered actions, sorted by name.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ActionMetadata> {
        let inner = self.inner.read().expect("action registry poisoned");
        let mut metadata: Vec<_> = inner
            .values()
            .map(|action| action.metadata().clone())
            .collect();
        metadata.sort_by(|a, b| a.name().cmp(b.name()));
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FnAction;

    fn echo(name: &str) -> FnAction {
        FnAction::new(
            ActionMetadata::new(name, "function").unwrap(),
            |envelope: Envelope| async move { Ok(envelope) },
        )
    }

    #[tokio::test]
    async fn register_and_execute_action() {
        let registry = ActionRegistry::new();
        registry.register(echo("echo")).unwrap();

        let output = registry
            .execute(&CallContext::new(), "echo", Envelope::new("hello"))
            .await
            .unwrap();
        assert_eq!(output.payload().as_text(), Some("hello"));
    }

    #[test]
    fn duplicate_registration_errors() {
        let registry = ActionRegistry::new();
        registry.register(echo("echo")).unwrap();

        let err = registry
            .register(echo("echo"))
            .expect_err("duplicate registration should fail");
        assert!(matches!(err, ActionError::DuplicateAction { name } if name == "echo"));
    }

    #[tokio::test]
    async fn unknown_action_errors() {
        let registry = ActionRegistry::new();
        let err = registry
            .execute(&CallContext::new(), "missing", Envelope::empty())
            .await
            .expect_err("unknown action should error");

        assert!(matches!(err, ActionError::UnknownAction { name } if name == "missing"));
    }

    #[test]
    fn listing_is_sorted() {
        let registry = ActionRegistry::new();
        registry.register(echo("vip_agent")).unwrap();
        registry.register(echo("classify")).unwrap();

        assert_eq!(registry.names(), ["classify", "vip_agent"]);
        assert_eq!(registry.list()[0].name(), "classify");
        assert!(registry.unregister("classify"));
        assert!(!registry.contains("classify"));
    }
}
