//! Observers notified of every policy assessment.

use std::sync::Arc;

use agent_actions::CallContext;
use agent_policy::{Assessment, Decision, Phase};
use tracing::{debug, warn};

/// Observer invoked whenever a supervised call is assessed.
pub trait PolicyObserver: Send + Sync {
    /// Records the assessment produced for `action` at `phase`.
    fn on_decision(&self, ctx: &CallContext, action: &str, phase: Phase, assessment: &Assessment);
}

/// Observer that emits assessments to the tracing system.
#[derive(Debug, Default)]
pub struct TracingPolicyObserver;

impl PolicyObserver for TracingPolicyObserver {
    fn on_decision(&self, ctx: &CallContext, action: &str, phase: Phase, assessment: &Assessment) {
        let rule = assessment.rule().unwrap_or_default();
        match assessment.decision() {
            Decision::Allow => {
                debug!(call_id = %ctx.call_id(), action, %phase, rule, "policy allow");
            }
            Decision::Halt { reason } => {
                warn!(call_id = %ctx.call_id(), action, %phase, rule, reason, "policy halt");
            }
            Decision::Retry { feedback } => {
                warn!(call_id = %ctx.call_id(), action, %phase, rule, feedback, "policy retry");
            }
            Decision::Route { target } => {
                warn!(call_id = %ctx.call_id(), action, %phase, rule, target, "policy route");
            }
        }
    }
}

/// Composite observer that forwards assessments to a collection of observers.
#[derive(Default)]
pub struct CompositePolicyObserver {
    observers: Vec<Arc<dyn PolicyObserver>>,
}

impl CompositePolicyObserver {
    /// Creates a new composite observer from the supplied list.
    #[must_use]
    pub fn new<I>(observers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PolicyObserver>>,
    {
        Self {
            observers: observers.into_iter().collect(),
        }
    }

    /// Adds an observer to the composite set.
    pub fn push(&mut self, observer: Arc<dyn PolicyObserver>) {
        self.observers.push(observer);
    }
}

impl PolicyObserver for CompositePolicyObserver {
    fn on_decision(&self, ctx: &CallContext, action: &str, phase: Phase, assessment: &Assessment) {
        for observer in &self.observers {
            observer.on_decision(ctx, action, phase, assessment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, Phase, Decision)>>,
    }

    impl PolicyObserver for Recording {
        fn on_decision(
            &self,
            _ctx: &CallContext,
            action: &str,
            phase: Phase,
            assessment: &Assessment,
        ) {
            self.seen.lock().expect("recording poisoned").push((
                action.to_owned(),
                phase,
                assessment.decision().clone(),
            ));
        }
    }

    #[test]
    fn composite_forwards_to_every_observer() {
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        let mut composite = CompositePolicyObserver::new([
            Arc::clone(&first) as Arc<dyn PolicyObserver>,
            Arc::new(TracingPolicyObserver),
        ]);
        composite.push(Arc::clone(&second) as Arc<dyn PolicyObserver>);

        let assessment = Assessment::matched(Decision::halt("blocked"), "pii");
        composite.on_decision(&CallContext::new(), "llm_generate", Phase::Pre, &assessment);

        for observer in [&first, &second] {
            let seen = observer.seen.lock().unwrap();
            assert_eq!(
                seen.as_slice(),
                [("llm_generate".to_owned(), Phase::Pre, Decision::halt("blocked"))]
            );
        }
    }
}
