//! The contract every governed action satisfies.

use std::sync::Arc;

use agent_primitives::{ActionMetadata, Envelope};
use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::ActionResult;

/// Unit of work that receives an envelope and returns one.
///
/// Implementations include model adapters, function wrappers, routers and
/// supervised wrappers around any of these.
#[async_trait]
pub trait Action: Send + Sync {
    /// Returns the static identity of the action.
    fn metadata(&self) -> &ActionMetadata;

    /// Executes the action.
    async fn execute(&self, ctx: &CallContext, envelope: Envelope) -> ActionResult<Envelope>;

    /// Whether an in-flight execution may be dropped when the call is
    /// cancelled. Non-cancellable executions run to completion.
    fn cancellable(&self) -> bool {
        false
    }
}

#[async_trait]
impl<A> Action for Arc<A>
where
    A: Action + ?Sized,
{
    fn metadata(&self) -> &ActionMetadata {
        (**self).metadata()
    }

    async fn execute(&self, ctx: &CallContext, envelope: Envelope) -> ActionResult<Envelope> {
        (**self).execute(ctx, envelope).await
    }

    fn cancellable(&self) -> bool {
        (**self).cancellable()
    }
}
