//! Closure-backed actions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use agent_primitives::{ActionMetadata, ContentType, Envelope, Payload};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::action::Action;
use crate::context::CallContext;
use crate::error::{ActionError, ActionResult};

/// Future returned by function-backed actions.
pub type ActionFuture = BoxFuture<'static, ActionResult<Envelope>>;

type Handler = Arc<dyn Fn(Envelope) -> ActionFuture + Send + Sync>;

/// Action implemented by an async closure over the envelope.
#[derive(Clone)]
pub struct FnAction {
    metadata: ActionMetadata,
    handler: Handler,
    cancellable: bool,
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("metadata", &self.metadata)
            .field("cancellable", &self.cancellable)
            .finish_non_exhaustive()
    }
}

impl FnAction {
    /// Wraps a closure that maps the inbound envelope to the outbound one.
    pub fn new<F, Fut>(metadata: ActionMetadata, handler: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<Envelope>> + Send + 'static,
    {
        Self {
            metadata,
            handler: Arc::new(move |envelope| handler(envelope).boxed()),
            cancellable: false,
        }
    }

    /// Wraps a closure over typed request and response values.
    ///
    /// The inbound payload is decoded into `Req` (structured payloads as
    /// objects, text as a JSON string, bytes as JSON text, empty as null).
    /// The response replaces the payload: objects become a structured JSON
    /// payload, strings a text payload. Metadata and labels carry over.
    pub fn typed<Req, Resp, F, Fut>(metadata: ActionMetadata, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<Resp>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(metadata, move |mut envelope: Envelope| {
            let handler = Arc::clone(&handler);
            async move {
                let request: Req = decode(envelope.payload())?;
                let response = (*handler)(request).await?;
                let (payload, content_type) = encode(&response)?;
                envelope.set_payload(payload);
                envelope.set_content_type(content_type);
                Ok(envelope)
            }
        })
    }

    /// Marks the action as safe to abandon mid-flight on cancellation.
    #[must_use]
    pub fn abortable(mut self) -> Self {
        self.cancellable = true;
        self
    }
}

fn decode<Req: DeserializeOwned>(payload: &Payload) -> ActionResult<Req> {
    let decoded = match payload {
        Payload::Bytes(bytes) => serde_json::from_slice(bytes),
        other => serde_json::from_value(other.to_value()),
    };
    decoded.map_err(|err| ActionError::payload(format!("cannot decode request: {err}")))
}

fn encode<Resp: Serialize>(response: &Resp) -> ActionResult<(Payload, ContentType)> {
    let value = serde_json::to_value(response)
        .map_err(|err| ActionError::payload(format!("cannot encode response: {err}")))?;
    match value {
        Value::Object(map) => Ok((Payload::Structured(map), ContentType::Json)),
        Value::String(text) => Ok((Payload::Text(text), ContentType::Plain)),
        Value::Null => Ok((Payload::Empty, ContentType::Plain)),
        other => Err(ActionError::payload(format!(
            "response must encode to an object or string, got `{other}`"
        ))),
    }
}

#[async_trait]
impl Action for FnAction {
    fn metadata(&self) -> &ActionMetadata {
        &self.metadata
    }

    async fn execute(&self, _ctx: &CallContext, envelope: Envelope) -> ActionResult<Envelope> {
        (self.handler)(envelope).await
    }

    fn cancellable(&self) -> bool {
        self.cancellable
    }
}
