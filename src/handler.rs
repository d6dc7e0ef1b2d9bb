//! Caller-supplied message handlers.
//!
//! Every decoded message is handed to a [`MessageHandler`] in arrival order.
//! Async closures `Fn(M) -> impl Future<Output = Result<()>>` implement the
//! trait directly.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Receives messages decoded from response bodies.
#[async_trait]
pub trait MessageHandler<M>: Send + Sync + 'static {
    /// Process one message.
    ///
    /// # Errors
    ///
    /// Any error aborts decoding of the current response body.
    async fn handle(&self, message: M) -> Result<()>;
}

#[async_trait]
impl<M, F, Fut> MessageHandler<M> for F
where
    M: Send + 'static,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, message: M) -> Result<()> {
        (self)(message).await
    }
}

/// Shared, type-erased handler.
pub type SharedHandler<M> = Arc<dyn MessageHandler<M>>;

/// Handler that drops every message. Used for sends issued before `connect`
/// registered a handler.
pub(crate) struct DiscardHandler<M>(PhantomData<fn(M)>);

impl<M> DiscardHandler<M> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<M: Send + 'static> MessageHandler<M> for DiscardHandler<M> {
    async fn handle(&self, _message: M) -> Result<()> {
        tracing::debug!("no handler registered, discarding message");
        Ok(())
    }
}
