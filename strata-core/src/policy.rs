//! Policy trait, continuation, and the pipeline composer.
//!
//! A [`Policy`] wraps the next stage of request handling: it receives the
//! request context and a [`Next`] continuation covering the rest of the
//! chain down to the terminal [`Transport`]. A policy may invoke `next`
//! zero times (serve from cache), once (the common case), or several times
//! (retry).
//!
//! [`Pipeline`] composes an ordered policy list around a transport in onion
//! order: the first-listed policy is outermost on both the inbound and the
//! outbound path. Neither `Pipeline` nor `Next` owns long-lived state —
//! caches and in-flight maps belong to the policy instances themselves.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::request::RequestContext;
use crate::response::Response;

/// Outcome of one pass through (part of) the chain.
pub type PolicyResult = Result<Response, Error>;

/// Boxed future used for the continuation chain.
pub type BoxPolicyFuture = Pin<Box<dyn Future<Output = PolicyResult> + Send>>;

/// A composable unit wrapping the next stage of request handling.
#[async_trait]
pub trait Policy: Send + Sync + 'static {
    /// Handles the request, deciding whether and how often to call `next`.
    async fn handle(&self, ctx: RequestContext, next: Next) -> PolicyResult;
}

/// Terminal stage of every chain: performs the actual exchange.
///
/// Transports must honor `ctx.signal()` when present and should respect the
/// body-timeout hint in `ctx.meta()`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Executes the request.
    async fn call(&self, ctx: RequestContext) -> PolicyResult;
}

/// Adapter turning an async closure into a [`Transport`].
pub struct TransportFn<F> {
    f: F,
}

/// Wraps an async function `(RequestContext) -> Result<Response, Error>`
/// as a [`Transport`].
pub fn transport_fn<F, Fut>(f: F) -> TransportFn<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PolicyResult> + Send + 'static,
{
    TransportFn { f }
}

#[async_trait]
impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PolicyResult> + Send + 'static,
{
    async fn call(&self, ctx: RequestContext) -> PolicyResult {
        (self.f)(ctx).await
    }
}

/// Continuation over the remaining chain.
///
/// `Next` is an owning cursor into the composed policy list: running it
/// executes the next policy (or the transport when the list is exhausted).
/// It is `Clone` so policies like retry can re-run the downstream chain.
#[derive(Clone)]
pub struct Next {
    policies: Arc<[Arc<dyn Policy>]>,
    transport: Arc<dyn Transport>,
    index: usize,
}

impl Next {
    /// Runs the rest of the chain with the given context.
    pub fn run(self, ctx: RequestContext) -> BoxPolicyFuture {
        match self.policies.get(self.index).cloned() {
            Some(policy) => {
                let next = Next {
                    policies: self.policies,
                    transport: self.transport,
                    index: self.index + 1,
                };
                Box::pin(async move { policy.handle(ctx, next).await })
            }
            None => {
                let transport = self.transport;
                Box::pin(async move { transport.call(ctx).await })
            }
        }
    }
}

/// An ordered policy list composed around a terminal transport.
#[derive(Clone)]
pub struct Pipeline {
    policies: Arc<[Arc<dyn Policy>]>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Starts building a pipeline around the given transport.
    pub fn builder(transport: impl Transport) -> PipelineBuilder {
        PipelineBuilder {
            policies: Vec::new(),
            transport: Arc::new(transport),
        }
    }

    /// Composes an already-assembled policy list around a transport.
    pub fn new(policies: Vec<Arc<dyn Policy>>, transport: Arc<dyn Transport>) -> Self {
        Pipeline {
            policies: policies.into(),
            transport,
        }
    }

    /// The entry continuation: running it executes the whole chain.
    ///
    /// This has the same signature as any policy's `next`, so a composed
    /// pipeline can itself serve as the downstream of an outer chain.
    pub fn entry(&self) -> Next {
        Next {
            policies: self.policies.clone(),
            transport: self.transport.clone(),
            index: 0,
        }
    }

    /// Executes the chain for one request.
    pub async fn execute(&self, ctx: RequestContext) -> PolicyResult {
        self.entry().run(ctx).await
    }
}

/// Builder collecting policies in onion order (first added = outermost).
pub struct PipelineBuilder {
    policies: Vec<Arc<dyn Policy>>,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    /// Appends a policy to the chain.
    pub fn with(mut self, policy: impl Policy) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Appends an already-shared policy to the chain.
    pub fn with_arc(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Finalizes the pipeline.
    pub fn build(self) -> Pipeline {
        Pipeline {
            policies: self.policies.into(),
            transport: self.transport,
        }
    }
}

/// Composes `policies` around `transport` into a single callable pipeline.
///
/// Equivalent to [`Pipeline::new`]; provided for call sites that read better
/// as a function.
pub fn compose(policies: Vec<Arc<dyn Policy>>, transport: Arc<dyn Transport>) -> Pipeline {
    Pipeline::new(policies, transport)
}
