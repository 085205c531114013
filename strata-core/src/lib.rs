#![warn(missing_docs)]
//! # strata-core
//!
//! Core types for the Strata request policy pipeline.
//!
//! This crate provides the composition mechanism and the value types the
//! policy engine (`strata`) builds on:
//!
//! - [`Policy`] / [`Next`] / [`Transport`] — the unit of composition and
//!   the terminal exchange
//! - [`Pipeline`] — the composer establishing onion-model execution order
//! - [`RequestContext`] / [`Response`] — immutable request/response values
//! - [`AbortSignal`] / [`AbortHandle`] — one-shot cancellation pair
//! - [`RequestKey`] — the key space shared by cache, dedupe, and
//!   conditional policies
//! - [`Error`] — the timeout/abort/transport error taxonomy

pub mod error;
pub mod key;
pub mod policy;
pub mod request;
pub mod response;
pub mod signal;

pub use error::{Error, TimeoutPhase, TransportError, TransportErrorKind};
pub use key::{KeyGenerator, RequestKey, default_key, default_key_generator};
pub use policy::{
    BoxPolicyFuture, Next, Pipeline, PipelineBuilder, Policy, PolicyResult, Transport, TransportFn,
    compose, transport_fn,
};
pub use request::{RequestContext, RequestContextBuilder, RequestMeta};
pub use response::{Response, ResponseBuilder};
pub use signal::{AbortHandle, AbortSignal, abort_pair};
