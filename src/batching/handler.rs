//! # Batch Handler Trait
//!
//! The single seam into the downstream resource. Implementors turn a list of
//! payloads into exactly one result per payload, or fail the whole call.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use crate::error::{BatchFailure, ItemFailure};

/// Per-item result returned by a handler
pub type ItemResult<R> = std::result::Result<R, ItemFailure>;

/// Downstream batch execution capability
///
/// Must return exactly `payloads.len()` results, in payload order, or a
/// [`BatchFailure`]. Any other length is treated as a batch failure.
#[async_trait]
pub trait BatchHandler<P, R>: Send + Sync + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    async fn execute_batch(
        &self,
        payloads: Vec<P>,
    ) -> std::result::Result<Vec<ItemResult<R>>, BatchFailure>;
}

/// Adapter that lets an async closure act as a [`BatchHandler`]
pub struct FnBatchHandler<F, P, R> {
    func: F,
    _marker: PhantomData<fn(Vec<P>) -> R>,
}

/// Wrap an async function as a batch handler
pub fn handler_fn<F, Fut, P, R>(func: F) -> FnBatchHandler<F, P, R>
where
    F: Fn(Vec<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Vec<ItemResult<R>>, BatchFailure>> + Send + 'static,
    P: Send + 'static,
    R: Send + 'static,
{
    FnBatchHandler {
        func,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, P, R> BatchHandler<P, R> for FnBatchHandler<F, P, R>
where
    F: Fn(Vec<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Vec<ItemResult<R>>, BatchFailure>> + Send + 'static,
    P: Send + 'static,
    R: Send + 'static,
{
    async fn execute_batch(
        &self,
        payloads: Vec<P>,
    ) -> std::result::Result<Vec<ItemResult<R>>, BatchFailure> {
        (self.func)(payloads).await
    }
}
