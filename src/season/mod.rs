//! Season queries: schedule and per-round fetchers, the seasonal
//! aggregator, and the report assembler.

pub mod aggregator;
pub mod assembler;
pub mod fetchers;

pub use aggregator::{AggregationSettings, FailurePolicy, SeasonAggregator, SeasonQuery};

use crate::error::{GatewayError, GatewayResult};
use crate::models::{Round, RoundResult};
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Where the aggregator gets its schedule and per-round results from.
///
/// The upstream client implements this; tests plug in scripted sources.
#[async_trait]
pub trait RoundSource: Send + Sync {
    /// Rounds of `season` in the order supplied upstream.
    async fn schedule(&self, season: &str) -> GatewayResult<Vec<Round>>;

    /// Finishing results of one round. Empty when the round has not run.
    async fn results(&self, season: &str, round: &str) -> GatewayResult<Vec<RoundResult>>;
}

/// Run `work` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, work: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        outcome = work => outcome,
    }
}
