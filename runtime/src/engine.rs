//! The transaction engine.
//!
//! Ties the pieces together for one request:
//!
//! 1. Validate the amount (`InvalidRequest` never reaches the store)
//! 2. Await the upstream call, holding no store lock
//! 3. Run [`ResourceStore::decrement`] under [`retry_on_contention`]
//! 4. Classify the terminal result into a [`TransactionOutcome`]
//!
//! The engine never reads a quantity and writes it back in a separate step;
//! the check and the subtraction both happen inside the store's primitive.

use crate::retry::{Attempt, RetryOutcome, RetryPolicy, retry_on_contention};
use std::sync::Arc;
use std::time::Duration;
use tally_core::environment::{SimulatedUpstream, Upstream};
use tally_core::{
    DecrementOutcome, Disposition, InvalidRequest, Quantity, Receipt, Rejection, ResourceId,
    ResourceStore, StoreError, TransactionOutcome,
};
use thiserror::Error;
use tokio::time::Instant;

/// Failures that are not transaction outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Storage failed for a reason other than contention. Not retried.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A store attempt that reached an authoritative answer.
enum Settled {
    Applied { remaining: Quantity, receipt: Receipt },
    Rejected(Rejection),
}

/// Executes conditional decrements against a shared [`ResourceStore`].
///
/// Cheap to share: wrap it in an `Arc` and hand it to every request handler.
///
/// # Example
///
/// ```ignore
/// let engine = TransactionEngine::new(store)
///     .with_retry_policy(RetryPolicy::default())
///     .with_upstream(Arc::new(SimulatedUpstream::new(Duration::from_secs(3))));
///
/// match engine.execute(ResourceId::new(1), Quantity::new(1)).await? {
///     TransactionOutcome::Applied { remaining, .. } => println!("left: {remaining}"),
///     other => println!("refused: {:?}", other.disposition()),
/// }
/// ```
#[derive(Clone)]
pub struct TransactionEngine {
    store: Arc<dyn ResourceStore>,
    upstream: Arc<dyn Upstream>,
    policy: RetryPolicy,
}

impl TransactionEngine {
    /// Create an engine with the default retry policy and no upstream latency.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            upstream: Arc::new(SimulatedUpstream::new(Duration::ZERO)),
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the upstream dependency awaited before each decrement.
    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = upstream;
        self
    }

    /// The underlying store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// The active retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a transaction taking `amount` minor units from `resource_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if storage fails for a reason other than
    /// contention. Every business result, including `Busy`, is an `Ok`.
    #[tracing::instrument(skip_all, fields(resource_id = %resource_id, amount = %amount))]
    pub async fn execute(
        &self,
        resource_id: ResourceId,
        amount: Quantity,
    ) -> Result<TransactionOutcome, EngineError> {
        let started = Instant::now();
        let result = self.run(resource_id, amount).await;
        record_metrics(&result, started.elapsed());
        result
    }

    /// Execute a transaction whose amount is a decimal at the given scale.
    ///
    /// Amounts that cannot be represented in minor units resolve to
    /// [`TransactionOutcome::InvalidRequest`] without touching the store.
    ///
    /// # Errors
    ///
    /// Same as [`TransactionEngine::execute`].
    pub async fn execute_decimal(
        &self,
        resource_id: ResourceId,
        amount: f64,
        scale: u32,
    ) -> Result<TransactionOutcome, EngineError> {
        match Quantity::from_decimal(amount, scale) {
            Some(quantity) => self.execute(resource_id, quantity).await,
            None => {
                let outcome = TransactionOutcome::InvalidRequest(invalid_decimal(amount, scale));
                record_metrics(&Ok(outcome.clone()), Duration::ZERO);
                Ok(outcome)
            },
        }
    }

    async fn run(
        &self,
        resource_id: ResourceId,
        amount: Quantity,
    ) -> Result<TransactionOutcome, EngineError> {
        if amount.is_zero() {
            return Ok(TransactionOutcome::InvalidRequest(
                InvalidRequest::NonPositiveAmount,
            ));
        }

        self.upstream.call().await;

        let store = &self.store;
        let result = retry_on_contention(&self.policy, |attempt| async move {
            tracing::debug!(attempt, "Attempting conditional decrement");
            let attempt = match store.decrement(resource_id, amount).await? {
                DecrementOutcome::Applied { remaining, receipt } => {
                    Attempt::Settled(Settled::Applied { remaining, receipt })
                },
                DecrementOutcome::Rejected(rejection) => {
                    Attempt::Settled(Settled::Rejected(rejection))
                },
                DecrementOutcome::ContentionBlocked => Attempt::Contended,
            };
            Ok::<_, StoreError>(attempt)
        })
        .await
        .inspect_err(|error| {
            tracing::error!(error = %error, "Store failure during transaction");
        })?;

        let outcome = classify(result);
        match &outcome {
            TransactionOutcome::Applied { remaining, receipt } => tracing::info!(
                receipt_id = %receipt.id,
                remaining = %remaining,
                "Transaction applied"
            ),
            TransactionOutcome::Rejected(rejection) => {
                tracing::debug!(reason = %rejection, "Transaction rejected");
            },
            TransactionOutcome::Busy { attempts } => {
                tracing::warn!(attempts, "Transaction busy after retries");
            },
            TransactionOutcome::InvalidRequest(_) => {},
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for TransactionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Map the retry loop's terminal result to a transaction outcome.
///
/// `Applied` and `Rejected` only come from a settled store attempt; `Busy`
/// only from an exhausted retry budget.
fn classify(result: RetryOutcome<Settled>) -> TransactionOutcome {
    match result {
        RetryOutcome::Settled {
            value: Settled::Applied { remaining, receipt },
            ..
        } => TransactionOutcome::Applied { remaining, receipt },
        RetryOutcome::Settled {
            value: Settled::Rejected(rejection),
            ..
        } => TransactionOutcome::Rejected(rejection),
        RetryOutcome::Exhausted { attempts } => TransactionOutcome::Busy { attempts },
    }
}

fn invalid_decimal(amount: f64, scale: u32) -> InvalidRequest {
    if amount.is_finite() && amount <= 0.0 {
        InvalidRequest::NonPositiveAmount
    } else {
        InvalidRequest::MalformedAmount(format!(
            "{amount} is not representable with {scale} decimal places"
        ))
    }
}

fn record_metrics(result: &Result<TransactionOutcome, EngineError>, elapsed: Duration) {
    match result {
        Ok(outcome) => {
            let disposition: Disposition = outcome.disposition();
            metrics::counter!("tally_transactions_total", "outcome" => disposition.as_str())
                .increment(1);
        },
        Err(_) => metrics::counter!("tally_store_errors_total").increment(1),
    }
    metrics::histogram!("tally_transaction_duration_seconds").record(elapsed.as_secs_f64());
}
