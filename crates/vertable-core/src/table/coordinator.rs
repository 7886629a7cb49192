//! Multi-entry writes: transactions, chunked batches, and batch gets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::client::{StoreClient, TransactionOutcome};
use crate::config::StoreLimits;
use crate::error::{Error, Result};
use crate::item::StoredItem;
use crate::retry::RetryPolicy;
use crate::types::CompositeKey;
use crate::write::{ConstraintEntry, Statement, StatementBuilder, WriteEntry};

use super::executor::WriteExecutor;
use super::reasons::{decode_cancellation_reasons, dedupe_errors, error_from_batch_error};

/// Coordinates transactions and batches for one table.
pub struct Coordinator<C> {
    client: Arc<C>,
    executor: WriteExecutor<C>,
    builder: StatementBuilder,
    limits: StoreLimits,
    unprocessed_key_retries: u32,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl<C: StoreClient> Coordinator<C> {
    pub fn new(
        client: Arc<C>,
        builder: StatementBuilder,
        limits: StoreLimits,
        unprocessed_key_retries: u32,
        retry_policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self {
            executor: WriteExecutor::new(Arc::clone(&client)),
            client,
            builder,
            limits,
            unprocessed_key_retries,
            retry_policy,
        }
    }

    pub fn retry_policy(&self) -> &dyn RetryPolicy {
        self.retry_policy.as_ref()
    }

    pub(crate) fn set_retry_policy(&mut self, retry_policy: Arc<dyn RetryPolicy>) {
        self.retry_policy = retry_policy;
    }

    pub fn executor(&self) -> &WriteExecutor<C> {
        &self.executor
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Submit entries and constraints as one atomic transaction.
    ///
    /// Size is checked before anything is sent. A cancellation caused by a
    /// transaction conflict is resubmitted unchanged while the retry policy
    /// has budget left; any other cancellation, or a conflict once the budget
    /// is spent, fails with [`Error::TransactionCanceled`].
    pub async fn transact(
        &self,
        entries: Vec<WriteEntry>,
        constraints: Vec<ConstraintEntry>,
    ) -> Result<()> {
        let attempted = entries.len() + constraints.len();
        if attempted == 0 {
            return Ok(());
        }
        if attempted > self.limits.max_transaction_items {
            return Err(Error::ItemCollectionSizeLimitExceeded {
                attempted,
                max: self.limits.max_transaction_items,
            });
        }

        // 1. Render every statement up front; nothing is sent if one fails.
        let mut statements = Vec::with_capacity(attempted);
        for entry in &entries {
            statements.push(self.builder.for_entry(entry)?);
        }
        for constraint in &constraints {
            statements.push(self.builder.for_constraint(constraint)?);
        }

        // 2. Submit, resubmitting on conflict.
        let retries = self.retry_policy.retries();
        let mut remaining = retries;
        loop {
            let reasons = match self.client.execute_transaction(statements.clone()).await? {
                TransactionOutcome::Committed => return Ok(()),
                TransactionOutcome::Canceled(reasons) => reasons,
            };

            // 3. Decode; only a conflict is worth resubmitting.
            let errors = decode_cancellation_reasons(&reasons, &statements);
            let conflicted = errors
                .iter()
                .any(|e| matches!(e, Error::TransactionConflict { .. }));
            if !conflicted || remaining == 0 {
                if conflicted {
                    warn!(statements = statements.len(), "transaction conflict retries exhausted");
                }
                return Err(Error::TransactionCanceled(errors));
            }

            let delay = self.retry_policy.delay_for_attempt(retries - remaining);
            remaining -= 1;
            debug!(
                statements = statements.len(),
                remaining,
                delay_ms = delay.as_millis() as u64,
                "transaction conflict, resubmitting"
            );
            tokio::time::sleep(delay).await;
        }
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    /// Write entries as independent batch statements.
    ///
    /// A statement that is too long fails the whole call before anything is
    /// sent; use [`bulk_write_with_fallback`](Self::bulk_write_with_fallback)
    /// to run such entries on their own.
    pub async fn bulk_write(&self, entries: Vec<WriteEntry>) -> Result<()> {
        let statements = entries
            .iter()
            .map(|entry| self.builder.for_entry(entry))
            .collect::<Result<Vec<_>>>()?;
        finish_batch(self.execute_batches(statements).await)
    }

    /// Write entries as batch statements, executing over-length entries
    /// individually instead.
    pub async fn bulk_write_with_fallback(&self, entries: Vec<WriteEntry>) -> Result<()> {
        let mut statements = Vec::with_capacity(entries.len());
        let mut oversized = Vec::new();
        for entry in entries {
            match self.builder.for_entry(&entry) {
                Ok(statement) => statements.push(statement),
                Err(Error::StatementLengthExceeded { .. }) => oversized.push(entry),
                Err(e) => return Err(e),
            }
        }
        if !oversized.is_empty() {
            debug!(
                count = oversized.len(),
                "executing over-length entries individually"
            );
        }

        let individual = join_all(
            oversized
                .into_iter()
                .map(|entry| self.executor.execute(entry)),
        );
        let (mut errors, individual) = tokio::join!(self.execute_batches(statements), individual);
        errors.extend(individual.into_iter().filter_map(|result| result.err()));
        finish_batch(errors)
    }

    async fn execute_batches(&self, statements: Vec<Statement>) -> Vec<Error> {
        let chunk_size = self.limits.max_batch_statements.max(1);
        let chunks: Vec<Vec<Statement>> = statements
            .chunks(chunk_size)
            .map(<[Statement]>::to_vec)
            .collect();
        join_all(chunks.into_iter().map(|chunk| self.execute_chunk(chunk)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn execute_chunk(&self, chunk: Vec<Statement>) -> Vec<Error> {
        let keys: Vec<CompositeKey> = chunk.iter().map(|s| s.key().clone()).collect();
        let responses = match self.client.batch_execute(chunk).await {
            Ok(responses) => responses,
            Err(e) => {
                warn!(statements = keys.len(), error = %e, "batch chunk failed");
                return vec![e];
            }
        };

        let mut errors = Vec::new();
        if responses.len() != keys.len() {
            errors.push(Error::InternalServerError {
                message: format!(
                    "batch returned {} responses for {} statements",
                    responses.len(),
                    keys.len()
                ),
            });
        }
        errors.extend(
            responses
                .into_iter()
                .zip(&keys)
                .filter_map(|(response, key)| {
                    response
                        .error
                        .map(|error| error_from_batch_error(error, key))
                }),
        );
        errors
    }

    // -----------------------------------------------------------------------
    // Batch gets
    // -----------------------------------------------------------------------

    /// Fetch rows by key in chunks, asking again for unprocessed keys.
    ///
    /// Keys still unprocessed once the retry budget is spent fail the call
    /// with [`Error::ProvisionedThroughputExceeded`].
    pub async fn get_many(&self, keys: &[CompositeKey]) -> Result<HashMap<CompositeKey, StoredItem>> {
        let mut seen = HashSet::new();
        let mut pending: Vec<CompositeKey> = keys
            .iter()
            .filter(|key| seen.insert(*key))
            .cloned()
            .collect();
        let mut found = HashMap::with_capacity(pending.len());
        let mut remaining = self.unprocessed_key_retries;
        let chunk_size = self.limits.max_batch_get_keys.max(1);

        while !pending.is_empty() {
            let requests = pending
                .chunks(chunk_size)
                .map(|chunk| self.client.batch_get_item(chunk.to_vec()));
            let mut errors = Vec::new();
            let mut unprocessed = Vec::new();
            for result in join_all(requests).await {
                match result {
                    Ok(output) => {
                        for item in output.items {
                            found.insert(item.key.clone(), item);
                        }
                        unprocessed.extend(output.unprocessed_keys);
                    }
                    Err(e) => errors.push(e),
                }
            }

            match errors.len() {
                0 => {}
                1 => return Err(errors.swap_remove(0)),
                _ => return Err(Error::MultipleUnexpectedErrors(errors)),
            }
            if unprocessed.is_empty() {
                break;
            }
            if remaining == 0 {
                warn!(unprocessed = unprocessed.len(), "batch get gave up on unprocessed keys");
                return Err(Error::ProvisionedThroughputExceeded {
                    message: format!(
                        "{} keys still unprocessed after {} retries",
                        unprocessed.len(),
                        self.unprocessed_key_retries
                    ),
                });
            }
            let delay = self
                .retry_policy
                .delay_for_attempt(self.unprocessed_key_retries - remaining);
            remaining -= 1;
            debug!(unprocessed = unprocessed.len(), remaining, "retrying unprocessed keys");
            tokio::time::sleep(delay).await;
            pending = unprocessed;
        }
        Ok(found)
    }
}

fn finish_batch(errors: Vec<Error>) -> Result<()> {
    let errors = dedupe_errors(errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::BatchFailures(errors))
    }
}
