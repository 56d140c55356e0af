//! In-memory job store implementation for testing.
//!
//! This module provides [`InMemoryJobStore`], a simple in-memory
//! implementation of the [`JobStore`] trait suitable for testing and
//! development.
//!
//! Transactions are serialized: [`JobStore::begin_tx`] takes an owned lock on
//! the whole state and works on a private copy, which is written back on
//! commit and discarded on rollback (or when the transaction is dropped).
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process coordination
//! - **Single-process only**: State is not shared across process boundaries
//! - **No persistence**: All state is lost when the process exits

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use servo_core::{ExecutionId, JobId};

use super::{JobStore, Transaction, UpdateExecutionRequest};
use crate::error::{Error, Result};
use crate::models::{Evaluation, Execution, Job};

/// Store operations, used for failure injection and operation recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Opening a transaction.
    BeginTx,
    /// Reading a job.
    GetJob,
    /// Conditional execution update.
    UpdateExecution,
    /// Creating an evaluation.
    CreateEvaluation,
    /// Committing a transaction.
    Commit,
    /// Rolling back a transaction.
    Rollback,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,
    executions: HashMap<ExecutionId, Execution>,
    evaluations: Vec<Evaluation>,
}

/// In-memory job store for testing.
///
/// Cheap to clone; clones share state.
///
/// ## Example
///
/// ```rust
/// use servo_orchestrator::store::memory::InMemoryJobStore;
///
/// let store = InMemoryJobStore::new();
/// // Seed jobs and executions, then hand the store to a MessageHandler...
/// # let _ = store;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    state: Arc<tokio::sync::Mutex<StoreState>>,
    failures: Arc<Mutex<HashSet<StoreOp>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    latency: Option<Duration>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that delays every transaction start by `latency`.
    ///
    /// Use this to exercise store-operation timeouts.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Inserts or replaces a job.
    pub async fn insert_job(&self, job: Job) {
        self.state.lock().await.jobs.insert(job.id.clone(), job);
    }

    /// Inserts or replaces an execution.
    pub async fn insert_execution(&self, execution: Execution) {
        self.state
            .lock()
            .await
            .executions
            .insert(execution.id.clone(), execution);
    }

    /// Returns the committed state of an execution.
    pub async fn get_execution(&self, execution_id: &ExecutionId) -> Option<Execution> {
        self.state.lock().await.executions.get(execution_id).cloned()
    }

    /// Returns all committed evaluations in creation order.
    pub async fn evaluations(&self) -> Vec<Evaluation> {
        self.state.lock().await.evaluations.clone()
    }

    /// Returns committed evaluations for one job.
    pub async fn evaluations_for_job(&self, job_id: &JobId) -> Vec<Evaluation> {
        self.state
            .lock()
            .await
            .evaluations
            .iter()
            .filter(|e| &e.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Makes every subsequent `op` fail with a storage error.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn inject_failure(&self, op: StoreOp) -> Result<()> {
        self.failures.lock().map_err(poison_err)?.insert(op);
        Ok(())
    }

    /// Clears all injected failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn clear_failures(&self) -> Result<()> {
        self.failures.lock().map_err(poison_err)?.clear();
        Ok(())
    }

    /// Returns every operation attempted so far, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn operations(&self) -> Result<Vec<StoreOp>> {
        Ok(self.operations.lock().map_err(poison_err)?.clone())
    }

    fn enter(&self, op: StoreOp) -> Result<()> {
        self.operations.lock().map_err(poison_err)?.push(op);
        if self.failures.lock().map_err(poison_err)?.contains(&op) {
            return Err(Error::storage(format!("injected failure: {op:?}")));
        }
        Ok(())
    }
}

/// Transaction over an [`InMemoryJobStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    guard: Option<OwnedMutexGuard<StoreState>>,
    working: StoreState,
    store: InMemoryJobStore,
}

impl InMemoryTx {
    fn working_mut(&mut self) -> Result<&mut StoreState> {
        if self.guard.is_none() {
            return Err(Error::TransactionClosed);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl Transaction for InMemoryTx {
    async fn commit(&mut self) -> Result<()> {
        self.store.enter(StoreOp::Commit)?;
        let Some(mut guard) = self.guard.take() else {
            return Err(Error::TransactionClosed);
        };
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.store.enter(StoreOp::Rollback)?;
        if self.guard.take().is_some() {
            self.working = StoreState::default();
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    type Tx = InMemoryTx;

    async fn begin_tx(&self) -> Result<InMemoryTx> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.enter(StoreOp::BeginTx)?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx {
            guard: Some(guard),
            working,
            store: self.clone(),
        })
    }

    async fn get_job(&self, tx: &mut InMemoryTx, job_id: &JobId) -> Result<Job> {
        self.enter(StoreOp::GetJob)?;
        tx.working_mut()?
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::JobNotFound {
                job_id: job_id.clone(),
            })
    }

    async fn update_execution(
        &self,
        tx: &mut InMemoryTx,
        request: UpdateExecutionRequest,
    ) -> Result<()> {
        self.enter(StoreOp::UpdateExecution)?;
        let state = tx.working_mut()?;
        let Some(execution) = state.executions.get_mut(&request.execution_id) else {
            return Err(Error::ExecutionNotFound {
                execution_id: request.execution_id,
            });
        };

        request
            .condition
            .check(execution)
            .map_err(|reason| Error::ConditionNotMet {
                execution_id: request.execution_id.clone(),
                reason,
            })?;

        request.new_values.apply_to(execution);
        execution.events.extend(request.events);
        execution.revision += 1;
        execution.modify_time = Utc::now();
        Ok(())
    }

    async fn create_evaluation(&self, tx: &mut InMemoryTx, evaluation: Evaluation) -> Result<()> {
        self.enter(StoreOp::CreateEvaluation)?;
        let state = tx.working_mut()?;
        if state.evaluations.iter().any(|e| e.id == evaluation.id) {
            return Err(Error::storage(format!(
                "evaluation {} already exists",
                evaluation.id
            )));
        }
        state.evaluations.push(evaluation);
        Ok(())
    }
}
