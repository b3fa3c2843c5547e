//! Single-flight run state: one run at a time, synchronous abort.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::TarkoError;

/// Lifecycle status of an agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentStatus {
    /// Ready to accept a run.
    Idle,
    /// A run is in flight.
    Executing,
    /// The last run was aborted. A new run may start.
    Aborted,
    /// The last run ended on a provider failure. A new run may start.
    Error,
}

#[derive(Debug)]
struct StateInner {
    status: AgentStatus,
    // Generation and cancel token of the in-flight run.
    active: Option<(u64, CancellationToken)>,
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<StateInner>,
    status_tx: watch::Sender<AgentStatus>,
    settled: Notify,
}

/// Shared run state of one agent.
///
/// All transitions happen under one lock, so `begin` and `abort` are
/// synchronous and never race each other.
#[derive(Debug, Clone)]
pub struct RunState {
    shared: Arc<Shared>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(AgentStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(StateInner {
                    status: AgentStatus::Idle,
                    active: None,
                    generation: 0,
                }),
                status_tx,
                settled: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, status: AgentStatus) {
        self.shared.status_tx.send_replace(status);
    }

    pub fn status(&self) -> AgentStatus {
        self.lock().status
    }

    /// Receiver that observes every status change.
    pub fn watch(&self) -> watch::Receiver<AgentStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Whether a run is still in flight (including one being aborted).
    pub fn is_running(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Claim the agent for a new run.
    ///
    /// Fails with [`TarkoError::AlreadyExecuting`] while another run is
    /// executing. `Aborted` and `Error` are not sticky.
    pub fn begin(&self) -> Result<ActiveRun, TarkoError> {
        let mut inner = self.lock();
        if inner.status == AgentStatus::Executing {
            return Err(TarkoError::AlreadyExecuting);
        }
        inner.generation += 1;
        let generation = inner.generation;
        let cancel = CancellationToken::new();
        inner.active = Some((generation, cancel.clone()));
        inner.status = AgentStatus::Executing;
        drop(inner);
        self.publish(AgentStatus::Executing);
        Ok(ActiveRun {
            state: self.clone(),
            generation,
            cancel,
        })
    }

    /// Abort the in-flight run.
    ///
    /// Flips the status to `Aborted` before returning. Returns `true` when a
    /// run is (or was already being) aborted, `false` when nothing runs.
    pub fn abort(&self) -> bool {
        let mut inner = self.lock();
        let Some((_, cancel)) = inner.active.clone() else {
            return false;
        };
        let changed = inner.status == AgentStatus::Executing;
        inner.status = AgentStatus::Aborted;
        drop(inner);
        cancel.cancel();
        if changed {
            self.publish(AgentStatus::Aborted);
        }
        true
    }

    /// Resolve once no run is in flight.
    pub async fn wait_until_settled(&self) {
        loop {
            let notified = self.shared.settled.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

/// Guard for one claimed run. Dropping it releases the agent.
#[derive(Debug)]
#[must_use = "dropping the run releases the agent immediately"]
pub struct ActiveRun {
    state: RunState,
    generation: u64,
    cancel: CancellationToken,
}

impl ActiveRun {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record a failed run. An abort that already happened wins.
    pub fn fail(&self) {
        let mut inner = self.state.lock();
        if inner.status == AgentStatus::Executing && self.owns(&inner) {
            inner.status = AgentStatus::Error;
            drop(inner);
            self.state.publish(AgentStatus::Error);
        }
    }

    fn owns(&self, inner: &StateInner) -> bool {
        matches!(&inner.active, Some((generation, _)) if *generation == self.generation)
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        let mut inner = self.state.lock();
        if !self.owns(&inner) {
            return;
        }
        inner.active = None;
        let settled = if inner.status == AgentStatus::Executing {
            inner.status = AgentStatus::Idle;
            Some(AgentStatus::Idle)
        } else {
            None
        };
        drop(inner);
        if let Some(status) = settled {
            self.state.publish(status);
        }
        self.state.shared.settled.notify_waiters();
    }
}
