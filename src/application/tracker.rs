//! Follows a payment session until it reaches a terminal status.
//!
//! PIX sessions run two timers: a countdown that re-evaluates the deadline on
//! every tick, and a settlement poll against the processor. Both live inside
//! one task bound to a [`CancellationToken`], so they stop together when the
//! session settles, when the caller cancels or detaches, or when the handle is
//! dropped. Credit-card sessions have no timers and wait for the processor
//! callback to arrive through the state machine's change feed.

use super::session::PaymentSessionStateMachine;
use crate::config::TrackerConfig;
use crate::domain::payment::{PaymentSession, PaymentStatus, SessionId};
use crate::domain::ports::PaymentProcessorRef;
use crate::error::{CheckoutError, Result};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Snapshot published on every tick, for countdown display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerProgress {
    pub status: PaymentStatus,
    /// Whole seconds left in the PIX window, `None` for credit-card sessions.
    pub remaining_seconds: Option<i64>,
}

impl TrackerProgress {
    fn of(session: &PaymentSession, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            status: session.status,
            remaining_seconds: session.remaining(now).map(|r| r.num_seconds()),
        }
    }
}

#[derive(Debug)]
pub enum TrackingOutcome {
    /// The session reached a terminal status.
    Settled(PaymentSession),
    /// Tracking stopped before that; the session keeps its last known status.
    Detached,
}

/// Spawns trackers for payment sessions.
#[derive(Clone)]
pub struct SessionTracker {
    machine: Arc<PaymentSessionStateMachine>,
    processor: PaymentProcessorRef,
    config: TrackerConfig,
}

impl SessionTracker {
    pub fn new(
        machine: Arc<PaymentSessionStateMachine>,
        processor: PaymentProcessorRef,
        config: TrackerConfig,
    ) -> Self {
        Self {
            machine,
            processor,
            config,
        }
    }

    /// Starts following a stored session.
    pub async fn track(&self, id: SessionId) -> Result<TrackerHandle> {
        // Subscribe first so no transition slips between the read and the loop.
        let changes = self.machine.subscribe();
        let session = self.machine.get(id).await?;
        let (progress_tx, progress_rx) =
            watch::channel(TrackerProgress::of(&session, self.machine.clock().now()));
        let token = CancellationToken::new();

        let run = Run {
            machine: Arc::clone(&self.machine),
            processor: Arc::clone(&self.processor),
            config: self.config,
            progress: progress_tx,
            token: token.clone(),
        };
        let task = tokio::spawn(run.follow(session, changes));
        tracing::debug!(session = %id, "tracking started");

        Ok(TrackerHandle {
            id,
            machine: Arc::clone(&self.machine),
            progress: progress_rx,
            task,
            token: token.clone(),
            _teardown: token.drop_guard(),
        })
    }
}

/// Owner of a running tracker. Dropping it stops the timers.
pub struct TrackerHandle {
    id: SessionId,
    machine: Arc<PaymentSessionStateMachine>,
    progress: watch::Receiver<TrackerProgress>,
    task: JoinHandle<Result<TrackingOutcome>>,
    token: CancellationToken,
    _teardown: DropGuard,
}

impl TrackerHandle {
    pub fn progress(&self) -> watch::Receiver<TrackerProgress> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the session settles or tracking is stopped elsewhere.
    pub async fn finished(self) -> Result<TrackingOutcome> {
        let Self {
            task,
            _teardown: teardown,
            ..
        } = self;
        let outcome = join(task).await;
        drop(teardown);
        outcome
    }

    /// Cancels the payment on behalf of the buyer and stops both timers.
    pub async fn cancel(self) -> Result<PaymentSession> {
        let cancelled = self.machine.cancel(self.id).await;
        self.token.cancel();
        join(self.task).await?;
        cancelled
    }

    /// Stops observing without touching the session.
    pub async fn detach(self) -> Result<()> {
        self.token.cancel();
        join(self.task).await.map(|_| ())
    }
}

async fn join(task: JoinHandle<Result<TrackingOutcome>>) -> Result<TrackingOutcome> {
    task.await
        .map_err(|e| CheckoutError::InternalError(Box::new(e)))?
}

struct Run {
    machine: Arc<PaymentSessionStateMachine>,
    processor: PaymentProcessorRef,
    config: TrackerConfig,
    progress: watch::Sender<TrackerProgress>,
    token: CancellationToken,
}

impl Run {
    async fn follow(
        self,
        session: PaymentSession,
        mut changes: tokio::sync::broadcast::Receiver<super::session::SessionChange>,
    ) -> Result<TrackingOutcome> {
        let id = session.id;
        let timed = session.expires_at().is_some();
        let mut current = session;

        let mut countdown = time::interval(self.config.tick_interval);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut polling = time::interval(self.config.poll_interval);
        polling.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            if current.status.is_terminal() {
                break TrackingOutcome::Settled(current);
            }

            tokio::select! {
                biased;
                () = self.token.cancelled() => break TrackingOutcome::Detached,
                change = changes.recv() => match change {
                    Ok(change) if change.session.id == id => current = change.session,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(session = %id, skipped, "change feed lagged, reloading");
                        current = self.machine.get(id).await?;
                    }
                    Err(RecvError::Closed) => break TrackingOutcome::Detached,
                },
                _ = countdown.tick(), if timed => {
                    current = self.machine.evaluate(id).await?;
                }
                _ = polling.tick(), if timed => {
                    match self.poll(id).await? {
                        Some(session) => current = session,
                        None if self.token.is_cancelled() => break TrackingOutcome::Detached,
                        None => {}
                    }
                }
            }

            self.progress
                .send_replace(TrackerProgress::of(&current, self.machine.clock().now()));
        };

        self.token.cancel();
        if let TrackingOutcome::Settled(session) = &outcome {
            self.progress
                .send_replace(TrackerProgress::of(session, self.machine.clock().now()));
            tracing::info!(session = %id, status = %session.status, "tracking finished");
        } else {
            tracing::debug!(session = %id, "tracking detached");
        }
        Ok(outcome)
    }

    /// One settlement poll. Processor failures of any kind never change the
    /// session; they are logged and the next interval tries again, up to the
    /// deadline.
    async fn poll(&self, id: SessionId) -> Result<Option<PaymentSession>> {
        let fetched = tokio::select! {
            biased;
            () = self.token.cancelled() => return Ok(None),
            fetched = self.processor.fetch_status(id) => fetched,
        };

        let status = match fetched {
            Ok(status) => status,
            Err(err) if err.is_retryable() => {
                tracing::warn!(session = %id, error = %err, "status poll failed, will retry");
                return Ok(None);
            }
            Err(err) => {
                tracing::error!(session = %id, error = %err, "processor refused status poll, will retry");
                return Ok(None);
            }
        };
        tracing::debug!(session = %id, %status, "status polled");

        match self.machine.notify(id, status).await {
            Ok(session) => Ok(Some(session)),
            // The session settled some other way in between; keep what is stored.
            Err(CheckoutError::InvalidTransition { .. }) => Ok(Some(self.machine.get(id).await?)),
            Err(err) => Err(err),
        }
    }
}
