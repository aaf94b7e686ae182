//! Block-triggered submission loop.
//!
//! # Responsibilities
//! - Drive one deposit task through its phases
//! - Attempt a deposit on every new block (recurring) or until the first
//!   accepted deposit (single-shot)
//! - Schedule retries for transient failures without consuming the nonce
//! - Stop cleanly on request: unsubscribe, drop the retry timer, discard
//!   results that arrive after the stop
//!
//! # Design Decisions
//! - Explicit `Phase` enum and a single dispatcher; each step returns the
//!   next transition and owns no control flow beyond it
//! - All mutable state lives in the loop; the handle only shares a stop flag
//!   (`watch` channel) and observes the current phase
//! - Network calls in flight are never aborted; the stop flag is checked
//!   when they return. Waits (blocks, retry timer, approval inclusion) end
//!   as soon as the stop flag is set
//!
//! # Phases
//! ```text
//! Idle → AuthorizingAllowance → AwaitingNonce → Armed
//!                                                 ↓ block
//!                       Armed ← SubmittingOnBlock ⇄ RetryScheduled
//! any phase → Stopped
//! ```

use alloy::primitives::TxHash;
use futures_util::{FutureExt, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};

use crate::blockchain::client::NodeClient;
use crate::blockchain::types::{BlockStream, BlockchainError};
use crate::broadcast::{classify, BroadcastGateway, Disposition};
use crate::config::schema::{DepositConfig, SubmissionMode};
use crate::deposit::allowance::AllowanceGuard;
use crate::deposit::nonce::NonceSequencer;
use crate::deposit::sink::{ProgressSink, TracingSink};
use crate::deposit::task::{build_gateway, connect_node, DepositTask};
use crate::deposit::{DepositError, DepositResult};
use crate::observability::metrics;
use crate::resilience::{RetryRefusal, RetryTracker};

/// Lifecycle phase of a deposit task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AuthorizingAllowance,
    AwaitingNonce,
    Armed,
    SubmittingOnBlock { block: u64 },
    RetryScheduled { block: u64 },
    Stopped,
}

/// Why a task reached `Stopped`.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// The handle requested a stop.
    Cancelled,
    /// Single-shot mode and the deposit was accepted.
    Completed,
    /// A fatal error ended the task.
    Failed(DepositError),
}

/// Final report of a task.
#[derive(Debug, Clone)]
pub struct DepositOutcome {
    pub reason: StopReason,
    /// Hashes of accepted deposits, in submission order.
    pub submissions: Vec<TxHash>,
    /// Next unused nonce, if the sequencer was primed.
    pub nonce_cursor: Option<u64>,
}

impl DepositOutcome {
    /// The error that ended the task, if any.
    pub fn error(&self) -> Option<&DepositError> {
        match &self.reason {
            StopReason::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Everything a task needs before it starts.
pub struct DepositEngine {
    task: DepositTask,
    node: Arc<dyn NodeClient>,
    gateway: BroadcastGateway,
    sink: Arc<dyn ProgressSink>,
}

impl DepositEngine {
    /// Create an engine over an existing node connection and gateway.
    pub fn new(task: DepositTask, node: Arc<dyn NodeClient>, gateway: BroadcastGateway) -> Self {
        Self {
            task,
            node,
            gateway,
            sink: Arc::new(TracingSink),
        }
    }

    /// Build an engine from configuration: read secrets, connect the node,
    /// select the gateway.
    pub async fn from_config(config: &DepositConfig) -> DepositResult<Self> {
        let task = DepositTask::from_env(config)?;
        let node = connect_node(config).await?;
        let gateway = build_gateway(config, node.clone()).await?;
        Ok(Self::new(task, node, gateway))
    }

    /// Replace the default `TracingSink`.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Spawn the task on the current runtime.
    pub fn start(self) -> DepositHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);

        tracing::info!(
            address = %self.task.identity.address(),
            target = %self.task.target,
            amount = %self.task.amount,
            path = self.gateway.path(),
            "Deposit task starting"
        );

        let submission_loop = SubmissionLoop {
            task: self.task,
            node: self.node,
            gateway: self.gateway,
            sink: self.sink,
            nonces: NonceSequencer::new(),
            retries: RetryTracker::default(),
            phase: Phase::Idle,
            phase_tx,
            stop_rx,
            chain_id: 0,
            blocks: None,
            pending_retry: None,
            submissions: Vec::new(),
            reason: None,
        };

        DepositHandle {
            stop_tx,
            phase_rx,
            join: tokio::spawn(submission_loop.run()),
        }
    }
}

/// Caller side of a running task.
///
/// Dropping the handle stops the task.
pub struct DepositHandle {
    stop_tx: watch::Sender<bool>,
    phase_rx: watch::Receiver<Phase>,
    join: JoinHandle<DepositOutcome>,
}

impl DepositHandle {
    /// Request a stop. Idempotent; returns `true` only for the first call.
    pub fn stop(&self) -> bool {
        let first = self.stop_tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });

        if first {
            tracing::info!("Deposit task stop requested");
        }
        first
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Current phase of the task.
    pub fn phase(&self) -> Phase {
        *self.phase_rx.borrow()
    }

    /// Wait until the phase satisfies `predicate`, and return it.
    ///
    /// Returns the last published phase if the task ended first.
    pub async fn wait_for_phase(&mut self, mut predicate: impl FnMut(&Phase) -> bool) -> Phase {
        let seen = self.phase_rx.wait_for(|phase| predicate(phase)).await.map(|phase| *phase);
        seen.unwrap_or_else(|_| *self.phase_rx.borrow())
    }

    /// Wait until the task reaches `Stopped`.
    pub async fn finished(&mut self) {
        self.wait_for_phase(|phase| *phase == Phase::Stopped).await;
    }

    /// Wait for the task to end and collect its outcome.
    pub async fn join(self) -> DepositOutcome {
        let DepositHandle { stop_tx, join, .. } = self;

        let outcome = match join.await {
            Ok(outcome) => outcome,
            Err(e) => DepositOutcome {
                reason: StopReason::Failed(DepositError::TaskAborted(e.to_string())),
                submissions: Vec::new(),
                nonce_cursor: None,
            },
        };

        drop(stop_tx);
        outcome
    }
}

/// Result of one step.
enum Step {
    Goto(Phase),
    Stop(StopReason),
}

/// What woke a waiting phase.
enum Wake {
    Stop,
    Block(Option<u64>),
    RetryDue,
}

struct SubmissionLoop {
    task: DepositTask,
    node: Arc<dyn NodeClient>,
    gateway: BroadcastGateway,
    sink: Arc<dyn ProgressSink>,
    nonces: NonceSequencer,
    retries: RetryTracker,
    phase: Phase,
    phase_tx: watch::Sender<Phase>,
    stop_rx: watch::Receiver<bool>,
    chain_id: u64,
    blocks: Option<BlockStream>,
    pending_retry: Option<Pin<Box<Sleep>>>,
    submissions: Vec<TxHash>,
    reason: Option<StopReason>,
}

impl SubmissionLoop {
    async fn run(mut self) -> DepositOutcome {
        loop {
            if self.phase == Phase::Stopped {
                break;
            }

            if self.is_stopped() {
                self.halt(StopReason::Cancelled);
                break;
            }

            let step = match self.phase {
                Phase::Idle => self.resolve_chain().await,
                Phase::AuthorizingAllowance => self.authorize().await,
                Phase::AwaitingNonce => self.subscribe().await,
                Phase::Armed => self.wait_for_block().await,
                Phase::SubmittingOnBlock { block } => self.attempt(block).await,
                Phase::RetryScheduled { block } => self.wait_for_retry(block).await,
                Phase::Stopped => break,
            };

            match step {
                Step::Goto(next) => self.enter(next),
                Step::Stop(reason) => self.halt(reason),
            }
        }

        DepositOutcome {
            reason: self.reason.take().unwrap_or(StopReason::Cancelled),
            submissions: std::mem::take(&mut self.submissions),
            nonce_cursor: self.nonces.peek().ok(),
        }
    }

    /// Stop flag, or the handle is gone.
    fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err()
    }

    fn enter(&mut self, next: Phase) {
        tracing::debug!(from = ?self.phase, to = ?next, "Phase transition");
        self.phase = next;
        self.phase_tx.send_replace(next);
    }

    fn halt(&mut self, reason: StopReason) {
        self.blocks = None;
        self.pending_retry = None;

        match &reason {
            StopReason::Failed(e) => {
                tracing::error!(phase = ?self.phase, error = %e, "Deposit task failed");
                self.sink.error(&e.to_string());
            }
            StopReason::Completed => tracing::info!("Deposit task completed"),
            StopReason::Cancelled => tracing::info!(phase = ?self.phase, "Deposit task cancelled"),
        }

        self.sink.progress("deposit task stopped");
        self.reason = Some(reason);
        self.enter(Phase::Stopped);
    }

    /// Idle: learn (or verify) the chain ID.
    async fn resolve_chain(&mut self) -> Step {
        let actual = match self.node.chain_id().await {
            Ok(id) => id,
            Err(e) => return Step::Stop(StopReason::Failed(e.into())),
        };

        if let Some(expected) = self.task.chain_id {
            if expected != actual {
                let mismatch = BlockchainError::ChainMismatch { expected, actual };
                return Step::Stop(StopReason::Failed(mismatch.into()));
            }
        }

        self.chain_id = actual;
        Step::Goto(Phase::AuthorizingAllowance)
    }

    /// AuthorizingAllowance: ensure the vault may pull the deposit, then prime the nonce.
    async fn authorize(&mut self) -> Step {
        let guard = AllowanceGuard::new(
            self.node.clone(),
            self.task.token,
            self.chain_id,
            self.task.gas_limit,
            self.task.gas_price,
        )
        .with_policy(self.task.approval)
        .with_inclusion_wait(self.task.receipt_poll_interval, self.task.approval_timeout);

        let authorizing = guard.ensure_authorized(
            &self.task.identity,
            self.task.target,
            self.task.amount,
            &self.gateway,
            self.sink.as_ref(),
        );

        // A stop abandons the inclusion wait; an approval already sent may still be mined
        let authorized = tokio::select! {
            biased;
            _ = stop_requested(&mut self.stop_rx) => None,
            result = authorizing => Some(result),
        };

        match authorized {
            None => return Step::Stop(StopReason::Cancelled),
            Some(Err(e)) => return Step::Stop(StopReason::Failed(e)),
            Some(Ok(_)) => {}
        }

        if self.is_stopped() {
            return Step::Stop(StopReason::Cancelled);
        }

        let address = self.task.identity.address();
        match self.nonces.initialize(self.node.as_ref(), address).await {
            Ok(nonce) => {
                self.sink.progress(&format!("current nonce: {}", nonce));
                Step::Goto(Phase::AwaitingNonce)
            }
            Err(e) => Step::Stop(StopReason::Failed(e)),
        }
    }

    /// AwaitingNonce: open the block subscription.
    async fn subscribe(&mut self) -> Step {
        match self.node.subscribe_blocks().await {
            Ok(stream) => {
                self.blocks = Some(stream);
                self.sink.progress("waiting for new blocks");
                Step::Goto(Phase::Armed)
            }
            Err(e) => Step::Stop(StopReason::Failed(e.into())),
        }
    }

    /// Armed: wait for the next block, coalescing any backlog to the latest one.
    async fn wait_for_block(&mut self) -> Step {
        let Some(blocks) = self.blocks.as_mut() else {
            return Step::Stop(StopReason::Failed(DepositError::SubscriptionClosed));
        };

        let wake = tokio::select! {
            biased;
            _ = stop_requested(&mut self.stop_rx) => Wake::Stop,
            next = blocks.next() => Wake::Block(next),
        };

        let mut block = match wake {
            Wake::Block(Some(number)) => number,
            Wake::Block(None) => return Step::Stop(StopReason::Failed(DepositError::SubscriptionClosed)),
            Wake::Stop | Wake::RetryDue => return Step::Stop(StopReason::Cancelled),
        };

        // Coalesce notifications that queued up meanwhile
        if let Some(blocks) = self.blocks.as_mut() {
            while let Some(Some(later)) = blocks.next().now_or_never() {
                block = block.max(later);
            }
        }

        metrics::record_block(block);
        self.sink.progress(&format!("new block {}, attempting deposit", block));
        Step::Goto(Phase::SubmittingOnBlock { block })
    }

    /// RetryScheduled: wait for the timer, then retry in the same block context.
    async fn wait_for_retry(&mut self, block: u64) -> Step {
        if let Some(timer) = self.pending_retry.as_mut() {
            let wake = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => Wake::Stop,
                _ = timer => Wake::RetryDue,
            };

            if let Wake::Stop = wake {
                return Step::Stop(StopReason::Cancelled);
            }
        }

        self.pending_retry = None;
        Step::Goto(Phase::SubmittingOnBlock { block })
    }

    /// SubmittingOnBlock: simulate, sign, submit.
    async fn attempt(&mut self, block: u64) -> Step {
        let nonce = match self.nonces.peek() {
            Ok(nonce) => nonce,
            Err(e) => return Step::Stop(StopReason::Failed(e)),
        };
        let tx = self.task.deposit_tx(nonce, self.chain_id);

        // 1. Pre-flight simulation
        let simulated = self.node.estimate_gas(&tx.to_request()).await;
        if self.is_stopped() {
            return Step::Stop(StopReason::Cancelled);
        }
        if let Err(e) = simulated {
            tracing::warn!(block, nonce, error = %e, "Deposit simulation failed");
            metrics::record_attempt("simulation_failed");
            return self.schedule_retry(block, "simulation", e.to_string());
        }

        // 2. Sign
        let signed = match self.task.identity.sign(&tx).await {
            Ok(signed) => signed,
            Err(e) => return Step::Stop(StopReason::Failed(e.into())),
        };

        // 3. Submit
        let submitted = self.gateway.submit(&signed, block).await;
        let error = match submitted {
            Ok(receipt) => return self.accept(receipt.transaction_hash, block),
            Err(e) => e,
        };

        if self.is_stopped() {
            return Step::Stop(StopReason::Cancelled);
        }

        let kind = classify(&error);
        match kind.disposition() {
            Disposition::TreatAsAccepted => {
                tracing::debug!(tx_hash = %signed.hash, "Deposit already known to the node");
                self.accept(signed.hash, block)
            }
            Disposition::Retry => {
                tracing::warn!(block, nonce, kind = kind.as_str(), error = %error, "Deposit rejected, will retry");
                metrics::record_attempt("rejected");
                self.schedule_retry(block, kind.as_str(), error.to_string())
            }
            Disposition::ResyncNonceAndRetry => {
                metrics::record_attempt("rejected");
                match self.node.transaction_count(self.task.identity.address()).await {
                    Ok(count) => {
                        if let Err(e) = self.nonces.resync(count) {
                            return Step::Stop(StopReason::Failed(e));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Nonce resync failed, retrying with current cursor"),
                }
                self.schedule_retry(block, kind.as_str(), error.to_string())
            }
            Disposition::Fatal => {
                metrics::record_attempt("fatal");
                Step::Stop(StopReason::Failed(DepositError::Broadcast(error)))
            }
        }
    }

    /// Count an accepted deposit: consume the nonce, report, continue or finish.
    fn accept(&mut self, tx_hash: TxHash, block: u64) -> Step {
        let nonce = match self.nonces.next() {
            Ok(nonce) => nonce,
            Err(e) => return Step::Stop(StopReason::Failed(e)),
        };

        self.submissions.push(tx_hash);
        self.retries.reset();
        metrics::record_attempt("submitted");
        metrics::record_submission(self.gateway.path());

        if self.is_stopped() {
            tracing::debug!(tx_hash = %tx_hash, "Discarding submission result after stop");
            return Step::Stop(StopReason::Cancelled);
        }

        tracing::info!(tx_hash = %tx_hash, nonce, block, path = self.gateway.path(), "Deposit submitted");
        self.sink.progress(&format!("deposit sent, tx hash {}", tx_hash));

        match self.task.mode {
            SubmissionMode::SingleShot => Step::Stop(StopReason::Completed),
            SubmissionMode::Recurring => Step::Goto(Phase::Armed),
        }
    }

    fn schedule_retry(&mut self, block: u64, cause: &'static str, last_error: String) -> Step {
        match self.retries.record(&self.task.retry) {
            Ok(retry) => {
                let delay = self.task.retry.delay();
                self.pending_retry = Some(Box::pin(sleep(delay)));
                metrics::record_retry(cause);

                tracing::info!(block, retry, cause, delay_ms = delay.as_millis() as u64, "Retry scheduled");
                self.sink.progress(&format!("retrying in {}ms", delay.as_millis()));
                Step::Goto(Phase::RetryScheduled { block })
            }
            Err(RetryRefusal::CountExhausted { retries }) => Step::Stop(StopReason::Failed(DepositError::RetriesExhausted {
                attempts: retries + 1,
                last_error,
            })),
            Err(RetryRefusal::DeadlineExceeded { .. }) => {
                let secs = self.task.retry.deadline.map(|d| d.as_secs()).unwrap_or_default();
                Step::Stop(StopReason::Failed(DepositError::DeadlineExceeded { secs }))
            }
        }
    }
}

/// Resolve once a stop is requested or the handle is dropped.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}
