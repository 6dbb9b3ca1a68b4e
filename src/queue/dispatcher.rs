//! Per-connector request queue dispatcher.
//!
//! Every connector gets one worker task owning a FIFO queue. The worker admits
//! at most one item at a time, spacing admissions per the connector's
//! [`ThrottleProfile`]: minimum spacing from `requests_per_minute`, a cooldown
//! after each full batch window, a longer pause when the remote rate-limits,
//! and a hard daily budget that resets at UTC midnight. Items admitted while a
//! connector is reconnecting would be wasted traffic, so admission is also
//! gated on the reconnect state machine.
//!
//! Workers communicate only through channels; no locks are held across
//! awaits. The dispatcher front-end is cheap to clone into API handlers via
//! `Arc`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::retry::{RetryConfig, retry_with};
use crate::client::{ConnectorError, ErrorKind};
use crate::connector::ConnectorId;
use crate::queue::item::{QueueItem, QueueState};
use crate::reconnect::ReconnectManager;
use crate::store::{ConnectorStore, StoreError};
use crate::throttle::ThrottleProfile;

/// Poll interval while admission is blocked on the reconnect gate.
const GATE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Fallback wake interval when the next UTC midnight cannot be computed.
const BUDGET_POLL_FALLBACK: Duration = Duration::from_secs(60);

/// A unit of work executed against a connector.
///
/// The closure receives a fresh child [`CancellationToken`] per attempt and
/// must abandon the call promptly once it fires. Returning a categorized
/// [`ConnectorError`] lets the worker's retry policy and throttle reactions
/// apply.
pub type UnitOfWork =
    Box<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<Value, ConnectorError>> + Send + Sync>;

/// Terminal outcome of a dispatched item, as seen by the submitter.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The work failed after its retry policy was exhausted.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// The store rejected the submission.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The item was cancelled before completion.
    #[error("item was cancelled before completion")]
    Cancelled,

    /// The dispatcher or its worker has shut down.
    #[error("dispatcher is shut down")]
    Closed,
}

/// Counters for one connector's queue, sampled at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Items accepted by `submit`.
    pub submitted: u64,
    /// Items that completed successfully.
    pub succeeded: u64,
    /// Items that failed after retry exhaustion.
    pub failed: u64,
    /// Items cancelled before completion.
    pub cancelled: u64,
    /// Rate-limit errors observed, including mid-retry ones.
    pub rate_limit_hits: u64,
    /// Items currently waiting for admission.
    pub depth: usize,
    /// Whether an item is currently executing.
    pub in_flight: bool,
    /// Whether the queue is paused.
    pub paused: bool,
}

/// Worker-side state visible to the dispatcher front-end without a channel
/// round trip.
#[derive(Debug)]
struct WorkerShared {
    depth: AtomicUsize,
    paused: AtomicBool,
    in_flight: AtomicBool,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rate_limit_hits: AtomicU64,
}

impl WorkerShared {
    fn new(paused: bool) -> Self {
        Self {
            depth: AtomicUsize::new(0),
            paused: AtomicBool::new(paused),
            in_flight: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::SeqCst),
            depth: self.depth.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            paused: self.paused.load(Ordering::SeqCst),
        }
    }
}

/// A submitted item waiting in a worker's queue.
struct PendingItem {
    item: QueueItem,
    work: UnitOfWork,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<Value, DispatchError>>,
}

/// The single item a worker currently has executing.
struct InFlightItem {
    item: QueueItem,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<Value, DispatchError>>,
}

enum Command {
    Submit(PendingItem),
    Cancel { item_id: i64 },
    Pause,
    Resume,
}

/// Events sent from the in-flight task back to its worker.
enum TaskEvent {
    /// A failed attempt was observed, possibly mid-retry.
    ErrorObserved {
        item_id: i64,
        kind: ErrorKind,
        retry_after: Option<Duration>,
        attempt: u32,
        message: String,
    },
    /// The item reached its terminal result.
    Finished {
        item_id: i64,
        result: Result<Value, DispatchError>,
    },
}

#[derive(Clone)]
struct WorkerHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<WorkerShared>,
}

/// Tracks one submitted item from the submitter's side.
///
/// Dropping the handle detaches from the item without cancelling it; call
/// [`SubmissionHandle::cancel`] to remove it.
pub struct SubmissionHandle {
    item_id: i64,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    reply: oneshot::Receiver<Result<Value, DispatchError>>,
}

impl SubmissionHandle {
    /// Returns the queue item id assigned at submission.
    #[must_use]
    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    /// Cancels the item. A pending item is removed without executing; an
    /// in-flight item has its cancellation token fired.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let _ = self.commands.send(Command::Cancel {
            item_id: self.item_id,
        });
    }

    /// Waits for the item's terminal result.
    ///
    /// # Errors
    ///
    /// Returns the item's [`DispatchError`], or [`DispatchError::Closed`] when
    /// the worker shut down before completing it.
    pub async fn wait(self) -> Result<Value, DispatchError> {
        self.reply.await.unwrap_or(Err(DispatchError::Closed))
    }
}

/// Front-end over all per-connector queue workers.
///
/// Workers are spawned lazily on first submission and live for the process
/// lifetime; the throttle profile and retry config are snapshotted at worker
/// start.
pub struct Dispatcher {
    store: Arc<dyn ConnectorStore>,
    reconnect: Arc<ReconnectManager>,
    retry: RetryConfig,
    workers: DashMap<ConnectorId, WorkerHandle>,
    next_item_id: AtomicI64,
    creation_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over the given store and reconnect manager.
    ///
    /// `retry` applies per item; it is snapshotted into each worker at spawn.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConnectorStore>,
        reconnect: Arc<ReconnectManager>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            reconnect,
            retry,
            workers: DashMap::new(),
            next_item_id: AtomicI64::new(1),
            creation_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Submits a unit of work to a connector's queue.
    ///
    /// The item is persisted, assigned an id, and appended in FIFO position.
    /// Submission never blocks on throttling; gating applies at admission.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] when the connector or its throttle
    /// profile cannot be read, or the item cannot be persisted, and
    /// [`DispatchError::Closed`] when the worker is gone.
    #[instrument(skip(self, payload, work))]
    pub async fn submit(
        &self,
        connector_id: ConnectorId,
        payload: impl Into<String>,
        work: UnitOfWork,
    ) -> Result<SubmissionHandle, DispatchError> {
        let handle = self.worker(connector_id).await?;

        let item_id = self.next_item_id.fetch_add(1, Ordering::SeqCst);
        let item = QueueItem::new(item_id, connector_id, payload);
        self.store.enqueue_persisted(&item).await?;

        let cancel = CancellationToken::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = PendingItem {
            item,
            work,
            cancel: cancel.clone(),
            reply: reply_tx,
        };

        handle.shared.depth.fetch_add(1, Ordering::SeqCst);
        handle.shared.submitted.fetch_add(1, Ordering::SeqCst);
        if handle.commands.send(Command::Submit(pending)).is_err() {
            handle.shared.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(DispatchError::Closed);
        }

        debug!(%connector_id, item_id, "item enqueued");
        Ok(SubmissionHandle {
            item_id,
            cancel,
            commands: handle.commands.clone(),
            reply: reply_rx,
        })
    }

    /// Pauses a connector's queue: pending items are held, the in-flight item
    /// finishes normally.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] when the connector is unknown.
    #[instrument(skip(self))]
    pub async fn pause(&self, connector_id: ConnectorId) -> Result<(), DispatchError> {
        let handle = self.worker(connector_id).await?;
        handle.shared.paused.store(true, Ordering::SeqCst);
        handle
            .commands
            .send(Command::Pause)
            .map_err(|_| DispatchError::Closed)?;
        info!(%connector_id, "queue paused");
        Ok(())
    }

    /// Resumes a paused queue.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] when the connector is unknown.
    #[instrument(skip(self))]
    pub async fn resume(&self, connector_id: ConnectorId) -> Result<(), DispatchError> {
        let handle = self.worker(connector_id).await?;
        handle.shared.paused.store(false, Ordering::SeqCst);
        handle
            .commands
            .send(Command::Resume)
            .map_err(|_| DispatchError::Closed)?;
        info!(%connector_id, "queue resumed");
        Ok(())
    }

    /// Requests cancellation of an item by id. Returns false when the
    /// connector has no worker.
    pub fn cancel_item(&self, connector_id: ConnectorId, item_id: i64) -> bool {
        self.workers
            .get(&connector_id)
            .is_some_and(|handle| handle.commands.send(Command::Cancel { item_id }).is_ok())
    }

    /// Returns the number of pending items for a connector (0 when no worker
    /// exists).
    #[must_use]
    pub fn depth(&self, connector_id: ConnectorId) -> usize {
        self.workers
            .get(&connector_id)
            .map_or(0, |handle| handle.shared.depth.load(Ordering::SeqCst))
    }

    /// Returns a point-in-time sample of a connector's queue counters.
    #[must_use]
    pub fn stats(&self, connector_id: ConnectorId) -> Option<DispatchStats> {
        self.workers
            .get(&connector_id)
            .map(|handle| handle.shared.snapshot())
    }

    /// Returns the reconnect manager this dispatcher gates admission on.
    #[must_use]
    pub fn reconnect(&self) -> &Arc<ReconnectManager> {
        &self.reconnect
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConnectorStore> {
        &self.store
    }

    /// Returns the existing worker handle or spawns one, reading the
    /// connector and its throttle profile from the store.
    async fn worker(&self, connector_id: ConnectorId) -> Result<WorkerHandle, DispatchError> {
        if let Some(handle) = self.workers.get(&connector_id) {
            return Ok(handle.clone());
        }

        // Serialize creation so concurrent first submissions spawn one worker.
        let _guard = self.creation_lock.lock().await;
        if let Some(handle) = self.workers.get(&connector_id) {
            return Ok(handle.clone());
        }

        let connector = self.store.read_connector(connector_id).await?;
        let profile = self
            .store
            .read_throttle_profile(connector.throttle_profile.as_deref())
            .await?;
        info!(
            %connector_id,
            profile = %profile.name,
            rpm = profile.requests_per_minute,
            "starting queue worker"
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WorkerShared::new(connector.queue_paused));
        let state = WorkerState {
            connector_id,
            profile,
            retry: self.retry.clone(),
            store: Arc::clone(&self.store),
            reconnect: Arc::clone(&self.reconnect),
            shared: Arc::clone(&shared),
            events_tx,
            queue: VecDeque::new(),
            in_flight: None,
            paused: connector.queue_paused,
            next_admit_at: Instant::now(),
            cooldown_until: None,
            admitted_in_window: 0,
            budget_day: Utc::now().date_naive(),
            admitted_today: 0,
        };
        tokio::spawn(worker_loop(state, commands_rx, events_rx));

        let handle = WorkerHandle {
            commands: commands_tx,
            shared,
        };
        self.workers.insert(connector_id, handle.clone());
        Ok(handle)
    }
}

/// All state owned by one connector's worker task.
struct WorkerState {
    connector_id: ConnectorId,
    profile: ThrottleProfile,
    retry: RetryConfig,
    store: Arc<dyn ConnectorStore>,
    reconnect: Arc<ReconnectManager>,
    shared: Arc<WorkerShared>,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
    queue: VecDeque<PendingItem>,
    in_flight: Option<InFlightItem>,
    paused: bool,
    /// Earliest next admission implied by `requests_per_minute` spacing.
    next_admit_at: Instant,
    /// Batch cooldown or rate-limit pause; longer deadline always wins.
    cooldown_until: Option<Instant>,
    admitted_in_window: u32,
    budget_day: NaiveDate,
    admitted_today: u32,
}

async fn worker_loop(
    mut state: WorkerState,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<TaskEvent>,
) {
    debug!(connector_id = %state.connector_id, "queue worker started");
    loop {
        let deadline = state.next_wake();
        let wake = tokio::select! {
            command = commands.recv() => Wake::Command(command),
            Some(event) = events.recv() => Wake::Event(event),
            () = sleep_until_opt(deadline) => Wake::Timer,
        };
        match wake {
            Wake::Command(None) => break,
            Wake::Command(Some(command)) => state.handle_command(command).await,
            Wake::Event(event) => state.handle_event(event).await,
            Wake::Timer => {}
        }
        state.try_admit().await;
    }
    debug!(connector_id = %state.connector_id, "queue worker stopped");
}

enum Wake {
    Command(Option<Command>),
    Event(TaskEvent),
    Timer,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Duration until the next UTC midnight, when the daily budget resets.
fn until_next_utc_day() -> Duration {
    let now = Utc::now();
    now.date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .map_or(BUDGET_POLL_FALLBACK, |midnight| {
            (midnight.and_utc() - now)
                .to_std()
                .unwrap_or(BUDGET_POLL_FALLBACK)
        })
}

impl WorkerState {
    /// Computes when the worker next needs to wake for admission, or `None`
    /// when only a command or event can unblock it.
    fn next_wake(&self) -> Option<Instant> {
        if self.paused || self.in_flight.is_some() || self.queue.is_empty() {
            return None;
        }
        if self.reconnect.is_gated(self.connector_id) {
            return Some(Instant::now() + GATE_POLL_INTERVAL);
        }
        if self.budget_exhausted() {
            return Some(Instant::now() + until_next_utc_day());
        }
        let mut at = self.next_admit_at;
        if let Some(cooldown) = self.cooldown_until {
            at = at.max(cooldown);
        }
        Some(at)
    }

    fn budget_exhausted(&self) -> bool {
        // A day rollover since the last admission clears the budget.
        if Utc::now().date_naive() != self.budget_day {
            return false;
        }
        self.profile
            .daily_budget
            .is_some_and(|budget| self.admitted_today >= budget)
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit(pending) => {
                self.queue.push_back(pending);
            }
            Command::Cancel { item_id } => self.cancel_item(item_id).await,
            Command::Pause => {
                self.paused = true;
                self.shared.paused.store(true, Ordering::SeqCst);
            }
            Command::Resume => {
                self.paused = false;
                self.shared.paused.store(false, Ordering::SeqCst);
            }
        }
    }

    async fn cancel_item(&mut self, item_id: i64) {
        if let Some(position) = self.queue.iter().position(|p| p.item.id == item_id) {
            if let Some(pending) = self.queue.remove(position) {
                self.shared.depth.fetch_sub(1, Ordering::SeqCst);
                pending.cancel.cancel();
                self.finish_cancelled(pending).await;
            }
        } else if let Some(in_flight) = &self.in_flight {
            if in_flight.item.id == item_id {
                // The in-flight task resolves itself to Cancelled.
                in_flight.cancel.cancel();
            }
        }
    }

    async fn handle_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::ErrorObserved {
                item_id,
                kind,
                retry_after,
                attempt,
                message,
            } => {
                // Attempt progress is persisted as it happens, not only at
                // the terminal state, so operators see mid-retry failures.
                if let Some(in_flight) = self.in_flight.as_mut() {
                    if in_flight.item.id == item_id {
                        in_flight.item.attempts = attempt;
                        in_flight.item.last_error = Some(message.clone());
                    }
                }
                if let Err(error) = self
                    .store
                    .record_attempt(item_id, attempt, Some(&message))
                    .await
                {
                    warn!(
                        connector_id = %self.connector_id,
                        item_id,
                        error = %error,
                        "failed to persist attempt progress"
                    );
                }

                if kind == ErrorKind::RateLimit {
                    self.shared.rate_limit_hits.fetch_add(1, Ordering::SeqCst);
                    // The retry that follows is an extra request the admission
                    // counter never saw; it still consumes daily budget.
                    self.admitted_today = self.admitted_today.saturating_add(1);
                    let pause = self
                        .profile
                        .rate_limit_pause()
                        .max(retry_after.unwrap_or(Duration::ZERO));
                    let until = Instant::now() + pause;
                    self.cooldown_until =
                        Some(self.cooldown_until.map_or(until, |current| current.max(until)));
                    info!(
                        connector_id = %self.connector_id,
                        item_id,
                        attempt,
                        pause_ms = pause.as_millis(),
                        "rate limited, pausing admissions"
                    );
                }
            }
            TaskEvent::Finished { item_id, result } => self.finish(item_id, result).await,
        }
    }

    async fn finish(&mut self, item_id: i64, result: Result<Value, DispatchError>) {
        let Some(mut in_flight) = self.in_flight.take() else {
            warn!(connector_id = %self.connector_id, item_id, "completion for unknown item");
            return;
        };
        self.shared.in_flight.store(false, Ordering::SeqCst);

        let terminal = match &result {
            Ok(_) => {
                self.shared.succeeded.fetch_add(1, Ordering::SeqCst);
                QueueState::Succeeded
            }
            Err(DispatchError::Cancelled) => {
                self.shared.cancelled.fetch_add(1, Ordering::SeqCst);
                QueueState::Cancelled
            }
            Err(error) => {
                self.shared.failed.fetch_add(1, Ordering::SeqCst);
                debug!(connector_id = %self.connector_id, item_id, error = %error, "item failed");
                QueueState::Failed
            }
        };
        // Error events only count failed attempts; a success closes with one
        // more executed attempt than the failures that preceded it.
        if result.is_ok() {
            in_flight.item.attempts += 1;
        }
        if let Err(error) = self
            .store
            .record_attempt(
                in_flight.item.id,
                in_flight.item.attempts,
                in_flight.item.last_error.as_deref(),
            )
            .await
        {
            warn!(
                connector_id = %self.connector_id,
                item_id,
                error = %error,
                "failed to persist final attempt count"
            );
        }
        if let Err(error) = self.store.mark_item_terminal(in_flight.item.id, terminal).await {
            warn!(
                connector_id = %self.connector_id,
                item_id,
                error = %error,
                "failed to persist terminal state"
            );
        }

        // Exhausted connectivity failures hand the connector to the reconnect
        // state machine; admission stays gated until a probe succeeds.
        if let Err(DispatchError::Connector(error)) = &result {
            if error.is_connectivity() {
                self.reconnect
                    .initialize_reconnect(self.connector_id, error)
                    .await;
            }
        }

        let _ = in_flight.reply.send(result);
    }

    /// Admits the front item when every gate clears. Called after each wake.
    async fn try_admit(&mut self) {
        // Items cancelled while pending are removed without executing,
        // regardless of pause or gating.
        while self
            .queue
            .front()
            .is_some_and(|pending| pending.cancel.is_cancelled())
        {
            if let Some(pending) = self.queue.pop_front() {
                self.shared.depth.fetch_sub(1, Ordering::SeqCst);
                self.finish_cancelled(pending).await;
            }
        }

        if self.paused || self.in_flight.is_some() || self.queue.is_empty() {
            return;
        }
        if self.reconnect.is_gated(self.connector_id) {
            return;
        }

        let now = Instant::now();
        if now < self.next_admit_at {
            return;
        }
        if self.cooldown_until.is_some_and(|until| now < until) {
            return;
        }

        let today = Utc::now().date_naive();
        if today != self.budget_day {
            self.budget_day = today;
            self.admitted_today = 0;
            self.admitted_in_window = 0;
        }
        if self
            .profile
            .daily_budget
            .is_some_and(|budget| self.admitted_today >= budget)
        {
            debug!(
                connector_id = %self.connector_id,
                admitted_today = self.admitted_today,
                "daily budget exhausted, holding queue until UTC midnight"
            );
            return;
        }

        let Some(pending) = self.queue.pop_front() else {
            return;
        };
        self.shared.depth.fetch_sub(1, Ordering::SeqCst);
        self.admit(pending);
    }

    fn admit(&mut self, pending: PendingItem) {
        let mut item = pending.item;
        item.state = QueueState::InFlight;

        self.next_admit_at = Instant::now() + self.profile.min_spacing();
        self.admitted_today += 1;
        self.admitted_in_window += 1;
        if self.profile.batch_size > 0 && self.admitted_in_window >= self.profile.batch_size {
            self.cooldown_until = Some(Instant::now() + self.profile.batch_cooldown());
            self.admitted_in_window = 0;
            debug!(
                connector_id = %self.connector_id,
                cooldown_ms = self.profile.batch_cooldown().as_millis(),
                "batch window full, cooling down"
            );
        }

        let item_id = item.id;
        debug!(connector_id = %self.connector_id, item_id, "item admitted");
        self.shared.in_flight.store(true, Ordering::SeqCst);

        let retry = self.retry.clone();
        let work = pending.work;
        let cancel = pending.cancel.clone();
        let events = self.events_tx.clone();
        self.in_flight = Some(InFlightItem {
            item,
            cancel: pending.cancel,
            reply: pending.reply,
        });

        tokio::spawn(async move {
            let attempt_cancel = cancel.clone();
            let observer_events = events.clone();
            let result = tokio::select! {
                () = cancel.cancelled() => Err(DispatchError::Cancelled),
                outcome = retry_with(
                    &retry,
                    |_| (work)(attempt_cancel.child_token()),
                    |error, attempt| {
                        let _ = observer_events.send(TaskEvent::ErrorObserved {
                            item_id,
                            kind: error.kind(),
                            retry_after: error.retry_after(),
                            attempt,
                            message: error.to_string(),
                        });
                    },
                ) => outcome.map_err(DispatchError::from),
            };
            let _ = events.send(TaskEvent::Finished { item_id, result });
        });
    }

    async fn finish_cancelled(&mut self, pending: PendingItem) {
        self.shared.cancelled.fetch_add(1, Ordering::SeqCst);
        if let Err(error) = self
            .store
            .mark_item_terminal(pending.item.id, QueueState::Cancelled)
            .await
        {
            warn!(
                connector_id = %self.connector_id,
                item_id = pending.item.id,
                error = %error,
                "failed to persist cancellation"
            );
        }
        debug!(connector_id = %self.connector_id, item_id = pending.item.id, "pending item cancelled");
        let _ = pending.reply.send(Err(DispatchError::Cancelled));
    }
}
