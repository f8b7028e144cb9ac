//! Background Sync Loop
//!
//! Drains the pending-award queue into the remote service on a fixed
//! interval and reconciles the optimistic ledger with the server's totals.
//!
//! Per item outcome:
//!
//! | Result                     | Action                                   |
//! |----------------------------|------------------------------------------|
//! | applied, with totals       | overwrite local totals with the server's |
//! | already awarded            | leave local totals alone                 |
//! | unauthorized               | requeue item and rest of batch, stop     |
//! | rejected / undecodable     | drop permanently, log                    |
//! | transport error / timeout  | requeue item, continue with next         |
//!
//! At most one pass runs at a time per store. A pass takes the whole queue
//! in one locked step; awards made while it runs land in a fresh queue.
//! Results for a session that has since ended are discarded. A pass that is
//! dropped before it finishes puts its unsent awards back on the queue.

use crate::error::{FailureClass, RemoteError};
use crate::events::AwardEvent;
use crate::ledger::{AwardDisposition, Reconciliation};
use crate::remote::{AwardRequest, AwardResponse};
use crate::store::{ProgressStore, StoreState, WeakProgressStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sync health as shown to the UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Awards waiting in the queue
    pub pending: usize,
    pub in_flight: bool,
    pub last_pass_at: Option<DateTime<Utc>>,
    /// Passes in a row halted by an authorization failure
    pub consecutive_auth_failures: u32,
    /// Ask the user to sign in again
    pub needs_reauth: bool,
    pub confirmed_awards: u64,
    /// Awards the server refused for good (local XP was kept)
    pub dropped_awards: u64,
}

/// Why a pass did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    EmptyQueue,
    NoSession,
    /// No usable auth token
    SyncDisabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub skipped: Option<SkipReason>,
    pub submitted: usize,
    pub confirmed: usize,
    pub replayed: usize,
    pub requeued: usize,
    pub dropped: usize,
    pub halted_by_auth: bool,
    /// Session ended mid-pass; remaining results were ignored
    pub stale: bool,
}

impl SyncReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

/// A batch taken from the queue for one pass.
///
/// Until `finished` is set, dropping the batch returns the item being
/// submitted and everything after it to the queue and clears the in-flight
/// flag.
struct SyncBatch<'a> {
    store: &'a ProgressStore,
    session_id: Uuid,
    token: String,
    current: Option<AwardEvent>,
    items: VecDeque<AwardEvent>,
    finished: bool,
}

impl Drop for SyncBatch<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.store.lock();
        if state.session.as_ref().map(|s| s.id) != Some(self.session_id) {
            return;
        }
        let unsent: Vec<AwardEvent> = self
            .current
            .take()
            .into_iter()
            .chain(self.items.drain(..))
            .collect();
        warn!("Sync pass cancelled; returning {} awards to the queue", unsent.len());
        for event in unsent {
            state.queue.requeue(event);
        }
        state.sync.in_flight = false;
    }
}

enum ItemOutcome {
    Confirmed,
    Replayed,
    Requeued,
    Dropped,
    /// Auth failure; this item and the given number of remaining ones were requeued
    Halt { rest: usize },
}

pub struct SyncLoop {
    store: ProgressStore,
}

impl SyncLoop {
    pub fn new(store: ProgressStore) -> Self {
        Self { store }
    }

    /// Take the queue if a pass may start
    fn begin(&self) -> Result<SyncBatch<'_>, SkipReason> {
        let token = self.store.auth_token();
        let mut state = self.store.lock();

        if state.sync.in_flight {
            return Err(SkipReason::InFlight);
        }
        let session_id = state
            .session
            .as_ref()
            .map(|s| s.id)
            .ok_or(SkipReason::NoSession)?;
        if state.queue.is_empty() {
            return Err(SkipReason::EmptyQueue);
        }
        let token = token.ok_or(SkipReason::SyncDisabled)?;

        state.sync.in_flight = true;
        Ok(SyncBatch {
            store: &self.store,
            session_id,
            token,
            current: None,
            items: state.queue.take_batch().into(),
            finished: false,
        })
    }

    /// Run one pass over the current queue
    pub async fn run_pass(&self) -> SyncReport {
        let mut batch = match self.begin() {
            Ok(batch) => batch,
            Err(reason) => return SyncReport::skipped(reason),
        };

        let config = &self.store.config().sync;
        let timeout = self.store.config().remote.effective_request_timeout();
        let item_delay = config.effective_item_delay();
        let mut report = SyncReport::default();

        debug!("Sync pass started with {} awards", batch.items.len());

        while let Some(event) = batch.items.pop_front() {
            report.submitted += 1;
            batch.current = Some(event.clone());
            let result = self.submit(&event, &batch.token, timeout).await;
            batch.current = None;

            let outcome = {
                let mut state = self.store.lock();
                if state.session.as_ref().map(|s| s.id) != Some(batch.session_id) {
                    None
                } else {
                    Some(apply_result(&mut state, event, result, &mut batch.items))
                }
            };

            match outcome {
                None => {
                    debug!("Session ended during sync pass; discarding results");
                    report.stale = true;
                    break;
                }
                Some(ItemOutcome::Confirmed) => report.confirmed += 1,
                Some(ItemOutcome::Replayed) => report.replayed += 1,
                Some(ItemOutcome::Requeued) => report.requeued += 1,
                Some(ItemOutcome::Dropped) => report.dropped += 1,
                Some(ItemOutcome::Halt { rest }) => {
                    report.requeued += 1 + rest;
                    report.halted_by_auth = true;
                    break;
                }
            }

            if !batch.items.is_empty() && !item_delay.is_zero() {
                tokio::time::sleep(item_delay).await;
            }
        }

        batch.finished = true;
        let session_id = batch.session_id;
        drop(batch);
        self.finish(session_id, &report);
        report
    }

    async fn submit(
        &self,
        event: &AwardEvent,
        token: &str,
        timeout: Duration,
    ) -> Result<AwardResponse, RemoteError> {
        let request = AwardRequest {
            amount: event.amount,
            event_key: event.event_key.clone(),
        };
        match tokio::time::timeout(timeout, self.store.remote().award(&request, token)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(timeout)),
        }
    }

    fn finish(&self, session_id: Uuid, report: &SyncReport) {
        let threshold = self.store.config().sync.effective_auth_warning_threshold();
        let mut state = self.store.lock();
        if state.session.as_ref().map(|s| s.id) != Some(session_id) {
            return;
        }

        let sync = &mut state.sync;
        sync.in_flight = false;
        sync.last_pass_at = Some(Utc::now());
        sync.confirmed_awards += (report.confirmed + report.replayed) as u64;
        sync.dropped_awards += report.dropped as u64;

        if report.halted_by_auth {
            sync.consecutive_auth_failures += 1;
            warn!(
                "Sync halted by authorization failure ({} in a row)",
                sync.consecutive_auth_failures
            );
            if sync.consecutive_auth_failures >= threshold && !sync.needs_reauth {
                warn!("Repeated authorization failures; user should sign in again");
                sync.needs_reauth = true;
            }
        } else if report.confirmed + report.replayed > 0 {
            sync.consecutive_auth_failures = 0;
            sync.needs_reauth = false;
        }

        if report.submitted > 0 {
            info!(
                "Sync pass: submitted={} confirmed={} replayed={} requeued={} dropped={}",
                report.submitted, report.confirmed, report.replayed, report.requeued, report.dropped
            );
        }
    }

    /// Run passes on the configured interval until stopped, until the
    /// session this loop was started under ends, or until every store handle
    /// is dropped
    pub fn spawn(self) -> SyncHandle {
        let interval = self.store.config().sync.effective_interval();
        let session_id = self.store.session_id();
        let store = self.store.downgrade();
        let (shutdown, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_loop(store, session_id, interval, stop_rx));
        SyncHandle { shutdown, task }
    }
}

async fn run_loop(
    store: WeakProgressStore,
    session_id: Option<Uuid>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;
    info!("Sync loop started (every {:?})", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let Some(store) = store.upgrade() else {
            debug!("Progress store dropped; sync loop exiting");
            break;
        };
        if store.session_id() != session_id {
            debug!("Session changed; sync loop exiting");
            break;
        }
        SyncLoop::new(store).run_pass().await;
    }
    info!("Sync loop stopped");
}

/// Map one submission result onto the store. Runs under the store lock.
fn apply_result(
    state: &mut StoreState,
    event: AwardEvent,
    result: Result<AwardResponse, RemoteError>,
    rest: &mut VecDeque<AwardEvent>,
) -> ItemOutcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            return match err.class() {
                FailureClass::Authorization => {
                    warn!("Authorization failed syncing {}; will retry", event.event_key);
                    state.queue.requeue(event);
                    let remaining = rest.len();
                    for event in rest.drain(..) {
                        state.queue.requeue(event);
                    }
                    ItemOutcome::Halt { rest: remaining }
                }
                FailureClass::Rejected => {
                    warn!("Dropping award {}: {}", event.event_key, err);
                    ItemOutcome::Dropped
                }
                FailureClass::Transient => {
                    warn!("Network error syncing {}: {}; will retry", event.event_key, err);
                    state.queue.requeue(event);
                    ItemOutcome::Requeued
                }
            };
        }
    };

    if response.already_awarded {
        if let Some(totals) = response.totals {
            state.ledger.reconcile(totals, AwardDisposition::Replayed);
        }
        debug!("Award {} already applied on server", event.event_key);
        return ItemOutcome::Replayed;
    }

    if !response.accepted {
        warn!("Dropping award {}: server did not accept it", event.event_key);
        return ItemOutcome::Dropped;
    }

    match response.totals {
        Some(totals) => {
            let result = state.ledger.reconcile(totals, AwardDisposition::Applied);
            if let Reconciliation::Corrected { drift } = result {
                debug!("Award {} corrected local XP by {:+}", event.event_key, drift);
            }
        }
        None => debug!("Award {} confirmed without totals", event.event_key),
    }
    ItemOutcome::Confirmed
}

/// Handle to a running sync loop
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Signal the loop to stop after any pass in progress
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the loop to exit
    pub async fn join(self) {
        self.stop();
        let _ = self.task.await;
    }
}
