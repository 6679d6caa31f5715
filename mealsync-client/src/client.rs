//! Synchronized KV client.
//!
//! Reads go cache → remote → durable mirror. Writes go mirror → cache and
//! then either straight to the remote store (critical keys) or into a
//! per-record pending slot that is flushed after a quiet period.
//!
//! # Write path
//!
//! ```text
//! set ──► mirror ──► cache ──┬─► critical key: POST now, caller awaits result
//!                            └─► pending slot (last value wins) ──► debounce timer
//!                                                                    │
//!                         retry timer ◄── transient failure ◄── POST ┘
//!                                         permanent failure ──► dropped + event
//! ```

use std::sync::Arc;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use futures_util::future::join_all;
use mealsync_core::{
    new_write_id, OwnerId, RecordKey, RecordRef, RecordValue, SyncConfig, SyncResult, Timestamp,
    TypedRecord, WriteError, WriteId,
};
use mealsync_storage::{CacheRead, CacheStats, DurableMirror, Freshness, RecordCache};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::scheduler::FlushScheduler;
use crate::transport::{KvRequest, KvTransport, TransportError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Successful outcome of [`SyncKvClient::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Stored locally and queued for the remote store.
    Queued { write_id: WriteId },
    /// Confirmed by the remote store before returning.
    Confirmed { write_id: WriteId },
}

impl Ack {
    pub fn write_id(&self) -> WriteId {
        match self {
            Ack::Queued { write_id } | Ack::Confirmed { write_id } => *write_id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Ack::Confirmed { .. })
    }
}

/// A value waiting to be written to the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub record: RecordRef,
    pub value: RecordValue,
    pub write_id: WriteId,
    /// Failed attempts so far.
    pub attempts: u32,
    pub enqueued_at: Timestamp,
    /// Local revision of the record when this value was stored.
    revision: u64,
}

/// Notifications about queued writes.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    WriteConfirmed {
        record: RecordRef,
        write_id: WriteId,
    },
    /// A transient failure; the write stays queued and will be retried.
    WriteRequeued {
        record: RecordRef,
        write_id: WriteId,
        attempts: u32,
        error: WriteError,
    },
    /// A permanent failure; the write was abandoned.
    WriteDropped {
        record: RecordRef,
        write_id: WriteId,
        error: WriteError,
    },
}

impl SyncEvent {
    pub fn record(&self) -> &RecordRef {
        match self {
            SyncEvent::WriteConfirmed { record, .. }
            | SyncEvent::WriteRequeued { record, .. }
            | SyncEvent::WriteDropped { record, .. } => record,
        }
    }
}

/// Summary of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub confirmed: usize,
    /// Still queued afterwards: transient failures, and keys whose previous
    /// write was still in flight.
    pub requeued: usize,
    pub dropped: usize,
}

impl FlushReport {
    fn add(&mut self, outcome: FlushOutcome) {
        match outcome {
            FlushOutcome::Idle => {}
            FlushOutcome::Confirmed => self.confirmed += 1,
            FlushOutcome::Requeued | FlushOutcome::Busy => self.requeued += 1,
            FlushOutcome::Dropped => self.dropped += 1,
        }
    }

    /// Nothing left queued and nothing lost.
    pub fn is_clean(&self) -> bool {
        self.requeued == 0 && self.dropped == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushOutcome {
    /// Nothing was pending.
    Idle,
    Confirmed,
    Requeued,
    Dropped,
    /// Another write for the key was in flight; the flush was re-armed.
    Busy,
}

/// Per-record count of local changes, and the newest of them the remote
/// store has answered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LocalRevision {
    changed: u64,
    settled: u64,
}

impl LocalRevision {
    fn is_settled(&self) -> bool {
        self.changed == self.settled
    }
}

/// Read-through, write-behind client for the KV proxy.
///
/// Cloning is cheap; clones share the cache, queue and timers.
pub struct SyncKvClient<T, M> {
    inner: Arc<ClientInner<T, M>>,
}

impl<T, M> Clone for SyncKvClient<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, M> std::fmt::Debug for SyncKvClient<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncKvClient")
            .field("pending", &self.inner.pending.len())
            .field("cached", &self.inner.cache.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

struct ClientInner<T, M> {
    transport: T,
    mirror: M,
    cache: RecordCache,
    /// Keyed by `{owner}:{key}`, at most one entry per record.
    pending: DashMap<String, PendingWrite>,
    /// Records with a queued write on the wire.
    in_flight: DashSet<String>,
    /// Guards cache and mirror against remote reads that predate a local change.
    revisions: DashMap<String, LocalRevision>,
    scheduler: Arc<FlushScheduler>,
    config: SyncConfig,
    events: broadcast::Sender<SyncEvent>,
}

/// Clears the in-flight mark even if the flush future is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a DashSet<String>,
    cache_key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.cache_key);
    }
}

impl<T: KvTransport, M: DurableMirror> SyncKvClient<T, M> {
    pub fn new(transport: T, mirror: M, config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                mirror,
                cache: RecordCache::new(config.cache_ttl),
                pending: DashMap::new(),
                in_flight: DashSet::new(),
                revisions: DashMap::new(),
                scheduler: FlushScheduler::new(),
                config,
                events,
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn mirror(&self) -> &M {
        &self.inner.mirror
    }

    /// Subscribe to write outcomes. Events sent before subscribing are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn has_pending(&self, owner: &str, key: &str) -> bool {
        self.pending_write(owner, key).is_some()
    }

    pub fn pending_write(&self, owner: &str, key: &str) -> Option<PendingWrite> {
        let record = RecordRef::parse(owner, key).ok()?;
        self.inner
            .pending
            .get(&record.cache_key())
            .map(|p| p.value().clone())
    }

    /// Whether a flush or retry timer is armed for the record.
    pub fn is_flush_scheduled(&self, owner: &str, key: &str) -> bool {
        RecordRef::parse(owner, key)
            .map(|record| self.inner.scheduler.is_armed(&record))
            .unwrap_or(false)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a record.
    ///
    /// Never fails: remote errors fall back to the durable mirror, and
    /// `None` means no layer holds a value. Malformed ids read as `None`.
    pub async fn get(&self, owner: &str, key: &str, freshness: Freshness) -> Option<RecordValue> {
        let record = match RecordRef::parse(owner, key) {
            Ok(record) => record,
            Err(e) => {
                warn!(owner, key, error = %e, "Rejected read with malformed identifiers");
                return None;
            }
        };
        self.get_record(&record, freshness)
            .await
            .map(CacheRead::into_value)
    }

    /// Read a record, keeping track of where the value came from.
    pub async fn get_record(
        &self,
        record: &RecordRef,
        freshness: Freshness,
    ) -> Option<CacheRead<RecordValue>> {
        if freshness.allows_cache() {
            if let Some(hit) = self.inner.cache.get(record) {
                debug!(owner = %record.owner(), key = %record.key(), "Cache hit");
                return Some(hit);
            }
        }
        self.inner.fetch_remote(record).await
    }

    /// Read and narrow a well-known record.
    ///
    /// A stored `null` reads as `None`.
    pub async fn get_typed<R: TypedRecord>(
        &self,
        owner: &str,
        freshness: Freshness,
    ) -> SyncResult<Option<R>> {
        let record = RecordRef::new(OwnerId::new(owner)?, R::record_key());
        match self.get_record(&record, freshness).await {
            Some(read) if read.value().is_null() => Ok(None),
            Some(read) => Ok(Some(R::from_value(read.into_value())?)),
            None => Ok(None),
        }
    }

    /// Keys stored for `owner`.
    ///
    /// Comes from the remote listing, or from the mirror when the remote is
    /// unreachable. Keys with unflushed writes are always included.
    pub async fn list_keys(&self, owner: &str) -> Vec<RecordKey> {
        let owner = match OwnerId::new(owner) {
            Ok(owner) => owner,
            Err(e) => {
                warn!(owner, error = %e, "Rejected key listing with malformed owner");
                return Vec::new();
            }
        };

        let mut keys = match self.inner.fetch_remote_keys(&owner).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(owner = %owner, error = %e, "Remote key listing failed, using mirror");
                self.inner.mirror.keys(&owner).unwrap_or_else(|e| {
                    error!(owner = %owner, error = %e, "Mirror key listing failed");
                    Vec::new()
                })
            }
        };

        keys.extend(
            self.inner
                .pending
                .iter()
                .filter(|p| p.record.owner() == &owner)
                .map(|p| p.record.key().clone()),
        );
        keys.sort();
        keys.dedup();
        keys
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a value.
    ///
    /// The mirror and cache are updated before this returns. Critical keys
    /// are then written to the remote store inline and the result is
    /// returned; every other key is queued and flushed after the debounce
    /// window. `null` is stored as a value; use [`delete`](Self::delete) to
    /// remove a key.
    pub async fn set(&self, owner: &str, key: &str, value: RecordValue) -> Result<Ack, WriteError> {
        let record = RecordRef::parse(owner, key).map_err(|e| {
            WriteError::rejected(format!("{}:{}", owner, key), Some(400), e.to_string())
        })?;
        self.set_record(&record, value).await
    }

    pub async fn set_record(&self, record: &RecordRef, value: RecordValue) -> Result<Ack, WriteError> {
        let inner = &self.inner;

        let size = serde_json::to_vec(&value)
            .map_err(|e| WriteError::rejected(record.to_string(), None, e.to_string()))?
            .len();
        if size > inner.config.max_payload_bytes {
            warn!(
                owner = %record.owner(),
                key = %record.key(),
                size,
                limit = inner.config.max_payload_bytes,
                "Rejected oversized value"
            );
            return Err(WriteError::rejected(
                record.to_string(),
                Some(413),
                format!(
                    "Payload of {} bytes exceeds the {} byte limit",
                    size, inner.config.max_payload_bytes
                ),
            ));
        }

        let revision = inner.touch_local(record, || {
            if let Err(e) = inner.mirror.put(record, &value) {
                error!(owner = %record.owner(), key = %record.key(), error = %e, "Mirror write failed");
            }
            inner.cache.put(record, value.clone());
        });

        if inner.config.is_critical(record.key()) {
            return inner.write_through(record, value, revision).await;
        }
        Ok(inner.enqueue(record, value, revision))
    }

    /// Store a well-known record.
    pub async fn set_typed<R: TypedRecord>(&self, owner: &str, record: &R) -> Result<Ack, WriteError> {
        let target = OwnerId::new(owner)
            .map(|owner| RecordRef::new(owner, R::record_key()))
            .map_err(|e| {
                WriteError::rejected(format!("{}:{}", owner, R::KEY), Some(400), e.to_string())
            })?;
        let value = record
            .to_value()
            .map_err(|e| WriteError::rejected(target.to_string(), None, e.to_string()))?;
        self.set_record(&target, value).await
    }

    /// Delete a record everywhere.
    ///
    /// Local state (mirror, cache, queued write, armed timer) is cleared
    /// before the remote DELETE is sent. Remote failures are logged and
    /// ignored. Returns `false` only for malformed ids.
    pub async fn delete(&self, owner: &str, key: &str) -> bool {
        match RecordRef::parse(owner, key) {
            Ok(record) => {
                self.delete_record(&record).await;
                true
            }
            Err(e) => {
                warn!(owner, key, error = %e, "Rejected delete with malformed identifiers");
                false
            }
        }
    }

    pub async fn delete_record(&self, record: &RecordRef) {
        let inner = &self.inner;

        inner.scheduler.cancel(record);
        if let Some((_, dropped)) = inner.pending.remove(&record.cache_key()) {
            debug!(
                owner = %record.owner(),
                key = %record.key(),
                write_id = %dropped.write_id,
                "Discarded queued write on delete"
            );
        }
        let revision = inner.touch_local(record, || {
            inner.cache.remove(record);
            if let Err(e) = inner.mirror.delete(record) {
                error!(owner = %record.owner(), key = %record.key(), error = %e, "Mirror delete failed");
            }
        });

        let result = inner.transport.send(KvRequest::delete(record)).await;
        inner.settle(record, revision);
        match result {
            Ok(response) if response.is_success() => {
                debug!(owner = %record.owner(), key = %record.key(), "Remote delete confirmed");
            }
            Ok(response) => {
                warn!(
                    owner = %record.owner(),
                    key = %record.key(),
                    status = response.status,
                    reason = %response.describe(),
                    "Remote delete rejected"
                );
            }
            Err(e) => {
                warn!(owner = %record.owner(), key = %record.key(), error = %e, "Remote delete failed");
            }
        }
    }

    // =========================================================================
    // Flushing
    // =========================================================================

    /// Flush every queued write now, without waiting for timers.
    pub async fn flush_pending_writes(&self) -> FlushReport {
        let inner = &self.inner;
        let records: Vec<RecordRef> = inner
            .pending
            .iter()
            .map(|p| p.record.clone())
            .collect();

        for record in &records {
            inner.scheduler.cancel(record);
        }

        let outcomes = join_all(records.iter().map(|record| inner.flush_record(record))).await;
        let report = outcomes
            .into_iter()
            .fold(FlushReport::default(), |mut report, outcome| {
                report.add(outcome);
                report
            });

        if !records.is_empty() {
            info!(
                confirmed = report.confirmed,
                requeued = report.requeued,
                dropped = report.dropped,
                "Flushed pending writes"
            );
        }
        report
    }

    /// Cancel all timers and make a final flush attempt.
    ///
    /// Writes still failing afterwards stay in the queue without a retry
    /// timer.
    pub async fn shutdown(&self) -> FlushReport {
        self.inner.scheduler.cancel_all();
        let report = self.flush_pending_writes().await;
        self.inner.scheduler.cancel_all();
        report
    }
}

impl<T: KvTransport, M: DurableMirror> ClientInner<T, M> {
    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Apply a change to the local copies of a record and bump its revision.
    ///
    /// Runs under the record's revision entry, so a remote read cannot
    /// interleave its own cache and mirror refresh.
    fn touch_local(&self, record: &RecordRef, change: impl FnOnce()) -> u64 {
        let mut local = self.revisions.entry(record.cache_key()).or_default();
        change();
        local.changed += 1;
        local.changed
    }

    /// The remote store has answered for the change at `revision`.
    fn settle(&self, record: &RecordRef, revision: u64) {
        if let Some(mut local) = self.revisions.get_mut(&record.cache_key()) {
            local.settled = local.settled.max(revision);
        }
    }

    fn local_revision(&self, cache_key: &str) -> LocalRevision {
        self.revisions
            .get(cache_key)
            .map(|local| *local)
            .unwrap_or_default()
    }

    async fn fetch_remote(&self, record: &RecordRef) -> Option<CacheRead<RecordValue>> {
        let cache_key = record.cache_key();
        let before = self.local_revision(&cache_key);
        let result = self.transport.send(KvRequest::get(record)).await;

        match result {
            Ok(response) if response.is_success() => match response.value() {
                Some(value) => {
                    let local = self.revisions.entry(cache_key).or_default();
                    // Unconfirmed or newer local changes win over the read.
                    if !before.is_settled() || local.changed != before.changed {
                        drop(local);
                        debug!(owner = %record.owner(), key = %record.key(), "Serving local value over remote");
                        return self.local_read(record);
                    }
                    let value = value.clone();
                    self.cache.put(record, value.clone());
                    if let Err(e) = self.mirror.put(record, &value) {
                        warn!(owner = %record.owner(), key = %record.key(), error = %e, "Mirror refresh failed");
                    }
                    Some(CacheRead::from_remote(value))
                }
                None => {
                    warn!(owner = %record.owner(), key = %record.key(), "Remote response had no value field");
                    self.mirror_fallback(record)
                }
            },
            Ok(response) if response.status == 404 => {
                debug!(owner = %record.owner(), key = %record.key(), "Not found remotely");
                self.mirror_fallback(record)
            }
            Ok(response) => {
                warn!(
                    owner = %record.owner(),
                    key = %record.key(),
                    status = response.status,
                    reason = %response.describe(),
                    "Remote read failed, using mirror"
                );
                self.mirror_fallback(record)
            }
            Err(e) => {
                warn!(owner = %record.owner(), key = %record.key(), error = %e, "Remote unreachable, using mirror");
                self.mirror_fallback(record)
            }
        }
    }

    /// Queued value, then cache, then mirror.
    fn local_read(&self, record: &RecordRef) -> Option<CacheRead<RecordValue>> {
        if let Some(pending) = self.pending.get(&record.cache_key()) {
            return Some(CacheRead::from_cache(pending.value.clone(), pending.enqueued_at));
        }
        self.cache
            .get(record)
            .or_else(|| self.mirror_fallback(record))
    }

    fn mirror_fallback(&self, record: &RecordRef) -> Option<CacheRead<RecordValue>> {
        match self.mirror.get(record) {
            Ok(entry) => entry.map(|e| CacheRead::from_cache(e.value, e.written_at)),
            Err(e) => {
                error!(owner = %record.owner(), key = %record.key(), error = %e, "Mirror read failed");
                None
            }
        }
    }

    async fn fetch_remote_keys(&self, owner: &OwnerId) -> Result<Vec<RecordKey>, TransportError> {
        let response = self.transport.send(KvRequest::list_keys(owner)).await?;
        if !response.is_success() {
            return Err(TransportError::Status {
                status: response.status,
                message: response.describe(),
            });
        }

        let keys = response
            .body
            .as_ref()
            .and_then(|body| body.get("keys"))
            .and_then(|keys| keys.as_array())
            .ok_or_else(|| TransportError::Status {
                status: response.status,
                message: "Response has no keys array".to_string(),
            })?;

        Ok(keys
            .iter()
            .filter_map(|k| k.as_str())
            .filter_map(|k| RecordKey::new(k).ok())
            .collect())
    }

    async fn send_write(&self, record: &RecordRef, value: &RecordValue) -> Result<(), WriteError> {
        match self.transport.send(KvRequest::post(record, value)).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(WriteError::from_status(
                record.to_string(),
                response.status,
                response.describe(),
            )),
            Err(e) => Err(WriteError::network(record.to_string(), e.to_string())),
        }
    }

    /// Critical-key path: the caller waits for the remote store.
    async fn write_through(
        &self,
        record: &RecordRef,
        value: RecordValue,
        revision: u64,
    ) -> Result<Ack, WriteError> {
        // A value queued before the key became critical must not land later.
        self.scheduler.cancel(record);
        self.pending.remove(&record.cache_key());

        let write_id = new_write_id();
        let result = self.send_write(record, &value).await;
        self.settle(record, revision);
        match result {
            Ok(()) => {
                info!(owner = %record.owner(), key = %record.key(), write_id = %write_id, "Critical write confirmed");
                self.emit(SyncEvent::WriteConfirmed {
                    record: record.clone(),
                    write_id,
                });
                Ok(Ack::Confirmed { write_id })
            }
            Err(e) => {
                error!(
                    owner = %record.owner(),
                    key = %record.key(),
                    write_id = %write_id,
                    status = ?e.status(),
                    error = %e,
                    "Critical write failed"
                );
                Err(e)
            }
        }
    }
}

impl<T: KvTransport, M: DurableMirror> ClientInner<T, M> {
    /// Put a value in the record's pending slot and (re)start its debounce.
    fn enqueue(self: &Arc<Self>, record: &RecordRef, value: RecordValue, revision: u64) -> Ack {
        let write_id = new_write_id();
        let replaced = self.pending.insert(
            record.cache_key(),
            PendingWrite {
                record: record.clone(),
                value,
                write_id,
                attempts: 0,
                enqueued_at: Utc::now(),
                revision,
            },
        );
        debug!(
            owner = %record.owner(),
            key = %record.key(),
            write_id = %write_id,
            coalesced = replaced.is_some(),
            "Queued write"
        );

        self.arm_flush(record, self.config.debounce_window);
        Ack::Queued { write_id }
    }

    fn arm_flush(self: &Arc<Self>, record: &RecordRef, delay: std::time::Duration) {
        let client = Arc::downgrade(self);
        let target = record.clone();
        self.scheduler.arm(record, delay, move || async move {
            if let Some(client) = client.upgrade() {
                client.flush_record(&target).await;
            }
        });
    }

    /// Send the queued value for one record, if any.
    async fn flush_record(self: &Arc<Self>, record: &RecordRef) -> FlushOutcome {
        let cache_key = record.cache_key();
        if !self.in_flight.insert(cache_key.clone()) {
            debug!(owner = %record.owner(), key = %record.key(), "Write in flight, deferring flush");
            self.arm_flush(record, self.config.debounce_window);
            return FlushOutcome::Busy;
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            cache_key: cache_key.clone(),
        };

        let Some(snapshot) = self.pending.get(&cache_key).map(|p| p.value().clone()) else {
            return FlushOutcome::Idle;
        };

        match self.send_write(record, &snapshot.value).await {
            Ok(()) => {
                // A newer value queued during the write stays queued.
                self.pending
                    .remove_if(&cache_key, |_, p| p.write_id == snapshot.write_id);
                self.settle(record, snapshot.revision);
                info!(
                    owner = %record.owner(),
                    key = %record.key(),
                    write_id = %snapshot.write_id,
                    "Write confirmed"
                );
                self.emit(SyncEvent::WriteConfirmed {
                    record: record.clone(),
                    write_id: snapshot.write_id,
                });
                FlushOutcome::Confirmed
            }
            Err(error) if error.is_retryable() => {
                let attempts = snapshot.attempts + 1;
                let still_current = match self.pending.get_mut(&cache_key) {
                    Some(mut pending) if pending.write_id == snapshot.write_id => {
                        pending.attempts = attempts;
                        true
                    }
                    _ => false,
                };

                if still_current {
                    warn!(
                        owner = %record.owner(),
                        key = %record.key(),
                        write_id = %snapshot.write_id,
                        status = ?error.status(),
                        attempts,
                        error = %error,
                        "Write failed, retrying"
                    );
                    self.arm_flush(record, self.config.retry_delay);
                    self.emit(SyncEvent::WriteRequeued {
                        record: record.clone(),
                        write_id: snapshot.write_id,
                        attempts,
                        error,
                    });
                    FlushOutcome::Requeued
                } else if self.pending.contains_key(&cache_key) {
                    // Superseded; the newer value has its own debounce timer.
                    debug!(owner = %record.owner(), key = %record.key(), "Failed write superseded");
                    FlushOutcome::Requeued
                } else {
                    // Deleted while in flight.
                    FlushOutcome::Idle
                }
            }
            Err(error) => {
                self.pending
                    .remove_if(&cache_key, |_, p| p.write_id == snapshot.write_id);
                self.settle(record, snapshot.revision);
                error!(
                    owner = %record.owner(),
                    key = %record.key(),
                    write_id = %snapshot.write_id,
                    status = ?error.status(),
                    error = %error,
                    "Write rejected, dropping"
                );
                self.emit(SyncEvent::WriteDropped {
                    record: record.clone(),
                    write_id: snapshot.write_id,
                    error,
                });
                FlushOutcome::Dropped
            }
        }
    }
}
