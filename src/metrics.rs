//! Process-wide economy counters.
//! Read by `guildmarket status`; nothing is exported over the network.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use serde::Serialize;

static OPERATIONS_OK: AtomicU64 = AtomicU64::new(0);
static OPERATIONS_FAILED: AtomicU64 = AtomicU64::new(0);
static VERSION_CONFLICTS: AtomicU64 = AtomicU64::new(0);
static DISPATCH_RETRIES: AtomicU64 = AtomicU64::new(0);
static STORE_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static LATENCY_COUNT: AtomicU64 = AtomicU64::new(0);

static OPERATION_COUNTERS: OnceLock<Mutex<HashMap<String, OperationCounter>>> = OnceLock::new();
static FAILURE_KINDS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

/// Per-operation tallies, keyed by operation name (`buy`, `use`, ...).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationCounter {
    pub succeeded: u64,
    pub failed: u64,
}

fn lock<T>(cell: &'static OnceLock<Mutex<T>>, init: fn() -> T) -> MutexGuard<'static, T> {
    cell.get_or_init(|| Mutex::new(init()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn record_success(operation: &str, started: Instant) {
    OPERATIONS_OK.fetch_add(1, Ordering::Relaxed);
    observe_latency(started);
    let mut guard = lock(&OPERATION_COUNTERS, HashMap::new);
    let counter = guard.entry(operation.to_string()).or_default();
    counter.succeeded = counter.succeeded.saturating_add(1);
}

pub fn record_failure(operation: &str, kind: &str, started: Instant) {
    OPERATIONS_FAILED.fetch_add(1, Ordering::Relaxed);
    observe_latency(started);
    {
        let mut guard = lock(&OPERATION_COUNTERS, HashMap::new);
        let counter = guard.entry(operation.to_string()).or_default();
        counter.failed = counter.failed.saturating_add(1);
    }
    let mut kinds = lock(&FAILURE_KINDS, HashMap::new);
    let count = kinds.entry(kind.to_string()).or_insert(0);
    *count = count.saturating_add(1);
}

pub fn inc_conflicts() {
    VERSION_CONFLICTS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_dispatch_retries() {
    DISPATCH_RETRIES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_store_timeouts() {
    STORE_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}

fn observe_latency(started: Instant) {
    let ms = started.elapsed().as_millis() as u64;
    LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);
    LATENCY_COUNT.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub operations_ok: u64,
    pub operations_failed: u64,
    pub version_conflicts: u64,
    pub dispatch_retries: u64,
    pub store_timeouts: u64,
    pub latency_avg_ms: Option<u64>,
    pub operations: HashMap<String, OperationCounter>,
    pub failure_kinds: HashMap<String, u64>,
}

pub fn snapshot() -> Snapshot {
    let sum = LATENCY_SUM_MS.load(Ordering::Relaxed);
    let count = LATENCY_COUNT.load(Ordering::Relaxed);
    Snapshot {
        operations_ok: OPERATIONS_OK.load(Ordering::Relaxed),
        operations_failed: OPERATIONS_FAILED.load(Ordering::Relaxed),
        version_conflicts: VERSION_CONFLICTS.load(Ordering::Relaxed),
        dispatch_retries: DISPATCH_RETRIES.load(Ordering::Relaxed),
        store_timeouts: STORE_TIMEOUTS.load(Ordering::Relaxed),
        latency_avg_ms: if count > 0 { Some(sum / count) } else { None },
        operations: lock(&OPERATION_COUNTERS, HashMap::new).clone(),
        failure_kinds: lock(&FAILURE_KINDS, HashMap::new).clone(),
    }
}
