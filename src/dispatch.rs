//! Public dispatch facade for the accounting subsystem.
//!
//! One function per operation, in ABI order. Each call acquires the context
//! lock, forwards to the resolved backend, and returns its result. When the
//! subsystem is inert (no backend configured, backend missing, binding
//! incomplete) every call returns a neutral result instead of an error: the
//! scheduler must never fail because accounting is misconfigured.
//!
//! The entry points that are legal before first explicit use —
//! [`record_init`], [`alloc`], [`init_service`], [`start_poll`] — trigger
//! lazy initialization; the rest forward only if a context already exists.

use std::path::Path;
use std::time::{Duration, Instant};

use log::warn;

use crate::config;
use crate::context;
use crate::error::AcctResult;
use crate::job::{JobRecord, StepRecord};
use crate::record::{AcctRecord, StatField};

/// Time a forwarded call and warn when it exceeds the configured threshold
fn timed<R>(op: &'static str, f: impl FnOnce() -> R) -> R {
    let threshold = config::current().slow_op_threshold;
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    if elapsed > threshold {
        warn!(
            "accounting operation {} took {} usec",
            op,
            elapsed.as_micros()
        );
    }
    result
}

/// Reset a record to its zero state
pub fn record_init(record: &mut AcctRecord) -> AcctResult<()> {
    let _ = context::ensure_initialized();
    timed("acct_record_init", || {
        context::dispatch_op((), |b| b.record_init(record))
    })
}

/// Allocate a fresh accounting record
///
/// Returns `None` when the subsystem is inert.
pub fn alloc() -> Option<AcctRecord> {
    let _ = context::ensure_initialized();
    timed("acct_alloc", || {
        context::dispatch_infallible(None, |b| Some(b.alloc()))
    })
}

/// Release an accounting record
pub fn free(record: AcctRecord) -> AcctResult<()> {
    timed("acct_free", || {
        context::dispatch_op((), move |b| b.free(record))
    })
}

/// Store a field value into a record
pub fn set_field(record: &mut AcctRecord, field: StatField, value: u64) -> AcctResult<()> {
    timed("acct_set_field", || {
        context::dispatch_op((), |b| b.set_field(record, field, value))
    })
}

/// Read a field value from a record
///
/// Returns `Ok(None)` when the subsystem is inert.
pub fn get_field(record: &AcctRecord, field: StatField) -> AcctResult<Option<u64>> {
    timed("acct_get_field", || {
        context::dispatch_op(None, |b| b.get_field(record, field).map(Some))
    })
}

/// Merge `from` into `dest` under the backend's rollup rules
pub fn aggregate(dest: &mut AcctRecord, from: &AcctRecord) -> AcctResult<()> {
    timed("acct_aggregate", || {
        context::dispatch_op((), |b| b.aggregate(dest, from))
    })
}

/// Serialize a record into `buf`
pub fn pack(record: &AcctRecord, buf: &mut Vec<u8>) -> AcctResult<()> {
    timed("acct_pack", || {
        context::dispatch_op((), |b| b.pack(record, buf))
    })
}

/// Reconstruct a record from a buffer produced by [`pack`]
///
/// Returns `Ok(None)` when the subsystem is inert.
pub fn unpack(buf: &[u8]) -> AcctResult<Option<AcctRecord>> {
    timed("acct_unpack", || {
        context::dispatch_op(None, |b| b.unpack(buf).map(Some))
    })
}

/// Start-of-service hook; `acct_log` locates backend persistent storage
pub fn init_service(acct_log: Option<&Path>) -> AcctResult<()> {
    let _ = context::ensure_initialized();
    timed("acct_init_service", || {
        context::dispatch_op((), |b| b.init_service(acct_log))
    })
}

/// End-of-service hook; also tears down the subsystem context
pub fn fini_service() -> AcctResult<()> {
    let result = timed("acct_fini_service", || {
        context::dispatch_op((), |b| b.fini_service())
    });
    context::shutdown()?;
    result
}

/// Record that a job has started
pub fn job_start(job: &JobRecord) -> AcctResult<()> {
    timed("acct_job_start", || {
        context::dispatch_op((), |b| b.job_start(job))
    })
}

/// Record that a job has completed
pub fn job_complete(job: &JobRecord) -> AcctResult<()> {
    timed("acct_job_complete", || {
        context::dispatch_op((), |b| b.job_complete(job))
    })
}

/// Record that a step has started
pub fn step_start(step: &StepRecord) -> AcctResult<()> {
    timed("acct_step_start", || {
        context::dispatch_op((), |b| b.step_start(step))
    })
}

/// Record that a step has completed
pub fn step_complete(step: &StepRecord) -> AcctResult<()> {
    timed("acct_step_complete", || {
        context::dispatch_op((), |b| b.step_complete(step))
    })
}

/// Record that a job has been suspended or resumed
pub fn suspend(job: &JobRecord) -> AcctResult<()> {
    timed("acct_suspend", || {
        context::dispatch_op((), |b| b.suspend(job))
    })
}

/// Begin periodic usage polling at the given frequency
pub fn start_poll(frequency: Duration) -> AcctResult<()> {
    let _ = context::ensure_initialized();
    timed("acct_start_poll", || {
        context::dispatch_op((), |b| b.start_poll(frequency))
    })
}

/// Stop polling for the given step and flush its usage
pub fn end_poll(step: &StepRecord) -> AcctResult<()> {
    timed("acct_end_poll", || {
        context::dispatch_op((), |b| b.end_poll(step))
    })
}

/// Pause polling while the owning job is suspended
pub fn suspend_poll() {
    timed("acct_suspend_poll", || {
        context::dispatch_infallible((), |b| b.suspend_poll())
    })
}
