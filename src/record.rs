//! Opaque accounting records and field selectors.
//!
//! The internal layout of a record is owned entirely by the backend that
//! allocated it. Callers hold records as opaque handles between `alloc` and
//! `free` and manipulate them only through the dispatch facade.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque per-job/per-step resource-usage record
///
/// Ownership is exclusive to whichever caller holds the handle; the core
/// never shares or clones records behind the caller's back.
pub struct AcctRecord {
    data: Box<dyn Any + Send>,
}

impl AcctRecord {
    /// Wrap backend-owned data into an opaque record
    ///
    /// Intended for backend implementations; callers obtain records from
    /// the dispatch facade instead.
    pub fn new<T: Any + Send>(data: T) -> Self {
        AcctRecord {
            data: Box::new(data),
        }
    }

    /// Borrow the backend-owned data, if it has the expected layout
    pub fn downcast_ref<T: Any + Send>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Mutably borrow the backend-owned data, if it has the expected layout
    pub fn downcast_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.data.downcast_mut::<T>()
    }
}

impl fmt::Debug for AcctRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcctRecord").finish_non_exhaustive()
    }
}

/// Typed selector for record fields set and read through the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatField {
    /// Peak virtual memory size, in kilobytes
    MaxVmSize,
    /// Peak resident set size, in kilobytes
    MaxRss,
    /// Peak page fault count
    MaxPages,
    /// Minimum per-task CPU time, in seconds (zero means unset)
    MinCpuTime,
    /// Accumulated user CPU time, seconds part
    UserCpuSec,
    /// Accumulated user CPU time, microseconds part
    UserCpuUsec,
    /// Accumulated system CPU time, seconds part
    SysCpuSec,
    /// Accumulated system CPU time, microseconds part
    SysCpuUsec,
}

impl StatField {
    /// All selectable fields
    pub const ALL: [StatField; 8] = [
        StatField::MaxVmSize,
        StatField::MaxRss,
        StatField::MaxPages,
        StatField::MinCpuTime,
        StatField::UserCpuSec,
        StatField::UserCpuUsec,
        StatField::SysCpuSec,
        StatField::SysCpuUsec,
    ];
}
