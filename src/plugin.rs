//! Backend plugin contract and operation table resolution.
//!
//! A backend is a swappable implementation of the accounting operation set.
//! The method set of [`AcctBackend`] is the compile-time rendition of the
//! operation table; [`REQUIRED_OPS`] is the same set as an ordered name list
//! and forms the versioned ABI contract a plugin declares against. Names and
//! order must match exactly: resolution is all-or-nothing, and a gap in the
//! declared order is reported as a found-count so a stale plugin is
//! diagnosable at load time instead of failing on a call.

use std::path::Path;
use std::time::Duration;

use crate::error::{AcctError, AcctResult};
use crate::job::{JobRecord, StepRecord};
use crate::record::{AcctRecord, StatField};

/// Plugin API version; a plugin declaring a different version is refused
pub const PLUGIN_API_VERSION: u32 = 1;

/// Major type shared by every accounting backend
pub const JOBACCT_MAJOR_TYPE: &str = "jobacct";

/// Ordered operation name list — the ABI contract.
///
/// The order of these names must match the method order of [`AcctBackend`].
/// Do not reorder existing entries; new operations go at the end.
pub const REQUIRED_OPS: [&str; 18] = [
    "acct_record_init",
    "acct_alloc",
    "acct_free",
    "acct_set_field",
    "acct_get_field",
    "acct_aggregate",
    "acct_pack",
    "acct_unpack",
    "acct_init_service",
    "acct_fini_service",
    "acct_job_start",
    "acct_job_complete",
    "acct_step_start",
    "acct_step_complete",
    "acct_suspend",
    "acct_start_poll",
    "acct_end_poll",
    "acct_suspend_poll",
];

/// A concrete, swappable implementation of the accounting operation set
///
/// All calls are serialized by the subsystem mutex; implementations must not
/// call back into the dispatch facade from any method, since the facade lock
/// is not reentrant.
pub trait AcctBackend: Send {
    /// Reset a record to its zero state
    fn record_init(&self, record: &mut AcctRecord) -> AcctResult<()>;

    /// Allocate a fresh record with backend-owned layout
    fn alloc(&self) -> AcctRecord;

    /// Release a record
    fn free(&self, record: AcctRecord) -> AcctResult<()>;

    /// Store a field value into a record
    fn set_field(&self, record: &mut AcctRecord, field: StatField, value: u64) -> AcctResult<()>;

    /// Read a field value from a record
    fn get_field(&self, record: &AcctRecord, field: StatField) -> AcctResult<u64>;

    /// Merge `from` into `dest` under the backend's rollup rules
    ///
    /// Must be commutative and associative so step records merge into job
    /// totals identically under any interleaving.
    fn aggregate(&self, dest: &mut AcctRecord, from: &AcctRecord) -> AcctResult<()>;

    /// Serialize a record into a self-describing buffer
    fn pack(&self, record: &AcctRecord, buf: &mut Vec<u8>) -> AcctResult<()>;

    /// Reconstruct a record from a buffer produced by `pack`
    fn unpack(&self, buf: &[u8]) -> AcctResult<AcctRecord>;

    /// Start-of-service hook; `acct_log` locates backend persistent storage
    fn init_service(&mut self, acct_log: Option<&Path>) -> AcctResult<()>;

    /// End-of-service hook
    fn fini_service(&mut self) -> AcctResult<()>;

    /// Record that a job has started
    fn job_start(&mut self, job: &JobRecord) -> AcctResult<()>;

    /// Record that a job has completed
    fn job_complete(&mut self, job: &JobRecord) -> AcctResult<()>;

    /// Record that a step has started
    fn step_start(&mut self, step: &StepRecord) -> AcctResult<()>;

    /// Record that a step has completed
    fn step_complete(&mut self, step: &StepRecord) -> AcctResult<()>;

    /// Record that a job has been suspended or resumed
    fn suspend(&mut self, job: &JobRecord) -> AcctResult<()>;

    /// Begin periodic usage polling at the given frequency
    fn start_poll(&mut self, frequency: Duration) -> AcctResult<()>;

    /// Stop polling for the given step and flush its usage
    fn end_poll(&mut self, step: &StepRecord) -> AcctResult<()>;

    /// Pause polling while the owning job is suspended
    fn suspend_poll(&mut self);
}

/// Declared identity and symbol table of a backend plugin
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Plugin family, e.g. "jobacct"
    pub major_type: &'static str,
    /// Specific implementation within the family, e.g. "log"
    pub minor_type: &'static str,
    /// Plugin API version the plugin was built against
    pub api_version: u32,
    /// Implementation version, for diagnostics
    pub plugin_version: &'static str,
    /// Operation names the plugin exports, in its declared order
    pub provided_ops: &'static [&'static str],
}

impl PluginDescriptor {
    /// Full type string, `major/minor`
    pub fn full_type(&self) -> String {
        format!("{}/{}", self.major_type, self.minor_type)
    }
}

/// Resolved operation table bound to an instantiated backend
///
/// Constructed only by [`resolve`]; a table always has every operation slot
/// populated. Callers must not retain a table across a shutdown/reinitialize
/// cycle.
pub struct OperationTable {
    backend: Box<dyn AcctBackend>,
    resolved: Vec<&'static str>,
}

impl OperationTable {
    /// Borrow the bound backend
    pub fn backend(&self) -> &dyn AcctBackend {
        &*self.backend
    }

    /// Mutably borrow the bound backend
    pub fn backend_mut(&mut self) -> &mut dyn AcctBackend {
        &mut *self.backend
    }

    /// Names of the resolved operations, in ABI order
    pub fn resolved_ops(&self) -> &[&'static str] {
        &self.resolved
    }
}

/// Bind a plugin's declared symbol table against [`REQUIRED_OPS`].
///
/// Names are matched slot by slot in declared order: the found-count is the
/// length of the matching prefix, so an accidental reordering or omission in
/// the plugin surfaces as a count mismatch rather than a call into the wrong
/// operation. Any gap invalidates the whole table.
pub fn resolve(
    descriptor: &PluginDescriptor,
    backend: Box<dyn AcctBackend>,
) -> AcctResult<OperationTable> {
    let expected = REQUIRED_OPS.len();
    let mut resolved = Vec::with_capacity(expected);

    for (slot, name) in REQUIRED_OPS.iter().enumerate() {
        if descriptor.provided_ops.get(slot) != Some(name) {
            break;
        }
        resolved.push(*name);
    }

    if resolved.len() < expected {
        return Err(AcctError::IncompleteBinding {
            found: resolved.len(),
            expected,
        });
    }

    Ok(OperationTable { backend, resolved })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::none::NoneBackend;

    fn descriptor_with_ops(ops: &'static [&'static str]) -> PluginDescriptor {
        PluginDescriptor {
            major_type: "jobacct",
            minor_type: "test",
            api_version: PLUGIN_API_VERSION,
            plugin_version: "0.0.0",
            provided_ops: ops,
        }
    }

    #[test]
    fn test_resolve_complete_table() {
        let descriptor = descriptor_with_ops(&REQUIRED_OPS);
        let table = resolve(&descriptor, Box::new(NoneBackend::new())).unwrap();
        assert_eq!(table.resolved_ops().len(), REQUIRED_OPS.len());
        assert_eq!(table.resolved_ops(), &REQUIRED_OPS[..]);
    }

    #[test]
    fn test_resolve_missing_op_reports_preceding_count() {
        // Everything except the sixth operation (acct_aggregate).
        static OPS: [&str; 17] = [
            "acct_record_init",
            "acct_alloc",
            "acct_free",
            "acct_set_field",
            "acct_get_field",
            "acct_pack",
            "acct_unpack",
            "acct_init_service",
            "acct_fini_service",
            "acct_job_start",
            "acct_job_complete",
            "acct_step_start",
            "acct_step_complete",
            "acct_suspend",
            "acct_start_poll",
            "acct_end_poll",
            "acct_suspend_poll",
        ];
        let descriptor = descriptor_with_ops(&OPS);
        let result = resolve(&descriptor, Box::new(NoneBackend::new()));

        match result {
            Err(AcctError::IncompleteBinding { found, expected }) => {
                assert_eq!(found, 5);
                assert_eq!(expected, REQUIRED_OPS.len());
            }
            _ => panic!("Expected IncompleteBinding"),
        }
    }

    #[test]
    fn test_resolve_empty_table_reports_zero() {
        let descriptor = descriptor_with_ops(&[]);
        let result = resolve(&descriptor, Box::new(NoneBackend::new()));

        match result {
            Err(AcctError::IncompleteBinding { found, expected }) => {
                assert_eq!(found, 0);
                assert_eq!(expected, REQUIRED_OPS.len());
            }
            _ => panic!("Expected IncompleteBinding"),
        }
    }

    #[test]
    fn test_resolve_gap_never_counts_later_ops() {
        // First operation missing; the rest present. Found must be 0, not 17.
        static OPS: [&str; 17] = [
            "acct_alloc",
            "acct_free",
            "acct_set_field",
            "acct_get_field",
            "acct_aggregate",
            "acct_pack",
            "acct_unpack",
            "acct_init_service",
            "acct_fini_service",
            "acct_job_start",
            "acct_job_complete",
            "acct_step_start",
            "acct_step_complete",
            "acct_suspend",
            "acct_start_poll",
            "acct_end_poll",
            "acct_suspend_poll",
        ];
        let descriptor = descriptor_with_ops(&OPS);
        match resolve(&descriptor, Box::new(NoneBackend::new())) {
            Err(AcctError::IncompleteBinding { found, .. }) => assert_eq!(found, 0),
            _ => panic!("Expected IncompleteBinding"),
        }
    }

    #[test]
    fn test_full_type_string() {
        let descriptor = descriptor_with_ops(&REQUIRED_OPS);
        assert_eq!(descriptor.full_type(), "jobacct/test");
    }
}
