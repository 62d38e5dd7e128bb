//! The `none` backend: accounting stays wired but records nothing.
//!
//! Selecting this type keeps every dispatch path live with successful no-ops,
//! which is distinct from an inert context: the backend is bound, so the
//! subsystem reports itself initialized.

use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::error::AcctResult;
use crate::job::{JobRecord, StepRecord};
use crate::plugin::{
    AcctBackend, PluginDescriptor, JOBACCT_MAJOR_TYPE, PLUGIN_API_VERSION, REQUIRED_OPS,
};
use crate::record::{AcctRecord, StatField};

/// Descriptor for the `none` backend
pub(crate) const DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    major_type: JOBACCT_MAJOR_TYPE,
    minor_type: "none",
    api_version: PLUGIN_API_VERSION,
    plugin_version: env!("CARGO_PKG_VERSION"),
    provided_ops: &REQUIRED_OPS,
};

/// Record payload of the `none` backend; carries no data
#[derive(Debug, Default)]
struct EmptyStats;

/// Backend that satisfies the full operation set with no-ops
#[derive(Debug, Default)]
pub struct NoneBackend;

impl NoneBackend {
    /// Create a new `none` backend
    pub fn new() -> Self {
        NoneBackend
    }
}

impl AcctBackend for NoneBackend {
    fn record_init(&self, _record: &mut AcctRecord) -> AcctResult<()> {
        Ok(())
    }

    fn alloc(&self) -> AcctRecord {
        AcctRecord::new(EmptyStats)
    }

    fn free(&self, record: AcctRecord) -> AcctResult<()> {
        drop(record);
        Ok(())
    }

    fn set_field(&self, _record: &mut AcctRecord, _field: StatField, _value: u64) -> AcctResult<()> {
        Ok(())
    }

    fn get_field(&self, _record: &AcctRecord, _field: StatField) -> AcctResult<u64> {
        Ok(0)
    }

    fn aggregate(&self, _dest: &mut AcctRecord, _from: &AcctRecord) -> AcctResult<()> {
        Ok(())
    }

    fn pack(&self, _record: &AcctRecord, _buf: &mut Vec<u8>) -> AcctResult<()> {
        Ok(())
    }

    fn unpack(&self, _buf: &[u8]) -> AcctResult<AcctRecord> {
        Ok(AcctRecord::new(EmptyStats))
    }

    fn init_service(&mut self, _acct_log: Option<&Path>) -> AcctResult<()> {
        debug!("jobacct/none: service started, nothing will be recorded");
        Ok(())
    }

    fn fini_service(&mut self) -> AcctResult<()> {
        Ok(())
    }

    fn job_start(&mut self, _job: &JobRecord) -> AcctResult<()> {
        Ok(())
    }

    fn job_complete(&mut self, _job: &JobRecord) -> AcctResult<()> {
        Ok(())
    }

    fn step_start(&mut self, _step: &StepRecord) -> AcctResult<()> {
        Ok(())
    }

    fn step_complete(&mut self, _step: &StepRecord) -> AcctResult<()> {
        Ok(())
    }

    fn suspend(&mut self, _job: &JobRecord) -> AcctResult<()> {
        Ok(())
    }

    fn start_poll(&mut self, _frequency: Duration) -> AcctResult<()> {
        Ok(())
    }

    fn end_poll(&mut self, _step: &StepRecord) -> AcctResult<()> {
        Ok(())
    }

    fn suspend_poll(&mut self) {}
}
