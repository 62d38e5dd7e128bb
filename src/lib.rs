//! Pluggable job accounting for a cluster workload manager.
//!
//! This crate implements the accounting subsystem's dispatch core: the
//! surrounding daemon calls a stable set of operations (record lifecycle,
//! job/step hooks, polling control) while the actual collection and
//! persistence of usage data is delegated to a backend selected by
//! configuration at runtime. Backends are indexed by type string in a plugin
//! registry, bound all-or-nothing against an ordered operation contract, and
//! dispatched through a lazily initialized, mutex-guarded context.
//!
//! A misconfigured or missing backend never fails the daemon: the subsystem
//! logs one diagnostic and degrades to silent no-ops.
//!
//! ```no_run
//! use std::path::Path;
//! use jobacct::{configure, dispatch, AcctConfig, JobId, JobRecord};
//!
//! configure(AcctConfig::new().backend_type("log"));
//! dispatch::init_service(Some(Path::new("/var/log/acct.log"))).unwrap();
//!
//! let job = JobRecord::new(JobId(1042), 1000, "solver");
//! dispatch::job_start(&job).unwrap();
//! dispatch::job_complete(&job).unwrap();
//! dispatch::fini_service().unwrap();
//! ```

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]
#![warn(missing_docs)]

pub mod backends;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod plugin;
pub mod record;
pub mod registry;

pub use config::{configure, AcctConfig};
pub use context::{ensure_initialized, is_initialized, last_error, shutdown};
pub use error::{AcctError, AcctResult};
pub use job::{JobId, JobRecord, StepId, StepRecord};
pub use plugin::{
    AcctBackend, OperationTable, PluginDescriptor, JOBACCT_MAJOR_TYPE, PLUGIN_API_VERSION,
    REQUIRED_OPS,
};
pub use record::{AcctRecord, StatField};
pub use registry::{install_plugin, PluginHandle, PluginRegistry};
