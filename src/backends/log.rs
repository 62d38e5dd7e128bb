//! The `log` backend: appends accounting events to a log file.
//!
//! Job and step lifecycle hooks become timestamped JSON lines in the
//! accounting log configured at service start. Records carry per-task
//! resource peaks and CPU counters; aggregation takes maxima of peaks and
//! sums of counters, so merging step records into a job total is independent
//! of merge order.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AcctError, AcctResult};
use crate::job::{JobRecord, StepRecord};
use crate::plugin::{
    AcctBackend, PluginDescriptor, JOBACCT_MAJOR_TYPE, PLUGIN_API_VERSION, REQUIRED_OPS,
};
use crate::record::{AcctRecord, StatField};

/// Descriptor for the `log` backend
pub(crate) const DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    major_type: JOBACCT_MAJOR_TYPE,
    minor_type: "log",
    api_version: PLUGIN_API_VERSION,
    plugin_version: env!("CARGO_PKG_VERSION"),
    provided_ops: &REQUIRED_OPS,
};

const USEC_PER_SEC: u64 = 1_000_000;

/// Per-task resource usage owned by the `log` backend
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TaskStats {
    max_vsize: u64,
    max_rss: u64,
    max_pages: u64,
    /// Zero means unset; aggregation treats zero as the identity
    min_cpu: u64,
    user_cpu_sec: u64,
    user_cpu_usec: u64,
    sys_cpu_sec: u64,
    sys_cpu_usec: u64,
}

impl TaskStats {
    fn get(&self, field: StatField) -> u64 {
        match field {
            StatField::MaxVmSize => self.max_vsize,
            StatField::MaxRss => self.max_rss,
            StatField::MaxPages => self.max_pages,
            StatField::MinCpuTime => self.min_cpu,
            StatField::UserCpuSec => self.user_cpu_sec,
            StatField::UserCpuUsec => self.user_cpu_usec,
            StatField::SysCpuSec => self.sys_cpu_sec,
            StatField::SysCpuUsec => self.sys_cpu_usec,
        }
    }

    fn set(&mut self, field: StatField, value: u64) {
        match field {
            StatField::MaxVmSize => self.max_vsize = value,
            StatField::MaxRss => self.max_rss = value,
            StatField::MaxPages => self.max_pages = value,
            StatField::MinCpuTime => self.min_cpu = value,
            StatField::UserCpuSec => self.user_cpu_sec = value,
            StatField::UserCpuUsec => self.user_cpu_usec = value,
            StatField::SysCpuSec => self.sys_cpu_sec = value,
            StatField::SysCpuUsec => self.sys_cpu_usec = value,
        }
    }

    fn merge(&mut self, other: &TaskStats) {
        self.max_vsize = self.max_vsize.max(other.max_vsize);
        self.max_rss = self.max_rss.max(other.max_rss);
        self.max_pages = self.max_pages.max(other.max_pages);
        self.min_cpu = min_nonzero(self.min_cpu, other.min_cpu);

        self.user_cpu_sec += other.user_cpu_sec;
        self.user_cpu_usec += other.user_cpu_usec;
        carry_usec(&mut self.user_cpu_sec, &mut self.user_cpu_usec);

        self.sys_cpu_sec += other.sys_cpu_sec;
        self.sys_cpu_usec += other.sys_cpu_usec;
        carry_usec(&mut self.sys_cpu_sec, &mut self.sys_cpu_usec);
    }
}

/// Minimum where zero acts as "unset"
fn min_nonzero(a: u64, b: u64) -> u64 {
    match (a, b) {
        (0, b) => b,
        (a, 0) => a,
        (a, b) => a.min(b),
    }
}

fn carry_usec(sec: &mut u64, usec: &mut u64) {
    *sec += *usec / USEC_PER_SEC;
    *usec %= USEC_PER_SEC;
}

/// Backend that writes accounting events to a log file
#[derive(Debug, Default)]
pub struct LogBackend {
    acct_log: Option<File>,
    poll_frequency: Option<Duration>,
}

impl LogBackend {
    /// Create a new `log` backend; the log file is opened at service start
    pub fn new() -> Self {
        LogBackend::default()
    }

    fn stats<'a>(&self, record: &'a AcctRecord) -> AcctResult<&'a TaskStats> {
        record
            .downcast_ref::<TaskStats>()
            .ok_or(AcctError::ForeignRecord)
    }

    fn stats_mut<'a>(&self, record: &'a mut AcctRecord) -> AcctResult<&'a mut TaskStats> {
        record
            .downcast_mut::<TaskStats>()
            .ok_or(AcctError::ForeignRecord)
    }

    fn write_event(&mut self, event: serde_json::Value) -> AcctResult<()> {
        match self.acct_log.as_mut() {
            Some(file) => {
                writeln!(file, "{}", event)?;
                Ok(())
            }
            None => {
                debug!("jobacct/log: no accounting log open, dropping event {}", event);
                Ok(())
            }
        }
    }
}

impl AcctBackend for LogBackend {
    fn record_init(&self, record: &mut AcctRecord) -> AcctResult<()> {
        *self.stats_mut(record)? = TaskStats::default();
        Ok(())
    }

    fn alloc(&self) -> AcctRecord {
        AcctRecord::new(TaskStats::default())
    }

    fn free(&self, record: AcctRecord) -> AcctResult<()> {
        drop(record);
        Ok(())
    }

    fn set_field(&self, record: &mut AcctRecord, field: StatField, value: u64) -> AcctResult<()> {
        self.stats_mut(record)?.set(field, value);
        Ok(())
    }

    fn get_field(&self, record: &AcctRecord, field: StatField) -> AcctResult<u64> {
        Ok(self.stats(record)?.get(field))
    }

    fn aggregate(&self, dest: &mut AcctRecord, from: &AcctRecord) -> AcctResult<()> {
        let from_stats = self.stats(from)?.clone();
        self.stats_mut(dest)?.merge(&from_stats);
        Ok(())
    }

    fn pack(&self, record: &AcctRecord, buf: &mut Vec<u8>) -> AcctResult<()> {
        let stats = self.stats(record)?;
        let bytes =
            bincode::serialize(stats).map_err(|e| AcctError::Serialization(e.to_string()))?;
        buf.extend_from_slice(&bytes);
        Ok(())
    }

    fn unpack(&self, buf: &[u8]) -> AcctResult<AcctRecord> {
        let stats: TaskStats =
            bincode::deserialize(buf).map_err(|e| AcctError::Serialization(e.to_string()))?;
        Ok(AcctRecord::new(stats))
    }

    fn init_service(&mut self, acct_log: Option<&Path>) -> AcctResult<()> {
        match acct_log {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                self.acct_log = Some(file);
                debug!("jobacct/log: accounting log {} open", path.display());
            }
            None => {
                debug!("jobacct/log: no accounting log configured, events will not persist");
            }
        }
        Ok(())
    }

    fn fini_service(&mut self) -> AcctResult<()> {
        if let Some(mut file) = self.acct_log.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn job_start(&mut self, job: &JobRecord) -> AcctResult<()> {
        self.write_event(json!({
            "time": Utc::now().to_rfc3339(),
            "event": "job_start",
            "job_id": job.job_id,
            "user_id": job.user_id,
            "name": job.name,
            "partition": job.partition,
            "node_count": job.node_count,
            "submit_time": job.submit_time.to_rfc3339(),
        }))
    }

    fn job_complete(&mut self, job: &JobRecord) -> AcctResult<()> {
        self.write_event(json!({
            "time": Utc::now().to_rfc3339(),
            "event": "job_complete",
            "job_id": job.job_id,
            "end_time": job.end_time.map(|t| t.to_rfc3339()),
        }))
    }

    fn step_start(&mut self, step: &StepRecord) -> AcctResult<()> {
        self.write_event(json!({
            "time": Utc::now().to_rfc3339(),
            "event": "step_start",
            "step_id": step.step_id.to_string(),
            "name": step.name,
            "task_count": step.task_count,
        }))
    }

    fn step_complete(&mut self, step: &StepRecord) -> AcctResult<()> {
        self.write_event(json!({
            "time": Utc::now().to_rfc3339(),
            "event": "step_complete",
            "step_id": step.step_id.to_string(),
            "end_time": step.end_time.map(|t| t.to_rfc3339()),
        }))
    }

    fn suspend(&mut self, job: &JobRecord) -> AcctResult<()> {
        self.write_event(json!({
            "time": Utc::now().to_rfc3339(),
            "event": "suspend",
            "job_id": job.job_id,
        }))
    }

    fn start_poll(&mut self, frequency: Duration) -> AcctResult<()> {
        // The ctld side of this backend has nothing to sample; remember the
        // frequency for diagnostics.
        self.poll_frequency = Some(frequency);
        debug!("jobacct/log: polling requested every {:?}", frequency);
        Ok(())
    }

    fn end_poll(&mut self, step: &StepRecord) -> AcctResult<()> {
        debug!("jobacct/log: end of polling for step {}", step.step_id);
        Ok(())
    }

    fn suspend_poll(&mut self) {
        debug!("jobacct/log: polling suspended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, StepId};

    fn record_with(fields: &[(StatField, u64)]) -> AcctRecord {
        let backend = LogBackend::new();
        let mut record = backend.alloc();
        for &(field, value) in fields {
            backend.set_field(&mut record, field, value).unwrap();
        }
        record
    }

    fn stats_of(record: &AcctRecord) -> TaskStats {
        record.downcast_ref::<TaskStats>().unwrap().clone()
    }

    #[test]
    fn test_set_get_roundtrip() {
        let backend = LogBackend::new();
        let mut record = backend.alloc();

        for (i, field) in StatField::ALL.into_iter().enumerate() {
            backend.set_field(&mut record, field, i as u64 + 1).unwrap();
        }
        for (i, field) in StatField::ALL.into_iter().enumerate() {
            assert_eq!(backend.get_field(&record, field).unwrap(), i as u64 + 1);
        }
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let backend = LogBackend::new();
        let record = record_with(&[
            (StatField::MaxVmSize, 123_456),
            (StatField::MaxRss, 98_765),
            (StatField::MinCpuTime, 42),
            (StatField::UserCpuUsec, 999_999),
        ]);

        let mut buf = Vec::new();
        backend.pack(&record, &mut buf).unwrap();
        let restored = backend.unpack(&buf).unwrap();

        assert_eq!(stats_of(&record), stats_of(&restored));
    }

    #[test]
    fn test_unpack_garbage_fails() {
        let backend = LogBackend::new();
        assert!(matches!(
            backend.unpack(&[1, 2, 3]),
            Err(AcctError::Serialization(_))
        ));
    }

    #[test]
    fn test_aggregate_rules() {
        let backend = LogBackend::new();
        let mut dest = record_with(&[
            (StatField::MaxRss, 100),
            (StatField::MinCpuTime, 50),
            (StatField::UserCpuSec, 10),
            (StatField::UserCpuUsec, 600_000),
        ]);
        let from = record_with(&[
            (StatField::MaxRss, 300),
            (StatField::MinCpuTime, 20),
            (StatField::UserCpuSec, 5),
            (StatField::UserCpuUsec, 700_000),
        ]);

        backend.aggregate(&mut dest, &from).unwrap();

        assert_eq!(backend.get_field(&dest, StatField::MaxRss).unwrap(), 300);
        assert_eq!(backend.get_field(&dest, StatField::MinCpuTime).unwrap(), 20);
        // 10.6s + 5.7s = 16.3s with the microsecond carry applied.
        assert_eq!(backend.get_field(&dest, StatField::UserCpuSec).unwrap(), 16);
        assert_eq!(
            backend.get_field(&dest, StatField::UserCpuUsec).unwrap(),
            300_000
        );
    }

    #[test]
    fn test_aggregate_zero_min_cpu_is_identity() {
        let backend = LogBackend::new();
        let mut dest = record_with(&[]);
        let from = record_with(&[(StatField::MinCpuTime, 30)]);

        backend.aggregate(&mut dest, &from).unwrap();
        assert_eq!(backend.get_field(&dest, StatField::MinCpuTime).unwrap(), 30);
    }

    #[test]
    fn test_aggregate_commutative_and_associative() {
        let backend = LogBackend::new();
        let samples = [
            record_with(&[
                (StatField::MaxVmSize, 500),
                (StatField::MinCpuTime, 9),
                (StatField::SysCpuUsec, 800_000),
            ]),
            record_with(&[
                (StatField::MaxVmSize, 200),
                (StatField::MaxPages, 40),
                (StatField::SysCpuSec, 3),
            ]),
            record_with(&[
                (StatField::MaxRss, 999),
                (StatField::MinCpuTime, 4),
                (StatField::SysCpuUsec, 900_000),
            ]),
        ];

        // ((a + b) + c)
        let mut left = AcctRecord::new(stats_of(&samples[0]));
        backend.aggregate(&mut left, &samples[1]).unwrap();
        backend.aggregate(&mut left, &samples[2]).unwrap();

        // (a + (b + c))
        let mut right_inner = AcctRecord::new(stats_of(&samples[1]));
        backend.aggregate(&mut right_inner, &samples[2]).unwrap();
        let mut right = AcctRecord::new(stats_of(&samples[0]));
        backend.aggregate(&mut right, &right_inner).unwrap();

        assert_eq!(stats_of(&left), stats_of(&right));

        // (b + a) == (a + b)
        let mut ab = AcctRecord::new(stats_of(&samples[0]));
        backend.aggregate(&mut ab, &samples[1]).unwrap();
        let mut ba = AcctRecord::new(stats_of(&samples[1]));
        backend.aggregate(&mut ba, &samples[0]).unwrap();
        assert_eq!(stats_of(&ab), stats_of(&ba));
    }

    #[test]
    fn test_foreign_record_rejected() {
        let backend = LogBackend::new();
        let foreign = AcctRecord::new("not a task stats struct");

        assert!(matches!(
            backend.get_field(&foreign, StatField::MaxRss),
            Err(AcctError::ForeignRecord)
        ));
    }

    #[test]
    fn test_events_written_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("acct.log");

        let mut backend = LogBackend::new();
        backend.init_service(Some(&log_path)).unwrap();

        let job = JobRecord::new(JobId(17), 1000, "solver");
        backend.job_start(&job).unwrap();
        let step = StepRecord::new(StepId::new(JobId(17), 0), "launch");
        backend.step_start(&step).unwrap();
        backend.step_complete(&step).unwrap();
        backend.job_complete(&job).unwrap();
        backend.fini_service().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("job_start"));
        assert!(lines[1].contains("step_start"));
        assert!(lines[2].contains("step_complete"));
        assert!(lines[3].contains("job_complete"));

        // Every line is a well-formed JSON record.
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("time").is_some());
        }
    }

    #[test]
    fn test_record_init_resets() {
        let backend = LogBackend::new();
        let mut record = record_with(&[(StatField::MaxRss, 777)]);

        backend.record_init(&mut record).unwrap();
        assert_eq!(backend.get_field(&record, StatField::MaxRss).unwrap(), 0);
    }
}
