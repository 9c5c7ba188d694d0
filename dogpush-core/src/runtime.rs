use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use crate::error::{Error, Result};

/// Source of process-runtime statistics reported alongside registry metrics.
pub trait RuntimeStats: Send + Sync {
    fn snapshot(&self) -> RuntimeSnapshot;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GcStats {
    pub time: Duration,
    pub runs: u64,
}

/// Ratios are in `0.0..=1.0`, thread-state percentages sum to 1.0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeSnapshot {
    pub heap_usage: f64,
    pub non_heap_usage: f64,
    pub memory_pool_usage: BTreeMap<String, f64>,
    pub daemon_thread_count: u64,
    pub thread_count: u64,
    pub uptime: Duration,
    pub fd_usage: f64,
    pub thread_state_percentages: BTreeMap<String, f64>,
    pub garbage_collectors: BTreeMap<String, GcStats>,
}

impl RuntimeStats for RuntimeSnapshot {
    fn snapshot(&self) -> RuntimeSnapshot {
        self.clone()
    }
}

/// Statistics for the current process, read through `sysinfo`.
///
/// Native processes have no managed heap, so heap usage is resident memory
/// against physical memory and non-heap usage is swap in use. Every thread but
/// the main one counts as a daemon thread, since none of them keeps the process
/// alive. There are no garbage collectors to report.
#[derive(Debug)]
pub struct ProcessRuntimeStats {
    pid: Pid,
    system: Mutex<System>,
}

impl ProcessRuntimeStats {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| Error::RuntimeStats(e.to_string()))?;
        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
        })
    }
}

impl RuntimeStats for ProcessRuntimeStats {
    fn snapshot(&self) -> RuntimeSnapshot {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let physical = ratio(sys.used_memory(), sys.total_memory());
        let swap = ratio(sys.used_swap(), sys.total_swap());

        let mut out = RuntimeSnapshot {
            non_heap_usage: swap,
            memory_pool_usage: BTreeMap::from([
                ("physical".to_string(), physical),
                ("swap".to_string(), swap),
            ]),
            ..RuntimeSnapshot::default()
        };

        let Some(process) = sys.process(self.pid) else {
            return out;
        };

        out.heap_usage = ratio(process.memory(), sys.total_memory());
        out.uptime = Duration::from_secs(process.run_time());
        out.fd_usage = fd_usage();

        // Task sets leave out the main thread, whose id is the pid itself.
        let mut threads: Vec<Pid> = process
            .tasks()
            .map(|t| t.iter().copied().filter(|tid| *tid != self.pid).collect())
            .unwrap_or_default();
        if !threads.is_empty() {
            sys.refresh_processes_specifics(
                ProcessesToUpdate::Some(&threads),
                false,
                ProcessRefreshKind::nothing(),
            );
        }
        threads.push(self.pid);

        out.thread_count = threads.len() as u64;
        out.daemon_thread_count = out.thread_count - 1;

        let states = threads
            .iter()
            .filter_map(|tid| sys.process(*tid))
            .map(|task| thread_state(task.status()));
        out.thread_state_percentages = percentages(states);

        out
    }
}

/// Open descriptors against the soft `RLIMIT_NOFILE`.
#[cfg(target_os = "linux")]
fn fd_usage() -> f64 {
    use procfs::process::{LimitValue, Process};

    let usage = Process::myself().and_then(|p| {
        let open = p.fd_count()?;
        let limit = p.limits()?.max_open_files.soft_limit;
        Ok((open, limit))
    });
    match usage {
        Ok((open, LimitValue::Value(limit))) => ratio(open as u64, limit),
        Ok((_, LimitValue::Unlimited)) => 0.0,
        Err(err) => {
            tracing::debug!(error = %err, "could not read descriptor usage");
            0.0
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn fd_usage() -> f64 {
    0.0
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn thread_state(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Run => "RUNNABLE",
        ProcessStatus::Sleep | ProcessStatus::Idle | ProcessStatus::Parked => "WAITING",
        ProcessStatus::LockBlocked | ProcessStatus::UninterruptibleDiskSleep => "BLOCKED",
        ProcessStatus::Stop | ProcessStatus::Tracing => "STOPPED",
        ProcessStatus::Zombie | ProcessStatus::Dead => "TERMINATED",
        _ => "UNKNOWN",
    }
}

fn percentages<'a>(states: impl Iterator<Item = &'a str>) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut total = 0u64;
    for state in states {
        *counts.entry(state.to_string()).or_default() += 1;
        total += 1;
    }

    counts
        .into_iter()
        .map(|(state, n)| (state, ratio(n, total)))
        .collect()
}
