//! The job table: a fixed-capacity registry of the shell's active jobs.

use std::cell::UnsafeCell;
use std::fmt;
use std::io;
use std::sync::OnceLock;

use crate::common::Error;
use crate::log::dev_info;
use crate::system::signal::SignalSet;
use crate::system::{ProcessGroup, ProcessId};

use super::relay;

const MAX_JOBS: usize = 16;
const MAX_CMDLINE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) struct JobId(u32);

impl JobId {
    pub(super) fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum JobState {
    Foreground,
    Background,
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        })
    }
}

/// The command line a job was started with, stored inline.
///
/// Job records are created, copied and destroyed from inside signal
/// handlers, so they cannot own heap memory. Overlong lines are truncated at
/// a character boundary.
#[derive(Clone, Copy)]
pub(super) struct CommandLine {
    bytes: [u8; MAX_CMDLINE],
    len: usize,
}

impl CommandLine {
    fn new(line: &str) -> Self {
        let mut len = line.len().min(MAX_CMDLINE);
        while len > 0 && !line.is_char_boundary(len) {
            len -= 1;
        }

        let mut bytes = [0; MAX_CMDLINE];
        bytes[..len].copy_from_slice(&line.as_bytes()[..len]);

        Self { bytes, len }
    }

    pub(super) fn as_str(&self) -> &str {
        // the buffer was copied from a `str` up to a character boundary
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy)]
pub(super) struct Job {
    pub(super) pid: ProcessId,
    pub(super) jid: JobId,
    pub(super) state: JobState,
    pub(super) cmdline: CommandLine,
}

impl Job {
    /// The process group shared by every process of this job.
    pub(super) fn process_group(&self) -> ProcessGroup {
        ProcessGroup::new(self.pid)
    }
}

static TABLE: OnceLock<JobTable> = OnceLock::new();

/// The registry of active jobs.
///
/// This is a singleton: the asynchronous relay handlers have no other way to
/// reach it. Every operation runs with the relay signals blocked and
/// restores the caller's previous mask on the way out, so a handler firing
/// on the main control flow can never observe a half-updated table.
pub(super) struct JobTable {
    slots: UnsafeCell<[Option<Job>; MAX_JOBS]>,
    relay_set: SignalSet,
}

// SAFETY: the shell has no worker threads. The table is reached from the
// main control flow and from signal handlers; the handlers run with a full
// signal mask and every access from the main flow goes through `guarded`,
// which keeps the relay signals blocked for its duration.
unsafe impl Sync for JobTable {}

impl JobTable {
    pub(super) fn new() -> io::Result<Self> {
        Ok(Self {
            slots: UnsafeCell::new([None; MAX_JOBS]),
            relay_set: relay::relay_signal_set()?,
        })
    }

    /// Initialize the process-wide job table.
    ///
    /// # Panics
    ///
    /// If this function has been called before.
    pub(super) fn init() -> io::Result<&'static Self> {
        if TABLE.set(Self::new()?).is_err() {
            panic!("the job table has already been initialized");
        }

        Ok(TABLE.get().unwrap())
    }

    /// Access the process-wide job table, if it has been initialized.
    ///
    /// This is how the relay handlers reach the table.
    pub(super) fn get() -> Option<&'static Self> {
        TABLE.get()
    }

    fn guarded<T>(&self, f: impl FnOnce(&mut [Option<Job>; MAX_JOBS]) -> T) -> T {
        // sigprocmask only fails on invalid arguments and the relay set was
        // validated at construction, so a failure here leaves the mask
        // untouched and we carry on unguarded rather than lose the mutation.
        let original_set = self.relay_set.block().ok();

        // SAFETY: the relay signals are blocked (or we are inside a handler
        // running with a full mask), so nothing can interleave with `f`.
        let result = f(unsafe { &mut *self.slots.get() });

        if let Some(set) = original_set {
            set.set_mask().ok();
        }

        result
    }

    /// Register a new job, assigning the smallest job id not currently in use.
    pub(super) fn add(
        &self,
        pid: ProcessId,
        state: JobState,
        cmdline: &str,
    ) -> Result<Job, Error> {
        debug_assert!(pid.get() > 0);

        self.guarded(|slots| {
            let jid = free_jid(slots).ok_or(Error::JobTableFull)?;

            debug_assert!(
                state != JobState::Foreground || !has_foreground(slots),
                "two jobs cannot be in the foreground at once"
            );

            let job = Job {
                pid,
                jid,
                state,
                cmdline: CommandLine::new(cmdline),
            };

            for slot in slots.iter_mut() {
                if slot.is_none() {
                    *slot = Some(job);
                    dev_info!("added job [{}] ({}) {}", job.jid, job.pid, job.cmdline);
                    return Ok(job);
                }
            }

            Err(Error::JobTableFull)
        })
    }

    /// Remove the job tracking `pid`. Returns whether it was present.
    pub(super) fn remove(&self, pid: ProcessId) -> bool {
        self.guarded(|slots| {
            for slot in slots.iter_mut() {
                if slot.map(|job| job.pid) == Some(pid) {
                    *slot = None;
                    return true;
                }
            }
            false
        })
    }

    pub(super) fn job_with_pid(&self, pid: ProcessId) -> Option<Job> {
        self.guarded(|slots| slots.iter().flatten().find(|job| job.pid == pid).copied())
    }

    pub(super) fn job_with_jid(&self, jid: JobId) -> Option<Job> {
        self.guarded(|slots| slots.iter().flatten().find(|job| job.jid == jid).copied())
    }

    /// Change the state of the job tracking `pid`. Returns whether it was present.
    pub(super) fn set_state(&self, pid: ProcessId, state: JobState) -> bool {
        self.guarded(|slots| {
            debug_assert!(
                state != JobState::Foreground
                    || !slots
                        .iter()
                        .flatten()
                        .any(|job| job.state == JobState::Foreground && job.pid != pid),
                "two jobs cannot be in the foreground at once"
            );

            for slot in slots.iter_mut() {
                if let Some(job) = slot {
                    if job.pid == pid {
                        job.state = state;
                        return true;
                    }
                }
            }
            false
        })
    }

    /// The pid of the unique foreground job, if there is one.
    pub(super) fn foreground_pid(&self) -> Option<ProcessId> {
        self.guarded(|slots| {
            slots
                .iter()
                .flatten()
                .find(|job| job.state == JobState::Foreground)
                .map(|job| job.pid)
        })
    }

    /// A copy of the current job records, for listing.
    ///
    /// The returned value can be iterated any number of times without
    /// holding the table.
    pub(super) fn snapshot(&self) -> JobsSnapshot {
        JobsSnapshot {
            slots: self.guarded(|slots| *slots),
        }
    }
}

fn free_jid(slots: &[Option<Job>; MAX_JOBS]) -> Option<JobId> {
    (1..=MAX_JOBS as u32)
        .map(JobId::new)
        .find(|&candidate| !slots.iter().flatten().any(|job| job.jid == candidate))
}

fn has_foreground(slots: &[Option<Job>; MAX_JOBS]) -> bool {
    slots
        .iter()
        .flatten()
        .any(|job| job.state == JobState::Foreground)
}

pub(super) struct JobsSnapshot {
    slots: [Option<Job>; MAX_JOBS],
}

impl JobsSnapshot {
    pub(super) fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::{JobId, JobState, JobTable, MAX_JOBS};
    use crate::system::ProcessId;

    fn pid(id: i32) -> ProcessId {
        ProcessId::new(id)
    }

    #[test]
    fn assigns_minimal_free_job_ids() {
        let table = JobTable::new().unwrap();

        for id in 1..=3 {
            let job = table
                .add(pid(1000 + id), JobState::Background, "sleep 5 &")
                .unwrap();
            assert_eq!(job.jid, JobId::new(id as u32));
        }

        // removing the middle job frees its id for the next registration
        assert!(table.remove(pid(1002)));
        let job = table
            .add(pid(2000), JobState::Background, "sleep 5 &")
            .unwrap();
        assert_eq!(job.jid, JobId::new(2));

        let job = table
            .add(pid(2001), JobState::Background, "sleep 5 &")
            .unwrap();
        assert_eq!(job.jid, JobId::new(4));
    }

    #[test]
    fn lookups_agree() {
        let table = JobTable::new().unwrap();

        let job = table.add(pid(4321), JobState::Stopped, "cat").unwrap();

        let by_pid = table.job_with_pid(job.pid).unwrap();
        let by_jid = table.job_with_jid(job.jid).unwrap();
        assert_eq!(by_pid.pid, by_jid.pid);
        assert_eq!(by_pid.jid, by_jid.jid);
        assert_eq!(by_pid.state, by_jid.state);

        assert!(table.job_with_pid(pid(1)).is_none());
        assert!(table.job_with_jid(JobId::new(7)).is_none());

        assert!(table.remove(pid(4321)));
        assert!(!table.remove(pid(4321)));
        assert!(table.job_with_pid(pid(4321)).is_none());
    }

    #[test]
    fn tracks_the_foreground_job() {
        let table = JobTable::new().unwrap();

        table.add(pid(100), JobState::Background, "a &").unwrap();
        assert_eq!(table.foreground_pid(), None);

        table.add(pid(200), JobState::Foreground, "b").unwrap();
        assert_eq!(table.foreground_pid(), Some(pid(200)));

        assert!(table.set_state(pid(200), JobState::Stopped));
        assert_eq!(table.foreground_pid(), None);

        assert!(table.set_state(pid(200), JobState::Foreground));
        assert_eq!(table.foreground_pid(), Some(pid(200)));

        assert!(!table.set_state(pid(999), JobState::Background));
    }

    #[test]
    fn rejects_jobs_beyond_capacity() {
        let table = JobTable::new().unwrap();

        for id in 1..=MAX_JOBS as i32 {
            table.add(pid(id), JobState::Background, "true &").unwrap();
        }

        assert!(table
            .add(pid(9999), JobState::Background, "true &")
            .is_err());

        // capacity frees up again after a removal
        assert!(table.remove(pid(1)));
        table.add(pid(9999), JobState::Background, "true &").unwrap();
    }

    #[test]
    fn snapshot_is_restartable() {
        let table = JobTable::new().unwrap();

        table.add(pid(10), JobState::Background, "a &").unwrap();
        table.add(pid(20), JobState::Stopped, "b").unwrap();

        let snapshot = table.snapshot();
        assert_eq!(snapshot.iter().count(), 2);
        // iterating again yields the same records
        assert_eq!(snapshot.iter().count(), 2);

        // the snapshot is a copy: later mutations don't show up in it
        table.remove(pid(10));
        assert_eq!(snapshot.iter().count(), 2);
        assert_eq!(table.snapshot().iter().count(), 1);
    }

    #[test]
    fn overlong_command_lines_are_truncated() {
        let table = JobTable::new().unwrap();

        let line = "x".repeat(4096);
        let job = table.add(pid(42), JobState::Background, &line).unwrap();
        assert_eq!(job.cmdline.as_str().len(), super::MAX_CMDLINE);

        // truncation never splits a character
        let line = "é".repeat(1024);
        let job = table.add(pid(43), JobState::Background, &line).unwrap();
        assert!(job.cmdline.as_str().len() <= super::MAX_CMDLINE);
        assert!(job.cmdline.as_str().chars().all(|c| c == 'é'));
    }
}
