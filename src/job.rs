//! Jobs: what to run, and what the supervisor knows about each run.

use std::fmt;
use std::fs::File;
use std::path::PathBuf;

use crate::process::Child;

/// Stable job number, starting at 1 in job file order.
pub type JobId = usize;

/// Where a job's standard input or output is connected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redirect {
    /// A pipe with the supervisor on the other end.
    Pipe,
    /// A named file, opened once when the job is loaded.
    File(PathBuf),
}

impl Redirect {
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() {
            Redirect::Pipe
        } else {
            Redirect::File(field.into())
        }
    }

    pub const fn is_pipe(&self) -> bool {
        matches!(self, Redirect::Pipe)
    }
}

/// How many times a job may be started again after its first run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartLimit {
    Unlimited,
    Limited(u32),
}

impl RestartLimit {
    /// Parses the first job file field. Empty and `0` both mean unlimited.
    /// Limits too large to count saturate.
    pub fn from_field(field: &str) -> Option<Self> {
        if field.is_empty() {
            return Some(RestartLimit::Unlimited);
        }

        if !field.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        // only digits are left, so the one possible failure is overflow
        match field.parse::<u32>().unwrap_or(u32::MAX) {
            0 => Some(RestartLimit::Unlimited),
            n => Some(RestartLimit::Limited(n)),
        }
    }

    /// Whether a job that has been started `runs` times may be started again.
    pub const fn allows_after(self, runs: u32) -> bool {
        match self {
            RestartLimit::Unlimited => true,
            RestartLimit::Limited(n) => runs <= n,
        }
    }
}

/// Immutable description of a job, as loaded from the job file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpec {
    pub id: JobId,
    pub argv: Vec<String>,
    pub restart_limit: RestartLimit,
    pub input: Redirect,
    pub output: Redirect,
}

/// Files opened for a job's static redirects, shared by all of its runs.
#[derive(Debug, Default)]
pub struct StaticIo {
    pub input: Option<File>,
    pub output: Option<File>,
}

#[derive(Debug)]
pub enum JobStatus {
    /// Loaded and runnable, not started yet.
    Pending,
    /// A live process exists and the supervisor holds its pipes.
    Running(Child),
    /// Reaped this tick after a normal exit.
    Exited(i32),
    /// Reaped this tick after being killed by a signal.
    Signaled(i32),
    /// Will not run again.
    Ended,
}

impl JobStatus {
    pub const fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running(_))
    }
}

#[derive(Debug)]
pub struct Job {
    pub spec: JobSpec,
    pub io: StaticIo,
    pub status: JobStatus,
    pub runs: u32,
    pub lines_forwarded: u32,
    pub runnable: bool,
}

impl Job {
    pub fn new(spec: JobSpec, io: StaticIo, runnable: bool) -> Self {
        Self {
            spec,
            io,
            status: if runnable {
                JobStatus::Pending
            } else {
                JobStatus::Ended
            },
            runs: 0,
            lines_forwarded: 0,
            runnable,
        }
    }

    pub const fn id(&self) -> JobId {
        self.spec.id
    }

    /// Not running now and not waiting for its first start.
    pub const fn is_ended(&self) -> bool {
        !matches!(self.status, JobStatus::Running(_) | JobStatus::Pending)
    }

    pub fn child(&self) -> Option<&Child> {
        match &self.status {
            JobStatus::Running(child) => Some(child),
            _ => None,
        }
    }

    pub fn child_mut(&mut self) -> Option<&mut Child> {
        match &mut self.status {
            JobStatus::Running(child) => Some(child),
            _ => None,
        }
    }

    /// Records a fresh process for this job.
    pub fn started(&mut self, child: Child) {
        self.status = JobStatus::Running(child);
        self.runs = self.runs.saturating_add(1);
    }

    /// Whether the restart budget allows another run.
    pub const fn may_restart(&self) -> bool {
        self.runnable && self.spec.restart_limit.allows_after(self.runs)
    }

    /// Permanently retires the job, releasing anything it still holds.
    pub fn retire(&mut self) {
        self.status = JobStatus::Ended;
        self.runnable = false;
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}
