//! Status snapshots, printed when the supervisor receives `SIGHUP`.

use std::fmt;

use crate::job::{Job, JobId};
use crate::table::JobTable;

/// One job's counters, shown as `<id>:<runs>:<lines forwarded>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub id: JobId,
    pub runs: u32,
    pub lines_forwarded: u32,
}

impl From<&Job> for StatusLine {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id(),
            runs: job.runs,
            lines_forwarded: job.lines_forwarded,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id, self.runs, self.lines_forwarded)
    }
}

/// Every registered job in id order, ended and never-started ones included.
pub fn snapshot(table: &JobTable) -> Vec<StatusLine> {
    table.iter().map(StatusLine::from).collect()
}
