//! Operator commands.
//!
//! Lines starting with [`SENTINEL`] are addressed to the supervisor rather
//! than broadcast to jobs:
//!
//! - `*signal <job> <signal>` delivers a signal (1 to 31) to a running job;
//! - `*sleep <milliseconds>` pauses the supervisor loop.
//!
//! Nothing here is fatal: every mistake becomes a [`ConsoleError`] that is
//! shown to the operator.

use std::fmt;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::job::JobId;
use crate::table::JobTable;

pub const SENTINEL: char = '*';

const SIGNAL_RANGE: std::ops::RangeInclusive<i64> = 1..=31;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    Signal { job: JobId, signal: Signal },
    Sleep(Duration),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleError {
    IncorrectArguments,
    InvalidJob,
    InvalidSignal,
    InvalidDuration,
    BadCommand(String),
}

impl std::error::Error for ConsoleError {}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConsoleError::IncorrectArguments => write!(f, "Error: Incorrect number of arguments"),
            ConsoleError::InvalidJob => write!(f, "Error: Invalid job"),
            ConsoleError::InvalidSignal => write!(f, "Error: Invalid signal"),
            ConsoleError::InvalidDuration => write!(f, "Error: Invalid duration"),
            ConsoleError::BadCommand(name) => write!(f, "Error: Bad command '{}'", name),
        }
    }
}

pub fn is_command(line: &str) -> bool {
    line.starts_with(SENTINEL)
}

/// Works out what a sentinel line asks for, against the current job table.
pub fn interpret(line: &str, table: &JobTable) -> Result<Directive, ConsoleError> {
    let mut words = line.split_whitespace();
    let name = words.next().unwrap_or("");
    let args: Vec<&str> = words.collect();

    match name {
        "*signal" => {
            let (job, signal) = match args.as_slice() {
                [job, signal] => (*job, *signal),
                _ => return Err(ConsoleError::IncorrectArguments),
            };
            let job = running_job(job, table).ok_or(ConsoleError::InvalidJob)?;
            let signal = signal_number(signal).ok_or(ConsoleError::InvalidSignal)?;
            Ok(Directive::Signal { job, signal })
        }
        "*sleep" => {
            let millis = match args.as_slice() {
                [millis] => *millis,
                _ => return Err(ConsoleError::IncorrectArguments),
            };
            let millis: u64 = millis.parse().map_err(|_| ConsoleError::InvalidDuration)?;
            Ok(Directive::Sleep(Duration::from_millis(millis)))
        }
        other => Err(ConsoleError::BadCommand(other.to_owned())),
    }
}

fn running_job(word: &str, table: &JobTable) -> Option<JobId> {
    let id: JobId = word.parse().ok()?;
    table
        .get(id)
        .filter(|job| job.status.is_running())
        .map(|job| job.id())
}

fn signal_number(word: &str) -> Option<Signal> {
    let number: i64 = word.parse().ok()?;
    if !SIGNAL_RANGE.contains(&number) {
        return None;
    }
    Signal::try_from(i32::try_from(number).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobSpec, Redirect, RestartLimit, StaticIo};
    use crate::process;

    fn spec(id: JobId, argv: &[&str]) -> JobSpec {
        JobSpec {
            id,
            argv: argv.iter().map(|s| s.to_string()).collect(),
            restart_limit: RestartLimit::Limited(1),
            input: Redirect::Pipe,
            output: Redirect::Pipe,
        }
    }

    /// Job 1 running `cat`, job 2 ended.
    fn table() -> JobTable {
        let mut table = JobTable::new();
        table.register(spec(1, &["cat"]), StaticIo::default(), true);
        table.register(spec(2, &["true"]), StaticIo::default(), false);

        let job = table.get_mut(1).unwrap();
        let child = process::spawn(&job.spec, &job.io).unwrap();
        job.started(child);
        table
    }

    #[test]
    fn signal_running_job() {
        let table = table();
        assert_eq!(
            interpret("*signal 1 15", &table),
            Ok(Directive::Signal {
                job: 1,
                signal: Signal::SIGTERM
            })
        );
        assert_eq!(
            interpret("*signal   1    9 ", &table),
            Ok(Directive::Signal {
                job: 1,
                signal: Signal::SIGKILL
            })
        );
        // closes cat's input, letting it exit
        drop(table);
    }

    #[test]
    fn signal_argument_count() {
        let table = JobTable::new();
        assert_eq!(interpret("*signal", &table), Err(ConsoleError::IncorrectArguments));
        assert_eq!(interpret("*signal 1", &table), Err(ConsoleError::IncorrectArguments));
        assert_eq!(
            interpret("*signal 1 2 3", &table),
            Err(ConsoleError::IncorrectArguments)
        );
    }

    #[test]
    fn signal_invalid_job() {
        let table = table();
        for line in &["*signal 0 15", "*signal 3 15", "*signal 2 15", "*signal x 15", "*signal -1 15"] {
            assert_eq!(interpret(line, &table), Err(ConsoleError::InvalidJob), "{}", line);
        }
    }

    #[test]
    fn signal_invalid_number() {
        let table = table();
        for line in &["*signal 1 0", "*signal 1 32", "*signal 1 TERM", "*signal 1 -9"] {
            assert_eq!(interpret(line, &table), Err(ConsoleError::InvalidSignal), "{}", line);
        }
    }

    #[test]
    fn job_is_checked_before_signal() {
        let table = table();
        assert_eq!(interpret("*signal 7 99", &table), Err(ConsoleError::InvalidJob));
    }

    #[test]
    fn sleep() {
        let table = JobTable::new();
        assert_eq!(
            interpret("*sleep 250", &table),
            Ok(Directive::Sleep(Duration::from_millis(250)))
        );
        assert_eq!(
            interpret("*sleep 0", &table),
            Ok(Directive::Sleep(Duration::from_millis(0)))
        );
        assert_eq!(interpret("*sleep", &table), Err(ConsoleError::IncorrectArguments));
        assert_eq!(
            interpret("*sleep 1 2", &table),
            Err(ConsoleError::IncorrectArguments)
        );
        assert_eq!(interpret("*sleep -5", &table), Err(ConsoleError::InvalidDuration));
        assert_eq!(interpret("*sleep soon", &table), Err(ConsoleError::InvalidDuration));
    }

    #[test]
    fn unknown_commands() {
        let table = JobTable::new();
        assert_eq!(
            interpret("*restart 1", &table),
            Err(ConsoleError::BadCommand("*restart".into()))
        );
        assert_eq!(interpret("*", &table), Err(ConsoleError::BadCommand("*".into())));
        assert_eq!(
            ConsoleError::BadCommand("*nope".into()).to_string(),
            "Error: Bad command '*nope'"
        );
    }

    #[test]
    fn only_sentinel_lines_are_commands() {
        assert!(is_command("*sleep 10"));
        assert!(!is_command(" *sleep 10"));
        assert!(!is_command("hello"));
    }
}
