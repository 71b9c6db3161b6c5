//! The supervisor loop.
//!
//! Every tick runs the same steps in the same order:
//!
//! 1. reap jobs whose process ended, and report how;
//! 2. restart the ones whose budget allows it, retire the rest;
//! 3. stop if no job can ever run again;
//! 4. take one operator line: a console command, or a broadcast to all
//!    running jobs;
//! 5. after a broadcast, relay at most one line of piped output per job.
//!
//! Operator input and job output are waited on with `poll`, never with bare
//! sleeps, so that a status request is served while the loop is idle.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::errno::Errno;

use crate::config::Config;
use crate::console::{self, Directive};
use crate::error::{Error, Result};
use crate::job::{Job, JobId, JobStatus};
use crate::jobfile;
use crate::lines::{poll_readable, LineReader};
use crate::output::Output;
use crate::process::{self, Child, Exit};
use crate::report;
use crate::signal;
use crate::table::JobTable;

/// Longest single wait for operator input before interrupts are looked at.
const INPUT_SLICE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The operator input stream ended.
    EndOfInput,
    /// Every job has used up its restarts.
    Exhausted,
}

/// Loads the job file named in `config` and supervises its jobs until the
/// operator input ends or no job is left to run.
pub fn run(config: &Config) -> Result<Outcome> {
    signal::install()?;
    let input = open_operator_input(config.input.as_deref())?;
    let mut output = Output::stdio();
    let table = jobfile::load_file(&config.jobfile, config.verbose, &mut output)?;

    let mut supervisor = Supervisor::new(config, table, input, output);
    supervisor.watch_signals(true);
    supervisor.start()?;
    supervisor.run()
}

/// Opens the operator input: the given file, or else standard input.
pub fn open_operator_input(path: Option<&Path>) -> Result<LineReader<File>> {
    let file = match path {
        Some(path) => File::open(path).map_err(|err| Error::InputFile(path.to_owned(), err))?,
        // A private handle, so no bytes hide in the standard library's buffer
        // where poll cannot see them.
        None => File::from(io::stdin().as_fd().try_clone_to_owned()?),
    };

    Ok(LineReader::new(file))
}

pub struct Supervisor<O, E> {
    table: JobTable,
    input: LineReader<File>,
    output: Output<O, E>,
    verbose: bool,
    settle: Duration,
    signals: bool,
}

impl<O: Write, E: Write> Supervisor<O, E> {
    pub fn new(config: &Config, table: JobTable, input: LineReader<File>, output: Output<O, E>) -> Self {
        Self {
            table,
            input,
            output,
            verbose: config.verbose,
            settle: config.settle,
            signals: false,
        }
    }

    /// Whether to act on interrupts received by the process.
    pub fn watch_signals(&mut self, watch: bool) {
        self.signals = watch;
    }

    pub const fn table(&self) -> &JobTable {
        &self.table
    }

    pub fn into_output(self) -> (O, E) {
        self.output.into_inner()
    }

    /// Starts every runnable job once.
    pub fn start(&mut self) -> Result<()> {
        let ids: Vec<JobId> = self
            .table
            .iter()
            .filter(|job| job.runnable)
            .map(Job::id)
            .collect();

        for id in ids {
            self.launch(id)?;
            if self.verbose {
                self.output.line(format_args!("Spawning worker {}", id));
            }
        }

        sleep(self.settle);
        Ok(())
    }

    pub fn run(&mut self) -> Result<Outcome> {
        loop {
            if let Some(outcome) = self.tick()? {
                return Ok(outcome);
            }
        }
    }

    /// Runs one iteration of the loop. Returns an outcome when supervision
    /// is over.
    pub fn tick(&mut self) -> Result<Option<Outcome>> {
        self.service_signals();

        let ended = self.reap();
        self.restart(&ended)?;

        if self.table.viable() == 0 && self.table.all_ended() {
            self.output.diag(format_args!("No more viable workers, exiting"));
            return Ok(Some(Outcome::Exhausted));
        }

        let line = match self.next_operator_line()? {
            Some(line) => line,
            None => {
                info!("operator input ended");
                return Ok(Some(Outcome::EndOfInput));
            }
        };

        if console::is_command(&line) {
            self.command(&line);
        } else {
            self.broadcast(&line);
            self.drain()?;
        }

        Ok(None)
    }

    fn launch(&mut self, id: JobId) -> Result<()> {
        let job = match self.table.get_mut(id) {
            Some(job) => job,
            None => return Ok(()),
        };

        let child = process::spawn(&job.spec, &job.io)?;
        job.started(child);
        self.table.worker_started();
        Ok(())
    }

    /// Collects jobs whose process ended since the last tick, releasing their
    /// process group and pipes.
    fn reap(&mut self) -> Vec<JobId> {
        let mut ended = Vec::new();

        for job in self.table.iter_mut() {
            let exit = match job.child().and_then(Child::try_wait) {
                Some(exit) => exit,
                None => continue,
            };
            let id = job.id();

            if let Some(child) = job.child() {
                child.kill_group();
            }

            job.status = match exit {
                Exit::Code(code) => {
                    self.output.line(format_args!(
                        "Job {} has terminated with exit code {}",
                        id, code
                    ));
                    JobStatus::Exited(code)
                }
                Exit::Signal(signal) => {
                    self.output.line(format_args!(
                        "Job {} has terminated due to signal {}",
                        id, signal
                    ));
                    JobStatus::Signaled(signal)
                }
                Exit::Lost => JobStatus::Ended,
            };
            ended.push(id);
        }

        for _ in &ended {
            self.table.worker_lost();
        }

        ended
    }

    fn restart(&mut self, ended: &[JobId]) -> Result<()> {
        let mut restarted = false;

        for &id in ended {
            if self.table.get(id).map_or(false, Job::may_restart) {
                self.launch(id)?;
                restarted = true;
                if self.verbose {
                    self.output.diag(format_args!("Restarting worker {}", id));
                }
            } else if let Some(job) = self.table.get_mut(id) {
                debug!("job {} has no restarts left after {} run(s)", id, job.runs);
                job.retire();
            }
        }

        if restarted {
            sleep(self.settle);
        }

        Ok(())
    }

    fn next_operator_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.input.take_line() {
                return Ok(Some(line));
            }
            if self.input.at_eof() {
                return Ok(None);
            }

            self.service_signals();
            match poll_readable(&[self.input.as_fd()], INPUT_SLICE) {
                Ok(ready) => {
                    if ready.first().copied().unwrap_or(false) {
                        self.input.fill()?;
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn command(&mut self, line: &str) {
        match console::interpret(line, &self.table) {
            Ok(Directive::Signal { job, signal }) => {
                let delivered = self
                    .table
                    .get(job)
                    .and_then(Job::child)
                    .map(|child| child.signal(signal));
                if let Some(Err(err)) = delivered {
                    warn!("cannot deliver {:?} to job {}: {}", signal, job, err);
                    self.output.diag(format_args!("Kill error"));
                }
                sleep(self.settle);
            }
            Ok(Directive::Sleep(duration)) => {
                debug!("sleeping for {:?}", duration);
                sleep(duration);
                sleep(self.settle);
            }
            Err(err) => self.output.line(format_args!("{}", err)),
        }
    }

    /// Sends `line` to every running job with piped input. Jobs reading from
    /// a file get nothing and have their forwarded count reset.
    fn broadcast(&mut self, line: &str) {
        let payload = format!("{}\n", line);

        for job in self.table.iter_mut() {
            if !job.status.is_running() {
                continue;
            }
            if !job.spec.input.is_pipe() {
                job.lines_forwarded = 0;
                continue;
            }

            let id = job.id();
            if let Some(stdin) = job.child_mut().and_then(Child::stdin_mut) {
                if let Err(err) = stdin.write_all(payload.as_bytes()) {
                    debug!("job {}: input not delivered: {}", id, err);
                }
            }

            self.output.line(format_args!("{}<-'{}'", id, line));
            job.lines_forwarded += 1;
        }
    }

    /// Relays one line from each running job with piped output, waiting up to
    /// the settle time for jobs that have not written one yet.
    fn drain(&mut self) -> Result<()> {
        let mut pending: Vec<JobId> = self
            .table
            .iter()
            .filter(|job| job.child().and_then(Child::stdout).is_some())
            .map(Job::id)
            .collect();

        if pending.is_empty() {
            sleep(self.settle);
            return Ok(());
        }

        let deadline = Instant::now() + self.settle;
        loop {
            pending.retain(|&id| !self.relay_if_ready(id));
            if pending.is_empty() {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                trace!("no output this tick from jobs {:?}", pending);
                break;
            }

            let ready: Vec<JobId> = {
                let watched: Vec<(JobId, BorrowedFd<'_>)> = pending
                    .iter()
                    .filter_map(|&id| {
                        let reader = self.table.get(id)?.child()?.stdout()?;
                        Some((id, reader.as_fd()))
                    })
                    .collect();
                let fds: Vec<BorrowedFd<'_>> = watched.iter().map(|(_, fd)| *fd).collect();

                match poll_readable(&fds, remaining) {
                    Ok(flags) => watched
                        .iter()
                        .zip(flags)
                        .filter(|(_, ready)| *ready)
                        .map(|((id, _), _)| *id)
                        .collect(),
                    Err(Errno::EINTR) => Vec::new(),
                    Err(err) => return Err(err.into()),
                }
            };

            self.service_signals();
            for id in ready {
                let reader = self
                    .table
                    .get_mut(id)
                    .and_then(Job::child_mut)
                    .and_then(Child::stdout_mut);
                if let Some(reader) = reader {
                    if let Err(err) = reader.fill() {
                        warn!("cannot read output of job {}: {}", id, err);
                        pending.retain(|&other| other != id);
                    }
                }
            }
        }

        Ok(())
    }

    /// Relays the next output line of job `id` if one is buffered, or notes
    /// the end of its output. Returns false if the job has nothing yet.
    fn relay_if_ready(&mut self, id: JobId) -> bool {
        let reader = match self
            .table
            .get_mut(id)
            .and_then(Job::child_mut)
            .and_then(Child::stdout_mut)
        {
            Some(reader) => reader,
            None => return true,
        };

        if !reader.is_ready() {
            return false;
        }

        match reader.take_line() {
            Some(line) => self.output.line(format_args!("{}->'{}'", id, line)),
            None => {
                if self.verbose {
                    self.output.diag(format_args!("Received EOF from job {}", id));
                }
            }
        }

        true
    }

    /// Acts on interrupts noticed since the last call.
    fn service_signals(&mut self) {
        if !self.signals {
            return;
        }

        if signal::take_status_request() {
            for line in report::snapshot(&self.table) {
                self.output.diag(format_args!("{}", line));
            }
        }

        if signal::take_interrupt() {
            trace!("interrupt received, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Run {
        outcome: Outcome,
        out: String,
        err: String,
        table: JobTable,
    }

    fn supervise(dir: &TempDir, jobs: &str, input: &str) -> Run {
        let input_path = dir.path().join("operator-input");
        std::fs::write(&input_path, input).unwrap();

        let config = ConfigBuilder::default()
            .jobfile(dir.path().join("jobs"))
            .verbose(true)
            .settle(Duration::from_millis(100))
            .build()
            .unwrap();

        let mut output = Output::new(Vec::new(), Vec::new());
        let table = jobfile::load(Cursor::new(jobs), false, &mut output).unwrap();
        let input = open_operator_input(Some(&input_path)).unwrap();

        let mut supervisor = Supervisor::new(&config, table, input, output);
        supervisor.start().unwrap();
        let outcome = supervisor.run().unwrap();

        let Supervisor { table, output, .. } = supervisor;
        let (out, err) = output.into_inner();
        Run {
            outcome,
            out: String::from_utf8(out).unwrap(),
            err: String::from_utf8(err).unwrap(),
            table,
        }
    }

    /// A started supervisor reading operator input from a pipe, and the
    /// pipe's write end.
    fn piped(jobs: &str) -> (Supervisor<Vec<u8>, Vec<u8>>, File) {
        let (read, write) = process::cloexec_pipe().unwrap();
        let config = ConfigBuilder::default()
            .jobfile("jobs")
            .settle(Duration::from_millis(50))
            .build()
            .unwrap();

        let mut output = Output::new(Vec::new(), Vec::new());
        let table = jobfile::load(Cursor::new(jobs), false, &mut output).unwrap();
        let input = LineReader::new(File::from(read));

        let mut supervisor = Supervisor::new(&config, table, input, output);
        supervisor.watch_signals(true);
        supervisor.start().unwrap();
        (supervisor, File::from(write))
    }

    fn kill_leftovers(table: &JobTable) {
        for child in table.iter().filter_map(Job::child) {
            let _ = child.signal(nix::sys::signal::Signal::SIGKILL);
        }
    }

    #[test]
    fn finite_budget_runs_limit_plus_one_times() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        let jobs = format!("2::{}:echo hi\n", out_path.display());

        let run = supervise(&dir, &jobs, &"x\n".repeat(40));

        assert_eq!(run.outcome, Outcome::Exhausted);
        assert_eq!(
            run.out.matches("Job 1 has terminated with exit code 0").count(),
            3
        );
        assert_eq!(run.err.matches("Restarting worker 1").count(), 2);
        assert_eq!(run.err.matches("No more viable workers, exiting").count(), 1);
        assert!(!run.out.contains("1->'"));
        assert_eq!(run.table.get(1).unwrap().runs, 3);
        assert_eq!(std::fs::read_to_string(out_path).unwrap(), "hi\nhi\nhi\n");
    }

    #[test]
    fn broadcast_is_echoed_and_relayed() {
        let dir = tempfile::tempdir().unwrap();
        let run = supervise(&dir, "0:::cat\n", "hello\nworld\n");

        assert_eq!(run.outcome, Outcome::EndOfInput);
        let sent = run.out.find("1<-'hello'").unwrap();
        let relayed = run.out.find("1->'hello'").unwrap();
        assert!(sent < relayed);
        assert!(run.out.contains("1<-'world'"));
        assert!(run.out.contains("1->'world'"));
        assert_eq!(run.table.get(1).unwrap().lines_forwarded, 2);
        assert!(run.out.contains("Spawning worker 1"));
    }

    #[test]
    fn file_input_jobs_get_no_broadcasts() {
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.txt");
        let out_path = dir.path().join("out.txt");
        std::fs::write(&in_path, "").unwrap();
        let jobs = format!(
            "0:::cat\n0:{}:{}:sleep 30\n",
            in_path.display(),
            out_path.display()
        );

        let run = supervise(&dir, &jobs, "a\nb\n");
        kill_leftovers(&run.table);

        assert!(run.out.contains("1<-'a'"));
        assert!(!run.out.contains("2<-'"));
        assert!(!run.out.contains("2->'"));
        assert_eq!(run.table.get(1).unwrap().lines_forwarded, 2);
        assert_eq!(run.table.get(2).unwrap().lines_forwarded, 0);
    }

    #[test]
    fn exec_failure_is_reported_as_exit() {
        let dir = tempfile::tempdir().unwrap();
        let run = supervise(&dir, "1:::/nonexistent/jobherd-job\n", &"x\n".repeat(30));

        assert_eq!(run.outcome, Outcome::Exhausted);
        assert_eq!(
            run.out.matches("Job 1 has terminated with exit code 99").count(),
            2
        );
    }

    #[test]
    fn nothing_runnable_exits_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let run = supervise(&dir, "1:/nonexistent/in.txt::cat\n", "never read\n");

        assert_eq!(run.outcome, Outcome::Exhausted);
        assert_eq!(
            run.err,
            "Error: unable to open \"/nonexistent/in.txt\" for reading\n\
             No more viable workers, exiting\n"
        );
        assert!(run.out.is_empty());

        let run = supervise(&dir, "", "");
        assert_eq!(run.outcome, Outcome::Exhausted);
    }

    #[test]
    fn console_mistakes_are_reported_and_survived() {
        let dir = tempfile::tempdir().unwrap();
        let input = "*signal 5 1\n*signal 1\n*signal 1 64\n*bogus\n*sleep x\n*sleep 10\n";
        let run = supervise(&dir, "0:::cat\n", input);

        assert_eq!(run.outcome, Outcome::EndOfInput);
        let expected = [
            "Error: Invalid job",
            "Error: Incorrect number of arguments",
            "Error: Invalid signal",
            "Error: Bad command '*bogus'",
            "Error: Invalid duration",
        ];
        for message in &expected {
            assert!(run.out.contains(message), "missing {:?} in {:?}", message, run.out);
        }
        assert!(!run.out.contains("1<-'"));
        assert_eq!(run.table.get(1).unwrap().lines_forwarded, 0);
    }

    #[test]
    fn hangup_dumps_every_job_in_order() {
        let _flags = signal::exclusive();
        signal::install().unwrap();
        signal::take_status_request();

        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.txt");
        let out_path = dir.path().join("out.txt");
        std::fs::write(&in_path, "").unwrap();
        let jobs = format!(
            "0:::cat\n1:/nonexistent/in.txt::cat\n1:{}:{}:true\n",
            in_path.display(),
            out_path.display()
        );
        let (mut supervisor, mut feed) = piped(&jobs);

        let mut sent = 0;
        while !supervisor.table().get(3).unwrap().is_ended() {
            assert!(sent < 100, "job 3 never ran out of restarts");
            feed.write_all(b"ping\n").unwrap();
            assert_eq!(supervisor.tick().unwrap(), None);
            sent += 1;
        }

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGHUP).unwrap();
        feed.write_all(b"ping\n").unwrap();
        assert_eq!(supervisor.tick().unwrap(), None);

        let (_, err) = supervisor.into_output();
        let err = String::from_utf8(err).unwrap();
        let dump = format!("1:1:{}\n2:0:0\n3:2:0\n", sent);
        assert!(err.contains(&dump), "no {:?} in {:?}", dump, err);
        assert_eq!(err.matches("2:0:0").count(), 1);
    }

    #[test]
    fn hangup_is_served_while_waiting_for_input() {
        let _flags = signal::exclusive();
        signal::install().unwrap();
        signal::take_status_request();

        let (mut supervisor, feed) = piped("0:::cat\n");
        let poke = std::thread::spawn(move || {
            sleep(Duration::from_millis(300));
            nix::sys::signal::raise(nix::sys::signal::Signal::SIGHUP).unwrap();
            sleep(Duration::from_millis(800));
            drop(feed);
        });

        assert_eq!(supervisor.tick().unwrap(), Some(Outcome::EndOfInput));
        poke.join().unwrap();

        let (out, err) = supervisor.into_output();
        assert!(out.is_empty());
        assert_eq!(String::from_utf8(err).unwrap(), "1:1:0\n");
    }

    #[test]
    fn signalled_jobs_are_reported_and_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let input = format!("*signal 1 9\n{0}*signal 1 9\n{0}", "x\n".repeat(10));
        let run = supervise(&dir, "1:::sleep 30\n", &input);
        kill_leftovers(&run.table);

        assert_eq!(run.outcome, Outcome::Exhausted);
        assert_eq!(
            run.out.matches("Job 1 has terminated due to signal 9").count(),
            2
        );
        assert_eq!(run.table.get(1).unwrap().runs, 2);
    }
}
