//! Job file loading.
//!
//! Each non-blank, non-comment line holds four colon-separated fields:
//!
//! ```text
//! restart-limit : input-path : output-path : command
//! ```
//!
//! An empty restart limit (or `0`) means the job is restarted forever; empty
//! paths mean the supervisor connects a pipe instead of a file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::job::{JobSpec, Redirect, RestartLimit, StaticIo};
use crate::output::Output;
use crate::table::JobTable;
use crate::tokenize;

/// A parsed job line, before it has been given an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobLine {
    pub restart_limit: RestartLimit,
    pub input: Redirect,
    pub output: Redirect,
    pub argv: Vec<String>,
}

impl JobLine {
    fn into_spec(self, id: usize) -> JobSpec {
        JobSpec {
            id,
            argv: self.argv,
            restart_limit: self.restart_limit,
            input: self.input,
            output: self.output,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parsed {
    /// Blank or comment.
    Skip,
    Malformed,
    Job(JobLine),
}

/// Parses one job file line. Surrounding whitespace is ignored.
pub fn parse_line(line: &str) -> Parsed {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Parsed::Skip;
    }

    let fields = tokenize::fields(line, ':');
    let (limit, input, output, command) = match fields.as_slice() {
        [limit, input, output, command] => (*limit, *input, *output, *command),
        _ => return Parsed::Malformed,
    };

    let restart_limit = match RestartLimit::from_field(limit) {
        Some(limit) => limit,
        None => return Parsed::Malformed,
    };

    let argv = tokenize::args(command);
    if argv.is_empty() || argv.iter().any(|arg| arg.contains('\0')) {
        return Parsed::Malformed;
    }

    Parsed::Job(JobLine {
        restart_limit,
        input: Redirect::from_field(input),
        output: Redirect::from_field(output),
        argv,
    })
}

/// Opens the job file and loads every job in it.
pub fn load_file<O: Write, E: Write>(
    path: &Path,
    verbose: bool,
    output: &mut Output<O, E>,
) -> Result<JobTable> {
    let file = File::open(path).map_err(|err| Error::JobFile(path.to_owned(), err))?;
    load(BufReader::new(file), verbose, output)
}

/// Loads jobs from a job file stream.
///
/// Malformed lines are skipped without using up an id. Jobs whose redirect
/// files cannot be opened are still registered, so later ids do not shift,
/// but are never started.
pub fn load<R: BufRead, O: Write, E: Write>(
    reader: R,
    verbose: bool,
    output: &mut Output<O, E>,
) -> Result<JobTable> {
    let mut table = JobTable::new();

    for bytes in reader.split(b'\n') {
        let bytes = bytes?;
        let line = String::from_utf8_lossy(&bytes);
        // Comments may hold any bytes; a job line must be valid UTF-8.
        let parsed = match parse_line(&line) {
            Parsed::Job(_) if std::str::from_utf8(&bytes).is_err() => Parsed::Malformed,
            parsed => parsed,
        };
        let job = match parsed {
            Parsed::Skip => continue,
            Parsed::Malformed => {
                debug!("skipping malformed job line {:?}", line);
                if verbose {
                    output.diag(format_args!(
                        "Error: invalid job specification: {}",
                        line.trim()
                    ));
                }
                continue;
            }
            Parsed::Job(job) => job,
        };

        let spec = job.into_spec(table.next_id());
        if verbose {
            output.line(format_args!("Registering worker {}: {}", spec.id, spec));
        }

        let (io, runnable) = match open_redirects(&spec) {
            Ok(io) => (io, true),
            Err(message) => {
                output.diag(format_args!("{}", message));
                (StaticIo::default(), false)
            }
        };

        let id = table.register(spec, io, runnable);
        debug!("registered job {} (runnable: {})", id, runnable);
    }

    info!(
        "loaded {} job(s), {} invalid",
        table.len(),
        table.invalid()
    );
    Ok(table)
}

fn open_redirects(spec: &JobSpec) -> std::result::Result<StaticIo, String> {
    let mut io = StaticIo::default();

    if let Redirect::File(path) = &spec.input {
        let file = File::open(path).map_err(|err| {
            warn!("job {}: cannot open {:?}: {}", spec.id, path, err);
            format!("Error: unable to open \"{}\" for reading", path.display())
        })?;
        io.input = Some(file);
    }

    if let Redirect::File(path) = &spec.output {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|err| {
                warn!("job {}: cannot open {:?}: {}", spec.id, path, err);
                format!("Error: unable to open \"{}\" for writing", path.display())
            })?;
        io.output = Some(file);
    }

    Ok(io)
}
