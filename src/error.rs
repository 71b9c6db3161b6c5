use std::{error::Error as StdError, fmt, io, path::PathBuf};

pub type Result<T> = ::std::result::Result<T, Error>;

/// Exit status when the command line cannot be understood.
pub const EXIT_USAGE: i32 = 1;
/// Exit status when the job file cannot be opened.
pub const EXIT_JOBFILE: i32 = 2;
/// Exit status when the operator input file cannot be opened.
pub const EXIT_INPUT: i32 = 3;
/// Exit status when a job process cannot be created.
pub const EXIT_FORK: i32 = 4;
/// Exit status for any other unrecoverable runtime failure.
pub const EXIT_RUNTIME: i32 = 5;

pub enum Error {
    Usage,
    Config(String),
    JobFile(PathBuf, io::Error),
    InputFile(PathBuf, io::Error),
    Fork(nix::Error),
    Nix(nix::Error),
    Io(io::Error),
}

impl Error {
    /// The status the whole supervisor terminates with for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::Usage | Error::Config(_) => EXIT_USAGE,
            Error::JobFile(_, _) => EXIT_JOBFILE,
            Error::InputFile(_, _) => EXIT_INPUT,
            Error::Fork(_) => EXIT_FORK,
            Error::Nix(_) => EXIT_RUNTIME,
            Error::Io(_) => EXIT_RUNTIME,
        }
    }
}

impl StdError for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Error::Nix(err)
    }
}

impl From<crate::config::ConfigBuilderError> for Error {
    fn from(err: crate::config::ConfigBuilderError) -> Self {
        Error::Config(err.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Usage => write!(f, "Usage: jobherd [-v] [-i inputfile] jobfile"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::JobFile(_, _) => write!(f, "Error: Unable to read job file"),
            Error::InputFile(_, _) => write!(f, "Error: Unable to read input file"),
            Error::Fork(_) => write!(f, "fork() failed!"),
            Error::Nix(err) => write!(f, "System error: {}", err),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::JobFile(path, err) | Error::InputFile(path, err) => {
                write!(f, "{} ({}: {})", self, path.display(), err)
            }
            Error::Fork(err) => write!(f, "{} ({})", self, err),
            _ => fmt::Display::fmt(self, f),
        }
    }
}
