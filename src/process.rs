#![allow(unsafe_code)]

//! Starting job processes and watching them end.
//!
//! Jobs are started with a plain fork and exec so that standard input and
//! output can be pointed at either the job's redirect files or pipes held by
//! the supervisor. Each job becomes the leader of its own process group.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, setpgid, ForkResult, Pid};

use crate::error::{Error, Result};
use crate::job::{JobSpec, StaticIo};
use crate::lines::LineReader;

/// Exit status of a child whose command could not be executed.
pub const EXEC_FAILURE_STATUS: i32 = 99;

/// A running job process and the supervisor's ends of its pipes.
#[derive(Debug)]
pub struct Child {
    pid: Pid,
    stdin: Option<File>,
    stdout: Option<LineReader<File>>,
}

/// How a reaped process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    Signal(i32),
    /// The process could no longer be waited for.
    Lost,
}

impl Child {
    /// Write end of the job's input pipe.
    pub fn stdin_mut(&mut self) -> Option<&mut File> {
        self.stdin.as_mut()
    }

    /// Read end of the job's output pipe.
    pub fn stdout(&self) -> Option<&LineReader<File>> {
        self.stdout.as_ref()
    }

    pub fn stdout_mut(&mut self) -> Option<&mut LineReader<File>> {
        self.stdout.as_mut()
    }

    /// Non-blocking check for termination. Reaps the process if it ended.
    pub fn try_wait(&self) -> Option<Exit> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Some(Exit::Code(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => Some(Exit::Signal(signal as i32)),
            Ok(_) => None,
            Err(Errno::EINTR) => None,
            Err(err) => {
                warn!("cannot wait for process {}: {}", self.pid, err);
                Some(Exit::Lost)
            }
        }
    }

    /// Delivers `signal` to the job process itself.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        debug!("Sending {:?} to process {}", signal, self.pid);
        kill(self.pid, signal).map_err(Error::from)
    }

    /// Kills whatever is left of the job's process group.
    pub fn kill_group(&self) {
        match killpg(self.pid, Signal::SIGKILL) {
            Ok(()) => debug!("killed leftovers of process group {}", self.pid),
            Err(Errno::ESRCH) => {}
            Err(err) => debug!("cannot kill process group {}: {}", self.pid, err),
        }
    }
}

/// Starts a process for `spec`.
///
/// Pipe-mode sides get a fresh pipe; file-mode sides reuse the files in `io`,
/// so every run of a job shares one file offset. If a pipe cannot be created
/// the failure is logged and the child keeps the supervisor's own stream on
/// that side.
///
/// Failing to fork is fatal. Failing to exec makes the child exit with
/// [`EXEC_FAILURE_STATUS`].
pub fn spawn(spec: &JobSpec, io: &StaticIo) -> Result<Child> {
    let argv = spec
        .argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    if argv.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command").into());
    }
    // Built before forking so the child does not allocate.
    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let input_pipe = if spec.input.is_pipe() {
        open_pipe(spec.id, "input")
    } else {
        None
    };
    let output_pipe = if spec.output.is_pipe() {
        open_pipe(spec.id, "output")
    } else {
        None
    };

    let stdin_fd = match (&input_pipe, &io.input) {
        (Some((read, _)), _) => Some(read.as_raw_fd()),
        (None, Some(file)) => Some(file.as_raw_fd()),
        (None, None) => None,
    };
    let stdout_fd = match (&output_pipe, &io.output) {
        (Some((_, write)), _) => Some(write.as_raw_fd()),
        (None, Some(file)) => Some(file.as_raw_fd()),
        (None, None) => None,
    };

    debug!("Assembled command {:?} for job {}", spec.argv, spec.id);

    // SAFETY: the supervisor is single-threaded, and the child only rewires
    // descriptors before replacing itself with exec or exiting.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => exec_child(&argv_ptrs, stdin_fd, stdout_fd),
        Ok(ForkResult::Parent { child }) => {
            debug!("job {} started as process {}", spec.id, child);
            // The child holds its own copies of the ends it was given.
            let stdin = input_pipe.map(|(read, write)| {
                drop(read);
                File::from(write)
            });
            let stdout = output_pipe.map(|(read, write)| {
                drop(write);
                LineReader::new(File::from(read))
            });

            Ok(Child {
                pid: child,
                stdin,
                stdout,
            })
        }
        Err(err) => {
            error!("cannot fork for job {}: {}", spec.id, err);
            Err(Error::Fork(err))
        }
    }
}

/// Creates a pipe whose ends are closed on exec, so that only the job that
/// gets an end duplicated onto its standard streams ever keeps it.
fn open_pipe(id: usize, side: &str) -> Option<(OwnedFd, OwnedFd)> {
    match cloexec_pipe() {
        Ok(ends) => Some(ends),
        Err(err) => {
            error!("job {}: cannot create {} pipe: {}", id, side, err);
            None
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub(crate) fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub(crate) fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    set_cloexec(read.as_raw_fd());
    set_cloexec(write.as_raw_fd());
    Ok((read, write))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn set_cloexec(fd: RawFd) {
    // SAFETY: fd is a descriptor we own and keep open for the call.
    let res = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    if res == -1 {
        debug!("cannot set close-on-exec on fd {}: {}", fd, Errno::last());
    }
}

fn exec_child(
    argv: &[*const libc::c_char],
    stdin_fd: Option<RawFd>,
    stdout_fd: Option<RawFd>,
) -> ! {
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));

    // SAFETY: only async-signal-safe calls until exec or _exit; argv is a
    // null-terminated array of pointers into CStrings the parent still owns.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        if let Some(fd) = stdin_fd {
            libc::dup2(fd, libc::STDIN_FILENO);
        }
        if let Some(fd) = stdout_fd {
            libc::dup2(fd, libc::STDOUT_FILENO);
        }

        libc::execvp(argv[0], argv.as_ptr());
        libc::_exit(EXEC_FAILURE_STATUS)
    }
}
