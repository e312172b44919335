use std::{
    ffi::CString,
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

use crate::cutils::cerr;

pub(crate) mod interface;
pub(crate) mod signal;
pub(crate) mod wait;

pub(crate) use interface::ProcessId;

use signal::consts::SIGCONT;
use signal::SignalNumber;

pub(crate) fn _exit(status: libc::c_int) -> ! {
    unsafe { libc::_exit(status) }
}

pub(crate) enum ForkResult {
    // Parent process branch with the child process' PID.
    Parent(ProcessId),
    // Child process branch.
    Child,
}

unsafe fn inner_fork() -> io::Result<ForkResult> {
    let pid = cerr(unsafe { libc::fork() })?;
    if pid == 0 {
        Ok(ForkResult::Child)
    } else {
        Ok(ForkResult::Parent(ProcessId::new(pid)))
    }
}

#[cfg(target_os = "linux")]
/// Create a new process.
pub(crate) fn fork() -> io::Result<ForkResult> {
    // SAFETY: `fork` is implemented using `clone` in linux so we don't need to worry about signal
    // safety.
    unsafe { inner_fork() }
}

#[cfg(not(target_os = "linux"))]
/// Create a new process.
///
/// # Safety
///
/// In a multithreaded program, only async-signal-safe functions are guaranteed to work in the
/// child process until a call to `execve` or a similar function is done.
pub(crate) unsafe fn fork() -> io::Result<ForkResult> {
    inner_fork()
}

/// Send a signal to a process group with the specified ID.
pub(crate) fn killpg(pgid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: This function cannot cause UB even if `pgid` is not a valid process ID or if
    // `signal` is not a valid signal code.
    cerr(unsafe { libc::killpg(pgid.get(), signal) }).map(|_| ())
}

/// Set a process group ID.
pub(crate) fn setpgid(pid: ProcessId, pgid: ProcessId) -> io::Result<()> {
    cerr(unsafe { libc::setpgid(pid.get(), pgid.get()) }).map(|_| ())
}

/// A process group, identified by the process ID of its leader.
///
/// Signals sent through this type reach every member of the group, so a
/// multi-stage pipeline is interrupted, stopped or resumed as a unit rather
/// than one stage at a time.
pub(crate) struct ProcessGroup(ProcessId);

impl ProcessGroup {
    pub(crate) fn new(leader: ProcessId) -> Self {
        Self(leader)
    }

    pub(crate) fn leader(&self) -> ProcessId {
        self.0
    }

    /// Deliver `signal` to every process in the group.
    pub(crate) fn signal(&self, signal: SignalNumber) -> io::Result<()> {
        killpg(self.0, signal)
    }

    /// Resume every stopped process in the group.
    pub(crate) fn cont(&self) -> io::Result<()> {
        self.signal(SIGCONT)
    }

    /// Make `pid` a member of this group.
    pub(crate) fn adopt(&self, pid: ProcessId) -> io::Result<()> {
        setpgid(pid, self.0)
    }
}

/// An anonymous pipe. Dropping an end closes it.
pub(crate) struct Pipe {
    pub(crate) read: OwnedFd,
    pub(crate) write: OwnedFd,
}

pub(crate) fn pipe() -> io::Result<Pipe> {
    let mut fds: [RawFd; 2] = [-1, -1];

    cerr(unsafe { libc::pipe(fds.as_mut_ptr()) })?;

    // SAFETY: on success both descriptors are valid, open, and owned by us.
    unsafe {
        Ok(Pipe {
            read: OwnedFd::from_raw_fd(fds[0]),
            write: OwnedFd::from_raw_fd(fds[1]),
        })
    }
}

fn dup2<F: AsRawFd>(file: &F, target: RawFd) -> io::Result<()> {
    cerr(unsafe { libc::dup2(file.as_raw_fd(), target) }).map(|_| ())
}

/// Rebind standard input to the given descriptor.
pub(crate) fn dup2_stdin<F: AsRawFd>(file: &F) -> io::Result<()> {
    dup2(file, libc::STDIN_FILENO)
}

/// Rebind standard output to the given descriptor.
pub(crate) fn dup2_stdout<F: AsRawFd>(file: &F) -> io::Result<()> {
    dup2(file, libc::STDOUT_FILENO)
}

/// Rebind standard error to standard output.
pub(crate) fn redirect_stderr_to_stdout() -> io::Result<()> {
    cerr(unsafe { libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) }).map(|_| ())
}

/// Replace the current process image, resolving `argv[0]` against `PATH`.
///
/// Only returns on failure.
pub(crate) fn execvp(args: &[String]) -> io::Error {
    let Ok(args) = args
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
    else {
        return io::Error::new(io::ErrorKind::InvalidInput, "argument contains a nul byte");
    };

    let Some(program) = args.first() else {
        return io::Error::new(io::ErrorKind::InvalidInput, "empty argument list");
    };

    let mut argv: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(std::ptr::null());

    // SAFETY: `argv` is a null-terminated array of pointers to valid C strings.
    unsafe { libc::execvp(program.as_ptr(), argv.as_ptr()) };

    io::Error::last_os_error()
}

pub(crate) fn make_zeroed_sigaction() -> libc::sigaction {
    // SAFETY: since sigaction is a C struct, all-zeroes is a valid representation
    // We cannot use a "literal struct" initialization method since the exact representation
    // of libc::sigaction is not fixed
    unsafe { std::mem::zeroed() }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        os::{fd::AsRawFd, unix::net::UnixStream},
        process::exit,
    };

    use libc::SIGKILL;

    use super::{fork, pipe, setpgid, ForkResult, ProcessGroup, ProcessId};
    use crate::cutils::cerr;
    use crate::system::wait::{wait, WaitOptions, WaitTarget};

    fn getpgid(pid: ProcessId) -> ProcessId {
        ProcessId::new(cerr(unsafe { libc::getpgid(pid.get()) }).unwrap())
    }

    #[test]
    fn pgid_test() {
        let this = ProcessId::new(std::process::id() as i32);
        let pgrp = getpgid(this);

        let ForkResult::Parent(child_pid) = fork().unwrap() else {
            // wait for the parent.
            std::thread::sleep(std::time::Duration::from_secs(1));
            exit(0);
        };

        // The child should be in our process group.
        assert_eq!(getpgid(child_pid), pgrp);
        // Move the child to its own process group
        setpgid(child_pid, child_pid).unwrap();
        // The process group of the child should have changed.
        assert_eq!(getpgid(child_pid), child_pid);

        ProcessGroup::new(child_pid).signal(SIGKILL).unwrap();
        wait(WaitTarget::Process(child_pid), WaitOptions::new()).unwrap();
    }

    #[test]
    fn group_signal_reaches_every_member() {
        // Create a socket so the children write to it if they aren't terminated by the group
        // signal.
        let (mut rx, mut tx) = UnixStream::pair().unwrap();

        let ForkResult::Parent(pid1) = fork().unwrap() else {
            std::thread::sleep(std::time::Duration::from_secs(1));
            tx.write_all(&[42]).unwrap();
            exit(0);
        };

        let ForkResult::Parent(pid2) = fork().unwrap() else {
            std::thread::sleep(std::time::Duration::from_secs(1));
            tx.write_all(&[42]).unwrap();
            exit(0);
        };

        drop(tx);

        let group = ProcessGroup::new(pid1);
        // Move the children to their own process group.
        setpgid(pid1, group.leader()).unwrap();
        group.adopt(pid2).unwrap();
        // Send `SIGKILL` to the children process group.
        group.signal(SIGKILL).unwrap();
        // Ensure that the children were terminated before writing.
        assert_eq!(
            rx.read_exact(&mut [0; 2]).unwrap_err().kind(),
            std::io::ErrorKind::UnexpectedEof
        );

        for pid in [pid1, pid2] {
            wait(WaitTarget::Process(pid), WaitOptions::new()).unwrap();
        }
    }

    #[test]
    fn pipe_round_trip() {
        let pipe = pipe().unwrap();

        let mut bytes = [0; 5];
        cerr(unsafe { libc::write(pipe.write.as_raw_fd(), "hello".as_ptr().cast(), 5) }).unwrap();
        drop(pipe.write);

        let n = cerr(unsafe { libc::read(pipe.read.as_raw_fd(), bytes.as_mut_ptr().cast(), 5) })
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(&bytes, b"hello");

        // All writers are closed, so the reader sees end-of-input.
        let n = cerr(unsafe { libc::read(pipe.read.as_raw_fd(), bytes.as_mut_ptr().cast(), 5) })
            .unwrap();
        assert_eq!(n, 0);
    }
}
