use std::io;

use libc::{
    c_int, WEXITSTATUS, WIFEXITED, WIFSIGNALED, WIFSTOPPED, WNOHANG, WSTOPSIG, WTERMSIG, WUNTRACED,
};

use crate::cutils::cerr;
use crate::system::interface::ProcessId;
use crate::system::signal::{signal_name, SignalNumber};

/// Which children a call to [`wait`] selects.
#[derive(Clone, Copy)]
pub(crate) enum WaitTarget {
    /// Any child of the calling process.
    AnyChild,
    /// The child with the given process ID.
    Process(ProcessId),
}

impl WaitTarget {
    fn pid(self) -> libc::pid_t {
        match self {
            WaitTarget::AnyChild => -1,
            WaitTarget::Process(pid) => pid.get(),
        }
    }
}

/// Wait for a child process to change state.
///
/// Calling this function will block until a child selected by `target` has changed state. This
/// can be configured further using [`WaitOptions`].
pub(crate) fn wait(
    target: WaitTarget,
    options: WaitOptions,
) -> Result<(ProcessId, WaitStatus), WaitError> {
    let mut status: c_int = 0;

    let pid = cerr(unsafe { libc::waitpid(target.pid(), &mut status, options.flags) })
        .map_err(WaitError::Io)?;

    if pid == 0 && options.flags & WNOHANG != 0 {
        return Err(WaitError::NotReady);
    }

    Ok((ProcessId::new(pid), WaitStatus { status }))
}

/// Error values returned when [`wait`] fails.
#[derive(Debug)]
pub(crate) enum WaitError {
    // No children were in a waitable state.
    //
    // This is only returned if the [`WaitOptions::no_hang`] option is used.
    NotReady,
    // Regular I/O error.
    Io(io::Error),
}

/// Options to configure how [`wait`] waits for children.
pub(crate) struct WaitOptions {
    flags: c_int,
}

impl WaitOptions {
    /// Only wait for terminated children.
    pub(crate) const fn new() -> Self {
        Self { flags: 0 }
    }

    /// Return immediately if no child has changed state.
    pub(crate) const fn no_hang(mut self) -> Self {
        self.flags |= WNOHANG;
        self
    }

    /// Also report children that have stopped.
    pub(crate) const fn untraced(mut self) -> Self {
        self.flags |= WUNTRACED;
        self
    }
}

/// The status of the waited child.
pub(crate) struct WaitStatus {
    status: c_int,
}

impl std::fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(exit_status) = self.exit_status() {
            write!(f, "ExitStatus({exit_status})")
        } else if let Some(signal) = self.term_signal() {
            write!(f, "TermSignal({})", signal_name(signal))
        } else if let Some(signal) = self.stop_signal() {
            write!(f, "StopSignal({})", signal_name(signal))
        } else {
            write!(f, "Unknown")
        }
    }
}

impl WaitStatus {
    /// Return `true` if the child terminated normally, i.e., by calling `exit`.
    pub(crate) const fn did_exit(&self) -> bool {
        WIFEXITED(self.status)
    }

    /// Return the exit status of the child if the child terminated normally.
    pub(crate) const fn exit_status(&self) -> Option<c_int> {
        if self.did_exit() {
            Some(WEXITSTATUS(self.status))
        } else {
            None
        }
    }

    /// Return `true` if the child process was terminated by a signal.
    pub(crate) const fn was_signaled(&self) -> bool {
        WIFSIGNALED(self.status)
    }

    /// Return the signal number which caused the child to terminate if the child was terminated by
    /// a signal.
    pub(crate) const fn term_signal(&self) -> Option<SignalNumber> {
        if self.was_signaled() {
            Some(WTERMSIG(self.status))
        } else {
            None
        }
    }

    /// Return `true` if the child process was stopped by a signal.
    pub(crate) const fn was_stopped(&self) -> bool {
        WIFSTOPPED(self.status)
    }

    /// Return the signal number which caused the child to stop if the child was stopped by a
    /// signal.
    pub(crate) const fn stop_signal(&self) -> Option<SignalNumber> {
        if self.was_stopped() {
            Some(WSTOPSIG(self.status))
        } else {
            None
        }
    }
}
