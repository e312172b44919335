//! Asynchronous signal handlers.
//!
//! Everything in this module below [`SignalRelay::register`] runs in signal
//! handler context and is restricted to async-signal-safe operations:
//! `waitpid`, `killpg`, `sigprocmask`, plain stores into the job table and
//! `write(2)` of messages formatted into a stack buffer. No heap, no
//! buffered stdio, no blocking.

use std::fmt;
use std::io;

use crate::system::signal::{
    consts::*, SignalHandler, SignalHandlerBehavior, SignalNumber, SignalSet,
};
use crate::system::wait::{wait, WaitOptions, WaitTarget};
use crate::system::{ProcessGroup, ProcessId, _exit};

use super::jobs::{JobState, JobTable};

/// The signals whose handlers touch the job table.
///
/// Any code mutating the table outside a handler must run with this set
/// blocked; the table itself enforces that.
pub(super) fn relay_signal_set() -> io::Result<SignalSet> {
    let mut set = SignalSet::empty()?;
    for signal in [SIGCHLD, SIGINT, SIGTSTP] {
        set.add(signal)?;
    }
    Ok(set)
}

/// The installed handlers. Dropping this restores the original dispositions.
pub(super) struct SignalRelay {
    _handlers: [SignalHandler; 4],
}

impl SignalRelay {
    pub(super) fn register() -> io::Result<Self> {
        Ok(Self {
            _handlers: [
                SignalHandler::register(SIGCHLD, SignalHandlerBehavior::Handler(on_sigchld))?,
                SignalHandler::register(SIGINT, SignalHandlerBehavior::Handler(on_sigint))?,
                SignalHandler::register(SIGTSTP, SignalHandlerBehavior::Handler(on_sigtstp))?,
                SignalHandler::register(SIGQUIT, SignalHandlerBehavior::Handler(on_sigquit))?,
            ],
        })
    }
}

/// Block the calling control flow until the job tracking `pid` is no longer
/// the foreground job.
///
/// The check and the sleep must not be separate steps: a child-status
/// notification landing between them would be lost and the shell would
/// sleep forever. So the condition is only ever checked with `SIGCHLD`
/// blocked, and [`SignalSet::suspend`] unblocks it and waits atomically.
/// The caller's signal mask is restored exactly on return.
pub(super) fn wait_foreground(table: &JobTable, pid: ProcessId) -> io::Result<()> {
    let mut set = SignalSet::empty()?;
    set.add(SIGCHLD)?;
    let original_set = set.block()?;

    // Re-check after every wakeup: any handler may have moved the job out of
    // the foreground, not just the child-status handler.
    while table.foreground_pid() == Some(pid) {
        original_set.suspend();
    }

    original_set.set_mask()?;

    Ok(())
}

/// Reap every child that has changed state, without blocking.
///
/// A single invocation drains everything that is pending, so one `SIGCHLD`
/// delivery is enough no matter how many children changed state while it
/// was blocked or being handled.
extern "C" fn on_sigchld(_signal: SignalNumber) {
    let Some(table) = JobTable::get() else {
        return;
    };

    loop {
        let (pid, status) = match wait(WaitTarget::AnyChild, WaitOptions::new().no_hang().untraced())
        {
            Ok(ok) => ok,
            // NotReady, or ECHILD once no children remain
            Err(_) => return,
        };

        if let Some(signal) = status.stop_signal() {
            if let Some(job) = table.job_with_pid(pid) {
                table.set_state(pid, JobState::Stopped);
                report(format_args!(
                    "Job [{}] ({}) stopped by signal {}",
                    job.jid, pid, signal
                ));
            }
        } else if let Some(signal) = status.term_signal() {
            if let Some(job) = table.job_with_pid(pid) {
                report(format_args!(
                    "Job [{}] ({}) terminated by signal {}",
                    job.jid, pid, signal
                ));
            }
            table.remove(pid);
        } else if status.did_exit() {
            table.remove(pid);
        }
    }
}

/// Forward a keyboard interrupt to the whole foreground process group.
extern "C" fn on_sigint(_signal: SignalNumber) {
    let Some(table) = JobTable::get() else {
        return;
    };

    if let Some(pid) = table.foreground_pid() {
        ProcessGroup::new(pid).signal(SIGINT).ok();
    }
}

/// Forward a keyboard stop to the whole foreground process group and record
/// the state change.
extern "C" fn on_sigtstp(_signal: SignalNumber) {
    let Some(table) = JobTable::get() else {
        return;
    };

    match table.foreground_pid() {
        Some(pid) => {
            ProcessGroup::new(pid).signal(SIGTSTP).ok();
            table.set_state(pid, JobState::Stopped);
        }
        None => {
            // a stop with nothing to stop means the table no longer matches
            // reality; there is no safe way to continue
            report(format_args!("stop signal received with no foreground job"));
            _exit(1);
        }
    }
}

/// A driver program terminates the shell by sending `SIGQUIT`.
extern "C" fn on_sigquit(_signal: SignalNumber) {
    report(format_args!("Terminating after receipt of SIGQUIT signal"));
    _exit(1);
}

const MESSAGE_CAP: usize = 128;

/// Fixed-size buffer notices are formatted into before being written with
/// `write(2)`. Overflowing text is truncated.
struct MessageBuf {
    bytes: [u8; MESSAGE_CAP],
    len: usize,
}

impl MessageBuf {
    fn new() -> Self {
        Self {
            bytes: [0; MESSAGE_CAP],
            len: 0,
        }
    }
}

impl fmt::Write for MessageBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = MESSAGE_CAP - self.len;
        let taken = s.len().min(room);
        self.bytes[self.len..self.len + taken].copy_from_slice(&s.as_bytes()[..taken]);
        self.len += taken;
        Ok(())
    }
}

/// Emit a one-line notice from signal handler context.
fn report(args: fmt::Arguments) {
    let mut buf = MessageBuf::new();
    let _ = fmt::Write::write_fmt(&mut buf, args);
    let _ = fmt::Write::write_str(&mut buf, "\n");

    // SAFETY: the pointer and length refer to initialized bytes of a live
    // buffer.
    unsafe { libc::write(libc::STDOUT_FILENO, buf.bytes.as_ptr().cast(), buf.len) };
}
