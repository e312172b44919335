//! The process launcher: forks single commands and multi-stage pipelines,
//! wires their descriptors, assigns process groups and registers the job.

use std::os::fd::OwnedFd;

use crate::common::Error;
use crate::log::dev_warn;
use crate::system::signal::{consts::*, SignalHandler, SignalHandlerBehavior, SignalSet};
use crate::system::wait::{wait, WaitOptions, WaitTarget};
use crate::system::{self, fork, setpgid, ForkResult, Pipe, ProcessGroup, ProcessId, _exit};

use super::jobs::{JobState, JobTable};
use super::parse;
use super::redirect;
use super::relay;

/// Start the job described by `argv`, registering it under `cmdline`.
///
/// For a foreground job this returns once the job has left the foreground;
/// for a background job it returns right after the announcement line.
pub(super) fn launch(table: &JobTable, mut argv: Vec<String>, cmdline: &str) -> Result<(), Error> {
    let background = argv.last().map(String::as_str) == Some("&");
    if background {
        argv.pop();
    }
    if argv.is_empty() {
        // a bare `&`
        return Ok(());
    }

    let stages = parse::split_stages(&argv);
    if stages.iter().any(|stage| stage.is_empty()) {
        return Err(Error::PipelineSyntax);
    }

    // The relay signals stay blocked from before the first fork until the
    // job is registered; otherwise a fast-exiting child could be reaped
    // before the table ever saw it.
    let original_set = relay::relay_signal_set()?.block()?;

    let spawned = spawn_stages(&stages, &original_set);

    let state = if background {
        JobState::Background
    } else {
        JobState::Foreground
    };

    let registered = spawned.and_then(|leader| {
        table.add(leader, state, cmdline).map_err(|err| {
            // The group is already running but nothing tracks it: take it
            // down and reap the leader while SIGCHLD is still blocked.
            ProcessGroup::new(leader).signal(SIGKILL).ok();
            wait(WaitTarget::Process(leader), WaitOptions::new()).ok();
            err
        })
    });

    if let Err(err) = original_set.set_mask() {
        dev_warn!("cannot restore signal mask: {err}");
    }

    let job = registered?;

    if background {
        println_ignore_io_error!("[{}] ({}) {}", job.jid, job.pid, job.cmdline);
    } else {
        relay::wait_foreground(table, job.pid)?;
    }

    Ok(())
}

/// Fork every stage, wiring adjacent stages together through anonymous
/// pipes, and return the pid of the first stage: the group leader, whose
/// pid tracks the whole job.
///
/// A fork or pipe failure aborts the remaining stages. Stages already
/// forked keep running untracked; dropping the pipe ends on the way out at
/// least hands them end-of-input.
fn spawn_stages(stages: &[Vec<String>], original_set: &SignalSet) -> Result<ProcessId, Error> {
    let wants_pipe = |index: usize| index + 1 < stages.len();

    let (leader, mut prev_read) = spawn_stage(&stages[0], original_set, None, None, wants_pipe(0))?;
    let group = ProcessGroup::new(leader);

    for (index, stage) in stages.iter().enumerate().skip(1) {
        let (_, read) = spawn_stage(
            stage,
            original_set,
            Some(&group),
            prev_read.take(),
            wants_pipe(index),
        )?;
        prev_read = read;
    }

    Ok(leader)
}

/// Fork one stage. Returns its pid and, if the stage feeds a pipe, the read
/// end the next stage will consume.
fn spawn_stage(
    argv: &[String],
    original_set: &SignalSet,
    group: Option<&ProcessGroup>,
    stdin_fd: Option<OwnedFd>,
    wants_pipe: bool,
) -> Result<(ProcessId, Option<OwnedFd>), Error> {
    let next_pipe = if wants_pipe {
        Some(system::pipe().map_err(Error::Pipe)?)
    } else {
        None
    };

    let ForkResult::Parent(pid) = fork().map_err(Error::Fork)? else {
        exec_stage(argv, original_set, group.map(|g| g.leader()), stdin_fd, next_pipe)
    };

    // Both sides set the group so it exists before either continues; the
    // loser of the race just repeats the winner's work. The leader may also
    // have exited already, in which case there is nothing left to place.
    match group {
        None => setpgid(pid, pid).ok(),
        Some(group) => group.adopt(pid).ok(),
    };

    // Close the ends this process no longer needs right away: a read end
    // kept open here would keep the downstream stage from ever seeing
    // end-of-input.
    drop(stdin_fd);
    let next_read = next_pipe.map(|Pipe { read, write }| {
        drop(write);
        read
    });

    Ok((pid, next_read))
}

/// Set up one child and replace its image. Never returns.
fn exec_stage(
    argv: &[String],
    original_set: &SignalSet,
    group_leader: Option<ProcessId>,
    stdin_fd: Option<OwnedFd>,
    stdout_pipe: Option<Pipe>,
) -> ! {
    // The launcher blocked the relay signals; the child wants the mask it
    // would have inherited without job control.
    original_set.set_mask().ok();

    // The first stage becomes the leader of a fresh group; later stages
    // join it. Background groups then never see the keyboard's
    // SIGINT/SIGTSTP, which are delivered to the shell's group.
    match group_leader {
        None => setpgid(ProcessId::new(0), ProcessId::new(0)).ok(),
        Some(leader) => setpgid(ProcessId::new(0), leader).ok(),
    };

    // The child reacts to keyboard signals itself from now on.
    for signal in [SIGINT, SIGTSTP] {
        if let Ok(handler) = SignalHandler::register(signal, SignalHandlerBehavior::Default) {
            handler.forget();
        }
    }

    if let Some(fd) = stdin_fd {
        if system::dup2_stdin(&fd).is_err() {
            _exit(1);
        }
        drop(fd);
    }

    if let Some(pipe) = stdout_pipe {
        if system::dup2_stdout(&pipe.write).is_err() {
            _exit(1);
        }
        // also drops this stage's copy of the read end
        drop(pipe);
    }

    let argv = match redirect::apply(argv.to_vec()) {
        Ok(argv) => argv,
        Err(err) => {
            println_ignore_io_error!("{err}");
            _exit(1);
        }
    };

    if argv.is_empty() {
        // redirections alone leave nothing to run
        _exit(1);
    }

    let err = system::execvp(&argv);
    dev_warn!("failed to execute {}: {err}", argv[0]);
    println_ignore_io_error!("{}: Command not found", argv[0]);
    _exit(1);
}
