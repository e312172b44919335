//! The built-in commands: `quit`, `jobs`, `bg` and `fg`.

use crate::common::Error;
use crate::system::ProcessId;

use super::jobs::{Job, JobId, JobState, JobTable};
use super::relay;

pub(super) enum Builtin {
    Quit,
    Jobs,
    Bg,
    Fg,
}

pub(super) fn recognize(name: &str) -> Option<Builtin> {
    match name {
        "quit" => Some(Builtin::Quit),
        "jobs" => Some(Builtin::Jobs),
        "bg" => Some(Builtin::Bg),
        "fg" => Some(Builtin::Fg),
        _ => None,
    }
}

pub(super) fn run(builtin: Builtin, argv: &[String], table: &JobTable) -> Result<(), Error> {
    match builtin {
        Builtin::Quit => std::process::exit(0),
        Builtin::Jobs => {
            for job in table.snapshot().iter() {
                println_ignore_io_error!("{}", listing_line(job));
            }
            Ok(())
        }
        Builtin::Bg => resume_background(argv, table),
        Builtin::Fg => resume_foreground(argv, table),
    }
}

fn listing_line(job: &Job) -> String {
    format!("[{}] ({}) {} {}", job.jid, job.pid, job.state, job.cmdline)
}

/// Resolve a `bg`/`fg` target, either `%<jid>` or a bare pid.
fn resolve_target(builtin: &'static str, argv: &[String], table: &JobTable) -> Result<Job, Error> {
    let target = argv.get(1).ok_or(Error::MissingTarget { builtin })?;

    if let Some(digits) = target.strip_prefix('%') {
        let jid = digits
            .parse::<u32>()
            .ok()
            .filter(|&jid| jid != 0)
            .ok_or(Error::InvalidTarget { builtin })?;

        table
            .job_with_jid(JobId::new(jid))
            .ok_or(Error::NoSuchJob(jid))
    } else {
        let pid = target
            .parse::<ProcessId>()
            .ok()
            .filter(|pid| pid.get() > 0)
            .ok_or(Error::InvalidTarget { builtin })?;

        table
            .job_with_pid(pid)
            .ok_or(Error::NoSuchProcess(pid.get()))
    }
}

fn resume_background(argv: &[String], table: &JobTable) -> Result<(), Error> {
    let job = resolve_target("bg", argv, table)?;

    match job.state {
        JobState::Stopped => {
            job.process_group().cont()?;
            table.set_state(job.pid, JobState::Background);
            println_ignore_io_error!("[{}] ({}) {}", job.jid, job.pid, job.cmdline);
        }
        // already running
        JobState::Background | JobState::Foreground => {}
    }

    Ok(())
}

fn resume_foreground(argv: &[String], table: &JobTable) -> Result<(), Error> {
    let job = resolve_target("fg", argv, table)?;

    match job.state {
        JobState::Stopped | JobState::Background => {
            // a running group ignores the continue, so it is sent either way
            job.process_group().cont()?;
            table.set_state(job.pid, JobState::Foreground);
            relay::wait_foreground(table, job.pid)?;
        }
        JobState::Foreground => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{listing_line, recognize, resolve_target, Builtin};
    use crate::common::Error;
    use crate::shell::jobs::{JobState, JobTable};
    use crate::system::ProcessId;

    #[test]
    fn recognizes_builtins() {
        assert!(matches!(recognize("quit"), Some(Builtin::Quit)));
        assert!(matches!(recognize("jobs"), Some(Builtin::Jobs)));
        assert!(matches!(recognize("bg"), Some(Builtin::Bg)));
        assert!(matches!(recognize("fg"), Some(Builtin::Fg)));
        assert!(recognize("ls").is_none());
        assert!(recognize("").is_none());
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_targets() {
        let table = JobTable::new().unwrap();
        let job = table
            .add(ProcessId::new(4321), JobState::Stopped, "sleep 5")
            .unwrap();

        let by_jid = resolve_target("bg", &args(&["bg", "%1"]), &table).unwrap();
        assert_eq!(by_jid.pid, job.pid);

        let by_pid = resolve_target("bg", &args(&["bg", "4321"]), &table).unwrap();
        assert_eq!(by_pid.jid, job.jid);
    }

    #[test]
    fn reports_target_errors() {
        let table = JobTable::new().unwrap();

        assert!(matches!(
            resolve_target("bg", &args(&["bg"]), &table),
            Err(Error::MissingTarget { builtin: "bg" })
        ));
        assert!(matches!(
            resolve_target("fg", &args(&["fg", "abc"]), &table),
            Err(Error::InvalidTarget { builtin: "fg" })
        ));
        assert!(matches!(
            resolve_target("fg", &args(&["fg", "%x"]), &table),
            Err(Error::InvalidTarget { builtin: "fg" })
        ));
        assert!(matches!(
            resolve_target("bg", &args(&["bg", "%0"]), &table),
            Err(Error::InvalidTarget { builtin: "bg" })
        ));
        assert!(matches!(
            resolve_target("bg", &args(&["bg", "%2"]), &table),
            Err(Error::NoSuchJob(2))
        ));
        assert!(matches!(
            resolve_target("fg", &args(&["fg", "999"]), &table),
            Err(Error::NoSuchProcess(999))
        ));
    }

    #[test]
    fn renders_job_listings() {
        let table = JobTable::new().unwrap();
        table
            .add(ProcessId::new(77), JobState::Background, "sleep 5 &")
            .unwrap();
        table
            .add(ProcessId::new(88), JobState::Stopped, "cat")
            .unwrap();

        let snapshot = table.snapshot();
        let lines: Vec<String> = snapshot.iter().map(listing_line).collect();
        assert_eq!(
            lines,
            vec!["[1] (77) Running sleep 5 &", "[2] (88) Stopped cat"]
        );
    }
}
