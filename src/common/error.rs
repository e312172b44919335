use std::fmt;

#[derive(Debug)]
pub(crate) enum Error {
    /// `bg`/`fg` was invoked without a target argument.
    MissingTarget { builtin: &'static str },
    /// The `bg`/`fg` target was neither a pid nor a `%jid`.
    InvalidTarget { builtin: &'static str },
    NoSuchJob(u32),
    NoSuchProcess(libc::pid_t),
    /// The job table has no free slot left.
    JobTableFull,
    /// A pipeline with a missing command, e.g. `ls | | wc`.
    PipelineSyntax,
    Fork(std::io::Error),
    Pipe(std::io::Error),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingTarget { builtin } => {
                write!(f, "{builtin} command requires PID or %jid argument")
            }
            Error::InvalidTarget { builtin } => {
                write!(f, "{builtin}: argument must be a PID or %jid")
            }
            Error::NoSuchJob(jid) => write!(f, "%{jid}: No such job"),
            Error::NoSuchProcess(pid) => write!(f, "({pid}): No such process"),
            Error::JobTableFull => f.write_str("Tried to create too many jobs"),
            Error::PipelineSyntax => f.write_str("syntax error: missing command in pipeline"),
            Error::Fork(e) => write!(f, "cannot fork: {e}"),
            Error::Pipe(e) => write!(f, "cannot create pipe: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
