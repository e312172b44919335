//! Utilities to handle signals.
use libc::c_int;

mod handler;
mod set;

pub(crate) use handler::{SignalHandler, SignalHandlerBehavior};
pub(crate) use set::SignalSet;

pub(crate) type SignalNumber = c_int;

macro_rules! define_consts {
    ($($signal:ident,)*) => {
        pub(crate) mod consts {
            pub(crate) use libc::{$($signal,)*};
        }

        pub(crate) fn signal_name(signal: SignalNumber) -> &'static str {
            match signal {
                $(consts::$signal => stringify!($signal),)*
                _ => "unknown signal",
            }
        }
    };
}

define_consts! {
    SIGINT,
    SIGQUIT,
    SIGTSTP,
    SIGCONT,
    SIGCHLD,
    SIGKILL,
    SIGSTOP,
}
