//! The interactive read/eval loop.

use std::io::{self, BufRead, Write};

use crate::common::Error;
use crate::log::{user_error, ShellLogger};
use crate::system;

mod builtins;
mod jobs;
mod launch;
mod parse;
mod redirect;
mod relay;

use jobs::JobTable;
use relay::SignalRelay;

const PROMPT: &str = "jsh> ";

#[derive(Default)]
struct Options {
    verbose: bool,
    no_prompt: bool,
}

impl Options {
    fn from_env() -> Self {
        let mut options = Self::default();

        for arg in std::env::args().skip(1) {
            let Some(flags) = arg.strip_prefix('-') else {
                usage();
            };
            for flag in flags.chars() {
                match flag {
                    'v' => options.verbose = true,
                    'p' => options.no_prompt = true,
                    _ => usage(),
                }
            }
        }

        options
    }
}

fn usage() -> ! {
    println_ignore_io_error!("Usage: jsh [-hvp]");
    println_ignore_io_error!("   -h   print this message");
    println_ignore_io_error!("   -v   print additional diagnostic information");
    println_ignore_io_error!("   -p   do not emit a command prompt");
    std::process::exit(1)
}

pub fn main() {
    let options = Options::from_env();

    ShellLogger::new("", options.verbose).into_global_logger();

    match run(options) {
        Ok(()) => {}
        Err(error) => {
            eprintln_ignore_io_error!("jsh: {error}");
            std::process::exit(1);
        }
    }
}

fn run(options: Options) -> Result<(), Error> {
    // A driver program reads everything, errors included, from the stdout
    // pipe.
    system::redirect_stderr_to_stdout()?;

    let table = JobTable::init()?;
    let _relay = SignalRelay::register()?;

    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        if !options.no_prompt {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(PROMPT.as_bytes());
            let _ = stdout.flush();
        }

        line.clear();
        match stdin.lock().read_line(&mut line) {
            // end of file (ctrl-d)
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }

        // every error is handled here; the loop always comes back to the
        // prompt
        if let Err(error) = eval(table, &line) {
            user_error!("{error}");
        }
    }
}

fn eval(table: &JobTable, line: &str) -> Result<(), Error> {
    let argv = parse::parse(line);

    let Some(command) = argv.first() else {
        return Ok(());
    };

    if let Some(builtin) = builtins::recognize(command) {
        return builtins::run(builtin, &argv, table);
    }

    launch::launch(table, argv, line.trim_end())
}
