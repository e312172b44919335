use self::simple_logger::SimpleLogger;
use std::ops::Deref;

mod simple_logger;

macro_rules! logger_macro {
    ($name:ident is $rule_level:ident to $target:expr, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => (::log::log!(target: $target, ::log::Level::$rule_level, $d($d arg)+));
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident to $target:expr) => {
        logger_macro!($name is $rule_level to $target, $);
    };
}

logger_macro!(user_error is Error to "jsh::user");

macro_rules! dev_logger_macro {
    ($name:ident is $rule_level:ident to $target:expr, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => {
                (::log::log!(
                    target: $target,
                    ::log::Level::$rule_level,
                    "{}: {}",
                    std::panic::Location::caller(),
                    format_args!($d($d arg)+)
                ))
            };
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident to $target:expr) => {
        dev_logger_macro!($name is $rule_level to $target, $);
    };
}

dev_logger_macro!(dev_warn is Warn to "jsh::dev");
dev_logger_macro!(dev_info is Info to "jsh::dev");

/// Stack of per-target loggers.
///
/// User-facing messages go to `jsh::user`; diagnostics go to `jsh::dev`,
/// which only has a sink when running verbose (or, with the `dev` feature,
/// a log file).
#[derive(Default)]
pub struct ShellLogger(Vec<(String, Box<dyn log::Log>)>);

impl ShellLogger {
    pub fn new(prefix: &'static str, verbose: bool) -> Self {
        let mut logger: Self = Default::default();

        logger.add_logger("jsh::user", SimpleLogger::to_stderr(prefix));

        if verbose {
            logger.add_logger("jsh::dev", SimpleLogger::to_stderr("jsh: "));
        }

        #[cfg(feature = "dev")]
        {
            let path = std::env::temp_dir().join(format!("jsh-dev-{}.log", std::process::id()));
            if let Ok(file_logger) = SimpleLogger::to_file(path, "") {
                logger.add_logger("jsh::dev", file_logger);
            }
        }

        logger
    }

    pub fn into_global_logger(self) {
        log::set_boxed_logger(Box::new(self))
            .map(|()| log::set_max_level(log::LevelFilter::Trace))
            .expect("Could not set previously set logger");
    }

    /// Add a logger for a specific prefix to the stack
    fn add_logger(
        &mut self,
        prefix: impl ToString + Deref<Target = str>,
        logger: impl log::Log + 'static,
    ) {
        let prefix = if prefix.ends_with("::") {
            prefix.to_string()
        } else {
            // given a prefix `my::prefix`, we want to match `my::prefix::somewhere`
            // but not `my::prefix_to_somewhere`
            format!("{}::", prefix.to_string())
        };
        self.0.push((prefix, Box::new(logger)))
    }
}

impl log::Log for ShellLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level() && metadata.level() <= log::STATIC_MAX_LEVEL
    }

    fn log(&self, record: &log::Record) {
        for (prefix, l) in self.0.iter() {
            if record.target() == &prefix[..prefix.len() - 2] || record.target().starts_with(prefix)
            {
                l.log(record);
            }
        }
    }

    fn flush(&self) {
        for (_, l) in self.0.iter() {
            l.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ShellLogger;

    #[test]
    fn can_construct_logger() {
        let logger = ShellLogger::new("jsh: ", false);
        let len = if cfg!(feature = "dev") { 2 } else { 1 };
        assert_eq!(logger.0.len(), len);

        let logger = ShellLogger::new("jsh: ", true);
        let len = if cfg!(feature = "dev") { 3 } else { 2 };
        assert_eq!(logger.0.len(), len);
    }
}
