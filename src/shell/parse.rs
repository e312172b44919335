//! Command line tokenization.

/// Split a command line into arguments.
///
/// Arguments are separated by whitespace. A run enclosed in a single pair of
/// quote characters is one argument even if it contains whitespace; an
/// unterminated quote swallows the rest of the line. A trailing `&` argument
/// is the background marker, which the launcher consumes.
pub(super) fn parse(line: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let Some(first) = chars.next() else {
            break;
        };

        let mut arg = String::new();
        if first == '\'' {
            for c in chars.by_ref() {
                if c == '\'' {
                    break;
                }
                arg.push(c);
            }
        } else {
            arg.push(first);
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                arg.push(c);
            }
        }

        argv.push(arg);
    }

    argv
}

/// Split an argument list into pipeline stages on the `|` separator.
///
/// A lone command produces a single stage. Separators at the edges or next
/// to each other produce empty stages, which the launcher rejects.
pub(super) fn split_stages(argv: &[String]) -> Vec<Vec<String>> {
    let mut stages = Vec::new();
    let mut current = Vec::new();

    for arg in argv {
        if arg == "|" {
            stages.push(std::mem::take(&mut current));
        } else {
            current.push(arg.clone());
        }
    }
    stages.push(current);

    stages
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{parse, split_stages};

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(parse("ls -l /tmp\n"), owned(&["ls", "-l", "/tmp"]));
        assert_eq!(parse("   sleep   5   "), owned(&["sleep", "5"]));
        assert_eq!(parse(""), Vec::<String>::new());
        assert_eq!(parse("  \n"), Vec::<String>::new());
    }

    #[test]
    fn quoted_runs_are_one_argument() {
        assert_eq!(
            parse("echo 'hello   world' done"),
            owned(&["echo", "hello   world", "done"])
        );
        // an unterminated quote swallows the rest of the line
        assert_eq!(parse("echo 'a b c"), owned(&["echo", "a b c"]));
        assert_eq!(parse("echo ''"), owned(&["echo", ""]));
    }

    #[test]
    fn background_marker_is_a_token() {
        assert_eq!(parse("sleep 5 &\n"), owned(&["sleep", "5", "&"]));
    }

    #[test]
    fn stage_splitting() {
        assert_eq!(
            split_stages(&owned(&["ls", "-l"])),
            vec![owned(&["ls", "-l"])]
        );
        assert_eq!(
            split_stages(&owned(&["ls", "|", "grep", "x", "|", "wc", "-l"])),
            vec![owned(&["ls"]), owned(&["grep", "x"]), owned(&["wc", "-l"])]
        );
        // empty stages are preserved so the caller can reject them
        assert_eq!(
            split_stages(&owned(&["ls", "|"])),
            vec![owned(&["ls"]), vec![]]
        );
        assert_eq!(
            split_stages(&owned(&["|", "wc"])),
            vec![vec![], owned(&["wc"])]
        );
    }
}
