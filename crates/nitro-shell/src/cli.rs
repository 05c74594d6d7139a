//! Command-line parsing
//!
//! `-e` and `-f` may be mixed and repeated; they run in the order they were
//! given, followed by the positional script. Everything after the script
//! name belongs to the script and ends up in `arguments`.

use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// File name that requests the interactive prompt
pub const STDIN_MARKER: &str = "-";

#[derive(Debug, Parser)]
#[command(
    name = "nitro",
    version,
    about = "Run JavaScript on the system JavaScriptCore",
    long_about = "Run JavaScript on the system JavaScriptCore.\n\n\
                  Run a script:     nitro script.js [args...]\n\
                  Eval code:        nitro -e 'print(1 + 1)'\n\
                  Interactive:      nitro   (or: nitro -f -)"
)]
pub struct Cli {
    /// Evaluate SOURCE (repeatable)
    #[arg(short = 'e', value_name = "SOURCE", action = ArgAction::Append, allow_hyphen_values = true)]
    pub eval: Vec<String>,

    /// Run FILE, or `-` for the interactive prompt (repeatable)
    #[arg(short = 'f', value_name = "FILE", action = ArgAction::Append, allow_hyphen_values = true)]
    pub file: Vec<String>,

    /// Script to run, followed by the arguments passed to it
    #[arg(value_name = "SCRIPT", trailing_var_arg = true, num_args = 1..)]
    pub script: Vec<String>,
}

/// One unit of queued work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Source text from `-e`
    Inline(String),
    /// A script file from `-f` or the positional argument
    File(PathBuf),
}

/// What the shell has been asked to do
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    /// Scripts in run order
    pub queue: Vec<Source>,
    /// Positional arguments, script name first
    pub arguments: Vec<String>,
    /// Whether to start the prompt after the queue
    pub interactive: bool,
}

impl Invocation {
    /// Parse `args` (program name included)
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Cli::command().try_get_matches_from(args)?;
        let cli = Cli::from_arg_matches(&matches)?;
        Ok(Self::from_matches(cli, &matches))
    }

    fn from_matches(cli: Cli, matches: &ArgMatches) -> Self {
        let mut ordered: Vec<(usize, Option<Source>)> = Vec::new();
        let mut interactive = false;

        let eval_indices = matches.indices_of("eval").into_iter().flatten();
        for (index, source) in eval_indices.zip(cli.eval) {
            ordered.push((index, Some(Source::Inline(source))));
        }

        let file_indices = matches.indices_of("file").into_iter().flatten();
        for (index, file) in file_indices.zip(cli.file) {
            if file == STDIN_MARKER {
                interactive = true;
                ordered.push((index, None));
            } else {
                ordered.push((index, Some(Source::File(PathBuf::from(file)))));
            }
        }

        ordered.sort_by_key(|(index, _)| *index);
        let mut queue: Vec<Source> = ordered.into_iter().filter_map(|(_, s)| s).collect();

        if let Some(script) = cli.script.first() {
            queue.push(Source::File(PathBuf::from(script)));
        }
        if queue.is_empty() {
            interactive = true;
        }

        Self {
            queue,
            arguments: cli.script,
            interactive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Invocation {
        let argv = std::iter::once("nitro").chain(args.iter().copied());
        Invocation::from_args(argv).unwrap()
    }

    #[test]
    fn test_no_arguments_is_interactive() {
        let invocation = parse(&[]);
        assert!(invocation.queue.is_empty());
        assert!(invocation.arguments.is_empty());
        assert!(invocation.interactive);
    }

    #[test]
    fn test_eval_only_is_not_interactive() {
        let invocation = parse(&["-e", "print('Hello')", "-e", "print('World')"]);
        assert_eq!(
            invocation.queue,
            vec![
                Source::Inline("print('Hello')".into()),
                Source::Inline("print('World')".into()),
            ]
        );
        assert!(!invocation.interactive);
    }

    #[test]
    fn test_mixed_flags_keep_command_line_order() {
        let invocation = parse(&["-f", "a.js", "-e", "1", "-f", "b.js", "-e", "2"]);
        assert_eq!(
            invocation.queue,
            vec![
                Source::File("a.js".into()),
                Source::Inline("1".into()),
                Source::File("b.js".into()),
                Source::Inline("2".into()),
            ]
        );
    }

    #[test]
    fn test_script_runs_last_and_collects_arguments() {
        let invocation = parse(&["-e", "var x = 1", "main.js", "one", "-e", "--two"]);
        assert_eq!(
            invocation.queue,
            vec![
                Source::Inline("var x = 1".into()),
                Source::File("main.js".into()),
            ]
        );
        assert_eq!(invocation.arguments, vec!["main.js", "one", "-e", "--two"]);
        assert!(!invocation.interactive);
    }

    #[test]
    fn test_stdin_marker_requests_prompt() {
        let invocation = parse(&["-e", "var ready = true", "-f", "-"]);
        assert_eq!(invocation.queue, vec![Source::Inline("var ready = true".into())]);
        assert!(invocation.interactive);
    }

    #[test]
    fn test_eval_source_may_start_with_dash() {
        let invocation = parse(&["-e", "-1"]);
        assert_eq!(invocation.queue, vec![Source::Inline("-1".into())]);
    }

    #[test]
    fn test_missing_flag_value_is_an_error() {
        assert!(Invocation::from_args(["nitro", "-e"]).is_err());
    }
}
