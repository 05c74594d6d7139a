//! Interactive prompt
//!
//! Each line is evaluated on its own as `<stdin>`, numbered from 1, in the
//! same context as the queued scripts.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::shell::Shell;

pub const PROMPT: &str = "nitro> ";

/// Source URL of lines typed at the prompt
pub const STDIN_SOURCE_URL: &str = "<stdin>";

const HELP: &str = "\
.help    Show this help
.exit    Leave the shell (or press Ctrl-D)
Anything else is evaluated as JavaScript; results other than undefined are printed.
";

/// Read-eval-print until `.exit` or end of input
///
/// The prompt is written to `prompt`; results and `print` output go to the
/// shell's own sinks.
pub fn run<R: BufRead, W: Write>(shell: &Shell, input: R, mut prompt: W) -> Result<()> {
    let mut lines = input.lines();
    let mut line_number: i32 = 0;

    loop {
        write!(prompt, "{PROMPT}")?;
        prompt.flush()?;

        let Some(line) = lines.next() else {
            writeln!(prompt)?;
            break;
        };
        let line = line?;
        line_number += 1;

        match line.trim() {
            "" => continue,
            ".exit" => break,
            ".help" => {
                write!(prompt, "{HELP}")?;
                continue;
            }
            _ => {}
        }

        if let Some(value) = shell.eval_value(&line, STDIN_SOURCE_URL, line_number)?
            && !value.is_undefined()
        {
            shell.print_value(&value)?;
        }
    }
    Ok(())
}
