//! A JavaScript context with the shell globals installed
//!
//! The shell adds three globals on top of the standard ones: `print`,
//! `arguments` and `environment`. Output goes through shared sinks so tests
//! can capture it.

use anyhow::{Context as _, Result, anyhow};
use nitro_jsc_core::{JsException, JscContext, JscError, JscValue, PropertyAttributes, Value};
use std::cell::RefCell;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

use crate::cli::Source;

/// A shared output sink
pub type Sink = Rc<RefCell<dyn Write>>;

/// Source URL used for `-e` scripts
pub const INLINE_SOURCE_URL: &str = "<command line>";

/// Properties already shown on the first line of an exception report
const REPORTED_PROPERTIES: [&str; 4] = ["name", "message", "sourceURL", "line"];

/// Stand-in for a property value that cannot be converted to a string
pub const UNPRINTABLE: &str = "<unprintable>";

/// Convert an engine error into an `anyhow` error
///
/// Engine errors hold context handles and cannot cross threads, so only the
/// message is kept.
pub fn engine_error(err: JscError) -> anyhow::Error {
    anyhow!("{err}")
}

/// Outcome of running one script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The script threw; the exception has been reported
    Threw,
}

pub struct Shell {
    ctx: JscContext,
    out: Sink,
    err: Sink,
}

impl Shell {
    /// Create a shell writing to the process's stdout and stderr
    pub fn new(arguments: &[String]) -> Result<Self> {
        let out: Sink = Rc::new(RefCell::new(io::stdout()));
        let err: Sink = Rc::new(RefCell::new(io::stderr()));
        let environment = env::vars_os().map(|(key, value)| {
            (key.to_string_lossy().into_owned(), value.to_string_lossy().into_owned())
        });
        Self::with_sinks(arguments, environment, out, err)
    }

    /// Create a shell with explicit environment and output sinks
    pub fn with_sinks(
        arguments: &[String],
        environment: impl IntoIterator<Item = (String, String)>,
        out: Sink,
        err: Sink,
    ) -> Result<Self> {
        let ctx = JscContext::new().map_err(engine_error)?;
        let shell = Self { ctx, out, err };
        shell.install_globals(arguments, environment).map_err(engine_error)?;
        Ok(shell)
    }

    pub fn context(&self) -> &JscContext {
        &self.ctx
    }

    fn install_globals(
        &self,
        arguments: &[String],
        environment: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), JscError> {
        let out = Rc::clone(&self.out);
        self.ctx.register_function("print", move |ctx, _callee, _this, args| {
            let mut line = String::new();
            for arg in args {
                line.push_str(&display_string(ctx, arg)?);
            }
            writeln!(out.borrow_mut(), "{line}").map_err(|e| JscError::internal(e.to_string()))?;
            Ok(Value::Undefined)
        })?;

        let values = arguments
            .iter()
            .map(|arg| self.ctx.string(arg))
            .collect::<Result<Vec<JscValue>, _>>()?;
        let array = self.ctx.array(&values)?;
        self.ctx.set_global("arguments", &array.to_value())?;

        let env_object = self.ctx.object()?;
        for (key, value) in environment {
            env_object.set_property(&key, &self.ctx.string(&value)?, PropertyAttributes::NONE)?;
        }
        self.ctx.set_global("environment", &env_object.to_value())?;
        Ok(())
    }

    /// Run one queued script
    pub fn run_source(&self, source: &Source) -> Result<Outcome> {
        match source {
            Source::Inline(script) => self.eval(script, INLINE_SOURCE_URL, 1),
            Source::File(path) => self.run_file(path),
        }
    }

    /// Run a script file with its path as the source URL
    pub fn run_file(&self, path: &Path) -> Result<Outcome> {
        let script = fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        self.eval(&script, &path.display().to_string(), 1)
    }

    /// Run the queue in order, stopping at the first uncaught exception
    pub fn run_queue(&self, queue: &[Source]) -> Result<Outcome> {
        for source in queue {
            debug!(?source, "running script");
            if self.run_source(source)? == Outcome::Threw {
                return Ok(Outcome::Threw);
            }
        }
        Ok(Outcome::Completed)
    }

    /// Evaluate `script`, reporting an uncaught exception to the error sink
    pub fn eval(&self, script: &str, source_url: &str, line: i32) -> Result<Outcome> {
        self.eval_value(script, source_url, line)
            .map(|value| match value {
                Some(_) => Outcome::Completed,
                None => Outcome::Threw,
            })
    }

    /// Evaluate `script` and return its result, or `None` if it threw
    pub(crate) fn eval_value(
        &self,
        script: &str,
        source_url: &str,
        line: i32,
    ) -> Result<Option<JscValue>> {
        match self.ctx.evaluate_script(script, None, Some(source_url), line) {
            Ok(value) => Ok(Some(value)),
            Err(JscError::Exception(exception)) => {
                self.report_exception(&exception)?;
                Ok(None)
            }
            Err(err) => Err(engine_error(err)),
        }
    }

    /// Write a result to the output sink the way `print` would
    ///
    /// A value whose string conversion throws is reported like any other
    /// uncaught exception.
    pub(crate) fn print_value(&self, value: &JscValue) -> Result<Outcome> {
        let text = match value.to_string() {
            Ok(text) => text,
            Err(JscError::Exception(exception)) => {
                self.report_exception(&exception)?;
                return Ok(Outcome::Threw);
            }
            Err(err) => return Err(engine_error(err)),
        };
        writeln!(self.out.borrow_mut(), "{text}")?;
        Ok(Outcome::Completed)
    }

    /// Write an exception report to the error sink
    pub fn report_exception(&self, exception: &JsException) -> Result<()> {
        let report = format_exception(exception);
        let mut err = self.err.borrow_mut();
        err.write_all(report.as_bytes())?;
        err.flush()?;
        Ok(())
    }
}

/// The JS string conversion of a host value
fn display_string(ctx: &JscContext, value: &Value) -> Result<String, JscError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => other.to_js(ctx)?.to_string(),
    }
}

/// Format an exception as
/// `Exception thrown: <name>: <message>: at <sourceURL>[<line>]`, followed by
/// one indented line per remaining enumerable property
pub fn format_exception(exception: &JsException) -> String {
    let source_url = exception.source_url.as_deref().unwrap_or("???");
    let line = exception.line.map_or(-1, i64::from);
    let mut report = format!(
        "Exception thrown: {}: {}: at {}[{}]\n",
        exception.name, exception.message, source_url, line
    );
    for (name, value) in extra_properties(exception.value()) {
        report.push_str(&format!("   {name}: {value}\n"));
    }
    report
}

/// Enumerable properties of a thrown object that the header line leaves out
///
/// Values whose string conversion throws show as [`UNPRINTABLE`].
fn extra_properties(thrown: &JscValue) -> Vec<(String, String)> {
    if !thrown.is_object() {
        return Vec::new();
    }
    let Ok(object) = thrown.to_object() else {
        return Vec::new();
    };
    let names = match object.property_names() {
        Ok(names) => names,
        Err(err) => {
            debug!(%err, "cannot enumerate exception properties");
            return Vec::new();
        }
    };
    names
        .into_iter()
        .filter(|name| !REPORTED_PROPERTIES.contains(&name.as_str()))
        .map(|name| {
            let value = object
                .get_property(&name)
                .and_then(|value| value.to_string())
                .unwrap_or_else(|_| UNPRINTABLE.to_string());
            (name, value)
        })
        .collect()
}
