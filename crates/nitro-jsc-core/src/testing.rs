//! Engine access for unit tests

use crate::JscContext;

/// Set to make engine tests fail instead of skipping when the library is missing
pub(crate) const REQUIRE_ENGINE_VAR: &str = "NITRO_REQUIRE_JSC";

/// A fresh context, or `None` (with a note on stderr) when the library
/// cannot be loaded and `NITRO_REQUIRE_JSC` is unset
pub(crate) fn test_context() -> Option<JscContext> {
    match JscContext::new() {
        Ok(ctx) => Some(ctx),
        Err(err) if std::env::var_os(REQUIRE_ENGINE_VAR).is_some() => {
            panic!("{REQUIRE_ENGINE_VAR} is set but JavaScriptCore is unavailable: {err}")
        }
        Err(err) => {
            eprintln!("skipping: JavaScriptCore not available: {err}");
            None
        }
    }
}
