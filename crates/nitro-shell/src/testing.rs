//! Engine availability for unit tests

/// Set to make engine tests fail instead of skipping when the library is missing
const REQUIRE_ENGINE_VAR: &str = "NITRO_REQUIRE_JSC";

/// Whether a context can be created; panics when it cannot and
/// `NITRO_REQUIRE_JSC` is set
pub(crate) fn engine_available() -> bool {
    match nitro_jsc_core::JscContext::new() {
        Ok(_) => true,
        Err(err) if std::env::var_os(REQUIRE_ENGINE_VAR).is_some() => {
            panic!("{REQUIRE_ENGINE_VAR} is set but JavaScriptCore is unavailable: {err}")
        }
        Err(err) => {
            eprintln!("skipping: JavaScriptCore not available: {err}");
            false
        }
    }
}
