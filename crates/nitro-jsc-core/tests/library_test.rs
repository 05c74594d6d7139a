//! Library configuration as seen through the safe layer
//!
//! These tests change process-wide loader state, so they live in their own
//! test binary and run serially.

use nitro_jsc_core::nitro_jsc_sys::{self, library_config, set_library_config, set_library_name};
use nitro_jsc_core::{JscContext, JscError, LibraryConfig, LoadError};
use serial_test::serial;

#[test]
#[serial]
fn test_unknown_library_surfaces_load_error() {
    if nitro_jsc_sys::is_loaded() {
        return;
    }
    let saved = library_config();
    set_library_name("nitro-no-such-engine");

    let err = JscContext::new().unwrap_err();
    assert!(matches!(err, JscError::Library(LoadError::NotFound { .. })));
    assert_eq!(err.error_type(), "LibraryError");
    assert!(!nitro_jsc_sys::is_loaded());

    set_library_config(saved);
}

#[test]
#[serial]
fn test_default_config_loads_when_available() {
    let config = library_config();
    let Ok(ctx) = JscContext::new() else {
        return;
    };
    assert!(nitro_jsc_sys::is_loaded());
    assert_eq!(ctx.eval("6 * 7").unwrap().to_number().unwrap(), 42.0);

    // Changes after the first load are accepted but have no effect
    set_library_config(LibraryConfig::with_name("something-else"));
    assert!(JscContext::new().is_ok());
    set_library_config(config);
}
