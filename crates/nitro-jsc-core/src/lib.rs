//! Safe wrappers for JavaScriptCore.
//!
//! This crate provides memory-safe, RAII-based wrappers around the raw
//! function table in `nitro-jsc-sys`: contexts with retain/release
//! accounting, strings released exactly once, values protected from the
//! garbage collector for as long as a handle exists, and host closures
//! callable from JavaScript.
//!
//! # Example
//!
//! ```no_run
//! use nitro_jsc_core::{JscContext, Value};
//!
//! let ctx = JscContext::new().unwrap();
//! let result = ctx.eval("1 + 1").unwrap();
//! assert_eq!(result.to_number().unwrap(), 2.0);
//!
//! ctx.register_function("twice", |_ctx, _callee, _this, args| {
//!     let n = args.first().unwrap_or(&Value::Undefined).expect_number()?;
//!     Ok(Value::Number(n * 2.0))
//! })
//! .unwrap();
//! assert_eq!(ctx.eval("twice(21)").unwrap().to_host().unwrap(), Value::Number(42.0));
//! ```
//!
//! # Thread Safety
//!
//! All types in this crate are `!Send` and `!Sync` because JavaScriptCore
//! contexts and values are not thread-safe. Attempting to use them from
//! multiple threads causes undefined behavior.
//!
//! ```compile_fail
//! use nitro_jsc_core::JscContext;
//! use std::thread;
//!
//! let ctx = JscContext::new().unwrap();
//! thread::spawn(move || {
//!     ctx.eval("1 + 1"); // Error: JscContext is !Send
//! });
//! ```
//!
//! ```compile_fail
//! use nitro_jsc_core::JscContext;
//! use std::thread;
//!
//! let ctx = JscContext::new().unwrap();
//! let value = ctx.eval("42").unwrap();
//! thread::spawn(move || {
//!     let _ = value.to_number(); // Error: JscValue is !Send
//! });
//! ```
//!
//! ```compile_fail
//! use nitro_jsc_core::JscString;
//! use std::thread;
//!
//! let s = JscString::new("hello").unwrap();
//! thread::spawn(move || {
//!     let _ = s.to_string(); // Error: JscString is !Send
//! });
//! ```
//!
//! ```compile_fail
//! use nitro_jsc_core::JscContext;
//! use std::sync::Arc;
//!
//! let ctx = Arc::new(JscContext::new().unwrap());
//! std::thread::spawn(move || {
//!     let _ctx = ctx; // Error: JscContext is !Sync
//! });
//! ```

mod callback;
mod context;
mod error;
mod marshal;
mod object;
pub mod string;
mod value;

#[cfg(test)]
mod testing;

pub use callback::{HostConstructor, HostFunction};
pub use context::JscContext;
pub use error::{JsException, JscError, JscResult};
pub use marshal::{UNDEFINED, Value};
pub use object::{JscObject, PropertyAttributes};
pub use string::{JscString, js_string_to_rust};
pub use value::{JsType, JscValue};

// Re-export the raw bindings and loader configuration
pub use nitro_jsc_sys;
pub use nitro_jsc_sys::{LibraryConfig, LoadError};
