//! JSC context wrapper with retain/release accounting and script evaluation

use nitro_jsc_sys::*;
use serde::Serialize;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;
use std::rc::Rc;
use tracing::debug;

use crate::callback::{CallbackRegistry, HostClasses};
use crate::error::{JscError, JscResult};
use crate::marshal::Value;
use crate::object::{JscObject, PropertyAttributes};
use crate::string::JscString;
use crate::value::{JscValue, extract_exception};

/// State shared by a context and every handle created from it
pub(crate) struct ContextState {
    pub(crate) api: &'static JscApi,
    ctx: Cell<JSGlobalContextRef>,
    /// External retain count; the context is torn down when it reaches zero
    refs: Cell<usize>,
    /// Live `JscContext` handles
    handles: Cell<usize>,
    pub(crate) callbacks: CallbackRegistry,
    classes: Cell<Option<HostClasses>>,
}

impl ContextState {
    /// The live context pointer, or `Released`
    pub(crate) fn raw(&self) -> JscResult<JSContextRef> {
        let ctx = self.ctx.get();
        if ctx.is_null() {
            Err(JscError::released())
        } else {
            Ok(ctx)
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.ctx.get().is_null()
    }

    /// Check that a handle owned by `owner` may be passed to this context
    ///
    /// Fails with `Released` when the owner is gone and with `TypeError` when
    /// the handle comes from another context.
    pub(crate) fn check_owner(self: &Rc<Self>, owner: &Rc<ContextState>) -> JscResult<()> {
        owner.raw()?;
        if Rc::ptr_eq(self, owner) {
            Ok(())
        } else {
            Err(JscError::type_error(
                "value of this context",
                "value of another context",
            ))
        }
    }

    /// Create a string with this context's function table
    pub(crate) fn string(&self, s: &str) -> JscResult<JscString> {
        JscString::with_api(self.api, s)
    }

    /// Turn a non-null exception out-parameter into an error
    pub(crate) fn check_exception(self: &Rc<Self>, exception: JSValueRef) -> JscResult<()> {
        if exception.is_null() {
            Ok(())
        } else {
            // SAFETY: a non-null exception was just produced by this context
            Err(unsafe { extract_exception(self, exception) })
        }
    }

    /// Host classes used for callback objects, created on first use
    pub(crate) fn host_classes(&self) -> JscResult<HostClasses> {
        if let Some(classes) = self.classes.get() {
            return Ok(classes);
        }
        let classes = HostClasses::create(self.api)?;
        self.classes.set(Some(classes));
        Ok(classes)
    }

    /// Release every remaining reference and drop registered callbacks
    fn teardown(&self) {
        let ctx = self.ctx.replace(ptr::null_mut());
        if !ctx.is_null() {
            let refs = self.refs.replace(0);
            debug!(refs, "releasing JavaScriptCore context");
            for _ in 0..refs {
                // SAFETY: each retain taken by this state is released once
                unsafe { self.api.JSGlobalContextRelease(ctx) };
            }
        }
        self.callbacks.clear();
        if let Some(classes) = self.classes.take() {
            classes.release(self.api);
        }
    }
}

impl Drop for ContextState {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A JavaScript execution context
///
/// Wraps a JSGlobalContext together with an external reference count:
/// [`retain`](Self::retain) and [`release`](Self::release) pair with
/// `JSGlobalContextRetain`/`JSGlobalContextRelease`, and once the count
/// reaches zero every operation (on the context or on values created from
/// it) fails with [`JscError::Released`]. Clones share the same context; when
/// the last clone is dropped, the remaining references are released.
///
/// Host callbacks receive the context as an argument. Capturing a
/// `JscContext` inside a callback keeps the context alive until it is
/// released explicitly.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because JavaScriptCore contexts are not
/// thread-safe. Accessing a context from multiple threads causes undefined behavior.
pub struct JscContext {
    state: Rc<ContextState>,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl JscContext {
    /// Create a new JavaScript context
    ///
    /// Loads the native library on first use.
    pub fn new() -> JscResult<Self> {
        let api = nitro_jsc_sys::api()?;

        // SAFETY: a null class creates a context with the default global object
        let ctx = unsafe { api.JSGlobalContextCreate(ptr::null_mut()) };
        if ctx.is_null() {
            return Err(JscError::ContextCreation {
                message: "JSGlobalContextCreate returned null".to_string(),
            });
        }
        debug!("created JavaScriptCore context");

        let state = ContextState {
            api,
            ctx: Cell::new(ctx),
            refs: Cell::new(1),
            handles: Cell::new(0),
            callbacks: CallbackRegistry::default(),
            classes: Cell::new(None),
        };
        Ok(Self::from_state(Rc::new(state)))
    }

    pub(crate) fn from_state(state: Rc<ContextState>) -> Self {
        state.handles.set(state.handles.get() + 1);
        Self {
            state,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn state(&self) -> &Rc<ContextState> {
        &self.state
    }

    /// Get the raw context pointer
    pub fn raw(&self) -> JscResult<JSGlobalContextRef> {
        self.state.raw()
    }

    /// The function table this context calls through
    pub fn api(&self) -> &'static JscApi {
        self.state.api
    }

    /// Take another reference to the context
    pub fn retain(&self) -> JscResult<()> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live; the matching release happens in release() or teardown
        unsafe { self.state.api.JSGlobalContextRetain(ctx) };
        self.state.refs.set(self.state.refs.get() + 1);
        Ok(())
    }

    /// Drop one reference; at zero the context is released for good
    pub fn release(&self) -> JscResult<()> {
        let ctx = self.state.raw()?;
        let refs = self.state.refs.get();
        if refs <= 1 {
            self.state.teardown();
            return Ok(());
        }
        // SAFETY: refs > 1, so this release leaves the context alive
        unsafe { self.state.api.JSGlobalContextRelease(ctx) };
        self.state.refs.set(refs - 1);
        Ok(())
    }

    /// Current external reference count
    pub fn ref_count(&self) -> usize {
        self.state.refs.get()
    }

    /// Whether the reference count has reached zero
    pub fn is_released(&self) -> bool {
        !self.state.is_alive()
    }

    /// Number of host callbacks kept alive by this context
    pub fn callback_count(&self) -> usize {
        self.state.callbacks.len()
    }

    /// Get the global object
    pub fn global_object(&self) -> JscResult<JscObject> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live
        unsafe {
            let global = self.state.api.JSContextGetGlobalObject(ctx);
            JscObject::wrap(&self.state, global, "JSContextGetGlobalObject")
        }
    }

    /// Evaluate a JavaScript script and return the result
    pub fn eval(&self, script: &str) -> JscResult<JscValue> {
        self.evaluate_script(script, None, None, 1)
    }

    /// Evaluate a JavaScript script with source URL (for better error messages)
    pub fn eval_with_source(&self, script: &str, source_url: &str) -> JscResult<JscValue> {
        self.evaluate_script(script, None, Some(source_url), 1)
    }

    /// Evaluate a script with an explicit `this`, source URL and first line
    pub fn evaluate_script(
        &self,
        script: &str,
        this: Option<&JscObject>,
        source_url: Option<&str>,
        starting_line: i32,
    ) -> JscResult<JscValue> {
        let ctx = self.state.raw()?;
        if let Some(this) = this {
            this.as_value().check_owner(&self.state)?;
        }
        let script = self.state.string(script)?;
        let source = source_url.map(|url| self.state.string(url)).transpose()?;
        let this = this.map(JscObject::raw).unwrap_or(ptr::null_mut());

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are live for the duration of the call
        let result = unsafe {
            self.state.api.JSEvaluateScript(
                ctx,
                script.raw(),
                this,
                source.as_ref().map_or(ptr::null_mut(), JscString::raw),
                starting_line,
                &mut exception,
            )
        };
        self.state.check_exception(exception)?;
        self.state.callbacks.drain_retired();

        // SAFETY: result was produced by this context
        unsafe { JscValue::wrap(&self.state, result, "JSEvaluateScript") }
    }

    /// Check a script for syntax errors without running it
    ///
    /// A syntax error is reported as [`JscError::Exception`] carrying the
    /// `SyntaxError` object.
    pub fn check_script_syntax(
        &self,
        script: &str,
        source_url: Option<&str>,
        starting_line: i32,
    ) -> JscResult<bool> {
        let ctx = self.state.raw()?;
        let script = self.state.string(script)?;
        let source = source_url.map(|url| self.state.string(url)).transpose()?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are live for the duration of the call
        let ok = unsafe {
            self.state.api.JSCheckScriptSyntax(
                ctx,
                script.raw(),
                source.as_ref().map_or(ptr::null_mut(), JscString::raw),
                starting_line,
                &mut exception,
            )
        };
        self.state.check_exception(exception)?;
        Ok(ok)
    }

    /// Run the garbage collector
    pub fn garbage_collect(&self) -> JscResult<()> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live
        unsafe { self.state.api.JSGarbageCollect(ctx) };
        self.state.callbacks.drain_retired();
        Ok(())
    }

    /// Create an undefined value
    pub fn undefined(&self) -> JscResult<JscValue> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live
        unsafe {
            let value = self.state.api.JSValueMakeUndefined(ctx);
            JscValue::wrap(&self.state, value, "JSValueMakeUndefined")
        }
    }

    /// Create a null value
    pub fn null(&self) -> JscResult<JscValue> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live
        unsafe {
            let value = self.state.api.JSValueMakeNull(ctx);
            JscValue::wrap(&self.state, value, "JSValueMakeNull")
        }
    }

    /// Create a boolean value
    pub fn boolean(&self, b: bool) -> JscResult<JscValue> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live
        unsafe {
            let value = self.state.api.JSValueMakeBoolean(ctx, b);
            JscValue::wrap(&self.state, value, "JSValueMakeBoolean")
        }
    }

    /// Create a number value
    pub fn number(&self, n: f64) -> JscResult<JscValue> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live
        unsafe {
            let value = self.state.api.JSValueMakeNumber(ctx, n);
            JscValue::wrap(&self.state, value, "JSValueMakeNumber")
        }
    }

    /// Create a string value
    pub fn string(&self, s: &str) -> JscResult<JscValue> {
        let ctx = self.state.raw()?;
        let js_str = self.state.string(s)?;
        // SAFETY: ctx and js_str are live; JSValueMakeString copies the string
        unsafe {
            let value = self.state.api.JSValueMakeString(ctx, js_str.raw());
            JscValue::wrap(&self.state, value, "JSValueMakeString")
        }
    }

    /// Create an empty JavaScript object
    pub fn object(&self) -> JscResult<JscObject> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx is live, null class creates plain object
        unsafe {
            let object = self
                .state
                .api
                .JSObjectMake(ctx, ptr::null_mut(), ptr::null_mut());
            JscObject::wrap(&self.state, object, "JSObjectMake")
        }
    }

    /// Create an array holding `values`
    pub fn array(&self, values: &[JscValue]) -> JscResult<JscObject> {
        let ctx = self.state.raw()?;
        for value in values {
            value.check_owner(&self.state)?;
        }
        let raw: Vec<JSValueRef> = values.iter().map(JscValue::raw).collect();
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: every element is a protected value of this context
        let array = unsafe {
            self.state
                .api
                .JSObjectMakeArray(ctx, raw.len(), raw.as_ptr(), &mut exception)
        };
        self.state.check_exception(exception)?;
        // SAFETY: array was produced by this context
        unsafe { JscObject::wrap(&self.state, array, "JSObjectMakeArray") }
    }

    /// Create an `Error` object with `message`
    pub fn error(&self, message: &str) -> JscResult<JscObject> {
        let ctx = self.state.raw()?;
        let message = self.string(message)?;
        let args = [message.raw()];
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: message is protected for the duration of the call
        let error = unsafe {
            self.state
                .api
                .JSObjectMakeError(ctx, args.len(), args.as_ptr(), &mut exception)
        };
        self.state.check_exception(exception)?;
        // SAFETY: error was produced by this context
        unsafe { JscObject::wrap(&self.state, error, "JSObjectMakeError") }
    }

    /// Parse a JSON document into a value
    pub fn from_json(&self, json: &str) -> JscResult<JscValue> {
        let ctx = self.state.raw()?;
        let js_str = self.state.string(json)?;
        // SAFETY: ctx and js_str are live
        let value = unsafe { self.state.api.JSValueMakeFromJSONString(ctx, js_str.raw()) };
        if value.is_null() {
            // The engine does not report why; let serde_json describe the problem
            let err = serde_json::from_str::<serde::de::IgnoredAny>(json)
                .err()
                .map(JscError::Json)
                .unwrap_or_else(|| JscError::internal("JSON rejected by JavaScriptCore"));
            return Err(err);
        }
        // SAFETY: value was produced by this context
        unsafe { JscValue::wrap(&self.state, value, "JSValueMakeFromJSONString") }
    }

    /// Convert a serializable Rust value into a JS value via JSON
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> JscResult<JscValue> {
        let json = serde_json::to_string(value)?;
        self.from_json(&json)
    }

    /// Compile a function from parameter names and a body
    pub fn make_function(
        &self,
        name: Option<&str>,
        params: &[&str],
        body: &str,
        source_url: Option<&str>,
        starting_line: i32,
    ) -> JscResult<JscObject> {
        let ctx = self.state.raw()?;
        let name = name.map(|n| self.state.string(n)).transpose()?;
        let params = params
            .iter()
            .map(|p| self.state.string(p))
            .collect::<JscResult<Vec<_>>>()?;
        let param_refs: Vec<JSStringRef> = params.iter().map(JscString::raw).collect();
        let body = self.state.string(body)?;
        let source = source_url.map(|url| self.state.string(url)).transpose()?;
        let count = u32::try_from(param_refs.len())
            .map_err(|_| JscError::internal("too many function parameters"))?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all strings outlive the call
        let function = unsafe {
            self.state.api.JSObjectMakeFunction(
                ctx,
                name.as_ref().map_or(ptr::null_mut(), JscString::raw),
                count,
                if param_refs.is_empty() {
                    ptr::null()
                } else {
                    param_refs.as_ptr()
                },
                body.raw(),
                source.as_ref().map_or(ptr::null_mut(), JscString::raw),
                starting_line,
                &mut exception,
            )
        };
        self.state.check_exception(exception)?;
        // SAFETY: function was produced by this context
        unsafe { JscObject::wrap(&self.state, function, "JSObjectMakeFunction") }
    }

    /// Set a property on the global object
    pub fn set_global(&self, name: &str, value: &JscValue) -> JscResult<()> {
        self.global_object()?
            .set_property(name, value, PropertyAttributes::NONE)
    }

    /// Get a property from the global object
    pub fn get_global(&self, name: &str) -> JscResult<JscValue> {
        self.global_object()?.get_property(name)
    }

    /// Create a host function and expose it on the global object
    pub fn register_function<F>(&self, name: &str, f: F) -> JscResult<JscObject>
    where
        F: Fn(&JscContext, &JscObject, Option<&JscObject>, &[Value]) -> JscResult<Value> + 'static,
    {
        let function = self.make_function_with_callback(name, f)?;
        self.set_global(name, &function.to_value())?;
        Ok(function)
    }
}

impl Clone for JscContext {
    fn clone(&self) -> Self {
        Self::from_state(Rc::clone(&self.state))
    }
}

impl Drop for JscContext {
    fn drop(&mut self) {
        let handles = self.state.handles.get().saturating_sub(1);
        self.state.handles.set(handles);
        if handles == 0 {
            self.state.teardown();
        }
    }
}

impl std::fmt::Debug for JscContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JscContext")
            .field("ctx", &self.state.ctx.get())
            .field("refs", &self.state.refs.get())
            .finish()
    }
}
