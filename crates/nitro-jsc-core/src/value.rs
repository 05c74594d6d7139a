//! Safe wrapper around JSC values with automatic GC protection

use nitro_jsc_sys::*;
use std::ffi::CString;
use std::marker::PhantomData;
use std::ptr;
use std::rc::Rc;

use crate::context::{ContextState, JscContext};
use crate::error::{JsException, JscError, JscResult};
use crate::object::JscObject;
use crate::string::{JscString, js_string_to_rust};

/// The engine's type tag for a value (`JSType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsType {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Symbol,
    BigInt,
}

impl JsType {
    /// Map a raw `JSType` tag
    pub fn from_raw(tag: JSType) -> Option<Self> {
        Some(match tag {
            K_JS_TYPE_UNDEFINED => Self::Undefined,
            K_JS_TYPE_NULL => Self::Null,
            K_JS_TYPE_BOOLEAN => Self::Boolean,
            K_JS_TYPE_NUMBER => Self::Number,
            K_JS_TYPE_STRING => Self::String,
            K_JS_TYPE_OBJECT => Self::Object,
            K_JS_TYPE_SYMBOL => Self::Symbol,
            K_JS_TYPE_BIGINT => Self::BigInt,
            _ => return None,
        })
    }

    /// The `typeof`-style name of the tag
    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
        }
    }
}

/// A JavaScript value with automatic GC protection
///
/// When created, the value is protected from garbage collection.
/// When dropped, the protection is removed, unless the context has already
/// been released.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because JavaScript values are tied to
/// their context's thread. Cross-thread access causes undefined behavior.
pub struct JscValue {
    state: Rc<ContextState>,
    value: JSValueRef,
    kind: JsType,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl std::fmt::Debug for JscValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JscValue({}, {:p})", self.kind.name(), self.value)
    }
}

impl JscValue {
    /// Protect `value` and take ownership of that protection
    ///
    /// # Safety
    /// `value` must be null or a valid value of the state's context.
    pub(crate) unsafe fn wrap(
        state: &Rc<ContextState>,
        value: JSValueRef,
        operation: &str,
    ) -> JscResult<Self> {
        if value.is_null() {
            return Err(JscError::null_pointer(operation));
        }
        let ctx = state.raw()?;
        // SAFETY: ctx is live and value belongs to it per caller contract
        let tag = unsafe { state.api.JSValueGetType(ctx, value) };
        let kind = JsType::from_raw(tag)
            .ok_or_else(|| JscError::internal(format!("unknown JSType tag {tag}")))?;
        // SAFETY: as above; the matching unprotect is in Drop
        unsafe { state.api.JSValueProtect(ctx, value) };
        Ok(Self {
            state: Rc::clone(state),
            value,
            kind,
            _not_send: PhantomData,
        })
    }

    pub(crate) fn state(&self) -> &Rc<ContextState> {
        &self.state
    }

    /// Fail unless this value is live and belongs to `state`
    pub(crate) fn check_owner(&self, state: &Rc<ContextState>) -> JscResult<()> {
        state.check_owner(&self.state)
    }

    /// Get the raw value reference
    pub fn raw(&self) -> JSValueRef {
        self.value
    }

    /// The context this value belongs to
    pub fn context(&self) -> JscContext {
        JscContext::from_state(Rc::clone(&self.state))
    }

    /// The type tag captured when the value was wrapped
    pub fn js_type(&self) -> JsType {
        self.kind
    }

    /// Check if the value is undefined
    pub fn is_undefined(&self) -> bool {
        self.kind == JsType::Undefined
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        self.kind == JsType::Null
    }

    /// Check if the value is a boolean
    pub fn is_boolean(&self) -> bool {
        self.kind == JsType::Boolean
    }

    /// Check if the value is a number
    pub fn is_number(&self) -> bool {
        self.kind == JsType::Number
    }

    /// Check if the value is a string
    pub fn is_string(&self) -> bool {
        self.kind == JsType::String
    }

    /// Check if the value is an object
    pub fn is_object(&self) -> bool {
        self.kind == JsType::Object
    }

    /// Check if the value is a symbol
    pub fn is_symbol(&self) -> bool {
        self.kind == JsType::Symbol
    }

    /// Check if the value is an array
    pub fn is_array(&self) -> JscResult<bool> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx and self.value are live
        Ok(unsafe { self.state.api.JSValueIsArray(ctx, self.value) })
    }

    /// Check if the value is an object created from `class`
    pub fn is_object_of_class(&self, class: JSClassRef) -> JscResult<bool> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx and self.value are live
        Ok(unsafe { self.state.api.JSValueIsObjectOfClass(ctx, self.value, class) })
    }

    /// `==` comparison; may run user code and throw
    pub fn is_equal(&self, other: &JscValue) -> JscResult<bool> {
        let ctx = self.state.raw()?;
        other.check_owner(&self.state)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: both values are protected and live
        let equal = unsafe {
            self.state
                .api
                .JSValueIsEqual(ctx, self.value, other.value, &mut exception)
        };
        self.state.check_exception(exception)?;
        Ok(equal)
    }

    /// `===` comparison
    pub fn is_strict_equal(&self, other: &JscValue) -> JscResult<bool> {
        let ctx = self.state.raw()?;
        other.check_owner(&self.state)?;
        // SAFETY: both values are protected and live
        Ok(unsafe { self.state.api.JSValueIsStrictEqual(ctx, self.value, other.value) })
    }

    /// `instanceof` check against `constructor`
    pub fn is_instance_of(&self, constructor: &JscObject) -> JscResult<bool> {
        let ctx = self.state.raw()?;
        constructor.as_value().check_owner(&self.state)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: both handles are protected and live
        let result = unsafe {
            self.state.api.JSValueIsInstanceOfConstructor(
                ctx,
                self.value,
                constructor.raw(),
                &mut exception,
            )
        };
        self.state.check_exception(exception)?;
        Ok(result)
    }

    /// Convert to boolean
    pub fn to_bool(&self) -> JscResult<bool> {
        let ctx = self.state.raw()?;
        // SAFETY: ctx and self.value are live
        Ok(unsafe { self.state.api.JSValueToBoolean(ctx, self.value) })
    }

    /// Convert to number
    pub fn to_number(&self) -> JscResult<f64> {
        let ctx = self.state.raw()?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and self.value are live
        let result = unsafe {
            self.state
                .api
                .JSValueToNumber(ctx, self.value, &mut exception)
        };
        self.state.check_exception(exception)?;
        Ok(result)
    }

    /// Convert to string
    pub fn to_string(&self) -> JscResult<String> {
        Ok(self.to_js_string()?.to_rust_string())
    }

    /// Convert to string, keeping the engine's string handle
    pub fn to_js_string(&self) -> JscResult<JscString> {
        let ctx = self.state.raw()?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and self.value are live
        let js_str = unsafe {
            self.state
                .api
                .JSValueToStringCopy(ctx, self.value, &mut exception)
        };
        self.state.check_exception(exception)?;
        // SAFETY: JSValueToStringCopy hands over one reference
        unsafe { JscString::from_raw_owned(self.state.api, js_str) }
    }

    /// Convert to object (boxing primitives); throws for undefined and null
    pub fn to_object(&self) -> JscResult<JscObject> {
        if self.is_object() {
            return Ok(JscObject::from_value(self.clone()));
        }
        let ctx = self.state.raw()?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and self.value are live
        let object = unsafe {
            self.state
                .api
                .JSValueToObject(ctx, self.value, &mut exception)
        };
        self.state.check_exception(exception)?;
        // SAFETY: object was produced by this context
        unsafe { JscObject::wrap(&self.state, object, "JSValueToObject") }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> JscResult<String> {
        self.to_json_indented(0)
    }

    /// Convert to JSON string with `indent` spaces per level
    pub fn to_json_indented(&self, indent: u32) -> JscResult<String> {
        let ctx = self.state.raw()?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and self.value are live
        let js_str = unsafe {
            self.state
                .api
                .JSValueCreateJSONString(ctx, self.value, indent, &mut exception)
        };
        self.state.check_exception(exception)?;
        if js_str.is_null() {
            return Err(JscError::type_error("JSON-serializable value", self.kind.name()));
        }
        // SAFETY: JSValueCreateJSONString hands over one reference
        let js_str = unsafe { JscString::from_raw_owned(self.state.api, js_str)? };
        Ok(js_str.to_rust_string())
    }

    /// Deserialize from JSON to Rust type
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> JscResult<T> {
        let json = self.to_json()?;
        serde_json::from_str(&json).map_err(JscError::Json)
    }
}

impl Clone for JscValue {
    fn clone(&self) -> Self {
        if let Ok(ctx) = self.state.raw() {
            // SAFETY: value is live; the clone owns this extra protection
            unsafe { self.state.api.JSValueProtect(ctx, self.value) };
        }
        Self {
            state: Rc::clone(&self.state),
            value: self.value,
            kind: self.kind,
            _not_send: PhantomData,
        }
    }
}

impl Drop for JscValue {
    fn drop(&mut self) {
        if let Ok(ctx) = self.state.raw() {
            // SAFETY: value was protected in wrap() or clone(), now unprotecting
            unsafe { self.state.api.JSValueUnprotect(ctx, self.value) };
        }
    }
}

/// Extract a structured exception from a thrown value
///
/// Reads `name`, `message`, `stack`, and the source location JSC attaches
/// to error objects. Property reads here ignore nested exceptions.
///
/// # Safety
/// `exception` must be a non-null value thrown in the state's context.
pub(crate) unsafe fn extract_exception(state: &Rc<ContextState>, exception: JSValueRef) -> JscError {
    // SAFETY: exception is valid per caller contract
    let value = match unsafe { JscValue::wrap(state, exception, "exception") } {
        Ok(value) => value,
        Err(err) => return err,
    };
    let Ok(ctx) = state.raw() else {
        return JscError::released();
    };
    let api = state.api;

    // SAFETY: ctx and exception are live; helpers swallow nested exceptions
    let exception = unsafe {
        if value.is_object() {
            let obj = exception as JSObjectRef;
            let name = get_string_property(api, ctx, obj, "name").unwrap_or_else(|| "Error".to_string());
            let message = get_string_property(api, ctx, obj, "message").unwrap_or_else(|| {
                value_to_string(api, ctx, exception).unwrap_or_else(|| "Unknown error".to_string())
            });
            let stack = get_string_property(api, ctx, obj, "stack");
            let source_url = get_string_property(api, ctx, obj, "sourceURL")
                .or_else(|| get_string_property(api, ctx, obj, "fileName"));
            let line = get_number_property(api, ctx, obj, "line")
                .or_else(|| get_number_property(api, ctx, obj, "lineNumber"))
                .map(|n| n as u32);
            let column = get_number_property(api, ctx, obj, "column")
                .or_else(|| get_number_property(api, ctx, obj, "columnNumber"))
                .map(|n| n as u32);
            JsException {
                value,
                name,
                message,
                source_url,
                line,
                column,
                stack,
            }
        } else {
            // Primitive exception (throw "string" or throw 42)
            let message =
                value_to_string(api, ctx, exception).unwrap_or_else(|| "Unknown error".to_string());
            JsException {
                value,
                name: "Error".to_string(),
                message,
                source_url: None,
                line: None,
                column: None,
                stack: None,
            }
        }
    };
    JscError::from(exception)
}

/// Get a string property from a JS object
unsafe fn get_string_property(
    api: &JscApi,
    ctx: JSContextRef,
    obj: JSObjectRef,
    name: &str,
) -> Option<String> {
    let prop_name = CString::new(name).ok()?;
    // SAFETY: ctx and obj are valid per caller contract
    unsafe {
        let js_name = api.JSStringCreateWithUTF8CString(prop_name.as_ptr());
        if js_name.is_null() {
            return None;
        }

        let mut exception: JSValueRef = ptr::null_mut();
        let value = api.JSObjectGetProperty(ctx, obj, js_name, &mut exception);
        api.JSStringRelease(js_name);

        if exception.is_null() && !value.is_null() && !api.JSValueIsUndefined(ctx, value) {
            value_to_string(api, ctx, value)
        } else {
            None
        }
    }
}

/// Get a number property from a JS object
unsafe fn get_number_property(
    api: &JscApi,
    ctx: JSContextRef,
    obj: JSObjectRef,
    name: &str,
) -> Option<f64> {
    let prop_name = CString::new(name).ok()?;
    // SAFETY: ctx and obj are valid per caller contract
    unsafe {
        let js_name = api.JSStringCreateWithUTF8CString(prop_name.as_ptr());
        if js_name.is_null() {
            return None;
        }

        let mut exception: JSValueRef = ptr::null_mut();
        let value = api.JSObjectGetProperty(ctx, obj, js_name, &mut exception);
        api.JSStringRelease(js_name);

        if exception.is_null() && !value.is_null() && api.JSValueIsNumber(ctx, value) {
            let mut ex: JSValueRef = ptr::null_mut();
            let num = api.JSValueToNumber(ctx, value, &mut ex);
            if ex.is_null() && !num.is_nan() {
                Some(num)
            } else {
                None
            }
        } else {
            None
        }
    }
}

/// Convert a JS value to a Rust string, ignoring exceptions
unsafe fn value_to_string(api: &JscApi, ctx: JSContextRef, value: JSValueRef) -> Option<String> {
    // SAFETY: ctx and value are valid per caller contract
    unsafe {
        let mut exception: JSValueRef = ptr::null_mut();
        let js_str = api.JSValueToStringCopy(ctx, value, &mut exception);

        if js_str.is_null() || !exception.is_null() {
            return None;
        }

        let result = js_string_to_rust(api, js_str);
        api.JSStringRelease(js_str);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[test]
    fn test_type_tags() {
        let Some(ctx) = test_context() else { return };
        assert_eq!(ctx.eval("undefined").unwrap().js_type(), JsType::Undefined);
        assert_eq!(ctx.eval("null").unwrap().js_type(), JsType::Null);
        assert_eq!(ctx.eval("true").unwrap().js_type(), JsType::Boolean);
        assert_eq!(ctx.eval("1.5").unwrap().js_type(), JsType::Number);
        assert_eq!(ctx.eval("'s'").unwrap().js_type(), JsType::String);
        assert_eq!(ctx.eval("({})").unwrap().js_type(), JsType::Object);
        assert_eq!(ctx.eval("Symbol('s')").unwrap().js_type(), JsType::Symbol);
    }

    #[test]
    fn test_object_coercions() {
        let Some(ctx) = test_context() else { return };
        let value = ctx.eval("({})").unwrap();
        assert!(value.to_bool().unwrap());
        assert!(value.to_number().unwrap().is_nan());
        assert_eq!(value.to_string().unwrap(), "[object Object]");
    }

    #[test]
    fn test_equality() {
        let Some(ctx) = test_context() else { return };
        let one = ctx.number(1.0).unwrap();
        let one_str = ctx.string("1").unwrap();
        assert!(one.is_equal(&one_str).unwrap());
        assert!(!one.is_strict_equal(&one_str).unwrap());
        assert!(one.is_strict_equal(&ctx.number(1.0).unwrap()).unwrap());
    }

    #[test]
    fn test_is_equal_propagates_exception() {
        let Some(ctx) = test_context() else { return };
        let hostile = ctx
            .eval("({ valueOf() { throw new RangeError('no') } })")
            .unwrap();
        let err = hostile.is_equal(&ctx.number(1.0).unwrap()).unwrap_err();
        assert_eq!(err.error_type(), "RangeError");
    }

    #[test]
    fn test_instance_of() {
        let Some(ctx) = test_context() else { return };
        let array = ctx.eval("[1, 2]").unwrap();
        let array_ctor = ctx.get_global("Array").unwrap().to_object().unwrap();
        let object_ctor = ctx.get_global("Object").unwrap().to_object().unwrap();
        let date_ctor = ctx.get_global("Date").unwrap().to_object().unwrap();
        assert!(array.is_instance_of(&array_ctor).unwrap());
        assert!(array.is_instance_of(&object_ctor).unwrap());
        assert!(!array.is_instance_of(&date_ctor).unwrap());
        assert!(array.is_array().unwrap());
    }

    #[test]
    fn test_to_object_boxes_primitives() {
        let Some(ctx) = test_context() else { return };
        let boxed = ctx.string("abc").unwrap().to_object().unwrap();
        assert_eq!(boxed.length().unwrap(), 3);
        assert!(ctx.undefined().unwrap().to_object().unwrap_err().is_exception());
    }

    #[test]
    fn test_json_round_trip() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }

        let Some(ctx) = test_context() else { return };
        let value = ctx.eval("({x: 1, y: 2})").unwrap();
        assert_eq!(value.to_json().unwrap(), r#"{"x":1,"y":2}"#);
        assert_eq!(value.deserialize::<Point>().unwrap(), Point { x: 1, y: 2 });
        assert!(ctx.undefined().unwrap().to_json().is_err());
    }

    #[test]
    fn test_thrown_primitive() {
        let Some(ctx) = test_context() else { return };
        let err = ctx.eval("throw 42").unwrap_err();
        let exception = err.exception().unwrap();
        assert_eq!(exception.name, "Error");
        assert_eq!(exception.message, "42");
        assert_eq!(exception.value().to_number().unwrap(), 42.0);
    }

    #[test]
    fn test_thrown_error_details() {
        let Some(ctx) = test_context() else { return };
        let err = ctx
            .eval_with_source("null.foo", "crash.js")
            .unwrap_err();
        let exception = err.exception().unwrap();
        assert_eq!(exception.name, "TypeError");
        assert_eq!(exception.source_url.as_deref(), Some("crash.js"));
        assert_eq!(exception.line, Some(1));
        assert!(err.to_string().starts_with("TypeError: "));
    }
}
