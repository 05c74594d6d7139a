//! Safe wrapper for JSC objects with property access and function support

use nitro_jsc_sys::*;
use std::ops::BitOr;
use std::ptr;
use std::rc::Rc;

use crate::context::ContextState;
use crate::error::{JscError, JscResult};
use crate::marshal::Value;
use crate::string::JscString;
use crate::value::JscValue;

/// Property attribute flags (`JSPropertyAttributes`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PropertyAttributes(JSPropertyAttributes);

impl PropertyAttributes {
    pub const NONE: Self = Self(K_JS_PROPERTY_ATTRIBUTE_NONE);
    /// Writes are silently ignored
    pub const READ_ONLY: Self = Self(K_JS_PROPERTY_ATTRIBUTE_READ_ONLY);
    /// Hidden from enumeration
    pub const DONT_ENUM: Self = Self(K_JS_PROPERTY_ATTRIBUTE_DONT_ENUM);
    /// `delete` fails
    pub const DONT_DELETE: Self = Self(K_JS_PROPERTY_ATTRIBUTE_DONT_DELETE);

    /// Raw bits passed to the engine
    pub const fn bits(self) -> JSPropertyAttributes {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PropertyAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A JavaScript object with automatic GC protection
///
/// Provides safe methods for property access, function calls, and array operations.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because JavaScript objects are tied to
/// their context's thread. Cross-thread access causes undefined behavior.
#[derive(Clone)]
pub struct JscObject {
    value: JscValue,
}

impl std::fmt::Debug for JscObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JscObject({:p})", self.value.raw())
    }
}

impl JscObject {
    /// Protect `object` and wrap it
    ///
    /// # Safety
    /// `object` must be null or a valid object of the state's context.
    pub(crate) unsafe fn wrap(
        state: &Rc<ContextState>,
        object: JSObjectRef,
        operation: &str,
    ) -> JscResult<Self> {
        // SAFETY: forwarded caller contract
        let value = unsafe { JscValue::wrap(state, object as JSValueRef, operation)? };
        Ok(Self { value })
    }

    /// Wrap a value already known to be an object
    pub(crate) fn from_value(value: JscValue) -> Self {
        debug_assert!(value.is_object());
        Self { value }
    }

    fn state(&self) -> &Rc<ContextState> {
        self.value.state()
    }

    fn check_arguments(&self, args: &[JscValue]) -> JscResult<()> {
        args.iter().try_for_each(|arg| arg.check_owner(self.state()))
    }

    fn name(&self, name: &str) -> JscResult<JscString> {
        self.state().string(name)
    }

    /// Get the raw object reference
    pub fn raw(&self) -> JSObjectRef {
        self.value.raw() as JSObjectRef
    }

    /// Convert to JscValue
    pub fn to_value(&self) -> JscValue {
        self.value.clone()
    }

    /// Unwrap into the underlying value
    pub fn into_value(self) -> JscValue {
        self.value
    }

    /// Borrow the underlying value
    pub fn as_value(&self) -> &JscValue {
        &self.value
    }

    /// Check if the object is a function
    pub fn is_function(&self) -> JscResult<bool> {
        let ctx = self.state().raw()?;
        // SAFETY: ctx and self.raw() are live
        Ok(unsafe { self.state().api.JSObjectIsFunction(ctx, self.raw()) })
    }

    /// Check if the object can be called with `new`
    pub fn is_constructor(&self) -> JscResult<bool> {
        let ctx = self.state().raw()?;
        // SAFETY: ctx and self.raw() are live
        Ok(unsafe { self.state().api.JSObjectIsConstructor(ctx, self.raw()) })
    }

    /// Check if the object is an array
    pub fn is_array(&self) -> JscResult<bool> {
        self.value.is_array()
    }

    /// Get a property by name
    pub fn get_property(&self, name: &str) -> JscResult<JscValue> {
        let ctx = self.state().raw()?;
        let name_ref = self.name(name)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are live
        let value = unsafe {
            self.state()
                .api
                .JSObjectGetProperty(ctx, self.raw(), name_ref.raw(), &mut exception)
        };
        self.state().check_exception(exception)?;
        // SAFETY: value was produced by this context
        unsafe { JscValue::wrap(self.state(), value, "JSObjectGetProperty") }
    }

    /// Set a property by name with the given attributes
    pub fn set_property(
        &self,
        name: &str,
        value: &JscValue,
        attributes: PropertyAttributes,
    ) -> JscResult<()> {
        let ctx = self.state().raw()?;
        value.check_owner(self.state())?;
        let name_ref = self.name(name)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are live
        unsafe {
            self.state().api.JSObjectSetProperty(
                ctx,
                self.raw(),
                name_ref.raw(),
                value.raw(),
                attributes.bits(),
                &mut exception,
            )
        };
        self.state().check_exception(exception)
    }

    /// Get a property converted to a host value
    pub fn get(&self, name: &str) -> JscResult<Value> {
        self.get_property(name)?.to_host()
    }

    /// Set a property from a host value
    pub fn set(&self, name: &str, value: impl Into<Value>) -> JscResult<()> {
        let value = value.into().to_js(&self.value.context())?;
        self.set_property(name, &value, PropertyAttributes::NONE)
    }

    /// Check if a property exists (own or inherited)
    pub fn has_property(&self, name: &str) -> JscResult<bool> {
        let ctx = self.state().raw()?;
        let name_ref = self.name(name)?;
        // SAFETY: all handles are live
        Ok(unsafe {
            self.state()
                .api
                .JSObjectHasProperty(ctx, self.raw(), name_ref.raw())
        })
    }

    /// Delete a property; `false` when it is not deletable
    pub fn delete_property(&self, name: &str) -> JscResult<bool> {
        let ctx = self.state().raw()?;
        let name_ref = self.name(name)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are live
        let deleted = unsafe {
            self.state()
                .api
                .JSObjectDeleteProperty(ctx, self.raw(), name_ref.raw(), &mut exception)
        };
        self.state().check_exception(exception)?;
        Ok(deleted)
    }

    /// Get an indexed property
    pub fn get_property_at_index(&self, index: u32) -> JscResult<JscValue> {
        let ctx = self.state().raw()?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and self.raw() are live
        let value = unsafe {
            self.state()
                .api
                .JSObjectGetPropertyAtIndex(ctx, self.raw(), index, &mut exception)
        };
        self.state().check_exception(exception)?;
        // SAFETY: value was produced by this context
        unsafe { JscValue::wrap(self.state(), value, "JSObjectGetPropertyAtIndex") }
    }

    /// Set an indexed property
    pub fn set_property_at_index(&self, index: u32, value: &JscValue) -> JscResult<()> {
        let ctx = self.state().raw()?;
        value.check_owner(self.state())?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are live
        unsafe {
            self.state().api.JSObjectSetPropertyAtIndex(
                ctx,
                self.raw(),
                index,
                value.raw(),
                &mut exception,
            )
        };
        self.state().check_exception(exception)
    }

    /// Names of the enumerable properties, own and inherited
    pub fn property_names(&self) -> JscResult<Vec<String>> {
        let ctx = self.state().raw()?;
        let api = self.state().api;
        // SAFETY: ctx and self.raw() are live; the array is released by the guard
        let names = PropertyNameArray {
            api,
            raw: unsafe { api.JSObjectCopyPropertyNames(ctx, self.raw()) },
        };
        if names.raw.is_null() {
            return Err(JscError::null_pointer("JSObjectCopyPropertyNames"));
        }

        // SAFETY: names.raw is live until the guard drops
        let count = unsafe { api.JSPropertyNameArrayGetCount(names.raw) };
        (0..count)
            .map(|index| {
                // SAFETY: index < count; the name is borrowed, so retain it
                unsafe {
                    let name = api.JSPropertyNameArrayGetNameAtIndex(names.raw, index);
                    JscString::from_raw_borrowed(api, name).map(|s| s.to_rust_string())
                }
            })
            .collect()
    }

    /// The `[[Prototype]]` of the object
    pub fn prototype(&self) -> JscResult<JscValue> {
        let ctx = self.state().raw()?;
        // SAFETY: ctx and self.raw() are live
        let proto = unsafe { self.state().api.JSObjectGetPrototype(ctx, self.raw()) };
        // SAFETY: proto was produced by this context
        unsafe { JscValue::wrap(self.state(), proto, "JSObjectGetPrototype") }
    }

    /// Replace the `[[Prototype]]`; must be an object or null
    pub fn set_prototype(&self, prototype: &JscValue) -> JscResult<()> {
        if !prototype.is_object() && !prototype.is_null() {
            return Err(JscError::type_error("object or null", prototype.js_type().name()));
        }
        let ctx = self.state().raw()?;
        prototype.check_owner(self.state())?;
        // SAFETY: both handles are live
        unsafe {
            self.state()
                .api
                .JSObjectSetPrototype(ctx, self.raw(), prototype.raw())
        };
        Ok(())
    }

    /// Call this object as a function
    ///
    /// `this` defaults to the global object when `None`.
    pub fn call_as_function(
        &self,
        this: Option<&JscObject>,
        args: &[JscValue],
    ) -> JscResult<JscValue> {
        if !self.is_function()? {
            return Err(JscError::type_error("function", "object"));
        }
        let ctx = self.state().raw()?;
        if let Some(this) = this {
            this.as_value().check_owner(self.state())?;
        }
        self.check_arguments(args)?;
        let raw_args: Vec<JSValueRef> = args.iter().map(JscValue::raw).collect();
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are protected and live
        let result = unsafe {
            self.state().api.JSObjectCallAsFunction(
                ctx,
                self.raw(),
                this.map_or(ptr::null_mut(), JscObject::raw),
                raw_args.len(),
                if raw_args.is_empty() {
                    ptr::null()
                } else {
                    raw_args.as_ptr()
                },
                &mut exception,
            )
        };
        self.state().check_exception(exception)?;
        self.state().callbacks.drain_retired();
        // SAFETY: result was produced by this context
        unsafe { JscValue::wrap(self.state(), result, "JSObjectCallAsFunction") }
    }

    /// Call this object as a constructor (`new`)
    pub fn call_as_constructor(&self, args: &[JscValue]) -> JscResult<JscObject> {
        if !self.is_constructor()? {
            return Err(JscError::type_error("constructor", "object"));
        }
        let ctx = self.state().raw()?;
        self.check_arguments(args)?;
        let raw_args: Vec<JSValueRef> = args.iter().map(JscValue::raw).collect();
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: all handles are protected and live
        let result = unsafe {
            self.state().api.JSObjectCallAsConstructor(
                ctx,
                self.raw(),
                raw_args.len(),
                if raw_args.is_empty() {
                    ptr::null()
                } else {
                    raw_args.as_ptr()
                },
                &mut exception,
            )
        };
        self.state().check_exception(exception)?;
        self.state().callbacks.drain_retired();
        // SAFETY: result was produced by this context
        unsafe { JscObject::wrap(self.state(), result, "JSObjectCallAsConstructor") }
    }

    /// `length` of the object, 0 when missing
    pub fn length(&self) -> JscResult<u32> {
        let length = self.get_property("length")?;
        if length.is_undefined() {
            return Ok(0);
        }
        Ok(length.to_number()? as u32)
    }

    /// Identity comparison
    pub fn same_object(&self, other: &JscObject) -> bool {
        self.raw() == other.raw()
    }
}

/// Releases a copied property name array exactly once
struct PropertyNameArray {
    api: &'static JscApi,
    raw: JSPropertyNameArrayRef,
}

impl Drop for PropertyNameArray {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: raw came from JSObjectCopyPropertyNames and is released once
            unsafe { self.api.JSPropertyNameArrayRelease(self.raw) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[test]
    fn test_property_round_trip() {
        let Some(ctx) = test_context() else { return };
        let obj = ctx.object().unwrap();
        obj.set("name", "nitro").unwrap();
        assert_eq!(obj.get("name").unwrap(), Value::from("nitro"));
        assert!(obj.has_property("name").unwrap());
        assert!(obj.delete_property("name").unwrap());
        assert!(!obj.has_property("name").unwrap());
        assert!(obj.get_property("name").unwrap().is_undefined());
    }

    #[test]
    fn test_read_only_property() {
        let Some(ctx) = test_context() else { return };
        let obj = ctx.object().unwrap();
        let one = ctx.number(1.0).unwrap();
        obj.set_property("fixed", &one, PropertyAttributes::READ_ONLY)
            .unwrap();
        obj.set("fixed", 2).unwrap();
        assert_eq!(obj.get("fixed").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_dont_enum_property() {
        let Some(ctx) = test_context() else { return };
        let obj = ctx.object().unwrap();
        let value = ctx.number(1.0).unwrap();
        obj.set_property("hidden", &value, PropertyAttributes::DONT_ENUM)
            .unwrap();
        obj.set("shown", 2).unwrap();
        assert_eq!(obj.property_names().unwrap(), vec!["shown".to_string()]);
        assert_eq!(obj.get("hidden").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_dont_delete_property() {
        let Some(ctx) = test_context() else { return };
        let obj = ctx.object().unwrap();
        let value = ctx.number(1.0).unwrap();
        obj.set_property("pinned", &value, PropertyAttributes::DONT_DELETE)
            .unwrap();
        assert!(!obj.delete_property("pinned").unwrap());
        assert!(obj.has_property("pinned").unwrap());
    }

    #[test]
    fn test_indexed_properties() {
        let Some(ctx) = test_context() else { return };
        let array = ctx.eval("[10, 20, 30]").unwrap().to_object().unwrap();
        assert_eq!(array.length().unwrap(), 3);
        assert_eq!(array.get_property_at_index(1).unwrap().to_number().unwrap(), 20.0);
        array
            .set_property_at_index(3, &ctx.number(40.0).unwrap())
            .unwrap();
        assert_eq!(array.length().unwrap(), 4);
        assert!(array.get_property_at_index(9).unwrap().is_undefined());
    }

    #[test]
    fn test_prototype() {
        let Some(ctx) = test_context() else { return };
        let proto = ctx.eval("({greet: 'hi'})").unwrap();
        let obj = ctx.object().unwrap();
        obj.set_prototype(&proto).unwrap();
        assert!(obj.prototype().unwrap().is_strict_equal(&proto).unwrap());
        assert_eq!(obj.get("greet").unwrap(), Value::from("hi"));
        assert!(obj.has_property("greet").unwrap());
        assert!(obj.set_prototype(&ctx.number(1.0).unwrap()).is_err());
    }

    #[test]
    fn test_getter_exception_propagates() {
        let Some(ctx) = test_context() else { return };
        let obj = ctx
            .eval("({ get bad() { throw new Error('getter failed') } })")
            .unwrap()
            .to_object()
            .unwrap();
        let err = obj.get_property("bad").unwrap_err();
        assert_eq!(err.exception().unwrap().message, "getter failed");
    }

    #[test]
    fn test_call_non_function_is_type_error() {
        let Some(ctx) = test_context() else { return };
        let obj = ctx.object().unwrap();
        assert!(!obj.is_function().unwrap());
        assert!(matches!(
            obj.call_as_function(None, &[]),
            Err(JscError::TypeError { .. })
        ));
        assert!(matches!(
            obj.call_as_constructor(&[]),
            Err(JscError::TypeError { .. })
        ));
    }

    #[test]
    fn test_call_as_constructor() {
        let Some(ctx) = test_context() else { return };
        let date = ctx.get_global("Date").unwrap().to_object().unwrap();
        assert!(date.is_function().unwrap());
        assert!(date.is_constructor().unwrap());
        let instance = date.call_as_constructor(&[ctx.number(0.0).unwrap()]).unwrap();
        let get_time = instance.get_property("getTime").unwrap().to_object().unwrap();
        let time = get_time.call_as_function(Some(&instance), &[]).unwrap();
        assert_eq!(time.to_number().unwrap(), 0.0);
    }
}
