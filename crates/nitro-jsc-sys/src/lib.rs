//! Raw FFI bindings to the JavaScriptCore C API
//!
//! This crate provides low-level unsafe bindings to JavaScriptCore.
//! Unlike a link-time binding, the native library is located and opened at
//! runtime (see [`library`]) and every entry point is resolved into the
//! [`JscApi`] function table. Use the safe wrappers in `nitro-jsc-core` for
//! higher-level access.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_uint};

mod api;
pub mod library;

pub use api::JscApi;
pub use library::{
    DEFAULT_LIBRARY_NAME, LibraryConfig, LoadError, api, is_loaded, library_config, load_with,
    set_library_config, set_library_name, set_library_path,
};

// Type aliases for JSC opaque pointers
pub type JSContextGroupRef = *mut c_void;
pub type JSContextRef = *mut c_void;
pub type JSGlobalContextRef = *mut c_void;
pub type JSStringRef = *mut c_void;
pub type JSClassRef = *mut c_void;
pub type JSValueRef = *mut c_void;
pub type JSObjectRef = *mut c_void;
pub type JSPropertyNameArrayRef = *mut c_void;
pub type JSPropertyNameAccumulatorRef = *mut c_void;

/// A UTF-16 code unit
pub type JSChar = u16;

// Property attributes
pub type JSPropertyAttributes = c_uint;
pub const K_JS_PROPERTY_ATTRIBUTE_NONE: JSPropertyAttributes = 0;
pub const K_JS_PROPERTY_ATTRIBUTE_READ_ONLY: JSPropertyAttributes = 1 << 1;
pub const K_JS_PROPERTY_ATTRIBUTE_DONT_ENUM: JSPropertyAttributes = 1 << 2;
pub const K_JS_PROPERTY_ATTRIBUTE_DONT_DELETE: JSPropertyAttributes = 1 << 3;

// Class attributes
pub type JSClassAttributes = c_uint;
pub const K_JS_CLASS_ATTRIBUTE_NONE: JSClassAttributes = 0;
pub const K_JS_CLASS_ATTRIBUTE_NO_AUTOMATIC_PROTOTYPE: JSClassAttributes = 1 << 1;

// Value types
pub type JSType = c_uint;
pub const K_JS_TYPE_UNDEFINED: JSType = 0;
pub const K_JS_TYPE_NULL: JSType = 1;
pub const K_JS_TYPE_BOOLEAN: JSType = 2;
pub const K_JS_TYPE_NUMBER: JSType = 3;
pub const K_JS_TYPE_STRING: JSType = 4;
pub const K_JS_TYPE_OBJECT: JSType = 5;
pub const K_JS_TYPE_SYMBOL: JSType = 6;
pub const K_JS_TYPE_BIGINT: JSType = 7;

// Callback types
pub type JSObjectInitializeCallback = Option<unsafe extern "C" fn(ctx: JSContextRef, object: JSObjectRef)>;

pub type JSObjectFinalizeCallback = Option<unsafe extern "C" fn(object: JSObjectRef)>;

pub type JSObjectHasPropertyCallback = Option<
    unsafe extern "C" fn(ctx: JSContextRef, object: JSObjectRef, property_name: JSStringRef) -> bool,
>;

pub type JSObjectGetPropertyCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        object: JSObjectRef,
        property_name: JSStringRef,
        exception: *mut JSValueRef,
    ) -> JSValueRef,
>;

pub type JSObjectSetPropertyCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        object: JSObjectRef,
        property_name: JSStringRef,
        value: JSValueRef,
        exception: *mut JSValueRef,
    ) -> bool,
>;

pub type JSObjectDeletePropertyCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        object: JSObjectRef,
        property_name: JSStringRef,
        exception: *mut JSValueRef,
    ) -> bool,
>;

pub type JSObjectGetPropertyNamesCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        object: JSObjectRef,
        property_names: JSPropertyNameAccumulatorRef,
    ),
>;

pub type JSObjectCallAsFunctionCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        function: JSObjectRef,
        this_object: JSObjectRef,
        argument_count: usize,
        arguments: *const JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSValueRef,
>;

pub type JSObjectCallAsConstructorCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        constructor: JSObjectRef,
        argument_count: usize,
        arguments: *const JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSObjectRef,
>;

pub type JSObjectHasInstanceCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        constructor: JSObjectRef,
        possible_instance: JSValueRef,
        exception: *mut JSValueRef,
    ) -> bool,
>;

pub type JSObjectConvertToTypeCallback = Option<
    unsafe extern "C" fn(
        ctx: JSContextRef,
        object: JSObjectRef,
        type_: JSType,
        exception: *mut JSValueRef,
    ) -> JSValueRef,
>;

/// A statically declared value property (`JSStaticValue`)
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct JSStaticValue {
    pub name: *const c_char,
    pub get_property: JSObjectGetPropertyCallback,
    pub set_property: JSObjectSetPropertyCallback,
    pub attributes: JSPropertyAttributes,
}

/// A statically declared function property (`JSStaticFunction`)
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct JSStaticFunction {
    pub name: *const c_char,
    pub call_as_function: JSObjectCallAsFunctionCallback,
    pub attributes: JSPropertyAttributes,
}

/// Class definition passed to `JSClassCreate`
///
/// Field order and widths follow `JSObjectRef.h` exactly.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct JSClassDefinition {
    pub version: c_int,
    pub attributes: JSClassAttributes,
    pub class_name: *const c_char,
    pub parent_class: JSClassRef,
    pub static_values: *const JSStaticValue,
    pub static_functions: *const JSStaticFunction,
    pub initialize: JSObjectInitializeCallback,
    pub finalize: JSObjectFinalizeCallback,
    pub has_property: JSObjectHasPropertyCallback,
    pub get_property: JSObjectGetPropertyCallback,
    pub set_property: JSObjectSetPropertyCallback,
    pub delete_property: JSObjectDeletePropertyCallback,
    pub get_property_names: JSObjectGetPropertyNamesCallback,
    pub call_as_function: JSObjectCallAsFunctionCallback,
    pub call_as_constructor: JSObjectCallAsConstructorCallback,
    pub has_instance: JSObjectHasInstanceCallback,
    pub convert_to_type: JSObjectConvertToTypeCallback,
}

/// Equivalent of `kJSClassDefinitionEmpty`
impl Default for JSClassDefinition {
    fn default() -> Self {
        Self {
            version: 0,
            attributes: K_JS_CLASS_ATTRIBUTE_NONE,
            class_name: std::ptr::null(),
            parent_class: std::ptr::null_mut(),
            static_values: std::ptr::null(),
            static_functions: std::ptr::null(),
            initialize: None,
            finalize: None,
            has_property: None,
            get_property: None,
            set_property: None,
            delete_property: None,
            get_property_names: None,
            call_as_function: None,
            call_as_constructor: None,
            has_instance: None,
            convert_to_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_class_definition_layout() {
        let ptr = size_of::<*const c_void>();
        // version + attributes pack into one pointer-sized slot, then 15 pointers
        assert_eq!(size_of::<JSClassDefinition>(), 8 + 15 * ptr);
        assert_eq!(align_of::<JSClassDefinition>(), align_of::<*const c_void>());
        assert_eq!(size_of::<JSObjectFinalizeCallback>(), ptr);
    }

    #[test]
    fn test_static_entry_layout() {
        let ptr = size_of::<*const c_void>();
        assert_eq!(size_of::<JSStaticFunction>(), 3 * ptr);
        assert_eq!(size_of::<JSStaticValue>(), 4 * ptr);
    }

    #[test]
    fn test_attribute_bits() {
        assert_eq!(K_JS_PROPERTY_ATTRIBUTE_READ_ONLY, 2);
        assert_eq!(K_JS_PROPERTY_ATTRIBUTE_DONT_ENUM, 4);
        assert_eq!(K_JS_PROPERTY_ATTRIBUTE_DONT_DELETE, 8);
        assert_eq!(K_JS_TYPE_SYMBOL, 6);
    }
}
