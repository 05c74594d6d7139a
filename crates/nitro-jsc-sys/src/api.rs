//! Function table for the JavaScriptCore C API
//!
//! Each entry names the C symbol, its parameters and its return type. The
//! `jsc_api!` macro turns that list into [`JscApi`]: one function-pointer
//! field per symbol, resolved eagerly when the library is loaded, and a
//! same-named `unsafe` method that forwards to it.

use std::ffi::c_void;
use std::fmt;
use std::os::raw::{c_char, c_int, c_uint};

use libloading::Library;

use crate::LoadError;
use crate::*;

macro_rules! jsc_api {
    (
        $(
            $(#[$meta:meta])*
            fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
        )*
    ) => {
        /// Resolved JavaScriptCore entry points
        ///
        /// Methods carry the C names and signatures unchanged. Every method is
        /// `unsafe`: callers must uphold the contracts documented in the JSC
        /// headers (valid, live handles from the same context group).
        #[allow(non_snake_case)]
        pub struct JscApi {
            _library: Library,
            $( $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?, )*
        }

        #[allow(non_snake_case)]
        impl JscApi {
            /// Resolve every entry point from an opened library.
            ///
            /// # Safety
            /// `library` must be a JavaScriptCore build whose exported
            /// symbols match the signatures in this table.
            pub(crate) unsafe fn resolve(library: Library) -> Result<Self, LoadError> {
                $(
                    let $name = unsafe {
                        *library
                            .get::<unsafe extern "C" fn($($ty),*) $(-> $ret)?>(
                                concat!(stringify!($name), "\0").as_bytes(),
                            )
                            .map_err(|source| LoadError::MissingSymbol {
                                symbol: stringify!($name),
                                source,
                            })?
                    };
                )*
                Ok(Self { _library: library, $($name,)* })
            }

            /// Names of every symbol in the table, in declaration order
            pub const SYMBOLS: &'static [&'static str] = &[$(stringify!($name)),*];

            $(
                $(#[$meta])*
                #[inline]
                pub unsafe fn $name(&self, $($arg: $ty),*) $(-> $ret)? {
                    unsafe { (self.$name)($($arg),*) }
                }
            )*
        }
    };
}

jsc_api! {
    // JSBase.h
    fn JSEvaluateScript(
        ctx: JSContextRef,
        script: JSStringRef,
        this_object: JSObjectRef,
        source_url: JSStringRef,
        starting_line_number: c_int,
        exception: *mut JSValueRef,
    ) -> JSValueRef;
    fn JSCheckScriptSyntax(
        ctx: JSContextRef,
        script: JSStringRef,
        source_url: JSStringRef,
        starting_line_number: c_int,
        exception: *mut JSValueRef,
    ) -> bool;
    fn JSGarbageCollect(ctx: JSContextRef);

    // JSContextRef.h
    fn JSContextGroupCreate() -> JSContextGroupRef;
    fn JSContextGroupRetain(group: JSContextGroupRef) -> JSContextGroupRef;
    fn JSContextGroupRelease(group: JSContextGroupRef);
    fn JSGlobalContextCreate(global_object_class: JSClassRef) -> JSGlobalContextRef;
    fn JSGlobalContextCreateInGroup(
        group: JSContextGroupRef,
        global_object_class: JSClassRef,
    ) -> JSGlobalContextRef;
    fn JSGlobalContextRetain(ctx: JSGlobalContextRef) -> JSGlobalContextRef;
    fn JSGlobalContextRelease(ctx: JSGlobalContextRef);
    fn JSContextGetGlobalObject(ctx: JSContextRef) -> JSObjectRef;
    fn JSContextGetGroup(ctx: JSContextRef) -> JSContextGroupRef;

    // JSStringRef.h
    fn JSStringCreateWithCharacters(chars: *const JSChar, num_chars: usize) -> JSStringRef;
    fn JSStringCreateWithUTF8CString(string: *const c_char) -> JSStringRef;
    fn JSStringRetain(string: JSStringRef) -> JSStringRef;
    fn JSStringRelease(string: JSStringRef);
    fn JSStringGetLength(string: JSStringRef) -> usize;
    fn JSStringGetCharactersPtr(string: JSStringRef) -> *const JSChar;
    fn JSStringGetMaximumUTF8CStringSize(string: JSStringRef) -> usize;
    /// Returns the number of bytes written, including the terminating NUL
    fn JSStringGetUTF8CString(string: JSStringRef, buffer: *mut c_char, buffer_size: usize) -> usize;
    fn JSStringIsEqual(a: JSStringRef, b: JSStringRef) -> bool;
    fn JSStringIsEqualToUTF8CString(a: JSStringRef, b: *const c_char) -> bool;

    // JSValueRef.h
    fn JSValueGetType(ctx: JSContextRef, value: JSValueRef) -> JSType;
    fn JSValueIsUndefined(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueIsNull(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueIsBoolean(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueIsNumber(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueIsString(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueIsObject(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueIsObjectOfClass(ctx: JSContextRef, value: JSValueRef, class: JSClassRef) -> bool;
    fn JSValueIsArray(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueIsEqual(
        ctx: JSContextRef,
        a: JSValueRef,
        b: JSValueRef,
        exception: *mut JSValueRef,
    ) -> bool;
    fn JSValueIsStrictEqual(ctx: JSContextRef, a: JSValueRef, b: JSValueRef) -> bool;
    fn JSValueIsInstanceOfConstructor(
        ctx: JSContextRef,
        value: JSValueRef,
        constructor: JSObjectRef,
        exception: *mut JSValueRef,
    ) -> bool;
    fn JSValueMakeUndefined(ctx: JSContextRef) -> JSValueRef;
    fn JSValueMakeNull(ctx: JSContextRef) -> JSValueRef;
    fn JSValueMakeBoolean(ctx: JSContextRef, boolean: bool) -> JSValueRef;
    fn JSValueMakeNumber(ctx: JSContextRef, number: f64) -> JSValueRef;
    fn JSValueMakeString(ctx: JSContextRef, string: JSStringRef) -> JSValueRef;
    /// Returns null when the input is not valid JSON
    fn JSValueMakeFromJSONString(ctx: JSContextRef, string: JSStringRef) -> JSValueRef;
    fn JSValueCreateJSONString(
        ctx: JSContextRef,
        value: JSValueRef,
        indent: c_uint,
        exception: *mut JSValueRef,
    ) -> JSStringRef;
    fn JSValueToBoolean(ctx: JSContextRef, value: JSValueRef) -> bool;
    fn JSValueToNumber(ctx: JSContextRef, value: JSValueRef, exception: *mut JSValueRef) -> f64;
    fn JSValueToStringCopy(
        ctx: JSContextRef,
        value: JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSStringRef;
    fn JSValueToObject(
        ctx: JSContextRef,
        value: JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSObjectRef;
    fn JSValueProtect(ctx: JSContextRef, value: JSValueRef);
    fn JSValueUnprotect(ctx: JSContextRef, value: JSValueRef);

    // JSObjectRef.h
    fn JSClassCreate(definition: *const JSClassDefinition) -> JSClassRef;
    fn JSClassRetain(class: JSClassRef) -> JSClassRef;
    fn JSClassRelease(class: JSClassRef);
    fn JSObjectMake(ctx: JSContextRef, class: JSClassRef, data: *mut c_void) -> JSObjectRef;
    fn JSObjectMakeFunctionWithCallback(
        ctx: JSContextRef,
        name: JSStringRef,
        call_as_function: JSObjectCallAsFunctionCallback,
    ) -> JSObjectRef;
    fn JSObjectMakeConstructor(
        ctx: JSContextRef,
        class: JSClassRef,
        call_as_constructor: JSObjectCallAsConstructorCallback,
    ) -> JSObjectRef;
    fn JSObjectMakeFunction(
        ctx: JSContextRef,
        name: JSStringRef,
        parameter_count: c_uint,
        parameter_names: *const JSStringRef,
        body: JSStringRef,
        source_url: JSStringRef,
        starting_line_number: c_int,
        exception: *mut JSValueRef,
    ) -> JSObjectRef;
    fn JSObjectMakeArray(
        ctx: JSContextRef,
        argument_count: usize,
        arguments: *const JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSObjectRef;
    fn JSObjectMakeError(
        ctx: JSContextRef,
        argument_count: usize,
        arguments: *const JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSObjectRef;
    fn JSObjectGetPrototype(ctx: JSContextRef, object: JSObjectRef) -> JSValueRef;
    fn JSObjectSetPrototype(ctx: JSContextRef, object: JSObjectRef, value: JSValueRef);
    fn JSObjectHasProperty(ctx: JSContextRef, object: JSObjectRef, name: JSStringRef) -> bool;
    fn JSObjectGetProperty(
        ctx: JSContextRef,
        object: JSObjectRef,
        name: JSStringRef,
        exception: *mut JSValueRef,
    ) -> JSValueRef;
    fn JSObjectSetProperty(
        ctx: JSContextRef,
        object: JSObjectRef,
        name: JSStringRef,
        value: JSValueRef,
        attributes: JSPropertyAttributes,
        exception: *mut JSValueRef,
    );
    fn JSObjectDeleteProperty(
        ctx: JSContextRef,
        object: JSObjectRef,
        name: JSStringRef,
        exception: *mut JSValueRef,
    ) -> bool;
    fn JSObjectGetPropertyAtIndex(
        ctx: JSContextRef,
        object: JSObjectRef,
        index: c_uint,
        exception: *mut JSValueRef,
    ) -> JSValueRef;
    fn JSObjectSetPropertyAtIndex(
        ctx: JSContextRef,
        object: JSObjectRef,
        index: c_uint,
        value: JSValueRef,
        exception: *mut JSValueRef,
    );
    fn JSObjectGetPrivate(object: JSObjectRef) -> *mut c_void;
    /// Only objects created from a class with private storage accept data
    fn JSObjectSetPrivate(object: JSObjectRef, data: *mut c_void) -> bool;
    fn JSObjectIsFunction(ctx: JSContextRef, object: JSObjectRef) -> bool;
    fn JSObjectCallAsFunction(
        ctx: JSContextRef,
        object: JSObjectRef,
        this_object: JSObjectRef,
        argument_count: usize,
        arguments: *const JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSValueRef;
    fn JSObjectIsConstructor(ctx: JSContextRef, object: JSObjectRef) -> bool;
    fn JSObjectCallAsConstructor(
        ctx: JSContextRef,
        object: JSObjectRef,
        argument_count: usize,
        arguments: *const JSValueRef,
        exception: *mut JSValueRef,
    ) -> JSObjectRef;
    fn JSObjectCopyPropertyNames(ctx: JSContextRef, object: JSObjectRef) -> JSPropertyNameArrayRef;
    fn JSPropertyNameArrayRetain(array: JSPropertyNameArrayRef) -> JSPropertyNameArrayRef;
    fn JSPropertyNameArrayRelease(array: JSPropertyNameArrayRef);
    fn JSPropertyNameArrayGetCount(array: JSPropertyNameArrayRef) -> usize;
    fn JSPropertyNameArrayGetNameAtIndex(array: JSPropertyNameArrayRef, index: usize) -> JSStringRef;
    fn JSPropertyNameAccumulatorAddName(accumulator: JSPropertyNameAccumulatorRef, name: JSStringRef);
}

impl fmt::Debug for JscApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JscApi")
            .field("symbols", &Self::SYMBOLS.len())
            .finish_non_exhaustive()
    }
}
