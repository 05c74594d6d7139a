//! Host closures callable from JavaScript
//!
//! A host function is an object of a private JSClass whose `callAsFunction`
//! (or `callAsConstructor`) hook is one of the trampolines below. The
//! object's private data names an entry in the owning context's
//! [`CallbackRegistry`]; the class finalizer retires that entry when the
//! object is collected.
//!
//! Finalizers run inside the garbage collector, where calling back into the
//! engine is not allowed. Retired closures are therefore parked and dropped
//! later, at the next evaluation, call or registration.

use nitro_jsc_sys::*;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

use crate::context::{ContextState, JscContext};
use crate::error::{JscError, JscResult};
use crate::marshal::Value;
use crate::object::{JscObject, PropertyAttributes};
use crate::string::JscString;
use crate::value::JscValue;

/// Signature of a host function: `(context, callee, this, arguments)`
pub type HostFunction =
    dyn Fn(&JscContext, &JscObject, Option<&JscObject>, &[Value]) -> JscResult<Value>;

/// Signature of a host constructor: `(context, constructor, arguments)`
pub type HostConstructor = dyn Fn(&JscContext, &JscObject, &[Value]) -> JscResult<JscObject>;

#[derive(Clone)]
enum Callback {
    Function(Rc<HostFunction>),
    Constructor(Rc<HostConstructor>),
}

/// Closures kept alive on behalf of JavaScript objects
///
/// No borrow is held while a closure runs, so callbacks may register more
/// callbacks or evaluate script.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    next_id: Cell<u64>,
    entries: RefCell<HashMap<u64, Callback>>,
    retired: RefCell<Vec<Callback>>,
}

impl CallbackRegistry {
    fn insert(&self, callback: Callback) -> u64 {
        self.drain_retired();
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().insert(id, callback);
        id
    }

    fn get(&self, id: u64) -> Option<Callback> {
        self.entries.borrow().get(&id).cloned()
    }

    fn remove(&self, id: u64) -> Option<Callback> {
        self.entries.borrow_mut().remove(&id)
    }

    /// Move an entry to the retired list without dropping it
    fn retire(&self, id: u64) {
        let (Ok(mut entries), Ok(mut retired)) =
            (self.entries.try_borrow_mut(), self.retired.try_borrow_mut())
        else {
            return;
        };
        if let Some(callback) = entries.remove(&id) {
            retired.push(callback);
        }
    }

    /// Drop closures whose objects have been finalized
    pub(crate) fn drain_retired(&self) {
        let retired = match self.retired.try_borrow_mut() {
            Ok(mut retired) => std::mem::take(&mut *retired),
            Err(_) => return,
        };
        if !retired.is_empty() {
            debug!(count = retired.len(), "dropping finalized host callbacks");
        }
        drop(retired);
    }

    pub(crate) fn clear(&self) {
        let entries = self.entries.take();
        let retired = self.retired.take();
        drop(entries);
        drop(retired);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Private data of a host function object
struct CallbackSlot {
    id: u64,
    state: Weak<ContextState>,
}

/// Classes backing host functions and constructors
#[derive(Clone, Copy)]
pub(crate) struct HostClasses {
    function: JSClassRef,
    constructor: JSClassRef,
}

impl HostClasses {
    pub(crate) fn create(api: &JscApi) -> JscResult<Self> {
        let function_def = JSClassDefinition {
            class_name: c"HostFunction".as_ptr(),
            finalize: Some(finalize),
            call_as_function: Some(call_as_function),
            ..Default::default()
        };
        // SAFETY: the definition is fully initialized; JSC copies what it keeps
        let function = unsafe { api.JSClassCreate(&function_def) };
        if function.is_null() {
            return Err(JscError::null_pointer("JSClassCreate"));
        }

        let constructor_def = JSClassDefinition {
            class_name: c"HostConstructor".as_ptr(),
            finalize: Some(finalize),
            call_as_constructor: Some(call_as_constructor),
            has_instance: Some(has_instance),
            ..Default::default()
        };
        // SAFETY: as above
        let constructor = unsafe { api.JSClassCreate(&constructor_def) };
        if constructor.is_null() {
            // SAFETY: function was created above and is released once
            unsafe { api.JSClassRelease(function) };
            return Err(JscError::null_pointer("JSClassCreate"));
        }

        Ok(Self {
            function,
            constructor,
        })
    }

    pub(crate) fn release(self, api: &JscApi) {
        // SAFETY: both classes were created in create() and are released once
        unsafe {
            api.JSClassRelease(self.function);
            api.JSClassRelease(self.constructor);
        }
    }
}

impl JscContext {
    /// Create a JS function that calls `f`
    ///
    /// The function gets `name` as its `name` property and
    /// `Function.prototype` as its prototype, so `call`/`apply`/`bind` work.
    /// An `Err` returned by `f` (or a panic) is thrown into JavaScript: a
    /// [`JscError::Exception`] rethrows the original value, anything else
    /// becomes an `Error` with the error's message.
    pub fn make_function_with_callback<F>(&self, name: &str, f: F) -> JscResult<JscObject>
    where
        F: Fn(&JscContext, &JscObject, Option<&JscObject>, &[Value]) -> JscResult<Value> + 'static,
    {
        let function = self.make_host_object(Callback::Function(Rc::new(f)), |c| c.function)?;
        // Set before the prototype: Function.prototype.name is read-only
        function.set_property(
            "name",
            &self.string(name)?,
            PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_ENUM,
        )?;
        function.set_prototype(&self.function_prototype()?)?;
        Ok(function)
    }

    /// Create a JS constructor that calls `f` for `new`
    ///
    /// The constructor has a fresh `prototype` object and supports
    /// `instanceof` against it. `f` decides which object `new` returns.
    pub fn make_constructor_with_callback<F>(&self, f: F) -> JscResult<JscObject>
    where
        F: Fn(&JscContext, &JscObject, &[Value]) -> JscResult<JscObject> + 'static,
    {
        let constructor =
            self.make_host_object(Callback::Constructor(Rc::new(f)), |c| c.constructor)?;
        let prototype = self.object()?;
        prototype.set_property(
            "constructor",
            &constructor.to_value(),
            PropertyAttributes::DONT_ENUM,
        )?;
        constructor.set_property(
            "prototype",
            &prototype.to_value(),
            PropertyAttributes::DONT_ENUM | PropertyAttributes::DONT_DELETE,
        )?;
        constructor.set_prototype(&self.function_prototype()?)?;
        Ok(constructor)
    }

    fn function_prototype(&self) -> JscResult<JscValue> {
        self.get_global("Function")?
            .to_object()?
            .get_property("prototype")
    }

    fn make_host_object(
        &self,
        callback: Callback,
        class: impl FnOnce(HostClasses) -> JSClassRef,
    ) -> JscResult<JscObject> {
        let state = self.state();
        let ctx = state.raw()?;
        let class = class(state.host_classes()?);

        let id = state.callbacks.insert(callback);
        let slot = Box::into_raw(Box::new(CallbackSlot {
            id,
            state: Rc::downgrade(state),
        }));
        // SAFETY: ctx and class are live; the finalizer takes the slot back
        let object = unsafe { state.api.JSObjectMake(ctx, class, slot.cast()) };
        if object.is_null() {
            // SAFETY: the engine did not take the slot
            drop(unsafe { Box::from_raw(slot) });
            state.callbacks.remove(id);
            return Err(JscError::null_pointer("JSObjectMake"));
        }
        debug!(id, "registered host callback");
        // SAFETY: object was produced by this context
        unsafe { JscObject::wrap(state, object, "JSObjectMake") }
    }
}

/// Resolve the state and closure behind a host object
unsafe fn lookup(object: JSObjectRef) -> JscResult<(Rc<ContextState>, Callback)> {
    let api = nitro_jsc_sys::api()?;
    // SAFETY: object is a host object handed to a class hook
    let slot = unsafe { api.JSObjectGetPrivate(object) } as *const CallbackSlot;
    if slot.is_null() {
        return Err(JscError::null_pointer("JSObjectGetPrivate"));
    }
    // SAFETY: the slot lives until the object's finalizer runs
    let slot = unsafe { &*slot };
    let state = slot.state.upgrade().ok_or_else(JscError::released)?;
    state.raw()?;
    let callback = state
        .callbacks
        .get(slot.id)
        .ok_or_else(|| JscError::internal(format!("host callback {} is not registered", slot.id)))?;
    Ok((state, callback))
}

unsafe fn host_arguments(
    state: &Rc<ContextState>,
    count: usize,
    arguments: *const JSValueRef,
) -> JscResult<Vec<Value>> {
    if count == 0 || arguments.is_null() {
        return Ok(Vec::new());
    }
    // SAFETY: the engine passes `count` valid values
    let raw = unsafe { std::slice::from_raw_parts(arguments, count) };
    raw.iter()
        // SAFETY: each argument is a live value of the calling context
        .map(|&value| unsafe { JscValue::wrap(state, value, "argument") }?.to_host())
        .collect()
}

unsafe fn dispatch_function(
    function: JSObjectRef,
    this_object: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
) -> JscResult<JSValueRef> {
    // SAFETY: forwarded from the trampoline
    let (state, callback) = unsafe { lookup(function)? };
    let Callback::Function(callback) = callback else {
        return Err(JscError::internal("host function slot holds a constructor"));
    };

    let context = JscContext::from_state(Rc::clone(&state));
    // SAFETY: handles come straight from the engine
    let (function, this, args) = unsafe {
        let function = JscObject::wrap(&state, function, "callee")?;
        let this = if this_object.is_null() {
            None
        } else {
            Some(JscObject::wrap(&state, this_object, "this")?)
        };
        (function, this, host_arguments(&state, argument_count, arguments)?)
    };

    let result = callback(&context, &function, this.as_ref(), &args)
        .map_err(|err| rethrowable(&state, err))?
        .to_js(&context)?;
    Ok(result.raw())
}

unsafe fn dispatch_constructor(
    constructor: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
) -> JscResult<JSObjectRef> {
    // SAFETY: forwarded from the trampoline
    let (state, callback) = unsafe { lookup(constructor)? };
    let Callback::Constructor(callback) = callback else {
        return Err(JscError::internal("host constructor slot holds a function"));
    };

    let context = JscContext::from_state(Rc::clone(&state));
    // SAFETY: handles come straight from the engine
    let (constructor, args) = unsafe {
        (
            JscObject::wrap(&state, constructor, "constructor")?,
            host_arguments(&state, argument_count, arguments)?,
        )
    };

    let object = callback(&context, &constructor, &args).map_err(|err| rethrowable(&state, err))?;
    object.as_value().check_owner(&state)?;
    Ok(object.raw())
}

unsafe extern "C" fn call_as_function(
    ctx: JSContextRef,
    function: JSObjectRef,
    this_object: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
    exception: *mut JSValueRef,
) -> JSValueRef {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the engine passes valid handles
        unsafe { dispatch_function(function, this_object, argument_count, arguments) }
    }));
    // SAFETY: ctx and exception come from the engine
    unsafe { complete(ctx, outcome, exception) }
}

unsafe extern "C" fn call_as_constructor(
    ctx: JSContextRef,
    constructor: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
    exception: *mut JSValueRef,
) -> JSObjectRef {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the engine passes valid handles
        unsafe { dispatch_constructor(constructor, argument_count, arguments) }
    }));
    // SAFETY: ctx and exception come from the engine
    unsafe { complete(ctx, outcome, exception) }
}

/// Ordinary `instanceof`: walk the prototype chain looking for `C.prototype`
unsafe extern "C" fn has_instance(
    ctx: JSContextRef,
    constructor: JSObjectRef,
    possible_instance: JSValueRef,
    exception: *mut JSValueRef,
) -> bool {
    let Ok(api) = nitro_jsc_sys::api() else {
        return false;
    };
    let Ok(name) = JscString::with_api(api, "prototype") else {
        return false;
    };
    // SAFETY: all handles come from the engine
    unsafe {
        if !api.JSValueIsObject(ctx, possible_instance) {
            return false;
        }
        let prototype = api.JSObjectGetProperty(ctx, constructor, name.raw(), exception);
        if (!exception.is_null() && !(*exception).is_null())
            || !api.JSValueIsObject(ctx, prototype)
        {
            return false;
        }
        let mut current = api.JSObjectGetPrototype(ctx, possible_instance as JSObjectRef);
        while api.JSValueIsObject(ctx, current) {
            if api.JSValueIsStrictEqual(ctx, current, prototype) {
                return true;
            }
            current = api.JSObjectGetPrototype(ctx, current as JSObjectRef);
        }
        false
    }
}

unsafe extern "C" fn finalize(object: JSObjectRef) {
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        let Ok(api) = nitro_jsc_sys::api() else {
            return;
        };
        // SAFETY: private data is readable during finalization
        let slot = unsafe { api.JSObjectGetPrivate(object) } as *mut CallbackSlot;
        if slot.is_null() {
            return;
        }
        // SAFETY: the slot was leaked by make_host_object and is reclaimed once
        let slot = unsafe { Box::from_raw(slot) };
        if let Some(state) = slot.state.upgrade() {
            state.callbacks.retire(slot.id);
        }
    }));
}

/// Exceptions from another context are rethrown here by message only
fn rethrowable(state: &Rc<ContextState>, err: JscError) -> JscError {
    match err {
        JscError::Exception(exception) if exception.value().check_owner(state).is_err() => {
            JscError::internal(exception.to_string())
        }
        other => other,
    }
}

/// Return the result, or throw the error into JavaScript and return null
unsafe fn complete(
    ctx: JSContextRef,
    outcome: std::thread::Result<JscResult<JSValueRef>>,
    exception: *mut JSValueRef,
) -> JSValueRef {
    let err = match outcome {
        Ok(Ok(value)) => return value,
        Ok(Err(err)) => err,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(%message, "host callback panicked");
            JscError::internal(format!("host callback panicked: {message}"))
        }
    };
    if exception.is_null() {
        return ptr::null_mut();
    }
    let Ok(api) = nitro_jsc_sys::api() else {
        return ptr::null_mut();
    };
    let thrown = match &err {
        JscError::Exception(exception) => exception.value().raw(),
        // SAFETY: ctx comes from the engine
        other => unsafe { make_error(api, ctx, &other.to_string()) },
    };
    // SAFETY: exception is a valid out-parameter
    unsafe { *exception = thrown };
    ptr::null_mut()
}

unsafe fn make_error(api: &'static JscApi, ctx: JSContextRef, message: &str) -> JSValueRef {
    let Ok(message) = JscString::with_api(api, message) else {
        return ptr::null_mut();
    };
    // SAFETY: ctx comes from the engine, message is live
    unsafe {
        let message = api.JSValueMakeString(ctx, message.raw());
        let args = [message];
        let mut exception: JSValueRef = ptr::null_mut();
        let error = api.JSObjectMakeError(ctx, args.len(), args.as_ptr(), &mut exception);
        if error.is_null() { message } else { error }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
