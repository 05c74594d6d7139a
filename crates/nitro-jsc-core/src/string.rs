//! RAII wrapper for JSC strings

use nitro_jsc_sys::*;
use std::ffi::{CString, c_char};
use std::fmt;
use std::marker::PhantomData;

use crate::error::{JscError, JscResult};

/// RAII wrapper for JSStringRef with automatic release
///
/// Strings are not tied to a context. The handle is released exactly once,
/// when the wrapper is dropped; cloning retains it.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because JSC strings should not be
/// shared across threads.
pub struct JscString {
    api: &'static JscApi,
    raw: JSStringRef,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl JscString {
    /// Create a new JSC string from a Rust string
    ///
    /// Loads the library on first use.
    pub fn new(s: &str) -> JscResult<Self> {
        Self::with_api(nitro_jsc_sys::api()?, s)
    }

    /// Create a string using an already loaded function table
    ///
    /// Built from UTF-16 code units, so embedded NULs survive.
    pub fn with_api(api: &'static JscApi, s: &str) -> JscResult<Self> {
        let units: Vec<JSChar> = s.encode_utf16().collect();
        // SAFETY: units is a valid buffer of units.len() UTF-16 code units
        let raw = unsafe { api.JSStringCreateWithCharacters(units.as_ptr(), units.len()) };
        if raw.is_null() {
            return Err(JscError::null_pointer("JSStringCreateWithCharacters"));
        }
        Ok(Self {
            api,
            raw,
            _not_send: PhantomData,
        })
    }

    /// Adopt a handle the caller owns (from a `Create`/`Copy` call)
    ///
    /// # Safety
    /// `raw` must be a valid JSStringRef whose reference the caller
    /// transfers; it is released when the wrapper drops.
    pub unsafe fn from_raw_owned(api: &'static JscApi, raw: JSStringRef) -> JscResult<Self> {
        if raw.is_null() {
            return Err(JscError::null_pointer("JSStringRef"));
        }
        Ok(Self {
            api,
            raw,
            _not_send: PhantomData,
        })
    }

    /// Retain a handle the caller does not own
    ///
    /// # Safety
    /// `raw` must be a valid JSStringRef.
    pub unsafe fn from_raw_borrowed(api: &'static JscApi, raw: JSStringRef) -> JscResult<Self> {
        if raw.is_null() {
            return Err(JscError::null_pointer("JSStringRef"));
        }
        // SAFETY: raw is valid per caller contract
        let raw = unsafe { api.JSStringRetain(raw) };
        Ok(Self {
            api,
            raw,
            _not_send: PhantomData,
        })
    }

    /// Get the raw JSStringRef
    pub fn raw(&self) -> JSStringRef {
        self.raw
    }

    /// Convert to Rust String
    pub fn to_rust_string(&self) -> String {
        // SAFETY: self.raw is valid for the lifetime of self
        unsafe { js_string_to_rust(self.api, self.raw) }
    }

    /// Get the length in UTF-16 code units
    pub fn len(&self) -> usize {
        // SAFETY: self.raw is valid
        unsafe { self.api.JSStringGetLength(self.raw) }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The UTF-16 code units of the string
    pub fn to_utf16(&self) -> Vec<u16> {
        let len = self.len();
        // SAFETY: the characters pointer stays valid while self.raw is alive
        unsafe {
            let chars = self.api.JSStringGetCharactersPtr(self.raw);
            if chars.is_null() || len == 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(chars, len).to_vec()
        }
    }
}

impl Clone for JscString {
    fn clone(&self) -> Self {
        // SAFETY: self.raw is valid; the retained reference is owned by the clone
        let raw = unsafe { self.api.JSStringRetain(self.raw) };
        Self {
            api: self.api,
            raw,
            _not_send: PhantomData,
        }
    }
}

impl Drop for JscString {
    fn drop(&mut self) {
        // SAFETY: self.raw holds exactly one reference owned by this wrapper
        unsafe { self.api.JSStringRelease(self.raw) };
    }
}

impl PartialEq for JscString {
    fn eq(&self, other: &Self) -> bool {
        // SAFETY: both handles are valid
        unsafe { self.api.JSStringIsEqual(self.raw, other.raw) }
    }
}

impl Eq for JscString {}

impl PartialEq<str> for JscString {
    fn eq(&self, other: &str) -> bool {
        match CString::new(other) {
            // SAFETY: self.raw is valid, c_str is NUL-terminated
            Ok(c_str) => unsafe { self.api.JSStringIsEqualToUTF8CString(self.raw, c_str.as_ptr()) },
            // A C string cannot express embedded NULs, compare the code units instead
            Err(_) => self.to_utf16().into_iter().eq(other.encode_utf16()),
        }
    }
}

impl PartialEq<&str> for JscString {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Display for JscString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rust_string())
    }
}

impl fmt::Debug for JscString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JscString").field(&self.to_rust_string()).finish()
    }
}

/// Convert JSStringRef to Rust String
///
/// Sizes the buffer with `JSStringGetMaximumUTF8CStringSize` and copies with
/// `JSStringGetUTF8CString`; the string is not released.
///
/// # Safety
/// The js_str must be a valid JSStringRef or null
pub unsafe fn js_string_to_rust(api: &JscApi, js_str: JSStringRef) -> String {
    if js_str.is_null() {
        return String::new();
    }

    // SAFETY: js_str is valid per caller contract
    unsafe {
        let max_size = api.JSStringGetMaximumUTF8CStringSize(js_str);
        let mut buffer = vec![0u8; max_size];
        let actual_size =
            api.JSStringGetUTF8CString(js_str, buffer.as_mut_ptr() as *mut c_char, max_size);

        if actual_size > 0 {
            // actual_size includes null terminator
            buffer.truncate(actual_size - 1);
            String::from_utf8_lossy(&buffer).into_owned()
        } else {
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> Option<&'static JscApi> {
        nitro_jsc_sys::api().ok()
    }

    #[test]
    fn test_string_creation() {
        let Some(api) = api() else { return };
        let s = JscString::with_api(api, "hello").unwrap();
        assert_eq!(s.to_string(), "hello");
        assert_eq!(s.len(), 5);
        assert!(s == "hello");
    }

    #[test]
    fn test_empty_string() {
        let Some(api) = api() else { return };
        let s = JscString::with_api(api, "").unwrap();
        assert!(s.is_empty());
        assert_eq!(s.to_string(), "");
    }

    #[test]
    fn test_round_trip_preserves_text() {
        let Some(api) = api() else { return };
        for text in ["ascii", "naïve café", "日本語", "emoji 🦀 pair", "nul\0inside", ""] {
            let s = JscString::with_api(api, text).unwrap();
            assert_eq!(s.to_rust_string(), text);
        }
    }

    #[test]
    fn test_length_counts_utf16_units() {
        let Some(api) = api() else { return };
        let s = JscString::with_api(api, "🦀").unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.to_utf16(), "🦀".encode_utf16().collect::<Vec<_>>());
    }

    #[test]
    fn test_clone_retains() {
        let Some(api) = api() else { return };
        let a = JscString::with_api(api, "shared").unwrap();
        let b = a.clone();
        drop(a);
        assert_eq!(b.to_string(), "shared");
    }

    #[test]
    fn test_equality() {
        let Some(api) = api() else { return };
        let a = JscString::with_api(api, "same").unwrap();
        let b = JscString::with_api(api, "same").unwrap();
        let c = JscString::with_api(api, "other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a != "other");
        let nul = JscString::with_api(api, "a\0b").unwrap();
        assert!(nul == "a\0b");
    }
}
