//! Host representation of JavaScript values
//!
//! [`Value`] mirrors the engine's type tags: conversion from a [`JscValue`]
//! matches on [`JsType`] once instead of probing each `JSValueIs*`
//! predicate. Objects and symbols stay engine handles.

use crate::context::JscContext;
use crate::error::{JscError, JscResult};
use crate::object::JscObject;
use crate::value::{JsType, JscValue};

/// A JavaScript value on the host side
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(JscObject),
    /// Symbols have no host equivalent and stay opaque
    Symbol(JscValue),
}

/// The `undefined` sentinel
pub const UNDEFINED: Value = Value::Undefined;

impl Value {
    /// The `typeof`-style name of the variant
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Symbol(_) => "symbol",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JscObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<JscObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The number, or a type error naming what was found
    pub fn expect_number(&self) -> JscResult<f64> {
        self.as_number()
            .ok_or_else(|| JscError::type_error("number", self.type_name()))
    }

    /// The object, or a type error naming what was found
    pub fn expect_object(&self) -> JscResult<&JscObject> {
        self.as_object()
            .ok_or_else(|| JscError::type_error("object", self.type_name()))
    }

    /// Convert into an engine value of `ctx`
    ///
    /// Objects and symbols must be live handles of `ctx`; others fail with
    /// `Released` or `TypeError`.
    pub fn to_js(&self, ctx: &JscContext) -> JscResult<JscValue> {
        match self {
            Self::Undefined => ctx.undefined(),
            Self::Null => ctx.null(),
            Self::Boolean(b) => ctx.boolean(*b),
            Self::Number(n) => ctx.number(*n),
            Self::String(s) => ctx.string(s),
            Self::Object(o) => {
                o.as_value().check_owner(ctx.state())?;
                Ok(o.to_value())
            }
            Self::Symbol(s) => {
                s.check_owner(ctx.state())?;
                Ok(s.clone())
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.same_object(b),
            (Self::Symbol(a), Self::Symbol(b)) => a.raw() == b.raw(),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<JscObject> for Value {
    fn from(o: JscObject) -> Self {
        Self::Object(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl JscValue {
    /// Convert to the host representation, dispatching on the type tag
    pub fn to_host(&self) -> JscResult<Value> {
        Ok(match self.js_type() {
            JsType::Undefined => Value::Undefined,
            JsType::Null => Value::Null,
            JsType::Boolean => Value::Boolean(self.to_bool()?),
            JsType::Number => Value::Number(self.to_number()?),
            JsType::String => Value::String(self.to_string()?),
            JsType::Object => Value::Object(JscObject::from_value(self.clone())),
            JsType::Symbol => Value::Symbol(self.clone()),
            JsType::BigInt => {
                return Err(JscError::type_error("value with a host representation", "bigint"));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> Option<JscContext> {
        JscContext::new().ok()
    }

    #[test]
    fn test_literals_to_host() {
        let Some(ctx) = test_context() else { return };
        let eval = |src: &str| ctx.eval(src).unwrap().to_host().unwrap();
        assert_eq!(eval("undefined"), UNDEFINED);
        assert_eq!(eval("null"), Value::Null);
        assert_eq!(eval("true"), Value::Boolean(true));
        assert_eq!(eval("false"), Value::Boolean(false));
        assert_eq!(eval("1"), Value::Number(1.0));
        assert_eq!(eval("1.5"), Value::Number(1.5));
        assert_eq!(eval("'abc'"), Value::from("abc"));
    }

    #[test]
    fn test_object_to_host() {
        let Some(ctx) = test_context() else { return };
        let value = ctx.eval("({x: 1, y: 2})").unwrap().to_host().unwrap();
        let obj = value.expect_object().unwrap();
        assert_eq!(obj.get("x").unwrap(), Value::Number(1.0));
        assert_eq!(obj.get("y").unwrap(), Value::Number(2.0));
        assert_eq!(obj.property_names().unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_symbol_stays_opaque() {
        let Some(ctx) = test_context() else { return };
        let value = ctx.eval("Symbol('tag')").unwrap().to_host().unwrap();
        assert_eq!(value.type_name(), "symbol");
        let back = value.to_js(&ctx).unwrap();
        assert!(back.is_symbol());
        ctx.set_global("sym", &back).unwrap();
        assert!(ctx.eval("typeof sym === 'symbol'").unwrap().to_bool().unwrap());
    }

    #[test]
    fn test_host_to_js() {
        let Some(ctx) = test_context() else { return };
        let cases = [
            (Value::Undefined, "undefined"),
            (Value::Null, "object"),
            (Value::from(true), "boolean"),
            (Value::from(2.5), "number"),
            (Value::from("s"), "string"),
        ];
        for (value, expected) in cases {
            ctx.set_global("v", &value.to_js(&ctx).unwrap()).unwrap();
            let typeof_v = ctx.eval("typeof v").unwrap().to_string().unwrap();
            assert_eq!(typeof_v, expected);
        }
    }

    #[test]
    fn test_object_identity_round_trip() {
        let Some(ctx) = test_context() else { return };
        let obj = ctx.object().unwrap();
        let value = Value::from(obj.clone());
        let back = value.to_js(&ctx).unwrap().to_host().unwrap();
        assert_eq!(back, Value::Object(obj));
    }

    #[test]
    fn test_option_maps_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Number(3.0));
        assert_eq!(Value::from(Some("x")).as_str(), Some("x"));
    }

    #[test]
    fn test_type_errors() {
        let err = Value::from("x").expect_number().unwrap_err();
        assert!(matches!(err, JscError::TypeError { .. }));
        assert!(Value::Null.expect_object().is_err());
    }
}
