//! Abstract conversion operations (ES5 chapter 9).
//!
//! `to_primitive` implements [[DefaultValue]] (8.12.8) over the object
//! model; the numeric and string conversions bottom out in the pure helpers
//! of `value.rs`.

use crate::{
    builtins::{self, BuiltinId, error},
    context::Context,
    exception::JsResult,
    function,
    heap::{HeapData, HeapRef, ResourceTracker},
    intern::Magic,
    object::{self, InternalKey, ObjectType, PropAttrs, PropDescriptor},
    value::{self, Value},
};

/// Preferred type of a `to_primitive` conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hint {
    /// No hint; ES5 treats it as Number for every object the core builds.
    Default,
    Number,
    String,
}

/// ToPrimitive (9.1) / [[DefaultValue]] (8.12.8).
///
/// Returns an owned value. Non-objects pass through with a fresh reference.
pub(crate) fn to_primitive(ctx: &mut Context<impl ResourceTracker>, input: &Value, hint: Hint) -> JsResult<Value> {
    let Some(obj) = input.object_ref(&ctx.heap) else {
        return Ok(input.copy(&ctx.heap));
    };
    let method_order = if matches!(hint, Hint::String) {
        [Magic::ToString, Magic::ValueOf]
    } else {
        [Magic::ValueOf, Magic::ToString]
    };
    for method_name in method_order {
        let method = object::get(ctx, obj, method_name.id())?;
        if let Some(func) = method.object_ref(&ctx.heap) {
            if function::is_callable_object(ctx, func) {
                let result = function::call(ctx, func, input, &[]);
                method.free(&mut ctx.heap);
                let result = result?;
                if result.object_ref(&ctx.heap).is_none() {
                    return Ok(result);
                }
                result.free(&mut ctx.heap);
                continue;
            }
        }
        method.free(&mut ctx.heap);
    }
    Err(error::type_error(ctx, "cannot convert object to primitive value"))
}

/// ToNumber (9.3).
pub(crate) fn to_number(ctx: &mut Context<impl ResourceTracker>, input: &Value) -> JsResult<f64> {
    match input {
        Value::Undefined | Value::Empty => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Ok(f64::from(*i)),
        Value::Str(s) => Ok(value::string_to_number(ctx.interns.get(*s))),
        Value::Ref(r) => match ctx.heap.get(*r) {
            HeapData::Number(x) => Ok(*x),
            HeapData::Str(s) => Ok(value::string_to_number(s)),
            _ => {
                let primitive = to_primitive(ctx, input, Hint::Number)?;
                let result = to_number(ctx, &primitive);
                primitive.free(&mut ctx.heap);
                result
            }
        },
    }
}

/// ToString (9.8), producing an owned string value.
pub(crate) fn to_string_value(ctx: &mut Context<impl ResourceTracker>, input: &Value) -> JsResult<Value> {
    match input {
        Value::Undefined | Value::Empty => Ok(Value::Str(Magic::Undefined.id())),
        Value::Null => Ok(Value::Str(ctx.interns.intern("null"))),
        Value::Bool(b) => Ok(Value::Str(ctx.interns.intern(if *b { "true" } else { "false" }))),
        Value::Int(i) => {
            let s = value::number_to_string(f64::from(*i));
            make_string(ctx, s)
        }
        Value::Str(s) => Ok(Value::Str(*s)),
        Value::Ref(r) => match ctx.heap.get(*r) {
            HeapData::Number(x) => {
                let s = value::number_to_string(*x);
                make_string(ctx, s)
            }
            HeapData::Str(_) => Ok(input.copy(&ctx.heap)),
            _ => {
                let primitive = to_primitive(ctx, input, Hint::String)?;
                let result = to_string_value(ctx, &primitive);
                primitive.free(&mut ctx.heap);
                result
            }
        },
    }
}

/// ToString into an owned Rust `String`.
pub(crate) fn to_string_owned(ctx: &mut Context<impl ResourceTracker>, input: &Value) -> JsResult<String> {
    let string_value = to_string_value(ctx, input)?;
    let owned = string_value
        .as_str(&ctx.heap, &ctx.interns)
        .expect("to_string_value yields a string")
        .to_owned();
    string_value.free(&mut ctx.heap);
    Ok(owned)
}

/// ToObject (9.9). The returned reference is owned by the caller.
pub(crate) fn to_object(ctx: &mut Context<impl ResourceTracker>, input: &Value) -> JsResult<HeapRef> {
    match input {
        Value::Undefined | Value::Null | Value::Empty => {
            Err(error::type_error(ctx, "cannot convert undefined or null to object"))
        }
        Value::Bool(b) => {
            let proto = builtins::get_builtin(ctx, BuiltinId::BooleanPrototype)?;
            let wrapper = object::create_object(ctx, Some(proto), true, ObjectType::BooleanWrapper)?;
            object::set_internal(ctx, wrapper, InternalKey::PrimitiveValue, Value::Bool(*b));
            Ok(wrapper)
        }
        Value::Int(_) => {
            let proto = builtins::get_builtin(ctx, BuiltinId::NumberPrototype)?;
            let wrapper = object::create_object(ctx, Some(proto), true, ObjectType::NumberWrapper)?;
            let primitive = input.copy(&ctx.heap);
            object::set_internal(ctx, wrapper, InternalKey::PrimitiveValue, primitive);
            Ok(wrapper)
        }
        Value::Str(_) => create_string_wrapper(ctx, input),
        Value::Ref(r) => match ctx.heap.get(*r) {
            HeapData::Object(_) => {
                ctx.heap.inc_ref(*r);
                Ok(*r)
            }
            HeapData::Number(_) => {
                let proto = builtins::get_builtin(ctx, BuiltinId::NumberPrototype)?;
                let wrapper = object::create_object(ctx, Some(proto), true, ObjectType::NumberWrapper)?;
                let primitive = input.copy(&ctx.heap);
                object::set_internal(ctx, wrapper, InternalKey::PrimitiveValue, primitive);
                Ok(wrapper)
            }
            HeapData::Str(_) => create_string_wrapper(ctx, input),
            HeapData::List(_) => Err(error::type_error(ctx, "cannot convert value to object")),
        },
    }
}

/// Builds a String wrapper. `length` is installed eagerly because wrapper
/// lengths are per-instance values, unlike the table-driven built-ins.
fn create_string_wrapper(ctx: &mut Context<impl ResourceTracker>, input: &Value) -> JsResult<HeapRef> {
    let char_count = input
        .as_str(&ctx.heap, &ctx.interns)
        .expect("string wrapper needs a string")
        .chars()
        .count();
    let proto = builtins::get_builtin(ctx, BuiltinId::StringPrototype)?;
    let wrapper = object::create_object(ctx, Some(proto), true, ObjectType::StringWrapper)?;
    let primitive = input.copy(&ctx.heap);
    object::set_internal(ctx, wrapper, InternalKey::PrimitiveValue, primitive);
    let length = i32::try_from(char_count).unwrap_or(i32::MAX);
    let desc = PropDescriptor::data(Value::Int(length), PropAttrs::FIXED);
    object::define_own_property(ctx, wrapper, Magic::Length.id(), desc, false)?;
    Ok(wrapper)
}

/// `typeof` (11.4.3).
pub(crate) fn typeof_of(ctx: &Context<impl ResourceTracker>, input: &Value) -> &'static str {
    match input {
        Value::Undefined | Value::Empty => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "number",
        Value::Str(_) => "string",
        Value::Ref(r) => match ctx.heap.get(*r) {
            HeapData::Number(_) => "number",
            HeapData::Str(_) => "string",
            HeapData::Object(object) => match object.type_tag {
                ObjectType::Function
                | ObjectType::BoundFunction
                | ObjectType::BuiltinFunction
                | ObjectType::ExternalFunction => "function",
                _ => "object",
            },
            HeapData::List(_) => "object",
        },
    }
}

/// Boxes an owned Rust string, interning nothing.
pub(crate) fn make_string(ctx: &mut Context<impl ResourceTracker>, s: String) -> JsResult<Value> {
    match Value::make_string(&mut ctx.heap, s) {
        Ok(value) => Ok(value),
        Err(_) => Err(error::range_error(ctx, "allocation failed")),
    }
}

/// Boxes a number, using the small-int path where possible.
pub(crate) fn make_number(ctx: &mut Context<impl ResourceTracker>, x: f64) -> JsResult<Value> {
    match Value::make_number(&mut ctx.heap, x) {
        Ok(value) => Ok(value),
        Err(_) => Err(error::range_error(ctx, "allocation failed")),
    }
}
