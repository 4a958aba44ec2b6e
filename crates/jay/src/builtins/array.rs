//! The Array constructor and Array.prototype (ES5 15.4).
//!
//! Arrays keep their elements as ordinary index-named properties; `length`
//! is a writable data property maintained by the property store's array
//! hooks. The prototype methods below are the generic ES5 algorithms over
//! `length` and indexed gets.

use crate::{
    builtins::{BuiltinId, DescKind, PropDesc, error, get_builtin, routine_value},
    context::Context,
    convert,
    exception::JsResult,
    heap::{HeapRef, ResourceTracker},
    intern::Magic,
    object::{self, ObjectType, PropAttrs, PropertySlot},
    value::{Value, strict_equals},
};

const IS_ARRAY: u8 = 1;
const PUSH: u8 = 2;
const POP: u8 = 3;
const JOIN: u8 = 4;
const INDEX_OF: u8 = 5;
const TO_STRING: u8 = 6;
const CONCAT: u8 = 7;

pub(super) static CONSTRUCTOR_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
    PropDesc::new(
        Magic::Prototype,
        DescKind::Object,
        PropAttrs::FIXED,
        BuiltinId::ArrayPrototype as u16,
    ),
    PropDesc::new(
        Magic::IsArray,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(IS_ARRAY, 1),
    ),
];

pub(super) static PROTOTYPE_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(
        Magic::Constructor,
        DescKind::Object,
        PropAttrs::WRITABLE_CONFIGURABLE,
        BuiltinId::ArrayConstructor as u16,
    ),
    PropDesc::new(
        Magic::Push,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(PUSH, 1),
    ),
    PropDesc::new(
        Magic::Pop,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(POP, 0),
    ),
    PropDesc::new(
        Magic::Join,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(JOIN, 1),
    ),
    PropDesc::new(
        Magic::IndexOf,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(INDEX_OF, 1),
    ),
    PropDesc::new(
        Magic::ToString,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(TO_STRING, 0),
    ),
    PropDesc::new(
        Magic::Concat,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(CONCAT, 1),
    ),
];

/// Creates an array object with the given initial length.
pub(crate) fn create_array(ctx: &mut Context<impl ResourceTracker>, length: u32) -> JsResult<HeapRef> {
    let prototype = get_builtin(ctx, BuiltinId::ArrayPrototype)?;
    let array = object::create_object(ctx, Some(prototype), true, ObjectType::Array)?;
    let length_value = convert::make_number(ctx, f64::from(length))?;
    ctx.heap.object_mut(array).append_slot(PropertySlot::Data {
        name: Magic::Length.id(),
        attrs: PropAttrs::WRITABLE,
        value: length_value,
    });
    Ok(array)
}

/// `Array(...)` and `new Array(...)` (15.4.1, 15.4.2).
pub(super) fn dispatch_call(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    if args.len() == 1 {
        if let Some(x) = args[0].as_number(&ctx.heap) {
            let length = x as u32;
            if f64::from(length) != x {
                return Err(error::range_error(ctx, "invalid array length"));
            }
            return Ok(Value::Ref(create_array(ctx, length)?));
        }
    }
    let array = create_array(ctx, 0)?;
    for (index, arg) in args.iter().enumerate() {
        let name = ctx.interns.intern_index(index as u32);
        let value = arg.copy(&ctx.heap);
        object::put(ctx, array, name, value, false)?;
    }
    Ok(Value::Ref(array))
}

pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    match routine_id {
        IS_ARRAY => {
            let is_array = this_or_arg_is_array(ctx, args.first().unwrap_or(&Value::Undefined));
            Ok(Value::Bool(is_array))
        }
        PUSH => {
            let obj = convert::to_object(ctx, this)?;
            let mut length = length_of(ctx, obj)?;
            for arg in args {
                let name = ctx.interns.intern_index(length);
                let value = arg.copy(&ctx.heap);
                object::put(ctx, obj, name, value, false)?;
                length += 1;
            }
            set_length(ctx, obj, length)?;
            ctx.heap.dec_ref(obj);
            convert::make_number(ctx, f64::from(length))
        }
        POP => {
            let obj = convert::to_object(ctx, this)?;
            let length = length_of(ctx, obj)?;
            if length == 0 {
                set_length(ctx, obj, 0)?;
                ctx.heap.dec_ref(obj);
                return Ok(Value::Undefined);
            }
            let name = ctx.interns.intern_index(length - 1);
            let element = object::get(ctx, obj, name)?;
            object::delete(ctx, obj, name, false)?;
            set_length(ctx, obj, length - 1)?;
            ctx.heap.dec_ref(obj);
            Ok(element)
        }
        JOIN | TO_STRING => {
            let separator = match args.first() {
                Some(sep) if routine_id == JOIN && !sep.is_undefined() => convert::to_string_owned(ctx, sep)?,
                _ => ",".to_owned(),
            };
            let obj = convert::to_object(ctx, this)?;
            let length = length_of(ctx, obj)?;
            let mut joined = String::new();
            for index in 0..length {
                if index > 0 {
                    joined.push_str(&separator);
                }
                let name = ctx.interns.intern_index(index);
                let element = object::get(ctx, obj, name)?;
                if !element.is_undefined() && !element.is_null() {
                    let piece = convert::to_string_owned(ctx, &element);
                    element.free(&mut ctx.heap);
                    joined.push_str(&piece?);
                } else {
                    element.free(&mut ctx.heap);
                }
            }
            ctx.heap.dec_ref(obj);
            convert::make_string(ctx, joined)
        }
        INDEX_OF => {
            let target = args.first().unwrap_or(&Value::Undefined);
            let obj = convert::to_object(ctx, this)?;
            let length = length_of(ctx, obj)?;
            let mut found: i32 = -1;
            for index in 0..length {
                let name = ctx.interns.intern_index(index);
                let element = object::get(ctx, obj, name)?;
                let matches = strict_equals(&ctx.heap, &ctx.interns, &element, target);
                element.free(&mut ctx.heap);
                if matches {
                    found = index as i32;
                    break;
                }
            }
            ctx.heap.dec_ref(obj);
            Ok(Value::Int(found))
        }
        CONCAT => {
            let result = create_array(ctx, 0)?;
            let mut next = 0u32;
            let this_obj = convert::to_object(ctx, this)?;
            append_concat_element(ctx, result, &mut next, &Value::Ref(this_obj))?;
            ctx.heap.dec_ref(this_obj);
            for arg in args {
                append_concat_element(ctx, result, &mut next, arg)?;
            }
            set_length(ctx, result, next)?;
            Ok(Value::Ref(result))
        }
        _ => Err(error::type_error(ctx, "unknown Array routine")),
    }
}

fn this_or_arg_is_array(ctx: &Context<impl ResourceTracker>, value: &Value) -> bool {
    value
        .object_ref(&ctx.heap)
        .is_some_and(|obj| ctx.heap.object(obj).type_tag == ObjectType::Array)
}

fn length_of(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef) -> JsResult<u32> {
    let length_value = object::get(ctx, obj, Magic::Length.id())?;
    let length = convert::to_number(ctx, &length_value)?;
    length_value.free(&mut ctx.heap);
    Ok(crate::value::to_uint32(length))
}

fn set_length(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef, length: u32) -> JsResult<()> {
    let value = convert::make_number(ctx, f64::from(length))?;
    object::put(ctx, obj, Magic::Length.id(), value, false)?;
    Ok(())
}

/// One step of concat: arrays are flattened one level, everything else is
/// appended as-is (15.4.4.4).
fn append_concat_element(
    ctx: &mut Context<impl ResourceTracker>,
    result: HeapRef,
    next: &mut u32,
    element: &Value,
) -> JsResult<()> {
    if this_or_arg_is_array(ctx, element) {
        let array = element.object_ref(&ctx.heap).expect("checked above");
        let length = length_of(ctx, array)?;
        for index in 0..length {
            let name = ctx.interns.intern_index(index);
            let item = object::get(ctx, array, name)?;
            let target_name = ctx.interns.intern_index(*next);
            object::put(ctx, result, target_name, item, false)?;
            *next += 1;
        }
    } else {
        let name = ctx.interns.intern_index(*next);
        let copy = element.copy(&ctx.heap);
        object::put(ctx, result, name, copy, false)?;
        *next += 1;
    }
    Ok(())
}
