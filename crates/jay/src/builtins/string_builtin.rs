//! The String constructor and String.prototype (ES5 15.5).
//!
//! Methods operate on Unicode scalar values, not UTF-16 code units; the
//! difference is only observable for astral-plane text and is accepted for
//! this engine's footprint.

use crate::{
    builtins::{BuiltinId, DescKind, PropDesc, error, routine_value},
    context::Context,
    convert,
    exception::JsResult,
    heap::ResourceTracker,
    intern::Magic,
    object::{InternalKey, ObjectType, PropAttrs},
    value::Value,
};

const FROM_CHAR_CODE: u8 = 1;
const TO_STRING: u8 = 2;
const VALUE_OF: u8 = 3;
const CHAR_AT: u8 = 4;
const CHAR_CODE_AT: u8 = 5;
const INDEX_OF: u8 = 6;
const SUBSTRING: u8 = 7;
const SLICE: u8 = 8;
const CONCAT: u8 = 9;

pub(super) static CONSTRUCTOR_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
    PropDesc::new(
        Magic::Prototype,
        DescKind::Object,
        PropAttrs::FIXED,
        BuiltinId::StringPrototype as u16,
    ),
    PropDesc::new(
        Magic::FromCharCode,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(FROM_CHAR_CODE, 1),
    ),
];

pub(super) static PROTOTYPE_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(
        Magic::Constructor,
        DescKind::Object,
        PropAttrs::WRITABLE_CONFIGURABLE,
        BuiltinId::StringConstructor as u16,
    ),
    PropDesc::new(
        Magic::ToString,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(TO_STRING, 0),
    ),
    PropDesc::new(
        Magic::ValueOf,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(VALUE_OF, 0),
    ),
    PropDesc::new(
        Magic::CharAt,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(CHAR_AT, 1),
    ),
    PropDesc::new(
        Magic::CharCodeAt,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(CHAR_CODE_AT, 1),
    ),
    PropDesc::new(
        Magic::IndexOf,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(INDEX_OF, 1),
    ),
    PropDesc::new(
        Magic::Substring,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(SUBSTRING, 2),
    ),
    PropDesc::new(
        Magic::Slice,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(SLICE, 2),
    ),
    PropDesc::new(
        Magic::Concat,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(CONCAT, 1),
    ),
];

/// `String(value)` (15.5.1.1).
pub(super) fn dispatch_call(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    match args.first() {
        Some(arg) => convert::to_string_value(ctx, arg),
        None => Ok(Value::Str(Magic::Empty.id())),
    }
}

/// `new String(value)` (15.5.2.1): a wrapper object.
pub(super) fn dispatch_construct(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    let primitive = dispatch_call(ctx, args)?;
    let wrapper = convert::to_object(ctx, &primitive);
    primitive.free(&mut ctx.heap);
    Ok(Value::Ref(wrapper?))
}

pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    if routine_id == FROM_CHAR_CODE {
        let mut built = String::with_capacity(args.len());
        for arg in args {
            let code = convert::to_number(ctx, arg)? as u32 & 0xFFFF;
            built.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
        }
        return convert::make_string(ctx, built);
    }

    let this_string = this_string_value(ctx, this)?;
    let arg = args.first().unwrap_or(&Value::Undefined);
    match routine_id {
        TO_STRING | VALUE_OF => convert::make_string(ctx, this_string),
        CHAR_AT => {
            let position = convert::to_number(ctx, arg)? as i64;
            let result = if position >= 0 {
                this_string.chars().nth(position as usize).map(String::from)
            } else {
                None
            };
            convert::make_string(ctx, result.unwrap_or_default())
        }
        CHAR_CODE_AT => {
            let position = convert::to_number(ctx, arg)? as i64;
            let code = if position >= 0 {
                this_string.chars().nth(position as usize).map(|c| c as u32)
            } else {
                None
            };
            match code {
                Some(code) => convert::make_number(ctx, f64::from(code)),
                None => convert::make_number(ctx, f64::NAN),
            }
        }
        INDEX_OF => {
            let needle = convert::to_string_owned(ctx, arg)?;
            let found = this_string.find(&needle).map_or(-1, |byte_pos| {
                this_string[..byte_pos].chars().count() as i32
            });
            Ok(Value::Int(found))
        }
        SUBSTRING | SLICE => {
            let char_count = this_string.chars().count() as i64;
            let start_raw = convert::to_number(ctx, arg)?;
            let end_value = args.get(1).unwrap_or(&Value::Undefined);
            let end_raw = if end_value.is_undefined() {
                char_count as f64
            } else {
                convert::to_number(ctx, end_value)?
            };
            let (start, end) = if routine_id == SUBSTRING {
                let start = clamp_index(start_raw, char_count);
                let end = clamp_index(end_raw, char_count);
                (start.min(end), start.max(end))
            } else {
                let start = relative_index(start_raw, char_count);
                let end = relative_index(end_raw, char_count);
                (start, end.max(start))
            };
            let piece: String = this_string
                .chars()
                .skip(start as usize)
                .take((end - start) as usize)
                .collect();
            convert::make_string(ctx, piece)
        }
        CONCAT => {
            let mut built = this_string;
            for arg in args {
                built.push_str(&convert::to_string_owned(ctx, arg)?);
            }
            convert::make_string(ctx, built)
        }
        _ => Err(error::type_error(ctx, "unknown String routine")),
    }
}

/// Resolves the string behind `this`: a primitive string or a wrapper's
/// `[[PrimitiveValue]]`.
fn this_string_value(ctx: &mut Context<impl ResourceTracker>, this: &Value) -> JsResult<String> {
    if let Some(s) = this.as_str(&ctx.heap, &ctx.interns) {
        return Ok(s.to_owned());
    }
    if let Some(obj) = this.object_ref(&ctx.heap) {
        if ctx.heap.object(obj).type_tag == ObjectType::StringWrapper {
            let primitive = ctx.heap.object(obj).find_internal(InternalKey::PrimitiveValue);
            if let Some(s) = primitive.and_then(|p| p.as_str(&ctx.heap, &ctx.interns)) {
                return Ok(s.to_owned());
            }
        }
        // Generic object `this`: fall back to ToString.
        return convert::to_string_owned(ctx, this);
    }
    match this {
        Value::Undefined | Value::Null => Err(error::type_error(ctx, "String method called on null or undefined")),
        _ => convert::to_string_owned(ctx, this),
    }
}

/// substring index clamp: NaN maps to 0.
fn clamp_index(raw: f64, length: i64) -> i64 {
    if raw.is_nan() {
        0
    } else {
        (raw as i64).clamp(0, length)
    }
}

/// slice-style relative index: negatives count from the end.
fn relative_index(raw: f64, length: i64) -> i64 {
    if raw.is_nan() {
        return 0;
    }
    let index = raw as i64;
    if index < 0 { (length + index).max(0) } else { index.min(length) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_index_counts_from_the_end() {
        assert_eq!(relative_index(-2.0, 5), 3);
        assert_eq!(relative_index(-9.0, 5), 0);
        assert_eq!(relative_index(9.0, 5), 5);
        assert_eq!(relative_index(f64::NAN, 5), 0);
    }
}
