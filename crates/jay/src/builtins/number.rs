//! The Number constructor and Number.prototype (ES5 15.7).

use crate::{
    builtins::{BuiltinId, DescKind, NumberConst, PropDesc, error, routine_value},
    context::Context,
    convert,
    exception::JsResult,
    heap::ResourceTracker,
    intern::Magic,
    object::{InternalKey, ObjectType, PropAttrs},
    value::{self, Value},
};

const TO_STRING: u8 = 1;
const VALUE_OF: u8 = 2;

pub(super) static CONSTRUCTOR_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
    PropDesc::new(
        Magic::Prototype,
        DescKind::Object,
        PropAttrs::FIXED,
        BuiltinId::NumberPrototype as u16,
    ),
    PropDesc::new(
        Magic::MaxValue,
        DescKind::Number,
        PropAttrs::FIXED,
        NumberConst::MaxValue as u16,
    ),
    PropDesc::new(
        Magic::MinValue,
        DescKind::Number,
        PropAttrs::FIXED,
        NumberConst::MinValue as u16,
    ),
    PropDesc::new(Magic::NanName, DescKind::Number, PropAttrs::FIXED, NumberConst::NaN as u16),
    PropDesc::new(
        Magic::PositiveInfinity,
        DescKind::Number,
        PropAttrs::FIXED,
        NumberConst::PositiveInfinity as u16,
    ),
    PropDesc::new(
        Magic::NegativeInfinity,
        DescKind::Number,
        PropAttrs::FIXED,
        NumberConst::NegativeInfinity as u16,
    ),
];

pub(super) static PROTOTYPE_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(
        Magic::Constructor,
        DescKind::Object,
        PropAttrs::WRITABLE_CONFIGURABLE,
        BuiltinId::NumberConstructor as u16,
    ),
    PropDesc::new(
        Magic::ToString,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(TO_STRING, 1),
    ),
    PropDesc::new(
        Magic::ValueOf,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(VALUE_OF, 0),
    ),
];

pub(super) fn dispatch_call(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    match args.first() {
        Some(arg) => {
            let x = convert::to_number(ctx, arg)?;
            convert::make_number(ctx, x)
        }
        None => Ok(Value::Int(0)),
    }
}

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
    let primitive = this_number_value(ctx, this)?;
    match routine_id {
        TO_STRING => {
            let radix_arg = args.first().unwrap_or(&Value::Undefined);
            let radix = if radix_arg.is_undefined() {
                10
            } else {
                convert::to_number(ctx, radix_arg)? as i32
            };
            if radix == 10 {
                return convert::make_string(ctx, value::number_to_string(primitive));
            }
            if !(2..=36).contains(&radix) {
                return Err(error::range_error(ctx, "radix must be between 2 and 36"));
            }
            convert::make_string(ctx, integer_to_radix_string(primitive, radix as u32))
        }
        VALUE_OF => convert::make_number(ctx, primitive),
        _ => Err(error::type_error(ctx, "unknown Number routine")),
    }
}

fn this_number_value(ctx: &mut Context<impl ResourceTracker>, this: &Value) -> JsResult<f64> {
    if let Some(x) = this.as_number(&ctx.heap) {
        return Ok(x);
    }
    if let Some(obj) = this.object_ref(&ctx.heap) {
        if ctx.heap.object(obj).type_tag == ObjectType::NumberWrapper {
            let primitive = ctx.heap.object(obj).find_internal(InternalKey::PrimitiveValue);
            if let Some(x) = primitive.and_then(|p| p.as_number(&ctx.heap)) {
                return Ok(x);
            }
        }
    }
    Err(error::type_error(ctx, "Number method called on incompatible receiver"))
}

/// Non-decimal radix conversion; fractional digits are truncated, which
/// covers the integer cases the standard library users rely on.
fn integer_to_radix_string(x: f64, radix: u32) -> String {
    if x.is_nan() {
        return "NaN".to_owned();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() };
    }
    let negative = x < 0.0;
    let mut magnitude = x.abs().trunc() as u64;
    let mut digits = Vec::new();
    loop {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).expect("digit in radix range"));
        magnitude /= u64::from(radix);
        if magnitude == 0 {
            break;
        }
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix_conversion() {
        assert_eq!(integer_to_radix_string(255.0, 16), "ff");
        assert_eq!(integer_to_radix_string(-8.0, 2), "-1000");
        assert_eq!(integer_to_radix_string(0.0, 36), "0");
    }
}
