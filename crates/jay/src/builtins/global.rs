//! The global object (ES5 15.1).
//!
//! Value properties, the global routines, and one lazily materialised entry
//! per standard constructor. The table is the single source of truth for
//! what the global object exposes; nothing is installed eagerly.

use crate::{
    builtins::{BuiltinId, DescKind, NumberConst, PropDesc, error, routine_value},
    compiler,
    context::Context,
    convert,
    exception::JsResult,
    heap::ResourceTracker,
    intern::Magic,
    object::PropAttrs,
    value::Value,
    vm,
};

const EVAL: u8 = 1;
const IS_NAN: u8 = 2;
const IS_FINITE: u8 = 3;
const PARSE_INT: u8 = 4;
const PARSE_FLOAT: u8 = 5;

const fn ctor(name: Magic, id: BuiltinId) -> PropDesc {
    PropDesc::new(name, DescKind::Object, PropAttrs::WRITABLE_CONFIGURABLE, id as u16)
}

pub(super) static PROPERTIES: &[PropDesc] = &[
    // 15.1.1 value properties
    PropDesc::new(Magic::NanName, DescKind::Number, PropAttrs::FIXED, NumberConst::NaN as u16),
    PropDesc::new(
        Magic::InfinityName,
        DescKind::Number,
        PropAttrs::FIXED,
        NumberConst::PositiveInfinity as u16,
    ),
    PropDesc::new(Magic::Undefined, DescKind::Simple, PropAttrs::FIXED, 0),
    // 15.1.2 function properties
    PropDesc::new(
        Magic::Eval,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(EVAL, 1),
    ),
    PropDesc::new(
        Magic::IsNaN,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(IS_NAN, 1),
    ),
    PropDesc::new(
        Magic::IsFinite,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(IS_FINITE, 1),
    ),
    PropDesc::new(
        Magic::ParseInt,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(PARSE_INT, 2),
    ),
    PropDesc::new(
        Magic::ParseFloat,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(PARSE_FLOAT, 1),
    ),
    // 15.1.4 constructor properties
    ctor(Magic::ObjectName, BuiltinId::ObjectConstructor),
    ctor(Magic::FunctionName, BuiltinId::FunctionConstructor),
    ctor(Magic::ArrayName, BuiltinId::ArrayConstructor),
    ctor(Magic::StringName, BuiltinId::StringConstructor),
    ctor(Magic::BooleanName, BuiltinId::BooleanConstructor),
    ctor(Magic::NumberName, BuiltinId::NumberConstructor),
    ctor(Magic::MathName, BuiltinId::Math),
    ctor(Magic::ErrorName, BuiltinId::ErrorConstructor),
    ctor(Magic::TypeErrorName, BuiltinId::TypeErrorConstructor),
    ctor(Magic::ReferenceErrorName, BuiltinId::ReferenceErrorConstructor),
    ctor(Magic::SyntaxErrorName, BuiltinId::SyntaxErrorConstructor),
    ctor(Magic::RangeErrorName, BuiltinId::RangeErrorConstructor),
    ctor(Magic::EvalErrorName, BuiltinId::EvalErrorConstructor),
    ctor(Magic::UriErrorName, BuiltinId::UriErrorConstructor),
];

pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    _this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    let arg = args.first().unwrap_or(&Value::Undefined);
    match routine_id {
        EVAL => indirect_eval(ctx, arg),
        IS_NAN => {
            let x = convert::to_number(ctx, arg)?;
            Ok(Value::Bool(x.is_nan()))
        }
        IS_FINITE => {
            let x = convert::to_number(ctx, arg)?;
            Ok(Value::Bool(x.is_finite()))
        }
        PARSE_INT => {
            let input = convert::to_string_owned(ctx, arg)?;
            let radix_value = args.get(1).unwrap_or(&Value::Undefined);
            let radix = convert::to_number(ctx, radix_value)? as i32;
            convert::make_number(ctx, parse_int(&input, radix))
        }
        PARSE_FLOAT => {
            let input = convert::to_string_owned(ctx, arg)?;
            convert::make_number(ctx, parse_float(&input))
        }
        _ => Err(error::type_error(ctx, "unknown global routine")),
    }
}

/// Indirect eval (15.1.2.1.1): non-string arguments pass through; strings
/// are compiled as eval code and run against the global environment.
fn indirect_eval(ctx: &mut Context<impl ResourceTracker>, arg: &Value) -> JsResult<Value> {
    let Some(source) = arg.as_str(&ctx.heap, &ctx.interns).map(ToOwned::to_owned) else {
        return Ok(arg.copy(&ctx.heap));
    };
    let code = match compiler::compile(ctx, &source, compiler::CompileKind::Eval { strict: false }) {
        Ok(code) => code,
        Err(parse_error) => return Err(error::syntax_error(ctx, parse_error.kind.message())),
    };
    let global = ctx.global_object()?;
    let env = ctx.global_environment()?;
    let this = Value::Ref(global);
    let result = vm::run(ctx, code, &this, env, &[]);
    ctx.code.code_deref(code);
    result
}

/// parseInt (15.1.2.2), simplified over the standard grammar.
fn parse_int(input: &str, radix: i32) -> f64 {
    let trimmed = input.trim_start_matches(|c: char| c.is_whitespace());
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let mut radix = if radix == 0 { 10 } else { radix };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut rest = rest;
    if (radix == 16 || radix == 10) && (rest.starts_with("0x") || rest.starts_with("0X")) {
        rest = &rest[2..];
        radix = 16;
    }
    let mut value = 0.0_f64;
    let mut seen = false;
    for c in rest.chars() {
        match c.to_digit(radix as u32) {
            Some(digit) => {
                value = value * f64::from(radix) + f64::from(digit);
                seen = true;
            }
            None => break,
        }
    }
    if seen { sign * value } else { f64::NAN }
}

/// parseFloat (15.1.2.3): longest leading decimal literal prefix.
fn parse_float(input: &str) -> f64 {
    let trimmed = input.trim_start_matches(|c: char| c.is_whitespace());
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let b = bytes[end];
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => {
                seen_exp = true;
                seen_digit = false;
            }
            _ => break,
        }
        end += 1;
    }
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    while end > 0 && !bytes[end - 1].is_ascii_digit() && bytes[end - 1] != b'.' {
        end -= 1;
    }
    trimmed[..end].parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_handles_radix_and_prefixes() {
        assert_eq!(parse_int("42", 0), 42.0);
        assert_eq!(parse_int("  -10", 0), -10.0);
        assert_eq!(parse_int("0x1f", 0), 31.0);
        assert_eq!(parse_int("101", 2), 5.0);
        assert_eq!(parse_int("12px", 0), 12.0);
        assert!(parse_int("px", 0).is_nan());
        assert!(parse_int("1", 1).is_nan());
    }

    #[test]
    fn parse_float_takes_the_longest_prefix() {
        assert_eq!(parse_float("3.25let"), 3.25);
        assert_eq!(parse_float("  1e3"), 1000.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float("x").is_nan());
        assert_eq!(parse_float("1e"), 1.0);
    }
}
