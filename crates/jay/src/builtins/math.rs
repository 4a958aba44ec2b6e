//! The Math object (ES5 15.8).

use crate::{
    builtins::{DescKind, NumberConst, PropDesc, error, routine_value},
    context::Context,
    convert,
    exception::JsResult,
    heap::ResourceTracker,
    intern::Magic,
    object::PropAttrs,
    value::Value,
};

const ABS: u8 = 1;
const FLOOR: u8 = 2;
const CEIL: u8 = 3;
const ROUND: u8 = 4;
const SQRT: u8 = 5;
const POW: u8 = 6;
const MIN: u8 = 7;
const MAX: u8 = 8;
const RANDOM: u8 = 9;

const fn constant(name: Magic, value: NumberConst) -> PropDesc {
    PropDesc::new(name, DescKind::Number, PropAttrs::FIXED, value as u16)
}

const fn function(name: Magic, id: u8, arity: u8) -> PropDesc {
    PropDesc::new(name, DescKind::Routine, PropAttrs::WRITABLE_CONFIGURABLE, routine_value(id, arity))
}

pub(super) static PROPERTIES: &[PropDesc] = &[
    constant(Magic::MathE, NumberConst::E),
    constant(Magic::Ln10, NumberConst::Ln10),
    constant(Magic::Ln2, NumberConst::Ln2),
    constant(Magic::Log2E, NumberConst::Log2E),
    constant(Magic::Log10E, NumberConst::Log10E),
    constant(Magic::Pi, NumberConst::Pi),
    constant(Magic::Sqrt1_2, NumberConst::Sqrt1_2),
    constant(Magic::Sqrt2, NumberConst::Sqrt2),
    function(Magic::Abs, ABS, 1),
    function(Magic::Floor, FLOOR, 1),
    function(Magic::Ceil, CEIL, 1),
    function(Magic::Round, ROUND, 1),
    function(Magic::Sqrt, SQRT, 1),
    function(Magic::Pow, POW, 2),
    function(Magic::Min, MIN, 2),
    function(Magic::Max, MAX, 2),
    function(Magic::Random, RANDOM, 0),
];

pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    _this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    if routine_id == RANDOM {
        let x = ctx.next_random();
        return convert::make_number(ctx, x);
    }
    if routine_id == MIN || routine_id == MAX {
        let seeking_min = routine_id == MIN;
        let mut best = if seeking_min { f64::INFINITY } else { f64::NEG_INFINITY };
        for arg in args {
            let x = convert::to_number(ctx, arg)?;
            if x.is_nan() {
                return convert::make_number(ctx, f64::NAN);
            }
            if (seeking_min && x < best) || (!seeking_min && x > best) {
                best = x;
            }
        }
        return convert::make_number(ctx, best);
    }

    let x = convert::to_number(ctx, args.first().unwrap_or(&Value::Undefined))?;
    let result = match routine_id {
        ABS => x.abs(),
        FLOOR => x.floor(),
        CEIL => x.ceil(),
        // ES round: halfway cases toward +Infinity, unlike f64::round.
        ROUND => (x + 0.5).floor(),
        SQRT => x.sqrt(),
        POW => {
            let y = convert::to_number(ctx, args.get(1).unwrap_or(&Value::Undefined))?;
            x.powf(y)
        }
        _ => return Err(error::type_error(ctx, "unknown Math routine")),
    };
    convert::make_number(ctx, result)
}

#[cfg(test)]
mod tests {
    #[test]
    fn es_round_prefers_positive_infinity_on_halfway() {
        // -0.5 rounds to -0 under (x + 0.5).floor(), 0.5 rounds to 1.
        assert_eq!((0.5_f64 + 0.5).floor(), 1.0);
        assert_eq!((-0.5_f64 + 0.5).floor(), 0.0);
        assert_eq!((2.5_f64 + 0.5).floor(), 3.0);
    }
}
