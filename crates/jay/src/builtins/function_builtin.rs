//! The Function constructor and Function.prototype (ES5 15.3).
//!
//! Function.prototype is itself a callable built-in accepting any arguments
//! and returning undefined; its call slot lives in the registry dispatcher.
//! Compiling function bodies from strings is not supported: the constructor
//! raises a SyntaxError (recorded as a design decision).

use smallvec::SmallVec;

use crate::{
    builtins::{BuiltinId, DescKind, PropDesc, error, routine_value},
    context::Context,
    convert,
    exception::JsResult,
    function,
    heap::ResourceTracker,
    intern::Magic,
    object::{self, PropAttrs},
    value::Value,
};

const CALL: u8 = 1;
const APPLY: u8 = 2;
const BIND: u8 = 3;
const TO_STRING: u8 = 4;

pub(super) static CONSTRUCTOR_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
    PropDesc::new(
        Magic::Prototype,
        DescKind::Object,
        PropAttrs::FIXED,
        BuiltinId::FunctionPrototype as u16,
    ),
];

pub(super) static PROTOTYPE_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(
        Magic::Constructor,
        DescKind::Object,
        PropAttrs::WRITABLE_CONFIGURABLE,
        BuiltinId::FunctionConstructor as u16,
    ),
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 0),
    PropDesc::new(
        Magic::Call,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(CALL, 1),
    ),
    PropDesc::new(
        Magic::Apply,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(APPLY, 2),
    ),
    PropDesc::new(
        Magic::Bind,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(BIND, 1),
    ),
    PropDesc::new(
        Magic::ToString,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(TO_STRING, 0),
    ),
];

pub(super) fn dispatch_call(ctx: &mut Context<impl ResourceTracker>, _args: &[Value]) -> JsResult<Value> {
    Err(error::syntax_error(ctx, "the Function constructor is not supported"))
}

pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    match routine_id {
        CALL => {
            let Some(func) = callable_this(ctx, this) else {
                return Err(error::type_error(ctx, "Function.prototype.call called on non-function"));
            };
            let call_this = args.first().unwrap_or(&Value::Undefined);
            function::call(ctx, func, call_this, args.get(1..).unwrap_or(&[]))
        }
        APPLY => {
            let Some(func) = callable_this(ctx, this) else {
                return Err(error::type_error(ctx, "Function.prototype.apply called on non-function"));
            };
            let call_this = args.first().unwrap_or(&Value::Undefined).copy(&ctx.heap);
            let arg_array = args.get(1).unwrap_or(&Value::Undefined);
            let collected = collect_apply_arguments(ctx, arg_array)?;
            let result = function::call(ctx, func, &call_this, &collected);
            for value in collected {
                value.free(&mut ctx.heap);
            }
            call_this.free(&mut ctx.heap);
            result
        }
        BIND => {
            let Some(target) = callable_this(ctx, this) else {
                return Err(error::type_error(ctx, "Function.prototype.bind called on non-function"));
            };
            let bound_this = args.first().unwrap_or(&Value::Undefined).copy(&ctx.heap);
            let bound = function::create_bound_function(ctx, target, bound_this, args.get(1..).unwrap_or(&[]))?;
            Ok(Value::Ref(bound))
        }
        TO_STRING => {
            if callable_this(ctx, this).is_none() {
                return Err(error::type_error(ctx, "Function.prototype.toString called on non-function"));
            }
            convert::make_string(ctx, "function () { [native code] }".to_owned())
        }
        _ => Err(error::type_error(ctx, "unknown Function routine")),
    }
}

fn callable_this(ctx: &Context<impl ResourceTracker>, this: &Value) -> Option<crate::heap::HeapRef> {
    this.object_ref(&ctx.heap)
        .filter(|obj| function::is_callable_object(ctx, *obj))
}

/// CreateListFromArrayLike for apply (15.3.4.3 steps 2-3).
fn collect_apply_arguments(
    ctx: &mut Context<impl ResourceTracker>,
    arg_array: &Value,
) -> JsResult<SmallVec<[Value; 8]>> {
    let mut collected: SmallVec<[Value; 8]> = SmallVec::new();
    match arg_array {
        Value::Undefined | Value::Null => Ok(collected),
        _ => {
            let Some(array) = arg_array.object_ref(&ctx.heap) else {
                return Err(error::type_error(ctx, "apply argument list is not an object"));
            };
            let length_value = object::get(ctx, array, Magic::Length.id())?;
            let length = convert::to_number(ctx, &length_value)? as u32;
            length_value.free(&mut ctx.heap);
            for index in 0..length {
                let name = ctx.interns.intern_index(index);
                let element = object::get(ctx, array, name);
                match element {
                    Ok(element) => collected.push(element),
                    Err(thrown) => {
                        for value in collected {
                            value.free(&mut ctx.heap);
                        }
                        return Err(thrown);
                    }
                }
            }
            Ok(collected)
        }
    }
}
