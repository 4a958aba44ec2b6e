//! The Boolean constructor and Boolean.prototype (ES5 15.6).

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

const TO_STRING: u8 = 1;
const VALUE_OF: u8 = 2;

pub(super) static CONSTRUCTOR_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
    PropDesc::new(
        Magic::Prototype,
        DescKind::Object,
        PropAttrs::FIXED,
        BuiltinId::BooleanPrototype as u16,
    ),
];

pub(super) static PROTOTYPE_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(
        Magic::Constructor,
        DescKind::Object,
        PropAttrs::WRITABLE_CONFIGURABLE,
        BuiltinId::BooleanConstructor as u16,
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
];

pub(super) fn dispatch_call(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    let truthy = args
        .first()
        .is_some_and(|arg| arg.to_boolean(&ctx.heap, &ctx.interns));
    Ok(Value::Bool(truthy))
}

pub(super) fn dispatch_construct(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    let primitive = dispatch_call(ctx, args)?;
    let wrapper = convert::to_object(ctx, &primitive)?;
    Ok(Value::Ref(wrapper))
}

pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    this: &Value,
    _args: &[Value],
) -> JsResult<Value> {
    let primitive = this_boolean_value(ctx, this)?;
    match routine_id {
        TO_STRING => Ok(Value::Str(ctx.interns.intern(if primitive { "true" } else { "false" }))),
        VALUE_OF => Ok(Value::Bool(primitive)),
        _ => Err(error::type_error(ctx, "unknown Boolean routine")),
    }
}

fn this_boolean_value(ctx: &mut Context<impl ResourceTracker>, this: &Value) -> JsResult<bool> {
    if let Value::Bool(b) = this {
        return Ok(*b);
    }
    if let Some(obj) = this.object_ref(&ctx.heap) {
        if ctx.heap.object(obj).type_tag == ObjectType::BooleanWrapper {
            if let Some(Value::Bool(b)) = ctx.heap.object(obj).find_internal(InternalKey::PrimitiveValue) {
                return Ok(*b);
            }
        }
    }
    Err(error::type_error(ctx, "Boolean method called on incompatible receiver"))
}
