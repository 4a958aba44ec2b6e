//! The Object constructor and Object.prototype (ES5 15.2).

use crate::{
    builtins::{BuiltinId, DescKind, PropDesc, error, get_builtin, routine_value},
    context::Context,
    convert,
    exception::JsResult,
    function,
    heap::ResourceTracker,
    intern::Magic,
    object::{self, ObjectType, PropAttrs, PropDescriptor},
    value::Value,
};

const KEYS: u8 = 1;
const GET_PROTOTYPE_OF: u8 = 2;
const DEFINE_PROPERTY: u8 = 3;
const TO_STRING: u8 = 4;
const VALUE_OF: u8 = 5;
const HAS_OWN_PROPERTY: u8 = 6;
const IS_PROTOTYPE_OF: u8 = 7;
const GET_OWN_PROPERTY_DESCRIPTOR: u8 = 8;

pub(super) static CONSTRUCTOR_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
    PropDesc::new(
        Magic::Prototype,
        DescKind::Object,
        PropAttrs::FIXED,
        BuiltinId::ObjectPrototype as u16,
    ),
    PropDesc::new(
        Magic::Keys,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(KEYS, 1),
    ),
    PropDesc::new(
        Magic::GetPrototypeOf,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(GET_PROTOTYPE_OF, 1),
    ),
    PropDesc::new(
        Magic::DefineProperty,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(DEFINE_PROPERTY, 3),
    ),
    PropDesc::new(
        Magic::GetOwnPropertyDescriptor,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(GET_OWN_PROPERTY_DESCRIPTOR, 2),
    ),
];

pub(super) static PROTOTYPE_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(
        Magic::Constructor,
        DescKind::Object,
        PropAttrs::WRITABLE_CONFIGURABLE,
        BuiltinId::ObjectConstructor as u16,
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
        Magic::HasOwnProperty,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(HAS_OWN_PROPERTY, 1),
    ),
    PropDesc::new(
        Magic::IsPrototypeOf,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(IS_PROTOTYPE_OF, 1),
    ),
];

/// `Object(value)` (15.2.1.1).
pub(super) fn dispatch_call(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    match args.first() {
        None | Some(Value::Undefined | Value::Null) => {
            let prototype = get_builtin(ctx, BuiltinId::ObjectPrototype)?;
            let obj = object::create_object(ctx, Some(prototype), true, ObjectType::General)?;
            Ok(Value::Ref(obj))
        }
        Some(value) => Ok(Value::Ref(convert::to_object(ctx, value)?)),
    }
}

/// `new Object(value)` (15.2.2.1) behaves like the call form.
pub(super) fn dispatch_construct(ctx: &mut Context<impl ResourceTracker>, args: &[Value]) -> JsResult<Value> {
    dispatch_call(ctx, args)
}

pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    let arg = args.first().unwrap_or(&Value::Undefined);
    match routine_id {
        KEYS => {
            let Some(obj) = arg.object_ref(&ctx.heap) else {
                return Err(error::type_error(ctx, "Object.keys called on non-object"));
            };
            let names = object::own_property_names(ctx, obj, true)?;
            let result = super::array::create_array(ctx, 0)?;
            for (index, name) in names.into_iter().enumerate() {
                let index_name = ctx.interns.intern_index(index as u32);
                object::put(ctx, result, index_name, Value::Str(name), false)?;
            }
            Ok(Value::Ref(result))
        }
        GET_PROTOTYPE_OF => {
            let Some(obj) = arg.object_ref(&ctx.heap) else {
                return Err(error::type_error(ctx, "Object.getPrototypeOf called on non-object"));
            };
            match ctx.heap.object(obj).prototype {
                Some(proto) => {
                    ctx.heap.inc_ref(proto);
                    Ok(Value::Ref(proto))
                }
                None => Ok(Value::Null),
            }
        }
        DEFINE_PROPERTY => {
            let Some(obj) = arg.object_ref(&ctx.heap) else {
                return Err(error::type_error(ctx, "Object.defineProperty called on non-object"));
            };
            let name_arg = args.get(1).unwrap_or(&Value::Undefined);
            let name_string = convert::to_string_owned(ctx, name_arg)?;
            let name = ctx.interns.intern(&name_string);
            let desc_arg = args.get(2).unwrap_or(&Value::Undefined);
            let desc = to_property_descriptor(ctx, desc_arg)?;
            object::define_own_property(ctx, obj, name, desc, true)?;
            Ok(arg.copy(&ctx.heap))
        }
        GET_OWN_PROPERTY_DESCRIPTOR => {
            let Some(obj) = arg.object_ref(&ctx.heap) else {
                return Err(error::type_error(ctx, "called on non-object"));
            };
            let name_arg = args.get(1).unwrap_or(&Value::Undefined);
            let name_string = convert::to_string_owned(ctx, name_arg)?;
            let name = ctx.interns.intern(&name_string);
            from_property_descriptor(ctx, obj, name)
        }
        TO_STRING => {
            let class = match this.object_ref(&ctx.heap) {
                Some(obj) => match ctx.heap.object(obj).type_tag {
                    ObjectType::Array => "Array",
                    ObjectType::Function
                    | ObjectType::BoundFunction
                    | ObjectType::BuiltinFunction
                    | ObjectType::ExternalFunction => "Function",
                    ObjectType::Arguments => "Arguments",
                    ObjectType::StringWrapper => "String",
                    ObjectType::NumberWrapper => "Number",
                    ObjectType::BooleanWrapper => "Boolean",
                    _ => "Object",
                },
                None if this.is_undefined() => "Undefined",
                None if this.is_null() => "Null",
                None => "Object",
            };
            convert::make_string(ctx, format!("[object {class}]"))
        }
        VALUE_OF => {
            let obj = convert::to_object(ctx, this)?;
            Ok(Value::Ref(obj))
        }
        HAS_OWN_PROPERTY => {
            let name_string = convert::to_string_owned(ctx, arg)?;
            let name = ctx.interns.intern(&name_string);
            let obj = convert::to_object(ctx, this)?;
            let found = object::get_own_property(ctx, obj, name)?.is_some();
            ctx.heap.dec_ref(obj);
            Ok(Value::Bool(found))
        }
        IS_PROTOTYPE_OF => {
            let Some(target) = arg.object_ref(&ctx.heap) else {
                return Ok(Value::Bool(false));
            };
            let obj = convert::to_object(ctx, this)?;
            let mut walker = ctx.heap.object(target).prototype;
            let mut found = false;
            while let Some(current) = walker {
                if current == obj {
                    found = true;
                    break;
                }
                walker = ctx.heap.object(current).prototype;
            }
            ctx.heap.dec_ref(obj);
            Ok(Value::Bool(found))
        }
        _ => Err(error::type_error(ctx, "unknown Object routine")),
    }
}

/// ToPropertyDescriptor (ES5 8.10.5).
pub(crate) fn to_property_descriptor(
    ctx: &mut Context<impl ResourceTracker>,
    value: &Value,
) -> JsResult<PropDescriptor> {
    let Some(obj) = value.object_ref(&ctx.heap) else {
        return Err(error::type_error(ctx, "property descriptor must be an object"));
    };
    let mut desc = PropDescriptor::default();
    for (magic, field) in [
        (Magic::Enumerable, 0u8),
        (Magic::Configurable, 1),
        (Magic::Writable, 2),
    ] {
        if object::has_property(ctx, obj, magic.id())? {
            let raw = object::get(ctx, obj, magic.id())?;
            let flag = raw.to_boolean(&ctx.heap, &ctx.interns);
            raw.free(&mut ctx.heap);
            match field {
                0 => desc.enumerable = Some(flag),
                1 => desc.configurable = Some(flag),
                _ => desc.writable = Some(flag),
            }
        }
    }
    if object::has_property(ctx, obj, Magic::Value.id())? {
        desc.value = Some(object::get(ctx, obj, Magic::Value.id())?);
    }
    for (magic, is_getter) in [(Magic::Get, true), (Magic::Set, false)] {
        if object::has_property(ctx, obj, magic.id())? {
            let accessor = object::get(ctx, obj, magic.id())?;
            let slot = if accessor.is_undefined() {
                None
            } else if function::is_callable(ctx, &accessor) {
                accessor.object_ref(&ctx.heap)
            } else {
                accessor.free(&mut ctx.heap);
                desc.free(ctx);
                return Err(error::type_error(ctx, "getter/setter must be callable"));
            };
            // The descriptor view borrows the accessor; the source object
            // keeps it alive for the duration of the define call.
            accessor.free(&mut ctx.heap);
            if is_getter {
                desc.get = Some(slot);
            } else {
                desc.set = Some(slot);
            }
        }
    }
    if (desc.get.is_some() || desc.set.is_some()) && (desc.value.is_some() || desc.writable.is_some()) {
        desc.free(ctx);
        return Err(error::type_error(ctx, "descriptor cannot be both data and accessor"));
    }
    Ok(desc)
}

/// FromPropertyDescriptor (ES5 8.10.4), undefined when absent.
fn from_property_descriptor(
    ctx: &mut Context<impl ResourceTracker>,
    obj: crate::heap::HeapRef,
    name: crate::intern::StringId,
) -> JsResult<Value> {
    use crate::object::PropViewKind;
    let Some(view) = object::get_own_property(ctx, obj, name)? else {
        return Ok(Value::Undefined);
    };
    let prototype = get_builtin(ctx, BuiltinId::ObjectPrototype)?;
    let result = object::create_object(ctx, Some(prototype), true, ObjectType::General)?;
    let attrs = view.attrs();
    match view.kind {
        PropViewKind::Data { value, .. } => {
            let value = value.copy(&ctx.heap);
            object::put(ctx, result, Magic::Value.id(), value, false)?;
            object::put(ctx, result, Magic::Writable.id(), Value::Bool(attrs.writable), false)?;
        }
        PropViewKind::Accessor { get, set, .. } => {
            for (magic, accessor) in [(Magic::Get, get), (Magic::Set, set)] {
                let value = match accessor {
                    Some(func) => {
                        ctx.heap.inc_ref(func);
                        Value::Ref(func)
                    }
                    None => Value::Undefined,
                };
                object::put(ctx, result, magic.id(), value, false)?;
            }
        }
    }
    object::put(ctx, result, Magic::Enumerable.id(), Value::Bool(attrs.enumerable), false)?;
    object::put(ctx, result, Magic::Configurable.id(), Value::Bool(attrs.configurable), false)?;
    Ok(Value::Ref(result))
}
