//! The Error constructor family (ES5 15.11) and the raise helpers used by
//! the rest of the engine.
//!
//! All seven constructors share one shape: calling or constructing yields a
//! fresh error object whose prototype carries `name`, `message` and
//! `toString`. The raise helpers build the same objects for engine-thrown
//! exceptions; when even that allocation fails they fall back to throwing a
//! bare interned string so the error channel never goes silent.

use crate::{
    builtins::{BuiltinId, DescKind, PropDesc, routine_value},
    context::Context,
    convert,
    exception::{ExcKind, JsResult, Throw},
    heap::ResourceTracker,
    intern::Magic,
    object::{self, ObjectType, PropAttrs, PropertySlot},
    value::Value,
};

const TO_STRING: u8 = 1;

pub(super) static ERROR_PROTOTYPE_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(
        Magic::Constructor,
        DescKind::Object,
        PropAttrs::WRITABLE_CONFIGURABLE,
        BuiltinId::ErrorConstructor as u16,
    ),
    PropDesc::new(
        Magic::Name,
        DescKind::Str,
        PropAttrs::WRITABLE_CONFIGURABLE,
        Magic::ErrorName as u16,
    ),
    PropDesc::new(
        Magic::Message,
        DescKind::Str,
        PropAttrs::WRITABLE_CONFIGURABLE,
        Magic::Empty as u16,
    ),
    PropDesc::new(
        Magic::ToString,
        DescKind::Routine,
        PropAttrs::WRITABLE_CONFIGURABLE,
        routine_value(TO_STRING, 0),
    ),
];

pub(super) static ERROR_CONSTRUCTOR_PROPERTIES: &[PropDesc] = &[
    PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
    PropDesc::new(
        Magic::Prototype,
        DescKind::Object,
        PropAttrs::FIXED,
        BuiltinId::ErrorPrototype as u16,
    ),
];

macro_rules! error_subtype_tables {
    ($proto_table:ident, $ctor_table:ident, $name_magic:ident, $proto_id:ident, $ctor_id:ident) => {
        pub(super) static $proto_table: &[PropDesc] = &[
            PropDesc::new(
                Magic::Constructor,
                DescKind::Object,
                PropAttrs::WRITABLE_CONFIGURABLE,
                BuiltinId::$ctor_id as u16,
            ),
            PropDesc::new(
                Magic::Name,
                DescKind::Str,
                PropAttrs::WRITABLE_CONFIGURABLE,
                Magic::$name_magic as u16,
            ),
            PropDesc::new(
                Magic::Message,
                DescKind::Str,
                PropAttrs::WRITABLE_CONFIGURABLE,
                Magic::Empty as u16,
            ),
        ];
        pub(super) static $ctor_table: &[PropDesc] = &[
            PropDesc::new(Magic::Length, DescKind::Number, PropAttrs::FIXED, 1),
            PropDesc::new(
                Magic::Prototype,
                DescKind::Object,
                PropAttrs::FIXED,
                BuiltinId::$proto_id as u16,
            ),
        ];
    };
}

error_subtype_tables!(
    TYPE_ERROR_PROTOTYPE_PROPERTIES,
    TYPE_ERROR_CONSTRUCTOR_PROPERTIES,
    TypeErrorName,
    TypeErrorPrototype,
    TypeErrorConstructor
);
error_subtype_tables!(
    REFERENCE_ERROR_PROTOTYPE_PROPERTIES,
    REFERENCE_ERROR_CONSTRUCTOR_PROPERTIES,
    ReferenceErrorName,
    ReferenceErrorPrototype,
    ReferenceErrorConstructor
);
error_subtype_tables!(
    SYNTAX_ERROR_PROTOTYPE_PROPERTIES,
    SYNTAX_ERROR_CONSTRUCTOR_PROPERTIES,
    SyntaxErrorName,
    SyntaxErrorPrototype,
    SyntaxErrorConstructor
);
error_subtype_tables!(
    RANGE_ERROR_PROTOTYPE_PROPERTIES,
    RANGE_ERROR_CONSTRUCTOR_PROPERTIES,
    RangeErrorName,
    RangeErrorPrototype,
    RangeErrorConstructor
);
error_subtype_tables!(
    EVAL_ERROR_PROTOTYPE_PROPERTIES,
    EVAL_ERROR_CONSTRUCTOR_PROPERTIES,
    EvalErrorName,
    EvalErrorPrototype,
    EvalErrorConstructor
);
error_subtype_tables!(
    URI_ERROR_PROTOTYPE_PROPERTIES,
    URI_ERROR_CONSTRUCTOR_PROPERTIES,
    UriErrorName,
    UriErrorPrototype,
    UriErrorConstructor
);

fn prototype_id_of(kind: ExcKind) -> BuiltinId {
    match kind {
        ExcKind::Error => BuiltinId::ErrorPrototype,
        ExcKind::TypeError => BuiltinId::TypeErrorPrototype,
        ExcKind::ReferenceError => BuiltinId::ReferenceErrorPrototype,
        ExcKind::SyntaxError => BuiltinId::SyntaxErrorPrototype,
        ExcKind::RangeError => BuiltinId::RangeErrorPrototype,
        ExcKind::EvalError => BuiltinId::EvalErrorPrototype,
        ExcKind::UriError => BuiltinId::UriErrorPrototype,
    }
}

/// Builds an error object of the given kind with an optional message.
pub(crate) fn create_error_object(
    ctx: &mut Context<impl ResourceTracker>,
    kind: ExcKind,
    message: Option<&str>,
) -> JsResult<Value> {
    let prototype = super::get_builtin(ctx, prototype_id_of(kind))?;
    let error_obj = object::create_object(ctx, Some(prototype), true, ObjectType::General)?;
    if let Some(message) = message {
        let message_value = convert::make_string(ctx, message.to_owned())?;
        ctx.heap.object_mut(error_obj).append_slot(PropertySlot::Data {
            name: Magic::Message.id(),
            attrs: PropAttrs::WRITABLE_CONFIGURABLE,
            value: message_value,
        });
    }
    Ok(Value::Ref(error_obj))
}

/// Error constructor call/construct (they behave identically, 15.11.1).
pub(super) fn dispatch_call(
    ctx: &mut Context<impl ResourceTracker>,
    kind: ExcKind,
    args: &[Value],
) -> JsResult<Value> {
    let message = match args.first() {
        Some(arg) if !arg.is_undefined() => Some(convert::to_string_owned(ctx, arg)?),
        _ => None,
    };
    create_error_object(ctx, kind, message.as_deref())
}

/// Error.prototype.toString (15.11.4.4): `"name: message"`.
pub(super) fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    routine_id: u8,
    this: &Value,
    _args: &[Value],
) -> JsResult<Value> {
    match routine_id {
        TO_STRING => {
            let Some(obj) = this.object_ref(&ctx.heap) else {
                return Err(type_error(ctx, "Error.prototype.toString called on non-object"));
            };
            let name_value = object::get(ctx, obj, Magic::Name.id())?;
            let name = if name_value.is_undefined() {
                "Error".to_owned()
            } else {
                let name = convert::to_string_owned(ctx, &name_value);
                name_value.free(&mut ctx.heap);
                name?
            };
            let message_value = object::get(ctx, obj, Magic::Message.id())?;
            let message = if message_value.is_undefined() {
                String::new()
            } else {
                let message = convert::to_string_owned(ctx, &message_value);
                message_value.free(&mut ctx.heap);
                message?
            };
            let combined = if message.is_empty() {
                name
            } else if name.is_empty() {
                message
            } else {
                format!("{name}: {message}")
            };
            convert::make_string(ctx, combined)
        }
        _ => Err(type_error(ctx, "unknown Error routine")),
    }
}

/// Raises an engine exception of the given kind.
///
/// Infallible: if the error object cannot be allocated (or raising is
/// already in progress on this path), the message is thrown as a bare
/// interned string instead.
pub(crate) fn raise(ctx: &mut Context<impl ResourceTracker>, kind: ExcKind, message: &str) -> Throw {
    if ctx.in_raise {
        return Throw(Value::Str(ctx.interns.intern(message)));
    }
    ctx.in_raise = true;
    let result = create_error_object(ctx, kind, Some(message));
    ctx.in_raise = false;
    match result {
        Ok(value) => Throw(value),
        Err(Throw(inner)) => {
            inner.free(&mut ctx.heap);
            Throw(Value::Str(ctx.interns.intern(message)))
        }
    }
}

pub(crate) fn type_error(ctx: &mut Context<impl ResourceTracker>, message: &str) -> Throw {
    raise(ctx, ExcKind::TypeError, message)
}

pub(crate) fn reference_error(ctx: &mut Context<impl ResourceTracker>, message: &str) -> Throw {
    raise(ctx, ExcKind::ReferenceError, message)
}

pub(crate) fn range_error(ctx: &mut Context<impl ResourceTracker>, message: &str) -> Throw {
    raise(ctx, ExcKind::RangeError, message)
}

pub(crate) fn syntax_error(ctx: &mut Context<impl ResourceTracker>, message: &str) -> Throw {
    raise(ctx, ExcKind::SyntaxError, message)
}
