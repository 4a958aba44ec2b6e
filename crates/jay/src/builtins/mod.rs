//! Built-in registry and lazy property instantiation.
//!
//! Every standard-library object is declared by one row of [`REGISTRY`] and
//! one property-descriptor table in its module. Objects are created on first
//! access through [`get_builtin`]; their properties stay table rows until a
//! lookup touches them, at which point [`try_to_instantiate_property`]
//! materialises the property and marks it in the object's instantiated
//! bitset so a deleted configurable property is never resurrected.

pub(crate) mod array;
pub(crate) mod boolean;
pub(crate) mod error;
pub(crate) mod function_builtin;
pub(crate) mod global;
pub(crate) mod math;
pub(crate) mod number;
pub(crate) mod object_builtin;
pub(crate) mod string_builtin;

use strum::{EnumCount, FromRepr};

use crate::{
    context::Context,
    exception::JsResult,
    heap::{HeapRef, ResourceTracker},
    intern::{Interner, Magic, StringId},
    object::{self, Extended, InternalKey, ObjectType, PropAttrs, PropertySlot},
    value::Value,
};

/// Compile-time ids of the built-in objects.
///
/// Prototype entries precede their constructors so the recursive
/// instantiation in [`instantiate`] reads naturally top-down.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumCount)]
pub(crate) enum BuiltinId {
    ObjectPrototype,
    ObjectConstructor,
    FunctionPrototype,
    FunctionConstructor,
    ArrayPrototype,
    ArrayConstructor,
    StringPrototype,
    StringConstructor,
    BooleanPrototype,
    BooleanConstructor,
    NumberPrototype,
    NumberConstructor,
    Math,
    ErrorPrototype,
    ErrorConstructor,
    TypeErrorPrototype,
    TypeErrorConstructor,
    ReferenceErrorPrototype,
    ReferenceErrorConstructor,
    SyntaxErrorPrototype,
    SyntaxErrorConstructor,
    RangeErrorPrototype,
    RangeErrorConstructor,
    EvalErrorPrototype,
    EvalErrorConstructor,
    UriErrorPrototype,
    UriErrorConstructor,
    /// The shared `[[ThrowTypeError]]` function (ES5 13.2.3).
    TypeErrorThrower,
    Global,
}

impl BuiltinId {
    /// Number of built-in ids; routine ids start here.
    pub(crate) const COUNT: usize = <Self as EnumCount>::COUNT;
}

/// One registry row: object shape of a built-in.
pub(crate) struct BuiltinDef {
    pub(crate) object_type: ObjectType,
    pub(crate) prototype: Option<BuiltinId>,
    pub(crate) is_extensible: bool,
}

const fn def(object_type: ObjectType, prototype: Option<BuiltinId>, is_extensible: bool) -> BuiltinDef {
    BuiltinDef {
        object_type,
        prototype,
        is_extensible,
    }
}

/// The registry, indexed by [`BuiltinId`] discriminant.
static REGISTRY: [BuiltinDef; BuiltinId::COUNT] = [
    // ObjectPrototype: the root of the prototype graph.
    def(ObjectType::General, None, true),
    // ObjectConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // FunctionPrototype: callable, returns undefined.
    def(ObjectType::Function, Some(BuiltinId::ObjectPrototype), true),
    // FunctionConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // ArrayPrototype: an array object with length 0.
    def(ObjectType::Array, Some(BuiltinId::ObjectPrototype), true),
    // ArrayConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // StringPrototype: wrapper around the empty string.
    def(ObjectType::StringWrapper, Some(BuiltinId::ObjectPrototype), true),
    // StringConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // BooleanPrototype: wrapper around false.
    def(ObjectType::BooleanWrapper, Some(BuiltinId::ObjectPrototype), true),
    // BooleanConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // NumberPrototype: wrapper around +0.
    def(ObjectType::NumberWrapper, Some(BuiltinId::ObjectPrototype), true),
    // NumberConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // Math
    def(ObjectType::General, Some(BuiltinId::ObjectPrototype), true),
    // ErrorPrototype
    def(ObjectType::General, Some(BuiltinId::ObjectPrototype), true),
    // ErrorConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // TypeErrorPrototype
    def(ObjectType::General, Some(BuiltinId::ErrorPrototype), true),
    // TypeErrorConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // ReferenceErrorPrototype
    def(ObjectType::General, Some(BuiltinId::ErrorPrototype), true),
    // ReferenceErrorConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // SyntaxErrorPrototype
    def(ObjectType::General, Some(BuiltinId::ErrorPrototype), true),
    // SyntaxErrorConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // RangeErrorPrototype
    def(ObjectType::General, Some(BuiltinId::ErrorPrototype), true),
    // RangeErrorConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // EvalErrorPrototype
    def(ObjectType::General, Some(BuiltinId::ErrorPrototype), true),
    // EvalErrorConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // UriErrorPrototype
    def(ObjectType::General, Some(BuiltinId::ErrorPrototype), true),
    // UriErrorConstructor
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), true),
    // TypeErrorThrower: frozen poison pill.
    def(ObjectType::Function, Some(BuiltinId::FunctionPrototype), false),
    // Global
    def(ObjectType::General, Some(BuiltinId::ObjectPrototype), true),
];

/// Property kind of a descriptor-table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DescKind {
    /// A simple constant; `value` selects it (0 = undefined).
    Simple,
    /// A number: 0-255 directly, 256+ indexes [`NumberConst`].
    Number,
    /// A magic string; `value` is the magic id.
    Str,
    /// Another built-in object; `value` is its id.
    Object,
    /// A built-in routine; `value` packs `(routine_id, arity)`.
    Routine,
}

/// Symbolic number constants referenced by `DescKind::Number` rows.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub(crate) enum NumberConst {
    MaxValue = 256,
    MinValue,
    E,
    Pi,
    Ln10,
    Ln2,
    Log2E,
    Log10E,
    Sqrt2,
    Sqrt1_2,
    NaN,
    PositiveInfinity,
    NegativeInfinity,
}

impl NumberConst {
    fn value(self) -> f64 {
        match self {
            Self::MaxValue => f64::MAX,
            // The smallest positive denormal, ECMA's Number.MIN_VALUE.
            Self::MinValue => 5E-324,
            Self::E => std::f64::consts::E,
            Self::Pi => std::f64::consts::PI,
            Self::Ln10 => std::f64::consts::LN_10,
            Self::Ln2 => std::f64::consts::LN_2,
            Self::Log2E => std::f64::consts::LOG2_E,
            Self::Log10E => std::f64::consts::LOG10_E,
            Self::Sqrt2 => std::f64::consts::SQRT_2,
            Self::Sqrt1_2 => std::f64::consts::FRAC_1_SQRT_2,
            Self::NaN => f64::NAN,
            Self::PositiveInfinity => f64::INFINITY,
            Self::NegativeInfinity => f64::NEG_INFINITY,
        }
    }
}

/// One property-descriptor table row.
pub(crate) struct PropDesc {
    pub(crate) name: Magic,
    pub(crate) kind: DescKind,
    pub(crate) attrs: PropAttrs,
    pub(crate) value: u16,
}

impl PropDesc {
    pub(crate) const fn new(name: Magic, kind: DescKind, attrs: PropAttrs, value: u16) -> Self {
        Self {
            name,
            kind,
            attrs,
            value,
        }
    }
}

/// Builds a `DescKind::Routine` value from a routine id and its arity.
pub(crate) const fn routine_value(id: u8, arity: u8) -> u16 {
    id as u16 | ((arity as u16) << 8)
}

fn routine_id_of(value: u16) -> u8 {
    (value & 0xFF) as u8
}

fn routine_arity_of(value: u16) -> u8 {
    (value >> 8) as u8
}

/// Maximum descriptors per built-in: the instantiated bitset spans two
/// 32-bit words.
pub(crate) const MAX_DESCRIPTORS: usize = 64;

/// Descriptor table of a built-in.
pub(crate) fn descriptor_table(id: BuiltinId) -> &'static [PropDesc] {
    match id {
        BuiltinId::ObjectPrototype => object_builtin::PROTOTYPE_PROPERTIES,
        BuiltinId::ObjectConstructor => object_builtin::CONSTRUCTOR_PROPERTIES,
        BuiltinId::FunctionPrototype => function_builtin::PROTOTYPE_PROPERTIES,
        BuiltinId::FunctionConstructor => function_builtin::CONSTRUCTOR_PROPERTIES,
        BuiltinId::ArrayPrototype => array::PROTOTYPE_PROPERTIES,
        BuiltinId::ArrayConstructor => array::CONSTRUCTOR_PROPERTIES,
        BuiltinId::StringPrototype => string_builtin::PROTOTYPE_PROPERTIES,
        BuiltinId::StringConstructor => string_builtin::CONSTRUCTOR_PROPERTIES,
        BuiltinId::BooleanPrototype => boolean::PROTOTYPE_PROPERTIES,
        BuiltinId::BooleanConstructor => boolean::CONSTRUCTOR_PROPERTIES,
        BuiltinId::NumberPrototype => number::PROTOTYPE_PROPERTIES,
        BuiltinId::NumberConstructor => number::CONSTRUCTOR_PROPERTIES,
        BuiltinId::Math => math::PROPERTIES,
        BuiltinId::ErrorPrototype => error::ERROR_PROTOTYPE_PROPERTIES,
        BuiltinId::ErrorConstructor => error::ERROR_CONSTRUCTOR_PROPERTIES,
        BuiltinId::TypeErrorPrototype => error::TYPE_ERROR_PROTOTYPE_PROPERTIES,
        BuiltinId::TypeErrorConstructor => error::TYPE_ERROR_CONSTRUCTOR_PROPERTIES,
        BuiltinId::ReferenceErrorPrototype => error::REFERENCE_ERROR_PROTOTYPE_PROPERTIES,
        BuiltinId::ReferenceErrorConstructor => error::REFERENCE_ERROR_CONSTRUCTOR_PROPERTIES,
        BuiltinId::SyntaxErrorPrototype => error::SYNTAX_ERROR_PROTOTYPE_PROPERTIES,
        BuiltinId::SyntaxErrorConstructor => error::SYNTAX_ERROR_CONSTRUCTOR_PROPERTIES,
        BuiltinId::RangeErrorPrototype => error::RANGE_ERROR_PROTOTYPE_PROPERTIES,
        BuiltinId::RangeErrorConstructor => error::RANGE_ERROR_CONSTRUCTOR_PROPERTIES,
        BuiltinId::EvalErrorPrototype => error::EVAL_ERROR_PROTOTYPE_PROPERTIES,
        BuiltinId::EvalErrorConstructor => error::EVAL_ERROR_CONSTRUCTOR_PROPERTIES,
        BuiltinId::UriErrorPrototype => error::URI_ERROR_PROTOTYPE_PROPERTIES,
        BuiltinId::UriErrorConstructor => error::URI_ERROR_CONSTRUCTOR_PROPERTIES,
        BuiltinId::TypeErrorThrower => &[],
        BuiltinId::Global => global::PROPERTIES,
    }
}

/// Checks whether `obj` is the instance of the given built-in.
pub(crate) fn builtin_is(ctx: &Context<impl ResourceTracker>, obj: HeapRef, id: BuiltinId) -> bool {
    ctx.builtin_objects[id as usize] == Some(obj)
}

/// Returns the built-in's object, instantiating it on first access.
///
/// The returned reference is owned by the context slot; callers that store
/// it must take their own reference.
pub(crate) fn get_builtin(ctx: &mut Context<impl ResourceTracker>, id: BuiltinId) -> JsResult<HeapRef> {
    if let Some(obj) = ctx.builtin_objects[id as usize] {
        return Ok(obj);
    }
    instantiate(ctx, id)
}

/// Instantiates a built-in, ensuring its prototype built-in exists first.
fn instantiate(ctx: &mut Context<impl ResourceTracker>, id: BuiltinId) -> JsResult<HeapRef> {
    let definition = &REGISTRY[id as usize];
    let prototype = match definition.prototype {
        Some(proto_id) => Some(get_builtin(ctx, proto_id)?),
        None => None,
    };
    let obj = object::create_object(ctx, prototype, definition.is_extensible, definition.object_type)?;
    {
        let object = ctx.heap.object_mut(obj);
        object.is_builtin = true;
        object.extended = Extended::Builtin {
            builtin_id: id,
            routine_id: id as u16,
            length: 0,
            instantiated: 0,
        };
    }
    init_fixed_values(ctx, obj, id)?;
    ctx.builtin_objects[id as usize] = Some(obj);
    Ok(obj)
}

/// Installs the fixed per-instance values of prototype objects: the Array
/// prototype's `length` and the `[[PrimitiveValue]]` of the wrapper
/// prototypes.
fn init_fixed_values(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef, id: BuiltinId) -> JsResult<()> {
    match id {
        BuiltinId::ArrayPrototype => {
            ctx.heap.object_mut(obj).append_slot(PropertySlot::Data {
                name: Magic::Length.id(),
                attrs: PropAttrs::WRITABLE,
                value: Value::Int(0),
            });
        }
        BuiltinId::StringPrototype => {
            object::set_internal(ctx, obj, InternalKey::PrimitiveValue, Value::Str(Magic::Empty.id()));
            ctx.heap.object_mut(obj).append_slot(PropertySlot::Data {
                name: Magic::Length.id(),
                attrs: PropAttrs::FIXED,
                value: Value::Int(0),
            });
        }
        BuiltinId::NumberPrototype => {
            object::set_internal(ctx, obj, InternalKey::PrimitiveValue, Value::Int(0));
        }
        BuiltinId::BooleanPrototype => {
            object::set_internal(ctx, obj, InternalKey::PrimitiveValue, Value::Bool(false));
        }
        _ => {}
    }
    Ok(())
}

/// True when the function object is a built-in routine rather than a
/// built-in object's own call slot.
pub(crate) fn function_is_routine(ctx: &Context<impl ResourceTracker>, obj: HeapRef) -> bool {
    match ctx.heap.object(obj).extended {
        Extended::Builtin { routine_id, .. } => routine_id as usize >= BuiltinId::COUNT,
        _ => false,
    }
}

/// Constructs the function object for one built-in routine.
fn make_routine_function(
    ctx: &mut Context<impl ResourceTracker>,
    builtin_id: BuiltinId,
    routine_id: u8,
    length: u8,
) -> JsResult<HeapRef> {
    let prototype = get_builtin(ctx, BuiltinId::FunctionPrototype)?;
    let func = object::create_object(ctx, Some(prototype), true, ObjectType::BuiltinFunction)?;
    let object = ctx.heap.object_mut(func);
    object.is_builtin = true;
    object.extended = Extended::Builtin {
        builtin_id,
        routine_id: BuiltinId::COUNT as u16 + u16::from(routine_id),
        length,
        instantiated: 0,
    };
    Ok(func)
}

/// Lazy property materialisation (design section 4.D).
///
/// Returns the chain ordinal of the instantiated slot, or `None` when the
/// name is not lazily instantiable here - including the case where it was
/// materialised before and has since been deleted.
pub(crate) fn try_to_instantiate_property(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    name: StringId,
) -> JsResult<Option<u16>> {
    let Extended::Builtin {
        builtin_id,
        routine_id,
        length,
        instantiated,
    } = ctx.heap.object(obj).extended
    else {
        return Ok(None);
    };

    // Routine objects lazily produce only `length`; it is non-configurable,
    // so no bitset bookkeeping is needed.
    if routine_id as usize >= BuiltinId::COUNT {
        if name == Magic::Length.id() {
            let ordinal = ctx.heap.object_mut(obj).append_slot(PropertySlot::Data {
                name,
                attrs: PropAttrs::FIXED,
                value: Value::Int(i32::from(length)),
            });
            return Ok(Some(ordinal));
        }
        return Ok(None);
    }

    let Some(magic) = Interner::as_magic(name) else {
        return Ok(None);
    };

    debug_assert!(builtin_is(ctx, obj, builtin_id), "non-routine built-in must be its slot object");
    let table = descriptor_table(builtin_id);
    let Some(index) = table.iter().position(|desc| desc.name == magic) else {
        return Ok(None);
    };
    debug_assert!(index < MAX_DESCRIPTORS, "descriptor table exceeds the bitset");

    // Bits 0-31 live in the extended object; 32-63 in an internal property.
    if index < 32 {
        let bit = 1u32 << index;
        if instantiated & bit != 0 {
            return Ok(None);
        }
        if let Extended::Builtin { instantiated, .. } = &mut ctx.heap.object_mut(obj).extended {
            *instantiated |= bit;
        }
    } else {
        let bit = 1u32 << (index - 32);
        let mask = match object::get_internal(ctx, obj, InternalKey::InstantiatedMask) {
            Some(Value::Int(mask)) => mask as u32,
            _ => 0,
        };
        if mask & bit != 0 {
            return Ok(None);
        }
        object::set_internal(ctx, obj, InternalKey::InstantiatedMask, Value::Int((mask | bit) as i32));
    }

    let desc = &table[index];
    let value = match desc.kind {
        DescKind::Simple => Value::Undefined,
        DescKind::Number => {
            let x = if desc.value < 256 {
                f64::from(desc.value)
            } else {
                NumberConst::from_repr(desc.value)
                    .expect("descriptor references an unknown number constant")
                    .value()
            };
            match Value::make_number(&mut ctx.heap, x) {
                Ok(value) => value,
                Err(_) => return Err(error::range_error(ctx, "allocation failed")),
            }
        }
        DescKind::Str => Value::Str(StringId::from_index(u32::from(desc.value))),
        DescKind::Object => {
            let referenced = BuiltinId::from_repr(desc.value as u8).expect("descriptor references unknown built-in");
            let target = get_builtin(ctx, referenced)?;
            ctx.heap.inc_ref(target);
            Value::Ref(target)
        }
        DescKind::Routine => {
            let func = make_routine_function(ctx, builtin_id, routine_id_of(desc.value), routine_arity_of(desc.value))?;
            Value::Ref(func)
        }
    };

    let attrs = desc.attrs;
    let ordinal = ctx.heap.object_mut(obj).append_slot(PropertySlot::Data { name, attrs, value });
    Ok(Some(ordinal))
}

/// Appends the built-in's lazily listable property names (design 4.D).
///
/// Uninstantiated rows are listed from the table; rows whose bit is set are
/// re-confirmed through `get_own_property` so deleted configurable
/// properties stay invisible.
pub(crate) fn list_lazy_property_names(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    only_enumerable: bool,
    out: &mut Vec<StringId>,
) -> JsResult<()> {
    let Extended::Builtin {
        builtin_id,
        routine_id,
        instantiated,
        ..
    } = ctx.heap.object(obj).extended
    else {
        return Ok(());
    };

    if routine_id as usize >= BuiltinId::COUNT {
        // 'length' is non-enumerable (ECMA-262 v5, 15).
        if !only_enumerable {
            out.push(Magic::Length.id());
        }
        return Ok(());
    }

    let table = descriptor_table(builtin_id);
    let overflow_mask = match object::get_internal(ctx, obj, InternalKey::InstantiatedMask) {
        Some(Value::Int(mask)) => mask as u32,
        _ => 0,
    };
    for (index, desc) in table.iter().enumerate() {
        let was_instantiated = if index < 32 {
            instantiated & (1u32 << index) != 0
        } else {
            overflow_mask & (1u32 << (index - 32)) != 0
        };
        let name = desc.name.id();
        if was_instantiated {
            // May have been deleted since; only list when still present.
            match object::get_own_property(ctx, obj, name)? {
                Some(view) if !only_enumerable || view.attrs().enumerable => out.push(name),
                _ => {}
            }
        } else if !only_enumerable || desc.attrs.enumerable {
            out.push(name);
        }
    }
    Ok(())
}

/// `[[Call]]` of built-in objects and routines.
pub(crate) fn dispatch_call(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    let Extended::Builtin {
        builtin_id,
        routine_id,
        ..
    } = ctx.heap.object(obj).extended
    else {
        return Err(error::type_error(ctx, "object is not a built-in"));
    };
    if function_is_routine(ctx, obj) {
        let local = (routine_id as usize - BuiltinId::COUNT) as u8;
        return dispatch_routine(ctx, builtin_id, local, this, args);
    }
    match builtin_id {
        BuiltinId::ObjectConstructor => object_builtin::dispatch_call(ctx, args),
        BuiltinId::FunctionPrototype => Ok(Value::Undefined),
        BuiltinId::FunctionConstructor => function_builtin::dispatch_call(ctx, args),
        BuiltinId::ArrayConstructor => array::dispatch_call(ctx, args),
        BuiltinId::StringConstructor => string_builtin::dispatch_call(ctx, args),
        BuiltinId::BooleanConstructor => boolean::dispatch_call(ctx, args),
        BuiltinId::NumberConstructor => number::dispatch_call(ctx, args),
        BuiltinId::ErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::Error, args),
        BuiltinId::TypeErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::TypeError, args),
        BuiltinId::ReferenceErrorConstructor => {
            error::dispatch_call(ctx, crate::exception::ExcKind::ReferenceError, args)
        }
        BuiltinId::SyntaxErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::SyntaxError, args),
        BuiltinId::RangeErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::RangeError, args),
        BuiltinId::EvalErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::EvalError, args),
        BuiltinId::UriErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::UriError, args),
        BuiltinId::TypeErrorThrower => Err(error::type_error(ctx, "restricted function property accessed")),
        _ => Err(error::type_error(ctx, "built-in object is not callable")),
    }
}

/// `[[Construct]]` of built-in constructors.
pub(crate) fn dispatch_construct(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    args: &[Value],
) -> JsResult<Value> {
    let Extended::Builtin { builtin_id, routine_id, .. } = ctx.heap.object(obj).extended else {
        return Err(error::type_error(ctx, "object is not a built-in"));
    };
    if routine_id as usize >= BuiltinId::COUNT {
        return Err(error::type_error(ctx, "built-in routine is not a constructor"));
    }
    match builtin_id {
        BuiltinId::ObjectConstructor => object_builtin::dispatch_construct(ctx, args),
        BuiltinId::FunctionConstructor => function_builtin::dispatch_call(ctx, args),
        BuiltinId::ArrayConstructor => array::dispatch_call(ctx, args),
        BuiltinId::StringConstructor => string_builtin::dispatch_construct(ctx, args),
        BuiltinId::BooleanConstructor => boolean::dispatch_construct(ctx, args),
        BuiltinId::NumberConstructor => number::dispatch_construct(ctx, args),
        BuiltinId::ErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::Error, args),
        BuiltinId::TypeErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::TypeError, args),
        BuiltinId::ReferenceErrorConstructor => {
            error::dispatch_call(ctx, crate::exception::ExcKind::ReferenceError, args)
        }
        BuiltinId::SyntaxErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::SyntaxError, args),
        BuiltinId::RangeErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::RangeError, args),
        BuiltinId::EvalErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::EvalError, args),
        BuiltinId::UriErrorConstructor => error::dispatch_call(ctx, crate::exception::ExcKind::UriError, args),
        _ => Err(error::type_error(ctx, "built-in object is not a constructor")),
    }
}

/// Routes a routine call to the owning built-in's routine dispatcher.
fn dispatch_routine(
    ctx: &mut Context<impl ResourceTracker>,
    builtin_id: BuiltinId,
    routine_id: u8,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    match builtin_id {
        BuiltinId::Global => global::dispatch_routine(ctx, routine_id, this, args),
        BuiltinId::ObjectConstructor | BuiltinId::ObjectPrototype => {
            object_builtin::dispatch_routine(ctx, routine_id, this, args)
        }
        BuiltinId::FunctionPrototype | BuiltinId::FunctionConstructor => {
            function_builtin::dispatch_routine(ctx, routine_id, this, args)
        }
        BuiltinId::ArrayPrototype | BuiltinId::ArrayConstructor => array::dispatch_routine(ctx, routine_id, this, args),
        BuiltinId::StringPrototype | BuiltinId::StringConstructor => {
            string_builtin::dispatch_routine(ctx, routine_id, this, args)
        }
        BuiltinId::BooleanPrototype | BuiltinId::BooleanConstructor => {
            boolean::dispatch_routine(ctx, routine_id, this, args)
        }
        BuiltinId::NumberPrototype | BuiltinId::NumberConstructor => {
            number::dispatch_routine(ctx, routine_id, this, args)
        }
        BuiltinId::Math => math::dispatch_routine(ctx, routine_id, this, args),
        BuiltinId::ErrorPrototype
        | BuiltinId::TypeErrorPrototype
        | BuiltinId::ReferenceErrorPrototype
        | BuiltinId::SyntaxErrorPrototype
        | BuiltinId::RangeErrorPrototype
        | BuiltinId::EvalErrorPrototype
        | BuiltinId::UriErrorPrototype => error::dispatch_routine(ctx, routine_id, this, args),
        _ => Err(error::type_error(ctx, "built-in has no routines")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_descriptor_table_fits_the_bitset() {
        for raw in 0..BuiltinId::COUNT {
            let id = BuiltinId::from_repr(raw as u8).unwrap();
            let table = descriptor_table(id);
            assert!(
                table.len() < MAX_DESCRIPTORS,
                "descriptor table of {id:?} has {} rows, limit is {MAX_DESCRIPTORS}",
                table.len()
            );
        }
    }

    #[test]
    fn routine_value_packs_id_and_arity() {
        let value = routine_value(7, 2);
        assert_eq!(routine_id_of(value), 7);
        assert_eq!(routine_arity_of(value), 2);
    }

    #[test]
    fn registry_prototypes_precede_their_dependents() {
        // Instantiation recurses into the prototype id; the graph must be
        // acyclic. Walk every chain and count steps.
        for raw in 0..BuiltinId::COUNT {
            let mut id = BuiltinId::from_repr(raw as u8).unwrap();
            let mut steps = 0;
            while let Some(proto) = REGISTRY[id as usize].prototype {
                id = proto;
                steps += 1;
                assert!(steps <= BuiltinId::COUNT, "prototype cycle in the registry");
            }
        }
    }
}
