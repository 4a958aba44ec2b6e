//! Lexical environment records.
//!
//! Environments are object-typed heap records. Declarative environments keep
//! their bindings in the ordinary property chain; object-bound environments
//! (the global environment, `with`-style scopes) forward to a binding object
//! held in an internal property. For both kinds the object's `prototype`
//! field is reused as the outer-environment link, which is why the generic
//! property-walk code never follows prototypes of environment records.

use crate::{
    builtins::error,
    context::Context,
    exception::{JsResult, Throw},
    heap::{HeapRef, ResourceTracker},
    intern::StringId,
    object::{self, InternalKey, ObjectType, PropAttrs, PropertySlot},
    value::Value,
};

/// Creates a declarative environment with the given outer environment.
pub(crate) fn create_decl_env(
    ctx: &mut Context<impl ResourceTracker>,
    outer: Option<HeapRef>,
) -> JsResult<HeapRef> {
    object::create_object(ctx, outer, true, ObjectType::DeclarativeEnv)
}

/// Creates an object-bound environment over `binding_object`.
pub(crate) fn create_object_env(
    ctx: &mut Context<impl ResourceTracker>,
    binding_object: HeapRef,
    outer: Option<HeapRef>,
) -> JsResult<HeapRef> {
    let env = object::create_object(ctx, outer, true, ObjectType::ObjectBoundEnv)?;
    ctx.heap.inc_ref(binding_object);
    object::set_internal(ctx, env, InternalKey::BindingObject, Value::Ref(binding_object));
    Ok(env)
}

/// The binding object of an object-bound environment.
pub(crate) fn binding_object(ctx: &Context<impl ResourceTracker>, env: HeapRef) -> HeapRef {
    match object::get_internal(ctx, env, InternalKey::BindingObject) {
        Some(Value::Ref(r)) => r,
        _ => panic!("object-bound environment without binding object"),
    }
}

/// Creates a mutable binding if the environment does not already have one.
///
/// `configurable` distinguishes eval-introduced bindings (deletable) from
/// function and script `var` bindings.
pub(crate) fn declare_binding(
    ctx: &mut Context<impl ResourceTracker>,
    env: HeapRef,
    name: StringId,
    configurable: bool,
) -> JsResult<()> {
    match ctx.heap.object(env).type_tag {
        ObjectType::DeclarativeEnv => {
            if ctx.heap.object(env).find_named(name).is_none() {
                ctx.heap.object_mut(env).append_slot(PropertySlot::Data {
                    name,
                    attrs: PropAttrs::new(true, true, configurable),
                    value: Value::Undefined,
                });
            }
            Ok(())
        }
        ObjectType::ObjectBoundEnv => {
            let target = binding_object(ctx, env);
            if object::get_own_property(ctx, target, name)?.is_none() {
                let desc = object::PropDescriptor::data(
                    Value::Undefined,
                    PropAttrs::new(true, true, configurable),
                );
                object::define_own_property(ctx, target, name, desc, false)?;
            }
            Ok(())
        }
        _ => panic!("declare_binding: not an environment record"),
    }
}

/// Resolves an identifier and returns its value (owned).
///
/// Unresolvable references raise a ReferenceError unless `for_typeof` is
/// set, in which case they evaluate to undefined.
pub(crate) fn get_ident_value(
    ctx: &mut Context<impl ResourceTracker>,
    env: HeapRef,
    name: StringId,
    for_typeof: bool,
) -> JsResult<Value> {
    let mut current = Some(env);
    while let Some(record) = current {
        match ctx.heap.object(record).type_tag {
            ObjectType::DeclarativeEnv => {
                if let Some((_, slot)) = ctx.heap.object(record).find_named(name) {
                    if let PropertySlot::Data { value, .. } = slot {
                        return Ok(value.copy(&ctx.heap));
                    }
                }
            }
            ObjectType::ObjectBoundEnv => {
                let target = binding_object(ctx, record);
                if object::has_property(ctx, target, name)? {
                    return object::get(ctx, target, name);
                }
            }
            _ => panic!("get_ident_value: not an environment record"),
        }
        current = ctx.heap.object(record).prototype;
    }
    if for_typeof {
        Ok(Value::Undefined)
    } else {
        Err(unresolvable(ctx, name))
    }
}

/// Assigns to an identifier reference. Consumes `value`.
///
/// Unresolvable references become global-object properties in sloppy mode
/// and a ReferenceError in strict mode.
pub(crate) fn set_ident_value(
    ctx: &mut Context<impl ResourceTracker>,
    env: HeapRef,
    name: StringId,
    value: Value,
    strict: bool,
) -> JsResult<()> {
    // Option-wrapped so the move into the resolving record does not leave
    // the loop with a conditionally-moved value.
    let mut value = Some(value);
    let mut current = Some(env);
    while let Some(record) = current {
        match ctx.heap.object(record).type_tag {
            ObjectType::DeclarativeEnv => {
                let found = match ctx.heap.object(record).find_named(name) {
                    Some((ordinal, PropertySlot::Data { .. })) => Some(ordinal),
                    _ => None,
                };
                if let Some(ordinal) = found {
                    let value = value.take().expect("binding value consumed once");
                    object::set_slot_value(ctx, record, ordinal, value);
                    return Ok(());
                }
            }
            ObjectType::ObjectBoundEnv => {
                let target = binding_object(ctx, record);
                if object::has_property(ctx, target, name)? {
                    let value = value.take().expect("binding value consumed once");
                    object::put(ctx, target, name, value, strict)?;
                    return Ok(());
                }
            }
            _ => panic!("set_ident_value: not an environment record"),
        }
        current = ctx.heap.object(record).prototype;
    }
    let value = value.take().expect("binding value consumed once");
    if strict {
        value.free(&mut ctx.heap);
        return Err(unresolvable(ctx, name));
    }
    let global = ctx.global_object()?;
    object::put(ctx, global, name, value, false)?;
    Ok(())
}

/// `delete identifier`: true when the binding is absent or was removed.
pub(crate) fn delete_binding(
    ctx: &mut Context<impl ResourceTracker>,
    env: HeapRef,
    name: StringId,
) -> JsResult<bool> {
    let mut current = Some(env);
    while let Some(record) = current {
        match ctx.heap.object(record).type_tag {
            ObjectType::DeclarativeEnv => {
                if let Some((_, slot)) = ctx.heap.object(record).find_named(name) {
                    let configurable = match slot {
                        PropertySlot::Data { attrs, .. } => attrs.configurable,
                        _ => false,
                    };
                    if !configurable {
                        return Ok(false);
                    }
                    return object::delete(ctx, record, name, false);
                }
            }
            ObjectType::ObjectBoundEnv => {
                let target = binding_object(ctx, record);
                if object::get_own_property(ctx, target, name)?.is_some() {
                    return object::delete(ctx, target, name, false);
                }
                if object::has_property(ctx, target, name)? {
                    // Inherited property: deleting the reference is a no-op.
                    return Ok(true);
                }
            }
            _ => panic!("delete_binding: not an environment record"),
        }
        current = ctx.heap.object(record).prototype;
    }
    Ok(true)
}

fn unresolvable(ctx: &mut Context<impl ResourceTracker>, name: StringId) -> Throw {
    let message = format!("{} is not defined", ctx.interns.get(name));
    error::reference_error(ctx, &message)
}
