//! Function object model: ordinary, built-in, bound, and external functions.
//!
//! Ordinary functions are created from a compiled-code blob plus a scope
//! environment; their `length` and `prototype` own properties do not exist
//! until first observed. Only non-configurable properties may be
//! materialised lazily, because a configurable one might have been deleted
//! and re-creating it later would be observable.

use smallvec::SmallVec;

use crate::{
    builtins::{self, BuiltinId, error},
    bytecode::{CodeId, flags},
    context::Context,
    convert,
    envs,
    exception::JsResult,
    heap::{HeapData, HeapRef, ResourceTracker},
    intern::{Magic, StringId},
    object::{
        self, Extended, InternalKey, ObjectType, PropAttrs, PropDescriptor, PropertySlot,
    },
    value::Value,
    vm,
};

/// Function object creation (ES5 13.2).
///
/// `length` and `prototype` are instantiated lazily; strict-mode functions
/// additionally get `caller` and `arguments` poison accessors up front.
pub(crate) fn create_function_object(
    ctx: &mut Context<impl ResourceTracker>,
    scope: HeapRef,
    code: CodeId,
) -> JsResult<HeapRef> {
    let prototype = builtins::get_builtin(ctx, BuiltinId::FunctionPrototype)?;
    let func = object::create_object(ctx, Some(prototype), true, ObjectType::Function)?;
    ctx.heap.inc_ref(scope);
    ctx.code.code_ref(code);
    ctx.heap.object_mut(func).extended = Extended::Function { scope, code };

    let is_strict = ctx.code.get(code).is_strict();
    if is_strict {
        let thrower = builtins::get_builtin(ctx, BuiltinId::TypeErrorThrower)?;
        for name in [Magic::Caller, Magic::Arguments] {
            let desc = PropDescriptor::accessor(Some(thrower), Some(thrower), PropAttrs::FIXED);
            object::define_own_property(ctx, func, name.id(), desc, false)?;
        }
    }
    Ok(func)
}

/// External (host) function object creation.
///
/// `prototype` is an eager plain data property here; the lazy machinery is
/// reserved for ordinary functions.
pub(crate) fn create_external_function(
    ctx: &mut Context<impl ResourceTracker>,
    handler: u32,
) -> JsResult<HeapRef> {
    let prototype = builtins::get_builtin(ctx, BuiltinId::FunctionPrototype)?;
    let func = object::create_object(ctx, Some(prototype), true, ObjectType::ExternalFunction)?;
    ctx.heap.object_mut(func).extended = Extended::External { handler };
    let desc = PropDescriptor::data(Value::Undefined, PropAttrs::WRITABLE);
    object::define_own_property(ctx, func, Magic::Prototype.id(), desc, false)?;
    Ok(func)
}

/// Bound function creation (ES5 15.3.4.5). The target, the bound `this`
/// and the leading argument list live entirely in internal properties.
pub(crate) fn create_bound_function(
    ctx: &mut Context<impl ResourceTracker>,
    target: HeapRef,
    bound_this: Value,
    bound_args: &[Value],
) -> JsResult<HeapRef> {
    let prototype = builtins::get_builtin(ctx, BuiltinId::FunctionPrototype)?;
    let func = object::create_object(ctx, Some(prototype), true, ObjectType::BoundFunction)?;
    ctx.heap.inc_ref(target);
    object::set_internal(ctx, func, InternalKey::BoundTarget, Value::Ref(target));
    object::set_internal(ctx, func, InternalKey::BoundThis, bound_this);
    if !bound_args.is_empty() {
        let copies: Vec<Value> = bound_args.iter().map(|arg| arg.copy(&ctx.heap)).collect();
        let list = ctx.alloc(HeapData::List(copies))?;
        object::set_internal(ctx, func, InternalKey::BoundArgs, Value::Ref(list));
    }

    // Bound length: max(0, target.length - bound argument count).
    let target_length = object::get(ctx, target, Magic::Length.id())?;
    let length = target_length.as_number(&ctx.heap).unwrap_or(0.0);
    target_length.free(&mut ctx.heap);
    let bound_length = (length - bound_args.len() as f64).max(0.0);
    let length_value = convert::make_number(ctx, bound_length)?;
    let desc = PropDescriptor::data(length_value, PropAttrs::FIXED);
    object::define_own_property(ctx, func, Magic::Length.id(), desc, false)?;
    Ok(func)
}

/// Lazy instantiation of an ordinary function's `length` or `prototype`
/// (ES5 13.2 steps 14-18). Returns the chain ordinal of the new slot.
pub(crate) fn try_lazy_instantiate_property(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    name: StringId,
) -> JsResult<Option<u16>> {
    let Extended::Function { code, .. } = ctx.heap.object(func).extended else {
        return Ok(None);
    };

    if name == Magic::Length.id() {
        // The argument names occupy the leading literal-pool entries, so the
        // blob's argument_end is also the function's arity.
        let blob = ctx.code.get(code);
        let length = i32::from(blob.argument_end);
        let ordinal = ctx.heap.object_mut(func).append_slot(PropertySlot::Data {
            name,
            attrs: PropAttrs::FIXED,
            value: Value::Int(length),
        });
        return Ok(Some(ordinal));
    }

    if name == Magic::Prototype.id() {
        let object_proto = builtins::get_builtin(ctx, BuiltinId::ObjectPrototype)?;
        let proto = object::create_object(ctx, Some(object_proto), true, ObjectType::General)?;
        ctx.heap.inc_ref(func);
        let constructor_desc = PropDescriptor::data(
            Value::Ref(func),
            PropAttrs::WRITABLE_CONFIGURABLE,
        );
        object::define_own_property(ctx, proto, Magic::Constructor.id(), constructor_desc, false)?;
        let ordinal = ctx.heap.object_mut(func).append_slot(PropertySlot::Data {
            name,
            attrs: PropAttrs::WRITABLE,
            value: Value::Ref(proto),
        });
        return Ok(Some(ordinal));
    }

    Ok(None)
}

/// Lazily listable names of ordinary functions: `length` and `prototype`,
/// both non-enumerable.
pub(crate) fn list_lazy_property_names(only_enumerable: bool, out: &mut Vec<StringId>) {
    if !only_enumerable {
        out.push(Magic::Length.id());
        out.push(Magic::Prototype.id());
    }
}

/// IsCallable (ES5 9.11).
pub(crate) fn is_callable(ctx: &Context<impl ResourceTracker>, value: &Value) -> bool {
    value
        .object_ref(&ctx.heap)
        .is_some_and(|obj| is_callable_object(ctx, obj))
}

pub(crate) fn is_callable_object(ctx: &Context<impl ResourceTracker>, obj: HeapRef) -> bool {
    matches!(
        ctx.heap.object(obj).type_tag,
        ObjectType::Function | ObjectType::BoundFunction | ObjectType::BuiltinFunction | ObjectType::ExternalFunction
    )
}

/// IsConstructor: callable objects that implement [[Construct]].
pub(crate) fn is_constructor(ctx: &Context<impl ResourceTracker>, value: &Value) -> bool {
    value.object_ref(&ctx.heap).is_some_and(|obj| {
        matches!(
            ctx.heap.object(obj).type_tag,
            ObjectType::Function | ObjectType::BoundFunction | ObjectType::ExternalFunction
        )
    })
}

/// `[[Call]]` dispatch over the four function kinds.
///
/// `this` and `args` are borrowed; the callee copies whatever it keeps.
/// The result is owned by the caller.
pub(crate) fn call(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    ctx.enter_call()?;
    let result = call_inner(ctx, func, this, args);
    ctx.leave_call();
    result
}

fn call_inner(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    let (type_tag, is_builtin) = {
        let object = ctx.heap.object(func);
        (object.type_tag, object.is_builtin)
    };
    match type_tag {
        ObjectType::Function if is_builtin => builtins::dispatch_call(ctx, func, this, args),
        ObjectType::Function => call_ordinary(ctx, func, this, args),
        ObjectType::BuiltinFunction => builtins::dispatch_call(ctx, func, this, args),
        ObjectType::ExternalFunction => {
            let Extended::External { handler } = ctx.heap.object(func).extended else {
                unreachable!("external function without handler");
            };
            ctx.dispatch_external(handler, func, this, args)
        }
        ObjectType::BoundFunction => {
            let target = bound_target(ctx, func)?;
            let bound_this = object::get_internal(ctx, func, InternalKey::BoundThis).unwrap_or(Value::Undefined);
            // Merged argument list: word copies are enough, the originals
            // stay alive for the duration of the call.
            let merged = merge_bound_args(ctx, func, args);
            call(ctx, target, &bound_this, &merged)
        }
        _ => Err(error::type_error(ctx, "value is not a function")),
    }
}

/// `[[Call]]` for ordinary functions (ES5 13.2.1, entering function code
/// per 10.4.3).
fn call_ordinary(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    let Extended::Function { scope, code } = ctx.heap.object(func).extended else {
        unreachable!("ordinary function without code");
    };
    let blob = ctx.code.get(code);
    let is_strict = blob.is_strict();
    let reuse_scope = blob.flags & flags::LEXICAL_ENV_NOT_NEEDED != 0;

    // 1-4. Compute the this binding.
    let this_binding = if is_strict {
        this.copy(&ctx.heap)
    } else if this.is_undefined() || this.is_null() {
        let global = ctx.global_object()?;
        ctx.heap.inc_ref(global);
        Value::Ref(global)
    } else {
        Value::Ref(convert::to_object(ctx, this)?)
    };

    // 5. Establish the variable environment.
    let env = if reuse_scope {
        ctx.heap.inc_ref(scope);
        scope
    } else {
        let env = envs::create_decl_env(ctx, Some(scope))?;
        bind_parameters(ctx, code, env, args)?;
        if blob.flags & flags::ARGUMENTS_NEEDED != 0 {
            create_arguments_object(ctx, func, env, args, is_strict)?;
        }
        env
    };

    let result = vm::run(ctx, code, &this_binding, env, args);

    ctx.heap.dec_ref(env);
    this_binding.free(&mut ctx.heap);
    result
}

/// Binds formal parameters as declarative bindings.
///
/// Parameter names are the leading `argument_end` entries of the blob's
/// literal pool, in declaration order; later duplicates win, matching
/// ES5 10.5 step 4.d.
fn bind_parameters(
    ctx: &mut Context<impl ResourceTracker>,
    code: CodeId,
    env: HeapRef,
    args: &[Value],
) -> JsResult<()> {
    let blob = ctx.code.get(code);
    for index in 0..blob.argument_end as usize {
        let name = match blob.literals.get(index) {
            Some(crate::bytecode::Literal::Ident(name)) => *name,
            _ => continue,
        };
        let value = args.get(index).map_or(Value::Undefined, |arg| arg.copy(&ctx.heap));
        envs::declare_binding(ctx, env, name, false)?;
        envs::set_ident_value(ctx, env, name, value, false)?;
    }
    Ok(())
}

/// Builds the Arguments object and binds it in the environment (ES5 10.6,
/// unmapped flavor).
fn create_arguments_object(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    env: HeapRef,
    args: &[Value],
    is_strict: bool,
) -> JsResult<()> {
    let object_proto = builtins::get_builtin(ctx, BuiltinId::ObjectPrototype)?;
    let arguments = object::create_object(ctx, Some(object_proto), true, ObjectType::Arguments)?;

    let length = i32::try_from(args.len()).unwrap_or(i32::MAX);
    let desc = PropDescriptor::data(Value::Int(length), PropAttrs::WRITABLE_CONFIGURABLE);
    object::define_own_property(ctx, arguments, Magic::Length.id(), desc, false)?;

    for (index, arg) in args.iter().enumerate() {
        let name = ctx.interns.intern_index(index as u32);
        let desc = PropDescriptor::data(arg.copy(&ctx.heap), PropAttrs::ALL);
        object::define_own_property(ctx, arguments, name, desc, false)?;
    }

    if is_strict {
        let thrower = builtins::get_builtin(ctx, BuiltinId::TypeErrorThrower)?;
        for name in [Magic::Callee, Magic::Caller] {
            let desc = PropDescriptor::accessor(Some(thrower), Some(thrower), PropAttrs::FIXED);
            object::define_own_property(ctx, arguments, name.id(), desc, false)?;
        }
    } else {
        ctx.heap.inc_ref(func);
        let desc = PropDescriptor::data(Value::Ref(func), PropAttrs::WRITABLE_CONFIGURABLE);
        object::define_own_property(ctx, arguments, Magic::Callee.id(), desc, false)?;
    }

    envs::declare_binding(ctx, env, Magic::Arguments.id(), false)?;
    envs::set_ident_value(ctx, env, Magic::Arguments.id(), Value::Ref(arguments), false)?;
    Ok(())
}

/// `[[Construct]]` (ES5 13.2.2 / 15.3.4.5.2).
pub(crate) fn construct(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    args: &[Value],
) -> JsResult<Value> {
    let (type_tag, is_builtin) = {
        let object = ctx.heap.object(func);
        (object.type_tag, object.is_builtin)
    };
    match type_tag {
        ObjectType::Function if is_builtin => builtins::dispatch_construct(ctx, func, args),
        ObjectType::Function | ObjectType::ExternalFunction => construct_simple_or_external(ctx, func, args),
        ObjectType::BoundFunction => {
            let target = bound_target(ctx, func)?;
            if !is_constructor(ctx, &Value::Ref(target)) {
                return Err(error::type_error(ctx, "bound target is not a constructor"));
            }
            let merged = merge_bound_args(ctx, func, args);
            construct(ctx, target, &merged)
        }
        _ => Err(error::type_error(ctx, "value is not a constructor")),
    }
}

fn construct_simple_or_external(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    args: &[Value],
) -> JsResult<Value> {
    // 5-7. The new object's prototype is the function's `prototype` when it
    // is an object, the Object prototype otherwise.
    let prototype_value = object::get(ctx, func, Magic::Prototype.id())?;
    let prototype = match prototype_value.object_ref(&ctx.heap) {
        Some(proto) => proto,
        None => builtins::get_builtin(ctx, BuiltinId::ObjectPrototype)?,
    };
    let new_object = object::create_object(ctx, Some(prototype), true, ObjectType::General)?;
    prototype_value.free(&mut ctx.heap);

    // 8-10. Call with the fresh object as `this`; an object result wins.
    let this = Value::Ref(new_object);
    let completion = match call(ctx, func, &this, args) {
        Ok(completion) => completion,
        Err(thrown) => {
            ctx.heap.dec_ref(new_object);
            return Err(thrown);
        }
    };
    if completion.is_object(&ctx.heap) {
        ctx.heap.dec_ref(new_object);
        Ok(completion)
    } else {
        completion.free(&mut ctx.heap);
        Ok(Value::Ref(new_object))
    }
}

/// `[[HasInstance]]` (ES5 15.3.5.3 / 15.3.4.5.3).
pub(crate) fn has_instance(
    ctx: &mut Context<impl ResourceTracker>,
    func: HeapRef,
    value: &Value,
) -> JsResult<bool> {
    match ctx.heap.object(func).type_tag {
        ObjectType::Function => {
            let Some(mut walker) = value.object_ref(&ctx.heap) else {
                return Ok(false);
            };
            let prototype_value = object::get(ctx, func, Magic::Prototype.id())?;
            let Some(prototype) = prototype_value.object_ref(&ctx.heap) else {
                prototype_value.free(&mut ctx.heap);
                return Err(error::type_error(ctx, "prototype is not an object"));
            };
            let mut found = false;
            loop {
                match ctx.heap.object(walker).prototype {
                    Some(parent) => {
                        if parent == prototype {
                            found = true;
                            break;
                        }
                        walker = parent;
                    }
                    None => break,
                }
            }
            prototype_value.free(&mut ctx.heap);
            Ok(found)
        }
        ObjectType::BoundFunction => {
            let target = bound_target(ctx, func)?;
            has_instance(ctx, target, value)
        }
        _ => Err(error::type_error(ctx, "value does not support instanceof")),
    }
}

fn bound_target(ctx: &mut Context<impl ResourceTracker>, func: HeapRef) -> JsResult<HeapRef> {
    match object::get_internal(ctx, func, InternalKey::BoundTarget) {
        Some(Value::Ref(target)) => Ok(target),
        _ => Err(error::type_error(ctx, "bound function without target")),
    }
}

/// Merges the stored bound arguments with the call arguments.
///
/// Only the value words are copied; the originals (the bound-args heap list
/// and the caller's slice) keep every payload alive across the nested call,
/// so no reference counts change here.
fn merge_bound_args(
    ctx: &Context<impl ResourceTracker>,
    func: HeapRef,
    args: &[Value],
) -> SmallVec<[Value; 8]> {
    let mut merged: SmallVec<[Value; 8]> = SmallVec::new();
    if let Some(Value::Ref(list)) = ctx
        .heap
        .object(func)
        .find_internal(InternalKey::BoundArgs)
        .map(Value::word_copy)
    {
        if let HeapData::List(values) = ctx.heap.get(list) {
            for value in values {
                merged.push(value.word_copy());
            }
        }
    }
    for value in args {
        merged.push(value.word_copy());
    }
    merged
}
