//! Byte-code dispatcher.
//!
//! `run` evaluates one compiled-code blob against an operand stack. The
//! fused opcodes emitted by the compiler are the calling convention here:
//! every `*WithLiteral` form resolves its literal inline, the
//! `AssignProp*Get` family leaves `base, name` under the pushed value for
//! compound assignment and method calls, and assignment-family opcodes
//! carry a result mode that routes the produced value to the stack, the
//! block result, or nowhere.
//!
//! Values on the operand stack are owned (one reference each); whoever pops
//! them frees them or hands them on.

use std::rc::Rc;

use crate::{
    bytecode::{
        BinOp, CodeId, CompiledCode, Literal, LvalueOp, Opcode, ResultMode, UnaryOp, decode_operands,
        flags,
    },
    builtins::{self, BuiltinId, error},
    compiler::{self, CompileKind},
    context::Context,
    convert::{self, Hint},
    envs,
    exception::{JsResult, Throw},
    function,
    heap::{HeapRef, ResourceTracker},
    intern::{Magic, StringId},
    object::{self, Extended, ObjectType, PropAttrs, PropDescriptor},
    value::{self, Value, strict_equals},
};

/// Evaluates a blob. `this` and `args` are borrowed; the completion value
/// is owned by the caller.
pub(crate) fn run(
    ctx: &mut Context<impl ResourceTracker>,
    code: CodeId,
    this: &Value,
    env: HeapRef,
    args: &[Value],
) -> JsResult<Value> {
    let blob = ctx.code.get(code);
    let mut frame = Frame {
        blob: Rc::clone(&blob),
        stack: Vec::with_capacity(blob.stack_limit as usize),
        block_result: Value::Undefined,
        env,
    };
    let outcome = execute(ctx, &mut frame, this, args);

    for leftover in frame.stack.drain(..) {
        leftover.free(&mut ctx.heap);
    }
    frame.block_result.free(&mut ctx.heap);
    ctx.flush_freed_code();
    outcome
}

struct Frame {
    blob: Rc<CompiledCode>,
    stack: Vec<Value>,
    block_result: Value,
    env: HeapRef,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }
}

fn execute(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &mut Frame,
    this: &Value,
    args: &[Value],
) -> JsResult<Value> {
    let _ = args; // bound into the environment by [[Call]]
    let blob = Rc::clone(&frame.blob);
    let wide = blob.wide_literals();
    let strict = blob.is_strict();
    let code = blob.code.as_slice();
    let mut pc = 0usize;

    while pc < code.len() {
        let op = Opcode::from_repr(code[pc]).expect("invalid opcode in compiled code");
        pc += 1;
        let operands = decode_operands(op, code, &mut pc, wide);

        match op {
            Opcode::PushLiteral | Opcode::PushIdent => {
                let value = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                frame.push(value);
            }
            Opcode::PushTwoLiterals => {
                let first = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                frame.push(first);
                let second = match resolve_literal(ctx, frame, &blob, operands.lit2) {
                    Ok(second) => second,
                    Err(thrown) => {
                        let first = frame.pop();
                        first.free(&mut ctx.heap);
                        return Err(thrown);
                    }
                };
                frame.push(second);
            }
            Opcode::PushNumber0 => frame.push(Value::Int(0)),
            Opcode::PushNumberPos => frame.push(Value::Int(i32::from(operands.byte) + 1)),
            Opcode::PushNumberNeg => frame.push(Value::Int(-(i32::from(operands.byte) + 1))),
            Opcode::PushThis => frame.push(this.copy(&ctx.heap)),
            Opcode::PushTrue => frame.push(Value::Bool(true)),
            Opcode::PushFalse => frame.push(Value::Bool(false)),
            Opcode::PushNull => frame.push(Value::Null),
            Opcode::PushUndefined => frame.push(Value::Undefined),
            Opcode::PushElision => frame.push(Value::Empty),
            Opcode::PushUndefinedBase => {
                frame.push(Value::Empty);
                frame.push(Value::Empty);
            }

            Opcode::CreateObject => {
                let prototype = builtins::get_builtin(ctx, BuiltinId::ObjectPrototype)?;
                let obj = object::create_object(ctx, Some(prototype), true, ObjectType::General)?;
                frame.push(Value::Ref(obj));
            }
            Opcode::CreateArray => {
                let array = builtins::array::create_array(ctx, 0)?;
                frame.push(Value::Ref(array));
            }
            Opcode::SetProperty => {
                let value = frame.pop();
                let name = literal_property_name(ctx, frame, &blob, operands.lit1)?;
                let Some(obj) = frame.stack.last().and_then(|top| top.object_ref(&ctx.heap)) else {
                    value.free(&mut ctx.heap);
                    return Err(error::type_error(ctx, "object literal target missing"));
                };
                let desc = PropDescriptor::data(value, PropAttrs::ALL);
                object::define_own_property(ctx, obj, name, desc, false)?;
            }
            Opcode::SetGetter | Opcode::SetSetter => {
                let func = frame.pop();
                let name = literal_property_name(ctx, frame, &blob, operands.lit1)?;
                let Some(obj) = frame.stack.last().and_then(|top| top.object_ref(&ctx.heap)) else {
                    func.free(&mut ctx.heap);
                    return Err(error::type_error(ctx, "object literal target missing"));
                };
                let accessor = func.object_ref(&ctx.heap);
                let mut desc = PropDescriptor {
                    enumerable: Some(true),
                    configurable: Some(true),
                    ..PropDescriptor::default()
                };
                if op == Opcode::SetGetter {
                    desc.get = Some(accessor);
                } else {
                    desc.set = Some(accessor);
                }
                let result = object::define_own_property(ctx, obj, name, desc, false);
                func.free(&mut ctx.heap);
                result?;
            }
            Opcode::ArrayAppend => {
                append_array_items(ctx, frame, usize::from(operands.byte))?;
            }

            Opcode::PropGet => {
                let name_value = frame.pop();
                let base = frame.pop();
                let name = value_property_name(ctx, &name_value);
                name_value.free(&mut ctx.heap);
                let name = name?;
                let result = member_get(ctx, &base, name);
                base.free(&mut ctx.heap);
                frame.push(result?);
            }
            Opcode::PropLiteralGet => {
                let base = frame.pop();
                let name = literal_property_name(ctx, frame, &blob, operands.lit1)?;
                let result = member_get(ctx, &base, name);
                base.free(&mut ctx.heap);
                frame.push(result?);
            }
            Opcode::PropLiteralLiteralGet => {
                let base = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                let name = match literal_property_name(ctx, frame, &blob, operands.lit2) {
                    Ok(name) => name,
                    Err(thrown) => {
                        base.free(&mut ctx.heap);
                        return Err(thrown);
                    }
                };
                let result = member_get(ctx, &base, name);
                base.free(&mut ctx.heap);
                frame.push(result?);
            }

            Opcode::AssignPropGet => {
                let name_value = frame.pop();
                let base = frame.pop();
                let name = value_property_name(ctx, &name_value);
                name_value.free(&mut ctx.heap);
                let name = name?;
                let result = member_get(ctx, &base, name);
                frame.push(base);
                frame.push(Value::Str(name));
                frame.push(result?);
            }
            Opcode::AssignPropLiteralGet => {
                let base = frame.pop();
                let name = literal_property_name(ctx, frame, &blob, operands.lit1)?;
                let result = member_get(ctx, &base, name);
                frame.push(base);
                frame.push(Value::Str(name));
                frame.push(result?);
            }
            Opcode::AssignPropLiteralLiteralGet => {
                let base = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                let name = match literal_property_name(ctx, frame, &blob, operands.lit2) {
                    Ok(name) => name,
                    Err(thrown) => {
                        base.free(&mut ctx.heap);
                        return Err(thrown);
                    }
                };
                let result = member_get(ctx, &base, name);
                frame.push(base);
                frame.push(Value::Str(name));
                frame.push(result?);
            }
            Opcode::AssignIdentGet => {
                let name = literal_ident(&blob, operands.lit1);
                let current = envs::get_ident_value(ctx, frame.env, name, false)?;
                frame.push(Value::Empty);
                frame.push(Value::Str(name));
                frame.push(current);
            }

            Opcode::AssignIdent => {
                let value = frame.pop();
                let name = literal_ident(&blob, operands.lit1);
                store_mode_result(ctx, frame, operands.mode, &value)?;
                envs::set_ident_value(ctx, frame.env, name, value, strict)?;
            }
            Opcode::AssignLiteralIdent => {
                let value = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                let name = literal_ident(&blob, operands.lit2);
                store_mode_result(ctx, frame, operands.mode, &value)?;
                envs::set_ident_value(ctx, frame.env, name, value, strict)?;
            }
            Opcode::Assign => {
                let value = frame.pop();
                let name_value = frame.pop();
                let base = frame.pop();
                store_mode_result(ctx, frame, operands.mode, &value)?;
                assign_to_reference(ctx, frame, base, name_value, value, strict)?;
            }
            Opcode::AssignPropLiteral => {
                let value = frame.pop();
                let base = frame.pop();
                let name = literal_property_name(ctx, frame, &blob, operands.lit1)?;
                store_mode_result(ctx, frame, operands.mode, &value)?;
                assign_to_reference(ctx, frame, base, Value::Str(name), value, strict)?;
            }
            Opcode::BinaryAssign | Opcode::BinaryAssignWithLiteral => {
                let rhs = if op == Opcode::BinaryAssignWithLiteral {
                    resolve_literal(ctx, frame, &blob, operands.lit1)?
                } else {
                    frame.pop()
                };
                let current = frame.pop();
                let name_value = frame.pop();
                let base = frame.pop();
                let binop = BinOp::from_repr(operands.sub_op).expect("invalid binary operator");
                let result = match binary_operation(ctx, binop, current, rhs) {
                    Ok(result) => result,
                    Err(thrown) => {
                        name_value.free(&mut ctx.heap);
                        base.free(&mut ctx.heap);
                        return Err(thrown);
                    }
                };
                store_mode_result(ctx, frame, operands.mode, &result)?;
                assign_to_reference(ctx, frame, base, name_value, result, strict)?;
            }

            Opcode::Unary | Opcode::UnaryWithLiteral => {
                let operand = if op == Opcode::UnaryWithLiteral {
                    resolve_literal(ctx, frame, &blob, operands.lit1)?
                } else {
                    frame.pop()
                };
                let unop = UnaryOp::from_repr(operands.sub_op).expect("invalid unary operator");
                let result = unary_operation(ctx, unop, operand)?;
                frame.push(result);
            }

            Opcode::UnaryLvalueIdent => {
                let lvop = LvalueOp::from_repr(operands.sub_op).expect("invalid lvalue operator");
                let name = literal_ident(&blob, operands.lit1);
                ident_lvalue_operation(ctx, frame, lvop, operands.mode, name, strict)?;
            }
            Opcode::UnaryLvaluePropLiteral => {
                let lvop = LvalueOp::from_repr(operands.sub_op).expect("invalid lvalue operator");
                let base = frame.pop();
                let name = literal_property_name(ctx, frame, &blob, operands.lit1)?;
                let result = prop_lvalue_operation(ctx, frame, lvop, operands.mode, &base, name);
                base.free(&mut ctx.heap);
                result?;
            }
            Opcode::UnaryLvaluePropLiteralLiteral => {
                let lvop = LvalueOp::from_repr(operands.sub_op).expect("invalid lvalue operator");
                let base = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                let name = match literal_property_name(ctx, frame, &blob, operands.lit2) {
                    Ok(name) => name,
                    Err(thrown) => {
                        base.free(&mut ctx.heap);
                        return Err(thrown);
                    }
                };
                let result = prop_lvalue_operation(ctx, frame, lvop, operands.mode, &base, name);
                base.free(&mut ctx.heap);
                result?;
            }
            Opcode::UnaryLvalue => {
                let lvop = LvalueOp::from_repr(operands.sub_op).expect("invalid lvalue operator");
                let name_value = frame.pop();
                let base = frame.pop();
                if base.is_empty() {
                    name_value.free(&mut ctx.heap);
                    if lvop == LvalueOp::Delete {
                        // `delete` of a non-reference is true.
                        if operands.mode != ResultMode::None as u8 {
                            frame.push(Value::Bool(true));
                        }
                        continue;
                    }
                    return Err(error::reference_error(ctx, "invalid assignment target"));
                }
                let name = value_property_name(ctx, &name_value);
                name_value.free(&mut ctx.heap);
                let name = name?;
                let result = prop_lvalue_operation(ctx, frame, lvop, operands.mode, &base, name);
                base.free(&mut ctx.heap);
                result?;
            }

            Opcode::Binary | Opcode::BinaryWithLiteral | Opcode::BinaryWithTwoLiterals => {
                let (lhs, rhs) = match op {
                    Opcode::Binary => {
                        let rhs = frame.pop();
                        let lhs = frame.pop();
                        (lhs, rhs)
                    }
                    Opcode::BinaryWithLiteral => {
                        let rhs = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                        let lhs = frame.pop();
                        (lhs, rhs)
                    }
                    _ => {
                        let lhs = resolve_literal(ctx, frame, &blob, operands.lit1)?;
                        let rhs = match resolve_literal(ctx, frame, &blob, operands.lit2) {
                            Ok(rhs) => rhs,
                            Err(thrown) => {
                                lhs.free(&mut ctx.heap);
                                return Err(thrown);
                            }
                        };
                        (lhs, rhs)
                    }
                };
                let binop = BinOp::from_repr(operands.sub_op).expect("invalid binary operator");
                let result = binary_operation(ctx, binop, lhs, rhs)?;
                frame.push(result);
            }

            Opcode::Call | Opcode::Call0 => {
                let argc = if op == Opcode::Call { usize::from(operands.byte) } else { 0 };
                call_function_value(ctx, frame, argc, None)?;
            }
            Opcode::CallProp | Opcode::Call0Prop => {
                let argc = if op == Opcode::CallProp { usize::from(operands.byte) } else { 0 };
                call_property(ctx, frame, argc)?;
            }
            Opcode::CallEval => {
                call_eval(ctx, frame, usize::from(operands.byte), this, strict)?;
            }
            Opcode::New => {
                construct_value(ctx, frame, usize::from(operands.byte))?;
            }

            Opcode::BranchIfLogicalTrue | Opcode::BranchIfLogicalFalse => {
                let keep_on_true = op == Opcode::BranchIfLogicalTrue;
                let truthy = frame
                    .stack
                    .last()
                    .expect("logical branch needs an operand")
                    .to_boolean(&ctx.heap, &ctx.interns);
                if truthy == keep_on_true {
                    pc += usize::from(operands.branch);
                } else {
                    let dropped = frame.pop();
                    dropped.free(&mut ctx.heap);
                }
            }
            Opcode::BranchIfTrueForward | Opcode::BranchIfFalseForward => {
                let condition = frame.pop();
                let truthy = condition.to_boolean(&ctx.heap, &ctx.interns);
                condition.free(&mut ctx.heap);
                if truthy == (op == Opcode::BranchIfTrueForward) {
                    pc += usize::from(operands.branch);
                }
            }
            Opcode::JumpForward => pc += usize::from(operands.branch),
            Opcode::JumpBackward => pc -= usize::from(operands.branch),

            Opcode::Pop => {
                let dropped = frame.pop();
                dropped.free(&mut ctx.heap);
            }
            Opcode::PopBlock => {
                let value = frame.pop();
                let old = std::mem::replace(&mut frame.block_result, value);
                old.free(&mut ctx.heap);
            }
            Opcode::Return => return Ok(frame.pop()),
            Opcode::ReturnUndefined => return Ok(Value::Undefined),
            Opcode::ReturnBlock => {
                return Ok(std::mem::replace(&mut frame.block_result, Value::Undefined));
            }
            Opcode::Throw => {
                let value = frame.pop();
                return Err(Throw(value));
            }
            Opcode::VarDecl => {
                let name = literal_ident(&blob, operands.lit1);
                let configurable = blob.flags & flags::IS_EVAL != 0;
                envs::declare_binding(ctx, frame.env, name, configurable)?;
            }
        }
    }
    Ok(Value::Undefined)
}

/// Materialises a literal-pool entry into a value: identifiers resolve
/// through the environment, function literals close over the current
/// environment, regexp literals become their record objects.
fn resolve_literal(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &Frame,
    blob: &CompiledCode,
    index: u16,
) -> JsResult<Value> {
    match blob.literals[index as usize] {
        Literal::Ident(name) => envs::get_ident_value(ctx, frame.env, name, false),
        Literal::Str(value) => Ok(Value::Str(value)),
        Literal::Number(x) => convert::make_number(ctx, x),
        Literal::Code(code) => {
            let func = function::create_function_object(ctx, frame.env, code)?;
            Ok(Value::Ref(func))
        }
        Literal::Regexp { source, flags: regexp_flags } => {
            let prototype = builtins::get_builtin(ctx, BuiltinId::ObjectPrototype)?;
            let obj = object::create_object(ctx, Some(prototype), true, ObjectType::General)?;
            let source_desc = PropDescriptor::data(Value::Str(source), PropAttrs::FIXED);
            object::define_own_property(ctx, obj, Magic::Source.id(), source_desc, false)?;
            let flags_desc = PropDescriptor::data(Value::Str(regexp_flags), PropAttrs::FIXED);
            object::define_own_property(ctx, obj, Magic::Flags.id(), flags_desc, false)?;
            Ok(Value::Ref(obj))
        }
    }
}

/// The identifier a literal names; panics when the pool entry is not an
/// identifier (compiler invariant).
fn literal_ident(blob: &CompiledCode, index: u16) -> StringId {
    match blob.literals[index as usize] {
        Literal::Ident(name) => name,
        _ => panic!("literal is not an identifier"),
    }
}

/// Resolves a name-position literal to an interned property name.
///
/// Strings name themselves; numbers use their canonical spelling;
/// identifier literals resolve to their value first (computed member
/// access fused over an identifier index expression).
fn literal_property_name(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &Frame,
    blob: &CompiledCode,
    index: u16,
) -> JsResult<StringId> {
    match blob.literals[index as usize] {
        Literal::Str(value) => Ok(value),
        Literal::Number(x) => Ok(ctx.interns.intern(&value::number_to_string(x))),
        Literal::Ident(name) => {
            let resolved = envs::get_ident_value(ctx, frame.env, name, false)?;
            let result = value_property_name(ctx, &resolved);
            resolved.free(&mut ctx.heap);
            result
        }
        _ => Err(error::type_error(ctx, "invalid property name literal")),
    }
}

/// ToString + intern for a computed property name.
fn value_property_name(ctx: &mut Context<impl ResourceTracker>, name: &Value) -> JsResult<StringId> {
    if let Value::Str(s) = name {
        return Ok(*s);
    }
    let spelled = convert::to_string_owned(ctx, name)?;
    Ok(ctx.interns.intern(&spelled))
}

/// Property read through an automatically wrapped base (ES5 11.2.1).
fn member_get(ctx: &mut Context<impl ResourceTracker>, base: &Value, name: StringId) -> JsResult<Value> {
    if base.is_empty() {
        return Err(error::reference_error(ctx, "base of member access is unresolvable"));
    }
    let obj = convert::to_object(ctx, base)?;
    let result = object::get(ctx, obj, name);
    ctx.heap.dec_ref(obj);
    result
}

/// Routes an assignment-family result according to the instruction's mode.
/// The stored value itself is consumed by the store; the mode receives its
/// own reference.
fn store_mode_result(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &mut Frame,
    mode: u8,
    value: &Value,
) -> JsResult<()> {
    match ResultMode::from_repr(mode).expect("invalid result mode") {
        ResultMode::None => {}
        ResultMode::PushResult => {
            let copy = value.copy(&ctx.heap);
            frame.push(copy);
        }
        ResultMode::Block => {
            let copy = value.copy(&ctx.heap);
            let old = std::mem::replace(&mut frame.block_result, copy);
            old.free(&mut ctx.heap);
        }
    }
    Ok(())
}

/// PutValue over a `(base, name)` reference pair. An `Empty` base marks an
/// identifier target (`AssignIdentGet`) or a runtime ReferenceError
/// (`PushUndefinedBase`), told apart by whether the name is a string.
fn assign_to_reference(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &mut Frame,
    base: Value,
    name_value: Value,
    value: Value,
    strict: bool,
) -> JsResult<()> {
    if base.is_empty() {
        if let Value::Str(name) = name_value {
            return envs::set_ident_value(ctx, frame.env, name, value, strict);
        }
        name_value.free(&mut ctx.heap);
        value.free(&mut ctx.heap);
        return Err(error::reference_error(ctx, "invalid assignment target"));
    }
    let name = value_property_name(ctx, &name_value);
    name_value.free(&mut ctx.heap);
    let name = match name {
        Ok(name) => name,
        Err(thrown) => {
            base.free(&mut ctx.heap);
            value.free(&mut ctx.heap);
            return Err(thrown);
        }
    };
    let obj = convert::to_object(ctx, &base);
    base.free(&mut ctx.heap);
    let obj = match obj {
        Ok(obj) => obj,
        Err(thrown) => {
            value.free(&mut ctx.heap);
            return Err(thrown);
        }
    };
    let result = object::put(ctx, obj, name, value, strict);
    ctx.heap.dec_ref(obj);
    result.map(|_| ())
}

/// Prefix/postfix increment and decrement, delete, on an identifier.
fn ident_lvalue_operation(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &mut Frame,
    op: LvalueOp,
    mode: u8,
    name: StringId,
    strict: bool,
) -> JsResult<()> {
    match op {
        LvalueOp::Delete => {
            let deleted = envs::delete_binding(ctx, frame.env, name)?;
            if mode != ResultMode::None as u8 {
                frame.push(Value::Bool(deleted));
            }
            Ok(())
        }
        LvalueOp::TypeofIdent => {
            let value = envs::get_ident_value(ctx, frame.env, name, true)?;
            let type_name = convert::typeof_of(ctx, &value);
            value.free(&mut ctx.heap);
            frame.push(Value::Str(ctx.interns.intern(type_name)));
            Ok(())
        }
        LvalueOp::PreIncr | LvalueOp::PreDecr | LvalueOp::PostIncr | LvalueOp::PostDecr => {
            let current = envs::get_ident_value(ctx, frame.env, name, false)?;
            let old = convert::to_number(ctx, &current);
            current.free(&mut ctx.heap);
            let old = old?;
            let delta = if matches!(op, LvalueOp::PreIncr | LvalueOp::PostIncr) { 1.0 } else { -1.0 };
            let new = old + delta;
            let stored = convert::make_number(ctx, new)?;
            let observed = if matches!(op, LvalueOp::PostIncr | LvalueOp::PostDecr) { old } else { new };
            if mode != ResultMode::None as u8 {
                let result = convert::make_number(ctx, observed)?;
                push_mode_result(ctx, frame, mode, result);
            }
            envs::set_ident_value(ctx, frame.env, name, stored, strict)
        }
    }
}

/// The same operations over a property reference.
fn prop_lvalue_operation(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &mut Frame,
    op: LvalueOp,
    mode: u8,
    base: &Value,
    name: StringId,
) -> JsResult<()> {
    let obj = convert::to_object(ctx, base)?;
    let outcome = (|| -> JsResult<()> {
        match op {
            LvalueOp::Delete => {
                let deleted = object::delete(ctx, obj, name, false)?;
                if mode != ResultMode::None as u8 {
                    frame.push(Value::Bool(deleted));
                }
                Ok(())
            }
            LvalueOp::TypeofIdent => {
                let value = object::get(ctx, obj, name)?;
                let type_name = convert::typeof_of(ctx, &value);
                value.free(&mut ctx.heap);
                frame.push(Value::Str(ctx.interns.intern(type_name)));
                Ok(())
            }
            LvalueOp::PreIncr | LvalueOp::PreDecr | LvalueOp::PostIncr | LvalueOp::PostDecr => {
                let current = object::get(ctx, obj, name)?;
                let old = convert::to_number(ctx, &current);
                current.free(&mut ctx.heap);
                let old = old?;
                let delta = if matches!(op, LvalueOp::PreIncr | LvalueOp::PostIncr) { 1.0 } else { -1.0 };
                let new = old + delta;
                let stored = convert::make_number(ctx, new)?;
                let observed = if matches!(op, LvalueOp::PostIncr | LvalueOp::PostDecr) { old } else { new };
                if mode != ResultMode::None as u8 {
                    let result = convert::make_number(ctx, observed)?;
                    push_mode_result(ctx, frame, mode, result);
                }
                object::put(ctx, obj, name, stored, false)?;
                Ok(())
            }
        }
    })();
    ctx.heap.dec_ref(obj);
    outcome
}

fn push_mode_result(ctx: &mut Context<impl ResourceTracker>, frame: &mut Frame, mode: u8, value: Value) {
    match ResultMode::from_repr(mode).expect("invalid result mode") {
        ResultMode::None => value.free(&mut ctx.heap),
        ResultMode::PushResult => frame.push(value),
        ResultMode::Block => {
            let old = std::mem::replace(&mut frame.block_result, value);
            old.free(&mut ctx.heap);
        }
    }
}

/// Pops `argc` arguments plus the callee, invokes it, pushes the result.
/// `prop_parts` carries `(name, base)` when the callee came off a property.
fn call_function_value(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &mut Frame,
    argc: usize,
    prop_parts: Option<(Value, Value)>,
) -> JsResult<()> {
    let split = frame.stack.len() - argc;
    let call_args: Vec<Value> = frame.stack.split_off(split);
    let callee = frame.pop();

    let (this_value, name_value, base_value) = match prop_parts {
        Some((name, base)) => {
            let this_value = base.copy(&ctx.heap);
            (this_value, Some(name), Some(base))
        }
        None => (Value::Undefined, None, None),
    };

    let result = match callee.object_ref(&ctx.heap).filter(|obj| function::is_callable_object(ctx, *obj)) {
        Some(func) => function::call(ctx, func, &this_value, &call_args),
        None => Err(error::type_error(ctx, "value is not a function")),
    };

    for arg in call_args {
        arg.free(&mut ctx.heap);
    }
    callee.free(&mut ctx.heap);
    this_value.free(&mut ctx.heap);
    if let Some(name) = name_value {
        name.free(&mut ctx.heap);
    }
    if let Some(base) = base_value {
        base.free(&mut ctx.heap);
    }
    frame.push(result?);
    Ok(())
}

/// `CallProp` convention: `[base, name, func, args...]` with `this = base`.
fn call_property(ctx: &mut Context<impl ResourceTracker>, frame: &mut Frame, argc: usize) -> JsResult<()> {
    let split = frame.stack.len() - argc;
    let call_args: Vec<Value> = frame.stack.split_off(split);
    let callee = frame.pop();
    let name = frame.pop();
    let base = frame.pop();
    frame.push(callee);
    for arg in call_args {
        frame.push(arg);
    }
    call_function_value(ctx, frame, argc, Some((name, base)))
}

/// Direct eval (ES5 10.4.2): only calls that syntactically name `eval` and
/// resolve to the built-in eval run in the caller's environment.
fn call_eval(
    ctx: &mut Context<impl ResourceTracker>,
    frame: &mut Frame,
    argc: usize,
    this: &Value,
    strict: bool,
) -> JsResult<()> {
    let split = frame.stack.len() - argc;
    let call_args: Vec<Value> = frame.stack.split_off(split);
    let callee = frame.pop();

    let result = if is_eval_routine(ctx, &callee) {
        match call_args.first() {
            Some(source_value) => match source_value.as_str(&ctx.heap, &ctx.interns).map(ToOwned::to_owned) {
                Some(source) => {
                    match compiler::compile(ctx, &source, CompileKind::Eval { strict }) {
                        Ok(code) => {
                            let result = run(ctx, code, this, frame.env, &[]);
                            ctx.code.code_deref(code);
                            result
                        }
                        Err(parse_error) => Err(error::syntax_error(ctx, parse_error.kind.message())),
                    }
                }
                None => Ok(source_value.copy(&ctx.heap)),
            },
            None => Ok(Value::Undefined),
        }
    } else {
        match callee.object_ref(&ctx.heap).filter(|obj| function::is_callable_object(ctx, *obj)) {
            Some(func) => function::call(ctx, func, &Value::Undefined, &call_args),
            None => Err(error::type_error(ctx, "value is not a function")),
        }
    };

    for arg in call_args {
        arg.free(&mut ctx.heap);
    }
    callee.free(&mut ctx.heap);
    frame.push(result?);
    Ok(())
}

/// True when the callee is specifically the global `eval` routine.
fn is_eval_routine(ctx: &Context<impl ResourceTracker>, callee: &Value) -> bool {
    callee.object_ref(&ctx.heap).is_some_and(|obj| {
        match ctx.heap.object(obj).extended {
            Extended::Builtin {
                builtin_id: BuiltinId::Global,
                routine_id,
                ..
            } => routine_id as usize == BuiltinId::COUNT + 1,
            _ => false,
        }
    })
}

fn construct_value(ctx: &mut Context<impl ResourceTracker>, frame: &mut Frame, argc: usize) -> JsResult<()> {
    let split = frame.stack.len() - argc;
    let call_args: Vec<Value> = frame.stack.split_off(split);
    let callee = frame.pop();

    let result = match callee.object_ref(&ctx.heap).filter(|_| function::is_constructor(ctx, &callee)) {
        Some(func) => function::construct(ctx, func, &call_args),
        None => Err(error::type_error(ctx, "value is not a constructor")),
    };

    for arg in call_args {
        arg.free(&mut ctx.heap);
    }
    callee.free(&mut ctx.heap);
    frame.push(result?);
    Ok(())
}

/// Appends the pushed batch to the array under it; `Empty` markers are
/// elisions that grow the length without creating an element.
fn append_array_items(ctx: &mut Context<impl ResourceTracker>, frame: &mut Frame, count: usize) -> JsResult<()> {
    let split = frame.stack.len() - count;
    let items: Vec<Value> = frame.stack.split_off(split);
    let Some(array) = frame.stack.last().and_then(|top| top.object_ref(&ctx.heap)) else {
        for item in items {
            item.free(&mut ctx.heap);
        }
        return Err(error::type_error(ctx, "array literal target missing"));
    };
    let mut length = object::array_length(ctx, array)?;
    for item in items {
        if item.is_empty() {
            length += 1;
            continue;
        }
        let name = ctx.interns.intern_index(length);
        object::put(ctx, array, name, item, false)?;
        length += 1;
    }
    let length_value = convert::make_number(ctx, f64::from(length))?;
    object::put(ctx, array, Magic::Length.id(), length_value, false)?;
    Ok(())
}

/// Binary operator evaluation; consumes both operands.
fn binary_operation(
    ctx: &mut Context<impl ResourceTracker>,
    op: BinOp,
    lhs: Value,
    rhs: Value,
) -> JsResult<Value> {
    let result = binary_operation_inner(ctx, op, &lhs, &rhs);
    lhs.free(&mut ctx.heap);
    rhs.free(&mut ctx.heap);
    result
}

fn binary_operation_inner(
    ctx: &mut Context<impl ResourceTracker>,
    op: BinOp,
    lhs: &Value,
    rhs: &Value,
) -> JsResult<Value> {
    match op {
        BinOp::Add => {
            let left = convert::to_primitive(ctx, lhs, Hint::Default)?;
            let right = match convert::to_primitive(ctx, rhs, Hint::Default) {
                Ok(right) => right,
                Err(thrown) => {
                    left.free(&mut ctx.heap);
                    return Err(thrown);
                }
            };
            let result = if left.is_string(&ctx.heap) || right.is_string(&ctx.heap) {
                let mut s = convert::to_string_owned(ctx, &left)?;
                s.push_str(&convert::to_string_owned(ctx, &right)?);
                convert::make_string(ctx, s)
            } else {
                let x = convert::to_number(ctx, &left)?;
                let y = convert::to_number(ctx, &right)?;
                convert::make_number(ctx, x + y)
            };
            left.free(&mut ctx.heap);
            right.free(&mut ctx.heap);
            result
        }
        BinOp::Subtract | BinOp::Multiply | BinOp::Divide | BinOp::Remainder => {
            let x = convert::to_number(ctx, lhs)?;
            let y = convert::to_number(ctx, rhs)?;
            let value = match op {
                BinOp::Subtract => x - y,
                BinOp::Multiply => x * y,
                BinOp::Divide => x / y,
                // Rust's % already matches the ES remainder (dividend sign).
                _ => x % y,
            };
            convert::make_number(ctx, value)
        }
        BinOp::Equal => Ok(Value::Bool(abstract_equals(ctx, lhs, rhs)?)),
        BinOp::NotEqual => Ok(Value::Bool(!abstract_equals(ctx, lhs, rhs)?)),
        BinOp::StrictEqual => Ok(Value::Bool(strict_equals(&ctx.heap, &ctx.interns, lhs, rhs))),
        BinOp::StrictNotEqual => Ok(Value::Bool(!strict_equals(&ctx.heap, &ctx.interns, lhs, rhs))),
        BinOp::Less | BinOp::Greater | BinOp::LessEqual | BinOp::GreaterEqual => {
            let (result, undefined) = abstract_relational(ctx, op, lhs, rhs)?;
            Ok(Value::Bool(result && !undefined))
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::ShiftLeft | BinOp::ShiftRight => {
            let x = value::to_int32(convert::to_number(ctx, lhs)?);
            let y = convert::to_number(ctx, rhs)?;
            let value = match op {
                BinOp::BitAnd => x & value::to_int32(y),
                BinOp::BitOr => x | value::to_int32(y),
                BinOp::BitXor => x ^ value::to_int32(y),
                BinOp::ShiftLeft => x.wrapping_shl(value::to_uint32(y) & 31),
                _ => x.wrapping_shr(value::to_uint32(y) & 31),
            };
            Ok(Value::Int(value))
        }
        BinOp::ShiftRightUnsigned => {
            let x = value::to_uint32(convert::to_number(ctx, lhs)?);
            let shift = value::to_uint32(convert::to_number(ctx, rhs)?) & 31;
            convert::make_number(ctx, f64::from(x >> shift))
        }
        BinOp::In => {
            let Some(obj) = rhs.object_ref(&ctx.heap) else {
                return Err(error::type_error(ctx, "right operand of 'in' is not an object"));
            };
            let name = value_property_name(ctx, lhs)?;
            Ok(Value::Bool(object::has_property(ctx, obj, name)?))
        }
        BinOp::Instanceof => {
            let Some(func) = rhs.object_ref(&ctx.heap) else {
                return Err(error::type_error(ctx, "right operand of instanceof is not callable"));
            };
            Ok(Value::Bool(function::has_instance(ctx, func, lhs)?))
        }
    }
}

/// Abstract equality (ES5 11.9.3).
fn abstract_equals(ctx: &mut Context<impl ResourceTracker>, a: &Value, b: &Value) -> JsResult<bool> {
    let a_is_nullish = a.is_undefined() || a.is_null();
    let b_is_nullish = b.is_undefined() || b.is_null();
    if a_is_nullish || b_is_nullish {
        return Ok(a_is_nullish && b_is_nullish);
    }
    let a_is_number = a.is_number(&ctx.heap);
    let b_is_number = b.is_number(&ctx.heap);
    let a_is_string = a.is_string(&ctx.heap);
    let b_is_string = b.is_string(&ctx.heap);
    if (a_is_number && b_is_number) || (a_is_string && b_is_string) || (a.is_boolean() && b.is_boolean()) {
        return Ok(strict_equals(&ctx.heap, &ctx.interns, a, b));
    }
    if a.is_object(&ctx.heap) && b.is_object(&ctx.heap) {
        return Ok(strict_equals(&ctx.heap, &ctx.interns, a, b));
    }
    // Boolean operands convert to numbers first.
    if a.is_boolean() || b.is_boolean() || (a_is_number && b_is_string) || (a_is_string && b_is_number) {
        let x = convert::to_number(ctx, a)?;
        let y = convert::to_number(ctx, b)?;
        return Ok(x == y);
    }
    // Object against primitive: convert the object and retry.
    if a.is_object(&ctx.heap) {
        let primitive = convert::to_primitive(ctx, a, Hint::Default)?;
        let result = abstract_equals(ctx, &primitive, b);
        primitive.free(&mut ctx.heap);
        return result;
    }
    if b.is_object(&ctx.heap) {
        let primitive = convert::to_primitive(ctx, b, Hint::Default)?;
        let result = abstract_equals(ctx, a, &primitive);
        primitive.free(&mut ctx.heap);
        return result;
    }
    Ok(false)
}

/// Abstract relational comparison (ES5 11.8.5). Returns `(result,
/// is_undefined)`; NaN operands make the comparison undefined, which every
/// relational operator maps to false.
fn abstract_relational(
    ctx: &mut Context<impl ResourceTracker>,
    op: BinOp,
    lhs: &Value,
    rhs: &Value,
) -> JsResult<(bool, bool)> {
    let left = convert::to_primitive(ctx, lhs, Hint::Number)?;
    let right = match convert::to_primitive(ctx, rhs, Hint::Number) {
        Ok(right) => right,
        Err(thrown) => {
            left.free(&mut ctx.heap);
            return Err(thrown);
        }
    };
    let outcome = if left.is_string(&ctx.heap) && right.is_string(&ctx.heap) {
        let x = left.as_str(&ctx.heap, &ctx.interns).expect("checked string");
        let y = right.as_str(&ctx.heap, &ctx.interns).expect("checked string");
        let result = match op {
            BinOp::Less => x < y,
            BinOp::Greater => x > y,
            BinOp::LessEqual => x <= y,
            _ => x >= y,
        };
        Ok((result, false))
    } else {
        let x = convert::to_number(ctx, &left);
        let y = convert::to_number(ctx, &right);
        match (x, y) {
            (Ok(x), Ok(y)) => {
                if x.is_nan() || y.is_nan() {
                    Ok((false, true))
                } else {
                    let result = match op {
                        BinOp::Less => x < y,
                        BinOp::Greater => x > y,
                        BinOp::LessEqual => x <= y,
                        _ => x >= y,
                    };
                    Ok((result, false))
                }
            }
            (Err(thrown), _) | (_, Err(thrown)) => Err(thrown),
        }
    };
    left.free(&mut ctx.heap);
    right.free(&mut ctx.heap);
    outcome
}

/// Unary operator evaluation; consumes the operand.
fn unary_operation(ctx: &mut Context<impl ResourceTracker>, op: UnaryOp, operand: Value) -> JsResult<Value> {
    let result = match op {
        UnaryOp::Plus => {
            let x = convert::to_number(ctx, &operand)?;
            convert::make_number(ctx, x)
        }
        UnaryOp::Negate => {
            let x = convert::to_number(ctx, &operand)?;
            convert::make_number(ctx, -x)
        }
        UnaryOp::LogicalNot => Ok(Value::Bool(!operand.to_boolean(&ctx.heap, &ctx.interns))),
        UnaryOp::BitNot => {
            let x = convert::to_number(ctx, &operand)?;
            Ok(Value::Int(!value::to_int32(x)))
        }
        UnaryOp::Typeof => {
            let type_name = convert::typeof_of(ctx, &operand);
            Ok(Value::Str(ctx.interns.intern(type_name)))
        }
        UnaryOp::Void => Ok(Value::Undefined),
    };
    operand.free(&mut ctx.heap);
    result
}
