//! Byte-code emitter with a one-instruction rewrite window.
//!
//! The most recently emitted instruction sits in the `last` register instead
//! of the output stream, where the expression compiler can rewrite it: fuse
//! a push with the operation that consumes it, turn a property get into its
//! keep-base form, or upgrade a no-result assignment into a result-producing
//! one. `flush` commits the register; anything already committed is final.
//!
//! Instructions are kept structured until [`Emitter::build`], which picks
//! the literal operand width, lays out the byte stream and resolves branch
//! distances in one pass.

use ahash::AHashMap;

use crate::{
    bytecode::{CompiledCode, Literal, MAX_LITERALS, Opcode, OperandSlot, ResultMode, flags},
    exception::ParseErrorKind,
    intern::StringId,
};

/// One structured instruction; which fields matter is decided by
/// [`Opcode::layout`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Instr {
    pub(crate) op: Opcode,
    pub(crate) sub_op: u8,
    pub(crate) mode: u8,
    pub(crate) byte: u8,
    pub(crate) lit1: u16,
    pub(crate) lit2: u16,
    /// Branch target as an instruction index; `u32::MAX` = unpatched.
    pub(crate) target: u32,
}

impl Instr {
    pub(crate) fn new(op: Opcode) -> Self {
        Self {
            op,
            sub_op: 0,
            mode: ResultMode::None as u8,
            byte: 0,
            lit1: 0,
            lit2: 0,
            target: u32::MAX,
        }
    }

    /// The push-literal family eligible for fusion rewrites.
    pub(crate) fn is_push_literal(&self) -> bool {
        matches!(self.op, Opcode::PushLiteral | Opcode::PushIdent)
    }

    /// Operations that produce no value in their default form and have a
    /// result-producing rewrite.
    pub(crate) fn is_no_result(&self) -> bool {
        self.mode == ResultMode::None as u8
            && matches!(
                self.op,
                Opcode::AssignIdent
                    | Opcode::AssignLiteralIdent
                    | Opcode::Assign
                    | Opcode::AssignPropLiteral
                    | Opcode::BinaryAssign
                    | Opcode::BinaryAssignWithLiteral
                    | Opcode::UnaryLvalue
                    | Opcode::UnaryLvalueIdent
                    | Opcode::UnaryLvaluePropLiteral
                    | Opcode::UnaryLvaluePropLiteralLiteral
            )
    }
}

/// Label for a forward branch awaiting its target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JumpLabel(usize);

pub(crate) struct Emitter {
    instrs: Vec<Instr>,
    /// The one-instruction rewrite register.
    pub(crate) last: Option<Instr>,
    literals: Vec<Literal>,
    ident_index: AHashMap<StringId, u16>,
    string_index: AHashMap<StringId, u16>,
    number_index: AHashMap<u64, u16>,
    stack_depth: i32,
    max_stack_depth: i32,
}

impl Emitter {
    pub(crate) fn new() -> Self {
        Self {
            instrs: Vec::new(),
            last: None,
            literals: Vec::new(),
            ident_index: AHashMap::new(),
            string_index: AHashMap::new(),
            number_index: AHashMap::new(),
            stack_depth: 0,
            max_stack_depth: 0,
        }
    }

    /// Commits the rewrite register to the stream.
    pub(crate) fn flush(&mut self) {
        if let Some(instr) = self.last.take() {
            self.adjust_stack(stack_effect(&instr));
            self.instrs.push(instr);
        }
    }

    /// Emits an instruction through the rewrite register.
    pub(crate) fn emit(&mut self, instr: Instr) {
        self.flush();
        self.last = Some(instr);
    }

    pub(crate) fn emit_op(&mut self, op: Opcode) {
        self.emit(Instr::new(op));
    }

    /// Emits a forward branch. Branches never sit in the rewrite register;
    /// both the register and the branch are committed immediately.
    #[must_use]
    pub(crate) fn emit_forward_branch(&mut self, op: Opcode) -> JumpLabel {
        self.flush();
        let instr = Instr::new(op);
        self.adjust_stack(stack_effect(&instr));
        self.instrs.push(instr);
        JumpLabel(self.instrs.len() - 1)
    }

    /// Points a forward branch at the current position.
    pub(crate) fn patch_branch(&mut self, label: JumpLabel) {
        self.flush();
        let target = u32::try_from(self.instrs.len()).expect("instruction count exceeds u32");
        self.instrs[label.0].target = target;
    }

    /// Emits a backward jump to a known instruction index.
    pub(crate) fn emit_backward_jump(&mut self, target: u32) {
        self.flush();
        let mut instr = Instr::new(Opcode::JumpBackward);
        instr.target = target;
        self.instrs.push(instr);
    }

    /// Current instruction index; flushes so the index is stable. Use as the
    /// target of later backward jumps.
    pub(crate) fn current_position(&mut self) -> u32 {
        self.flush();
        u32::try_from(self.instrs.len()).expect("instruction count exceeds u32")
    }

    /// The `parser_push_result` rewrite: upgrade a pending no-result
    /// operation into its result-producing form and commit it.
    pub(crate) fn push_result(&mut self) {
        if let Some(last) = &mut self.last {
            if last.is_no_result() {
                last.mode = ResultMode::PushResult as u8;
                self.flush();
            }
        }
    }

    /// Whether the expression so far left a value on the stack (used by the
    /// statement and block expression modes).
    pub(crate) fn last_is_no_result(&self) -> bool {
        self.last.as_ref().is_some_and(Instr::is_no_result)
    }

    /// Manual stack adjustment for constructs whose byte code does not
    /// reflect the runtime stack (the ternary operator's two arms).
    pub(crate) fn adjust_stack_depth(&mut self, delta: i32) {
        self.adjust_stack(delta);
    }

    fn adjust_stack(&mut self, delta: i32) {
        self.stack_depth += delta;
        if self.stack_depth < 0 {
            // Branch-merge bookkeeping may undershoot; clamp, the limit only
            // needs the maximum.
            self.stack_depth = 0;
        }
        self.max_stack_depth = self.max_stack_depth.max(self.stack_depth);
    }

    pub(crate) fn literal(&self, index: u16) -> &Literal {
        &self.literals[index as usize]
    }

    pub(crate) fn add_ident_literal(&mut self, name: StringId) -> Result<u16, ParseErrorKind> {
        if let Some(&index) = self.ident_index.get(&name) {
            return Ok(index);
        }
        let index = self.push_literal(Literal::Ident(name))?;
        self.ident_index.insert(name, index);
        Ok(index)
    }

    pub(crate) fn add_string_literal(&mut self, value: StringId) -> Result<u16, ParseErrorKind> {
        if let Some(&index) = self.string_index.get(&value) {
            return Ok(index);
        }
        let index = self.push_literal(Literal::Str(value))?;
        self.string_index.insert(value, index);
        Ok(index)
    }

    pub(crate) fn add_number_literal(&mut self, value: f64) -> Result<u16, ParseErrorKind> {
        let bits = value.to_bits();
        if let Some(&index) = self.number_index.get(&bits) {
            return Ok(index);
        }
        let index = self.push_literal(Literal::Number(value))?;
        self.number_index.insert(bits, index);
        Ok(index)
    }

    pub(crate) fn add_code_literal(&mut self, code: crate::bytecode::CodeId) -> Result<u16, ParseErrorKind> {
        self.push_literal(Literal::Code(code))
    }

    pub(crate) fn add_regexp_literal(
        &mut self,
        source: StringId,
        regexp_flags: StringId,
    ) -> Result<u16, ParseErrorKind> {
        self.push_literal(Literal::Regexp {
            source,
            flags: regexp_flags,
        })
    }

    fn push_literal(&mut self, literal: Literal) -> Result<u16, ParseErrorKind> {
        if self.literals.len() >= MAX_LITERALS {
            return Err(ParseErrorKind::LiteralLimitReached);
        }
        self.literals.push(literal);
        Ok((self.literals.len() - 1) as u16)
    }

    /// Serializes the instruction stream into a compiled-code blob.
    ///
    /// Chooses the literal operand width, assigns byte offsets, and encodes
    /// branch distances; a branch that cannot fit u16 is a parse error.
    pub(crate) fn build(
        mut self,
        mut code_flags: u16,
        argument_end: u16,
        register_end: u16,
    ) -> Result<CompiledCode, ParseErrorKind> {
        self.flush();

        let wide_literals = self.literals.len() > 256;
        if wide_literals {
            code_flags |= flags::UINT16_LITERALS;
        }

        // First pass: byte offset of every instruction.
        let mut offsets = Vec::with_capacity(self.instrs.len() + 1);
        let mut offset = 0usize;
        for instr in &self.instrs {
            offsets.push(offset);
            offset += instr.op.encoded_size(wide_literals);
        }
        offsets.push(offset);

        // Second pass: encode.
        let mut code = Vec::with_capacity(offset);
        for (index, instr) in self.instrs.iter().enumerate() {
            code.push(instr.op as u8);
            for slot in instr.op.layout() {
                match slot {
                    OperandSlot::SubOp => code.push(instr.sub_op),
                    OperandSlot::Mode => code.push(instr.mode),
                    OperandSlot::Byte => code.push(instr.byte),
                    OperandSlot::Lit1 | OperandSlot::Lit2 => {
                        let value = if matches!(slot, OperandSlot::Lit1) {
                            instr.lit1
                        } else {
                            instr.lit2
                        };
                        if wide_literals {
                            code.extend_from_slice(&value.to_le_bytes());
                        } else {
                            code.push(value as u8);
                        }
                    }
                    OperandSlot::Branch => {
                        let target_index = instr.target as usize;
                        let target_offset = *offsets.get(target_index).ok_or(ParseErrorKind::JumpLimitReached)?;
                        let after = offsets[index] + instr.op.encoded_size(wide_literals);
                        let distance = if instr.op == Opcode::JumpBackward {
                            after.checked_sub(target_offset)
                        } else {
                            target_offset.checked_sub(after)
                        };
                        let distance = distance
                            .and_then(|d| u16::try_from(d).ok())
                            .ok_or(ParseErrorKind::JumpLimitReached)?;
                        code.extend_from_slice(&distance.to_le_bytes());
                    }
                }
            }
        }

        Ok(CompiledCode {
            flags: code_flags,
            argument_end,
            register_end,
            stack_limit: u16::try_from(self.max_stack_depth).unwrap_or(u16::MAX),
            literals: self.literals,
            code,
        })
    }
}

/// Net operand-stack effect of an instruction, evaluated when it is
/// committed (rewrites may change the effect while it is pending).
fn stack_effect(instr: &Instr) -> i32 {
    use Opcode::*;
    let push_result = i32::from(instr.mode == ResultMode::PushResult as u8);
    match instr.op {
        PushLiteral | PushIdent | PushNumber0 | PushNumberPos | PushNumberNeg | PushThis | PushTrue | PushFalse
        | PushNull | PushUndefined | PushElision | CreateObject | CreateArray => 1,
        PushTwoLiterals | PushUndefinedBase => 2,
        SetProperty | SetGetter | SetSetter | Pop | PopBlock | Return | Throw => -1,
        ArrayAppend => -i32::from(instr.byte),
        PropGet => -1,
        PropLiteralGet => 0,
        PropLiteralLiteralGet => 1,
        AssignPropGet => 1,
        AssignPropLiteralGet => 2,
        AssignPropLiteralLiteralGet | AssignIdentGet => 3,
        AssignIdent => -1 + push_result,
        AssignLiteralIdent => push_result,
        Assign => -3 + push_result,
        AssignPropLiteral => -2 + push_result,
        BinaryAssign => -4 + push_result,
        BinaryAssignWithLiteral => -3 + push_result,
        Unary => 0,
        UnaryWithLiteral => 1,
        UnaryLvalue => -2 + push_result,
        UnaryLvalueIdent => push_result,
        UnaryLvaluePropLiteral => -1 + push_result,
        UnaryLvaluePropLiteralLiteral => push_result,
        Binary => -1,
        BinaryWithLiteral => 0,
        BinaryWithTwoLiterals => 1,
        Call | CallEval | New => -i32::from(instr.byte),
        Call0 => 0,
        CallProp => -(i32::from(instr.byte) + 2),
        Call0Prop => -2,
        // Logical branches keep the value on the taken path; counting them
        // as neutral overestimates the limit, never underestimates it.
        BranchIfLogicalTrue | BranchIfLogicalFalse => 0,
        BranchIfTrueForward | BranchIfFalseForward => -1,
        JumpForward | JumpBackward | ReturnUndefined | ReturnBlock | VarDecl => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::decode_operands;

    #[test]
    fn emit_keeps_one_instruction_pending() {
        let mut emitter = Emitter::new();
        emitter.emit_op(Opcode::PushNumber0);
        assert!(emitter.last.is_some());
        emitter.emit_op(Opcode::Pop);
        // The first instruction was committed by the second emit.
        let code = emitter.build(0, 0, 0).unwrap();
        assert_eq!(code.code, vec![Opcode::PushNumber0 as u8, Opcode::Pop as u8]);
    }

    #[test]
    fn push_result_upgrades_pending_assignments() {
        let mut emitter = Emitter::new();
        let mut assign = Instr::new(Opcode::AssignIdent);
        assign.lit1 = 0;
        emitter.emit(assign);
        assert!(emitter.last_is_no_result());
        emitter.push_result();
        let code = emitter.build(0, 0, 0).unwrap();
        let mut pc = 1;
        let operands = decode_operands(Opcode::AssignIdent, &code.code, &mut pc, false);
        assert_eq!(operands.mode, ResultMode::PushResult as u8);
    }

    #[test]
    fn forward_branch_distances_measure_from_instruction_end() {
        let mut emitter = Emitter::new();
        let label = emitter.emit_forward_branch(Opcode::JumpForward);
        emitter.emit_op(Opcode::PushNumber0);
        emitter.emit_op(Opcode::Pop);
        emitter.patch_branch(label);
        emitter.emit_op(Opcode::ReturnUndefined);
        let code = emitter.build(0, 0, 0).unwrap();
        // JumpForward is 3 bytes; the skipped region is 2 bytes.
        assert_eq!(&code.code[..3], &[Opcode::JumpForward as u8, 2, 0]);
    }

    #[test]
    fn backward_jump_distances_measure_back_to_the_target() {
        let mut emitter = Emitter::new();
        let top = emitter.current_position();
        emitter.emit_op(Opcode::PushNumber0);
        emitter.emit_op(Opcode::Pop);
        emitter.emit_backward_jump(top);
        let code = emitter.build(0, 0, 0).unwrap();
        // Offset of the jump is 2; its end is 5; distance back to 0 is 5.
        assert_eq!(&code.code[2..], &[Opcode::JumpBackward as u8, 5, 0]);
    }

    #[test]
    fn literal_pool_dedupes_by_kind() {
        let mut emitter = Emitter::new();
        let a = emitter.add_ident_literal(StringId::from_index(9)).unwrap();
        let b = emitter.add_ident_literal(StringId::from_index(9)).unwrap();
        let c = emitter.add_string_literal(StringId::from_index(9)).unwrap();
        let d = emitter.add_number_literal(1.5).unwrap();
        let e = emitter.add_number_literal(1.5).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(d, e);
    }

    #[test]
    fn stack_limit_tracks_the_high_water_mark() {
        let mut emitter = Emitter::new();
        emitter.emit_op(Opcode::PushNumber0);
        emitter.emit_op(Opcode::PushNumber0);
        let mut two = Instr::new(Opcode::PushTwoLiterals);
        two.lit1 = 0;
        two.lit2 = 0;
        emitter.emit(two);
        emitter.emit_op(Opcode::Pop);
        emitter.emit_op(Opcode::Pop);
        emitter.emit_op(Opcode::Pop);
        emitter.emit_op(Opcode::Pop);
        let code = emitter.build(0, 0, 0).unwrap();
        assert_eq!(code.stack_limit, 4);
    }
}
