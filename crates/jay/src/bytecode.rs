//! Compact byte code: opcode taxonomy, compiled-code blobs, code table.
//!
//! The compiler emits a register-less stack machine encoding. Fused opcodes
//! (`*WithLiteral`, `AssignProp*Get`, ...) are not an optimisation bolted on
//! afterwards: they are the calling convention between the compiler's
//! last-opcode rewriting and the VM dispatcher, so both sides share the
//! operand layout table defined here.
//!
//! Instruction encoding is `opcode byte` followed by the operands named by
//! [`Opcode::layout`], in order. Literal operands are one byte wide unless
//! the blob's [`flags::UINT16_LITERALS`] is set; branch operands are always
//! two bytes, little endian.

use std::{cell::Cell, rc::Rc};

use strum::FromRepr;

use crate::intern::StringId;

/// Handle to a compiled-code blob stored in the context's code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct CodeId(pub(crate) u32);

/// Maximum call argument count; also the generic one-byte operand ceiling.
pub(crate) const MAX_BYTE_VALUE: usize = 255;

/// Maximum number of entries in one blob's literal pool.
pub(crate) const MAX_LITERALS: usize = u16::MAX as usize;

/// Number of pushed array items batched into one `ArrayAppend`.
pub(crate) const ARRAY_APPEND_BATCH: usize = 64;

/// Status flags of a compiled-code blob.
pub(crate) mod flags {
    /// Blob was compiled in strict mode.
    pub(crate) const STRICT: u16 = 0x01;
    /// The function body needs no own lexical environment; `[[Call]]` reuses
    /// the function's scope directly.
    pub(crate) const LEXICAL_ENV_NOT_NEEDED: u16 = 0x02;
    /// The body observes `arguments`; `[[Call]]` materialises the Arguments
    /// object before entering the VM.
    pub(crate) const ARGUMENTS_NEEDED: u16 = 0x04;
    /// Literal operands are encoded as u16 instead of u8.
    pub(crate) const UINT16_LITERALS: u16 = 0x08;
    /// Blob is an eval body; its completion value is the block result.
    pub(crate) const IS_EVAL: u16 = 0x10;
    /// Blob is a function body rather than a script top level.
    pub(crate) const IS_FUNCTION: u16 = 0x20;
}

/// Binary operator selector carried by `Binary*` and `BinaryAssign*` opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub(crate) enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    In,
    Instanceof,
}

/// Pure unary operator selector.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub(crate) enum UnaryOp {
    Plus,
    Negate,
    LogicalNot,
    BitNot,
    Typeof,
    Void,
}

/// Lvalue unary operator selector (rewrites the most recent load).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub(crate) enum LvalueOp {
    PreIncr,
    PreDecr,
    PostIncr,
    PostDecr,
    Delete,
    /// `typeof ident` goes through the lvalue path so unresolvable
    /// identifiers yield "undefined" instead of a ReferenceError.
    TypeofIdent,
}

/// Result mode of assignment-family instructions.
///
/// `PushResult` is the `parser_push_result` rewrite; `Block` feeds the
/// script/eval completion value instead of the operand stack.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub(crate) enum ResultMode {
    None,
    PushResult,
    Block,
}

/// One operand of an instruction, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperandSlot {
    /// Sub-operator byte (`BinOp` / `UnaryOp` / `LvalueOp`).
    SubOp,
    /// Result mode byte.
    Mode,
    /// Generic one-byte immediate (argument count, append count, number).
    Byte,
    /// First literal pool index.
    Lit1,
    /// Second literal pool index.
    Lit2,
    /// Branch offset, u16. Forward offsets are measured from the end of the
    /// instruction; `JumpBackward` encodes the backwards distance.
    Branch,
}

use OperandSlot::{Branch, Byte, Lit1, Lit2, Mode, SubOp};

/// The opcode set.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub(crate) enum Opcode {
    // Pushes
    PushLiteral,
    PushTwoLiterals,
    PushIdent,
    PushNumber0,
    PushNumberPos,
    PushNumberNeg,
    PushThis,
    PushTrue,
    PushFalse,
    PushNull,
    PushUndefined,
    PushElision,
    /// Base for assignments whose target is not a reference; produces a
    /// ReferenceError at runtime.
    PushUndefinedBase,

    // Object and array literals
    CreateObject,
    SetProperty,
    SetGetter,
    SetSetter,
    CreateArray,
    ArrayAppend,

    // Property reads
    PropGet,
    PropLiteralGet,
    PropLiteralLiteralGet,
    /// Like `PropGet` but keeps `base, name` under the pushed value, for
    /// compound assignment and method calls.
    AssignPropGet,
    AssignPropLiteralGet,
    AssignPropLiteralLiteralGet,
    /// Pushes the `(env-marker, name, current value)` triple for a compound
    /// assignment whose target is an identifier.
    AssignIdentGet,

    // Assignments
    AssignIdent,
    AssignLiteralIdent,
    Assign,
    AssignPropLiteral,
    BinaryAssign,
    BinaryAssignWithLiteral,

    // Unary operators
    Unary,
    UnaryWithLiteral,
    UnaryLvalue,
    UnaryLvalueIdent,
    UnaryLvaluePropLiteral,
    UnaryLvaluePropLiteralLiteral,

    // Binary operators
    Binary,
    BinaryWithLiteral,
    BinaryWithTwoLiterals,

    // Calls
    Call,
    Call0,
    CallProp,
    Call0Prop,
    CallEval,
    New,

    // Branches
    BranchIfLogicalTrue,
    BranchIfLogicalFalse,
    BranchIfTrueForward,
    BranchIfFalseForward,
    JumpForward,
    JumpBackward,

    // Statement plumbing
    Pop,
    PopBlock,
    Return,
    ReturnUndefined,
    ReturnBlock,
    Throw,
    VarDecl,
}

impl Opcode {
    /// Operand layout, shared by the emitter's encoder and the VM's decoder.
    pub(crate) fn layout(self) -> &'static [OperandSlot] {
        match self {
            Self::PushLiteral
            | Self::PushIdent
            | Self::PropLiteralGet
            | Self::AssignPropLiteralGet
            | Self::AssignIdentGet
            | Self::SetProperty
            | Self::SetGetter
            | Self::SetSetter
            | Self::VarDecl => &[Lit1],
            Self::PushTwoLiterals | Self::PropLiteralLiteralGet | Self::AssignPropLiteralLiteralGet => {
                &[Lit1, Lit2]
            }
            Self::PushNumberPos | Self::PushNumberNeg | Self::ArrayAppend | Self::Call | Self::CallProp
            | Self::CallEval | Self::New => &[Byte],
            Self::AssignIdent => &[Mode, Lit1],
            Self::AssignLiteralIdent => &[Mode, Lit1, Lit2],
            Self::Assign => &[Mode],
            Self::AssignPropLiteral => &[Mode, Lit1],
            Self::BinaryAssign => &[Mode, SubOp],
            Self::BinaryAssignWithLiteral => &[Mode, SubOp, Lit1],
            Self::Unary => &[SubOp],
            Self::UnaryWithLiteral => &[SubOp, Lit1],
            Self::UnaryLvalue => &[SubOp, Mode],
            Self::UnaryLvalueIdent => &[SubOp, Mode, Lit1],
            Self::UnaryLvaluePropLiteral => &[SubOp, Mode, Lit1],
            Self::UnaryLvaluePropLiteralLiteral => &[SubOp, Mode, Lit1, Lit2],
            Self::Binary => &[SubOp],
            Self::BinaryWithLiteral => &[SubOp, Lit1],
            Self::BinaryWithTwoLiterals => &[SubOp, Lit1, Lit2],
            Self::BranchIfLogicalTrue
            | Self::BranchIfLogicalFalse
            | Self::BranchIfTrueForward
            | Self::BranchIfFalseForward
            | Self::JumpForward
            | Self::JumpBackward => &[Branch],
            _ => &[],
        }
    }

    /// Encoded instruction size in bytes, given the literal operand width.
    pub(crate) fn encoded_size(self, wide_literals: bool) -> usize {
        let literal_width = if wide_literals { 2 } else { 1 };
        1 + self
            .layout()
            .iter()
            .map(|slot| match slot {
                Lit1 | Lit2 => literal_width,
                Branch => 2,
                SubOp | Mode | Byte => 1,
            })
            .sum::<usize>()
    }
}

/// A parse-time literal stored in a blob's literal pool.
///
/// Identifier literals resolve through the lexical environment when pushed;
/// function literals own a reference on their nested blob which is released
/// when the owning blob is freed.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) enum Literal {
    Ident(StringId),
    Str(StringId),
    Number(f64),
    Code(CodeId),
    Regexp { source: StringId, flags: StringId },
}

/// An immutable compiled-code blob.
///
/// Functions hold a `CodeId` pointing at one of these; the blob is freed when
/// the last function referencing it is freed (see [`CodeTable::deref`]).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) struct CompiledCode {
    /// Status flag bits (see [`flags`]).
    pub(crate) flags: u16,
    /// Number of declared formal parameters; the lazy `length` property of
    /// ordinary functions reads this field.
    pub(crate) argument_end: u16,
    /// Number of local variable bindings declared by the body.
    pub(crate) register_end: u16,
    /// Maximum operand stack depth, computed by the emitter.
    pub(crate) stack_limit: u16,
    /// Literal pool.
    pub(crate) literals: Vec<Literal>,
    /// Packed instruction stream.
    pub(crate) code: Vec<u8>,
}

impl CompiledCode {
    pub(crate) fn is_strict(&self) -> bool {
        self.flags & flags::STRICT != 0
    }

    pub(crate) fn wide_literals(&self) -> bool {
        self.flags & flags::UINT16_LITERALS != 0
    }

    /// Every nested blob referenced from the literal pool.
    pub(crate) fn nested_code_ids(&self) -> impl Iterator<Item = CodeId> + '_ {
        self.literals.iter().filter_map(|lit| match lit {
            Literal::Code(id) => Some(*id),
            _ => None,
        })
    }
}

/// Reference-counted storage for compiled-code blobs.
///
/// Blobs are shared between the functions created from them (and, for nested
/// function literals, by their enclosing blob), so entries carry an explicit
/// reference count mirroring the object heap's discipline.
#[derive(Debug, Default)]
pub(crate) struct CodeTable {
    entries: Vec<Option<CodeEntry>>,
    free_list: Vec<u32>,
}

#[derive(Debug)]
struct CodeEntry {
    refcount: Cell<u32>,
    code: Rc<CompiledCode>,
}

impl CodeTable {
    /// Stores a blob with refcount 1 and returns its id.
    pub(crate) fn insert(&mut self, code: CompiledCode) -> CodeId {
        let entry = CodeEntry {
            refcount: Cell::new(1),
            code: Rc::new(code),
        };
        if let Some(index) = self.free_list.pop() {
            self.entries[index as usize] = Some(entry);
            CodeId(index)
        } else {
            self.entries.push(Some(entry));
            CodeId(u32::try_from(self.entries.len() - 1).expect("code table exceeds u32 ids"))
        }
    }

    /// Shared handle to a blob, cheap to clone for the VM's run loop.
    ///
    /// # Panics
    /// Panics when the id is stale.
    #[must_use]
    pub(crate) fn get(&self, id: CodeId) -> Rc<CompiledCode> {
        Rc::clone(
            &self
                .entries
                .get(id.0 as usize)
                .expect("CodeTable::get: id out of range")
                .as_ref()
                .expect("CodeTable::get: blob already freed")
                .code,
        )
    }

    /// Increments a blob's reference count.
    pub(crate) fn code_ref(&self, id: CodeId) {
        let entry = self
            .entries
            .get(id.0 as usize)
            .expect("CodeTable::code_ref: id out of range")
            .as_ref()
            .expect("CodeTable::code_ref: blob already freed");
        entry.refcount.set(entry.refcount.get() + 1);
    }

    /// Decrements a blob's reference count, freeing it (and releasing nested
    /// function blobs) at zero.
    pub(crate) fn code_deref(&mut self, id: CodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let slot = self
                .entries
                .get_mut(id.0 as usize)
                .expect("CodeTable::code_deref: id out of range");
            let entry = slot.as_mut().expect("CodeTable::code_deref: blob already freed");
            let count = entry.refcount.get();
            if count > 1 {
                entry.refcount.set(count - 1);
                continue;
            }
            let entry = slot.take().expect("CodeTable::code_deref: blob already freed");
            pending.extend(entry.code.nested_code_ids());
            self.free_list.push(id.0);
        }
    }

    /// Replaces a live entry's blob, keeping its reference count. Used by
    /// the snapshot loader while rewriting nested code ids.
    pub(crate) fn replace(&mut self, id: CodeId, code: CompiledCode) {
        let entry = self
            .entries
            .get_mut(id.0 as usize)
            .expect("CodeTable::replace: id out of range")
            .as_mut()
            .expect("CodeTable::replace: blob already freed");
        entry.code = Rc::new(code);
    }

    /// Current refcount, or 0 when freed. Used by tests.
    pub(crate) fn refcount(&self, id: CodeId) -> u32 {
        self.entries
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .map_or(0, |entry| entry.refcount.get())
    }

    /// True when the id denotes a live blob.
    pub(crate) fn is_live(&self, id: CodeId) -> bool {
        self.entries.get(id.0 as usize).is_some_and(Option::is_some)
    }
}

/// Decoded operands of one instruction.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Operands {
    pub(crate) sub_op: u8,
    pub(crate) mode: u8,
    pub(crate) byte: u8,
    pub(crate) lit1: u16,
    pub(crate) lit2: u16,
    pub(crate) branch: u16,
}

/// Decodes the operands following an opcode byte, advancing `pc`.
///
/// The encoder in the emitter writes through the same [`Opcode::layout`]
/// table, which is what keeps the two sides in sync.
pub(crate) fn decode_operands(op: Opcode, code: &[u8], pc: &mut usize, wide_literals: bool) -> Operands {
    let mut operands = Operands::default();
    for slot in op.layout() {
        match slot {
            SubOp => {
                operands.sub_op = code[*pc];
                *pc += 1;
            }
            Mode => {
                operands.mode = code[*pc];
                *pc += 1;
            }
            Byte => {
                operands.byte = code[*pc];
                *pc += 1;
            }
            Lit1 | Lit2 => {
                let value = if wide_literals {
                    let v = u16::from_le_bytes([code[*pc], code[*pc + 1]]);
                    *pc += 2;
                    v
                } else {
                    let v = u16::from(code[*pc]);
                    *pc += 1;
                    v
                };
                if matches!(slot, Lit1) {
                    operands.lit1 = value;
                } else {
                    operands.lit2 = value;
                }
            }
            Branch => {
                operands.branch = u16::from_le_bytes([code[*pc], code[*pc + 1]]);
                *pc += 2;
            }
        }
    }
    operands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_code() -> CompiledCode {
        CompiledCode {
            flags: 0,
            argument_end: 0,
            register_end: 0,
            stack_limit: 0,
            literals: Vec::new(),
            code: Vec::new(),
        }
    }

    #[test]
    fn code_table_ref_counting() {
        let mut table = CodeTable::default();
        let id = table.insert(empty_code());
        assert_eq!(table.refcount(id), 1);
        table.code_ref(id);
        assert_eq!(table.refcount(id), 2);
        table.code_deref(id);
        assert!(table.is_live(id));
        table.code_deref(id);
        assert!(!table.is_live(id));
    }

    #[test]
    fn deref_releases_nested_function_blobs() {
        let mut table = CodeTable::default();
        let inner = table.insert(empty_code());
        let mut outer_code = empty_code();
        outer_code.literals.push(Literal::Code(inner));
        let outer = table.insert(outer_code);
        table.code_deref(outer);
        assert!(!table.is_live(outer));
        assert!(!table.is_live(inner));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut table = CodeTable::default();
        let a = table.insert(empty_code());
        table.code_deref(a);
        let b = table.insert(empty_code());
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn encoded_size_tracks_literal_width() {
        assert_eq!(Opcode::PushLiteral.encoded_size(false), 2);
        assert_eq!(Opcode::PushLiteral.encoded_size(true), 3);
        assert_eq!(Opcode::PushTwoLiterals.encoded_size(true), 5);
        assert_eq!(Opcode::Pop.encoded_size(false), 1);
        assert_eq!(Opcode::JumpForward.encoded_size(false), 3);
        assert_eq!(Opcode::BinaryAssignWithLiteral.encoded_size(false), 4);
    }

    #[test]
    fn operand_decoding_round_trips() {
        // Hand-encode UnaryLvaluePropLiteralLiteral with wide literals:
        // sub_op, mode, lit1 (u16), lit2 (u16).
        let code = [3u8, 1, 0x34, 0x12, 0x78, 0x56];
        let mut pc = 0;
        let operands = decode_operands(Opcode::UnaryLvaluePropLiteralLiteral, &code, &mut pc, true);
        assert_eq!(pc, 6);
        assert_eq!(operands.sub_op, 3);
        assert_eq!(operands.mode, 1);
        assert_eq!(operands.lit1, 0x1234);
        assert_eq!(operands.lit2, 0x5678);
    }
}
