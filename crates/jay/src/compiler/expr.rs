//! Recursive-descent expression compiler with last-opcode fusion.
//!
//! The grammar walk follows the classic shape: a unary prologue stacks
//! prefix operators, a primary dispatch pushes the operand, a postfix loop
//! handles member access and calls, and a precedence-driven operator stack
//! folds binary operators. At every step the emitter's rewrite register is
//! inspected so common idioms collapse into fused opcodes: two pushes into
//! `PushTwoLiterals`, a push feeding a binary operator into
//! `BinaryWithLiteral`, a property get feeding a call into the keep-base
//! `AssignProp*Get` forms, and so on.

use super::{Instr, Parser, StackEntry, parse_options};
use crate::{
    bytecode::{BinOp, LvalueOp, MAX_BYTE_VALUE, Opcode, ResultMode, UnaryOp, ARRAY_APPEND_BATCH},
    exception::{ParseError, ParseErrorKind},
    heap::ResourceTracker,
    intern::Magic,
    lexer::{FIRST_BINARY_OP, TokenKind},
};

/// Binary-token precedences, indexed by `kind - FIRST_BINARY_OP`.
///
/// Level 3 is the comma/assignment group; multiplicative operators sit at
/// the top with 14. Assignment operators and the logical pair are compared
/// against `threshold + 1` to get right-to-left evaluation.
static PRECEDENCE: [u8; 36] = [
    3, // ,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, // = += -= *= /= %= <<= >>= >>>= &= |= ^=
    4, // ||
    5, // &&
    6, // |
    7, // ^
    8, // &
    10, 10, 10, 10, // == != === !==
    11, 11, 11, 11, 11, 11, // < > <= >= in instanceof
    12, 12, 12, // << >> >>>
    13, 13, // + -
    14, 14, 14, // * / %
];

fn precedence(kind: TokenKind) -> u8 {
    PRECEDENCE[kind as usize - FIRST_BINARY_OP as usize]
}

fn binop_of(kind: TokenKind) -> BinOp {
    match kind {
        TokenKind::Add | TokenKind::AssignAdd => BinOp::Add,
        TokenKind::Subtract | TokenKind::AssignSubtract => BinOp::Subtract,
        TokenKind::Multiply | TokenKind::AssignMultiply => BinOp::Multiply,
        TokenKind::Divide | TokenKind::AssignDivide => BinOp::Divide,
        TokenKind::Remainder | TokenKind::AssignRemainder => BinOp::Remainder,
        TokenKind::ShiftLeft | TokenKind::AssignShiftLeft => BinOp::ShiftLeft,
        TokenKind::ShiftRight | TokenKind::AssignShiftRight => BinOp::ShiftRight,
        TokenKind::UShiftRight | TokenKind::AssignUShiftRight => BinOp::ShiftRightUnsigned,
        TokenKind::BitAnd | TokenKind::AssignBitAnd => BinOp::BitAnd,
        TokenKind::BitOr | TokenKind::AssignBitOr => BinOp::BitOr,
        TokenKind::BitXor | TokenKind::AssignBitXor => BinOp::BitXor,
        TokenKind::Equal => BinOp::Equal,
        TokenKind::NotEqual => BinOp::NotEqual,
        TokenKind::StrictEqual => BinOp::StrictEqual,
        TokenKind::StrictNotEqual => BinOp::StrictNotEqual,
        TokenKind::Less => BinOp::Less,
        TokenKind::Greater => BinOp::Greater,
        TokenKind::LessEqual => BinOp::LessEqual,
        TokenKind::GreaterEqual => BinOp::GreaterEqual,
        TokenKind::KeywordIn => BinOp::In,
        TokenKind::KeywordInstanceof => BinOp::Instanceof,
        _ => unreachable!("token is not a pure binary operator"),
    }
}

impl<T: ResourceTracker> Parser<'_, '_, T> {
    /// Expression entry point (design section 4.E, "Expression forms").
    pub(super) fn parse_expression(&mut self, mut options: u8) -> Result<(), ParseError> {
        let mut grouping_level: usize = 0;
        self.stack.push(StackEntry::ExpressionStart);

        loop {
            if options & parse_options::HAS_LITERAL != 0 {
                debug_assert!(self.emitter.last.as_ref().is_some_and(Instr::is_push_literal));
                // Only the first primary is supplied by the caller.
                options &= !parse_options::HAS_LITERAL;
            } else {
                self.parse_unary_expression(&mut grouping_level)?;
            }

            loop {
                self.process_unary_expression()?;

                // The engine flushes binary opcodes at or above this
                // precedence; right-to-left operators bump the threshold.
                let min_precedence = if self.lexer.token.kind.is_binary_op() {
                    let mut threshold = precedence(self.lexer.token.kind);
                    if self.lexer.token.kind.is_assign_op()
                        || matches!(self.lexer.token.kind, TokenKind::LogicalOr | TokenKind::LogicalAnd)
                    {
                        threshold += 1;
                    }
                    threshold
                } else {
                    0
                };
                self.process_binary_opcodes(min_precedence)?;

                if self.lexer.token.kind == TokenKind::RightParen
                    && matches!(self.stack.last(), Some(StackEntry::Grouping))
                {
                    debug_assert!(grouping_level > 0);
                    grouping_level -= 1;
                    self.stack.pop();
                    self.next_token()?;
                    continue;
                }
                if self.lexer.token.kind == TokenKind::QuestionMark {
                    self.parse_conditional()?;
                    continue;
                }
                break;
            }

            if self.lexer.token.kind == TokenKind::Comma
                && (options & parse_options::NO_COMMA == 0 || grouping_level > 0)
            {
                if !self.emitter.last_is_no_result() {
                    self.emitter.emit_op(Opcode::Pop);
                }
                self.next_token()?;
                continue;
            }
            if self.lexer.token.kind.is_binary_op() && self.lexer.token.kind != TokenKind::Comma {
                self.append_binary_token()?;
                self.next_token()?;
                continue;
            }
            break;
        }

        if grouping_level != 0 {
            return Err(self.error(ParseErrorKind::RightParenExpected));
        }
        let top = self.stack.pop();
        debug_assert!(matches!(top, Some(StackEntry::ExpressionStart)));

        if options & parse_options::STATEMENT != 0 {
            if !self.emitter.last_is_no_result() {
                self.emitter.emit_op(Opcode::Pop);
            }
        } else if options & parse_options::BLOCK != 0 {
            self.end_block_expression();
        } else {
            self.emitter.push_result();
        }
        Ok(())
    }

    /// Routes the expression value into the block result, preferring an
    /// in-place rewrite of a pending no-result assignment over `PopBlock`.
    fn end_block_expression(&mut self) {
        if let Some(last) = &mut self.emitter.last {
            if last.is_no_result() {
                last.mode = ResultMode::Block as u8;
                self.emitter.flush();
                return;
            }
        }
        self.emitter.emit_op(Opcode::PopBlock);
    }

    /// Unary prologue and primary expression.
    fn parse_unary_expression(&mut self, grouping_level: &mut usize) -> Result<(), ParseError> {
        let mut new_was_seen = false;

        // Collect prefix operators; `+`/`-` reinterpret as unary here.
        loop {
            match self.lexer.token.kind {
                TokenKind::Add => self.lexer.token.kind = TokenKind::Plus,
                TokenKind::Subtract => self.lexer.token.kind = TokenKind::Negate,
                _ => {}
            }
            match self.lexer.token.kind {
                TokenKind::LeftParen => {
                    *grouping_level += 1;
                    new_was_seen = false;
                    self.stack.push(StackEntry::Grouping);
                }
                TokenKind::KeywordNew => {
                    // After `new`, unary operators are not allowed.
                    new_was_seen = true;
                    self.stack.push(StackEntry::UnaryToken(TokenKind::KeywordNew));
                }
                kind if !new_was_seen && kind.is_unary_op() => {
                    self.stack.push(StackEntry::UnaryToken(kind));
                }
                _ => break,
            }
            self.next_token()?;
        }

        match self.lexer.token.kind {
            TokenKind::Ident => {
                let name = self.intern_current_ident()?;
                let index = self
                    .emitter
                    .add_ident_literal(name)
                    .map_err(|kind| self.error(kind))?;
                // `eval` must stay an unfused PushIdent so the call path can
                // select CallEval.
                let fusable = name != Magic::Eval.id();
                if fusable && self.fuse_second_literal(index) {
                    // fused into PushTwoLiterals
                } else {
                    let mut push = Instr::new(Opcode::PushIdent);
                    push.lit1 = index;
                    self.emitter.emit(push);
                }
            }
            TokenKind::StrLit => {
                let value = self.ctx.interns.intern(&self.lexer.token.text);
                let index = self
                    .emitter
                    .add_string_literal(value)
                    .map_err(|kind| self.error(kind))?;
                self.push_literal_or_fuse(index);
            }
            TokenKind::NumLit => {
                let mut negative = false;
                while let Some(StackEntry::UnaryToken(kind @ (TokenKind::Plus | TokenKind::Negate))) =
                    self.stack.last()
                {
                    if *kind == TokenKind::Negate {
                        negative = !negative;
                    }
                    self.stack.pop();
                }
                let magnitude = self.lexer.token.number;
                self.emit_number_literal(magnitude, negative)?;
            }
            TokenKind::KeywordFunction => {
                // A pending push survives as the first half of a fused pair.
                let previous = match &self.emitter.last {
                    Some(last) if last.is_push_literal() => {
                        let index = last.lit1;
                        self.emitter.last = None;
                        Some(index)
                    }
                    _ => {
                        self.emitter.flush();
                        None
                    }
                };
                self.next_token()?;
                let code = self.parse_function_blob()?;
                let index = self
                    .emitter
                    .add_code_literal(code)
                    .map_err(|kind| self.error(kind))?;
                match previous {
                    Some(first) => {
                        let mut fused = Instr::new(Opcode::PushTwoLiterals);
                        fused.lit1 = first;
                        fused.lit2 = index;
                        self.emitter.last = Some(fused);
                    }
                    None => {
                        let mut push = Instr::new(Opcode::PushLiteral);
                        push.lit1 = index;
                        self.emitter.emit(push);
                    }
                }
                // parse_function_blob consumed through the closing brace.
                return Ok(());
            }
            TokenKind::LeftBrace => {
                self.parse_object_literal()?;
            }
            TokenKind::LeftSquare => {
                self.parse_array_literal()?;
            }
            TokenKind::Divide | TokenKind::AssignDivide => {
                let regexp = self.lexer.rescan_regexp()?;
                let source = self.ctx.interns.intern(&regexp.source);
                let regexp_flags = self.ctx.interns.intern(&regexp.flags);
                let index = self
                    .emitter
                    .add_regexp_literal(source, regexp_flags)
                    .map_err(|kind| self.error(kind))?;
                self.push_literal_or_fuse(index);
            }
            TokenKind::KeywordThis => self.emitter.emit_op(Opcode::PushThis),
            TokenKind::KeywordTrue => self.emitter.emit_op(Opcode::PushTrue),
            TokenKind::KeywordFalse => self.emitter.emit_op(Opcode::PushFalse),
            TokenKind::KeywordNull => self.emitter.emit_op(Opcode::PushNull),
            _ => return Err(self.error(ParseErrorKind::PrimaryExpExpected)),
        }
        self.next_token()
    }

    /// Emits a number literal, preferring the byte-encoded forms.
    fn emit_number_literal(&mut self, magnitude: f64, negative: bool) -> Result<(), ParseError> {
        if magnitude == 0.0 && !negative {
            self.emitter.emit_op(Opcode::PushNumber0);
            return Ok(());
        }
        if magnitude == magnitude.trunc() && (1.0..=256.0).contains(&magnitude) {
            let mut push = Instr::new(if negative { Opcode::PushNumberNeg } else { Opcode::PushNumberPos });
            push.byte = (magnitude as u16 - 1) as u8;
            self.emitter.emit(push);
            return Ok(());
        }
        // Everything else, negative zero included, goes to the literal pool
        // with the sign already applied.
        let value = if negative { -magnitude } else { magnitude };
        let index = self
            .emitter
            .add_number_literal(value)
            .map_err(|kind| self.error(kind))?;
        self.push_literal_or_fuse(index);
        Ok(())
    }

    /// Pushes a literal, fusing with a pending push into `PushTwoLiterals`.
    fn push_literal_or_fuse(&mut self, index: u16) {
        if self.fuse_second_literal(index) {
            return;
        }
        let mut push = Instr::new(Opcode::PushLiteral);
        push.lit1 = index;
        self.emitter.emit(push);
    }

    /// Attempts the `PushLiteral + PushLiteral -> PushTwoLiterals` rewrite.
    fn fuse_second_literal(&mut self, index: u16) -> bool {
        match &mut self.emitter.last {
            Some(last) if last.is_push_literal() => {
                let mut fused = Instr::new(Opcode::PushTwoLiterals);
                fused.lit1 = last.lit1;
                fused.lit2 = index;
                *last = fused;
                true
            }
            _ => false,
        }
    }

    /// Postfix loop and the unary epilogue.
    fn process_unary_expression(&mut self) -> Result<(), ParseError> {
        loop {
            match self.lexer.token.kind {
                TokenKind::Dot => {
                    self.emitter.push_result();
                    self.next_token()?;
                    if self.lexer.token.kind != TokenKind::Ident {
                        return Err(self.error(ParseErrorKind::IdentifierExpected));
                    }
                    // Member names are string literals, not identifiers.
                    let name = self.ctx.interns.intern(&self.lexer.token.text);
                    let index = self
                        .emitter
                        .add_string_literal(name)
                        .map_err(|kind| self.error(kind))?;
                    match &mut self.emitter.last {
                        Some(last) if last.is_push_literal() => {
                            let mut fused = Instr::new(Opcode::PropLiteralLiteralGet);
                            fused.lit1 = last.lit1;
                            fused.lit2 = index;
                            *last = fused;
                        }
                        _ => {
                            let mut get = Instr::new(Opcode::PropLiteralGet);
                            get.lit1 = index;
                            self.emitter.emit(get);
                        }
                    }
                    self.next_token()?;
                    continue;
                }
                TokenKind::LeftSquare => {
                    self.emitter.push_result();
                    self.next_token()?;
                    self.parse_expression(parse_options::EXPR)?;
                    if self.lexer.token.kind != TokenKind::RightSquare {
                        return Err(self.error(ParseErrorKind::RightSquareExpected));
                    }
                    self.next_token()?;
                    match &mut self.emitter.last {
                        Some(last) if last.is_push_literal() => {
                            last.op = Opcode::PropLiteralGet;
                        }
                        Some(last) if last.op == Opcode::PushTwoLiterals => {
                            last.op = Opcode::PropLiteralLiteralGet;
                        }
                        _ => self.emitter.emit_op(Opcode::PropGet),
                    }
                    continue;
                }
                TokenKind::LeftParen => {
                    self.parse_call()?;
                    continue;
                }
                _ => {
                    if matches!(self.stack.last(), Some(StackEntry::UnaryToken(TokenKind::KeywordNew))) {
                        self.stack.pop();
                        let mut construct = Instr::new(Opcode::New);
                        construct.byte = 0;
                        self.emitter.emit(construct);
                        continue;
                    }
                    if !self.lexer.token.was_newline
                        && matches!(self.lexer.token.kind, TokenKind::Increase | TokenKind::Decrease)
                    {
                        let op = if self.lexer.token.kind == TokenKind::Increase {
                            LvalueOp::PostIncr
                        } else {
                            LvalueOp::PostDecr
                        };
                        self.emitter.push_result();
                        self.emit_unary_lvalue_opcode(op)?;
                        self.next_token()?;
                    }
                    break;
                }
            }
        }

        // Unary epilogue: emit the stacked prefix operators innermost-first.
        while let Some(StackEntry::UnaryToken(token)) = self.stack.last() {
            let token = *token;
            if token == TokenKind::KeywordNew {
                break;
            }
            self.emitter.push_result();
            self.stack.pop();
            match token {
                TokenKind::Increase => self.emit_unary_lvalue_opcode(LvalueOp::PreIncr)?,
                TokenKind::Decrease => self.emit_unary_lvalue_opcode(LvalueOp::PreDecr)?,
                TokenKind::KeywordDelete => self.emit_unary_lvalue_opcode(LvalueOp::Delete)?,
                TokenKind::KeywordTypeof => {
                    // `typeof ident` resolves through the lvalue path so an
                    // unresolvable name yields "undefined" instead of
                    // throwing.
                    let is_ident = self
                        .emitter
                        .last
                        .as_ref()
                        .is_some_and(|last| last.op == Opcode::PushIdent);
                    if is_ident {
                        let last = self.emitter.last.as_mut().expect("checked above");
                        let mut rewritten = Instr::new(Opcode::UnaryLvalueIdent);
                        rewritten.sub_op = LvalueOp::TypeofIdent as u8;
                        rewritten.mode = ResultMode::PushResult as u8;
                        rewritten.lit1 = last.lit1;
                        *last = rewritten;
                        self.emitter.flush();
                    } else {
                        self.emit_pure_unary(UnaryOp::Typeof);
                    }
                }
                TokenKind::Plus => self.emit_pure_unary(UnaryOp::Plus),
                TokenKind::Negate => self.emit_pure_unary(UnaryOp::Negate),
                TokenKind::LogicalNot => self.emit_pure_unary(UnaryOp::LogicalNot),
                TokenKind::BitNot => self.emit_pure_unary(UnaryOp::BitNot),
                TokenKind::KeywordVoid => self.emit_pure_unary(UnaryOp::Void),
                _ => unreachable!("non-unary token on the unary stack"),
            }
        }
        Ok(())
    }

    /// Pure unary emission with the `UnaryWithLiteral` fusion.
    fn emit_pure_unary(&mut self, op: UnaryOp) {
        match &mut self.emitter.last {
            Some(last) if last.is_push_literal() => {
                let mut fused = Instr::new(Opcode::UnaryWithLiteral);
                fused.sub_op = op as u8;
                fused.lit1 = last.lit1;
                *last = fused;
            }
            _ => {
                let mut instr = Instr::new(Opcode::Unary);
                instr.sub_op = op as u8;
                self.emitter.emit(instr);
            }
        }
    }

    /// Lvalue unary emission: rewrites the most recent load into its fused
    /// lvalue form, with the strict-mode eval/arguments restriction.
    fn emit_unary_lvalue_opcode(&mut self, op: LvalueOp) -> Result<(), ParseError> {
        let last_op = self.emitter.last.as_ref().map(|last| last.op);
        match last_op {
            Some(Opcode::PushIdent) => {
                let index = self.emitter.last.as_ref().expect("checked above").lit1;
                self.check_strict_ident_literal(index)?;
                let last = self.emitter.last.as_mut().expect("checked above");
                let mut rewritten = Instr::new(Opcode::UnaryLvalueIdent);
                rewritten.sub_op = op as u8;
                rewritten.lit1 = last.lit1;
                *last = rewritten;
            }
            Some(Opcode::PropGet) => {
                let last = self.emitter.last.as_mut().expect("checked above");
                let mut rewritten = Instr::new(Opcode::UnaryLvalue);
                rewritten.sub_op = op as u8;
                *last = rewritten;
            }
            Some(Opcode::PropLiteralGet) => {
                let last = self.emitter.last.as_mut().expect("checked above");
                let mut rewritten = Instr::new(Opcode::UnaryLvaluePropLiteral);
                rewritten.sub_op = op as u8;
                rewritten.lit1 = last.lit1;
                *last = rewritten;
            }
            Some(Opcode::PropLiteralLiteralGet) => {
                let last = self.emitter.last.as_mut().expect("checked above");
                let mut rewritten = Instr::new(Opcode::UnaryLvaluePropLiteralLiteral);
                rewritten.sub_op = op as u8;
                rewritten.lit1 = last.lit1;
                rewritten.lit2 = last.lit2;
                *last = rewritten;
            }
            _ => {
                // Not a reference; the error surfaces at runtime.
                self.emitter.emit_op(Opcode::PushUndefinedBase);
                let mut instr = Instr::new(Opcode::UnaryLvalue);
                instr.sub_op = op as u8;
                self.emitter.emit(instr);
            }
        }
        Ok(())
    }

    /// Argument list and call opcode selection.
    fn parse_call(&mut self) -> Result<(), ParseError> {
        self.emitter.push_result();

        let mut opcode = Opcode::Call;
        if matches!(self.stack.last(), Some(StackEntry::UnaryToken(TokenKind::KeywordNew))) {
            self.stack.pop();
            opcode = Opcode::New;
        } else {
            match self.emitter.last.as_ref().map(|last| last.op) {
                Some(Opcode::PropGet) => {
                    self.emitter.last.as_mut().expect("checked above").op = Opcode::AssignPropGet;
                    opcode = Opcode::CallProp;
                }
                Some(Opcode::PropLiteralGet) => {
                    self.emitter.last.as_mut().expect("checked above").op = Opcode::AssignPropLiteralGet;
                    opcode = Opcode::CallProp;
                }
                Some(Opcode::PropLiteralLiteralGet) => {
                    self.emitter.last.as_mut().expect("checked above").op = Opcode::AssignPropLiteralLiteralGet;
                    opcode = Opcode::CallProp;
                }
                Some(Opcode::PushIdent) => {
                    let index = self.emitter.last.as_ref().expect("checked above").lit1;
                    if self.literal_is_ident(index, Magic::Eval) {
                        opcode = Opcode::CallEval;
                        self.note_direct_eval();
                    }
                }
                _ => {}
            }
        }

        self.next_token()?;
        let mut call_arguments: usize = 0;
        if self.lexer.token.kind != TokenKind::RightParen {
            loop {
                call_arguments += 1;
                if call_arguments > MAX_BYTE_VALUE {
                    return Err(self.error(ParseErrorKind::ArgumentLimitReached));
                }
                self.parse_expression(parse_options::NO_COMMA)?;
                if self.lexer.token.kind != TokenKind::Comma {
                    break;
                }
                self.next_token()?;
            }
            if self.lexer.token.kind != TokenKind::RightParen {
                return Err(self.error(ParseErrorKind::RightParenExpected));
            }
        }
        self.next_token()?;

        if call_arguments == 0 && opcode == Opcode::Call {
            self.emitter.emit_op(Opcode::Call0);
        } else if call_arguments == 0 && opcode == Opcode::CallProp {
            self.emitter.emit_op(Opcode::Call0Prop);
        } else {
            let mut call = Instr::new(opcode);
            call.byte = call_arguments as u8;
            self.emitter.emit(call);
        }
        Ok(())
    }

    /// Stacks a binary operator, preparing assignment targets and logical
    /// short-circuit branches.
    fn append_binary_token(&mut self) -> Result<(), ParseError> {
        let token = self.lexer.token.kind;
        debug_assert!(token.is_binary_op());
        self.emitter.push_result();

        if token == TokenKind::Assign {
            // The whole byte code of the target is saved (or re-shaped) for
            // simple assignment, since it has several forms.
            match self.emitter.last.as_ref().map(|last| last.op) {
                Some(Opcode::PushIdent) => {
                    let index = self.emitter.last.as_ref().expect("checked above").lit1;
                    self.check_strict_ident_literal(index)?;
                    self.emitter.last = None;
                    self.stack.push(StackEntry::AssignIdent { target: index });
                }
                Some(Opcode::PropGet) => {
                    // Dropping the get leaves base and name on the stack.
                    self.emitter.last = None;
                    self.stack.push(StackEntry::AssignProp);
                }
                Some(Opcode::PropLiteralGet) => {
                    let index = self.emitter.last.as_ref().expect("checked above").lit1;
                    if self.literal_is_any_ident(index) {
                        // The name literal is an identifier reference: its
                        // value is only known at runtime, so push it and
                        // fall back to the stack-based assignment.
                        let last = self.emitter.last.as_mut().expect("checked above");
                        last.op = Opcode::PushLiteral;
                        self.stack.push(StackEntry::AssignProp);
                    } else {
                        self.emitter.last = None;
                        self.stack.push(StackEntry::AssignPropLiteral { name: index });
                    }
                }
                Some(Opcode::PropLiteralLiteralGet) => {
                    let last = self.emitter.last.as_mut().expect("checked above");
                    last.op = Opcode::PushTwoLiterals;
                    self.stack.push(StackEntry::AssignProp);
                }
                _ => {
                    // Not a reference; a runtime error will happen.
                    self.emitter.emit_op(Opcode::PushUndefinedBase);
                    self.stack.push(StackEntry::AssignProp);
                }
            }
        } else if token.is_compound_assign() {
            match self.emitter.last.as_ref().map(|last| last.op) {
                Some(Opcode::PushIdent) => {
                    let index = self.emitter.last.as_ref().expect("checked above").lit1;
                    self.check_strict_ident_literal(index)?;
                    let last = self.emitter.last.as_mut().expect("checked above");
                    let mut rewritten = Instr::new(Opcode::AssignIdentGet);
                    rewritten.lit1 = last.lit1;
                    *last = rewritten;
                }
                Some(Opcode::PropGet) => {
                    self.emitter.last.as_mut().expect("checked above").op = Opcode::AssignPropGet;
                }
                Some(Opcode::PropLiteralGet) => {
                    self.emitter.last.as_mut().expect("checked above").op = Opcode::AssignPropLiteralGet;
                }
                Some(Opcode::PropLiteralLiteralGet) => {
                    self.emitter.last.as_mut().expect("checked above").op = Opcode::AssignPropLiteralLiteralGet;
                }
                _ => {
                    self.emitter.emit_op(Opcode::PushUndefinedBase);
                    self.emitter.emit_op(Opcode::AssignPropGet);
                }
            }
        } else if matches!(token, TokenKind::LogicalOr | TokenKind::LogicalAnd) {
            let opcode = if token == TokenKind::LogicalOr {
                Opcode::BranchIfLogicalTrue
            } else {
                Opcode::BranchIfLogicalFalse
            };
            let label = self.emitter.emit_forward_branch(opcode);
            self.stack.push(StackEntry::LogicalBranch { label });
        }

        self.stack.push(StackEntry::BinaryToken(token));
        Ok(())
    }

    /// Pops and emits stacked binary operators whose precedence is at or
    /// above the threshold, fusing with the pending push where possible.
    fn process_binary_opcodes(&mut self, min_precedence: u8) -> Result<(), ParseError> {
        loop {
            let Some(StackEntry::BinaryToken(token)) = self.stack.last() else {
                return Ok(());
            };
            let token = *token;
            if precedence(token) < min_precedence {
                return Ok(());
            }
            self.emitter.push_result();
            self.stack.pop();

            if token == TokenKind::Assign {
                match self.stack.pop() {
                    Some(StackEntry::AssignIdent { target }) => {
                        self.emit_assignment_to_ident(target);
                    }
                    Some(StackEntry::AssignProp) => {
                        self.emitter.emit_op(Opcode::Assign);
                    }
                    Some(StackEntry::AssignPropLiteral { name }) => {
                        let mut assign = Instr::new(Opcode::AssignPropLiteral);
                        assign.lit1 = name;
                        self.emitter.emit(assign);
                    }
                    _ => unreachable!("assignment without a stacked target"),
                }
            } else if token.is_compound_assign() {
                let op = binop_of(token);
                match &mut self.emitter.last {
                    Some(last) if last.is_push_literal() => {
                        let mut fused = Instr::new(Opcode::BinaryAssignWithLiteral);
                        fused.sub_op = op as u8;
                        fused.lit1 = last.lit1;
                        *last = fused;
                    }
                    _ => {
                        let mut instr = Instr::new(Opcode::BinaryAssign);
                        instr.sub_op = op as u8;
                        self.emitter.emit(instr);
                    }
                }
            } else if matches!(token, TokenKind::LogicalOr | TokenKind::LogicalAnd) {
                match self.stack.pop() {
                    Some(StackEntry::LogicalBranch { label }) => {
                        self.emitter.patch_branch(label);
                    }
                    _ => unreachable!("logical operator without a stacked branch"),
                }
            } else {
                let op = binop_of(token);
                match &mut self.emitter.last {
                    Some(last) if last.is_push_literal() => {
                        let mut fused = Instr::new(Opcode::BinaryWithLiteral);
                        fused.sub_op = op as u8;
                        fused.lit1 = last.lit1;
                        *last = fused;
                    }
                    Some(last) if last.op == Opcode::PushTwoLiterals => {
                        let mut fused = Instr::new(Opcode::BinaryWithTwoLiterals);
                        fused.sub_op = op as u8;
                        fused.lit1 = last.lit1;
                        fused.lit2 = last.lit2;
                        *last = fused;
                    }
                    _ => {
                        let mut instr = Instr::new(Opcode::Binary);
                        instr.sub_op = op as u8;
                        self.emitter.emit(instr);
                    }
                }
            }
        }
    }

    /// The conditional operator. Both arms are compiled, but only one
    /// contributes a value at runtime, so the tracked stack depth is
    /// adjusted by hand; the final flush forbids rewriting across the merge
    /// point because the result may originate from either arm.
    fn parse_conditional(&mut self) -> Result<(), ParseError> {
        self.emitter.push_result();

        let mut branch_op = Opcode::BranchIfFalseForward;
        if let Some(last) = &self.emitter.last {
            if last.op == Opcode::Unary && last.sub_op == UnaryOp::LogicalNot as u8 {
                self.emitter.last = None;
                branch_op = Opcode::BranchIfTrueForward;
            }
        }
        let condition = self.emitter.emit_forward_branch(branch_op);

        self.next_token()?;
        self.parse_expression(parse_options::NO_COMMA)?;
        let jump_over_else = self.emitter.emit_forward_branch(Opcode::JumpForward);
        self.emitter.patch_branch(condition);
        self.emitter.adjust_stack_depth(-1);

        if self.lexer.token.kind != TokenKind::Colon {
            return Err(self.error(ParseErrorKind::ColonForConditionalExpected));
        }
        self.next_token()?;
        self.parse_expression(parse_options::NO_COMMA)?;
        self.emitter.patch_branch(jump_over_else);
        self.emitter.flush();
        Ok(())
    }

    /// Array literal: elements batched into `ArrayAppend` groups of at most
    /// sixty-four pushed items; elisions push the internal hole marker.
    fn parse_array_literal(&mut self) -> Result<(), ParseError> {
        debug_assert_eq!(self.lexer.token.kind, TokenKind::LeftSquare);
        self.emitter.emit_op(Opcode::CreateArray);
        self.next_token()?;

        let mut pushed_items: usize = 0;
        loop {
            if self.lexer.token.kind == TokenKind::RightSquare {
                if pushed_items > 0 {
                    let mut append = Instr::new(Opcode::ArrayAppend);
                    append.byte = pushed_items as u8;
                    self.emitter.emit(append);
                }
                return Ok(());
            }

            pushed_items += 1;
            if self.lexer.token.kind == TokenKind::Comma {
                self.emitter.emit_op(Opcode::PushElision);
                self.next_token()?;
            } else {
                self.parse_expression(parse_options::NO_COMMA)?;
                if self.lexer.token.kind == TokenKind::Comma {
                    self.next_token()?;
                } else if self.lexer.token.kind != TokenKind::RightSquare {
                    return Err(self.error(ParseErrorKind::ArrayItemSeparatorExpected));
                }
            }

            if pushed_items >= ARRAY_APPEND_BATCH {
                let mut append = Instr::new(Opcode::ArrayAppend);
                append.byte = pushed_items as u8;
                self.emitter.emit(append);
                pushed_items = 0;
            }
        }
    }

    /// Object literal with data properties and get/set accessor shorthands.
    fn parse_object_literal(&mut self) -> Result<(), ParseError> {
        debug_assert_eq!(self.lexer.token.kind, TokenKind::LeftBrace);
        self.emitter.emit_op(Opcode::CreateObject);
        self.next_token()?;

        loop {
            if self.lexer.token.kind == TokenKind::RightBrace {
                return Ok(());
            }

            // Accessor shorthand: `get name() {...}` / `set name(v) {...}`,
            // unless `get`/`set` is itself a property name.
            let accessor = if self.lexer.token.kind == TokenKind::Ident
                && (self.lexer.token.text == "get" || self.lexer.token.text == "set")
            {
                let is_getter = self.lexer.token.text == "get";
                self.next_token()?;
                if self.lexer.token.kind == TokenKind::Colon {
                    // Plain property actually named get/set.
                    let name = self.ctx.interns.intern(if is_getter { "get" } else { "set" });
                    let index = self
                        .emitter
                        .add_string_literal(name)
                        .map_err(|kind| self.error(kind))?;
                    self.parse_property_value(index)?;
                    None
                } else {
                    Some(is_getter)
                }
            } else {
                let index = self.parse_property_name()?;
                self.next_token()?;
                if self.lexer.token.kind != TokenKind::Colon {
                    return Err(self.error(ParseErrorKind::ColonExpected));
                }
                self.parse_property_value(index)?;
                None
            };

            if let Some(is_getter) = accessor {
                let index = self.parse_property_name()?;
                self.next_token()?;
                self.emitter.flush();
                if self.lexer.token.kind != TokenKind::LeftParen {
                    return Err(self.error(ParseErrorKind::LeftParenExpected));
                }
                let code = self.parse_function_blob()?;
                let literal = self
                    .emitter
                    .add_code_literal(code)
                    .map_err(|kind| self.error(kind))?;
                let mut push = Instr::new(Opcode::PushLiteral);
                push.lit1 = literal;
                self.emitter.emit(push);
                let mut set = Instr::new(if is_getter { Opcode::SetGetter } else { Opcode::SetSetter });
                set.lit1 = index;
                self.emitter.emit(set);
            }

            match self.lexer.token.kind {
                TokenKind::RightBrace => return Ok(()),
                TokenKind::Comma => self.next_token()?,
                _ => return Err(self.error(ParseErrorKind::ObjectItemSeparatorExpected)),
            }
        }
    }

    /// A property name token: identifier, string, or number.
    fn parse_property_name(&mut self) -> Result<u16, ParseError> {
        let name = match self.lexer.token.kind {
            TokenKind::Ident | TokenKind::StrLit => self.ctx.interns.intern(&self.lexer.token.text),
            TokenKind::NumLit => {
                let spelled = crate::value::number_to_string(self.lexer.token.number);
                self.ctx.interns.intern(&spelled)
            }
            _ => return Err(self.error(ParseErrorKind::IdentifierExpected)),
        };
        self.emitter.add_string_literal(name).map_err(|kind| self.error(kind))
    }

    /// `: value` of a data property, followed by `SetProperty`.
    fn parse_property_value(&mut self, name_index: u16) -> Result<(), ParseError> {
        debug_assert_eq!(self.lexer.token.kind, TokenKind::Colon);
        self.next_token()?;
        self.parse_expression(parse_options::NO_COMMA)?;
        let mut set = Instr::new(Opcode::SetProperty);
        set.lit1 = name_index;
        self.emitter.emit(set);
        Ok(())
    }

    /// True when literal `index` is an identifier literal for `magic`.
    fn literal_is_ident(&self, index: u16, magic: Magic) -> bool {
        matches!(
            self.emitter.literal(index),
            crate::bytecode::Literal::Ident(name) if *name == magic.id()
        )
    }

    /// True when literal `index` is any identifier literal.
    fn literal_is_any_ident(&self, index: u16) -> bool {
        matches!(self.emitter.literal(index), crate::bytecode::Literal::Ident(_))
    }

    /// Strict-mode check over a pending identifier literal.
    fn check_strict_ident_literal(&self, index: u16) -> Result<(), ParseError> {
        if let crate::bytecode::Literal::Ident(name) = self.emitter.literal(index) {
            self.check_strict_assignment_target(*name)?;
        }
        Ok(())
    }
}
