//! Single-pass compiler: source text straight to byte code.
//!
//! `expr` holds the recursive-descent expression compiler with its
//! last-opcode fusion protocol; this module owns the parser state, the
//! statement grammar and the compile entry points. There is no AST: every
//! grammar action emits byte code through the emitter's rewrite register.

pub(crate) mod emitter;
mod expr;

use emitter::{Emitter, Instr, JumpLabel};

use crate::{
    bytecode::{CodeId, Opcode, flags},
    context::Context,
    exception::{ParseError, ParseErrorKind},
    heap::ResourceTracker,
    intern::{Magic, StringId},
    lexer::{Lexer, TokenKind},
};

/// Expression parse modes (design section 4.E).
pub(crate) mod parse_options {
    /// Full comma expression.
    pub(crate) const EXPR: u8 = 0;
    /// Stop at a top-level comma.
    pub(crate) const NO_COMMA: u8 = 0x01;
    /// Statement position: drop the value.
    pub(crate) const STATEMENT: u8 = 0x02;
    /// Script/eval completion position: route the value to the block result.
    pub(crate) const BLOCK: u8 = 0x04;
    /// The first primary expression is already in the rewrite register.
    pub(crate) const HAS_LITERAL: u8 = 0x08;
}

/// What kind of top-level blob is being compiled.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CompileKind {
    Script,
    Eval { strict: bool },
}

/// Entries of the parser-internal stack.
///
/// Unary tokens, grouping fences and pending binary operators share one
/// stack; assignment targets and logical-operator branches are pushed right
/// below the operator token that owns them.
#[derive(Debug)]
enum StackEntry {
    ExpressionStart,
    Grouping,
    UnaryToken(TokenKind),
    BinaryToken(TokenKind),
    AssignIdent { target: u16 },
    AssignProp,
    AssignPropLiteral { name: u16 },
    LogicalBranch { label: JumpLabel },
}

pub(crate) struct Parser<'s, 'c, T: ResourceTracker> {
    ctx: &'c mut Context<T>,
    lexer: Lexer<'s>,
    stack: Vec<StackEntry>,
    emitter: Emitter,
    strict: bool,
    in_function: bool,
    /// Local `var`/function-declaration count of the current function.
    var_count: u16,
    uses_arguments: bool,
    uses_eval: bool,
}

/// Compiles a script or eval body into the context's code table.
///
/// On error no byte code is committed: everything the failed parse built
/// lives in parser-owned structures that unwind with the frame.
pub(crate) fn compile(
    ctx: &mut Context<impl ResourceTracker>,
    source: &str,
    kind: CompileKind,
) -> Result<CodeId, ParseError> {
    let lexer = Lexer::new(source)?;
    let mut parser = Parser {
        ctx,
        lexer,
        stack: Vec::new(),
        emitter: Emitter::new(),
        strict: matches!(kind, CompileKind::Eval { strict: true }),
        in_function: false,
        var_count: 0,
        uses_arguments: false,
        uses_eval: false,
    };
    parser.parse_directive_prologue()?;
    while parser.lexer.token.kind != TokenKind::Eof {
        parser.parse_statement()?;
    }
    parser.emitter.emit_op(Opcode::ReturnBlock);

    let mut code_flags = 0u16;
    if parser.strict {
        code_flags |= flags::STRICT;
    }
    if let CompileKind::Eval { .. } = kind {
        code_flags |= flags::IS_EVAL;
    }
    let register_end = parser.var_count;
    let emitter = std::mem::replace(&mut parser.emitter, Emitter::new());
    let blob = emitter
        .build(code_flags, 0, register_end)
        .map_err(|kind| parser.lexer.error(kind))?;
    Ok(parser.ctx.code.insert(blob))
}

impl<T: ResourceTracker> Parser<'_, '_, T> {
    fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.lexer.error(kind)
    }

    fn next_token(&mut self) -> Result<(), ParseError> {
        self.lexer.next_token()
    }

    fn expect(&mut self, kind: TokenKind, error: ParseErrorKind) -> Result<(), ParseError> {
        if self.lexer.token.kind != kind {
            return Err(self.error(error));
        }
        self.next_token()
    }

    /// `'use strict'` and other directives at a body start.
    fn parse_directive_prologue(&mut self) -> Result<(), ParseError> {
        while self.lexer.token.kind == TokenKind::StrLit {
            let directive = self.lexer.token.text.clone();
            // A directive must be a whole statement; a following operator
            // means it is an ordinary expression instead.
            self.next_token()?;
            let terminated = matches!(self.lexer.token.kind, TokenKind::Semicolon | TokenKind::Eof)
                || self.lexer.token.was_newline
                || self.lexer.token.kind == TokenKind::RightBrace;
            if !terminated {
                // Re-enter the expression grammar with the literal pushed.
                let value = self.ctx.interns.intern(&directive);
                let index = self
                    .emitter
                    .add_string_literal(value)
                    .map_err(|kind| self.error(kind))?;
                let mut push = Instr::new(Opcode::PushLiteral);
                push.lit1 = index;
                self.emitter.emit(push);
                self.parse_expression(parse_options::HAS_LITERAL | self.statement_mode())?;
                self.consume_semicolon()?;
                return Ok(());
            }
            if directive == "use strict" {
                self.strict = true;
            } else {
                // Unknown directives still produce their completion value.
                let value = self.ctx.interns.intern(&directive);
                let index = self
                    .emitter
                    .add_string_literal(value)
                    .map_err(|kind| self.error(kind))?;
                let mut push = Instr::new(Opcode::PushLiteral);
                push.lit1 = index;
                self.emitter.emit(push);
                self.end_expression_statement();
            }
            if self.lexer.token.kind == TokenKind::Semicolon {
                self.next_token()?;
            }
        }
        Ok(())
    }

    /// The statement-position expression mode: script and eval completion
    /// values use the block result, function bodies drop the value.
    fn statement_mode(&self) -> u8 {
        if self.in_function {
            parse_options::STATEMENT
        } else {
            parse_options::BLOCK
        }
    }

    /// Emits the statement-mode epilogue for a value already in the rewrite
    /// register (directives that turned out to be plain expressions).
    fn end_expression_statement(&mut self) {
        if self.in_function {
            self.emitter.emit_op(Opcode::Pop);
        } else {
            self.emitter.emit_op(Opcode::PopBlock);
        }
    }

    /// Automatic semicolon insertion: an explicit `;`, a newline before the
    /// current token, `}` or end of input all terminate the statement.
    fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        match self.lexer.token.kind {
            TokenKind::Semicolon => self.next_token(),
            TokenKind::RightBrace | TokenKind::Eof => Ok(()),
            _ if self.lexer.token.was_newline => Ok(()),
            _ => Err(self.error(ParseErrorKind::SemicolonExpected)),
        }
    }

    fn parse_statement(&mut self) -> Result<(), ParseError> {
        match self.lexer.token.kind {
            TokenKind::Semicolon => self.next_token(),
            TokenKind::LeftBrace => {
                self.next_token()?;
                while self.lexer.token.kind != TokenKind::RightBrace {
                    if self.lexer.token.kind == TokenKind::Eof {
                        return Err(self.error(ParseErrorKind::RightBraceExpected));
                    }
                    self.parse_statement()?;
                }
                self.next_token()
            }
            TokenKind::KeywordVar => self.parse_var_statement(),
            TokenKind::KeywordFunction => self.parse_function_declaration(),
            TokenKind::KeywordIf => self.parse_if_statement(),
            TokenKind::KeywordWhile => self.parse_while_statement(),
            TokenKind::KeywordReturn => self.parse_return_statement(),
            TokenKind::KeywordThrow => {
                self.next_token()?;
                self.parse_expression(parse_options::EXPR)?;
                self.emitter.emit_op(Opcode::Throw);
                self.consume_semicolon()
            }
            _ => {
                self.parse_expression(self.statement_mode())?;
                self.consume_semicolon()
            }
        }
    }

    fn parse_var_statement(&mut self) -> Result<(), ParseError> {
        self.next_token()?;
        loop {
            if self.lexer.token.kind != TokenKind::Ident {
                return Err(self.error(ParseErrorKind::IdentifierExpected));
            }
            let name = self.intern_current_ident()?;
            self.check_strict_assignment_target(name)?;
            let target = self
                .emitter
                .add_ident_literal(name)
                .map_err(|kind| self.error(kind))?;
            let mut decl = Instr::new(Opcode::VarDecl);
            decl.lit1 = target;
            self.emitter.emit(decl);
            self.var_count = self.var_count.saturating_add(1);
            self.next_token()?;

            if self.lexer.token.kind == TokenKind::Assign {
                self.next_token()?;
                self.parse_expression(parse_options::NO_COMMA)?;
                self.emit_assignment_to_ident(target);
            }

            if self.lexer.token.kind == TokenKind::Comma {
                self.next_token()?;
                continue;
            }
            return self.consume_semicolon();
        }
    }

    fn parse_function_declaration(&mut self) -> Result<(), ParseError> {
        self.next_token()?;
        if self.lexer.token.kind != TokenKind::Ident {
            return Err(self.error(ParseErrorKind::IdentifierExpected));
        }
        let name = self.intern_current_ident()?;
        self.check_strict_assignment_target(name)?;
        let target = self
            .emitter
            .add_ident_literal(name)
            .map_err(|kind| self.error(kind))?;
        self.next_token()?;
        let code = self.parse_function_blob()?;
        let mut decl = Instr::new(Opcode::VarDecl);
        decl.lit1 = target;
        self.emitter.emit(decl);
        self.var_count = self.var_count.saturating_add(1);
        let literal = self
            .emitter
            .add_code_literal(code)
            .map_err(|kind| self.error(kind))?;
        let mut push = Instr::new(Opcode::PushLiteral);
        push.lit1 = literal;
        self.emitter.emit(push);
        self.emit_assignment_to_ident(target);
        Ok(())
    }

    fn parse_if_statement(&mut self) -> Result<(), ParseError> {
        self.next_token()?;
        self.expect(TokenKind::LeftParen, ParseErrorKind::LeftParenExpected)?;
        self.parse_expression(parse_options::EXPR)?;
        self.expect(TokenKind::RightParen, ParseErrorKind::RightParenExpected)?;
        let else_branch = self.emitter.emit_forward_branch(Opcode::BranchIfFalseForward);
        self.parse_statement()?;
        if self.lexer.token.kind == TokenKind::KeywordElse {
            let end = self.emitter.emit_forward_branch(Opcode::JumpForward);
            self.emitter.patch_branch(else_branch);
            self.next_token()?;
            self.parse_statement()?;
            self.emitter.patch_branch(end);
        } else {
            self.emitter.patch_branch(else_branch);
        }
        Ok(())
    }

    fn parse_while_statement(&mut self) -> Result<(), ParseError> {
        self.next_token()?;
        self.expect(TokenKind::LeftParen, ParseErrorKind::LeftParenExpected)?;
        let loop_top = self.emitter.current_position();
        self.parse_expression(parse_options::EXPR)?;
        self.expect(TokenKind::RightParen, ParseErrorKind::RightParenExpected)?;
        let exit = self.emitter.emit_forward_branch(Opcode::BranchIfFalseForward);
        self.parse_statement()?;
        self.emitter.emit_backward_jump(loop_top);
        self.emitter.patch_branch(exit);
        Ok(())
    }

    fn parse_return_statement(&mut self) -> Result<(), ParseError> {
        self.next_token()?;
        let ends_here = matches!(
            self.lexer.token.kind,
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        ) || self.lexer.token.was_newline;
        if ends_here {
            self.emitter.emit_op(Opcode::ReturnUndefined);
        } else {
            self.parse_expression(parse_options::EXPR)?;
            self.emitter.emit_op(Opcode::Return);
        }
        self.consume_semicolon()
    }

    /// Compiles `function [name] (params) { body }` starting at the token
    /// after `function`, returning the nested blob's id.
    ///
    /// The parameter names become the leading literal-pool entries of the
    /// nested blob, in declaration order, which is how `[[Call]]` and the
    /// lazy `length` find them.
    fn parse_function_blob(&mut self) -> Result<CodeId, ParseError> {
        // Optional function-expression name; the binding itself is not
        // installed (recursion reaches the function through its outer name).
        if self.lexer.token.kind == TokenKind::Ident {
            self.next_token()?;
        }
        self.expect(TokenKind::LeftParen, ParseErrorKind::LeftParenExpected)?;

        let saved_emitter = std::mem::replace(&mut self.emitter, Emitter::new());
        let saved_strict = self.strict;
        let saved_in_function = self.in_function;
        let saved_var_count = self.var_count;
        let saved_uses_arguments = self.uses_arguments;
        let saved_uses_eval = self.uses_eval;
        self.in_function = true;
        self.var_count = 0;
        self.uses_arguments = false;
        self.uses_eval = false;

        let result = self.parse_function_rest();

        let argument_count = match &result {
            Ok(count) => *count,
            Err(_) => 0,
        };
        let needs_env = argument_count > 0 || self.var_count > 0 || self.uses_arguments || self.uses_eval;
        let mut code_flags = flags::IS_FUNCTION;
        if self.strict {
            code_flags |= flags::STRICT;
        }
        if !needs_env {
            code_flags |= flags::LEXICAL_ENV_NOT_NEEDED;
        }
        if self.uses_arguments {
            code_flags |= flags::ARGUMENTS_NEEDED;
        }
        let register_end = self.var_count;

        let emitter = std::mem::replace(&mut self.emitter, saved_emitter);
        self.strict = saved_strict;
        self.in_function = saved_in_function;
        self.var_count = saved_var_count;
        self.uses_arguments = saved_uses_arguments;
        self.uses_eval = saved_uses_eval;

        result?;
        let blob = emitter
            .build(code_flags, argument_count, register_end)
            .map_err(|kind| self.error(kind))?;
        Ok(self.ctx.code.insert(blob))
    }

    /// Parameters and body; returns the parameter count. Runs with the
    /// nested function's emitter installed.
    fn parse_function_rest(&mut self) -> Result<u16, ParseError> {
        let mut argument_count: u16 = 0;
        if self.lexer.token.kind != TokenKind::RightParen {
            loop {
                if self.lexer.token.kind != TokenKind::Ident {
                    return Err(self.error(ParseErrorKind::IdentifierExpected));
                }
                let name = self.intern_current_ident()?;
                self.emitter
                    .add_ident_literal(name)
                    .map_err(|kind| self.error(kind))?;
                argument_count = argument_count.saturating_add(1);
                self.next_token()?;
                if self.lexer.token.kind != TokenKind::Comma {
                    break;
                }
                self.next_token()?;
            }
        }
        self.expect(TokenKind::RightParen, ParseErrorKind::RightParenExpected)?;
        self.expect(TokenKind::LeftBrace, ParseErrorKind::LeftBraceExpected)?;
        self.parse_directive_prologue()?;
        while self.lexer.token.kind != TokenKind::RightBrace {
            if self.lexer.token.kind == TokenKind::Eof {
                return Err(self.error(ParseErrorKind::RightBraceExpected));
            }
            self.parse_statement()?;
        }
        self.next_token()?;
        self.emitter.emit_op(Opcode::ReturnUndefined);
        Ok(argument_count)
    }

    /// Records a direct `eval(...)` call site; direct eval needs a real
    /// lexical environment to host the bindings it may introduce.
    fn note_direct_eval(&mut self) {
        self.uses_eval = true;
    }

    /// Interns the current identifier token, noting `arguments` uses.
    fn intern_current_ident(&mut self) -> Result<StringId, ParseError> {
        let name = self.ctx.interns.intern(&self.lexer.token.text);
        if name == Magic::Arguments.id() {
            self.uses_arguments = true;
        }
        Ok(name)
    }

    /// Strict-mode restriction on assignment targets (ES5 11.13.1).
    fn check_strict_assignment_target(&self, name: StringId) -> Result<(), ParseError> {
        if !self.strict {
            return Ok(());
        }
        if name == Magic::Eval.id() {
            return Err(self.error(ParseErrorKind::EvalCannotAssigned));
        }
        if name == Magic::Arguments.id() {
            return Err(self.error(ParseErrorKind::ArgumentsCannotAssigned));
        }
        Ok(())
    }

    /// Emits `= <pending value>` into an identifier binding, fusing a
    /// pending push-literal into `AssignLiteralIdent`.
    fn emit_assignment_to_ident(&mut self, target: u16) {
        if let Some(last) = &self.emitter.last {
            if last.is_push_literal() {
                let value_literal = last.lit1;
                let mut fused = Instr::new(Opcode::AssignLiteralIdent);
                fused.lit1 = value_literal;
                fused.lit2 = target;
                self.emitter.last = Some(fused);
                return;
            }
        }
        let mut assign = Instr::new(Opcode::AssignIdent);
        assign.lit1 = target;
        self.emitter.emit(assign);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BinOp, CompiledCode, Operands, decode_operands};

    fn compile_source(source: &str) -> Result<CompiledCode, ParseError> {
        let mut ctx = Context::new();
        let code = compile(&mut ctx, source, CompileKind::Script)?;
        Ok((*ctx.code.get(code)).clone())
    }

    fn decode(blob: &CompiledCode) -> Vec<(Opcode, Operands)> {
        let mut decoded = Vec::new();
        let mut pc = 0;
        while pc < blob.code.len() {
            let op = Opcode::from_repr(blob.code[pc]).expect("valid opcode");
            pc += 1;
            let operands = decode_operands(op, &blob.code, &mut pc, blob.wide_literals());
            decoded.push((op, operands));
        }
        decoded
    }

    fn opcodes(source: &str) -> Vec<Opcode> {
        decode(&compile_source(source).unwrap()).into_iter().map(|(op, _)| op).collect()
    }

    #[test]
    fn two_identifier_pushes_fuse() {
        // `a + b` collapses into one BinaryWithTwoLiterals.
        assert_eq!(
            opcodes("a + b"),
            vec![Opcode::BinaryWithTwoLiterals, Opcode::PopBlock, Opcode::ReturnBlock]
        );
    }

    #[test]
    fn push_fuses_with_binary_operator() {
        // 3.5 cannot be byte-encoded, so it lands in the literal pool and
        // fuses; byte-encoded small integers do not.
        let blob = compile_source("x * 3.5").unwrap();
        let decoded = decode(&blob);
        assert_eq!(decoded[0].0, Opcode::BinaryWithTwoLiterals);
        assert_eq!(decoded[0].1.sub_op, BinOp::Multiply as u8);

        let ops = opcodes("x * 3");
        assert_eq!(&ops[..3], &[Opcode::PushIdent, Opcode::PushNumberPos, Opcode::Binary]);
    }

    #[test]
    fn member_access_over_identifier_fuses_fully() {
        assert_eq!(
            opcodes("a.b"),
            vec![Opcode::PropLiteralLiteralGet, Opcode::PopBlock, Opcode::ReturnBlock]
        );
    }

    #[test]
    fn chained_member_access_uses_single_literal_form() {
        assert_eq!(
            opcodes("a.b.c"),
            vec![
                Opcode::PropLiteralLiteralGet,
                Opcode::PropLiteralGet,
                Opcode::PopBlock,
                Opcode::ReturnBlock
            ]
        );
    }

    #[test]
    fn literal_assignment_to_identifier_fuses() {
        // A pool literal on the right side fuses into AssignLiteralIdent;
        // statement position at the script top level routes the value to
        // the block result in place, with no separate PopBlock.
        assert_eq!(opcodes("x = 'hi'"), vec![Opcode::AssignLiteralIdent, Opcode::ReturnBlock]);
        // A byte-encoded integer stays a separate push.
        assert_eq!(
            opcodes("x = 5"),
            vec![Opcode::PushNumberPos, Opcode::AssignIdent, Opcode::ReturnBlock]
        );
    }

    #[test]
    fn method_call_rewrites_the_get_into_keep_base_form() {
        assert_eq!(
            opcodes("a.b()"),
            vec![
                Opcode::AssignPropLiteralLiteralGet,
                Opcode::Call0Prop,
                Opcode::PopBlock,
                Opcode::ReturnBlock
            ]
        );
    }

    #[test]
    fn zero_argument_call_uses_the_fast_opcode() {
        let ops = opcodes("f()");
        assert_eq!(ops[0], Opcode::PushIdent);
        assert_eq!(ops[1], Opcode::Call0);
    }

    #[test]
    fn direct_eval_selects_call_eval() {
        let ops = opcodes("eval('1')");
        assert!(ops.contains(&Opcode::CallEval));
    }

    #[test]
    fn array_literal_with_exactly_sixty_four_items_appends_once() {
        let mut source = String::from("[");
        for i in 0..64 {
            source.push_str(&i.to_string());
            source.push(',');
        }
        source.push(']');
        let appends = opcodes(&source)
            .into_iter()
            .filter(|op| *op == Opcode::ArrayAppend)
            .count();
        assert_eq!(appends, 1);

        // Sixty-five items need a second batch.
        let mut source = String::from("[");
        for i in 0..65 {
            source.push_str(&i.to_string());
            source.push(',');
        }
        source.push(']');
        let appends = opcodes(&source)
            .into_iter()
            .filter(|op| *op == Opcode::ArrayAppend)
            .count();
        assert_eq!(appends, 2);
    }

    #[test]
    fn argument_count_255_succeeds_and_256_is_rejected() {
        let args_255 = vec!["0"; 255].join(",");
        assert!(compile_source(&format!("f({args_255})")).is_ok());
        let args_256 = vec!["0"; 256].join(",");
        let error = compile_source(&format!("f({args_256})")).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::ArgumentLimitReached);
    }

    #[test]
    fn strict_mode_rejects_assignment_to_eval_and_arguments() {
        let error = compile_source("'use strict'; eval = 1").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::EvalCannotAssigned);
        let error = compile_source("'use strict'; arguments = 1").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::ArgumentsCannotAssigned);
        let error = compile_source("'use strict'; eval++").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::EvalCannotAssigned);
        // Without the directive the same source parses.
        assert!(compile_source("eval = 1").is_ok());
    }

    #[test]
    fn negated_number_literals_fold_their_sign() {
        // `-5` is a byte-encoded negative push, not Negate over a push.
        let ops = opcodes("-5");
        assert_eq!(ops[0], Opcode::PushNumberNeg);
        // Double negation cancels.
        let ops = opcodes("- -5");
        assert_eq!(ops[0], Opcode::PushNumberPos);
        // Negative zero survives through the literal pool.
        let blob = compile_source("-0").unwrap();
        assert!(blob.literals.iter().any(|lit| matches!(
            lit,
            crate::bytecode::Literal::Number(x) if *x == 0.0 && x.is_sign_negative()
        )));
    }

    #[test]
    fn ternary_condition_over_logical_not_inverts_the_branch() {
        // The inversion applies to a bare LogicalNot; a fused
        // UnaryWithLiteral keeps the normal branch.
        let ops = opcodes("!(a + b) ? 1 : 2");
        assert!(ops.contains(&Opcode::BranchIfTrueForward));
        assert!(!ops.contains(&Opcode::BranchIfFalseForward));
        let ops = opcodes("a ? 1 : 2");
        assert!(ops.contains(&Opcode::BranchIfFalseForward));
    }

    #[test]
    fn logical_operators_emit_short_circuit_branches() {
        let ops = opcodes("a || b");
        assert_eq!(ops[0], Opcode::PushIdent);
        assert_eq!(ops[1], Opcode::BranchIfLogicalTrue);
        let ops = opcodes("a && b");
        assert_eq!(ops[1], Opcode::BranchIfLogicalFalse);
    }

    #[test]
    fn function_parameters_occupy_the_leading_literals() {
        let mut ctx = Context::new();
        let script = compile(&mut ctx, "function f(alpha, beta) { return alpha; }", CompileKind::Script).unwrap();
        let blob = ctx.code.get(script);
        let nested = blob.nested_code_ids().next().expect("one nested blob");
        let function_blob = ctx.code.get(nested);
        assert_eq!(function_blob.argument_end, 2);
        let alpha = ctx.interns.intern("alpha");
        let beta = ctx.interns.intern("beta");
        assert_eq!(function_blob.literals[0], crate::bytecode::Literal::Ident(alpha));
        assert_eq!(function_blob.literals[1], crate::bytecode::Literal::Ident(beta));
        assert!(function_blob.flags & flags::IS_FUNCTION != 0);
        assert!(function_blob.flags & flags::LEXICAL_ENV_NOT_NEEDED == 0);
    }

    #[test]
    fn leaf_functions_skip_the_lexical_environment() {
        let mut ctx = Context::new();
        let script = compile(&mut ctx, "function f() { return 1; }", CompileKind::Script).unwrap();
        let blob = ctx.code.get(script);
        let nested = blob.nested_code_ids().next().expect("one nested blob");
        let function_blob = ctx.code.get(nested);
        assert!(function_blob.flags & flags::LEXICAL_ENV_NOT_NEEDED != 0);
        assert!(function_blob.flags & flags::ARGUMENTS_NEEDED == 0);
    }

    #[test]
    fn observing_arguments_sets_the_flag() {
        let mut ctx = Context::new();
        let script = compile(&mut ctx, "function f() { return arguments; }", CompileKind::Script).unwrap();
        let blob = ctx.code.get(script);
        let nested = blob.nested_code_ids().next().expect("one nested blob");
        let function_blob = ctx.code.get(nested);
        assert!(function_blob.flags & flags::ARGUMENTS_NEEDED != 0);
        assert!(function_blob.flags & flags::LEXICAL_ENV_NOT_NEEDED == 0);
    }

    #[test]
    fn compound_assignment_fuses_a_literal_right_side() {
        let ops = opcodes("x += 1.5");
        assert_eq!(ops[0], Opcode::AssignIdentGet);
        assert_eq!(ops[1], Opcode::BinaryAssignWithLiteral);
        // A stack right side goes through the unfused form.
        let ops = opcodes("x += y()");
        assert!(ops.contains(&Opcode::BinaryAssign));
    }

    #[test]
    fn comma_expression_pops_intermediate_values() {
        let ops = opcodes("1, 2");
        assert!(ops.contains(&Opcode::Pop));
    }
}
