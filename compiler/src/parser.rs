use crate::frame::CompilerFrame;
use crate::rules::{has_prefix_rule, Precedence};
use crate::{CompileError, Collaborator, Compiler, Diagnostic, Phase};
use bytecode::{AccessLevel, FunctionKind, OpCode};
use lexer::{Scanner, Token, TokenKind};
use std::rc::Rc;

pub(crate) fn new_compiler<'c, 'src, C: Collaborator>(
    collaborator: &'c mut C,
    module: Rc<str>,
    source: &'src str,
) -> Compiler<'c, 'src, C> {
    let function = collaborator.new_function(Rc::clone(&module), FunctionKind::Script, AccessLevel::Public);
    let dummy = Token::new(TokenKind::Eof, "", 0);
    let mut compiler = Compiler {
        collaborator,
        module,
        scanner: Scanner::new(source),
        previous: dummy,
        current: dummy,
        had_error: false,
        panic_mode: false,
        frames: vec![CompilerFrame::new(function, false)],
    };
    compiler.advance();
    compiler
}

impl<'c, 'src, C: Collaborator> Compiler<'c, 'src, C> {
    pub(crate) fn run(&mut self) -> Result<bytecode::FunctionHandle, ()> {
        while self.current.kind != TokenKind::Eof {
            self.declaration_or_sync();
        }
        self.consume(TokenKind::Eof, "Expected end of input.").ok();
        self.emit_return();

        if self.had_error {
            Err(())
        } else {
            Ok(self.frames.pop().expect("script frame never popped early").function)
        }
    }

    /// Advances the one-token lookahead, reporting (and skipping over) any
    /// `Error` tokens the scanner produces along the way.
    pub(crate) fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at(self.current, Phase::Lexical, &message);
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) -> Result<(), CompileError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            self.error_at_current(message);
            Err(CompileError::Syntax(message.to_string()))
        }
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, Phase::Syntactic, message);
    }

    pub(crate) fn error_previous(&mut self, message: &str) {
        self.error_at(self.previous, Phase::Syntactic, message);
    }

    pub(crate) fn error_semantic(&mut self, err: &CompileError) {
        let message = err.to_string();
        self.error_at(self.previous, Phase::Semantic, &message);
    }

    fn error_at(&mut self, token: Token<'src>, phase: Phase, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.collaborator.report(Diagnostic {
            phase,
            module: Rc::clone(&self.module),
            line: token.line,
            lexeme: token.rendered_lexeme().to_string(),
            message: message.to_string(),
        });
    }

    /// Advances past tokens until a statement boundary, so one syntax error
    /// doesn't cascade into a string of spurious follow-on errors.
    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            if TokenKind::STATEMENT_BOUNDARIES.contains(&self.current.kind) {
                return;
            }
            self.advance();
        }
    }

    fn emit_return(&mut self) {
        let kind = self.frames.last().unwrap().function.borrow().kind;
        if kind == FunctionKind::Initializer {
            self.emit_op(OpCode::GetLocal);
            self.emit_byte(0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    pub(crate) fn emit_implicit_return(&mut self) {
        self.emit_return();
    }

    /// `parsePrecedence`: consumes one token, dispatches its prefix rule,
    /// then repeatedly consumes infix operators whose precedence is at
    /// least `min`. Reports "invalid assignment target" if an unconsumed
    /// `=`-family token remains after a prefix expression that refused it.
    pub(crate) fn parse_precedence(&mut self, min: Precedence) -> Result<(), CompileError> {
        self.advance();
        let can_assign = min <= Precedence::Assignment;
        if !has_prefix_rule(self.previous.kind) {
            self.error_previous("Expected an expression.");
            return Err(CompileError::Syntax("Expected an expression.".into()));
        }
        self.prefix(self.previous.kind, can_assign)?;

        // An unconsumed `=`-family token is always reachable here when
        // `can_assign` is true, since Assignment is the ladder's lowest
        // precedence — `infix`'s own Equal/compound-assign arm is what
        // reports "invalid assignment target" for a non-lvalue prefix
        // expression like `(a + b) = c`.
        while min <= crate::rules::infix_precedence(self.current.kind) {
            self.advance();
            self.infix(self.previous.kind, can_assign)?;
        }
        Ok(())
    }

    pub(crate) fn expression(&mut self) -> Result<(), CompileError> {
        self.parse_precedence(Precedence::Assignment)
    }
}
