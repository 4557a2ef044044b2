use crate::rules::Precedence;
use crate::{CompileError, Collaborator, Compiler};
use bytecode::{FunctionKind, OpCode, Value};
use lexer::TokenKind;

impl<'c, 'src, C: Collaborator> Compiler<'c, 'src, C> {
    pub(crate) fn prefix(&mut self, kind: TokenKind, can_assign: bool) -> Result<(), CompileError> {
        match kind {
            TokenKind::LParen => self.grouping(),
            TokenKind::Minus | TokenKind::Not => self.unary(kind),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Nil => Ok(self.emit_op(OpCode::Nil)),
            TokenKind::True => Ok(self.emit_op(OpCode::True)),
            TokenKind::False => Ok(self.emit_op(OpCode::False)),
            TokenKind::This => self.this_expr(),
            TokenKind::Super => self.super_expr(),
            _ => unreachable!("has_prefix_rule should have rejected {kind:?}"),
        }
    }

    pub(crate) fn infix(&mut self, kind: TokenKind, can_assign: bool) -> Result<(), CompileError> {
        match kind {
            TokenKind::Equal
            | TokenKind::PlusEqual
            | TokenKind::MinusEqual
            | TokenKind::StarEqual
            | TokenKind::SlashEqual
            | TokenKind::AmpEqual
            | TokenKind::CaretEqual
            | TokenKind::PipeEqual => {
                // Reaching here means the left-hand side was *not* a plain
                // identifier/property access (those consume `=` themselves
                // in `variable`/`dot`) — so whatever produced it wasn't a
                // valid assignment target.
                let _ = can_assign;
                self.error_previous("Invalid assignment target.");
                Err(CompileError::InvalidAssignmentTarget)
            }
            TokenKind::And => self.and_(),
            TokenKind::Or => self.or_(),
            TokenKind::LParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            _ => self.binary(kind),
        }
    }

    fn number(&mut self) -> Result<(), CompileError> {
        let text: String = self.previous.lexeme.chars().filter(|&c| c != '_').collect();
        let value: f64 = text.parse().expect("scanner only emits well-formed numeric lexemes");
        self.emit_constant(Value::Number(value))?;
        Ok(())
    }

    fn string(&mut self) -> Result<(), CompileError> {
        let raw = self.previous.is_raw_string();
        let body = strip_string_quotes(self.previous.lexeme, raw);
        let content = if raw { body.to_string() } else { unescape(body) };
        let handle = self.collaborator.intern_string(&content);
        self.emit_constant(Value::string(handle))?;
        Ok(())
    }

    fn grouping(&mut self) -> Result<(), CompileError> {
        self.expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after expression.")
    }

    fn unary(&mut self, op_kind: TokenKind) -> Result<(), CompileError> {
        self.parse_precedence(Precedence::Unary)?;
        match op_kind {
            TokenKind::Minus => {
                if !self.try_fold_negate() {
                    self.emit_op(OpCode::Negate);
                }
            }
            TokenKind::Not => {
                if !self.try_fold_not() {
                    self.emit_op(OpCode::Not);
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    fn binary(&mut self, op_kind: TokenKind) -> Result<(), CompileError> {
        let prec = crate::rules::infix_precedence(op_kind);
        self.parse_precedence(prec.next())?;
        match op_kind {
            TokenKind::Plus => self.emit_foldable(OpCode::Add),
            TokenKind::Minus => self.emit_foldable(OpCode::Subtract),
            TokenKind::Star => self.emit_foldable(OpCode::Multiply),
            TokenKind::Slash => self.emit_foldable(OpCode::Divide),
            TokenKind::Percent => self.emit_op(OpCode::Mod),
            TokenKind::StarStar => self.emit_op(OpCode::Pow),
            TokenKind::Amp => self.emit_op(OpCode::BitwiseAnd),
            TokenKind::Caret => self.emit_op(OpCode::BitwiseXor),
            TokenKind::Pipe => self.emit_op(OpCode::BitwiseOr),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            _ => unreachable!(),
        }
        Ok(())
    }

    fn emit_foldable(&mut self, op: OpCode) {
        if !self.try_fold_numeric_binary(op) {
            self.emit_op(op);
        }
    }

    fn and_(&mut self) -> Result<(), CompileError> {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And.next())?;
        self.patch_jump(end_jump)
    }

    fn or_(&mut self) -> Result<(), CompileError> {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump)?;
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or.next())?;
        self.patch_jump(end_jump)
    }

    fn variable(&mut self, can_assign: bool) -> Result<(), CompileError> {
        let name = self.previous.lexeme;
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression()?;
            self.set_variable(name)?;
        } else if can_assign && compound_assign_op(self.current.kind).is_some() {
            let op = compound_assign_op(self.current.kind).unwrap();
            self.advance();
            self.get_variable(name)?;
            self.expression()?;
            self.emit_foldable(op);
            self.set_variable(name)?;
        } else {
            self.get_variable(name)?;
        }
        Ok(())
    }

    pub(crate) fn call(&mut self) -> Result<(), CompileError> {
        let argc = self.argument_list()?;
        self.emit_op(OpCode::Call);
        self.emit_byte(argc);
        // This grammar has no call-site argument-spread syntax (only
        // parameter-side `...rest`); the ABI's unpack flag is always 0.
        self.emit_byte(0);
        Ok(())
    }

    pub(crate) fn argument_list(&mut self) -> Result<u8, CompileError> {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression()?;
                if count >= 255 {
                    self.error_previous("Too many arguments.");
                    return Err(CompileError::TooManyArguments);
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after arguments.")?;
        Ok(count as u8)
    }

    fn dot(&mut self, can_assign: bool) -> Result<(), CompileError> {
        self.consume(TokenKind::Identifier, "Expected property name after '.'.")?;
        let name = self.previous.lexeme;
        let idx = self.name_constant(name)?;

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression()?;
            self.emit_op(OpCode::SetProperty);
            self.emit_byte(idx);
        } else if can_assign && compound_assign_op(self.current.kind).is_some() {
            let op = compound_assign_op(self.current.kind).unwrap();
            self.advance();
            self.emit_op(OpCode::GetPropertyNoPop);
            self.emit_byte(idx);
            self.expression()?;
            self.emit_foldable(op);
            self.emit_op(OpCode::SetProperty);
            self.emit_byte(idx);
        } else if self.match_token(TokenKind::LParen) {
            let argc = self.argument_list()?;
            self.emit_op(OpCode::Invoke);
            self.emit_byte(argc);
            self.emit_byte(idx);
            self.emit_byte(0);
        } else {
            self.emit_op(OpCode::GetProperty);
            self.emit_byte(idx);
        }
        Ok(())
    }

    fn this_expr(&mut self) -> Result<(), CompileError> {
        if !self.in_method() {
            return Err(CompileError::ThisOutsideMethod);
        }
        self.get_variable("this")
    }

    fn super_expr(&mut self) -> Result<(), CompileError> {
        if !self.in_method() {
            return Err(CompileError::SuperOutsideMethod);
        }
        if !self.in_subclass_method() {
            return Err(CompileError::SuperWithoutSuperclass);
        }
        self.consume(TokenKind::Dot, "Expected '.' after 'super'.")?;
        self.consume(TokenKind::Identifier, "Expected superclass method name.")?;
        let name = self.previous.lexeme;
        let idx = self.name_constant(name)?;
        self.get_variable("this")?;
        self.get_variable("super")?;
        if self.match_token(TokenKind::LParen) {
            let argc = self.argument_list()?;
            self.emit_op(OpCode::Super);
            self.emit_byte(argc);
            self.emit_byte(idx);
            self.emit_byte(0);
        } else {
            self.emit_op(OpCode::GetSuper);
            self.emit_byte(idx);
        }
        Ok(())
    }

    fn in_method(&self) -> bool {
        self.frames
            .iter()
            .any(|f| matches!(f.function.borrow().kind, FunctionKind::Method | FunctionKind::Initializer))
    }

    fn in_subclass_method(&self) -> bool {
        self.frames.iter().any(|f| f.classes.iter().any(|c| c.has_superclass))
    }
}

fn compound_assign_op(kind: TokenKind) -> Option<OpCode> {
    Some(match kind {
        TokenKind::PlusEqual => OpCode::Add,
        TokenKind::MinusEqual => OpCode::Subtract,
        TokenKind::StarEqual => OpCode::Multiply,
        TokenKind::SlashEqual => OpCode::Divide,
        TokenKind::AmpEqual => OpCode::BitwiseAnd,
        TokenKind::CaretEqual => OpCode::BitwiseXor,
        TokenKind::PipeEqual => OpCode::BitwiseOr,
        _ => return None,
    })
}

pub(crate) fn strip_string_quotes(lexeme: &str, raw: bool) -> &str {
    let body = if raw { &lexeme[1..] } else { lexeme };
    &body[1..body.len() - 1]
}

pub(crate) fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_handles_common_sequences() {
        assert_eq!(unescape(r"a\nb\tc"), "a\nb\tc");
    }

    #[test]
    fn strip_string_quotes_handles_raw_and_plain() {
        assert_eq!(strip_string_quotes("\"abc\"", false), "abc");
        assert_eq!(strip_string_quotes("r\"abc\"", true), "abc");
    }
}
