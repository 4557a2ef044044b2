mod emit;
mod expr;
mod frame;
mod parser;
mod resolver;
mod rules;
mod stmt;

use bytecode::{Chunk, ChunkError, FunctionHandle, FunctionKind, StringHandle};
use frame::CompilerFrame;
use lexer::{Scanner, Token, TokenKind};
use std::fmt;
use std::rc::Rc;

/// Where in the pipeline a diagnostic originated — carried through to the
/// rendered report so a reporter can group or colorize by phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexical,
    Syntactic,
    Semantic,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Lexical => "lexical",
            Phase::Syntactic => "syntactic",
            Phase::Semantic => "semantic",
        };
        write!(f, "{s}")
    }
}

/// A rendered diagnostic: enough to print `module:line: message` and to
/// highlight the offending lexeme, without holding a borrow of the source.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: Phase,
    pub module: Rc<str>,
    pub line: u32,
    pub lexeme: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} error: {}",
            self.module, self.line, self.phase, self.message
        )
    }
}

pub trait Reporter {
    fn warning(&mut self, diagnostic: Diagnostic);
    fn error(&mut self, diagnostic: Diagnostic);
}

/// The compiler's only window onto the outside world: string interning,
/// function allocation, the globals/constants tables, GC-root bookkeeping,
/// and diagnostics. A production execution engine implements this over its
/// own heap; this crate ships one minimal, non-tracing implementation in the
/// `runtime` crate.
pub trait Collaborator {
    fn intern_string(&mut self, bytes: &str) -> StringHandle;
    fn new_function(&mut self, module: Rc<str>, kind: FunctionKind, access: bytecode::AccessLevel) -> FunctionHandle;

    fn push_value(&mut self, value: bytecode::Value);
    fn pop_value(&mut self) -> Option<bytecode::Value>;

    /// `true` if `name` is a VM-provided builtin global (read via
    /// `GET_GLOBAL`) rather than a binding local to this module.
    fn is_vm_global(&self, name: &str) -> bool;

    /// Records `name` as declared `const` at module scope.
    fn declare_module_const(&mut self, name: &str);
    /// `true` if `name` was declared `const` at module scope.
    fn is_module_const(&self, name: &str) -> bool;

    fn report(&mut self, diagnostic: Diagnostic);
}

/// All compiler errors are values; `compile` never panics on malformed
/// input. The parser's `had_error`/`panic_mode` pair is the only sticky
/// cross-call state — everything else returns `Result` immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    TooManyConstants,
    TooMuchCodeToJumpOver,
    TooManyLocals,
    TooManyUpvalues,
    TooManyParameters,
    TooManyArguments,
    ReadLocalInOwnInitializer,
    AlreadyDeclaredInScope,
    AssignToConstant,
    InvalidAssignmentTarget,
    ReturnAtTopLevel,
    ReturnValueFromInitializer,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    VariadicParameterNotLast,
    RequiredAfterOptional,
    VariadicInInitializer,
    OptionalInInitializer,
    ThisOutsideMethod,
    SuperOutsideMethod,
    SuperWithoutSuperclass,
    ConstWithoutInitializer,
    Syntax(String),
    Lexical(String),
}

impl From<ChunkError> for CompileError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::TooManyConstants => CompileError::TooManyConstants,
            ChunkError::TooMuchCodeToJumpOver => CompileError::TooMuchCodeToJumpOver,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &str = match self {
            CompileError::TooManyConstants => "Too many constants in one chunk.",
            CompileError::TooMuchCodeToJumpOver => "Too much code to jump over.",
            CompileError::TooManyLocals => "Too many local variables in one function.",
            CompileError::TooManyUpvalues => "Too many upvalues in one function.",
            CompileError::TooManyParameters => "Too many parameters.",
            CompileError::TooManyArguments => "Too many arguments.",
            CompileError::ReadLocalInOwnInitializer => {
                "Cannot read local variable in its own initializer."
            }
            CompileError::AlreadyDeclaredInScope => {
                "Already a variable with this name in this scope."
            }
            CompileError::AssignToConstant => "Cannot assign to a constant.",
            CompileError::InvalidAssignmentTarget => "Invalid assignment target.",
            CompileError::ReturnAtTopLevel => "Cannot return from top-level code.",
            CompileError::ReturnValueFromInitializer => {
                "Cannot return a value from an initializer."
            }
            CompileError::BreakOutsideLoop => "Cannot utilise 'break' outside of a loop.",
            CompileError::ContinueOutsideLoop => "Cannot utilise 'continue' outside of a loop.",
            CompileError::VariadicParameterNotLast => "Spread parameter must be last.",
            CompileError::RequiredAfterOptional => {
                "Required parameter cannot follow an optional parameter."
            }
            CompileError::VariadicInInitializer => {
                "Variadic parameters are not permitted in 'init'."
            }
            CompileError::OptionalInInitializer => {
                "Optional parameters are not permitted in 'init'."
            }
            CompileError::ThisOutsideMethod => "Cannot use 'this' outside of a method.",
            CompileError::SuperOutsideMethod => "Cannot use 'super' outside of a method.",
            CompileError::SuperWithoutSuperclass => "Cannot use 'super' in a class with no superclass.",
            CompileError::ConstWithoutInitializer => "'const' declaration must have an initializer.",
            CompileError::Syntax(msg) => return write!(f, "{msg}"),
            CompileError::Lexical(msg) => return write!(f, "{msg}"),
        };
        write!(f, "{s}")
    }
}

/// Drives one module's compile: owns the scanner, the token lookahead pair,
/// the panic-mode/had-error sticky state, and the stack of nested
/// [`CompilerFrame`]s (innermost last).
pub struct Compiler<'c, 'src, C: Collaborator> {
    collaborator: &'c mut C,
    module: Rc<str>,
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    frames: Vec<CompilerFrame<'src>>,
}

/// Compiles `source` as a module named `module`, returning the top-level
/// script [`FunctionHandle`] on success. On any compile error, diagnostics
/// have already been reported through the collaborator and `Err(())` is
/// returned — compile is atomic at the module grain.
pub fn compile<C: Collaborator>(
    collaborator: &mut C,
    module: Rc<str>,
    source: &str,
) -> Result<FunctionHandle, ()> {
    let mut compiler = parser::new_compiler(collaborator, Rc::clone(&module), source);
    compiler.run()
}
