use crate::chunk::Chunk;
use std::fmt;
use std::rc::Rc;

/// What kind of body a [`FunctionObject`] was compiled from — drives a few
/// emission choices (`init` auto-returns `this`, a top-level module return is
/// an error, and so on) without needing a separate AST node to remember it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

/// Whether a binding is reachable from outside its owning module.
///
/// Resolved from the leading-underscore convention shared by the rest of the
/// language's name resolution (`_helper` is private to its module); see
/// DESIGN.md for the open-question writeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Public,
    Private,
}

impl AccessLevel {
    pub fn of(name: &str) -> Self {
        if name.starts_with('_') {
            AccessLevel::Private
        } else {
            AccessLevel::Public
        }
    }
}

/// The compiled representation of one function, method, or module body.
///
/// Allocated by the collaborator at frame-init (see `compiler::Collaborator`)
/// and mutated by the driver as parameters and nested closures are seen;
/// immutable from the compiler's point of view once `endCompiler` runs.
pub struct FunctionObject {
    pub name: Option<Rc<str>>,
    pub module: Rc<str>,
    pub kind: FunctionKind,
    pub access: AccessLevel,
    pub arity: u8,
    pub arity_optional: u8,
    pub is_variadic: bool,
    pub upvalue_count: u8,
    pub chunk: Chunk,
}

impl FunctionObject {
    pub fn new(module: Rc<str>, kind: FunctionKind, access: AccessLevel) -> Self {
        Self {
            name: None,
            module,
            kind,
            access,
            arity: 0,
            arity_optional: 0,
            is_variadic: false,
            upvalue_count: 0,
            chunk: Chunk::new(),
        }
    }
}

impl fmt::Debug for FunctionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "<function {name}/{}>", self.arity),
            None => write!(f, "<script>"),
        }
    }
}
