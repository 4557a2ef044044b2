use bytecode::{AccessLevel, FunctionHandle, FunctionKind, FunctionObject, StringHandle, Value};
use compiler::{Collaborator, Diagnostic, Reporter};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Names the compiler should treat as VM-provided globals (`GET_GLOBAL`)
/// rather than module-local bindings (`GET_MODULE`/`GET_LOCAL`). A real
/// execution engine registers far more of these at startup (see the
/// teacher's `natives.rs`); this minimal stand-in carries just enough to
/// exercise the distinction.
const VM_GLOBALS: &[&str] = &[
    "print", "type_of", "to_string", "to_number", "clock", "rand",
];

/// The compiler's one concrete `Collaborator`: a plain interner, a
/// module-const bookkeeping set, and a GC-root value stack, with no actual
/// tracing collector behind any of it. Diagnostics are forwarded to a
/// caller-supplied [`Reporter`].
pub struct Runtime<R: Reporter> {
    reporter: R,
    strings: HashSet<Rc<str>>,
    module_consts: HashSet<Rc<str>>,
    value_stack: Vec<Value>,
}

impl<R: Reporter> Runtime<R> {
    pub fn new(reporter: R) -> Self {
        Self {
            reporter,
            strings: HashSet::new(),
            module_consts: HashSet::new(),
            value_stack: Vec::new(),
        }
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }
}

impl<R: Reporter> Collaborator for Runtime<R> {
    fn intern_string(&mut self, bytes: &str) -> StringHandle {
        if let Some(existing) = self.strings.get(bytes) {
            return Rc::clone(existing);
        }
        let handle: Rc<str> = Rc::from(bytes);
        self.strings.insert(Rc::clone(&handle));
        handle
    }

    fn new_function(&mut self, module: Rc<str>, kind: FunctionKind, access: AccessLevel) -> FunctionHandle {
        Rc::new(RefCell::new(FunctionObject::new(module, kind, access)))
    }

    fn push_value(&mut self, value: Value) {
        self.value_stack.push(value);
    }

    fn pop_value(&mut self) -> Option<Value> {
        self.value_stack.pop()
    }

    fn is_vm_global(&self, name: &str) -> bool {
        VM_GLOBALS.contains(&name)
    }

    fn declare_module_const(&mut self, name: &str) {
        let handle = self.intern_string(name);
        self.module_consts.insert(handle);
    }

    fn is_module_const(&self, name: &str) -> bool {
        self.module_consts.contains(name)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        // Nothing in this crate's compiler ever produces a warning-severity
        // diagnostic yet; every `report` call is an error.
        self.reporter.error(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::Phase;

    struct NullReporter;
    impl Reporter for NullReporter {
        fn warning(&mut self, _: Diagnostic) {}
        fn error(&mut self, _: Diagnostic) {}
    }

    #[test]
    fn interning_the_same_content_twice_returns_the_same_allocation() {
        let mut rt = Runtime::new(NullReporter);
        let a = rt.intern_string("hello");
        let b = rt.intern_string("hello");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn module_consts_round_trip() {
        let mut rt = Runtime::new(NullReporter);
        assert!(!rt.is_module_const("PI"));
        rt.declare_module_const("PI");
        assert!(rt.is_module_const("PI"));
    }

    #[test]
    fn vm_globals_are_recognized_by_name() {
        let rt = Runtime::new(NullReporter);
        assert!(rt.is_vm_global("print"));
        assert!(!rt.is_vm_global("my_helper"));
    }

    #[test]
    fn report_forwards_to_the_reporter_as_an_error() {
        struct CountingReporter(usize);
        impl Reporter for CountingReporter {
            fn warning(&mut self, _: Diagnostic) {}
            fn error(&mut self, _: Diagnostic) {
                self.0 += 1;
            }
        }
        let mut rt = Runtime::new(CountingReporter(0));
        rt.report(Diagnostic {
            phase: Phase::Semantic,
            module: Rc::from("m"),
            line: 1,
            lexeme: "x".into(),
            message: "broken".into(),
        });
        assert_eq!(rt.into_reporter().0, 1);
    }
}
