use crate::CompileError;
use bytecode::FunctionHandle;
use std::collections::HashMap;

pub const MAX_LOCALS: usize = 256;
pub const MAX_UPVALUES: usize = 256;

/// Sentinel depth for a local that has been declared but whose initializer
/// hasn't finished compiling yet — reading it is "use before ready".
pub const UNINITIALIZED: i32 = -1;

#[derive(Debug)]
pub struct Local<'src> {
    pub name: &'src str,
    pub depth: i32,
    pub is_upvalue: bool,
    pub constant: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Upvalue {
    pub index: u8,
    pub is_local: bool,
    pub constant: bool,
}

#[derive(Debug)]
pub struct LoopRecord {
    pub start: usize,
    pub scope_depth: u32,
    /// Offset (within the chunk) of the placeholder operand of each `OP_BREAK`
    /// seen inside this loop's body; patched to `OP_JUMP` when the loop ends.
    pub breaks: Vec<usize>,
}

#[derive(Debug)]
pub struct ClassRecord<'src> {
    pub name: &'src str,
    pub has_superclass: bool,
}

/// One nested function's worth of compile-time bookkeeping. The compiler
/// keeps a `Vec<CompilerFrame>` with the innermost function last; resolving a
/// name that isn't local walks back through that vector (see
/// [`resolve_upvalue`]).
pub struct CompilerFrame<'src> {
    pub function: FunctionHandle,
    pub locals: Vec<Local<'src>>,
    pub upvalues: Vec<Upvalue>,
    pub scope_depth: u32,
    pub loops: Vec<LoopRecord>,
    pub classes: Vec<ClassRecord<'src>>,
    name_constants: HashMap<&'src str, u8>,
}

impl<'src> CompilerFrame<'src> {
    pub fn new(function: FunctionHandle, reserve_this: bool) -> Self {
        let mut locals = Vec::with_capacity(MAX_LOCALS);
        // Slot 0 is reserved: `this` for methods, unnamed (unreachable by
        // name) for plain functions, so the runtime stack layout lines up.
        locals.push(Local {
            name: if reserve_this { "this" } else { "" },
            depth: 0,
            is_upvalue: false,
            constant: true,
        });
        Self {
            function,
            locals,
            upvalues: Vec::new(),
            scope_depth: 0,
            loops: Vec::new(),
            classes: Vec::new(),
            name_constants: HashMap::new(),
        }
    }

    pub fn add_local(&mut self, name: &'src str, constant: bool) -> Result<(), CompileError> {
        if self.locals.len() >= MAX_LOCALS {
            return Err(CompileError::TooManyLocals);
        }
        self.locals.push(Local {
            name,
            depth: UNINITIALIZED,
            is_upvalue: false,
            constant,
        });
        Ok(())
    }

    pub fn mark_initialized(&mut self) {
        self.locals.last_mut().unwrap().depth = self.scope_depth as i32;
    }

    /// Marks the last `n` consecutively-declared locals initialized at the
    /// current scope depth (used by `from ... import a, b, c`, which
    /// declares every name before any of them is defined).
    pub fn mark_last_n_initialized(&mut self, n: usize) {
        let depth = self.scope_depth as i32;
        let len = self.locals.len();
        for local in &mut self.locals[len - n..] {
            local.depth = depth;
        }
    }

    /// `resolveLocal`: newest-to-oldest scan, first name match wins.
    /// `allow_uninitialized` is true only when called as a *parent* lookup
    /// from [`resolve_upvalue`] — reading an uninitialized local in one's own
    /// frame is always an error.
    pub fn resolve_local(
        &self,
        name: &str,
        allow_uninitialized: bool,
    ) -> Result<Option<u8>, CompileError> {
        for (idx, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == UNINITIALIZED && !allow_uninitialized {
                    return Err(CompileError::ReadLocalInOwnInitializer);
                }
                return Ok(Some(idx as u8));
            }
        }
        Ok(None)
    }

    fn add_upvalue(&mut self, index: u8, is_local: bool, constant: bool) -> Result<u8, CompileError> {
        for (i, up) in self.upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return Ok(i as u8);
            }
        }
        if self.upvalues.len() >= MAX_UPVALUES {
            return Err(CompileError::TooManyUpvalues);
        }
        let slot = self.upvalues.len() as u8;
        self.upvalues.push(Upvalue {
            index,
            is_local,
            constant,
        });
        Ok(slot)
    }

    /// Looks up a previously pool-allocated index for `name` in this chunk.
    pub fn cached_name_constant(&self, name: &str) -> Option<&u8> {
        self.name_constants.get(name)
    }

    pub fn insert_name_constant(&mut self, name: &'src str, idx: u8) {
        self.name_constants.insert(name, idx);
    }
}

/// `resolveUpvalue`, implemented as recursion over frame-chain slices rather
/// than an `Rc<RefCell<_>>` linked list: `frames` runs outermost-first with
/// the current frame last. Flattens capture through every intermediate
/// frame so a deeply nested closure can reach an ancestor's local.
pub fn resolve_upvalue(frames: &mut [CompilerFrame], name: &str) -> Result<Option<u8>, CompileError> {
    let len = frames.len();
    if len < 2 {
        return Ok(None);
    }
    let (enclosing_chain, current_slice) = frames.split_at_mut(len - 1);
    let enclosing_idx = enclosing_chain.len() - 1;

    if let Some(slot) = enclosing_chain[enclosing_idx].resolve_local(name, true)? {
        enclosing_chain[enclosing_idx].locals[slot as usize].is_upvalue = true;
        let constant = enclosing_chain[enclosing_idx].locals[slot as usize].constant;
        let up = current_slice[0].add_upvalue(slot, true, constant)?;
        return Ok(Some(up));
    }

    match resolve_upvalue(enclosing_chain, name)? {
        Some(parent_idx) => {
            let constant = enclosing_chain[enclosing_idx].upvalues[parent_idx as usize].constant;
            let up = current_slice[0].add_upvalue(parent_idx, false, constant)?;
            Ok(Some(up))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode::{AccessLevel, FunctionKind, FunctionObject};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn frame() -> CompilerFrame<'static> {
        let f = FunctionObject::new(Rc::from("m"), FunctionKind::Function, AccessLevel::Public);
        CompilerFrame::new(Rc::new(RefCell::new(f)), false)
    }

    #[test]
    fn shadowing_resolves_to_the_newest_declaration() {
        let mut f = frame();
        f.add_local("x", false).unwrap();
        f.mark_initialized();
        f.add_local("x", false).unwrap();
        f.mark_initialized();
        assert_eq!(f.resolve_local("x", false).unwrap(), Some(2));
    }

    #[test]
    fn reading_own_uninitialized_local_is_an_error() {
        let mut f = frame();
        f.add_local("x", false).unwrap();
        assert!(matches!(
            f.resolve_local("x", false),
            Err(CompileError::ReadLocalInOwnInitializer)
        ));
    }

    #[test]
    fn upvalue_flattens_through_two_enclosing_frames() {
        let mut outer = frame();
        outer.add_local("x", false).unwrap();
        outer.mark_initialized();
        let middle = frame();
        let inner = frame();
        let mut frames = vec![outer, middle, inner];

        let up = resolve_upvalue(&mut frames, "x").unwrap();
        assert_eq!(up, Some(0));
        assert!(frames[1].upvalues[0].is_local);
        assert_eq!(frames[1].upvalues[0].index, 0);

        let up_inner = resolve_upvalue(&mut frames[..], "x").unwrap();
        // frames[..] still has len 3, so this resolves through frames[1]'s
        // freshly-added upvalue rather than frames[0]'s local directly.
        assert_eq!(up_inner, Some(0));
        assert!(!frames[2].upvalues[0].is_local);
    }

    #[test]
    fn deduplicates_upvalues_by_index_and_locality() {
        let mut outer = frame();
        outer.add_local("x", false).unwrap();
        outer.mark_initialized();
        let inner = frame();
        let mut frames = vec![outer, inner];
        let a = resolve_upvalue(&mut frames, "x").unwrap();
        let b = resolve_upvalue(&mut frames, "x").unwrap();
        assert_eq!(a, b);
        assert_eq!(frames[1].upvalues.len(), 1);
    }
}
