use crate::frame::resolve_upvalue;
use crate::{CompileError, Collaborator, Compiler};
use bytecode::OpCode;

impl<'c, 'src, C: Collaborator> Compiler<'c, 'src, C> {
    pub(crate) fn get_variable(&mut self, name: &'src str) -> Result<(), CompileError> {
        if let Some(slot) = self.frames.last().unwrap().resolve_local(name, false)? {
            self.emit_op(OpCode::GetLocal);
            self.emit_byte(slot);
            return Ok(());
        }
        if let Some(idx) = resolve_upvalue(&mut self.frames, name)? {
            self.emit_op(OpCode::GetUpvalue);
            self.emit_byte(idx);
            return Ok(());
        }
        let idx = self.name_constant(name)?;
        if self.collaborator.is_vm_global(name) {
            self.emit_op(OpCode::GetGlobal);
        } else {
            self.emit_op(OpCode::GetModule);
        }
        self.emit_byte(idx);
        Ok(())
    }

    pub(crate) fn set_variable(&mut self, name: &'src str) -> Result<(), CompileError> {
        if let Some(slot) = self.frames.last().unwrap().resolve_local(name, false)? {
            if self.frames.last().unwrap().locals[slot as usize].constant {
                return Err(CompileError::AssignToConstant);
            }
            self.emit_op(OpCode::SetLocal);
            self.emit_byte(slot);
            return Ok(());
        }
        if let Some(idx) = resolve_upvalue(&mut self.frames, name)? {
            if self.frames.last().unwrap().upvalues[idx as usize].constant {
                return Err(CompileError::AssignToConstant);
            }
            self.emit_op(OpCode::SetUpvalue);
            self.emit_byte(idx);
            return Ok(());
        }
        if self.collaborator.is_module_const(name) {
            return Err(CompileError::AssignToConstant);
        }
        let idx = self.name_constant(name)?;
        self.emit_op(OpCode::SetModule);
        self.emit_byte(idx);
        Ok(())
    }

    /// `declareVariable`: registers a local in the current scope, or does
    /// nothing for a scope-depth-zero (module) binding, which is addressed
    /// by name rather than by slot.
    pub(crate) fn declare_variable(&mut self, name: &'src str, constant: bool) -> Result<(), CompileError> {
        let frame = self.frames.last_mut().unwrap();
        if frame.scope_depth == 0 {
            return Ok(());
        }
        for local in frame.locals.iter().rev() {
            if local.depth != -1 && local.depth < frame.scope_depth as i32 {
                break;
            }
            if local.name == name {
                return Err(CompileError::AlreadyDeclaredInScope);
            }
        }
        frame.add_local(name, constant)
    }

    /// `defineVariable`: marks a local initialized, or — at module scope —
    /// emits `OP_DEFINE_MODULE` and records the `const` flag with the
    /// collaborator.
    pub(crate) fn define_variable(&mut self, name: &'src str, constant: bool) -> Result<(), CompileError> {
        if self.frames.last().unwrap().scope_depth == 0 {
            if constant {
                self.collaborator.declare_module_const(name);
            }
            let idx = self.name_constant(name)?;
            self.emit_op(OpCode::DefineModule);
            self.emit_byte(idx);
        } else {
            self.frames.last_mut().unwrap().mark_initialized();
        }
        Ok(())
    }
}
