use crate::{CompileError, Collaborator, Compiler};
use bytecode::{OpCode, Value};

impl<'c, 'src, C: Collaborator> Compiler<'c, 'src, C> {
    fn line(&self) -> u32 {
        self.previous.line
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.line();
        self.frames
            .last()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .emit_byte(byte, line);
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op.into());
    }

    pub(crate) fn emit_ops(&mut self, a: OpCode, b: OpCode) {
        self.emit_op(a);
        self.emit_op(b);
    }

    pub(crate) fn emit_constant(&mut self, value: Value) -> Result<u8, CompileError> {
        let line = self.line();
        let idx = self
            .frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .emit_constant(value, line)?;
        Ok(idx)
    }

    /// Adds `value` to the current chunk's constant pool without emitting an
    /// opcode — used when the caller itself emits the 1-byte operand (e.g. a
    /// name constant for `GET_MODULE`).
    pub(crate) fn add_constant(&mut self, value: Value) -> Result<u8, CompileError> {
        Ok(self
            .frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .add_constant(value)?)
    }

    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        let line = self.line();
        self.frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .emit_jump(op, line)
    }

    pub(crate) fn patch_jump(&mut self, placeholder: usize) -> Result<(), CompileError> {
        Ok(self
            .frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .patch_jump(placeholder)?)
    }

    /// Rewrites a `break`'s `OP_BREAK` placeholder (reserved by
    /// `emit_jump(OpCode::Break)`) into a patched `OP_JUMP` targeting the
    /// current end of the chunk.
    pub(crate) fn patch_break(&mut self, placeholder: usize) -> Result<(), CompileError> {
        let op_index = placeholder - 1;
        self.frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .rewrite_opcode(op_index, OpCode::Jump);
        self.patch_jump(placeholder)
    }

    pub(crate) fn emit_loop(&mut self, loop_start: usize) -> Result<(), CompileError> {
        let line = self.line();
        Ok(self
            .frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .emit_loop(loop_start, line)?)
    }

    pub(crate) fn current_offset(&self) -> usize {
        self.frames.last().unwrap().function.borrow().chunk.len()
    }

    pub(crate) fn try_fold_numeric_binary(&mut self, op: OpCode) -> bool {
        let f: fn(f64, f64) -> f64 = match op {
            OpCode::Add => |a, b| a + b,
            OpCode::Subtract => |a, b| a - b,
            OpCode::Multiply => |a, b| a * b,
            OpCode::Divide => |a, b| a / b,
            _ => return false,
        };
        self.frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .try_fold_numeric_binary(f)
    }

    pub(crate) fn try_fold_not(&mut self) -> bool {
        self.frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .try_fold_not()
    }

    pub(crate) fn try_fold_negate(&mut self) -> bool {
        self.frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .try_fold_negate()
    }

    /// Interns and pool-allocates a name constant, reusing the frame-local
    /// cache so repeated references to the same identifier in one chunk
    /// don't re-intern or re-append to the pool.
    pub(crate) fn name_constant(&mut self, name: &'src str) -> Result<u8, CompileError> {
        if let Some(&idx) = self.frames.last().unwrap().cached_name_constant(name) {
            return Ok(idx);
        }
        let handle = self.collaborator.intern_string(name);
        let idx = self
            .frames
            .last_mut()
            .unwrap()
            .function
            .borrow_mut()
            .chunk
            .add_constant(Value::string(handle))?;
        self.frames.last_mut().unwrap().insert_name_constant(name, idx);
        Ok(idx)
    }
}
