use std::convert::TryFrom;
use std::fmt;

/// The stable bytecode ABI shared with the (external) execution engine.
///
/// Operand widths are fixed per opcode and documented on each variant; the
/// compiler is the only producer of this stream, never a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // --- 0 operands ---
    Nil = 0,
    True,
    False,
    Pop,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Pow,
    Not,
    Negate,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    CloseUpvalue,
    Return,
    EndClass,
    ImportVariable,
    ImportEnd,
    Break,
    PopRepl,
    Empty,

    // --- 1-byte operand ---
    Constant,
    GetLocal,
    SetLocal,
    GetGlobal,
    GetModule,
    SetModule,
    DefineModule,
    GetUpvalue,
    SetUpvalue,
    GetProperty,
    GetPropertyNoPop,
    SetProperty,
    SetClassVar,
    GetSuper,
    Method,
    Import,
    Class,
    Subclass,

    // --- 2-byte operand (big-endian, relative) ---
    Jump,
    JumpIfFalse,
    Loop,

    // --- composite operands, see §6 ---
    Call,
    Invoke,
    Super,
    DefineOptional,
    Closure,
    ImportFrom,
}

impl OpCode {
    pub const COUNT: usize = Self::ImportFrom as usize + 1;
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (value as usize) < Self::COUNT {
            // SAFETY: `OpCode` is `repr(u8)` with contiguous discriminants
            // from 0..COUNT, checked by the bound above.
            Ok(unsafe { std::mem::transmute::<u8, OpCode>(value) })
        } else {
            Err(())
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_opcode_through_u8() {
        for byte in 0..OpCode::COUNT as u8 {
            let op = OpCode::try_from(byte).expect("every byte below COUNT decodes");
            assert_eq!(u8::from(op), byte);
        }
    }

    #[test]
    fn rejects_bytes_past_the_table() {
        assert_eq!(OpCode::try_from(u8::MAX), Err(()));
    }
}
