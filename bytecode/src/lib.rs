pub mod chunk;
pub mod function;
pub mod opcode;
pub mod value;

pub use chunk::{Chunk, ChunkError};
pub use function::{AccessLevel, FunctionKind, FunctionObject};
pub use opcode::OpCode;
pub use value::{FunctionHandle, Object, StringHandle, Value};
