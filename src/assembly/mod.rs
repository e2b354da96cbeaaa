//! CIL instruction handling.
//!
//! The opcode tables [`INSTRUCTIONS`] and [`INSTRUCTIONS_FE`] drive three consumers: the
//! [`decode_stream`] decoder used to walk existing bodies when tokens are patched, the
//! [`InstructionEncoder`] used to emit the synthesized initializer, and [`verify_body`], which
//! replays a body to prove it is stack balanced before it is committed.

mod decoder;
mod encoder;
mod instruction;
mod instructions;
mod verifier;

pub use decoder::{decode_instruction, decode_stream};
pub use encoder::{call_stack_effect, InstructionEncoder, LabelFixup};
pub use instruction::{
    FlowType, Immediate, Instruction, Operand, OperandType, StackBehavior,
};
pub use instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FE};
pub use verifier::verify_body;
