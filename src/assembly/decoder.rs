//! CIL instruction decoding.
//!
//! [`decode_instruction`] reads one instruction at the parser position; [`decode_stream`] walks a
//! whole code range linearly. Branch targets are resolved to code offsets relative to the start of
//! the stream, so they can be compared directly against instruction boundaries.
//!
//! # Examples
//!
//! ```rust
//! use modinit::{assembly::decode_stream, Parser};
//!
//! // nop, brfalse.s +0, ret
//! let code = [0x00, 0x2C, 0x00, 0x2A];
//! let instructions = decode_stream(&mut Parser::new(&code))?;
//! assert_eq!(instructions.len(), 3);
//! assert_eq!(instructions[1].branch_targets, vec![3]);
//! # Ok::<(), modinit::Error>(())
//! ```

use crate::{
    assembly::{
        FlowType, Immediate, Instruction, Operand, OperandType, StackBehavior, INSTRUCTIONS,
        INSTRUCTIONS_FE,
    },
    file::parser::Parser,
    metadata::token::Token,
    Result,
};

/// Decode every instruction from the parser position to the end of its data.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for reserved opcodes and [`crate::Error::OutOfBounds`] for
/// an instruction that runs past the end of the code.
pub fn decode_stream(parser: &mut Parser) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(parser)?);
    }

    Ok(instructions)
}

/// Decode a single instruction at the parser position.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for reserved opcodes and [`crate::Error::OutOfBounds`] for
/// a truncated operand.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let offset = parser.pos() as u64;
    let first_byte = parser.read_le::<u8>()?;

    let (cil_instruction, prefix, opcode) = match first_byte {
        0xFE => {
            let second_byte = parser.read_le::<u8>()?;

            match INSTRUCTIONS_FE.get(second_byte as usize) {
                Some(instr) => (instr, 0xFE, second_byte),
                None => return Err(malformed_error!("Invalid opcode: FE {:02X}", second_byte)),
            }
        }
        _ => match INSTRUCTIONS.get(first_byte as usize) {
            Some(instr) => (instr, 0, first_byte),
            None => return Err(malformed_error!("Invalid opcode: {:X}", first_byte)),
        },
    };

    if cil_instruction.is_reserved() {
        return Err(malformed_error!(
            "Reserved opcode: {:02X}{:02X}",
            prefix,
            opcode
        ));
    }

    let operand = match cil_instruction.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::Int16 => Operand::Immediate(Immediate::Int16(parser.read_le::<i16>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::UInt32 => Operand::Immediate(Immediate::UInt32(parser.read_le::<u32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::UInt64 => Operand::Immediate(Immediate::UInt64(parser.read_le::<u64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()? as usize;
            if case_count.saturating_mul(4) > parser.len() - parser.pos() {
                return Err(out_of_bounds_error!());
            }

            let mut targets = Vec::with_capacity(case_count);
            for _ in 0..case_count {
                targets.push(parser.read_le::<i32>()?);
            }

            Operand::Switch(targets)
        }
    };
    let size = parser.pos() as u64 - offset;

    let mut instruction = Instruction {
        offset,
        size,
        opcode,
        prefix,
        mnemonic: cil_instruction.instr,
        flow_type: cil_instruction.flow,
        stack_behavior: StackBehavior {
            pops: cil_instruction.stack_pops,
            pushes: cil_instruction.stack_pushes,
            #[allow(clippy::cast_possible_wrap)]
            net_effect: cil_instruction.stack_pushes as i8 - cil_instruction.stack_pops as i8,
        },
        branch_targets: Vec::new(),
        operand,
    };

    let next_offset = instruction.next_offset();
    match (&instruction.flow_type, &instruction.operand) {
        (
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave,
            Operand::Immediate(value),
        ) => {
            instruction
                .branch_targets
                .push(next_offset.wrapping_add(u64::from(*value)));
        }
        (FlowType::Switch, Operand::Switch(targets)) => {
            let resolved: Vec<u64> = targets
                .iter()
                .map(|&target| next_offset.wrapping_add(u64::from(Immediate::Int32(target))))
                .collect();
            instruction.branch_targets = resolved;
        }
        _ => {}
    }

    Ok(instruction)
}
