//! CIL instruction encoding with labels and stack tracking.
//!
//! [`InstructionEncoder`] is the reverse of the decoder and uses the same opcode tables. Branches
//! reference named labels that are resolved in [`InstructionEncoder::finalize`]. While emitting,
//! the encoder tracks the evaluation stack depth, rejects underflow, and checks that every path
//! into a label arrives with the same depth. The maximum depth becomes the body's `MaxStack`.
//!
//! # Examples
//!
//! ```rust
//! use modinit::assembly::InstructionEncoder;
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_instruction("ldc.i4.1", None)?;
//! encoder.emit_branch("brfalse.s", "end")?;
//! encoder.emit_instruction("nop", None)?;
//! encoder.define_label("end")?;
//! encoder.emit_instruction("ret", None)?;
//!
//! let (code, max_stack, _labels) = encoder.finalize()?;
//! assert_eq!(code, [0x17, 0x2C, 0x01, 0x00, 0x2A]);
//! assert_eq!(max_stack, 1);
//! # Ok::<(), modinit::Error>(())
//! ```

use std::{collections::HashMap, sync::OnceLock};

use crate::{
    assembly::{
        instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FE},
        FlowType, Immediate, Operand, OperandType,
    },
    metadata::{signatures::CallEffect, token::Token},
    Error, Result,
};

static MNEMONIC_TO_OPCODE: OnceLock<HashMap<&'static str, (u8, u8, &'static CilInstruction)>> =
    OnceLock::new();

fn get_mnemonic_lookup() -> &'static HashMap<&'static str, (u8, u8, &'static CilInstruction)> {
    MNEMONIC_TO_OPCODE.get_or_init(|| {
        let mut map = HashMap::new();

        for (opcode, instr) in INSTRUCTIONS.iter().enumerate() {
            if let (false, Ok(opcode)) = (instr.is_reserved(), u8::try_from(opcode)) {
                map.insert(instr.instr, (opcode, 0, instr));
            }
        }

        for (opcode, instr) in INSTRUCTIONS_FE.iter().enumerate() {
            if let (false, Ok(opcode)) = (instr.is_reserved(), u8::try_from(opcode)) {
                map.insert(instr.instr, (opcode, 0xFE, instr));
            }
        }

        map
    })
}

/// A branch whose offset is written once its label is known.
#[derive(Debug, Clone)]
pub struct LabelFixup {
    /// The target label name
    pub label: String,
    /// Position of the offset bytes
    pub fixup_position: usize,
    /// Size of the offset (1 or 4 bytes)
    pub offset_size: u8,
}

/// Encodes instructions into a CIL code buffer.
pub struct InstructionEncoder {
    bytecode: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<LabelFixup>,
    current_stack_depth: i16,
    max_stack_depth: u16,
    /// Depth every path into a label must agree on
    label_stack_depths: HashMap<String, i16>,
    /// After ret/throw/br until the next label
    unreachable: bool,
}

impl InstructionEncoder {
    /// Create an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytecode: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            current_stack_depth: 0,
            max_stack_depth: 0,
            label_stack_depths: HashMap::new(),
            unreachable: false,
        }
    }

    fn lookup(mnemonic: &str) -> Result<(u8, u8, &'static CilInstruction)> {
        get_mnemonic_lookup()
            .get(mnemonic)
            .copied()
            .ok_or_else(|| Error::InvalidMnemonic(mnemonic.to_string()))
    }

    fn emit_opcode(&mut self, opcode: u8, prefix: u8) {
        if prefix != 0 {
            self.bytecode.push(prefix);
        }
        self.bytecode.push(opcode);
    }

    /// Emit an instruction with a fixed stack effect.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMnemonic`] for unknown mnemonics, [`Error::InvalidBody`] for a
    /// mismatching operand or for calls and branches (use [`InstructionEncoder::emit_call`] and
    /// [`InstructionEncoder::emit_branch`]), and [`Error::Malformed`] on stack underflow.
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<()> {
        let (opcode, prefix, metadata) = Self::lookup(mnemonic)?;

        match metadata.flow {
            FlowType::Call => {
                return Err(Error::InvalidBody(format!(
                    "'{mnemonic}' needs a call effect, use emit_call"
                )))
            }
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave => {
                return Err(Error::InvalidBody(format!(
                    "'{mnemonic}' needs a label, use emit_branch"
                )))
            }
            _ => {}
        }

        self.emit_opcode(opcode, prefix);
        self.emit_operand(mnemonic, operand, metadata.op_type)?;

        self.update_stack_depth(metadata.stack_pops, metadata.stack_pushes)
            .map_err(|e| malformed_error!("Stack error at instruction '{}': {}", mnemonic, e))?;

        if matches!(
            metadata.flow,
            FlowType::Return | FlowType::Throw | FlowType::EndFinally
        ) {
            self.unreachable = true;
        }

        Ok(())
    }

    /// Emit a branch to `label`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBranch`] if `mnemonic` is not a branch, or if the stack depth
    /// disagrees with an earlier path into `label`.
    pub fn emit_branch(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        let (opcode, prefix, metadata) = Self::lookup(mnemonic)?;

        if !matches!(
            metadata.flow,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        ) {
            return Err(Error::InvalidBranch(format!(
                "instruction '{mnemonic}' is not a branch instruction"
            )));
        }

        let offset_size = match metadata.op_type {
            OperandType::Int8 => 1,
            OperandType::Int32 => 4,
            _ => {
                return Err(Error::InvalidBranch(format!(
                    "'{mnemonic}' has no branch offset operand"
                )))
            }
        };

        self.emit_opcode(opcode, prefix);
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            offset_size,
        });
        self.bytecode
            .resize(self.bytecode.len() + usize::from(offset_size), 0);

        self.update_stack_depth(metadata.stack_pops, metadata.stack_pushes)
            .map_err(|e| {
                malformed_error!("Stack error at branch '{}' to '{}': {}", mnemonic, label, e)
            })?;

        if metadata.flow == FlowType::Leave {
            // leave empties the evaluation stack
            self.current_stack_depth = 0;
        }
        self.record_label_stack_depth(label)?;

        if matches!(
            metadata.flow,
            FlowType::UnconditionalBranch | FlowType::Leave
        ) {
            self.unreachable = true;
        }

        Ok(())
    }

    /// Emit `call`, `callvirt` or `newobj` with the stack effect of the target signature.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBody`] if `mnemonic` is not a call, and [`Error::Malformed`] on
    /// stack underflow.
    pub fn emit_call(&mut self, mnemonic: &str, method: Token, effect: CallEffect) -> Result<()> {
        let (opcode, prefix, metadata) = Self::lookup(mnemonic)?;
        if metadata.flow != FlowType::Call {
            return Err(Error::InvalidBody(format!(
                "'{mnemonic}' is not a call instruction"
            )));
        }

        self.emit_opcode(opcode, prefix);
        self.emit_operand(mnemonic, Some(Operand::Token(method)), metadata.op_type)?;

        let (pops, pushes) = call_stack_effect(mnemonic, effect)?;
        self.update_stack_depth(pops, pushes)
            .map_err(|e| malformed_error!("Stack error at call '{}': {}", mnemonic, e))
    }

    /// Emit the shortest form of `ldloc` for `index`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] on stack overflow of the tracked depth.
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("ldloc.0", None),
            1 => self.emit_instruction("ldloc.1", None),
            2 => self.emit_instruction("ldloc.2", None),
            3 => self.emit_instruction("ldloc.3", None),
            #[allow(clippy::cast_possible_truncation)]
            4..=255 => self.emit_instruction(
                "ldloc.s",
                Some(Operand::Immediate(Immediate::UInt8(index as u8))),
            ),
            _ => self.emit_instruction("ldloc", Some(Operand::Immediate(Immediate::UInt16(index)))),
        }
    }

    /// Emit the shortest form of `stloc` for `index`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] on stack underflow.
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("stloc.0", None),
            1 => self.emit_instruction("stloc.1", None),
            2 => self.emit_instruction("stloc.2", None),
            3 => self.emit_instruction("stloc.3", None),
            #[allow(clippy::cast_possible_truncation)]
            4..=255 => self.emit_instruction(
                "stloc.s",
                Some(Operand::Immediate(Immediate::UInt8(index as u8))),
            ),
            _ => self.emit_instruction("stloc", Some(Operand::Immediate(Immediate::UInt16(index)))),
        }
    }

    /// Define `name` at the current position.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBranch`] for a duplicate label or if the fall-through depth differs
    /// from the depth recorded by branches to it.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(Error::InvalidBranch(format!("duplicate label '{name}'")));
        }

        if let Some(&expected) = self.label_stack_depths.get(name) {
            if self.unreachable {
                self.current_stack_depth = expected;
            } else if self.current_stack_depth != expected {
                return Err(Error::InvalidBranch(format!(
                    "stack depth mismatch at label '{name}': expected {expected}, got {}",
                    self.current_stack_depth
                )));
            }
        } else if self.unreachable {
            // Only backward branches can reach this label; they record the depth
            self.current_stack_depth = 0;
        } else {
            self.label_stack_depths
                .insert(name.to_string(), self.current_stack_depth);
        }

        self.unreachable = false;

        let position = u32::try_from(self.bytecode.len())
            .map_err(|_| malformed_error!("Bytecode length exceeds u32 range"))?;
        self.labels.insert(name.to_string(), position);
        Ok(())
    }

    /// Current code length.
    #[must_use]
    pub fn current_position(&self) -> usize {
        self.bytecode.len()
    }

    /// Maximum stack depth reached so far.
    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    /// Current stack depth.
    #[must_use]
    pub fn current_stack_depth(&self) -> i16 {
        self.current_stack_depth
    }

    /// Resolve all labels and return the code, the maximum stack depth and the label offsets.
    ///
    /// # Errors
    /// Returns [`Error::UndefinedLabel`] for a branch to an undefined label and
    /// [`Error::InvalidBranch`] if a short branch cannot reach its target.
    pub fn finalize(mut self) -> Result<(Vec<u8>, u16, HashMap<String, u32>)> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let label_position = self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| Error::UndefinedLabel(fixup.label.clone()))?;

            let next_instruction = fixup.fixup_position + usize::from(fixup.offset_size);
            let offset = i64::from(*label_position) - next_instruction as i64;
            self.write_branch_offset(offset, fixup)?;
        }

        Ok((self.bytecode, self.max_stack_depth, self.labels))
    }

    fn write_branch_offset(&mut self, offset: i64, fixup: &LabelFixup) -> Result<()> {
        let position = fixup.fixup_position;
        match fixup.offset_size {
            1 => {
                let offset = i8::try_from(offset).map_err(|_| {
                    Error::InvalidBranch(format!(
                        "offset {offset} to '{}' out of range for a short branch",
                        fixup.label
                    ))
                })?;
                self.bytecode[position] = offset.to_le_bytes()[0];
            }
            _ => {
                let offset = i32::try_from(offset).map_err(|_| {
                    Error::InvalidBranch(format!("offset {offset} to '{}' too large", fixup.label))
                })?;
                self.bytecode[position..position + 4].copy_from_slice(&offset.to_le_bytes());
            }
        }
        Ok(())
    }

    fn emit_operand(
        &mut self,
        mnemonic: &str,
        operand: Option<Operand>,
        expected: OperandType,
    ) -> Result<()> {
        match (expected, operand) {
            (OperandType::None, None) => {}
            (OperandType::Int8, Some(Operand::Immediate(Immediate::Int8(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::UInt8, Some(Operand::Immediate(Immediate::UInt8(val)))) => {
                self.bytecode.push(val);
            }
            (OperandType::Int16, Some(Operand::Immediate(Immediate::Int16(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::UInt16, Some(Operand::Immediate(Immediate::UInt16(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Int32, Some(Operand::Immediate(Immediate::Int32(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::UInt32, Some(Operand::Immediate(Immediate::UInt32(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Int64, Some(Operand::Immediate(Immediate::Int64(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::UInt64, Some(Operand::Immediate(Immediate::UInt64(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Float32, Some(Operand::Immediate(Immediate::Float32(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Float64, Some(Operand::Immediate(Immediate::Float64(val)))) => {
                self.bytecode.extend_from_slice(&val.to_le_bytes());
            }
            (OperandType::Token, Some(Operand::Token(token))) => {
                self.bytecode.extend_from_slice(&token.value().to_le_bytes());
            }
            (expected, operand) => {
                return Err(Error::InvalidBody(format!(
                    "'{mnemonic}' expects a {expected:?} operand, got {operand:?}"
                )))
            }
        }
        Ok(())
    }

    fn update_stack_depth(&mut self, pops: u8, pushes: u8) -> Result<()> {
        self.current_stack_depth += i16::from(pushes) - i16::from(pops);

        if self.current_stack_depth < 0 {
            if !self.unreachable {
                return Err(malformed_error!(
                    "Stack underflow: depth became {} after {} pops, {} pushes",
                    self.current_stack_depth,
                    pops,
                    pushes
                ));
            }
            self.current_stack_depth = 0;
        }

        let current_depth = u16::try_from(self.current_stack_depth)
            .map_err(|_| malformed_error!("Stack depth exceeds u16 range"))?;
        self.max_stack_depth = self.max_stack_depth.max(current_depth);
        Ok(())
    }

    fn record_label_stack_depth(&mut self, label: &str) -> Result<()> {
        if self.unreachable {
            return Ok(());
        }

        match self.label_stack_depths.get(label) {
            Some(&expected) if expected != self.current_stack_depth => {
                Err(Error::InvalidBranch(format!(
                    "stack depth mismatch for branch to '{label}': expected {expected}, got {}",
                    self.current_stack_depth
                )))
            }
            Some(_) => Ok(()),
            None => {
                self.label_stack_depths
                    .insert(label.to_string(), self.current_stack_depth);
                Ok(())
            }
        }
    }
}

impl Default for InstructionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pops and pushes of a call instruction. `newobj` consumes the constructor arguments but not
/// `this`, and pushes the new object.
///
/// # Errors
/// Returns [`Error::InvalidBody`] for counts that do not fit the stack model.
pub fn call_stack_effect(mnemonic: &str, effect: CallEffect) -> Result<(u8, u8)> {
    let too_many = || Error::InvalidBody(format!("'{mnemonic}' has too many arguments"));
    if mnemonic == "newobj" {
        let args = effect.params.saturating_sub(usize::from(effect.has_this));
        Ok((u8::try_from(args).map_err(|_| too_many())?, 1))
    } else {
        let pops = u8::try_from(effect.params).map_err(|_| too_many())?;
        Ok((pops, u8::from(effect.returns_value)))
    }
}
