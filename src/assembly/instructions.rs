//! Opcode tables (ECMA-335 Partition III).
//!
//! Reserved slots have an empty mnemonic. Calls, `newobj` and `ret` carry no fixed stack effect;
//! their pops and pushes are derived from the target signature.

use crate::assembly::{FlowType, OperandType};

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction {
    /// Operand encoding
    pub op_type: OperandType,
    /// Mnemonic, empty for reserved opcodes
    pub instr: &'static str,
    /// Control flow behavior
    pub flow: FlowType,
    /// Fixed number of popped values
    pub stack_pops: u8,
    /// Fixed number of pushed values
    pub stack_pushes: u8,
}

impl CilInstruction {
    /// True for unassigned opcodes.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.instr.is_empty()
    }
}

const RESERVED: CilInstruction = op("", OperandType::None, FlowType::Sequential, 0, 0);

const fn op(
    instr: &'static str,
    op_type: OperandType,
    flow: FlowType,
    stack_pops: u8,
    stack_pushes: u8,
) -> CilInstruction {
    CilInstruction {
        op_type,
        instr,
        flow,
        stack_pops,
        stack_pushes,
    }
}

/// One-byte opcodes, indexed by opcode
#[rustfmt::skip]
pub static INSTRUCTIONS: [CilInstruction; 256] = {
    let mut table = [RESERVED; 256];
    table[0x00] = op("nop", OperandType::None, FlowType::Sequential, 0, 0);
    table[0x01] = op("break", OperandType::None, FlowType::Sequential, 0, 0);
    table[0x02] = op("ldarg.0", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x03] = op("ldarg.1", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x04] = op("ldarg.2", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x05] = op("ldarg.3", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x06] = op("ldloc.0", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x07] = op("ldloc.1", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x08] = op("ldloc.2", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x09] = op("ldloc.3", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x0A] = op("stloc.0", OperandType::None, FlowType::Sequential, 1, 0);
    table[0x0B] = op("stloc.1", OperandType::None, FlowType::Sequential, 1, 0);
    table[0x0C] = op("stloc.2", OperandType::None, FlowType::Sequential, 1, 0);
    table[0x0D] = op("stloc.3", OperandType::None, FlowType::Sequential, 1, 0);
    table[0x0E] = op("ldarg.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    table[0x0F] = op("ldarga.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    table[0x10] = op("starg.s", OperandType::UInt8, FlowType::Sequential, 1, 0);
    table[0x11] = op("ldloc.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    table[0x12] = op("ldloca.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    table[0x13] = op("stloc.s", OperandType::UInt8, FlowType::Sequential, 1, 0);
    table[0x14] = op("ldnull", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x15] = op("ldc.i4.m1", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x16] = op("ldc.i4.0", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x17] = op("ldc.i4.1", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x18] = op("ldc.i4.2", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x19] = op("ldc.i4.3", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x1A] = op("ldc.i4.4", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x1B] = op("ldc.i4.5", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x1C] = op("ldc.i4.6", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x1D] = op("ldc.i4.7", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x1E] = op("ldc.i4.8", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x1F] = op("ldc.i4.s", OperandType::Int8, FlowType::Sequential, 0, 1);
    table[0x20] = op("ldc.i4", OperandType::Int32, FlowType::Sequential, 0, 1);
    table[0x21] = op("ldc.i8", OperandType::Int64, FlowType::Sequential, 0, 1);
    table[0x22] = op("ldc.r4", OperandType::Float32, FlowType::Sequential, 0, 1);
    table[0x23] = op("ldc.r8", OperandType::Float64, FlowType::Sequential, 0, 1);
    table[0x25] = op("dup", OperandType::None, FlowType::Sequential, 1, 2);
    table[0x26] = op("pop", OperandType::None, FlowType::Sequential, 1, 0);
    table[0x27] = op("jmp", OperandType::Token, FlowType::Return, 0, 0);
    table[0x28] = op("call", OperandType::Token, FlowType::Call, 0, 0);
    table[0x29] = op("calli", OperandType::Token, FlowType::Call, 0, 0);
    table[0x2A] = op("ret", OperandType::None, FlowType::Return, 0, 0);
    table[0x2B] = op("br.s", OperandType::Int8, FlowType::UnconditionalBranch, 0, 0);
    table[0x2C] = op("brfalse.s", OperandType::Int8, FlowType::ConditionalBranch, 1, 0);
    table[0x2D] = op("brtrue.s", OperandType::Int8, FlowType::ConditionalBranch, 1, 0);
    table[0x2E] = op("beq.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x2F] = op("bge.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x30] = op("bgt.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x31] = op("ble.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x32] = op("blt.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x33] = op("bne.un.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x34] = op("bge.un.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x35] = op("bgt.un.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x36] = op("ble.un.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x37] = op("blt.un.s", OperandType::Int8, FlowType::ConditionalBranch, 2, 0);
    table[0x38] = op("br", OperandType::Int32, FlowType::UnconditionalBranch, 0, 0);
    table[0x39] = op("brfalse", OperandType::Int32, FlowType::ConditionalBranch, 1, 0);
    table[0x3A] = op("brtrue", OperandType::Int32, FlowType::ConditionalBranch, 1, 0);
    table[0x3B] = op("beq", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x3C] = op("bge", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x3D] = op("bgt", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x3E] = op("ble", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x3F] = op("blt", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x40] = op("bne.un", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x41] = op("bge.un", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x42] = op("bgt.un", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x43] = op("ble.un", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x44] = op("blt.un", OperandType::Int32, FlowType::ConditionalBranch, 2, 0);
    table[0x45] = op("switch", OperandType::Switch, FlowType::Switch, 1, 0);
    table[0x46] = op("ldind.i1", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x47] = op("ldind.u1", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x48] = op("ldind.i2", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x49] = op("ldind.u2", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x4A] = op("ldind.i4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x4B] = op("ldind.u4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x4C] = op("ldind.i8", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x4D] = op("ldind.i", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x4E] = op("ldind.r4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x4F] = op("ldind.r8", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x50] = op("ldind.ref", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x51] = op("stind.ref", OperandType::None, FlowType::Sequential, 2, 0);
    table[0x52] = op("stind.i1", OperandType::None, FlowType::Sequential, 2, 0);
    table[0x53] = op("stind.i2", OperandType::None, FlowType::Sequential, 2, 0);
    table[0x54] = op("stind.i4", OperandType::None, FlowType::Sequential, 2, 0);
    table[0x55] = op("stind.i8", OperandType::None, FlowType::Sequential, 2, 0);
    table[0x56] = op("stind.r4", OperandType::None, FlowType::Sequential, 2, 0);
    table[0x57] = op("stind.r8", OperandType::None, FlowType::Sequential, 2, 0);
    table[0x58] = op("add", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x59] = op("sub", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x5A] = op("mul", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x5B] = op("div", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x5C] = op("div.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x5D] = op("rem", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x5E] = op("rem.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x5F] = op("and", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x60] = op("or", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x61] = op("xor", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x62] = op("shl", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x63] = op("shr", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x64] = op("shr.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x65] = op("neg", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x66] = op("not", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x67] = op("conv.i1", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x68] = op("conv.i2", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x69] = op("conv.i4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x6A] = op("conv.i8", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x6B] = op("conv.r4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x6C] = op("conv.r8", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x6D] = op("conv.u4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x6E] = op("conv.u8", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x6F] = op("callvirt", OperandType::Token, FlowType::Call, 0, 0);
    table[0x70] = op("cpobj", OperandType::Token, FlowType::Sequential, 2, 0);
    table[0x71] = op("ldobj", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x72] = op("ldstr", OperandType::Token, FlowType::Sequential, 0, 1);
    table[0x73] = op("newobj", OperandType::Token, FlowType::Call, 0, 0);
    table[0x74] = op("castclass", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x75] = op("isinst", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x76] = op("conv.r.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x79] = op("unbox", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x7A] = op("throw", OperandType::None, FlowType::Throw, 1, 0);
    table[0x7B] = op("ldfld", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x7C] = op("ldflda", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x7D] = op("stfld", OperandType::Token, FlowType::Sequential, 2, 0);
    table[0x7E] = op("ldsfld", OperandType::Token, FlowType::Sequential, 0, 1);
    table[0x7F] = op("ldsflda", OperandType::Token, FlowType::Sequential, 0, 1);
    table[0x80] = op("stsfld", OperandType::Token, FlowType::Sequential, 1, 0);
    table[0x81] = op("stobj", OperandType::Token, FlowType::Sequential, 2, 0);
    table[0x82] = op("conv.ovf.i1.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x83] = op("conv.ovf.i2.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x84] = op("conv.ovf.i4.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x85] = op("conv.ovf.i8.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x86] = op("conv.ovf.u1.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x87] = op("conv.ovf.u2.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x88] = op("conv.ovf.u4.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x89] = op("conv.ovf.u8.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x8A] = op("conv.ovf.i.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x8B] = op("conv.ovf.u.un", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x8C] = op("box", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x8D] = op("newarr", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x8E] = op("ldlen", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x8F] = op("ldelema", OperandType::Token, FlowType::Sequential, 2, 1);
    table[0x90] = op("ldelem.i1", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x91] = op("ldelem.u1", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x92] = op("ldelem.i2", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x93] = op("ldelem.u2", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x94] = op("ldelem.i4", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x95] = op("ldelem.u4", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x96] = op("ldelem.i8", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x97] = op("ldelem.i", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x98] = op("ldelem.r4", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x99] = op("ldelem.r8", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x9A] = op("ldelem.ref", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x9B] = op("stelem.i", OperandType::None, FlowType::Sequential, 3, 0);
    table[0x9C] = op("stelem.i1", OperandType::None, FlowType::Sequential, 3, 0);
    table[0x9D] = op("stelem.i2", OperandType::None, FlowType::Sequential, 3, 0);
    table[0x9E] = op("stelem.i4", OperandType::None, FlowType::Sequential, 3, 0);
    table[0x9F] = op("stelem.i8", OperandType::None, FlowType::Sequential, 3, 0);
    table[0xA0] = op("stelem.r4", OperandType::None, FlowType::Sequential, 3, 0);
    table[0xA1] = op("stelem.r8", OperandType::None, FlowType::Sequential, 3, 0);
    table[0xA2] = op("stelem.ref", OperandType::None, FlowType::Sequential, 3, 0);
    table[0xA3] = op("ldelem", OperandType::Token, FlowType::Sequential, 2, 1);
    table[0xA4] = op("stelem", OperandType::Token, FlowType::Sequential, 3, 0);
    table[0xA5] = op("unbox.any", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0xB3] = op("conv.ovf.i1", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xB4] = op("conv.ovf.u1", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xB5] = op("conv.ovf.i2", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xB6] = op("conv.ovf.u2", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xB7] = op("conv.ovf.i4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xB8] = op("conv.ovf.u4", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xB9] = op("conv.ovf.i8", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xBA] = op("conv.ovf.u8", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xC2] = op("refanyval", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0xC3] = op("ckfinite", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xC6] = op("mkrefany", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0xD0] = op("ldtoken", OperandType::Token, FlowType::Sequential, 0, 1);
    table[0xD1] = op("conv.u2", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xD2] = op("conv.u1", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xD3] = op("conv.i", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xD4] = op("conv.ovf.i", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xD5] = op("conv.ovf.u", OperandType::None, FlowType::Sequential, 1, 1);
    table[0xD6] = op("add.ovf", OperandType::None, FlowType::Sequential, 2, 1);
    table[0xD7] = op("add.ovf.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0xD8] = op("mul.ovf", OperandType::None, FlowType::Sequential, 2, 1);
    table[0xD9] = op("mul.ovf.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0xDA] = op("sub.ovf", OperandType::None, FlowType::Sequential, 2, 1);
    table[0xDB] = op("sub.ovf.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0xDC] = op("endfinally", OperandType::None, FlowType::EndFinally, 0, 0);
    table[0xDD] = op("leave", OperandType::Int32, FlowType::Leave, 0, 0);
    table[0xDE] = op("leave.s", OperandType::Int8, FlowType::Leave, 0, 0);
    table[0xDF] = op("stind.i", OperandType::None, FlowType::Sequential, 2, 0);
    table[0xE0] = op("conv.u", OperandType::None, FlowType::Sequential, 1, 1);
    table
};

/// Opcodes following the `0xFE` prefix, indexed by the second byte
#[rustfmt::skip]
pub static INSTRUCTIONS_FE: [CilInstruction; 31] = {
    let mut table = [RESERVED; 31];
    table[0x00] = op("arglist", OperandType::None, FlowType::Sequential, 0, 1);
    table[0x01] = op("ceq", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x02] = op("cgt", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x03] = op("cgt.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x04] = op("clt", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x05] = op("clt.un", OperandType::None, FlowType::Sequential, 2, 1);
    table[0x06] = op("ldftn", OperandType::Token, FlowType::Sequential, 0, 1);
    table[0x07] = op("ldvirtftn", OperandType::Token, FlowType::Sequential, 1, 1);
    table[0x09] = op("ldarg", OperandType::UInt16, FlowType::Sequential, 0, 1);
    table[0x0A] = op("ldarga", OperandType::UInt16, FlowType::Sequential, 0, 1);
    table[0x0B] = op("starg", OperandType::UInt16, FlowType::Sequential, 1, 0);
    table[0x0C] = op("ldloc", OperandType::UInt16, FlowType::Sequential, 0, 1);
    table[0x0D] = op("ldloca", OperandType::UInt16, FlowType::Sequential, 0, 1);
    table[0x0E] = op("stloc", OperandType::UInt16, FlowType::Sequential, 1, 0);
    table[0x0F] = op("localloc", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x11] = op("endfilter", OperandType::None, FlowType::EndFinally, 1, 0);
    table[0x12] = op("unaligned.", OperandType::UInt8, FlowType::Sequential, 0, 0);
    table[0x13] = op("volatile.", OperandType::None, FlowType::Sequential, 0, 0);
    table[0x14] = op("tail.", OperandType::None, FlowType::Sequential, 0, 0);
    table[0x15] = op("initobj", OperandType::Token, FlowType::Sequential, 1, 0);
    table[0x16] = op("constrained.", OperandType::Token, FlowType::Sequential, 0, 0);
    table[0x17] = op("cpblk", OperandType::None, FlowType::Sequential, 3, 0);
    table[0x18] = op("initblk", OperandType::None, FlowType::Sequential, 3, 0);
    table[0x19] = op("no.", OperandType::UInt8, FlowType::Sequential, 0, 0);
    table[0x1A] = op("rethrow", OperandType::None, FlowType::Throw, 0, 0);
    table[0x1C] = op("sizeof", OperandType::Token, FlowType::Sequential, 0, 1);
    table[0x1D] = op("refanytype", OperandType::None, FlowType::Sequential, 1, 1);
    table[0x1E] = op("readonly.", OperandType::None, FlowType::Sequential, 0, 0);
    table
};
