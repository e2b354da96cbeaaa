//! # modinit Prelude
//!
//! The types needed to load an assembly, inject an initializer and write the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all modinit operations
pub use crate::{Error, ErrorKind};

/// The result type used throughout modinit
pub use crate::Result;

// ================================================================================================
// Pipeline
// ================================================================================================

/// One-call injection
pub use crate::{inject_file, inject_mem, InjectOptions, InjectionReport, SymbolPolicy};

// ================================================================================================
// Images and Metadata
// ================================================================================================

/// The mutable image and the graph view the initializer works on
pub use crate::cilassembly::{
    CilAssembly, MetadataGraph, MethodBody, MethodDefinition, MethodSummary,
};

/// Low-level file access
pub use crate::file::{parser::Parser, File};

/// Metadata tokens and table identifiers
pub use crate::metadata::{tables::TableId, token::Token};

/// Signature types used by method definitions and references
pub use crate::metadata::signatures::{
    SignatureLocalVariable, SignatureLocalVariables, SignatureMethod, TypeSignature,
};

// ================================================================================================
// Instructions
// ================================================================================================

/// Encoding, decoding and verification of CIL
pub use crate::assembly::{decode_stream, verify_body, Instruction, InstructionEncoder, Operand};
