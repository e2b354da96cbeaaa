//! Method and local variable signatures (II.23.2).
//!
//! Signatures are the compact blobs describing method parameters, return types and local
//! variable types. The rewriter needs them in both directions: parsing the signature of every
//! `call`/`callvirt` target to track the evaluation stack, and encoding the `MemberRef` and
//! `LocalVarSig` blobs of the synthesized initializer.
//!
//! # Examples
//!
//! ```rust
//! use modinit::metadata::signatures::parse_method_signature;
//!
//! // instance string M(int32)
//! let sig = parse_method_signature(&[0x20, 0x01, 0x0E, 0x08])?;
//! let effect = sig.call_effect();
//! assert_eq!(effect.params, 2);
//! assert!(effect.returns_value);
//! # Ok::<(), modinit::Error>(())
//! ```

mod encoders;
mod parser;
mod types;

pub use encoders::*;
pub use parser::*;
pub use types::*;

use crate::Result;

/// Parse a method signature blob.
///
/// # Errors
/// Returns an error if the signature data is malformed or truncated.
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_signature()
}

/// Parse a `LocalVarSig` blob.
///
/// # Errors
/// Returns an error if the signature data is malformed or truncated.
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    let mut parser = SignatureParser::new(data);
    parser.parse_local_var_signature()
}
