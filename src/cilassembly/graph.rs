//! The mutable metadata graph the initializer is written against.
//!
//! [`MetadataGraph`] is the narrow view of an image that injecting a method needs: find the
//! module type and its methods, obtain references to framework types and members, intern user
//! strings, and append a method definition. [`crate::CilAssembly`] implements it over a real
//! image; tests implement it over plain vectors.

use crate::{
    metadata::{
        signatures::{CallEffect, SignatureLocalVariables, SignatureMethod},
        token::Token,
    },
    Result,
};

/// A method already present on a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    /// `MethodDef` token
    pub token: Token,
    /// Name as stored in `#Strings`
    pub name: String,
    /// `MethodAttributes`
    pub flags: u16,
}

/// An encoded method body ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Encoded CIL
    pub code: Vec<u8>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Local variables, indexed by position
    pub locals: SignatureLocalVariables,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
}

/// A method to be added to a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    /// Method name
    pub name: String,
    /// `MethodAttributes`
    pub flags: u16,
    /// `MethodImplAttributes`
    pub impl_flags: u16,
    /// Signature, including the return type
    pub signature: SignatureMethod,
    /// IL body
    pub body: MethodBody,
}

/// Mutable access to the type/method metadata of one module.
///
/// Reference lookups resolve against the module's own tables and append rows that are missing,
/// so repeated calls with the same arguments return the same token.
pub trait MetadataGraph {
    /// `TypeDef` token of `<Module>`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleTypeNotFound`] if the module has no such type.
    fn module_type(&self) -> Result<Token>;

    /// Methods declared by the type `owner`, in table order.
    ///
    /// # Errors
    /// Returns an error if `owner` is not a `TypeDef` of this module or a name cannot be read.
    fn methods(&self, owner: Token) -> Result<Vec<MethodSummary>>;

    /// Reference to the framework type `namespace.name` in the core library.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingCoreLibrary`] if the core library scope cannot be found.
    fn type_reference(&mut self, namespace: &str, name: &str) -> Result<Token>;

    /// Reference to the method `name` with `signature` on the type `parent`.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded or the reference cannot be stored.
    fn method_reference(
        &mut self,
        parent: Token,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Token>;

    /// `ldstr` token for `value`.
    ///
    /// # Errors
    /// Returns an error if the user string heap is full.
    fn user_string(&mut self, value: &str) -> Result<Token>;

    /// Stack effect of calling `method` (a `MethodDef`, `MemberRef`, `MethodSpec` or, for
    /// `calli`, a `StandAloneSig`).
    ///
    /// # Errors
    /// Returns an error if the token cannot be resolved or its signature is malformed.
    fn call_effect(&self, method: Token) -> Result<CallEffect>;

    /// Append `method` to the method list of `owner` and return its token.
    ///
    /// # Errors
    /// Returns an error if `owner` is unknown or the method cannot be stored.
    fn add_method(&mut self, owner: Token, method: MethodDefinition) -> Result<Token>;
}
