//! Signature model.

use crate::metadata::token::Token;

#[allow(non_snake_case, dead_code, missing_docs)]
/// Bytes that encode element types in a signature (II.23.1.16)
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    pub const PTR: u8 = 0x0f;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1b;
    pub const OBJECT: u8 = 0x1c;
    pub const SZARRAY: u8 = 0x1d;
    pub const MVAR: u8 = 0x1e;
    pub const CMOD_REQD: u8 = 0x1f;
    pub const CMOD_OPT: u8 = 0x20;
    pub const INTERNAL: u8 = 0x21;
    pub const MODIFIER: u8 = 0x40;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Calling convention byte of a method signature (II.23.2.1)
pub mod CALLING_CONVENTION {
    pub const DEFAULT: u8 = 0x00;
    pub const C: u8 = 0x01;
    pub const STDCALL: u8 = 0x02;
    pub const THISCALL: u8 = 0x03;
    pub const FASTCALL: u8 = 0x04;
    pub const VARARG: u8 = 0x05;
    pub const GENERIC: u8 = 0x10;
    pub const HASTHIS: u8 = 0x20;
    pub const EXPLICITTHIS: u8 = 0x40;
    pub const KIND_MASK: u8 = 0x0F;
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Leading byte of non-method signatures
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERICINST: u8 = 0x0A;
}

/// A `CMOD_REQD` or `CMOD_OPT` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomModifier {
    /// `modreq`, otherwise `modopt`
    pub is_required: bool,
    /// Modifier type
    pub modifier_type: Token,
}

/// A type in a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSignature {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `nint`
    I,
    /// `nuint`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// `TypedReference`
    TypedByRef,
    /// Reference type by TypeDef/TypeRef/TypeSpec token
    Class(Token),
    /// Value type by TypeDef/TypeRef/TypeSpec token
    ValueType(Token),
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Single-dimensional zero-based array
    SzArray(Box<TypeSignature>),
    /// General array
    Array {
        /// Element type
        element: Box<TypeSignature>,
        /// Number of dimensions
        rank: u32,
        /// Sizes of the leading dimensions
        sizes: Vec<u32>,
        /// Lower bounds of the leading dimensions
        lower_bounds: Vec<i32>,
    },
    /// Instantiated generic type
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Generic parameter of the enclosing type
    GenericParamType(u32),
    /// Generic parameter of the method
    GenericParamMethod(u32),
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
}

/// A parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameter {
    /// Custom modifiers
    pub modifiers: Vec<CustomModifier>,
    /// Passed by reference
    pub by_ref: bool,
    /// The type
    pub base: TypeSignature,
}

impl SignatureParameter {
    /// Plain parameter of type `base`.
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureParameter {
            modifiers: Vec::new(),
            by_ref: false,
            base,
        }
    }
}

/// A method signature (`MethodDefSig`, `MethodRefSig`, `StandAloneMethodSig`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMethod {
    /// Instance method
    pub has_this: bool,
    /// `this` is the first explicit parameter
    pub explicit_this: bool,
    /// Calling convention kind, the low 4 bits
    pub calling_convention: u8,
    /// Number of generic parameters
    pub param_count_generic: u32,
    /// Return type
    pub return_type: SignatureParameter,
    /// Fixed parameters
    pub params: Vec<SignatureParameter>,
    /// Parameters after the `SENTINEL` of a vararg call site
    pub varargs: Vec<SignatureParameter>,
}

impl SignatureMethod {
    /// Non-generic method with the default calling convention.
    #[must_use]
    pub fn new(has_this: bool, return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this,
            explicit_this: false,
            calling_convention: CALLING_CONVENTION::DEFAULT,
            param_count_generic: 0,
            return_type: SignatureParameter::new(return_type),
            params: params.into_iter().map(SignatureParameter::new).collect(),
            varargs: Vec::new(),
        }
    }

    /// Stack effect of calling a method with this signature.
    #[must_use]
    pub fn call_effect(&self) -> CallEffect {
        let implicit_this = usize::from(self.has_this && !self.explicit_this);
        CallEffect {
            has_this: self.has_this,
            params: self.params.len() + self.varargs.len() + implicit_this,
            returns_value: self.return_type.base != TypeSignature::Void
                || self.return_type.by_ref,
        }
    }
}

/// Evaluation stack effect of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEffect {
    /// Instance call
    pub has_this: bool,
    /// Values popped, including `this` for instance calls
    pub params: usize,
    /// A return value is pushed
    pub returns_value: bool,
}

/// One local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureLocalVariable {
    /// Custom modifiers
    pub modifiers: Vec<CustomModifier>,
    /// Pinned local
    pub is_pinned: bool,
    /// By-reference local
    pub is_byref: bool,
    /// The type
    pub base: TypeSignature,
}

impl SignatureLocalVariable {
    /// Plain local of type `base`.
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureLocalVariable {
            modifiers: Vec::new(),
            is_pinned: false,
            is_byref: false,
            base,
        }
    }
}

/// `LocalVarSig`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureLocalVariables {
    /// Locals in slot order
    pub locals: Vec<SignatureLocalVariable>,
}
