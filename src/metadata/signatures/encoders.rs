//! Signature blob encoders.
//!
//! The inverse of [`crate::metadata::signatures::SignatureParser`]: each function appends the
//! II.23.2 encoding of a signature model to a byte buffer. The injector uses these to build the
//! `MemberRef` signatures and the `LocalVarSig` of the synthesized initializer.

use crate::{
    file::io::push_compressed_uint,
    metadata::{
        signatures::{
            CustomModifier, SignatureLocalVariables, SignatureMethod, SignatureParameter, TypeSignature,
            CALLING_CONVENTION, ELEMENT_TYPE, SIGNATURE_HEADER,
        },
        tables::{CodedIndexType, TableId},
        token::Token,
    },
    Result,
};

/// Encode a `TypeDef`, `TypeRef` or `TypeSpec` token as a compressed `TypeDefOrRefOrSpecEncoded`
/// value (II.23.2.8).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for tokens of any other table or rows too large to encode.
pub fn encode_type_def_or_ref(token: Token) -> Result<u32> {
    let table = token
        .table_id()
        .filter(|table| {
            matches!(table, TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec)
        })
        .ok_or_else(|| malformed_error!("Token {} is not a TypeDefOrRef", token))?;

    match CodedIndexType::TypeDefOrRef.encode(table, token.row()) {
        Some(value) if token.row() <= 0x07FF_FFFF => Ok(value),
        _ => Err(malformed_error!(
            "Token {} is too large for a signature",
            token
        )),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn push_compressed_int(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    #[allow(clippy::cast_sign_loss)]
    let bits = value as u32;
    match value {
        -0x40..=0x3F => buffer.push((((bits & 0x3F) << 1) | ((bits >> 6) & 1)) as u8),
        -0x2000..=0x1FFF => {
            let rotated = ((bits & 0x1FFF) << 1) | ((bits >> 13) & 1);
            buffer.push(0x80 | (rotated >> 8) as u8);
            buffer.push(rotated as u8);
        }
        -0x1000_0000..=0x0FFF_FFFF => {
            let rotated = ((bits & 0x0FFF_FFFF) << 1) | ((bits >> 28) & 1);
            buffer.push(0xC0 | (rotated >> 24) as u8);
            buffer.push((rotated >> 16) as u8);
            buffer.push((rotated >> 8) as u8);
            buffer.push(rotated as u8);
        }
        _ => return Err(malformed_error!("Value {} is too large to compress", value)),
    }
    Ok(())
}

/// Append the encoding of `sig` to `buffer`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a token or count cannot be encoded.
pub fn encode_type_signature(sig: &TypeSignature, buffer: &mut Vec<u8>) -> Result<()> {
    match sig {
        TypeSignature::Void => buffer.push(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => buffer.push(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => buffer.push(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => buffer.push(ELEMENT_TYPE::I1),
        TypeSignature::U1 => buffer.push(ELEMENT_TYPE::U1),
        TypeSignature::I2 => buffer.push(ELEMENT_TYPE::I2),
        TypeSignature::U2 => buffer.push(ELEMENT_TYPE::U2),
        TypeSignature::I4 => buffer.push(ELEMENT_TYPE::I4),
        TypeSignature::U4 => buffer.push(ELEMENT_TYPE::U4),
        TypeSignature::I8 => buffer.push(ELEMENT_TYPE::I8),
        TypeSignature::U8 => buffer.push(ELEMENT_TYPE::U8),
        TypeSignature::R4 => buffer.push(ELEMENT_TYPE::R4),
        TypeSignature::R8 => buffer.push(ELEMENT_TYPE::R8),
        TypeSignature::I => buffer.push(ELEMENT_TYPE::I),
        TypeSignature::U => buffer.push(ELEMENT_TYPE::U),
        TypeSignature::String => buffer.push(ELEMENT_TYPE::STRING),
        TypeSignature::Object => buffer.push(ELEMENT_TYPE::OBJECT),
        TypeSignature::TypedByRef => buffer.push(ELEMENT_TYPE::TYPEDBYREF),
        TypeSignature::Class(token) => {
            buffer.push(ELEMENT_TYPE::CLASS);
            push_compressed_uint(buffer, encode_type_def_or_ref(*token)?)?;
        }
        TypeSignature::ValueType(token) => {
            buffer.push(ELEMENT_TYPE::VALUETYPE);
            push_compressed_uint(buffer, encode_type_def_or_ref(*token)?)?;
        }
        TypeSignature::Ptr(inner) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_type_signature(inner, buffer)?;
        }
        TypeSignature::SzArray(inner) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_type_signature(inner, buffer)?;
        }
        TypeSignature::Array {
            element,
            rank,
            sizes,
            lower_bounds,
        } => {
            buffer.push(ELEMENT_TYPE::ARRAY);
            encode_type_signature(element, buffer)?;
            push_compressed_uint(buffer, *rank)?;
            push_compressed_uint(buffer, count(sizes.len())?)?;
            for size in sizes {
                push_compressed_uint(buffer, *size)?;
            }
            push_compressed_uint(buffer, count(lower_bounds.len())?)?;
            for bound in lower_bounds {
                push_compressed_int(buffer, *bound)?;
            }
        }
        TypeSignature::GenericInst(base, args) => {
            buffer.push(ELEMENT_TYPE::GENERICINST);
            encode_type_signature(base, buffer)?;
            push_compressed_uint(buffer, count(args.len())?)?;
            for arg in args {
                encode_type_signature(arg, buffer)?;
            }
        }
        TypeSignature::GenericParamType(index) => {
            buffer.push(ELEMENT_TYPE::VAR);
            push_compressed_uint(buffer, *index)?;
        }
        TypeSignature::GenericParamMethod(index) => {
            buffer.push(ELEMENT_TYPE::MVAR);
            push_compressed_uint(buffer, *index)?;
        }
        TypeSignature::FnPtr(method) => {
            buffer.push(ELEMENT_TYPE::FNPTR);
            encode_method_signature_into(method, buffer)?;
        }
    }
    Ok(())
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| malformed_error!("Signature count {} is too large", len))
}

fn encode_custom_mods(modifiers: &[CustomModifier], buffer: &mut Vec<u8>) -> Result<()> {
    for modifier in modifiers {
        buffer.push(if modifier.is_required {
            ELEMENT_TYPE::CMOD_REQD
        } else {
            ELEMENT_TYPE::CMOD_OPT
        });
        push_compressed_uint(buffer, encode_type_def_or_ref(modifier.modifier_type)?)?;
    }
    Ok(())
}

fn encode_param(param: &SignatureParameter, buffer: &mut Vec<u8>) -> Result<()> {
    encode_custom_mods(&param.modifiers, buffer)?;
    if param.by_ref {
        buffer.push(ELEMENT_TYPE::BYREF);
    }
    encode_type_signature(&param.base, buffer)
}

fn encode_method_signature_into(sig: &SignatureMethod, buffer: &mut Vec<u8>) -> Result<()> {
    let mut convention = sig.calling_convention & CALLING_CONVENTION::KIND_MASK;
    if sig.has_this {
        convention |= CALLING_CONVENTION::HASTHIS;
    }
    if sig.explicit_this {
        convention |= CALLING_CONVENTION::EXPLICITTHIS;
    }
    if sig.param_count_generic > 0 {
        convention |= CALLING_CONVENTION::GENERIC;
    }
    buffer.push(convention);

    if sig.param_count_generic > 0 {
        push_compressed_uint(buffer, sig.param_count_generic)?;
    }

    push_compressed_uint(buffer, count(sig.params.len() + sig.varargs.len())?)?;
    encode_param(&sig.return_type, buffer)?;
    for param in &sig.params {
        encode_param(param, buffer)?;
    }
    if !sig.varargs.is_empty() {
        buffer.push(ELEMENT_TYPE::SENTINEL);
        for param in &sig.varargs {
            encode_param(param, buffer)?;
        }
    }
    Ok(())
}

/// Encode a method signature blob.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a token or count cannot be encoded.
pub fn encode_method_signature(sig: &SignatureMethod) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_method_signature_into(sig, &mut buffer)?;
    Ok(buffer)
}

/// Encode a `LocalVarSig` blob.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a token or count cannot be encoded.
pub fn encode_local_var_signature(sig: &SignatureLocalVariables) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::LOCAL_SIG];
    push_compressed_uint(&mut buffer, count(sig.locals.len())?)?;

    for local in &sig.locals {
        encode_custom_mods(&local.modifiers, &mut buffer)?;
        if local.is_pinned {
            buffer.push(ELEMENT_TYPE::PINNED);
        }
        if local.is_byref {
            buffer.push(ELEMENT_TYPE::BYREF);
        }
        encode_type_signature(&local.base, &mut buffer)?;
    }
    Ok(buffer)
}
