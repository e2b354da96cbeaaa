//! Lookup-or-append of type and member references.
//!
//! References are always resolved against the image's own `TypeRef`/`MemberRef`/`AssemblyRef`
//! tables. An existing row is reused when it matches exactly; otherwise a row is appended.
//! Appending to these tables never moves existing rows, so no remapping is needed.

use crate::{
    cilassembly::streams::MetadataStreams,
    metadata::{
        signatures::{encode_local_var_signature, encode_method_signature, SignatureLocalVariables, SignatureMethod},
        tables::{columns, CodedIndexType, TableId},
        token::Token,
    },
    Error, Result,
};

/// Assembly names that can serve as the core library, in order of preference.
pub const CORE_LIBRARY_NAMES: [&str; 4] = [
    "System.Runtime",
    "mscorlib",
    "netstandard",
    "System.Private.CoreLib",
];

/// `ResolutionScope` coded value of the core library.
///
/// Taken from the existing `System.Object` type reference when there is one, so new references
/// bind exactly like the compiler's own; otherwise the first `AssemblyRef` named after a known
/// core library.
///
/// # Errors
/// Returns [`Error::MissingCoreLibrary`] if neither exists.
pub fn core_library_scope(metadata: &MetadataStreams) -> Result<u32> {
    for (_, row) in metadata.tables.table(TableId::TypeRef).rows() {
        if metadata.strings.get(row[columns::typeref::NAME] as usize)? == "Object"
            && metadata.strings.get(row[columns::typeref::NAMESPACE] as usize)? == "System"
        {
            let scope = row[columns::typeref::RESOLUTION_SCOPE];
            if matches!(
                CodedIndexType::ResolutionScope.decode(scope),
                Some((TableId::AssemblyRef, _))
            ) {
                return Ok(scope);
            }
        }
    }

    let assembly_refs = metadata.tables.table(TableId::AssemblyRef);
    for name in CORE_LIBRARY_NAMES {
        for (rid, row) in assembly_refs.rows() {
            if metadata.strings.get(row[columns::assemblyref::NAME] as usize)? == name {
                return CodedIndexType::ResolutionScope
                    .encode(TableId::AssemblyRef, rid)
                    .ok_or(Error::MissingCoreLibrary);
            }
        }
    }

    Err(Error::MissingCoreLibrary)
}

/// `TypeRef` token for `namespace.name` in `scope`, appending a row if needed.
///
/// # Errors
/// Returns an error if a name cannot be read or the string heap cannot grow.
pub fn type_reference(
    metadata: &mut MetadataStreams,
    scope: u32,
    namespace: &str,
    name: &str,
) -> Result<Token> {
    for (rid, row) in metadata.tables.table(TableId::TypeRef).rows() {
        if row[columns::typeref::RESOLUTION_SCOPE] == scope
            && metadata.strings.get(row[columns::typeref::NAME] as usize)? == name
            && metadata.strings.get(row[columns::typeref::NAMESPACE] as usize)? == namespace
        {
            return Ok(Token::from_parts(TableId::TypeRef, rid));
        }
    }

    let name_index = metadata.strings.add(name)?;
    let namespace_index = metadata.strings.add(namespace)?;
    let rid = metadata
        .tables
        .table_mut(TableId::TypeRef)
        .push(&[scope, name_index, namespace_index])?;
    log::debug!("Added TypeRef {}.{} as row {}", namespace, name, rid);

    Ok(Token::from_parts(TableId::TypeRef, rid))
}

/// `MemberRef` token for method `name` with `signature` on `parent`, appending a row if needed.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `parent` cannot be a member reference parent or the
/// signature cannot be encoded.
pub fn method_reference(
    metadata: &mut MetadataStreams,
    parent: Token,
    name: &str,
    signature: &SignatureMethod,
) -> Result<Token> {
    let class = parent
        .table_id()
        .and_then(|table| CodedIndexType::MemberRefParent.encode(table, parent.row()))
        .ok_or_else(|| malformed_error!("Token {} cannot own a member reference", parent))?;
    let blob = encode_method_signature(signature)?;

    for (rid, row) in metadata.tables.table(TableId::MemberRef).rows() {
        if row[columns::memberref::CLASS] == class
            && metadata.strings.get(row[columns::memberref::NAME] as usize)? == name
            && metadata.blobs.get(row[columns::memberref::SIGNATURE] as usize)? == blob.as_slice()
        {
            return Ok(Token::from_parts(TableId::MemberRef, rid));
        }
    }

    let name_index = metadata.strings.add(name)?;
    let signature_index = metadata.blobs.add(&blob)?;
    let rid = metadata
        .tables
        .table_mut(TableId::MemberRef)
        .push(&[class, name_index, signature_index])?;
    log::debug!("Added MemberRef {} on {} as row {}", name, parent, rid);

    Ok(Token::from_parts(TableId::MemberRef, rid))
}

/// `StandAloneSig` token for a local variable signature, `None` for an empty list.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the signature cannot be encoded.
pub fn local_signature(
    metadata: &mut MetadataStreams,
    locals: &SignatureLocalVariables,
) -> Result<Option<Token>> {
    if locals.locals.is_empty() {
        return Ok(None);
    }

    let blob = encode_local_var_signature(locals)?;
    let signature_index = metadata.blobs.add(&blob)?;
    for (rid, row) in metadata.tables.table(TableId::StandAloneSig).rows() {
        if row[columns::standalonesig::SIGNATURE] == signature_index {
            return Ok(Some(Token::from_parts(TableId::StandAloneSig, rid)));
        }
    }

    let rid = metadata
        .tables
        .table_mut(TableId::StandAloneSig)
        .push(&[signature_index])?;
    Ok(Some(Token::from_parts(TableId::StandAloneSig, rid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::signatures::TypeSignature,
        test::fixture::FixtureBuilder,
    };

    fn fixture(builder: FixtureBuilder) -> MetadataStreams {
        MetadataStreams::read(&builder.build().metadata).unwrap()
    }

    #[test]
    fn scope_from_object_reference() {
        let metadata = fixture(FixtureBuilder::new());
        let scope = core_library_scope(&metadata).unwrap();
        assert_eq!(
            CodedIndexType::ResolutionScope.decode(scope),
            Some((TableId::AssemblyRef, 1))
        );
    }

    #[test]
    fn scope_from_assembly_name() {
        let metadata = fixture(FixtureBuilder::new().core_library("netstandard").without_object_reference());
        let scope = core_library_scope(&metadata).unwrap();
        assert_eq!(
            CodedIndexType::ResolutionScope.decode(scope),
            Some((TableId::AssemblyRef, 1))
        );

        let metadata = fixture(FixtureBuilder::new().core_library("Other").without_object_reference());
        assert!(matches!(
            core_library_scope(&metadata),
            Err(Error::MissingCoreLibrary)
        ));
    }

    #[test]
    fn type_reference_reuse() {
        let mut metadata = fixture(FixtureBuilder::new());
        let scope = core_library_scope(&metadata).unwrap();
        let rows = metadata.tables.row_count(TableId::TypeRef);

        let object = type_reference(&mut metadata, scope, "System", "Object").unwrap();
        assert_eq!(object, Token::from_parts(TableId::TypeRef, 1));
        assert_eq!(metadata.tables.row_count(TableId::TypeRef), rows);

        let assembly = type_reference(&mut metadata, scope, "System.Reflection", "Assembly").unwrap();
        assert_eq!(assembly.row(), rows + 1);
        assert_eq!(
            type_reference(&mut metadata, scope, "System.Reflection", "Assembly").unwrap(),
            assembly
        );
    }

    #[test]
    fn method_reference_reuse() {
        let mut metadata = fixture(FixtureBuilder::new());
        let scope = core_library_scope(&metadata).unwrap();
        let object = type_reference(&mut metadata, scope, "System", "Object").unwrap();
        let signature = SignatureMethod::new(true, TypeSignature::Void, vec![]);

        let ctor = method_reference(&mut metadata, object, ".ctor", &signature).unwrap();
        let again = method_reference(&mut metadata, object, ".ctor", &signature).unwrap();
        assert_eq!(ctor, again);

        let other = SignatureMethod::new(false, TypeSignature::Void, vec![]);
        let static_ctor = method_reference(&mut metadata, object, ".ctor", &other).unwrap();
        assert_ne!(static_ctor, ctor);

        assert!(method_reference(&mut metadata, Token::new(0x7000_0001), "x", &other).is_err());
    }

    #[test]
    fn local_signatures() {
        let mut metadata = fixture(FixtureBuilder::new());
        assert_eq!(
            local_signature(&mut metadata, &SignatureLocalVariables { locals: vec![] }).unwrap(),
            None
        );
    }
}
