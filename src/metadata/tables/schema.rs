//! Column layout of every metadata table (ECMA-335 II.22 and the portable PDB tables).
//!
//! Rows are stored as raw `u32` column values; the schema tells the reader how wide each column
//! is and tells the rewriter which columns hold references that may need remapping.

use crate::metadata::tables::{CodedIndexType, TableId};

/// What a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// 2-byte constant
    U16,
    /// 4-byte constant
    U32,
    /// 4-byte metadata token (EnC tables)
    Token,
    /// `#Strings` offset
    Str,
    /// 1-based `#GUID` index
    Guid,
    /// `#Blob` offset
    Blob,
    /// Row of another table
    Index(TableId),
    /// First row of a run in another table; the run ends where the next row's run starts
    List(TableId),
    /// Coded index
    Coded(CodedIndexType),
}

/// A named column.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    /// Name as used in ECMA-335
    pub name: &'static str,
    /// Content kind
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

use CodedIndexType as C;
use ColumnKind::{Blob, Coded, Guid, Index, List, Str, Token, U16, U32};

/// Column positions used by the rewriter.
pub mod columns {
    /// `Module`
    pub mod module {
        /// `Name`
        pub const NAME: usize = 1;
    }
    /// `TypeRef`
    pub mod typeref {
        /// `ResolutionScope`
        pub const RESOLUTION_SCOPE: usize = 0;
        /// `TypeName`
        pub const NAME: usize = 1;
        /// `TypeNamespace`
        pub const NAMESPACE: usize = 2;
    }
    /// `TypeDef`
    pub mod typedef {
        /// `Flags`
        pub const FLAGS: usize = 0;
        /// `TypeName`
        pub const NAME: usize = 1;
        /// `TypeNamespace`
        pub const NAMESPACE: usize = 2;
        /// `MethodList`
        pub const METHOD_LIST: usize = 5;
    }
    /// `MethodDef`
    pub mod methoddef {
        /// `RVA`
        pub const RVA: usize = 0;
        /// `ImplFlags`
        pub const IMPL_FLAGS: usize = 1;
        /// `Flags`
        pub const FLAGS: usize = 2;
        /// `Name`
        pub const NAME: usize = 3;
        /// `Signature`
        pub const SIGNATURE: usize = 4;
        /// `ParamList`
        pub const PARAM_LIST: usize = 5;
    }
    /// `MemberRef`
    pub mod memberref {
        /// `Class`
        pub const CLASS: usize = 0;
        /// `Name`
        pub const NAME: usize = 1;
        /// `Signature`
        pub const SIGNATURE: usize = 2;
    }
    /// `MethodSpec`
    pub mod methodspec {
        /// `Method`
        pub const METHOD: usize = 0;
    }
    /// `StandAloneSig`
    pub mod standalonesig {
        /// `Signature`
        pub const SIGNATURE: usize = 0;
    }
    /// `AssemblyRef`
    pub mod assemblyref {
        /// `Name`
        pub const NAME: usize = 6;
    }
    /// `MethodDebugInformation`
    pub mod methoddebuginformation {
        /// `Document`
        pub const DOCUMENT: usize = 0;
        /// `SequencePoints`
        pub const SEQUENCE_POINTS: usize = 1;
    }
    /// `LocalScope`
    pub mod localscope {
        /// `Method`
        pub const METHOD: usize = 0;
        /// `StartOffset`
        pub const START_OFFSET: usize = 4;
        /// `Length`
        pub const LENGTH: usize = 5;
    }
}

impl TableId {
    /// Column layout of this table.
    #[must_use]
    pub fn columns(self) -> &'static [Column] {
        match self {
            TableId::Module => const { &[
                col("Generation", U16),
                col("Name", Str),
                col("Mvid", Guid),
                col("EncId", Guid),
                col("EncBaseId", Guid),
            ] },
            TableId::TypeRef => const { &[
                col("ResolutionScope", Coded(C::ResolutionScope)),
                col("TypeName", Str),
                col("TypeNamespace", Str),
            ] },
            TableId::TypeDef => const { &[
                col("Flags", U32),
                col("TypeName", Str),
                col("TypeNamespace", Str),
                col("Extends", Coded(C::TypeDefOrRef)),
                col("FieldList", List(TableId::Field)),
                col("MethodList", List(TableId::MethodDef)),
            ] },
            TableId::FieldPtr => const { &[col("Field", Index(TableId::Field))] },
            TableId::Field => const { &[
                col("Flags", U16),
                col("Name", Str),
                col("Signature", Blob),
            ] },
            TableId::MethodPtr => const { &[col("Method", Index(TableId::MethodDef))] },
            TableId::MethodDef => const { &[
                col("RVA", U32),
                col("ImplFlags", U16),
                col("Flags", U16),
                col("Name", Str),
                col("Signature", Blob),
                col("ParamList", List(TableId::Param)),
            ] },
            TableId::ParamPtr => const { &[col("Param", Index(TableId::Param))] },
            TableId::Param => const { &[
                col("Flags", U16),
                col("Sequence", U16),
                col("Name", Str),
            ] },
            TableId::InterfaceImpl => const { &[
                col("Class", Index(TableId::TypeDef)),
                col("Interface", Coded(C::TypeDefOrRef)),
            ] },
            TableId::MemberRef => const { &[
                col("Class", Coded(C::MemberRefParent)),
                col("Name", Str),
                col("Signature", Blob),
            ] },
            // Type is one byte followed by one byte of padding
            TableId::Constant => const { &[
                col("Type", U16),
                col("Parent", Coded(C::HasConstant)),
                col("Value", Blob),
            ] },
            TableId::CustomAttribute => const { &[
                col("Parent", Coded(C::HasCustomAttribute)),
                col("Type", Coded(C::CustomAttributeType)),
                col("Value", Blob),
            ] },
            TableId::FieldMarshal => const { &[
                col("Parent", Coded(C::HasFieldMarshal)),
                col("NativeType", Blob),
            ] },
            TableId::DeclSecurity => const { &[
                col("Action", U16),
                col("Parent", Coded(C::HasDeclSecurity)),
                col("PermissionSet", Blob),
            ] },
            TableId::ClassLayout => const { &[
                col("PackingSize", U16),
                col("ClassSize", U32),
                col("Parent", Index(TableId::TypeDef)),
            ] },
            TableId::FieldLayout => const { &[
                col("Offset", U32),
                col("Field", Index(TableId::Field)),
            ] },
            TableId::StandAloneSig => const { &[col("Signature", Blob)] },
            TableId::EventMap => const { &[
                col("Parent", Index(TableId::TypeDef)),
                col("EventList", List(TableId::Event)),
            ] },
            TableId::EventPtr => const { &[col("Event", Index(TableId::Event))] },
            TableId::Event => const { &[
                col("EventFlags", U16),
                col("Name", Str),
                col("EventType", Coded(C::TypeDefOrRef)),
            ] },
            TableId::PropertyMap => const { &[
                col("Parent", Index(TableId::TypeDef)),
                col("PropertyList", List(TableId::Property)),
            ] },
            TableId::PropertyPtr => const { &[col("Property", Index(TableId::Property))] },
            TableId::Property => const { &[
                col("Flags", U16),
                col("Name", Str),
                col("Type", Blob),
            ] },
            TableId::MethodSemantics => const { &[
                col("Semantics", U16),
                col("Method", Index(TableId::MethodDef)),
                col("Association", Coded(C::HasSemantics)),
            ] },
            TableId::MethodImpl => const { &[
                col("Class", Index(TableId::TypeDef)),
                col("MethodBody", Coded(C::MethodDefOrRef)),
                col("MethodDeclaration", Coded(C::MethodDefOrRef)),
            ] },
            TableId::ModuleRef => const { &[col("Name", Str)] },
            TableId::TypeSpec => const { &[col("Signature", Blob)] },
            TableId::ImplMap => const { &[
                col("MappingFlags", U16),
                col("MemberForwarded", Coded(C::MemberForwarded)),
                col("ImportName", Str),
                col("ImportScope", Index(TableId::ModuleRef)),
            ] },
            TableId::FieldRVA => const { &[col("RVA", U32), col("Field", Index(TableId::Field))] },
            TableId::EncLog => const { &[col("Token", Token), col("FuncCode", U32)] },
            TableId::EncMap => const { &[col("Token", Token)] },
            TableId::Assembly => const { &[
                col("HashAlgId", U32),
                col("MajorVersion", U16),
                col("MinorVersion", U16),
                col("BuildNumber", U16),
                col("RevisionNumber", U16),
                col("Flags", U32),
                col("PublicKey", Blob),
                col("Name", Str),
                col("Culture", Str),
            ] },
            TableId::AssemblyProcessor => const { &[col("Processor", U32)] },
            TableId::AssemblyOS => const { &[
                col("OSPlatformID", U32),
                col("OSMajorVersion", U32),
                col("OSMinorVersion", U32),
            ] },
            TableId::AssemblyRef => const { &[
                col("MajorVersion", U16),
                col("MinorVersion", U16),
                col("BuildNumber", U16),
                col("RevisionNumber", U16),
                col("Flags", U32),
                col("PublicKeyOrToken", Blob),
                col("Name", Str),
                col("Culture", Str),
                col("HashValue", Blob),
            ] },
            TableId::AssemblyRefProcessor => const { &[
                col("Processor", U32),
                col("AssemblyRef", Index(TableId::AssemblyRef)),
            ] },
            TableId::AssemblyRefOS => const { &[
                col("OSPlatformID", U32),
                col("OSMajorVersion", U32),
                col("OSMinorVersion", U32),
                col("AssemblyRef", Index(TableId::AssemblyRef)),
            ] },
            TableId::File => const { &[
                col("Flags", U32),
                col("Name", Str),
                col("HashValue", Blob),
            ] },
            TableId::ExportedType => const { &[
                col("Flags", U32),
                col("TypeDefId", U32),
                col("TypeName", Str),
                col("TypeNamespace", Str),
                col("Implementation", Coded(C::Implementation)),
            ] },
            TableId::ManifestResource => const { &[
                col("Offset", U32),
                col("Flags", U32),
                col("Name", Str),
                col("Implementation", Coded(C::Implementation)),
            ] },
            TableId::NestedClass => const { &[
                col("NestedClass", Index(TableId::TypeDef)),
                col("EnclosingClass", Index(TableId::TypeDef)),
            ] },
            TableId::GenericParam => const { &[
                col("Number", U16),
                col("Flags", U16),
                col("Owner", Coded(C::TypeOrMethodDef)),
                col("Name", Str),
            ] },
            TableId::MethodSpec => const { &[
                col("Method", Coded(C::MethodDefOrRef)),
                col("Instantiation", Blob),
            ] },
            TableId::GenericParamConstraint => const { &[
                col("Owner", Index(TableId::GenericParam)),
                col("Constraint", Coded(C::TypeDefOrRef)),
            ] },
            TableId::Document => const { &[
                col("Name", Blob),
                col("HashAlgorithm", Guid),
                col("Hash", Blob),
                col("Language", Guid),
            ] },
            TableId::MethodDebugInformation => const { &[
                col("Document", Index(TableId::Document)),
                col("SequencePoints", Blob),
            ] },
            TableId::LocalScope => const { &[
                col("Method", Index(TableId::MethodDef)),
                col("ImportScope", Index(TableId::ImportScope)),
                col("VariableList", List(TableId::LocalVariable)),
                col("ConstantList", List(TableId::LocalConstant)),
                col("StartOffset", U32),
                col("Length", U32),
            ] },
            TableId::LocalVariable => const { &[
                col("Attributes", U16),
                col("Index", U16),
                col("Name", Str),
            ] },
            TableId::LocalConstant => const { &[col("Name", Str), col("Signature", Blob)] },
            TableId::ImportScope => const { &[
                col("Parent", Index(TableId::ImportScope)),
                col("Imports", Blob),
            ] },
            TableId::StateMachineMethod => const { &[
                col("MoveNextMethod", Index(TableId::MethodDef)),
                col("KickoffMethod", Index(TableId::MethodDef)),
            ] },
            TableId::CustomDebugInformation => const { &[
                col("Parent", Coded(C::HasCustomDebugInformation)),
                col("Kind", Guid),
                col("Value", Blob),
            ] },
        }
    }

    /// True if any column of this table is a list column.
    #[must_use]
    pub fn has_list_columns(self) -> bool {
        self.columns()
            .iter()
            .any(|column| matches!(column.kind, ColumnKind::List(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_table_has_columns() {
        for table in TableId::iter() {
            assert!(!table.columns().is_empty(), "{table:?}");
        }
    }

    #[test]
    fn named_positions() {
        assert_eq!(TableId::TypeDef.columns()[columns::typedef::METHOD_LIST].name, "MethodList");
        assert_eq!(TableId::MethodDef.columns()[columns::methoddef::PARAM_LIST].name, "ParamList");
        assert_eq!(TableId::MethodDef.columns()[columns::methoddef::NAME].name, "Name");
        assert_eq!(TableId::AssemblyRef.columns()[columns::assemblyref::NAME].name, "Name");
        assert_eq!(TableId::LocalScope.columns()[columns::localscope::LENGTH].name, "Length");
        assert_eq!(TableId::MemberRef.columns()[columns::memberref::SIGNATURE].name, "Signature");
    }

    #[test]
    fn list_columns() {
        assert!(TableId::TypeDef.has_list_columns());
        assert!(TableId::LocalScope.has_list_columns());
        assert!(!TableId::CustomAttribute.has_list_columns());
    }
}
