use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// Identifiers of the metadata tables, both the ECMA-335 type system tables (`0x00..=0x2C`) and
/// the portable PDB debug tables (`0x30..=0x37`).
///
/// The numeric values are the table numbers used in tokens, in the `Valid`/`Sorted` bit vectors
/// of the `#~` stream, and in coded indexes.
///
/// ## Table Categories
///
/// ### Core Type System
/// - **`Module`**, **`TypeRef`**, **`TypeDef`**, **`Field`**, **`MethodDef`**, **`Param`**
///
/// ### Indirection
/// - **`FieldPtr`**, **`MethodPtr`**, **`ParamPtr`**, **`EventPtr`**, **`PropertyPtr`** - only
///   present in unoptimized (`#-`) or edit-and-continue metadata
///
/// ### Debug Information (portable PDB)
/// - **`Document`**, **`MethodDebugInformation`**, **`LocalScope`**, **`LocalVariable`**,
///   **`LocalConstant`**, **`ImportScope`**, **`StateMachineMethod`**, **`CustomDebugInformation`**
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    /// Module definition
    Module = 0x00,
    /// Type references
    TypeRef = 0x01,
    /// Type definitions
    TypeDef = 0x02,
    /// Field indirection
    FieldPtr = 0x03,
    /// Field definitions
    Field = 0x04,
    /// Method indirection
    MethodPtr = 0x05,
    /// Method definitions
    MethodDef = 0x06,
    /// Parameter indirection
    ParamPtr = 0x07,
    /// Parameter definitions
    Param = 0x08,
    /// Interface implementations
    InterfaceImpl = 0x09,
    /// Member references
    MemberRef = 0x0A,
    /// Constant values
    Constant = 0x0B,
    /// Custom attributes
    CustomAttribute = 0x0C,
    /// Marshalling descriptors
    FieldMarshal = 0x0D,
    /// Declarative security
    DeclSecurity = 0x0E,
    /// Type layout
    ClassLayout = 0x0F,
    /// Field offsets
    FieldLayout = 0x10,
    /// Standalone signatures (locals, calli)
    StandAloneSig = 0x11,
    /// Type to event list
    EventMap = 0x12,
    /// Event indirection
    EventPtr = 0x13,
    /// Events
    Event = 0x14,
    /// Type to property list
    PropertyMap = 0x15,
    /// Property indirection
    PropertyPtr = 0x16,
    /// Properties
    Property = 0x17,
    /// Accessor associations
    MethodSemantics = 0x18,
    /// Method overrides
    MethodImpl = 0x19,
    /// Module references
    ModuleRef = 0x1A,
    /// Type specifications
    TypeSpec = 0x1B,
    /// P/Invoke mappings
    ImplMap = 0x1C,
    /// Field initial data
    FieldRVA = 0x1D,
    /// Edit-and-continue log
    EncLog = 0x1E,
    /// Edit-and-continue map
    EncMap = 0x1F,
    /// Assembly definition
    Assembly = 0x20,
    /// Unused processor info
    AssemblyProcessor = 0x21,
    /// Unused OS info
    AssemblyOS = 0x22,
    /// Assembly references
    AssemblyRef = 0x23,
    /// Unused processor info
    AssemblyRefProcessor = 0x24,
    /// Unused OS info
    AssemblyRefOS = 0x25,
    /// Files of a multi-file assembly
    File = 0x26,
    /// Exported types
    ExportedType = 0x27,
    /// Manifest resources
    ManifestResource = 0x28,
    /// Nesting relations
    NestedClass = 0x29,
    /// Generic parameters
    GenericParam = 0x2A,
    /// Generic instantiations
    MethodSpec = 0x2B,
    /// Generic parameter constraints
    GenericParamConstraint = 0x2C,
    /// Source documents
    Document = 0x30,
    /// Sequence points, parallel to `MethodDef`
    MethodDebugInformation = 0x31,
    /// Lexical scopes
    LocalScope = 0x32,
    /// Local variable names
    LocalVariable = 0x33,
    /// Local constants
    LocalConstant = 0x34,
    /// Namespace imports
    ImportScope = 0x35,
    /// Async/iterator kickoff mapping
    StateMachineMethod = 0x36,
    /// Custom debug blobs
    CustomDebugInformation = 0x37,
}

impl TableId {
    /// Look up a table by its number.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<TableId> {
        TableId::iter().find(|id| *id as u8 == value)
    }

    /// True for type system tables, false for portable PDB tables.
    #[must_use]
    pub fn is_type_system(self) -> bool {
        (self as u8) < 0x30
    }

    /// True for the `*Ptr` indirection tables.
    #[must_use]
    pub fn is_indirection(self) -> bool {
        matches!(
            self,
            TableId::FieldPtr
                | TableId::MethodPtr
                | TableId::ParamPtr
                | TableId::EventPtr
                | TableId::PropertyPtr
        )
    }

    /// Bit of this table in the `Valid`/`Sorted` vectors.
    #[must_use]
    pub fn mask(self) -> u64 {
        1u64 << (self as u8)
    }
}

/// Number of slots needed to index per-table arrays by `TableId as usize`.
pub const TABLE_SLOTS: usize = TableId::CustomDebugInformation as usize + 1;

const _: () = assert!(TableId::COUNT == 53);
