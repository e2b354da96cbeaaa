//! Metadata streams.
//!
//! The metadata root (`BSJB`) of an image or a portable PDB is followed by a directory of named
//! streams:
//!
//! - **`#~`** - compressed metadata tables ([`TablesHeader`])
//! - **`#Strings`** - UTF-8 identifiers ([`Strings`])
//! - **`#US`** - UTF-16 string literals for `ldstr` ([`UserStrings`])
//! - **`#GUID`** - 16-byte GUIDs ([`Guid`])
//! - **`#Blob`** - signatures and other binary values ([`Blob`])
//! - **`#Pdb`** - portable PDB header ([`PdbStream`])
//!
//! All heaps are held as owned buffers so entries can be appended; appended entries are always
//! placed after the existing ones, which keeps every existing offset valid.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 24.2.2 - Stream Headers
//! - Portable PDB v1.0 Format Specification, `#Pdb` stream

mod blob;
mod guid;
mod pdb;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::Blob;
pub use guid::Guid;
pub use pdb::{PdbStream, PDB_ID_SIZE};
pub use streamheader::{StreamHeader, KNOWN_STREAMS};
pub use strings::Strings;
pub use tablesheader::TablesHeader;
pub use userstrings::UserStrings;
