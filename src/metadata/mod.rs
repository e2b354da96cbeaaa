//! ECMA-335 metadata reading and writing.
//!
//! Everything here works on owned, raw representations: tables are rows of column values, heaps
//! are byte buffers, and method bodies are parsed only as far as their headers. That is enough to
//! insert a method and write the metadata back without losing anything the rewriter does not
//! understand.
//!
//! # Key Components
//!
//! - [`cor20header`] - The CLI header of a managed image
//! - [`root`] - The `BSJB` metadata root and stream directory
//! - [`streams`] - Tables stream, heaps and the `#Pdb` stream
//! - [`tables`] - Table schemas, coded indexes, row storage and sort keys
//! - [`method`] - Method flags and body headers
//! - [`signatures`] - Method and local variable signatures
//! - [`token`] - Metadata tokens
//!
//! # Examples
//!
//! ```rust
//! use modinit::metadata::{tables::TableId, token::Token};
//!
//! let token = Token::from_parts(TableId::MethodDef, 3);
//! assert_eq!(token.value(), 0x0600_0003);
//! assert_eq!(token.table_id(), Some(TableId::MethodDef));
//! ```

/// The CLI (Cor20) header
pub mod cor20header;
/// Method flags, body headers and exception clauses
pub mod method;
/// The metadata root
pub mod root;
/// Method and local variable signatures
pub mod signatures;
/// Metadata streams and heaps
pub mod streams;
/// Metadata tables
pub mod tables;
/// Metadata tokens
pub mod token;
