// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # modinit
//!
//! A post-build rewriter for .NET assemblies. `modinit` adds a module initializer (a `.cctor` on
//! the `<Module>` type) to a compiled assembly and rewrites it in place, keeping its portable PDB
//! consistent with the new method table.
//!
//! The initializer runs before any other code of the module. It looks for a type named
//! `ModuleInitializer` in the assembly and, if that type has a `Run` method, invokes it:
//!
//! ```csharp
//! public static class ModuleInitializer
//! {
//!     public static void Run() { /* runs once, before Main */ }
//! }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modinit::{inject_file, InjectOptions};
//! use std::path::Path;
//!
//! let report = inject_file(Path::new("bin/Release/app.dll"), &InjectOptions::default())?;
//! println!(
//!     "injected .cctor {} (symbols rewritten: {})",
//!     report.method, report.symbols_rewritten
//! );
//! # Ok::<(), modinit::Error>(())
//! ```
//!
//! The pure core works on buffers and never touches the filesystem:
//!
//! ```rust,no_run
//! use modinit::{initializer, CilAssembly};
//!
//! # fn run(image: Vec<u8>, pdb: Option<Vec<u8>>) -> modinit::Result<()> {
//! let mut assembly = CilAssembly::from_mem(image, pdb)?;
//! initializer::inject(&mut assembly, true)?;
//! let (image, pdb) = assembly.to_memory()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - PE container access through `goblin`, cursors and little-endian helpers
//! - [`metadata`] - ECMA-335 metadata: CLI header, streams, tables, signatures, method bodies
//! - [`assembly`] - CIL instruction tables, decoder, label-aware encoder and stack verifier
//! - [`cilassembly`] - The mutable [`CilAssembly`], row insertion and remapping, portable PDBs,
//!   PE rebuilding and atomic output
//! - [`initializer`] - Collision check and synthesis of the initializer against [`MetadataGraph`]
//! - [`inject_file`] / [`inject_mem`] - The whole pipeline in one call
//!
//! ## What is preserved
//!
//! Existing method bodies, resources and native sections stay where they are; only
//! `MethodDef` tokens inside bodies are patched. The rebuilt metadata goes into a new `.meta`
//! section. A portable PDB keeps its id, so the CodeView record of the image still matches, and
//! every existing method keeps its sequence points.
//!
//! Some things cannot survive a rewrite and are reported through `log`: strong-name signatures
//! and Authenticode certificates are invalidated, and an embedded portable PDB goes stale.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. [`Error::kind`] groups errors into the
//! [`ErrorKind`] classes `Load`, `DuplicateInitializer`, `Structural`, `Emit` and `Write`.
//! Nothing is written unless every step succeeded.
#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// CIL instruction set, encoder, decoder and verifier
pub mod assembly;

/// Mutable managed images and their serialization
pub mod cilassembly;

/// PE container access and byte-level helpers
pub mod file;

/// Synthesis of the module initializer
pub mod initializer;

/// ECMA-335 metadata structures
pub mod metadata;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use modinit::prelude::*;
///
/// let mut assembly = CilAssembly::load("app.dll".as_ref(), None)?;
/// let module = assembly.module_type()?;
/// println!("{} methods on <Module>", assembly.methods(module)?.len());
/// # Ok::<(), modinit::Error>(())
/// ```
pub mod prelude;

mod pipeline;

/// `modinit` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

pub use cilassembly::{CilAssembly, MetadataGraph};
pub use error::{Error, ErrorKind};
/// Low-level byte parsing
///
/// [`Parser`] is the cursor used for heaps, signatures and method bodies; [`File`] is the loaded
/// PE image.
pub use file::{parser::Parser, File};
pub use pipeline::{
    inject_file, inject_mem, InjectOptions, InjectedImage, InjectionReport, SymbolPolicy,
};
