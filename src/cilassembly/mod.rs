//! Mutable in-memory representation of a managed image.
//!
//! [`CilAssembly`] owns everything that one rewrite needs: the original image bytes, the decoded
//! metadata (tables and heaps), the CLI header, the optional portable PDB, and the bodies of
//! methods added since loading. It implements [`MetadataGraph`], which is the only surface the
//! initializer synthesizer sees.
//!
//! # Lifecycle
//!
//! ```text
//! from_mem / load  ->  MetadataGraph mutations  ->  to_memory / write
//! ```
//!
//! Loading is eager and rejects every image flavour the writer cannot reproduce: mixed-mode
//! images, VTable fixups, ReadyToRun, uncompressed (`#-`) metadata and `*Ptr` indirection tables.
//! Serialization is a pure function of the loaded state; it never modifies `self`, so
//! [`CilAssembly::to_memory`] can be called repeatedly.
//!
//! # Key Components
//!
//! - [`graph`] - The [`MetadataGraph`] trait and the method definition types
//! - [`streams`] - Owned `BSJB` metadata of images and PDBs
//! - [`remapping`] - Row insertion, reference remapping and re-sorting
//! - [`symbols`] - Portable PDB loading and rewriting
//! - [`write`] - PE rebuilding and atomic output
//!
//! # Examples
//!
//! ```rust,no_run
//! use modinit::{CilAssembly, MetadataGraph};
//! use std::path::Path;
//!
//! let mut assembly = CilAssembly::load(Path::new("app.dll"), Some(Path::new("app.pdb")))?;
//! let module = assembly.module_type()?;
//! for method in assembly.methods(module)? {
//!     println!("{} {}", method.token, method.name);
//! }
//! assembly.write(Path::new("app.dll"), true)?;
//! # Ok::<(), modinit::Error>(())
//! ```

pub mod graph;
pub mod remapping;
pub mod streams;
pub mod symbols;
pub mod write;

mod references;

use std::path::{Path, PathBuf};

pub use graph::{MetadataGraph, MethodBody, MethodDefinition, MethodSummary};

use crate::{
    cilassembly::{
        remapping::{insert_method_row, RowMap},
        streams::MetadataStreams,
        symbols::PortablePdb,
        write::{encode_method_body, output::write_all},
    },
    file::{DataDirectoryKind, File, PeLayout},
    metadata::{
        cor20header::Cor20Header,
        method::MethodHeader,
        signatures::{encode_method_signature, parse_method_signature, CallEffect, SignatureMethod},
        tables::{columns, CodedIndexType, TableId},
        token::Token,
    },
    Error, Result,
};

/// Name of the module type
pub const MODULE_TYPE_NAME: &str = "<Module>";

/// One managed image loaded for rewriting, with its optional portable PDB.
pub struct CilAssembly {
    file: File,
    layout: PeLayout,
    cor20: Cor20Header,
    metadata: MetadataStreams,
    symbols: Option<PortablePdb>,
    /// Bodies of added methods by current `MethodDef` row
    new_bodies: Vec<(u32, Vec<u8>)>,
    /// Every `MethodDef` renumbering since loading, oldest first
    method_maps: Vec<RowMap>,
}

impl CilAssembly {
    /// Load an image and optionally its portable PDB from memory.
    ///
    /// # Errors
    /// Returns a [`crate::ErrorKind::Load`] error if the image or the symbols cannot be parsed or
    /// use a feature that cannot be rewritten.
    pub fn from_mem(image: Vec<u8>, symbols: Option<Vec<u8>>) -> Result<CilAssembly> {
        let file = File::from_mem(image)?;
        let layout = file.layout()?;

        let (clr_rva, _) = layout.directory(DataDirectoryKind::ClrRuntimeHeader);
        let clr_offset = layout.rva_to_offset(clr_rva)?;
        let cor20 = Cor20Header::read(
            file.data()
                .get(clr_offset..)
                .ok_or_else(|| out_of_bounds_error!())?,
        )?;
        cor20.check_rewritable()?;

        let metadata_offset = layout.rva_to_offset(cor20.meta_data_rva)?;
        let metadata_data = file.data_slice(metadata_offset, cor20.meta_data_size as usize)?;
        let metadata = MetadataStreams::read(metadata_data)?;
        if metadata.pdb.is_some() {
            return Err(malformed_error!("Image metadata contains a #Pdb stream"));
        }

        let symbols = match symbols {
            Some(data) => Some(PortablePdb::from_mem(&data)?),
            None => None,
        };

        let assembly = CilAssembly {
            file,
            layout,
            cor20,
            metadata,
            symbols,
            new_bodies: Vec::new(),
            method_maps: Vec::new(),
        };
        assembly.check_symbols()?;

        log::debug!(
            "Loaded image: {} types, {} methods, {} sections{}",
            assembly.metadata.tables.row_count(TableId::TypeDef),
            assembly.metadata.tables.row_count(TableId::MethodDef),
            assembly.layout.sections.len(),
            if assembly.symbols.is_some() {
                ", with portable PDB"
            } else {
                ""
            }
        );
        Ok(assembly)
    }

    /// Read an image and, if `symbol_path` names an existing file, its portable PDB.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if a file cannot be read and the errors of
    /// [`CilAssembly::from_mem`] otherwise.
    pub fn load(path: &Path, symbol_path: Option<&Path>) -> Result<CilAssembly> {
        let image = std::fs::read(path)?;
        let symbols = match symbol_path {
            Some(symbol_path) if symbol_path.is_file() => Some(std::fs::read(symbol_path)?),
            _ => None,
        };

        let assembly = Self::from_mem(image, symbols)?;
        log::debug!("Read {}", path.display());
        Ok(assembly)
    }

    /// Serialize the image and, if symbols were loaded, the PDB.
    ///
    /// # Errors
    /// Returns a [`crate::ErrorKind::Write`] error if the output cannot be laid out, or the load
    /// error of a body that could not be patched.
    pub fn to_memory(&self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        write::rebuild(self)
    }

    /// Serialize and atomically replace `path`. With `has_symbols`, the PDB next to it (same
    /// stem, `.pdb` extension) is replaced as well; otherwise no symbol file is touched.
    ///
    /// # Errors
    /// Returns the errors of [`CilAssembly::to_memory`] and [`Error::WriteFailed`] if a file
    /// cannot be replaced.
    pub fn write(&self, path: &Path, has_symbols: bool) -> Result<()> {
        let (image, symbols) = self.to_memory()?;

        let symbol_path = symbol_path(path);
        let mut outputs: Vec<(&Path, &[u8])> = vec![(path, image.as_slice())];
        match (&symbols, has_symbols) {
            (Some(pdb), true) => outputs.push((symbol_path.as_path(), pdb.as_slice())),
            (None, true) => log::warn!("No symbols were loaded; {} left as is", symbol_path.display()),
            _ => {}
        }

        write_all(&outputs)
    }

    /// True if a portable PDB was loaded.
    #[must_use]
    pub fn has_symbols(&self) -> bool {
        self.symbols.is_some()
    }

    /// The loaded portable PDB.
    #[must_use]
    pub fn symbols(&self) -> Option<&PortablePdb> {
        self.symbols.as_ref()
    }

    /// The current metadata.
    #[must_use]
    pub fn metadata(&self) -> &MetadataStreams {
        &self.metadata
    }

    /// The CLI header, with the entry point kept current.
    #[must_use]
    pub fn cor20(&self) -> &Cor20Header {
        &self.cor20
    }

    /// Body bytes of method `token`: the added body for new methods, the image bytes otherwise.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a method with an IL body.
    pub fn method_body(&self, token: Token) -> Result<Vec<u8>> {
        if token.table_id() != Some(TableId::MethodDef) {
            return Err(malformed_error!("{} is not a MethodDef", token));
        }
        if let Some((_, body)) = self.new_bodies.iter().find(|(rid, _)| *rid == token.row()) {
            return Ok(body.clone());
        }

        let rva = self
            .metadata
            .tables
            .table(TableId::MethodDef)
            .get(token.row(), columns::methoddef::RVA)
            .ok_or_else(|| malformed_error!("{} does not exist", token))?;
        if rva == 0 {
            return Err(malformed_error!("{} has no body", token));
        }
        let offset = self.layout.rva_to_offset(rva)?;
        let data = self.file.data().get(offset..).ok_or_else(|| out_of_bounds_error!())?;
        let header = MethodHeader::from(data)?;
        data.get(..header.size())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| out_of_bounds_error!())
    }

    /// Warn about symbols that do not belong to this image; they are still rewritten.
    fn check_symbols(&self) -> Result<()> {
        let Some(pdb) = &self.symbols else {
            return Ok(());
        };

        let id = pdb.id();
        let guids = write::codeview_guids(self)?;
        if !guids.is_empty() && !guids.iter().any(|guid| guid[..] == id[..16]) {
            log::warn!("The PDB id does not match the image's CodeView record");
        }

        let methods = self.metadata.tables.row_count(TableId::MethodDef);
        let debug_rows = pdb.tables().row_count(TableId::MethodDebugInformation);
        if debug_rows != 0 && debug_rows != methods {
            log::warn!(
                "The PDB describes {} methods, the image has {}",
                debug_rows,
                methods
            );
        }
        Ok(())
    }

    fn method_range(&self, owner: u32) -> Result<std::ops::Range<u32>> {
        let types = self.metadata.tables.table(TableId::TypeDef);
        let method_end = self.metadata.tables.row_count(TableId::MethodDef) + 1;
        let start = types
            .get(owner, columns::typedef::METHOD_LIST)
            .ok_or_else(|| malformed_error!("TypeDef row {} does not exist", owner))?;
        let end = types
            .get(owner + 1, columns::typedef::METHOD_LIST)
            .unwrap_or(method_end);

        if start == 0 || start > end || end > method_end {
            return Err(malformed_error!(
                "MethodList of TypeDef row {} is out of order",
                owner
            ));
        }
        Ok(start..end)
    }

    fn method_signature(&self, token: Token) -> Result<SignatureMethod> {
        let tables = &self.metadata.tables;
        let blob = match token.table_id() {
            Some(TableId::MethodDef) => tables
                .table(TableId::MethodDef)
                .get(token.row(), columns::methoddef::SIGNATURE),
            Some(TableId::MemberRef) => tables
                .table(TableId::MemberRef)
                .get(token.row(), columns::memberref::SIGNATURE),
            Some(TableId::StandAloneSig) => tables
                .table(TableId::StandAloneSig)
                .get(token.row(), columns::standalonesig::SIGNATURE),
            Some(TableId::MethodSpec) => {
                let method = tables
                    .table(TableId::MethodSpec)
                    .get(token.row(), columns::methodspec::METHOD)
                    .and_then(|value| CodedIndexType::MethodDefOrRef.to_token(value))
                    .ok_or_else(|| malformed_error!("{} does not exist", token))?;
                return self.method_signature(method);
            }
            _ => None,
        }
        .ok_or_else(|| malformed_error!("{} does not name a method signature", token))?;

        parse_method_signature(self.metadata.blobs.get(blob as usize)?)
    }
}

impl MetadataGraph for CilAssembly {
    fn module_type(&self) -> Result<Token> {
        for (rid, row) in self.metadata.tables.table(TableId::TypeDef).rows() {
            if self.metadata.strings.get(row[columns::typedef::NAME] as usize)? == MODULE_TYPE_NAME
                && self
                    .metadata
                    .strings
                    .get(row[columns::typedef::NAMESPACE] as usize)?
                    .is_empty()
            {
                return Ok(Token::from_parts(TableId::TypeDef, rid));
            }
        }
        Err(Error::ModuleTypeNotFound)
    }

    fn methods(&self, owner: Token) -> Result<Vec<MethodSummary>> {
        if owner.table_id() != Some(TableId::TypeDef) {
            return Err(malformed_error!("{} is not a TypeDef", owner));
        }

        let methods = self.metadata.tables.table(TableId::MethodDef);
        let mut summaries = Vec::new();
        for rid in self.method_range(owner.row())? {
            let (Some(name), Some(flags)) = (
                methods.get(rid, columns::methoddef::NAME),
                methods.get(rid, columns::methoddef::FLAGS),
            ) else {
                return Err(malformed_error!("MethodDef row {} does not exist", rid));
            };
            summaries.push(MethodSummary {
                token: Token::from_parts(TableId::MethodDef, rid),
                name: self.metadata.strings.get(name as usize)?.to_string(),
                flags: u16::try_from(flags).unwrap_or(u16::MAX),
            });
        }
        Ok(summaries)
    }

    fn type_reference(&mut self, namespace: &str, name: &str) -> Result<Token> {
        let scope = references::core_library_scope(&self.metadata)?;
        references::type_reference(&mut self.metadata, scope, namespace, name)
    }

    fn method_reference(
        &mut self,
        parent: Token,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Token> {
        references::method_reference(&mut self.metadata, parent, name, signature)
    }

    fn user_string(&mut self, value: &str) -> Result<Token> {
        self.metadata.user_strings.add(value)
    }

    fn call_effect(&self, method: Token) -> Result<CallEffect> {
        Ok(self.method_signature(method)?.call_effect())
    }

    fn add_method(&mut self, owner: Token, method: MethodDefinition) -> Result<Token> {
        if owner.table_id() != Some(TableId::TypeDef) {
            return Err(malformed_error!("{} is not a TypeDef", owner));
        }
        self.method_range(owner.row())?;

        let name = self.metadata.strings.add(&method.name)?;
        let signature = self
            .metadata
            .blobs
            .add(&encode_method_signature(&method.signature)?)?;
        let locals = references::local_signature(&mut self.metadata, &method.body.locals)?
            .map_or(0, |token| token.value());
        let body = encode_method_body(
            &method.body.code,
            method.body.max_stack,
            locals,
            method.body.init_locals,
        )?;

        let row = [
            0,
            u32::from(method.impl_flags),
            u32::from(method.flags),
            name,
            signature,
            0,
        ];
        let rid = insert_method_row(
            &mut self.metadata.tables,
            self.symbols.as_mut().map(PortablePdb::tables_mut),
            owner.row(),
            &row,
        )?;

        let map = RowMap::Insert { at: rid };
        self.cor20.entry_point_token = map
            .map_token(
                TableId::MethodDef,
                Token::new(self.cor20.entry_point_token),
            )
            .value();
        if let Some(pdb) = self.symbols.as_mut() {
            pdb.remap_methods(&map)?;
        }
        for (added, _) in &mut self.new_bodies {
            *added = map.map(*added);
        }
        self.new_bodies.push((rid, body));
        self.method_maps.push(map);

        let token = Token::from_parts(TableId::MethodDef, rid);
        log::debug!("Added {} {} to {}", token, method.name, owner);
        Ok(token)
    }
}

impl std::fmt::Debug for CilAssembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CilAssembly")
            .field("size", &self.file.len())
            .field("methods", &self.metadata.tables.row_count(TableId::MethodDef))
            .field("symbols", &self.symbols.is_some())
            .field("added", &self.new_bodies.len())
            .finish_non_exhaustive()
    }
}

/// The companion symbol file of `path`: same stem, `.pdb` extension.
#[must_use]
pub fn symbol_path(path: &Path) -> PathBuf {
    path.with_extension("pdb")
}
