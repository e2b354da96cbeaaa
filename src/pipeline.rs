//! The load, inject and write pipeline.
//!
//! [`inject_file`] is the whole tool as a library call; [`inject_mem`] is the same thing without
//! the filesystem.

use std::path::Path;

use crate::{
    cilassembly::{symbol_path, CilAssembly},
    initializer,
    metadata::token::Token,
    Result,
};

/// Whether the companion portable PDB takes part in a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolPolicy {
    /// Load and rewrite the `.pdb` next to the assembly if it exists
    #[default]
    Auto,
    /// Leave any `.pdb` alone. An existing one no longer matches the rewritten image, since every
    /// method after the initializer gets a new token; this is logged and reported.
    Ignore,
}

/// Options of one injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectOptions {
    /// Symbol handling
    pub symbols: SymbolPolicy,
    /// Replay-verify the synthesized body before committing it
    pub verify: bool,
}

impl Default for InjectOptions {
    fn default() -> Self {
        InjectOptions {
            symbols: SymbolPolicy::Auto,
            verify: true,
        }
    }
}

/// Outcome of a successful [`inject_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionReport {
    /// Token of the added initializer
    pub method: Token,
    /// A portable PDB was rewritten next to the assembly
    pub symbols_rewritten: bool,
    /// A `.pdb` next to the assembly was left as it was and now describes the old method tokens
    pub symbols_stale: bool,
    /// Size of the written image
    pub image_size: usize,
}

/// Result of [`inject_mem`].
#[derive(Debug, Clone)]
pub struct InjectedImage {
    /// The rewritten image
    pub image: Vec<u8>,
    /// The rewritten PDB, present exactly when symbols were given
    pub symbols: Option<Vec<u8>>,
    /// Token of the added initializer
    pub method: Token,
}

/// Inject an initializer into `image` and serialize the result.
///
/// # Errors
/// Returns every error of loading, injection and serialization; see [`crate::ErrorKind`].
pub fn inject_mem(
    image: Vec<u8>,
    symbols: Option<Vec<u8>>,
    options: &InjectOptions,
) -> Result<InjectedImage> {
    let mut assembly = CilAssembly::from_mem(image, symbols)?;
    let method = initializer::inject(&mut assembly, options.verify)?;
    let (image, symbols) = assembly.to_memory()?;

    Ok(InjectedImage {
        image,
        symbols,
        method,
    })
}

/// Inject an initializer into the assembly at `path` and replace it in place.
///
/// With [`SymbolPolicy::Auto`] the `.pdb` of the same stem is rewritten as well when it exists.
/// On any error the files are left as they were.
///
/// # Errors
/// Returns every error of loading, injection and writing; see [`crate::ErrorKind`].
pub fn inject_file(path: &Path, options: &InjectOptions) -> Result<InjectionReport> {
    let pdb = symbol_path(path);
    let symbols = match options.symbols {
        SymbolPolicy::Auto => Some(pdb.as_path()),
        SymbolPolicy::Ignore => None,
    };

    let mut assembly = CilAssembly::load(path, symbols)?;
    let symbols_stale = options.symbols == SymbolPolicy::Ignore && pdb.is_file();
    log::info!(
        "Loaded {}{}",
        path.display(),
        if assembly.has_symbols() {
            format!(" with symbols from {}", pdb.display())
        } else {
            String::new()
        }
    );

    let method = initializer::inject(&mut assembly, options.verify)?;
    if symbols_stale {
        log::warn!(
            "{} is not rewritten and no longer matches the method tokens of {}",
            pdb.display(),
            path.display()
        );
    }

    let symbols_rewritten = assembly.has_symbols();
    assembly.write(path, symbols_rewritten)?;
    let image_size = std::fs::metadata(path)
        .ok()
        .and_then(|metadata| usize::try_from(metadata.len()).ok())
        .unwrap_or(0);
    log::info!("Wrote {}", path.display());

    Ok(InjectionReport {
        method,
        symbols_rewritten,
        symbols_stale,
        image_size,
    })
}
