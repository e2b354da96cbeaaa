use std::path::PathBuf;

use clap::Parser;

/// modinit - add a module initializer to a compiled .NET assembly
///
/// The assembly is rewritten in place. Its `.pdb` is rewritten alongside when one exists.
#[derive(Debug, Parser)]
#[command(name = "modinit", version, about, long_about = None)]
pub struct Cli {
    /// Path to the .NET assembly to rewrite.
    #[arg(short, long, value_name = "FILE")]
    pub assembly: PathBuf,

    /// Leave the companion .pdb alone, even if it exists.
    #[arg(long)]
    pub no_symbols: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}
