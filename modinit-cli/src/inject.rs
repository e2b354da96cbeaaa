use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context};
use modinit::{inject_file, InjectOptions, InjectionReport, SymbolPolicy};

use crate::app::Cli;

/// Map the command line onto library options.
pub fn options(cli: &Cli) -> InjectOptions {
    InjectOptions {
        symbols: if cli.no_symbols {
            SymbolPolicy::Ignore
        } else {
            SymbolPolicy::Auto
        },
        ..InjectOptions::default()
    }
}

/// One-line outcome printed on success.
pub fn summary(report: &InjectionReport) -> String {
    let symbols = if report.symbols_rewritten {
        "symbols rewritten"
    } else if report.symbols_stale {
        "symbols left stale"
    } else {
        "no symbols"
    };
    format!(
        "injected .cctor {} into <Module> ({symbols})",
        report.method
    )
}

/// Inject into the assembly named on the command line.
///
/// `interrupted` is set by the Ctrl-C handler. It is checked before the assembly is touched; once
/// writing has started the run completes (or rolls back) so no temporary files are left behind.
pub fn run(cli: &Cli, interrupted: &AtomicBool) -> anyhow::Result<()> {
    if interrupted.load(Ordering::SeqCst) {
        bail!("cancelled before {} was read", cli.assembly.display());
    }

    let report = inject_file(&cli.assembly, &options(cli))
        .with_context(|| format!("failed to inject into {}", cli.assembly.display()))?;
    println!("{}", summary(&report));
    Ok(())
}
