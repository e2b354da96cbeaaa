mod app;
mod inject;

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use crate::app::Cli;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn main() -> anyhow::Result<()> {
    // exit only after the run has dropped or persisted its temporary files
    ctrlc::set_handler(|| {
        eprintln!("\nCancelling...");
        INTERRUPTED.store(true, Ordering::SeqCst);
    })?;

    let cli = Cli::parse();

    // modinit info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("modinit", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let result = inject::run(&cli, &INTERRUPTED);
    if INTERRUPTED.load(Ordering::SeqCst) {
        if let Err(error) = &result {
            eprintln!("Error: {error:?}");
        }
        eprintln!("Cancelled.");
        std::process::exit(130);
    }
    result
}
