//! Structural round trips over compiler-produced assemblies.
//!
//! Every `.exe` and `.dll` under `tests/samples/` is injected in memory (together with its
//! `.pdb` when one sits next to it) and read back. All methods that existed before must keep
//! their names, owners, call targets and sequence points; only their tokens move.

mod common;

use std::path::{Path, PathBuf};

use common::assert_round_trip;

fn samples() -> Vec<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/samples");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut samples: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|extension| extension == "exe" || extension == "dll")
        })
        .collect();
    samples.sort();
    samples
}

#[test]
fn committed_samples_round_trip() {
    let samples = samples();
    if samples.is_empty() {
        eprintln!("no assemblies under tests/samples, skipping");
        return;
    }
    for sample in samples {
        assert_round_trip(&sample);
    }
}
