//! End-to-end injection on files written to a temporary directory.

mod common;

use common::{assert_round_trip, fixture::FixtureBuilder, read};
use modinit::{
    cilassembly::symbols::PortablePdb, inject_file, CilAssembly, ErrorKind, InjectOptions,
    MetadataGraph, SymbolPolicy,
};

fn initializer_count(image: Vec<u8>) -> usize {
    let assembly = CilAssembly::from_mem(image, None).unwrap();
    let module = assembly.module_type().unwrap();
    assembly
        .methods(module)
        .unwrap()
        .iter()
        .filter(|method| method.name == ".cctor")
        .count()
}

#[test]
fn injects_into_assembly_without_symbols() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new().build().write_to(dir.path(), "App");

    let report = inject_file(&path, &InjectOptions::default()).unwrap();
    assert_eq!(report.method.value(), 0x0600_0002);
    assert!(!report.symbols_rewritten);
    assert_eq!(report.image_size, read(&path).len());
    assert!(!path.with_extension("pdb").exists());

    let image = read(&path);
    assert_eq!(initializer_count(image.clone()), 1);

    let assembly = CilAssembly::from_mem(image, None).unwrap();
    assert_eq!(assembly.cor20().entry_point_token, 0x0600_0003);
}

#[test]
fn existing_methods_keep_names_and_call_targets() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .with_pdb()
        .build()
        .write_to(dir.path(), "App");
    assert_round_trip(&path);

    let path = FixtureBuilder::new().build().write_to(dir.path(), "Plain");
    assert_round_trip(&path);
}

#[test]
fn injects_into_pe32_plus() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .pe32_plus()
        .build()
        .write_to(dir.path(), "App64");

    inject_file(&path, &InjectOptions::default()).unwrap();
    assert_eq!(initializer_count(read(&path)), 1);
}

#[test]
fn rewrites_symbols_next_to_the_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = FixtureBuilder::new().with_pdb().with_pdb_checksum().build();
    let path = fixture.write_to(dir.path(), "App");
    let pdb_path = path.with_extension("pdb");
    let original = PortablePdb::from_mem(&read(&pdb_path)).unwrap();

    let report = inject_file(&path, &InjectOptions::default()).unwrap();
    assert!(report.symbols_rewritten);

    let pdb = PortablePdb::from_mem(&read(&pdb_path)).unwrap();
    assert_eq!(pdb.id(), original.id());
    assert_eq!(pdb.entry_point().value(), 0x0600_0003);
    assert!(pdb.sequence_points(2).is_none());
    assert_eq!(pdb.sequence_points(3), original.sequence_points(2));

    // both files load together again
    let assembly = CilAssembly::from_mem(read(&path), Some(read(&pdb_path))).unwrap();
    assert!(assembly.has_symbols());
}

#[test]
fn ignored_symbols_stay_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .with_pdb()
        .build()
        .write_to(dir.path(), "App");
    let pdb_path = path.with_extension("pdb");
    let pdb_before = read(&pdb_path);

    let options = InjectOptions {
        symbols: SymbolPolicy::Ignore,
        ..InjectOptions::default()
    };
    let report = inject_file(&path, &options).unwrap();
    assert!(!report.symbols_rewritten);
    assert!(report.symbols_stale);
    assert_eq!(read(&pdb_path), pdb_before);

    // the untouched PDB still names the old entry point
    let pdb = PortablePdb::from_mem(&pdb_before).unwrap();
    let assembly = CilAssembly::from_mem(read(&path), None).unwrap();
    assert_eq!(pdb.entry_point().value(), 0x0600_0002);
    assert_eq!(assembly.cor20().entry_point_token, 0x0600_0003);
}

#[test]
fn ignored_symbols_without_pdb_are_not_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new().build().write_to(dir.path(), "App");

    let options = InjectOptions {
        symbols: SymbolPolicy::Ignore,
        ..InjectOptions::default()
    };
    let report = inject_file(&path, &options).unwrap();
    assert!(!report.symbols_stale);
}

#[test]
fn windows_pdb_leaves_both_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new().build().write_to(dir.path(), "App");
    let pdb_path = path.with_extension("pdb");
    let mut msf = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0".to_vec();
    msf.resize(0x400, 0);
    std::fs::write(&pdb_path, &msf).unwrap();
    let image = read(&path);

    let error = inject_file(&path, &InjectOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Load);
    assert!(error.to_string().contains("portable PDB"));
    assert_eq!(read(&path), image);
    assert_eq!(read(&pdb_path), msf);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

    // skipping symbols rewrites the image and reports the PDB as stale
    let options = InjectOptions {
        symbols: SymbolPolicy::Ignore,
        ..InjectOptions::default()
    };
    let report = inject_file(&path, &options).unwrap();
    assert!(report.symbols_stale);
    assert_eq!(read(&pdb_path), msf);
    assert_eq!(initializer_count(read(&path)), 1);
}

#[test]
fn failed_symbol_write_restores_the_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .with_pdb()
        .build()
        .write_to(dir.path(), "App");
    let pdb_path = path.with_extension("pdb");
    let image = read(&path);

    let mut assembly = CilAssembly::load(&path, Some(pdb_path.as_path())).unwrap();
    modinit::initializer::inject(&mut assembly, true).unwrap();

    // a non-empty directory in place of the PDB makes its rename fail
    std::fs::remove_file(&pdb_path).unwrap();
    std::fs::create_dir(&pdb_path).unwrap();
    std::fs::write(pdb_path.join("keep"), b"x").unwrap();

    let error = assembly.write(&path, true).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Write);
    assert_eq!(read(&path), image);
    assert!(pdb_path.join("keep").is_file());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn second_run_fails_and_leaves_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .with_pdb()
        .build()
        .write_to(dir.path(), "App");
    let pdb_path = path.with_extension("pdb");

    inject_file(&path, &InjectOptions::default()).unwrap();
    let image = read(&path);
    let pdb = read(&pdb_path);

    let error = inject_file(&path, &InjectOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DuplicateInitializer);
    assert_eq!(read(&path), image);
    assert_eq!(read(&pdb_path), pdb);
    assert_eq!(initializer_count(image), 1);
}

#[test]
fn existing_initializer_is_a_collision() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .with_module_cctor(0x1891)
        .build()
        .write_to(dir.path(), "App");
    let before = read(&path);

    let error = inject_file(&path, &InjectOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DuplicateInitializer);
    assert_eq!(read(&path), before);
}

#[test]
fn narrower_cctor_is_kept_alongside() {
    let dir = tempfile::tempdir().unwrap();
    // static, no special-name bits
    let path = FixtureBuilder::new()
        .with_module_cctor(0x0011)
        .build()
        .write_to(dir.path(), "App");

    inject_file(&path, &InjectOptions::default()).unwrap();
    assert_eq!(initializer_count(read(&path)), 2);
}

#[test]
fn missing_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let error = inject_file(&dir.path().join("missing.dll"), &InjectOptions::default())
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Load);
}

#[test]
fn native_image_is_rejected_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .without_clr_header()
        .build()
        .write_to(dir.path(), "Native");
    let before = read(&path);

    let error = inject_file(&path, &InjectOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Load);
    assert_eq!(read(&path), before);
}

#[test]
fn certificate_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = FixtureBuilder::new()
        .with_certificate(&[0x30; 40])
        .build()
        .write_to(dir.path(), "Signed");

    inject_file(&path, &InjectOptions::default()).unwrap();
    let image = read(&path);
    let file = modinit::File::from_mem(image.clone()).unwrap();
    let layout = file.layout().unwrap();
    assert_eq!(
        layout.directory(modinit::file::DataDirectoryKind::CertificateTable),
        (0, 0)
    );
    assert_eq!(initializer_count(image), 1);
}
