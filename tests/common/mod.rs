//! Shared helpers for the integration tests.
#![allow(dead_code)]

pub mod fixture;

use std::{path::Path, process::Command};

use modinit::{
    assembly::decode_stream,
    metadata::{
        method::MethodHeader,
        tables::{columns, TableId},
        token::Token,
    },
    inject_mem, CilAssembly, InjectOptions, MetadataGraph, Parser,
};

/// Returns true if `program` can be started from `PATH`.
pub fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .is_ok()
}

/// Read a file that a test expects to exist.
pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|error| panic!("reading {}: {error}", path.display()))
}

/// Every method of `assembly` except `skip`, as `Namespace.Type::Name` followed by the names of
/// the methods its body references and, when symbols are loaded, its sequence point blob.
///
/// Tokens do not appear in the result, so two assemblies that differ only in method numbering
/// describe themselves identically.
pub fn method_shapes(assembly: &CilAssembly, skip: Option<Token>) -> Vec<String> {
    let metadata = assembly.metadata();
    let types = metadata.tables.table(TableId::TypeDef);
    let methods = metadata.tables.table(TableId::MethodDef);
    let string = |index: u32| metadata.strings.get(index as usize).unwrap().to_string();

    let mut owners = vec![String::new(); methods.row_count() as usize + 1];
    for (rid, row) in types.rows() {
        let start = row[columns::typedef::METHOD_LIST];
        let end = types
            .get(rid + 1, columns::typedef::METHOD_LIST)
            .unwrap_or(methods.row_count() + 1);
        let namespace = string(row[columns::typedef::NAMESPACE]);
        let name = string(row[columns::typedef::NAME]);
        for method in start..end {
            owners[method as usize] = if namespace.is_empty() {
                name.clone()
            } else {
                format!("{namespace}.{name}")
            };
        }
    }

    let method_name = |token: Token| -> String {
        match token.table_id() {
            Some(TableId::MethodDef) => format!(
                "{}::{}",
                owners[token.row() as usize],
                string(methods.get(token.row(), columns::methoddef::NAME).unwrap())
            ),
            Some(TableId::MemberRef) => string(
                metadata
                    .tables
                    .table(TableId::MemberRef)
                    .get(token.row(), columns::memberref::NAME)
                    .unwrap(),
            ),
            _ => format!("{:?}", token.table_id()),
        }
    };

    let mut shapes = Vec::new();
    for (rid, row) in methods.rows() {
        let token = Token::new(0x0600_0000 | rid);
        if Some(token) == skip {
            continue;
        }

        let mut shape = method_name(token);
        if row[columns::methoddef::RVA] != 0 {
            let body = assembly.method_body(token).unwrap();
            let header = MethodHeader::from(&body).unwrap();
            let code = &body[header.size_header..header.size_header + header.size_code];
            let calls: Vec<String> = decode_stream(&mut Parser::new(code))
                .unwrap()
                .iter()
                .filter(|instruction| {
                    matches!(instruction.mnemonic, "call" | "callvirt" | "newobj" | "ldftn")
                })
                .filter_map(|instruction| instruction.get_token_operand())
                .map(&method_name)
                .collect();
            shape.push_str(&format!(" -> [{}]", calls.join(", ")));
        }
        if let Some(pdb) = assembly.symbols() {
            shape.push_str(&format!(" {:02x?}", pdb.sequence_points(rid)));
        }
        shapes.push(shape);
    }
    shapes
}

/// Inject into the assembly at `path` in memory, read the result back and compare every method
/// that existed before with its new counterpart.
pub fn assert_round_trip(path: &Path) {
    let pdb_path = path.with_extension("pdb");
    let symbols = pdb_path.is_file().then(|| read(&pdb_path));
    let image = read(path);

    let before = CilAssembly::from_mem(image.clone(), symbols.clone()).unwrap();
    let expected = method_shapes(&before, None);

    let injected = inject_mem(image, symbols, &InjectOptions::default()).unwrap();
    assert_eq!(injected.symbols.is_some(), pdb_path.is_file());

    let after = CilAssembly::from_mem(injected.image, injected.symbols).unwrap();
    assert_eq!(
        method_shapes(&after, Some(injected.method)),
        expected,
        "{}",
        path.display()
    );

    let module = after.module_type().unwrap();
    let cctors: Vec<_> = after
        .methods(module)
        .unwrap()
        .into_iter()
        .filter(|method| method.name == ".cctor")
        .collect();
    assert_eq!(cctors.len(), 1, "{}", path.display());
    assert_eq!(cctors[0].token, injected.method);
    assert_eq!(cctors[0].flags, 0x1891);

    // the entry point still names the same method
    let entry = |assembly: &CilAssembly| {
        let shapes = method_shapes(assembly, None);
        assembly
            .cor20()
            .entry_point()
            .map(|token| shapes[token.row() as usize - 1].clone())
    };
    assert_eq!(entry(&after), entry(&before));
}
