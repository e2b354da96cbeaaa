//! Minimal managed images and portable PDBs, built byte by byte.
//!
//! The image has one `.text` section holding the CLI header, two method bodies, the metadata
//! and an optional debug directory:
//!
//! ```text
//! TypeDef 1  <Module>          MethodDef 1  Helper  static void ()   ret
//! TypeDef 2  App.Program       MethodDef 2  Main    static void ()   call Helper; ldftn Main; pop; ret
//! TypeRef 1  System.Object     -> AssemblyRef 1 (System.Runtime)
//! ```
//!
//! `Main` is the entry point. The PDB has one document; `Main` has sequence points, `Helper`
//! has none. Only `std` is used so the builder can be shared by unit and integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

const FILE_ALIGNMENT: u32 = 0x200;
const SECTION_ALIGNMENT: u32 = 0x2000;
const SIZE_OF_HEADERS: u32 = 0x200;
const PE_OFFSET: usize = 0x80;

const TEXT_CHARACTERISTICS: u32 = 0x6000_0020;
const DATA_CHARACTERISTICS: u32 = 0x4000_0040;

const COR20_SIZE: usize = 72;
const DEBUG_ENTRY_SIZE: usize = 28;

/// Mask of the tables a compiler marks as sorted
const SORTED_TABLES: u64 = 0x0000_1600_3301_FA00;
/// `LocalScope`, `StateMachineMethod`, `CustomDebugInformation`
const PDB_SORTED_TABLES: u64 = (1 << 0x32) | (1 << 0x36) | (1 << 0x37);

/// SHA-256 document hash algorithm
const SHA256_GUID: [u8; 16] = [
    0x7F, 0x9B, 0x8B, 0x8B, 0x8F, 0xFA, 0x9D, 0x4A, 0x9E, 0x2B, 0x16, 0x6F, 0x7D, 0x5C, 0x8E, 0x2E,
];
/// C# language
const CSHARP_GUID: [u8; 16] = [
    0xF4, 0x12, 0xB3, 0x3F, 0x3B, 0xD9, 0x18, 0x4E, 0x8D, 0x4A, 0xB3, 0x50, 0xA0, 0xA0, 0x9D, 0x39,
];

/// `ret`
const HELPER_CODE: [u8; 1] = [0x2A];
/// `call 0x06000001; ldftn 0x06000002; pop; ret`
const MAIN_CODE: [u8; 13] = [
    0x28, 0x01, 0x00, 0x00, 0x06, 0xFE, 0x06, 0x02, 0x00, 0x00, 0x06, 0x26, 0x2A,
];

/// The output of [`FixtureBuilder::build`].
#[derive(Debug, Clone)]
pub struct Fixture {
    /// The complete PE image
    pub image: Vec<u8>,
    /// The image metadata on its own, as embedded in `image`
    pub metadata: Vec<u8>,
    /// The portable PDB, if requested
    pub pdb: Option<Vec<u8>>,
    /// PDB id of `pdb` and of the CodeView record
    pub pdb_id: [u8; 20],
}

impl Fixture {
    /// Write the image (and the PDB, if any) as `<dir>/<name>.dll` and return the image path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(format!("{name}.dll"));
        std::fs::write(&path, &self.image).unwrap();
        if let Some(pdb) = &self.pdb {
            std::fs::write(path.with_extension("pdb"), pdb).unwrap();
        }
        path
    }
}

/// Builder for [`Fixture`] variants.
#[derive(Debug, Clone)]
pub struct FixtureBuilder {
    pe32_plus: bool,
    clr_header: bool,
    user_strings: bool,
    pdb: bool,
    pdb_checksum: bool,
    core_library: String,
    object_reference: bool,
    full_section_table: bool,
    tight_headers: bool,
    certificate: Option<Vec<u8>>,
    strong_name: bool,
    module_cctor: Option<u16>,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureBuilder {
    pub fn new() -> Self {
        FixtureBuilder {
            pe32_plus: false,
            clr_header: true,
            user_strings: true,
            pdb: false,
            pdb_checksum: false,
            core_library: "System.Runtime".to_string(),
            object_reference: true,
            full_section_table: false,
            tight_headers: false,
            certificate: None,
            strong_name: false,
            module_cctor: None,
        }
    }

    /// PE32+ optional header (x64)
    pub fn pe32_plus(mut self) -> Self {
        self.pe32_plus = true;
        self
    }

    /// Zero the CLI header data directory
    pub fn without_clr_header(mut self) -> Self {
        self.clr_header = false;
        self
    }

    /// Leave out the `#US` stream
    pub fn without_user_strings(mut self) -> Self {
        self.user_strings = false;
        self
    }

    /// Build a portable PDB and a matching CodeView debug entry
    pub fn with_pdb(mut self) -> Self {
        self.pdb = true;
        self
    }

    /// Add a `PdbChecksum` debug entry
    pub fn with_pdb_checksum(mut self) -> Self {
        self.pdb_checksum = true;
        self
    }

    /// Name of the single `AssemblyRef`
    pub fn core_library(mut self, name: &str) -> Self {
        self.core_library = name.to_string();
        self
    }

    /// No `System.Object` type reference; `Program` extends nothing
    pub fn without_object_reference(mut self) -> Self {
        self.object_reference = false;
        self
    }

    /// Fill the header area so another section header does not fit
    pub fn full_section_table(mut self) -> Self {
        self.full_section_table = true;
        self
    }

    /// Map sections directly behind the headers, leaving no room to grow them
    pub fn tight_headers(mut self) -> Self {
        self.tight_headers = true;
        self
    }

    /// Append an Authenticode certificate table carrying `payload`
    pub fn with_certificate(mut self, payload: &[u8]) -> Self {
        self.certificate = Some(payload.to_vec());
        self
    }

    /// Set `COMIMAGE_FLAGS_STRONGNAMESIGNED`
    pub fn strong_name_signed(mut self) -> Self {
        self.strong_name = true;
        self
    }

    /// Name `Helper` `.cctor` instead and give it `flags`
    pub fn with_module_cctor(mut self, flags: u16) -> Self {
        self.module_cctor = Some(flags);
        self
    }

    pub fn build(&self) -> Fixture {
        let section_alignment = if self.tight_headers {
            FILE_ALIGNMENT
        } else {
            SECTION_ALIGNMENT
        };
        let text_rva = if self.tight_headers {
            SIZE_OF_HEADERS
        } else {
            SECTION_ALIGNMENT
        };

        let pdb_id = pdb_id();

        // .text: CLI header, bodies, metadata, debug directory and its data
        let mut text = vec![0u8; COR20_SIZE];

        let helper_rva = text_rva + text.len() as u32;
        text.push(tiny_header(HELPER_CODE.len()));
        text.extend_from_slice(&HELPER_CODE);
        align(&mut text, 4);

        let main_rva = text_rva + text.len() as u32;
        text.push(tiny_header(MAIN_CODE.len()));
        text.extend_from_slice(&MAIN_CODE);
        align(&mut text, 4);

        let metadata = self.image_metadata(helper_rva, main_rva);
        let metadata_rva = text_rva + text.len() as u32;
        text.extend_from_slice(&metadata);
        align(&mut text, 4);

        let mut debug_kinds = Vec::new();
        if self.pdb {
            debug_kinds.push(2u32);
        }
        if self.pdb_checksum {
            debug_kinds.push(19u32);
        }
        let debug_offset = text.len();
        let debug_size = debug_kinds.len() * DEBUG_ENTRY_SIZE;
        text.resize(debug_offset + debug_size, 0);
        for (index, kind) in debug_kinds.iter().enumerate() {
            let data: Vec<u8> = if *kind == 2 {
                let mut record = b"RSDS".to_vec();
                record.extend_from_slice(&pdb_id[..16]);
                record.extend_from_slice(&1u32.to_le_bytes());
                record.extend_from_slice(b"App.pdb\0");
                record
            } else {
                let mut record = b"SHA256\0".to_vec();
                record.extend_from_slice(&[0u8; 32]);
                record
            };
            let data_offset = text.len();
            text.extend_from_slice(&data);
            align(&mut text, 4);

            let entry = &mut text[debug_offset + index * DEBUG_ENTRY_SIZE..][..DEBUG_ENTRY_SIZE];
            put(entry, 4, &pdb_id[16..20]);
            if *kind == 2 {
                put(entry, 8, &0x0100u16.to_le_bytes());
                put(entry, 10, &0x504Du16.to_le_bytes());
            } else {
                put(entry, 8, &1u16.to_le_bytes());
            }
            put(entry, 12, &kind.to_le_bytes());
            put(entry, 16, &(data.len() as u32).to_le_bytes());
            put(entry, 20, &(text_rva + data_offset as u32).to_le_bytes());
            put(entry, 24, &(SIZE_OF_HEADERS + data_offset as u32).to_le_bytes());
        }

        let mut flags = 0x0000_0001u32;
        if self.strong_name {
            flags |= 0x0000_0008;
        }
        let cor20 = &mut text[..COR20_SIZE];
        put(cor20, 0, &(COR20_SIZE as u32).to_le_bytes());
        put(cor20, 4, &2u16.to_le_bytes());
        put(cor20, 6, &5u16.to_le_bytes());
        put(cor20, 8, &metadata_rva.to_le_bytes());
        put(cor20, 12, &(metadata.len() as u32).to_le_bytes());
        put(cor20, 16, &flags.to_le_bytes());
        put(cor20, 20, &0x0600_0002u32.to_le_bytes());

        let mut sections = vec![Section {
            name: *b".text\0\0\0",
            data: text,
            characteristics: TEXT_CHARACTERISTICS,
        }];
        if self.full_section_table {
            for name in [*b".sdata\0\0", *b".rsrc\0\0\0"] {
                sections.push(Section {
                    name,
                    data: vec![0x5A; 0x10],
                    characteristics: DATA_CHARACTERISTICS,
                });
            }
        }

        let directories = Directories {
            clr: if self.clr_header {
                (text_rva, COR20_SIZE as u32)
            } else {
                (0, 0)
            },
            debug: if debug_size > 0 {
                (text_rva + debug_offset as u32, debug_size as u32)
            } else {
                (0, 0)
            },
        };

        let mut image = self.pe_image(&sections, text_rva, section_alignment, &directories);

        if let Some(payload) = &self.certificate {
            let offset = image.len() as u32;
            let mut table = Vec::new();
            table.extend_from_slice(&(8 + payload.len() as u32).to_le_bytes());
            table.extend_from_slice(&0x0200u16.to_le_bytes());
            table.extend_from_slice(&0x0002u16.to_le_bytes());
            table.extend_from_slice(payload);
            align(&mut table, 8);

            let entry = self.directory_offset() + 4 * 8;
            put(&mut image, entry, &offset.to_le_bytes());
            put(&mut image, entry + 4, &(table.len() as u32).to_le_bytes());
            image.extend_from_slice(&table);
        }

        let pdb = self.pdb.then(|| self.portable_pdb(&pdb_id));

        Fixture {
            image,
            metadata,
            pdb,
            pdb_id,
        }
    }

    fn directory_offset(&self) -> usize {
        PE_OFFSET + 24 + if self.pe32_plus { 112 } else { 96 }
    }

    fn pe_image(
        &self,
        sections: &[Section],
        first_rva: u32,
        section_alignment: u32,
        directories: &Directories,
    ) -> Vec<u8> {
        let optional_size: usize = if self.pe32_plus { 0xF0 } else { 0xE0 };
        let mut image = vec![0u8; SIZE_OF_HEADERS as usize];

        // DOS header
        put(&mut image, 0, b"MZ");
        put(&mut image, 0x3C, &(PE_OFFSET as u32).to_le_bytes());

        // PE signature and COFF header
        put(&mut image, PE_OFFSET, b"PE\0\0");
        let coff = PE_OFFSET + 4;
        let machine: u16 = if self.pe32_plus { 0x8664 } else { 0x014C };
        let characteristics: u16 = if self.pe32_plus { 0x0022 } else { 0x0102 };
        put(&mut image, coff, &machine.to_le_bytes());
        put(&mut image, coff + 2, &(sections.len() as u16).to_le_bytes());
        put(&mut image, coff + 4, &0x6500_0000u32.to_le_bytes());
        put(&mut image, coff + 16, &(optional_size as u16).to_le_bytes());
        put(&mut image, coff + 18, &characteristics.to_le_bytes());

        // Section placement
        let mut rva = first_rva;
        let mut pointer = SIZE_OF_HEADERS;
        let mut headers = Vec::new();
        for section in sections {
            let raw_size = align_u32(section.data.len() as u32, FILE_ALIGNMENT);
            headers.push((rva, pointer, raw_size));
            rva = align_u32(rva + section.data.len() as u32, section_alignment);
            pointer += raw_size;
        }
        let size_of_image = rva;
        let size_of_code = headers[0].2;
        let size_of_initialized_data: u32 = headers.iter().skip(1).map(|(_, _, raw)| raw).sum();

        // Optional header
        let optional = PE_OFFSET + 24;
        let magic: u16 = if self.pe32_plus { 0x020B } else { 0x010B };
        put(&mut image, optional, &magic.to_le_bytes());
        image[optional + 2] = 48;
        put(&mut image, optional + 4, &size_of_code.to_le_bytes());
        put(&mut image, optional + 8, &size_of_initialized_data.to_le_bytes());
        put(&mut image, optional + 20, &first_rva.to_le_bytes());
        if self.pe32_plus {
            put(&mut image, optional + 24, &0x1_4000_0000u64.to_le_bytes());
        } else {
            put(&mut image, optional + 28, &0x0040_0000u32.to_le_bytes());
        }
        put(&mut image, optional + 32, &section_alignment.to_le_bytes());
        put(&mut image, optional + 36, &FILE_ALIGNMENT.to_le_bytes());
        put(&mut image, optional + 40, &4u16.to_le_bytes());
        put(&mut image, optional + 48, &4u16.to_le_bytes());
        put(&mut image, optional + 56, &size_of_image.to_le_bytes());
        put(&mut image, optional + 60, &SIZE_OF_HEADERS.to_le_bytes());
        put(&mut image, optional + 68, &3u16.to_le_bytes());
        put(&mut image, optional + 70, &0x8560u16.to_le_bytes());
        if self.pe32_plus {
            put(&mut image, optional + 72, &0x40_0000u64.to_le_bytes());
            put(&mut image, optional + 80, &0x4000u64.to_le_bytes());
            put(&mut image, optional + 88, &0x10_0000u64.to_le_bytes());
            put(&mut image, optional + 96, &0x2000u64.to_le_bytes());
            put(&mut image, optional + 108, &16u32.to_le_bytes());
        } else {
            put(&mut image, optional + 72, &0x10_0000u32.to_le_bytes());
            put(&mut image, optional + 76, &0x1000u32.to_le_bytes());
            put(&mut image, optional + 80, &0x10_0000u32.to_le_bytes());
            put(&mut image, optional + 84, &0x1000u32.to_le_bytes());
            put(&mut image, optional + 92, &16u32.to_le_bytes());
        }

        let directory = self.directory_offset();
        put(&mut image, directory + 6 * 8, &directories.debug.0.to_le_bytes());
        put(&mut image, directory + 6 * 8 + 4, &directories.debug.1.to_le_bytes());
        put(&mut image, directory + 14 * 8, &directories.clr.0.to_le_bytes());
        put(&mut image, directory + 14 * 8 + 4, &directories.clr.1.to_le_bytes());

        // Section table
        let table = optional + optional_size;
        for (index, (section, (rva, pointer, raw_size))) in
            sections.iter().zip(&headers).enumerate()
        {
            let entry = table + index * 40;
            put(&mut image, entry, &section.name);
            put(&mut image, entry + 8, &(section.data.len() as u32).to_le_bytes());
            put(&mut image, entry + 12, &rva.to_le_bytes());
            put(&mut image, entry + 16, &raw_size.to_le_bytes());
            put(&mut image, entry + 20, &pointer.to_le_bytes());
            put(&mut image, entry + 36, &section.characteristics.to_le_bytes());
        }

        for section in sections {
            let start = image.len();
            image.extend_from_slice(&section.data);
            image.resize(start + align_u32(section.data.len() as u32, FILE_ALIGNMENT) as usize, 0);
        }
        image
    }

    fn image_metadata(&self, helper_rva: u32, main_rva: u32) -> Vec<u8> {
        let mut strings = Heap::strings();
        let mut blobs = Heap::blobs();

        let module_name = strings.string("App.dll");
        let module_type = strings.string("<Module>");
        let program = strings.string("Program");
        let app = strings.string("App");
        let helper = strings.string(if self.module_cctor.is_some() {
            ".cctor"
        } else {
            "Helper"
        });
        let main = strings.string("Main");
        let core_library = strings.string(&self.core_library);
        let object = strings.string("Object");
        let system = strings.string("System");
        let signature = blobs.blob(&[0x00, 0x00, 0x01]);

        let mut guids = Vec::new();
        guids.extend_from_slice(&[
            0x3D, 0x6C, 0x2B, 0x41, 0x8E, 0x0F, 0x4B, 0x4C, 0x9A, 0x51, 0x3C, 0x7A, 0x22, 0x6E,
            0x10, 0x01,
        ]);

        let mut user_strings = vec![0u8];
        let hello: Vec<u8> = "Hello".encode_utf16().flat_map(u16::to_le_bytes).collect();
        user_strings.push(hello.len() as u8 + 1);
        user_strings.extend_from_slice(&hello);
        user_strings.push(0);

        let type_refs = usize::from(self.object_reference);
        let mut tables = TableWriter::new();
        // Module
        tables.table(0x00, 1, |t| {
            t.u16(0);
            t.u16(module_name);
            t.u16(1);
            t.u16(0);
            t.u16(0);
        });
        // TypeRef
        tables.table(0x01, type_refs as u32, |t| {
            t.u16((1 << 2) | 2);
            t.u16(object);
            t.u16(system);
        });
        // TypeDef
        tables.table(0x02, 2, |t| {
            t.u32(0);
            t.u16(module_type);
            t.u16(0);
            t.u16(0);
            t.u16(1);
            t.u16(1);
        });
        tables.row(0x02, |t| {
            t.u32(0x0010_0001);
            t.u16(program);
            t.u16(app);
            t.u16(if type_refs > 0 { (1 << 2) | 1 } else { 0 });
            t.u16(1);
            t.u16(2);
        });
        // MethodDef
        tables.table(0x06, 2, |t| {
            t.u32(helper_rva);
            t.u16(0);
            t.u16(self.module_cctor.unwrap_or(0x0091));
            t.u16(helper);
            t.u16(signature);
            t.u16(1);
        });
        tables.row(0x06, |t| {
            t.u32(main_rva);
            t.u16(0);
            t.u16(0x0096);
            t.u16(main);
            t.u16(signature);
            t.u16(1);
        });
        // Assembly
        tables.table(0x20, 1, |t| {
            t.u32(0x8004);
            t.u16(1);
            t.u16(0);
            t.u16(0);
            t.u16(0);
            t.u32(0);
            t.u16(0);
            t.u16(app);
            t.u16(0);
        });
        // AssemblyRef
        tables.table(0x23, 1, |t| {
            t.u16(8);
            t.u16(0);
            t.u16(0);
            t.u16(0);
            t.u32(0);
            t.u16(0);
            t.u16(core_library);
            t.u16(0);
            t.u16(0);
        });

        let mut streams: Vec<(&str, Vec<u8>)> = vec![
            ("#~", tables.finish(SORTED_TABLES)),
            ("#Strings", strings.data),
        ];
        if self.user_strings {
            streams.push(("#US", user_strings));
        }
        streams.push(("#GUID", guids));
        streams.push(("#Blob", blobs.data));

        metadata_root("v4.0.30319", &streams)
    }

    fn portable_pdb(&self, pdb_id: &[u8; 20]) -> Vec<u8> {
        let mut blobs = Heap::blobs();
        let part = blobs.blob(b"Program.cs");
        let name = blobs.blob(&[b'/', part as u8]);
        // no local signature, one sequence point: IL 0, line 5 col 9..10
        let sequence_points = blobs.blob(&[0x00, 0x00, 0x00, 0x01, 0x05, 0x09]);

        let mut guids = Vec::new();
        guids.extend_from_slice(&SHA256_GUID);
        guids.extend_from_slice(&CSHARP_GUID);

        let mut tables = TableWriter::new();
        // Document
        tables.table(0x30, 1, |t| {
            t.u16(name);
            t.u16(1);
            t.u16(0);
            t.u16(2);
        });
        // MethodDebugInformation
        tables.table(0x31, 2, |t| {
            t.u16(0);
            t.u16(0);
        });
        tables.row(0x31, |t| {
            t.u16(1);
            t.u16(sequence_points);
        });

        let mut pdb_stream = pdb_id.to_vec();
        pdb_stream.extend_from_slice(&0x0600_0002u32.to_le_bytes());
        let type_refs = u32::from(self.object_reference);
        let referenced: [(u32, u32); 6] = [
            (0x00, 1),
            (0x01, type_refs),
            (0x02, 2),
            (0x06, 2),
            (0x20, 1),
            (0x23, 1),
        ];
        let mask = referenced
            .iter()
            .filter(|(_, rows)| *rows > 0)
            .fold(0u64, |mask, (table, _)| mask | (1 << table));
        pdb_stream.extend_from_slice(&mask.to_le_bytes());
        for (_, rows) in referenced.iter().filter(|(_, rows)| *rows > 0) {
            pdb_stream.extend_from_slice(&rows.to_le_bytes());
        }

        let streams: Vec<(&str, Vec<u8>)> = vec![
            ("#Pdb", pdb_stream),
            ("#~", tables.finish(PDB_SORTED_TABLES)),
            ("#Strings", vec![0]),
            ("#US", vec![0]),
            ("#GUID", guids),
            ("#Blob", blobs.data),
        ];
        metadata_root("PDB v1.0", &streams)
    }
}

struct Section {
    name: [u8; 8],
    data: Vec<u8>,
    characteristics: u32,
}

struct Directories {
    clr: (u32, u32),
    debug: (u32, u32),
}

/// `#Strings` or `#Blob` heap with 2-byte indexes.
struct Heap {
    data: Vec<u8>,
}

impl Heap {
    fn strings() -> Self {
        Heap { data: vec![0] }
    }

    fn blobs() -> Self {
        Heap { data: vec![0] }
    }

    fn string(&mut self, value: &str) -> u16 {
        let offset = self.data.len() as u16;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        offset
    }

    fn blob(&mut self, value: &[u8]) -> u16 {
        let offset = self.data.len() as u16;
        self.data.push(value.len() as u8);
        self.data.extend_from_slice(value);
        offset
    }
}

/// `#~` stream with small heaps and 2-byte indexes.
struct TableWriter {
    rows: Vec<(u8, u32, Vec<u8>)>,
}

/// Row bytes of one table
struct RowWriter<'a> {
    out: &'a mut Vec<u8>,
}

impl RowWriter<'_> {
    fn u16(&mut self, value: u16) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }
}

impl TableWriter {
    fn new() -> Self {
        TableWriter { rows: Vec::new() }
    }

    /// Declare table `id` with `count` rows and write the first one.
    fn table(&mut self, id: u8, count: u32, first: impl FnOnce(&mut RowWriter)) {
        let mut out = Vec::new();
        if count > 0 {
            first(&mut RowWriter { out: &mut out });
        }
        self.rows.push((id, count, out));
    }

    /// Write another row of the table declared last with `id`.
    fn row(&mut self, id: u8, row: impl FnOnce(&mut RowWriter)) {
        if let Some((_, _, out)) = self.rows.iter_mut().rev().find(|(table, _, _)| *table == id) {
            row(&mut RowWriter { out });
        }
    }

    fn finish(mut self, sorted: u64) -> Vec<u8> {
        self.rows.retain(|(_, count, _)| *count > 0);
        self.rows.sort_by_key(|(id, _, _)| *id);

        let valid = self.rows.iter().fold(0u64, |mask, (id, _, _)| mask | (1 << id));
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&[2, 0, 0, 1]);
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&sorted.to_le_bytes());
        for (_, count, _) in &self.rows {
            out.extend_from_slice(&count.to_le_bytes());
        }
        for (_, _, rows) in &self.rows {
            out.extend_from_slice(rows);
        }
        align(&mut out, 4);
        out
    }
}

fn metadata_root(version: &str, streams: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut version = version.as_bytes().to_vec();
    version.push(0);
    align(&mut version, 4);

    let directory_size: usize = streams
        .iter()
        .map(|(name, _)| 8 + align_usize(name.len() + 1, 4))
        .sum();
    let mut offset = 20 + version.len() + directory_size;

    let mut out = Vec::new();
    out.extend_from_slice(&0x424A_5342u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(version.len() as u32).to_le_bytes());
    out.extend_from_slice(&version);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(streams.len() as u16).to_le_bytes());
    for (name, data) in streams {
        let size = align_usize(data.len(), 4);
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        out.extend_from_slice(&(size as u32).to_le_bytes());
        let mut name = name.as_bytes().to_vec();
        name.push(0);
        align(&mut name, 4);
        out.extend_from_slice(&name);
        offset += size;
    }
    for (_, data) in streams {
        out.extend_from_slice(data);
        align(&mut out, 4);
    }
    out
}

fn pdb_id() -> [u8; 20] {
    let mut id = [0u8; 20];
    for (index, byte) in id.iter_mut().enumerate() {
        *byte = 0xA0 + index as u8;
    }
    id
}

fn tiny_header(code_size: usize) -> u8 {
    ((code_size as u8) << 2) | 0x02
}

fn put(out: &mut [u8], offset: usize, bytes: &[u8]) {
    out[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn align(data: &mut Vec<u8>, alignment: usize) {
    data.resize(align_usize(data.len(), alignment), 0);
}

fn align_usize(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

fn align_u32(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
