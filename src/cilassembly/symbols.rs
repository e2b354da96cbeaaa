//! Portable PDB symbol files.
//!
//! A portable PDB is an ECMA-335 metadata blob with a `#Pdb` stream and the debug tables
//! (`0x30..=0x37`). Its `MethodDebugInformation` table is parallel to the image's `MethodDef`
//! table, and `LocalScope`, `StateMachineMethod` and `CustomDebugInformation` name image methods
//! by row, so every `MethodDef` move in the image has to be mirrored here. The table part of that
//! is done by [`crate::cilassembly::remapping::insert_method_row`]; this module covers the rest:
//! the `#Pdb` entry point, the `#Pdb` row counts and the method rows inside async stepping blobs.
//!
//! The 20-byte PDB id is preserved, so the image's CodeView record still links to the file.

use sha2::{Digest, Sha256};

use crate::{
    cilassembly::{remapping::RowMap, streams::MetadataStreams},
    file::{io::push_compressed_uint, parser::Parser},
    metadata::{
        root::Root,
        streams::{TablesHeader, PDB_ID_SIZE},
        tables::{TableId, TABLE_SLOTS},
        token::Token,
    },
    Error, Result,
};

/// Signature at the start of a Windows (MSF) PDB.
const MSF_SIGNATURE: &[u8] = b"Microsoft C/C++ MSF 7.00";

/// `CustomDebugInformation` kind of async stepping information,
/// `54FD2AC5-E925-401A-9C2A-F94F171072F8` in on-disk byte order.
pub const ASYNC_METHOD_STEPPING_INFORMATION: [u8; 16] = [
    0xC5, 0x2A, 0xFD, 0x54, 0x25, 0xE9, 0x1A, 0x40, 0x9C, 0x2A, 0xF9, 0x4F, 0x17, 0x10, 0x72, 0xF8,
];

/// A loaded portable PDB.
#[derive(Debug, Clone)]
pub struct PortablePdb {
    metadata: MetadataStreams,
}

impl PortablePdb {
    /// Parse a portable PDB.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] for empty input, [`Error::NotSupported`] for Windows PDBs, and
    /// [`crate::Error::Malformed`] if the metadata has no `#Pdb` stream.
    pub fn from_mem(data: &[u8]) -> Result<PortablePdb> {
        if data.is_empty() {
            return Err(Error::Empty);
        }
        if data.starts_with(MSF_SIGNATURE) {
            return Err(Error::NotSupported(
                "Windows PDB symbols cannot be rewritten; convert them to a portable PDB or leave \
                 symbols out"
                    .to_string(),
            ));
        }

        let metadata = MetadataStreams::read(data)?;
        if metadata.pdb.is_none() {
            return Err(malformed_error!("Symbol file has no #Pdb stream"));
        }

        Ok(PortablePdb { metadata })
    }

    /// PDB id (GUID and stamp).
    #[must_use]
    pub fn id(&self) -> [u8; PDB_ID_SIZE] {
        self.metadata
            .pdb
            .as_ref()
            .map_or([0; PDB_ID_SIZE], |pdb| pdb.id)
    }

    /// Entry point recorded in `#Pdb`.
    #[must_use]
    pub fn entry_point(&self) -> Token {
        self.metadata
            .pdb
            .as_ref()
            .map_or(Token::new(0), |pdb| pdb.entry_point)
    }

    /// The debug tables.
    #[must_use]
    pub fn tables(&self) -> &TablesHeader {
        &self.metadata.tables
    }

    /// Mutable debug tables, for row insertion and remapping.
    pub fn tables_mut(&mut self) -> &mut TablesHeader {
        &mut self.metadata.tables
    }

    /// Sequence point blob of method `rid`, `None` for methods without one.
    #[must_use]
    pub fn sequence_points(&self, rid: u32) -> Option<&[u8]> {
        let offset = self
            .metadata
            .tables
            .table(TableId::MethodDebugInformation)
            .get(rid, 1)?;
        if offset == 0 {
            return None;
        }
        self.metadata.blobs.get(offset as usize).ok()
    }

    /// Follow a `MethodDef` renumbering outside the tables: the entry point and the resume
    /// methods of async stepping blobs.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a stepping blob is truncated.
    pub fn remap_methods(&mut self, map: &RowMap) -> Result<()> {
        if let Some(pdb) = self.metadata.pdb.as_mut() {
            pdb.entry_point = map.map_token(TableId::MethodDef, pdb.entry_point);
        }

        let Some(guids) = self.metadata.guids.as_ref() else {
            return Ok(());
        };
        let kinds: Vec<(u32, u32)> = self
            .metadata
            .tables
            .table(TableId::CustomDebugInformation)
            .rows()
            .filter(|(_, row)| {
                guids
                    .get(row[1] as usize)
                    .is_ok_and(|kind| kind == ASYNC_METHOD_STEPPING_INFORMATION)
            })
            .map(|(rid, row)| (rid, row[2]))
            .collect();

        for (rid, value) in kinds {
            let blob = self.metadata.blobs.get(value as usize)?;
            let patched = remap_async_stepping(blob, map)?;
            if patched != blob {
                let offset = self.metadata.blobs.add(&patched)?;
                self.metadata
                    .tables
                    .table_mut(TableId::CustomDebugInformation)
                    .set(rid, 2, offset)?;
            }
        }
        Ok(())
    }

    /// Serialize the PDB for an image whose tables now have `image_rows` rows.
    ///
    /// # Errors
    /// Returns an error if the metadata cannot be laid out.
    pub fn to_bytes(&mut self, image_rows: &[u32; TABLE_SLOTS]) -> Result<Vec<u8>> {
        if let Some(pdb) = self.metadata.pdb.as_mut() {
            pdb.set_type_system_rows(image_rows);
        }
        self.metadata.write()
    }
}

/// SHA-256 of a serialized PDB with its PDB id zeroed, as stored in a `PdbChecksum` debug
/// directory entry.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `pdb` has no `#Pdb` stream.
pub fn pdb_checksum(pdb: &[u8]) -> Result<[u8; 32]> {
    let root = Root::read(pdb)?;
    let stream = root
        .stream("#Pdb")
        .ok_or_else(|| malformed_error!("Symbol file has no #Pdb stream"))?;
    let id_start = stream.offset as usize;
    let id_end = id_start + PDB_ID_SIZE;
    if id_end > pdb.len() {
        return Err(out_of_bounds_error!());
    }

    let mut hasher = Sha256::new();
    hasher.update(&pdb[..id_start]);
    hasher.update([0u8; PDB_ID_SIZE]);
    hasher.update(&pdb[id_end..]);
    Ok(hasher.finalize().into())
}

/// Rewrite the resume method rows of an async stepping blob.
///
/// ```text
/// u32 catch handler offset
/// repeated: u32 yield offset, u32 resume offset, compressed MethodDef row
/// ```
fn remap_async_stepping(blob: &[u8], map: &RowMap) -> Result<Vec<u8>> {
    let mut parser = Parser::new(blob);
    let mut out = Vec::with_capacity(blob.len() + 4);
    out.extend_from_slice(parser.read_bytes(4)?);

    while parser.has_more_data() {
        out.extend_from_slice(parser.read_bytes(8)?);
        let method = parser.read_compressed_uint()?;
        push_compressed_uint(&mut out, map.map(method))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixture::FixtureBuilder;

    #[test]
    fn rejects_windows_pdb() {
        let mut data = MSF_SIGNATURE.to_vec();
        data.extend_from_slice(b"\r\n\x1aDS\0\0\0");
        assert!(matches!(
            PortablePdb::from_mem(&data),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(PortablePdb::from_mem(&[]), Err(Error::Empty)));
    }

    #[test]
    fn rejects_image_metadata() {
        let fixture = FixtureBuilder::new().build();
        assert!(PortablePdb::from_mem(&fixture.metadata).is_err());
    }

    #[test]
    fn load_fixture_pdb() {
        let fixture = FixtureBuilder::new().with_pdb().build();
        let pdb = PortablePdb::from_mem(fixture.pdb.as_ref().unwrap()).unwrap();
        assert_eq!(pdb.id(), fixture.pdb_id);
        assert_eq!(pdb.entry_point(), Token::new(0x0600_0002));
        assert!(pdb.sequence_points(1).is_none());
        assert!(pdb.sequence_points(2).is_some());
    }

    #[test]
    fn async_stepping_rows() {
        #[rustfmt::skip]
        let blob = [
            0xFF, 0xFF, 0xFF, 0xFF,             // no catch handler
            0x10, 0x00, 0x00, 0x00,             // yield offset
            0x20, 0x00, 0x00, 0x00,             // resume offset
            0x05,                               // MethodDef row 5
            0x30, 0x00, 0x00, 0x00,
            0x40, 0x00, 0x00, 0x00,
            0x01,                               // MethodDef row 1
        ];
        let patched = remap_async_stepping(&blob, &RowMap::Insert { at: 3 }).unwrap();
        assert_eq!(patched.len(), blob.len());
        assert_eq!(patched[12], 0x06);
        assert_eq!(patched[21], 0x01);
        assert_eq!(&patched[..12], &blob[..12]);

        assert!(remap_async_stepping(&blob[..10], &RowMap::Insert { at: 1 }).is_err());
    }

    #[test]
    fn checksum_ignores_id() {
        let fixture = FixtureBuilder::new().with_pdb().build();
        let pdb = fixture.pdb.unwrap();
        let checksum = pdb_checksum(&pdb).unwrap();

        let root = Root::read(&pdb).unwrap();
        let id_start = root.stream("#Pdb").unwrap().offset as usize;
        let mut other = pdb.clone();
        other[id_start] ^= 0xFF;
        assert_eq!(pdb_checksum(&other).unwrap(), checksum);

        let last = other.len() - 1;
        other[last] ^= 0xFF;
        assert_ne!(pdb_checksum(&other).unwrap(), checksum);
    }
}
