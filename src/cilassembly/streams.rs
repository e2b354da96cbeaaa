//! Owned metadata streams of an image or portable PDB, decoded for editing and re-serialized
//! on write.

use crate::{
    metadata::{
        root::Root,
        streams::{Blob, Guid, PdbStream, StreamHeader, Strings, TablesHeader, UserStrings},
        tables::{HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS},
    },
    Result,
};

/// A complete, owned `BSJB` metadata blob: root, decoded tables, and heaps.
///
/// Images and portable PDBs share this representation; a PDB additionally carries a `#Pdb`
/// stream. Streams the rewriter does not model (`#GUID` content, `#JTD`, unknown names) are kept
/// as raw bytes and written back unchanged.
#[derive(Debug, Clone)]
pub struct MetadataStreams {
    /// Root header and stream directory as read
    pub root: Root,
    /// `#~`
    pub tables: TablesHeader,
    /// `#Strings`
    pub strings: Strings,
    /// `#Blob`
    pub blobs: Blob,
    /// `#US`
    pub user_strings: UserStrings,
    /// `#GUID`
    pub guids: Option<Guid>,
    /// `#Pdb`, only in portable PDBs
    pub pdb: Option<PdbStream>,
    raw: Vec<(String, Vec<u8>)>,
}

impl MetadataStreams {
    /// Decode the metadata starting at `data[0]`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the root or a stream is invalid and
    /// [`crate::Error::NotSupported`] for uncompressed or indirect tables.
    pub fn read(data: &[u8]) -> Result<MetadataStreams> {
        let root = Root::read(data)?;

        let pdb = match root.stream_data(data, "#Pdb") {
            Some(stream) => Some(PdbStream::from(stream)?),
            None => None,
        };

        let Some(tables_data) = root.stream_data(data, "#~") else {
            return Err(malformed_error!("Metadata has no #~ stream"));
        };
        let tables = TablesHeader::read(tables_data, pdb.as_ref().map(|pdb| &pdb.row_counts))?;

        let strings = match root.stream_data(data, "#Strings") {
            Some(stream) => Strings::from(stream)?,
            None => Strings::default(),
        };
        let blobs = match root.stream_data(data, "#Blob") {
            Some(stream) => Blob::from(stream)?,
            None => Blob::default(),
        };
        let user_strings = match root.stream_data(data, "#US") {
            Some(stream) => UserStrings::from(stream)?,
            None => UserStrings::default(),
        };
        let guids = match root.stream_data(data, "#GUID") {
            Some(stream) => Some(Guid::from(stream)?),
            None => None,
        };

        let mut raw = Vec::new();
        for header in &root.stream_headers {
            if !matches!(
                header.name.as_str(),
                "#~" | "#Strings" | "#Blob" | "#US" | "#GUID" | "#Pdb"
            ) {
                let content = root.stream_data(data, &header.name).unwrap_or_default();
                raw.push((header.name.clone(), content.to_vec()));
            }
        }

        Ok(MetadataStreams {
            root,
            tables,
            strings,
            blobs,
            user_strings,
            guids,
            pdb,
            raw,
        })
    }

    /// `HeapSizes` index width bits for the current heap sizes.
    #[must_use]
    pub fn heap_flags(&self) -> u8 {
        let mut flags = 0;
        if self.strings.data().len() > 0xFFFF {
            flags |= HEAP_LARGE_STRINGS;
        }
        if self.guids.as_ref().is_some_and(|guids| guids.count() > 0xFFFF) {
            flags |= HEAP_LARGE_GUID;
        }
        if self.blobs.data().len() > 0xFFFF {
            flags |= HEAP_LARGE_BLOB;
        }
        flags
    }

    /// Serialize root, tables and heaps.
    ///
    /// Heaps that gained entries but have no stream in the directory (for example `#US` in an
    /// image without string literals) get one appended.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a table value no longer fits its column.
    pub fn write(&self) -> Result<Vec<u8>> {
        let pdb = self.pdb.as_ref().map(PdbStream::write);
        let tables = self.tables.write(
            self.heap_flags(),
            self.pdb.as_ref().map(|pdb| &pdb.row_counts),
        )?;

        let mut content: Vec<(&str, &[u8])> = vec![
            ("#~", &tables),
            ("#Strings", self.strings.data()),
            ("#Blob", self.blobs.data()),
            ("#US", self.user_strings.data()),
        ];
        if let Some(guids) = &self.guids {
            content.push(("#GUID", guids.data()));
        }
        if let Some(pdb) = &pdb {
            content.push(("#Pdb", pdb));
        }
        for (name, data) in &self.raw {
            content.push((name, data));
        }

        let mut root = self.root.clone();
        for (name, modified) in [
            ("#Strings", self.strings.is_modified()),
            ("#Blob", self.blobs.is_modified()),
            ("#US", self.user_strings.is_modified()),
        ] {
            if modified && root.stream(name).is_none() {
                log::debug!("Adding a {} stream to the metadata directory", name);
                root.stream_headers.push(StreamHeader {
                    offset: 0,
                    size: 0,
                    name: name.to_string(),
                });
            }
        }

        root.write(&content)
    }
}
