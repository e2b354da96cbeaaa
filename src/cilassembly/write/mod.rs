//! Serialization of a modified [`crate::CilAssembly`].
//!
//! The input image is kept byte for byte wherever possible. Rebuilding works in these steps:
//!
//! 1. Patch the `MethodDef` token operands of existing bodies in the copy of the input
//! 2. Strip the Authenticode certificate, which no longer matches
//! 3. Reserve a section header, growing `SizeOfHeaders` if the table is full
//! 4. Place the new method bodies at the start of a new `.meta` section and store their RVAs
//! 5. Serialize the metadata behind them and point the CLI header at it
//! 6. Serialize the portable PDB and refresh the `PdbChecksum` debug entry
//! 7. Recompute the PE checksum
//!
//! Nothing touches the filesystem until [`output::write_all`] persists the finished buffers.

pub mod output;
pub mod pe;

use crate::{
    cilassembly::{
        remapping::collect_token_patches,
        symbols::pdb_checksum,
        write::pe::{
            codeview_guid, ImageWriter, DEBUG_TYPE_CODEVIEW, DEBUG_TYPE_EMBEDDED_PORTABLE_PDB,
            METADATA_SECTION_CHARACTERISTICS,
        },
        CilAssembly,
    },
    file::{io::push_le, DataDirectoryKind},
    metadata::{
        cor20header::{ComImageFlags, COR20_HEADER_SIZE},
        method::{MethodBodyFlags, FAT_HEADER_SIZE, MethodHeader},
        tables::{columns, TableId},
    },
    Result,
};

/// Name of the section holding the rebuilt metadata
pub const METADATA_SECTION_NAME: [u8; 8] = *b".meta\0\0\0";

/// Encode a method header and `code` into a complete body.
///
/// A tiny header is used when the body has no locals, at most 8 stack slots and fewer than 64
/// bytes of code; otherwise a fat header.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `max_stack` or the code size do not fit a fat header.
pub fn encode_method_body(
    code: &[u8],
    max_stack: u16,
    local_var_sig_token: u32,
    init_locals: bool,
) -> Result<Vec<u8>> {
    if local_var_sig_token == 0 && max_stack <= 8 && code.len() < 64 && !init_locals {
        let mut body = Vec::with_capacity(code.len() + 1);
        #[allow(clippy::cast_possible_truncation)]
        let header = (code.len() as u8) << 2 | MethodBodyFlags::TINY_FORMAT.bits() as u8;
        push_le(&mut body, header);
        body.extend_from_slice(code);
        return Ok(body);
    }

    let mut body = Vec::with_capacity(FAT_HEADER_SIZE + code.len());
    body.extend(MethodHeader::encode_fat(
        usize::from(max_stack),
        code.len(),
        local_var_sig_token,
        init_locals,
    )?);
    body.extend_from_slice(code);
    Ok(body)
}

/// Produce the output image and, if the assembly has symbols, the output PDB.
pub(crate) fn rebuild(assembly: &CilAssembly) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    let mut metadata = assembly.metadata.clone();
    let added: Vec<u32> = assembly.new_bodies.iter().map(|(rid, _)| *rid).collect();

    let patches = collect_token_patches(
        assembly.file.data(),
        &assembly.layout,
        &metadata.tables,
        &assembly.method_maps,
        &added,
    )?;

    let mut writer = ImageWriter::new(assembly.file.data().to_vec(), assembly.layout.clone());
    for patch in &patches {
        writer.patch_rva(patch.rva, &patch.token.value().to_le_bytes())?;
    }

    writer.strip_certificate()?;
    writer.reserve_section_header()?;

    let section_rva = writer.next_section_rva();
    let mut content = Vec::new();
    for (rid, body) in &assembly.new_bodies {
        content.resize(content.len().next_multiple_of(4), 0);
        let rva = section_rva + u32::try_from(content.len()).map_err(|_| layout_error())?;
        metadata
            .tables
            .table_mut(TableId::MethodDef)
            .set(*rid, columns::methoddef::RVA, rva)?;
        log::debug!("Body of MethodDef row {} placed at RVA {:#x}", rid, rva);
        content.extend_from_slice(body);
    }
    content.resize(content.len().next_multiple_of(4), 0);
    let metadata_rva = section_rva + u32::try_from(content.len()).map_err(|_| layout_error())?;

    let symbols = match &assembly.symbols {
        Some(pdb) => Some(pdb.clone().to_bytes(&metadata.tables.row_counts())?),
        None => None,
    };

    let serialized = metadata.write()?;
    content.extend_from_slice(&serialized);
    writer.append_section(METADATA_SECTION_NAME, &content, METADATA_SECTION_CHARACTERISTICS)?;

    let mut cor20 = assembly.cor20.clone();
    cor20.meta_data_rva = metadata_rva;
    cor20.meta_data_size = u32::try_from(serialized.len()).map_err(|_| layout_error())?;
    if cor20.flags.contains(ComImageFlags::STRONG_NAME_SIGNED) {
        cor20.flags.remove(ComImageFlags::STRONG_NAME_SIGNED);
        log::warn!("Cleared the strong-name flag; the image must be re-signed");
    }
    let (clr_rva, _) = writer.layout().directory(DataDirectoryKind::ClrRuntimeHeader);
    let clr_offset = writer.layout().rva_to_offset(clr_rva)?;
    let mut header = writer
        .data()
        .get(clr_offset..clr_offset + COR20_HEADER_SIZE)
        .ok_or_else(|| out_of_bounds_error!())?
        .to_vec();
    cor20.patch(&mut header)?;
    writer.patch(clr_offset, &header)?;

    let entries = writer.debug_entries()?;
    if entries
        .iter()
        .any(|entry| entry.kind == DEBUG_TYPE_EMBEDDED_PORTABLE_PDB)
    {
        log::warn!("The embedded portable PDB was left unchanged and no longer matches the image");
    }
    if let Some(pdb) = &symbols {
        let checksum = pdb_checksum(pdb)?;
        if writer.update_pdb_checksum(&checksum)? > 0 {
            log::debug!("Updated the PdbChecksum debug entry");
        }
    }

    let image = writer.finish();
    log::debug!(
        "Rebuilt image: {} bytes ({} token patches, metadata {} bytes at RVA {:#x})",
        image.len(),
        patches.len(),
        serialized.len(),
        metadata_rva
    );
    Ok((image, symbols))
}

/// GUIDs of every CodeView record in the image.
pub(crate) fn codeview_guids(assembly: &CilAssembly) -> Result<Vec<[u8; 16]>> {
    let data = assembly.file.data();
    let mut guids = Vec::new();
    for entry in pe::debug_entries(data, &assembly.layout)? {
        if entry.kind == DEBUG_TYPE_CODEVIEW {
            if let Some(guid) = codeview_guid(data, &entry)? {
                guids.push(guid);
            }
        }
    }
    Ok(guids)
}

fn layout_error() -> crate::Error {
    crate::Error::WriteLayoutFailed {
        message: "metadata section exceeds 4GB".to_string(),
    }
}
