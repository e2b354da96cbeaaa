//! Token patching of existing method bodies.
//!
//! Bodies stay where they are in the image. Only the 4-byte token operands that name a moved
//! `MethodDef` change, so the patch list is a set of `(rva, token)` pairs written over the
//! original bytes.

use std::collections::HashSet;

use crate::{
    assembly::decode_stream,
    file::{parser::Parser, PeLayout},
    metadata::{
        method::{MethodHeader, MethodImplFlags},
        streams::TablesHeader,
        tables::{columns, TableId},
        token::Token,
    },
    cilassembly::remapping::RowMap,
    Result,
};

/// A token operand to overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPatch {
    /// RVA of the 4-byte operand
    pub rva: u32,
    /// New token value
    pub token: Token,
}

/// Walk every IL body referenced by the `MethodDef` table and collect the `MethodDef` token
/// operands that `maps` (applied in order) renumber.
///
/// `skip` lists rows whose RVA does not point into `data` yet (methods added in memory). Bodies
/// shared by several methods are visited once.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a body cannot be located or decoded, since its tokens
/// could not be kept consistent.
pub fn collect_token_patches(
    data: &[u8],
    layout: &PeLayout,
    tables: &TablesHeader,
    maps: &[RowMap],
    skip: &[u32],
) -> Result<Vec<TokenPatch>> {
    let mut patches = Vec::new();
    if maps.is_empty() {
        return Ok(patches);
    }

    let mut visited = HashSet::new();
    for (rid, row) in tables.table(TableId::MethodDef).rows() {
        let rva = row[columns::methoddef::RVA];
        let impl_flags = MethodImplFlags::from_bits_truncate(
            u16::try_from(row[columns::methoddef::IMPL_FLAGS]).unwrap_or(u16::MAX),
        );
        if rva == 0 || !impl_flags.is_il() || skip.contains(&rid) || !visited.insert(rva) {
            continue;
        }

        let offset = layout.rva_to_offset(rva)?;
        let body = data.get(offset..).ok_or_else(|| out_of_bounds_error!())?;
        let header = MethodHeader::from(body)?;
        let code = body
            .get(header.size_header..header.size())
            .ok_or_else(|| out_of_bounds_error!())?;

        for instruction in decode_stream(&mut Parser::new(code))? {
            let Some(token) = instruction.get_token_operand() else {
                continue;
            };
            let mapped = maps
                .iter()
                .fold(token, |token, map| map.map_token(TableId::MethodDef, token));
            if mapped == token {
                continue;
            }

            #[allow(clippy::cast_possible_truncation)]
            let operand = header.size_header as u32 + instruction.next_offset() as u32 - 4;
            patches.push(TokenPatch {
                rva: rva + operand,
                token: mapped,
            });
        }
    }

    log::debug!(
        "{} MethodDef token operand(s) to patch in {} bodies",
        patches.len(),
        visited.len()
    );
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cilassembly::streams::MetadataStreams, test::fixture::FixtureBuilder, File};

    #[test]
    fn patches_shifted_method_tokens() {
        let fixture = FixtureBuilder::new().build();
        let file = File::from_mem(fixture.image).unwrap();
        let layout = file.layout().unwrap();
        let metadata = MetadataStreams::read(&fixture.metadata).unwrap();
        let main_rva = metadata
            .tables
            .table(TableId::MethodDef)
            .get(2, columns::methoddef::RVA)
            .unwrap();

        // call Helper stays, ldftn Main moves
        let maps = [RowMap::Insert { at: 2 }];
        let patches =
            collect_token_patches(file.data(), &layout, &metadata.tables, &maps, &[]).unwrap();
        assert_eq!(
            patches,
            [TokenPatch {
                rva: main_rva + 8,
                token: Token::new(0x0600_0003),
            }]
        );

        // added rows are not read from the image
        let patches =
            collect_token_patches(file.data(), &layout, &metadata.tables, &maps, &[2]).unwrap();
        assert!(patches.is_empty());
    }

    #[test]
    fn nothing_to_do_without_maps() {
        let fixture = FixtureBuilder::new().build();
        let file = File::from_mem(fixture.image).unwrap();
        let metadata = MetadataStreams::read(&fixture.metadata).unwrap();
        let patches = collect_token_patches(
            file.data(),
            &file.layout().unwrap(),
            &metadata.tables,
            &[],
            &[],
        )
        .unwrap();
        assert!(patches.is_empty());
    }
}
