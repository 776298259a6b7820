// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// APK Signature Scheme v2 described at https://source.android.com/docs/security/features/apksigning/v2
// APK Signature Scheme v3 described at https://source.android.com/docs/security/features/apksigning/v3

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;
use vet_common::*;

use crate::zip_parser::ZipOffsets;

pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109871A;
pub const SIGNATURE_SCHEME_V3_BLOCK_ID: u32 = 0xF05368C0;
pub const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";

// size_of_self_counted (u64) followed by the magic
const BLOCK_FOOTER_SIZE: usize = 8 + 16;

/// The ID-value pairs of an APK Signing Block, borrowed from the APK.
#[derive(Debug, PartialEq)]
pub struct SigningBlock<'a> {
    pub pairs: Vec<(u32, &'a [u8])>
}

impl<'a> SigningBlock<'a> {
    pub fn value(&self, id: u32) -> Option<&'a [u8]> {
        self.pairs
            .iter()
            .find(|(pair_id, _)| *pair_id == id)
            .map(|(_, value)| *value)
    }
}

fn malformed(reason: impl Into<String>) -> VetError {
    VetError::SigningBlockMalformed(reason.into())
}

/// Looks for an APK Signing Block directly before the central directory.
/// `None` means the APK simply doesn't have one.
pub fn read_signing_block<'a>(apk: &'a [u8], offsets: &ZipOffsets) -> Result<Option<SigningBlock<'a>>> {
    let cd_start = offsets.cd_start;
    if cd_start < BLOCK_FOOTER_SIZE + 8 || &apk[cd_start - 16..cd_start] != APK_SIGNING_BLOCK_MAGIC {
        debug!("No APK Signing Block before the central directory");
        return Ok(None);
    }

    let size_of_self_counted = (&apk[cd_start - BLOCK_FOOTER_SIZE..])
        .read_u64::<LittleEndian>()
        .map_err(|_| malformed("truncated block footer"))?;
    if size_of_self_counted < BLOCK_FOOTER_SIZE as u64 {
        return Err(malformed(format!("block size {size_of_self_counted} is too small")));
    }
    // The leading size field is the only part not counted
    let block_start = usize::try_from(size_of_self_counted)
        .ok()
        .and_then(|size| size.checked_add(8))
        .and_then(|size| cd_start.checked_sub(size))
        .ok_or_else(|| malformed(format!("block size {size_of_self_counted} exceeds the APK")))?;
    let size_of_self_not_counted = (&apk[block_start..])
        .read_u64::<LittleEndian>()
        .map_err(|_| malformed("truncated block header"))?;
    if size_of_self_not_counted != size_of_self_counted {
        return Err(malformed(format!(
            "size fields disagree ({size_of_self_not_counted} and {size_of_self_counted})"
        )));
    }

    let mut remaining = &apk[block_start + 8..cd_start - BLOCK_FOOTER_SIZE];
    let mut pairs = vec![];
    while !remaining.is_empty() {
        let left = remaining.len();
        let length = remaining
            .read_u64::<LittleEndian>()
            .map_err(|_| malformed(format!("truncated pair length, {left} bytes left")))?;
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        if length < 4 || length > remaining.len() {
            return Err(malformed(format!("pair of {length} bytes does not fit")));
        }
        let (pair, rest) = remaining.split_at(length);
        pairs.push((u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]), &pair[4..]));
        remaining = rest;
    }
    debug!(pairs = pairs.len(), "Found APK Signing Block");
    Ok(Some(SigningBlock { pairs }))
}

// The integrity-protected contents use u32 lengths throughout
fn take_length_prefixed<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let length = buf
        .read_u32::<LittleEndian>()
        .map_err(|_| malformed("truncated length prefix"))? as usize;
    if length > buf.len() {
        return Err(malformed(format!(
            "length-prefixed value of {length} bytes with {} left",
            buf.len()
        )));
    }
    let (value, rest) = buf.split_at(length);
    *buf = rest;
    Ok(value)
}

/// Pulls the DER certificates out of a v2 or v3 scheme block, signer by
/// signer. Both versions start each signer with its signed data, which starts
/// with digests and then certificates, so one walk serves both.
pub fn signer_certificates(scheme_block: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut block = scheme_block;
    let mut signers = take_length_prefixed(&mut block)?;
    let mut certificates = vec![];
    while !signers.is_empty() {
        let mut signer = take_length_prefixed(&mut signers)?;
        let mut signed_data = take_length_prefixed(&mut signer)?;
        let _digests = take_length_prefixed(&mut signed_data)?;
        let mut encoded_certificates = take_length_prefixed(&mut signed_data)?;
        while !encoded_certificates.is_empty() {
            certificates.push(take_length_prefixed(&mut encoded_certificates)?.to_vec());
        }
    }
    Ok(certificates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixtures::{generate_certificate, signing_block, unsigned_apk},
        zip_parser::find_offsets,
        zip_rebuilder::rebuild_zip_with_signing_block
    };

    #[test]
    fn reads_pairs_and_certificates() {
        let certificate = generate_certificate("Block Test", "Example Org");
        let block = signing_block(&[SIGNATURE_SCHEME_V2_BLOCK_ID], &[certificate.clone()]).unwrap();
        let apk = unsigned_apk();
        let signed = rebuild_zip_with_signing_block(&find_offsets(&apk).unwrap(), &apk, &block).unwrap();

        let offsets = find_offsets(&signed).unwrap();
        let found = read_signing_block(&signed, &offsets).unwrap().unwrap();
        assert_eq!(found.pairs.len(), 1);
        assert!(found.value(SIGNATURE_SCHEME_V3_BLOCK_ID).is_none());
        let v2 = found.value(SIGNATURE_SCHEME_V2_BLOCK_ID).unwrap();
        assert_eq!(signer_certificates(v2).unwrap(), vec![certificate]);
    }

    #[test]
    fn unsigned_apk_has_no_block() {
        let apk = unsigned_apk();
        let offsets = find_offsets(&apk).unwrap();
        assert_eq!(read_signing_block(&apk, &offsets).unwrap(), None);
    }

    #[test]
    fn mismatched_sizes_are_malformed() {
        let block = signing_block(&[SIGNATURE_SCHEME_V2_BLOCK_ID], &[vec![0x30, 0x00]]).unwrap();
        let mut corrupted = block.clone();
        corrupted[0] ^= 0x01;
        let apk = unsigned_apk();
        let signed =
            rebuild_zip_with_signing_block(&find_offsets(&apk).unwrap(), &apk, &corrupted).unwrap();
        let offsets = find_offsets(&signed).unwrap();
        assert!(matches!(
            read_signing_block(&signed, &offsets),
            Err(VetError::SigningBlockMalformed(_))
        ));
    }

    #[test]
    fn short_pair_length_is_malformed() {
        // Four bytes of pairs can't even hold a pair's u64 length
        let pairs = [1u8, 2, 3, 4];
        let size = (pairs.len() + BLOCK_FOOTER_SIZE) as u64;
        let mut block = size.to_le_bytes().to_vec();
        block.extend(pairs);
        block.extend(size.to_le_bytes());
        block.extend(APK_SIGNING_BLOCK_MAGIC);

        let apk = unsigned_apk();
        let signed = rebuild_zip_with_signing_block(&find_offsets(&apk).unwrap(), &apk, &block).unwrap();
        let offsets = find_offsets(&signed).unwrap();
        assert!(matches!(
            read_signing_block(&signed, &offsets),
            Err(VetError::SigningBlockMalformed(_))
        ));
    }

    #[test]
    fn truncated_scheme_block_is_malformed() {
        assert!(signer_certificates(&[0x10, 0, 0, 0, 1, 2]).is_err());
    }
}
