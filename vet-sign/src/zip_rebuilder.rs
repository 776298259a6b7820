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

use vet_common::*;

use crate::zip_parser::ZipOffsets;

/// Inserts an encoded APK Signing Block between the entries and the central
/// directory, moving the EOCD's central directory offset along with it.
pub fn rebuild_zip_with_signing_block(
    offsets: &ZipOffsets,
    zip_buf: &[u8],
    signing_block: &[u8]
) -> Result<Vec<u8>> {
    let chunk1_range = 0..offsets.cd_start;
    let chunk3_range = offsets.cd_start..offsets.eocd_start;
    let chunk4_range = offsets.eocd_start..zip_buf.len();

    let new_cd_start = u32::try_from(offsets.cd_start + signing_block.len())
        .map_err(|_| VetError::SignerZipParsingFailed)?;
    let mut eocd = zip_buf[chunk4_range].to_vec();
    eocd[16..20].copy_from_slice(&new_cd_start.to_le_bytes());

    let mut final_apk: Vec<u8> = vec![];
    final_apk.extend(&zip_buf[chunk1_range]);
    final_apk.extend(signing_block);
    final_apk.extend(&zip_buf[chunk3_range]);
    final_apk.extend(eocd);
    Ok(final_apk)
}
