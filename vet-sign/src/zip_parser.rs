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

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use vet_common::*;

#[derive(Default, Debug, PartialEq)]
pub struct ZipOffsets {
    // Central Directory (from start of file)
    pub cd_start: usize,
    // End of Central Directory (from start of file)
    pub eocd_start: usize
}

pub const EOCD_MAGIC: &[u8; 4] = &[0x50, 0x4B, 0x05, 0x06];
const EOCD_MIN_SIZE: usize = 22;
// The EOCD can be followed by a comment of up to 64KiB
const EOCD_MAX_SEARCH: usize = EOCD_MIN_SIZE + 0xFFFF;

pub fn find_offsets(zip_buf: &[u8]) -> Result<ZipOffsets> {
    if zip_buf.len() < EOCD_MIN_SIZE {
        return Err(VetError::SignerZipParsingFailed);
    }
    let search_start = zip_buf.len().saturating_sub(EOCD_MAX_SEARCH);
    for i in (search_start..=(zip_buf.len() - EOCD_MIN_SIZE)).rev() {
        if &zip_buf[i..(i + 4)] != EOCD_MAGIC {
            continue;
        }
        // The EOCD also tells us where the central directories start
        let mut eocd_cd_start_field = Cursor::new(&zip_buf[(i + 16)..(i + 20)]);
        let cd_start = eocd_cd_start_field.read_u32::<LittleEndian>()? as usize;
        if cd_start == 0 || cd_start > i {
            // Magic bytes inside the archive comment, keep looking
            continue;
        }
        return Ok(ZipOffsets {
            cd_start,
            eocd_start: i
        });
    }
    Err(VetError::SignerZipParsingFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vet_zip::{zip_apk_to_vec, File};

    #[test]
    fn finds_central_directory() {
        let zip = zip_apk_to_vec(&[File {
            path: "classes.dex".into(),
            data: vec![7; 64]
        }])
        .unwrap();
        let offsets = find_offsets(&zip).unwrap();
        assert_eq!(&zip[offsets.eocd_start..offsets.eocd_start + 4], EOCD_MAGIC);
        assert_eq!(&zip[offsets.cd_start..offsets.cd_start + 4], b"PK\x01\x02");
    }

    #[test]
    fn skips_eocd_lookalike_in_comment() {
        let mut zip = zip_apk_to_vec(&[File {
            path: "classes.dex".into(),
            data: vec![7; 64]
        }])
        .unwrap();
        let expected = find_offsets(&zip).unwrap();

        let mut comment = EOCD_MAGIC.to_vec();
        comment.resize(EOCD_MIN_SIZE, 0);
        comment[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        let eocd = expected.eocd_start;
        zip[eocd + 20..eocd + 22].copy_from_slice(&(comment.len() as u16).to_le_bytes());
        zip.extend(comment);

        assert_eq!(find_offsets(&zip).unwrap(), expected);
    }

    #[test]
    fn rejects_short_or_foreign_input() {
        assert!(matches!(find_offsets(b"PK"), Err(VetError::SignerZipParsingFailed)));
        assert!(find_offsets(&[0u8; 100]).is_err());
    }
}
