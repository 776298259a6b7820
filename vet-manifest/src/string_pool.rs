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

use crate::{read_record, read_u16, read_u32, resource_external_types::*, ResChunk};
use vet_common::*;

/// A decoded `ResStringPool`. Styles are ignored.
#[derive(Debug, Default, Clone)]
pub struct StringPool {
    strings: Vec<String>
}

impl StringPool {
    pub fn parse(chunk: &ResChunk) -> Result<StringPool> {
        let header: StringPoolHeader = read_record(chunk.bytes, RES_CHUNK_HEADER_SIZE)?;
        let utf8 = header.flags & STRING_POOL_UTF8_FLAG != 0;
        let indices_start = chunk.header_size();
        let strings_start = header.strings_start as usize;

        let mut strings = Vec::with_capacity(header.string_count.min(0xFFFF) as usize);
        for i in 0..header.string_count as usize {
            let offset = read_u32(chunk.bytes, indices_start + i * 4)? as usize;
            let position = strings_start + offset;
            let string = if utf8 {
                decode_utf8_string(chunk.bytes, position)?
            } else {
                decode_utf16_string(chunk.bytes, position)?
            };
            strings.push(string);
        }

        Ok(StringPool { strings })
    }

    pub fn get(&self, index: u32) -> Result<&str> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or(VetError::StringPoolIndexOutOfRange {
                index,
                count: self.strings.len()
            })
    }

    /// Resolves a reference that may legitimately be empty (`UINT32_MINUS_ONE`).
    pub fn get_optional(&self, reference: ResStringPoolRef) -> Result<Option<&str>> {
        if reference == UINT32_MINUS_ONE {
            return Ok(None);
        }
        self.get(reference).map(Some)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

// UTF-8 pools store the length in UTF-16 units, then in bytes. Each length is
// one byte, or two if the high bit of the first is set.
fn decode_utf8_length(buf: &[u8], position: usize) -> Result<(usize, usize)> {
    let first = *buf.get(position).ok_or_else(out_of_bounds(position))? as usize;
    if first & 0x80 == 0 {
        return Ok((first, 1));
    }
    let second = *buf.get(position + 1).ok_or_else(out_of_bounds(position + 1))? as usize;
    Ok((((first & 0x7F) << 8) | second, 2))
}

fn decode_utf8_string(buf: &[u8], position: usize) -> Result<String> {
    let (_char_count, used) = decode_utf8_length(buf, position)?;
    let (byte_count, used_for_bytes) = decode_utf8_length(buf, position + used)?;
    let start = position + used + used_for_bytes;
    let bytes = buf
        .get(start..start + byte_count)
        .ok_or_else(out_of_bounds(start + byte_count))?;
    // Android writes "modified" UTF-8, lossy decoding copes with its surrogates
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

// UTF-16 pools store one length in code units, one u16 or two if the high bit
// of the first is set.
fn decode_utf16_string(buf: &[u8], position: usize) -> Result<String> {
    let first = read_u16(buf, position)? as usize;
    let (unit_count, start) = if first & 0x8000 == 0 {
        (first, position + 2)
    } else {
        let second = read_u16(buf, position + 2)? as usize;
        ((((first & 0x7FFF) << 16) | second), position + 4)
    };
    let mut units = Vec::with_capacity(unit_count.min(0xFFFF));
    for i in 0..unit_count {
        units.push(read_u16(buf, start + i * 2)?);
    }
    Ok(String::from_utf16_lossy(&units))
}

fn out_of_bounds(position: usize) -> impl Fn() -> VetError {
    move || VetError::MalformedChunk(format!("string data at offset {position} out of bounds"))
}

/// Encodes strings into a UTF-8 `ResStringPool` chunk the way AAPT2 does.
#[cfg(feature = "fixtures")]
pub fn construct_string_pool(strings: &[String]) -> Result<Vec<u8>> {
    let mut string_data: Vec<u8> = vec![];
    let mut string_indicies: Vec<u32> = vec![];
    for string in strings {
        string_indicies.push(string_data.len() as u32);

        if string.len() > 0x7FFF {
            return Err(VetError::MalformedChunk(format!(
                "fixture string of {} bytes is too long for a UTF-8 pool",
                string.len()
            )));
        }

        let char_count = string.encode_utf16().count();
        let byte_count = string.len();
        for count in [char_count, byte_count] {
            if count < 128 {
                string_data.push(count as u8);
            } else {
                string_data.push(0x80 | ((count >> 8) & 0xFF) as u8);
                string_data.push((count & 0xFF) as u8);
            }
        }

        string_data.extend(string.bytes());
        string_data.push(0);
    }
    finish_string_pool(strings.len(), STRING_POOL_UTF8_FLAG, string_indicies, string_data)
}

/// Encodes strings into a UTF-16 `ResStringPool` chunk, the format older
/// build tools (and most `resources.arsc` files) use.
#[cfg(feature = "fixtures")]
pub fn construct_utf16_string_pool(strings: &[String]) -> Result<Vec<u8>> {
    let mut string_data: Vec<u8> = vec![];
    let mut string_indicies: Vec<u32> = vec![];
    for string in strings {
        string_indicies.push(string_data.len() as u32);
        let units: Vec<u16> = string.encode_utf16().collect();
        if units.len() > 0x7FFF {
            string_data.extend((0x8000 | (units.len() >> 16) as u16).to_le_bytes());
        }
        string_data.extend(((units.len() & 0xFFFF) as u16).to_le_bytes());
        for unit in units {
            string_data.extend(unit.to_le_bytes());
        }
        string_data.extend([0, 0]);
    }
    finish_string_pool(strings.len(), 0, string_indicies, string_data)
}

#[cfg(feature = "fixtures")]
fn finish_string_pool(
    string_count: usize,
    flags: u32,
    string_indicies: Vec<u32>,
    mut string_data: Vec<u8>
) -> Result<Vec<u8>> {
    use deku::DekuContainerWrite;

    // AAPT requires all chunks to fall on 32-bit boundaries
    let padding = (4 - (string_data.len() % 4)) % 4;
    string_data.resize(string_data.len() + padding, 0);

    let header = StringPoolHeader {
        string_count: string_count as u32,
        style_count: 0,
        flags,
        strings_start: 0x1C + 4 * string_count as u32,
        styles_start: 0
    };
    let mut body = vec![];
    for index in string_indicies {
        body.extend(index.to_le_bytes());
    }
    body.extend(string_data);

    crate::fixtures::generate_res_chunk(
        ChunkType::StringPool,
        &header
            .to_bytes()
            .map_err(VetError::ByteSerialisationFailed)?,
        &body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_res_chunk;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decodes_utf8_pool() {
        let encoded = construct_string_pool(&strings(&["manifest", "", "Caf\u{e9}"])).unwrap();
        let chunk = read_res_chunk(&encoded, 0).unwrap();
        let pool = StringPool::parse(&chunk).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get(0).unwrap(), "manifest");
        assert_eq!(pool.get(1).unwrap(), "");
        assert_eq!(pool.get(2).unwrap(), "Caf\u{e9}");
    }

    #[test]
    fn decodes_utf16_pool() {
        let encoded = construct_utf16_string_pool(&strings(&["Ma App", "\u{65e5}\u{672c}"])).unwrap();
        let chunk = read_res_chunk(&encoded, 0).unwrap();
        let pool = StringPool::parse(&chunk).unwrap();
        assert_eq!(pool.get(0).unwrap(), "Ma App");
        assert_eq!(pool.get(1).unwrap(), "\u{65e5}\u{672c}");
    }

    #[test]
    fn decodes_two_byte_utf8_lengths() {
        let long = "x".repeat(300);
        let encoded = construct_string_pool(&[long.clone()]).unwrap();
        let chunk = read_res_chunk(&encoded, 0).unwrap();
        let pool = StringPool::parse(&chunk).unwrap();
        assert_eq!(pool.get(0).unwrap(), long);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let encoded = construct_string_pool(&strings(&["only"])).unwrap();
        let chunk = read_res_chunk(&encoded, 0).unwrap();
        let pool = StringPool::parse(&chunk).unwrap();
        assert!(matches!(
            pool.get(4),
            Err(VetError::StringPoolIndexOutOfRange { index: 4, count: 1 })
        ));
        assert_eq!(pool.get_optional(UINT32_MINUS_ONE).unwrap(), None);
    }
}
