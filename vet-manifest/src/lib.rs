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

//! # VET Manifest
//!
//! Decodes the compiled resources inside an APK: the binary
//! `AndroidManifest.xml` and `resources.arsc`. This is the information `aapt
//! dump badging` would print, read without leaving the process.
//!
//! ```ignore
//! let details = extract_apk_details(&apk_bytes)?;
//! println!("{:?} {:?}", details.package_name, details.app_name());
//! ```

use byteorder::{ByteOrder, LittleEndian};
use deku::DekuContainerRead;
use vet_common::*;

use resource_external_types::{ChunkType, ResChunkHeader, RES_CHUNK_HEADER_SIZE};

pub mod android_attributes;
pub mod apk_details;
#[cfg(feature = "fixtures")]
pub mod fixtures;
pub mod resource_external_types;
pub mod resource_table;
pub mod string_pool;
pub mod xml_file;
pub mod xml_text;

pub use apk_details::{extract_apk_details, read_apk_manifest, ApkDetails, ApkManifest};

/// Decodes a fixed-size deku record starting at `offset`.
pub(crate) fn read_record<'a, T: DekuContainerRead<'a>>(buf: &'a [u8], offset: usize) -> Result<T> {
    let bytes = buf.get(offset..).ok_or_else(|| {
        VetError::MalformedChunk(format!(
            "record at offset {offset} is past the end of {} bytes",
            buf.len()
        ))
    })?;
    let (_rest, record) = T::from_bytes((bytes, 0))?;
    Ok(record)
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    buf.get(offset..offset + 2)
        .map(LittleEndian::read_u16)
        .ok_or_else(|| VetError::MalformedChunk(format!("u16 at offset {offset} out of bounds")))
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    buf.get(offset..offset + 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| VetError::MalformedChunk(format!("u32 at offset {offset} out of bounds")))
}

/// A chunk borrowed from a larger resource buffer. `bytes` covers the whole
/// chunk, header included.
#[derive(Debug, Clone, Copy)]
pub struct ResChunk<'a> {
    pub header: ResChunkHeader,
    pub bytes: &'a [u8]
}

impl<'a> ResChunk<'a> {
    pub fn chunk_type(&self) -> Option<ChunkType> {
        ChunkType::from_id(self.header.chunk_type)
    }

    pub fn header_size(&self) -> usize {
        self.header.header_size as usize
    }

    /// Iterates the chunks nested inside this one, which start right after its
    /// header.
    pub fn children(&self) -> ChunkIter<'a> {
        ChunkIter {
            buf: self.bytes,
            pos: self.header_size()
        }
    }
}

/// Reads the chunk at `offset`, checking that its declared sizes fit.
pub fn read_res_chunk(buf: &[u8], offset: usize) -> Result<ResChunk<'_>> {
    let header: ResChunkHeader = read_record(buf, offset)?;
    let header_size = header.header_size as usize;
    let chunk_size = header.chunk_size as usize;
    if header_size < RES_CHUNK_HEADER_SIZE || chunk_size < header_size {
        return Err(VetError::MalformedChunk(format!(
            "chunk 0x{:04x} at offset {offset} has header size {header_size} and size {chunk_size}",
            header.chunk_type
        )));
    }
    let bytes = buf.get(offset..offset + chunk_size).ok_or_else(|| {
        VetError::MalformedChunk(format!(
            "chunk 0x{:04x} at offset {offset} claims {chunk_size} bytes but only {} remain",
            header.chunk_type,
            buf.len().saturating_sub(offset)
        ))
    })?;
    Ok(ResChunk { header, bytes })
}

pub struct ChunkIter<'a> {
    buf: &'a [u8],
    pos: usize
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<ResChunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        // Anything shorter than a header is trailing padding
        if self.pos + RES_CHUNK_HEADER_SIZE > self.buf.len() {
            return None;
        }
        match read_res_chunk(self.buf, self.pos) {
            Ok(chunk) => {
                self.pos += chunk.bytes.len();
                Some(Ok(chunk))
            }
            Err(e) => {
                // Stop after the first error, the offsets after it are meaningless
                self.pos = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_nested_chunks() {
        // An XmlFile chunk wrapping two empty Null chunks
        let mut buf = vec![];
        buf.extend([0x03, 0x00, 0x08, 0x00, 24, 0, 0, 0]);
        buf.extend([0x00, 0x00, 0x08, 0x00, 8, 0, 0, 0]);
        buf.extend([0x00, 0x00, 0x08, 0x00, 8, 0, 0, 0]);
        let chunk = read_res_chunk(&buf, 0).unwrap();
        assert_eq!(chunk.chunk_type(), Some(ChunkType::XmlFile));
        let children: Vec<_> = chunk.children().collect::<Result<_>>().unwrap();
        assert_eq!(children.len(), 2);
        assert!(children
            .iter()
            .all(|c| c.chunk_type() == Some(ChunkType::Null)));
    }

    #[test]
    fn rejects_chunk_larger_than_buffer() {
        let buf = [0x03, 0x00, 0x08, 0x00, 0xFF, 0, 0, 0];
        assert!(matches!(
            read_res_chunk(&buf, 0),
            Err(VetError::MalformedChunk(_))
        ));
    }

    #[test]
    fn rejects_header_smaller_than_minimum() {
        let buf = [0x03, 0x00, 0x04, 0x00, 8, 0, 0, 0];
        assert!(read_res_chunk(&buf, 0).is_err());
    }

    #[test]
    fn bounds_checked_integer_reads() {
        let buf = [0x34, 0x12, 0x00, 0x00];
        assert_eq!(read_u16(&buf, 0).unwrap(), 0x1234);
        assert_eq!(read_u32(&buf, 0).unwrap(), 0x1234);
        assert!(read_u32(&buf, 2).is_err());
    }
}
