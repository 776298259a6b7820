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

use std::collections::HashMap;

use tracing::{debug, warn};
use vet_common::*;

use crate::{
    read_record, read_res_chunk, read_u16, read_u32, resource_external_types::*,
    string_pool::StringPool, ResChunk
};

// Reference chains longer than this are treated as cycles
const MAX_REFERENCE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawValue {
    pub data_type: u8,
    pub data: u32
}

/// The decoded `resources.arsc`: for every resource ID, one value per
/// configuration that defines it. Bags (styles, plurals and so on) are
/// skipped, nothing here needs them.
#[derive(Debug, Default)]
pub struct ResourceTable {
    strings: StringPool,
    values: HashMap<u32, Vec<(String, RawValue)>>
}

impl ResourceTable {
    pub fn parse(bytes: &[u8]) -> Result<ResourceTable> {
        let table = read_res_chunk(bytes, 0)?;
        if table.chunk_type() != Some(ChunkType::Table) {
            return Err(VetError::MalformedChunk(format!(
                "expected a resource table, found chunk type 0x{:04x}",
                table.header.chunk_type
            )));
        }

        let mut resources = ResourceTable::default();
        for chunk in table.children() {
            let chunk = chunk?;
            match chunk.chunk_type() {
                Some(ChunkType::StringPool) => resources.strings = StringPool::parse(&chunk)?,
                Some(ChunkType::TablePackage) => resources.parse_package(&chunk)?,
                _ => debug!("Skipping table chunk 0x{:04x}", chunk.header.chunk_type)
            }
        }
        Ok(resources)
    }

    fn parse_package(&mut self, package: &ResChunk) -> Result<()> {
        let header: TablePackageHeader = read_record(package.bytes, RES_CHUNK_HEADER_SIZE)?;
        let package_id = header.id & 0xFF;
        for chunk in package.children() {
            let chunk = chunk?;
            if chunk.chunk_type() == Some(ChunkType::TableType) {
                self.parse_type(package_id, &chunk)?;
            }
        }
        Ok(())
    }

    fn parse_type(&mut self, package_id: u32, chunk: &ResChunk) -> Result<()> {
        let header: TableTypeHeader = read_record(chunk.bytes, RES_CHUNK_HEADER_SIZE)?;
        let config: TableConfigLocale = read_record(chunk.bytes, RES_CHUNK_HEADER_SIZE + 12)?;
        let locale = locale_key(&config);
        let offsets_start = chunk.header_size();
        let entries_start = header.entries_start as usize;

        let mut entries: Vec<(u32, usize)> = vec![];
        for i in 0..header.entry_count as usize {
            if header.flags & TYPE_FLAG_SPARSE != 0 {
                let index = read_u16(chunk.bytes, offsets_start + i * 4)?;
                let offset = read_u16(chunk.bytes, offsets_start + i * 4 + 2)?;
                entries.push((index as u32, offset as usize * 4));
            } else if header.flags & TYPE_FLAG_OFFSET16 != 0 {
                match read_u16(chunk.bytes, offsets_start + i * 2)? {
                    NO_ENTRY16 => {}
                    offset => entries.push((i as u32, offset as usize * 4))
                }
            } else {
                match read_u32(chunk.bytes, offsets_start + i * 4)? {
                    NO_ENTRY => {}
                    offset => entries.push((i as u32, offset as usize))
                }
            }
        }

        for (index, offset) in entries {
            let position = entries_start + offset;
            let entry: TableEntryHeader = read_record(chunk.bytes, position)?;
            let value = if entry.flags & ENTRY_FLAG_COMPACT != 0 {
                // Key in `size`, type in the top byte of `flags`, data in `key`
                RawValue {
                    data_type: (entry.flags >> 8) as u8,
                    data: entry.key
                }
            } else if entry.flags & ENTRY_FLAG_COMPLEX != 0 {
                continue;
            } else {
                let value: ResValue = read_record(chunk.bytes, position + entry.size as usize)?;
                RawValue {
                    data_type: value.data_type,
                    data: value.data
                }
            };
            let id = (package_id << 24) | ((header.id as u32) << 16) | index;
            self.values
                .entry(id)
                .or_default()
                .push((locale.clone(), value));
        }
        Ok(())
    }

    /// Every configuration's raw value for `id`, in table order.
    pub fn values(&self, id: u32) -> &[(String, RawValue)] {
        self.values.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Resolves `id` to a string for each locale that defines it. References
    /// are followed, preferring the same locale in the target, then the default.
    pub fn resolve_strings(&self, id: u32) -> Result<Vec<(String, String)>> {
        let values = self.values(id);
        if values.is_empty() {
            return Err(VetError::UnresolvedReference(id));
        }
        let mut resolved = vec![];
        for (locale, value) in values {
            match self.resolve_value(*value, locale, 0)? {
                Some(text) => resolved.push((locale.clone(), text)),
                None => warn!("Resource 0x{id:08x} ({locale:?}) is not a string")
            }
        }
        Ok(resolved)
    }

    fn resolve_value(&self, value: RawValue, locale: &str, depth: usize) -> Result<Option<String>> {
        match value.data_type {
            TYPE_STRING => Ok(Some(self.strings.get(value.data)?.to_string())),
            TYPE_REFERENCE | TYPE_DYNAMIC_REFERENCE => {
                if depth >= MAX_REFERENCE_DEPTH {
                    warn!("Giving up on reference chain at 0x{:08x}", value.data);
                    return Err(VetError::UnresolvedReference(value.data));
                }
                let candidates = self.values(value.data);
                let target = candidates
                    .iter()
                    .find(|(l, _)| l == locale)
                    .or_else(|| candidates.iter().find(|(l, _)| l.is_empty()))
                    .or_else(|| candidates.first())
                    .ok_or(VetError::UnresolvedReference(value.data))?;
                self.resolve_value(target.1, locale, depth + 1)
            }
            _ => Ok(None)
        }
    }
}

// "" for the default configuration, otherwise "en" or "en-GB"
fn locale_key(config: &TableConfigLocale) -> String {
    let language = decode_locale_code(config.language, b'a');
    let country = decode_locale_code(config.country, b'0');
    match (language.is_empty(), country.is_empty()) {
        (true, _) => String::new(),
        (false, true) => language,
        (false, false) => format!("{language}-{country}")
    }
}

// Two-letter codes are stored as-is. Three-letter codes set the high bit and
// pack three 5-bit letters offset from `base`.
fn decode_locale_code(code: [u8; 2], base: u8) -> String {
    if code[0] == 0 {
        return String::new();
    }
    if code[0] & 0x80 == 0 {
        return String::from_utf8_lossy(&code).into_owned();
    }
    let first = code[1] & 0x1F;
    let second = ((code[1] & 0xE0) >> 5) | ((code[0] & 0x03) << 3);
    let third = (code[0] & 0x7C) >> 2;
    [first, second, third]
        .iter()
        .map(|letter| (base + letter) as char)
        .collect()
}
