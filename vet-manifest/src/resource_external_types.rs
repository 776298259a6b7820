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

// Types that Android/APKs themselves use to describe resources
//
// Only the fixed-size parts of each chunk are modelled here. Variable-length
// payloads (offset arrays, string data, attribute lists) are sliced out of the
// surrounding buffer by the decoders.
use deku::prelude::*;

pub const RES_CHUNK_HEADER_SIZE: usize = 8;
pub const UINT32_MINUS_ONE: u32 = 0xFFFFFFFF;
// Either a string index or UINT32_MINUS_ONE if empty
pub type ResStringPoolRef = u32;

#[derive(Debug, PartialEq, Clone, Copy, DekuRead, DekuWrite)]
pub struct ResChunkHeader {
    pub chunk_type: u16,
    pub header_size: u16,
    // Includes both this header and the data that follows
    pub chunk_size: u32
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ChunkType {
    Null,
    StringPool,
    Table,
    XmlFile,

    // Types within an XmlFile
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCData,
    XmlResourceMap,

    // Types within a Table
    TablePackage,
    TableType,
    TableTypeSpec,
    TableLibrary
}

impl ChunkType {
    pub fn id(self) -> u16 {
        match self {
            ChunkType::Null => 0x0000,
            ChunkType::StringPool => 0x0001,
            ChunkType::Table => 0x0002,
            ChunkType::XmlFile => 0x0003,
            ChunkType::XmlStartNamespace => 0x0100,
            ChunkType::XmlEndNamespace => 0x0101,
            ChunkType::XmlStartElement => 0x0102,
            ChunkType::XmlEndElement => 0x0103,
            ChunkType::XmlCData => 0x0104,
            ChunkType::XmlResourceMap => 0x0180,
            ChunkType::TablePackage => 0x0200,
            ChunkType::TableType => 0x0201,
            ChunkType::TableTypeSpec => 0x0202,
            ChunkType::TableLibrary => 0x0203
        }
    }

    // Newer chunk types (overlayables, staged aliases) come back as None and
    // are skipped by the decoders
    pub fn from_id(id: u16) -> Option<ChunkType> {
        [
            ChunkType::Null,
            ChunkType::StringPool,
            ChunkType::Table,
            ChunkType::XmlFile,
            ChunkType::XmlStartNamespace,
            ChunkType::XmlEndNamespace,
            ChunkType::XmlStartElement,
            ChunkType::XmlEndElement,
            ChunkType::XmlCData,
            ChunkType::XmlResourceMap,
            ChunkType::TablePackage,
            ChunkType::TableType,
            ChunkType::TableTypeSpec,
            ChunkType::TableLibrary
        ]
        .into_iter()
        .find(|chunk_type| chunk_type.id() == id)
    }
}

// Every node in an XmlFile starts with this, directly after the ResChunkHeader
#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct XmlNodeHeader {
    // Where this node appeared in the original document
    // Not important for on-device parsing, only debugging and logs
    pub line_number: u32,
    // The XML comment that originally appeared above this node
    pub comment: ResStringPoolRef
}

// Used for both the start and end of a namespace
#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct XmlNamespaceExt {
    pub prefix: ResStringPoolRef,
    pub uri: ResStringPoolRef
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct XmlStartElementExt {
    pub namespace: ResStringPoolRef,
    pub name: ResStringPoolRef,
    // Offset from the start of this struct to the first attribute
    pub attribute_start: u16,
    pub attribute_size: u16,
    pub attribute_count: u16,
    // Index (1-based) of the "id" attribute, 0 if none
    pub id_index: u16,
    // Index (1-based) of the "class" attribute, 0 if none
    pub class_index: u16,
    // Index (1-based) of the "style" attribute, 0 if none
    pub style_index: u16
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct XmlEndElementExt {
    pub namespace: ResStringPoolRef,
    pub name: ResStringPoolRef
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct XmlCDataExt {
    pub data: ResStringPoolRef,
    pub value_size: u16,
    pub value_res0: u8,
    pub value_data_type: u8,
    pub value_data: u32
}

// The typed value is flattened into the attribute so the whole record can be
// read in one go
#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct XmlAttribute {
    pub namespace: ResStringPoolRef,
    pub name: ResStringPoolRef,
    pub raw_value: ResStringPoolRef,
    pub value_size: u16,
    // Always 0
    pub value_res0: u8,
    pub value_data_type: u8,
    pub value_data: u32
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct ResValue {
    pub size: u16,
    pub res0: u8,
    pub data_type: u8,
    pub data: u32
}

// Res_value data types (others are treated as opaque)
pub const TYPE_NULL: u8 = 0x00;
pub const TYPE_REFERENCE: u8 = 0x01;
pub const TYPE_ATTRIBUTE: u8 = 0x02;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_FLOAT: u8 = 0x04;
pub const TYPE_DIMENSION: u8 = 0x05;
pub const TYPE_FRACTION: u8 = 0x06;
pub const TYPE_DYNAMIC_REFERENCE: u8 = 0x07;
pub const TYPE_INT_DEC: u8 = 0x10;
pub const TYPE_INT_HEX: u8 = 0x11;
pub const TYPE_INT_BOOLEAN: u8 = 0x12;
pub const TYPE_FIRST_COLOR_INT: u8 = 0x1C;
pub const TYPE_LAST_COLOR_INT: u8 = 0x1F;

pub const STRING_POOL_UTF8_FLAG: u32 = 1 << 8;
#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct StringPoolHeader {
    pub string_count: u32,
    pub style_count: u32,
    pub flags: u32,
    // Both offsets are from the start of the chunk, not this struct
    pub strings_start: u32,
    pub styles_start: u32
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct TableHeader {
    pub package_count: u32
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct TablePackageHeader {
    pub id: u32,
    // Zero-padded UTF-16
    pub name: [u16; 128],
    pub type_string_offset: u32,
    pub last_public_type: u32,
    pub key_string_offset: u32,
    pub last_public_key: u32,
    pub type_id_offset: u32
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct TableTypeSpecHeader {
    pub id: u8,
    // This is always 0
    pub res0: u8,
    pub types_count: u16,
    pub entry_count: u32
}

// Entry offsets are (entry index, offset / 4) u16 pairs
pub const TYPE_FLAG_SPARSE: u8 = 0x01;
// Entry offsets are u16s (multiplied by 4) instead of u32s
pub const TYPE_FLAG_OFFSET16: u8 = 0x02;
pub const NO_ENTRY: u32 = 0xFFFFFFFF;
pub const NO_ENTRY16: u16 = 0xFFFF;

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct TableTypeHeader {
    pub id: u8,
    pub flags: u8,
    // Must be 0
    pub reserved: u16,
    pub entry_count: u32,
    pub entries_start: u32
}

// The start of a ResTable_config. Everything after the region is irrelevant
// for picking a label's locale.
#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct TableConfigLocale {
    pub size: u32,
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub country: [u8; 2]
}

// The entry points at a map of values (styles, plurals), not a single value
pub const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
// The value is packed into the entry itself: `size` holds the key index,
// the high byte of `flags` holds the data type and `key` holds the data
pub const ENTRY_FLAG_COMPACT: u16 = 0x0008;

#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct TableEntryHeader {
    pub size: u16,
    pub flags: u16,
    pub key: ResStringPoolRef
}
