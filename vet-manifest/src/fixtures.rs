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

//! Builders for compiled manifests, resource tables and whole APKs, producing
//! the same chunk layouts AAPT2 does. Only compiled with the `fixtures`
//! feature, for tests in this and other crates.

use std::collections::HashMap;

use deku::DekuContainerWrite;
use vet_common::*;
use vet_zip::{zip_apk_to_vec, File, ANDROID_MANIFEST, RESOURCE_TABLE};
use xml::{
    escape::escape_str_attribute,
    reader::{EventReader, XmlEvent}
};

use crate::{
    android_attributes::{attribute_id_for_name, ANDROID_NAMESPACE},
    resource_external_types::*,
    string_pool::{construct_string_pool, construct_utf16_string_pool}
};

/// Resource ID of the first entry in [FixtureTable], which is what a
/// [FixtureLabel::Resource] label points at.
pub const LABEL_RESOURCE_ID: u32 = 0x7f01_0000;
const FIXTURE_PACKAGE_ID: u32 = 0x7f;
const FIXTURE_STRING_TYPE_ID: u8 = 1;

// Android attributes AAPT2 compiles to integers rather than strings
const INTEGER_ATTRIBUTES: &[&str] = &[
    "versionCode",
    "minSdkVersion",
    "targetSdkVersion",
    "maxSdkVersion",
    "compileSdkVersion"
];

pub(crate) fn record_bytes<T: DekuContainerWrite>(record: &T) -> Result<Vec<u8>> {
    record.to_bytes().map_err(VetError::ByteSerialisationFailed)
}

/// Wraps an already-encoded header extension and body in a `ResChunkHeader`.
pub fn generate_res_chunk(chunk_type: ChunkType, header_ext: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    let header = ResChunkHeader {
        chunk_type: chunk_type.id(),
        header_size: (RES_CHUNK_HEADER_SIZE + header_ext.len()) as u16,
        chunk_size: (RES_CHUNK_HEADER_SIZE + header_ext.len() + body.len()) as u32
    };
    if header.chunk_size % 4 != 0 {
        return Err(VetError::MalformedChunk(format!(
            "{chunk_type:?} chunk of {} bytes is not 32-bit aligned",
            header.chunk_size
        )));
    }
    let mut chunk = record_bytes(&header)?;
    chunk.extend_from_slice(header_ext);
    chunk.extend_from_slice(body);
    Ok(chunk)
}

#[derive(Default)]
struct PoolBuilder {
    strings: Vec<String>,
    ids: HashMap<String, u32>
}

impl PoolBuilder {
    // If the string already exists in the pool, return the existing ID
    fn intern(&mut self, string: &str) -> u32 {
        if let Some(id) = self.ids.get(string) {
            return *id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(string.to_string());
        self.ids.insert(string.to_string(), id);
        id
    }
}

fn generate_xml_node(chunk_type: ChunkType, body: &[u8]) -> Result<Vec<u8>> {
    let node_header = XmlNodeHeader {
        line_number: 1,
        comment: UINT32_MINUS_ONE
    };
    generate_res_chunk(chunk_type, &record_bytes(&node_header)?, body)
}

fn encode_attribute_value(pool: &mut PoolBuilder, android: bool, name: &str, value: &str) -> (u32, u8, u32) {
    if android && INTEGER_ATTRIBUTES.contains(&name) {
        if let Ok(int) = value.parse::<i32>() {
            return (UINT32_MINUS_ONE, TYPE_INT_DEC, int as u32);
        }
    }
    match value {
        "true" => return (UINT32_MINUS_ONE, TYPE_INT_BOOLEAN, 0xFFFF_FFFF),
        "false" => return (UINT32_MINUS_ONE, TYPE_INT_BOOLEAN, 0),
        _ => {}
    }
    if let Some(id) = value
        .strip_prefix("@0x")
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
    {
        return (UINT32_MINUS_ONE, TYPE_REFERENCE, id);
    }
    let id = pool.intern(value);
    (id, TYPE_STRING, id)
}

/// Compiles a text XML document into binary XML.
///
/// `android:` attributes with a known framework ID are placed at the front of
/// the string pool and listed in the resource map. With
/// `strip_attribute_names` their pool entries are left empty, as shrinking
/// tools do.
pub fn compile_xml(text: &str, strip_attribute_names: bool) -> Result<Vec<u8>> {
    let events = EventReader::new(text.as_bytes())
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| VetError::MalformedChunk(format!("fixture XML is invalid: {e}")))?;

    // First pass: reserve the resource-mapped slots
    let mut pool = PoolBuilder::default();
    let mut android_names: HashMap<String, u32> = HashMap::new();
    let mut resource_map: Vec<u32> = vec![];
    for event in &events {
        if let XmlEvent::StartElement { attributes, .. } = event {
            for attr in attributes {
                if attr.name.namespace.as_deref() != Some(ANDROID_NAMESPACE) {
                    continue;
                }
                let local = attr.name.local_name.as_str();
                if android_names.contains_key(local) {
                    continue;
                }
                if let Some(id) = attribute_id_for_name(local) {
                    android_names.insert(local.to_string(), pool.strings.len() as u32);
                    resource_map.push(id);
                    pool.strings.push(if strip_attribute_names {
                        String::new()
                    } else {
                        local.to_string()
                    });
                }
            }
        }
    }

    let mut nodes: Vec<u8> = vec![];
    let mut declared_namespaces: Vec<(u32, u32)> = vec![];
    for event in events {
        match event {
            XmlEvent::StartElement {
                name,
                attributes,
                namespace
            } => {
                for (prefix, uri) in namespace.iter() {
                    if prefix.is_empty() || prefix == "xml" || prefix == "xmlns" {
                        continue;
                    }
                    let ids = (pool.intern(prefix), pool.intern(uri));
                    if declared_namespaces.contains(&ids) {
                        continue;
                    }
                    declared_namespaces.push(ids);
                    let ext = XmlNamespaceExt {
                        prefix: ids.0,
                        uri: ids.1
                    };
                    nodes.extend(generate_xml_node(ChunkType::XmlStartNamespace, &record_bytes(&ext)?)?);
                }

                let mut attribute_bytes = vec![];
                for attr in &attributes {
                    let android = attr.name.namespace.as_deref() == Some(ANDROID_NAMESPACE);
                    let local = attr.name.local_name.as_str();
                    let namespace = match &attr.name.namespace {
                        Some(ns) => pool.intern(ns),
                        None => UINT32_MINUS_ONE
                    };
                    let name = match android_names.get(local) {
                        Some(id) if android => *id,
                        _ => pool.intern(local)
                    };
                    let (raw_value, value_data_type, value_data) =
                        encode_attribute_value(&mut pool, android, local, &attr.value);
                    attribute_bytes.extend(record_bytes(&XmlAttribute {
                        namespace,
                        name,
                        raw_value,
                        value_size: 8,
                        value_res0: 0,
                        value_data_type,
                        value_data
                    })?);
                }

                let start = XmlStartElementExt {
                    namespace: match &name.namespace {
                        Some(ns) => pool.intern(ns),
                        None => UINT32_MINUS_ONE
                    },
                    name: pool.intern(&name.local_name),
                    // The size of this struct, attributes follow directly
                    attribute_start: 0x14,
                    attribute_size: 0x14,
                    attribute_count: attributes.len() as u16,
                    id_index: 0,
                    class_index: 0,
                    style_index: 0
                };
                let mut body = record_bytes(&start)?;
                body.extend(attribute_bytes);
                nodes.extend(generate_xml_node(ChunkType::XmlStartElement, &body)?);
            }
            XmlEvent::EndElement { name } => {
                let end = XmlEndElementExt {
                    namespace: match &name.namespace {
                        Some(ns) => pool.intern(ns),
                        None => UINT32_MINUS_ONE
                    },
                    name: pool.intern(&name.local_name)
                };
                nodes.extend(generate_xml_node(ChunkType::XmlEndElement, &record_bytes(&end)?)?);
            }
            XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                let cdata = XmlCDataExt {
                    data: pool.intern(&text),
                    value_size: 8,
                    value_res0: 0,
                    value_data_type: TYPE_NULL,
                    value_data: 0
                };
                nodes.extend(generate_xml_node(ChunkType::XmlCData, &record_bytes(&cdata)?)?);
            }
            _ => {}
        }
    }
    for (prefix, uri) in declared_namespaces.into_iter().rev() {
        let ext = XmlNamespaceExt { prefix, uri };
        nodes.extend(generate_xml_node(ChunkType::XmlEndNamespace, &record_bytes(&ext)?)?);
    }

    let mut body = construct_string_pool(&pool.strings)?;
    let map_bytes: Vec<u8> = resource_map.iter().flat_map(|id| id.to_le_bytes()).collect();
    body.extend(generate_res_chunk(ChunkType::XmlResourceMap, &[], &map_bytes)?);
    body.extend(nodes);
    generate_res_chunk(ChunkType::XmlFile, &[], &body)
}

/// How a type chunk lays out its entry offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum TypeEncoding {
    #[default]
    Dense,
    Sparse,
    Offset16
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixtureValue {
    String(String),
    Reference(u32)
}

/// A `resources.arsc` with a single `string` type in package 0x7f. Entry `i`
/// gets the ID `0x7f01000i`, each holding values for one or more locales
/// (`""` is the default configuration).
#[derive(Debug, Clone, Default)]
pub struct FixtureTable {
    pub entries: Vec<Vec<(String, FixtureValue)>>,
    pub encoding: TypeEncoding,
    pub compact_entries: bool,
    pub utf16_strings: bool
}

impl FixtureTable {
    /// A table whose only entry is a string in each of the given locales.
    pub fn localized(values: &[(&str, &str)]) -> FixtureTable {
        FixtureTable {
            entries: vec![values
                .iter()
                .map(|(locale, text)| (locale.to_string(), FixtureValue::String(text.to_string())))
                .collect()],
            ..Default::default()
        }
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut values = PoolBuilder::default();
        let mut locales: Vec<&str> = vec![];
        for entry in &self.entries {
            for (locale, value) in entry {
                if !locales.contains(&locale.as_str()) {
                    locales.push(locale);
                }
                if let FixtureValue::String(text) = value {
                    values.intern(text);
                }
            }
        }

        let type_pool = construct_string_pool(&["string".to_string()])?;
        let keys: Vec<String> = (0..self.entries.len()).map(|i| format!("entry{i}")).collect();
        let key_pool = construct_string_pool(&keys)?;

        let spec = TableTypeSpecHeader {
            id: FIXTURE_STRING_TYPE_ID,
            res0: 0,
            types_count: locales.len() as u16,
            entry_count: self.entries.len() as u32
        };
        let spec_flags = vec![0u8; 4 * self.entries.len()];

        let mut package_body = type_pool.clone();
        package_body.extend(&key_pool);
        package_body.extend(generate_res_chunk(ChunkType::TableTypeSpec, &record_bytes(&spec)?, &spec_flags)?);
        for locale in &locales {
            package_body.extend(self.build_type_chunk(locale, &values)?);
        }

        let mut name = [0u16; 128];
        for (slot, unit) in name.iter_mut().zip("com.example".encode_utf16()) {
            *slot = unit;
        }
        let package_header_size = RES_CHUNK_HEADER_SIZE as u32 + 0x118;
        let package = TablePackageHeader {
            id: FIXTURE_PACKAGE_ID,
            name,
            type_string_offset: package_header_size,
            last_public_type: 1,
            key_string_offset: package_header_size + type_pool.len() as u32,
            last_public_key: keys.len() as u32,
            type_id_offset: 0
        };
        let package_chunk = generate_res_chunk(ChunkType::TablePackage, &record_bytes(&package)?, &package_body)?;

        let mut table_body = if self.utf16_strings {
            construct_utf16_string_pool(&values.strings)?
        } else {
            construct_string_pool(&values.strings)?
        };
        table_body.extend(package_chunk);
        generate_res_chunk(
            ChunkType::Table,
            &record_bytes(&TableHeader { package_count: 1 })?,
            &table_body
        )
    }

    fn build_type_chunk(&self, locale: &str, values: &PoolBuilder) -> Result<Vec<u8>> {
        let mut entries: Vec<u8> = vec![];
        // (entry index, byte offset) of each present entry
        let mut present: Vec<(usize, usize)> = vec![];
        for (index, entry) in self.entries.iter().enumerate() {
            let Some((_, value)) = entry.iter().find(|(l, _)| l == locale) else {
                continue;
            };
            let (data_type, data) = match value {
                FixtureValue::String(text) => (TYPE_STRING, values.ids[text.as_str()]),
                FixtureValue::Reference(id) => (TYPE_REFERENCE, *id)
            };
            present.push((index, entries.len()));
            if self.compact_entries {
                // Compact entries reuse the header: key, flags with the
                // type in the high byte, then the data
                entries.extend(record_bytes(&TableEntryHeader {
                    size: index as u16,
                    flags: ENTRY_FLAG_COMPACT | ((data_type as u16) << 8),
                    key: data
                })?);
            } else {
                entries.extend(record_bytes(&TableEntryHeader {
                    size: 8,
                    flags: 0,
                    key: index as u32
                })?);
                entries.extend(record_bytes(&ResValue {
                    size: 8,
                    res0: 0,
                    data_type,
                    data
                })?);
            }
        }

        let mut offsets: Vec<u8> = vec![];
        let (flags, entry_count) = match self.encoding {
            TypeEncoding::Dense => {
                for index in 0..self.entries.len() {
                    let offset = present
                        .iter()
                        .find(|(i, _)| *i == index)
                        .map_or(NO_ENTRY, |(_, offset)| *offset as u32);
                    offsets.extend(offset.to_le_bytes());
                }
                (0, self.entries.len())
            }
            TypeEncoding::Offset16 => {
                for index in 0..self.entries.len() {
                    let offset = present
                        .iter()
                        .find(|(i, _)| *i == index)
                        .map_or(NO_ENTRY16, |(_, offset)| (*offset / 4) as u16);
                    offsets.extend(offset.to_le_bytes());
                }
                (TYPE_FLAG_OFFSET16, self.entries.len())
            }
            TypeEncoding::Sparse => {
                for (index, offset) in &present {
                    offsets.extend((*index as u16).to_le_bytes());
                    offsets.extend(((*offset / 4) as u16).to_le_bytes());
                }
                (TYPE_FLAG_SPARSE, present.len())
            }
        };
        offsets.resize(offsets.len().next_multiple_of(4), 0);

        let (language, country) = match locale.split_once('-') {
            Some((language, country)) => (language, country),
            None => (locale, "")
        };
        let mut config = record_bytes(&TableConfigLocale {
            size: 64,
            mcc: 0,
            mnc: 0,
            language: locale_code(language),
            country: locale_code(country)
        })?;
        config.resize(64, 0);

        // 0x54 bytes of header: chunk header, type header and config
        let header_size = RES_CHUNK_HEADER_SIZE + 12 + config.len();
        let mut header_ext = record_bytes(&TableTypeHeader {
            id: FIXTURE_STRING_TYPE_ID,
            flags,
            reserved: 0,
            entry_count: entry_count as u32,
            entries_start: (header_size + offsets.len()) as u32
        })?;
        header_ext.extend(config);

        offsets.extend(entries);
        generate_res_chunk(ChunkType::TableType, &header_ext, &offsets)
    }
}

fn locale_code(code: &str) -> [u8; 2] {
    match code.as_bytes() {
        [a, b] => [*a, *b],
        _ => [0, 0]
    }
}

#[derive(Debug, Clone, Default)]
pub enum FixtureLabel {
    #[default]
    None,
    Literal(String),
    /// `android:label` references entry 0 of this table
    Resource(FixtureTable)
}

/// An in-memory APK with a compiled manifest and, for resource labels, a
/// resource table.
#[derive(Debug, Clone, Default)]
pub struct FixtureApk {
    pub package_name: Option<String>,
    pub version_name: Option<String>,
    pub version_code: Option<u32>,
    pub min_sdk_version: Option<u32>,
    pub target_sdk_version: Option<u32>,
    pub label: FixtureLabel,
    pub permissions: Vec<String>,
    pub strip_attribute_names: bool,
    pub extra_files: Vec<(String, Vec<u8>)>
}

impl FixtureApk {
    /// A complete app with a literal label.
    pub fn new(package_name: &str, label: &str, version_name: &str) -> FixtureApk {
        FixtureApk {
            package_name: Some(package_name.to_string()),
            version_name: Some(version_name.to_string()),
            version_code: Some(1),
            label: FixtureLabel::Literal(label.to_string()),
            ..Default::default()
        }
    }

    pub fn manifest_xml(&self) -> String {
        let mut manifest = format!("<manifest xmlns:android=\"{ANDROID_NAMESPACE}\"");
        if let Some(package) = &self.package_name {
            manifest += &format!(" package=\"{}\"", escape_str_attribute(package));
        }
        if let Some(code) = self.version_code {
            manifest += &format!(" android:versionCode=\"{code}\"");
        }
        if let Some(name) = &self.version_name {
            manifest += &format!(" android:versionName=\"{}\"", escape_str_attribute(name));
        }
        manifest += ">\n";

        if self.min_sdk_version.is_some() || self.target_sdk_version.is_some() {
            manifest += "  <uses-sdk";
            if let Some(min) = self.min_sdk_version {
                manifest += &format!(" android:minSdkVersion=\"{min}\"");
            }
            if let Some(target) = self.target_sdk_version {
                manifest += &format!(" android:targetSdkVersion=\"{target}\"");
            }
            manifest += " />\n";
        }
        for permission in &self.permissions {
            manifest += &format!(
                "  <uses-permission android:name=\"{}\" />\n",
                escape_str_attribute(permission)
            );
        }

        match &self.label {
            FixtureLabel::None => manifest += "  <application />\n",
            FixtureLabel::Literal(label) => {
                manifest += &format!(
                    "  <application android:label=\"{}\" />\n",
                    escape_str_attribute(label)
                )
            }
            FixtureLabel::Resource(_) => {
                manifest += &format!("  <application android:label=\"@0x{LABEL_RESOURCE_ID:08x}\" />\n")
            }
        }
        manifest += "</manifest>\n";
        manifest
    }

    pub fn files(&self) -> Result<Vec<File>> {
        let mut files = vec![File {
            path: ANDROID_MANIFEST.to_string(),
            data: compile_xml(&self.manifest_xml(), self.strip_attribute_names)?
        }];
        if let FixtureLabel::Resource(table) = &self.label {
            files.push(File {
                path: RESOURCE_TABLE.to_string(),
                data: table.build()?
            });
        }
        files.extend(self.extra_files.iter().map(|(path, data)| File {
            path: path.clone(),
            data: data.clone()
        }));
        Ok(files)
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        zip_apk_to_vec(&self.files()?)
    }
}
