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

use std::fmt;

use serde::Serialize;
use tracing::warn;
use vet_common::*;

use crate::{
    android_attributes::{attribute_name_for_id, ANDROID_NAMESPACE},
    read_record, read_res_chunk, read_u32,
    resource_external_types::{self as ext, *},
    string_pool::StringPool,
    ResChunk
};

/// A decoded binary XML file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XmlDocument {
    pub root: XmlElement
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub name: String,
    /// `(prefix, uri)` pairs declared on this element
    pub namespace_declarations: Vec<(String, String)>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub name: String,
    // Present when the name is backed by the resource map
    pub resource_id: Option<u32>,
    pub value: TypedValue
}

/// A `Res_value`, with strings already looked up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypedValue {
    Null,
    String(String),
    Reference(u32),
    Attribute(u32),
    Integer(i32),
    Hex(u32),
    Boolean(bool),
    Float(f32),
    Color(u32),
    Dimension(u32),
    Fraction(u32),
    Other { data_type: u8, data: u32 }
}

impl TypedValue {
    pub fn decode(data_type: u8, data: u32, strings: &StringPool) -> Result<TypedValue> {
        Ok(match data_type {
            TYPE_NULL => TypedValue::Null,
            TYPE_STRING => TypedValue::String(strings.get(data)?.to_string()),
            TYPE_REFERENCE | TYPE_DYNAMIC_REFERENCE => TypedValue::Reference(data),
            TYPE_ATTRIBUTE => TypedValue::Attribute(data),
            TYPE_INT_DEC => TypedValue::Integer(data as i32),
            TYPE_INT_HEX => TypedValue::Hex(data),
            TYPE_INT_BOOLEAN => TypedValue::Boolean(data != 0),
            TYPE_FLOAT => TypedValue::Float(f32::from_bits(data)),
            TYPE_DIMENSION => TypedValue::Dimension(data),
            TYPE_FRACTION => TypedValue::Fraction(data),
            TYPE_FIRST_COLOR_INT..=TYPE_LAST_COLOR_INT => TypedValue::Color(data),
            _ => TypedValue::Other { data_type, data }
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None
        }
    }

    /// Integers are sometimes stored as strings (`minSdkVersion="Q"` style
    /// codenames are left alone and return None).
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(i) => Some(*i as i64),
            TypedValue::Hex(h) => Some(*h as i64),
            TypedValue::String(s) => s.trim().parse().ok(),
            _ => None
        }
    }
}

// Complex values pack a 24-bit mantissa, a radix and a unit into one u32
fn complex_to_float(data: u32) -> f32 {
    const RADIX_MULTIPLIERS: [f32; 4] = [
        1.0 / (1u32 << 8) as f32,
        1.0 / (1u32 << 15) as f32,
        1.0 / (1u32 << 23) as f32,
        1.0 / (1u64 << 31) as f32
    ];
    ((data & 0xFFFF_FF00) as i32) as f32 * RADIX_MULTIPLIERS[((data >> 4) & 0x3) as usize]
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => Ok(()),
            TypedValue::String(s) => write!(f, "{s}"),
            TypedValue::Reference(id) => write!(f, "@0x{id:08x}"),
            TypedValue::Attribute(id) => write!(f, "?0x{id:08x}"),
            TypedValue::Integer(i) => write!(f, "{i}"),
            TypedValue::Hex(h) => write!(f, "0x{h:x}"),
            TypedValue::Boolean(b) => write!(f, "{b}"),
            TypedValue::Float(v) => write!(f, "{v}"),
            TypedValue::Color(c) => write!(f, "#{c:08x}"),
            TypedValue::Dimension(d) => {
                let unit = ["px", "dp", "sp", "pt", "in", "mm"]
                    .get((d & 0xF) as usize)
                    .unwrap_or(&"");
                write!(f, "{}{unit}", complex_to_float(*d))
            }
            TypedValue::Fraction(d) => {
                let unit = if d & 0xF == 1 { "%p" } else { "%" };
                write!(f, "{}{unit}", complex_to_float(*d) * 100.0)
            }
            TypedValue::Other { data_type, data } => write!(f, "(type 0x{data_type:02x})0x{data:x}")
        }
    }
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Finds an `android:` attribute by its framework ID, falling back to the
    /// namespaced name for manifests compiled without a resource map.
    pub fn android_attribute(&self, id: u32, name: &str) -> Option<&XmlAttribute> {
        self.attributes
            .iter()
            .find(|attr| attr.resource_id == Some(id))
            .or_else(|| {
                self.attributes.iter().find(|attr| {
                    attr.name == name && attr.namespace.as_deref() == Some(ANDROID_NAMESPACE)
                })
            })
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements().filter(move |element| element.name == name)
    }
}

/// Decodes a binary XML file (an `XmlFile` chunk) into an element tree.
pub fn decode_xml_document(bytes: &[u8]) -> Result<XmlDocument> {
    let file = read_res_chunk(bytes, 0)?;
    if file.chunk_type() != Some(ChunkType::XmlFile) {
        return Err(VetError::MalformedChunk(format!(
            "expected a binary XML file, found chunk type 0x{:04x}",
            file.header.chunk_type
        )));
    }

    let mut strings = StringPool::default();
    let mut resource_map: Vec<u32> = vec![];
    let mut pending_namespaces: Vec<(String, String)> = vec![];
    let mut stack: Vec<XmlElement> = vec![];
    let mut root: Option<XmlElement> = None;

    for chunk in file.children() {
        let chunk = chunk?;
        match chunk.chunk_type() {
            Some(ChunkType::StringPool) => strings = StringPool::parse(&chunk)?,
            Some(ChunkType::XmlResourceMap) => {
                let count = (chunk.bytes.len() - chunk.header_size()) / 4;
                resource_map = (0..count)
                    .map(|i| read_u32(chunk.bytes, chunk.header_size() + i * 4))
                    .collect::<Result<_>>()?;
            }
            Some(ChunkType::XmlStartNamespace) => {
                let ns: XmlNamespaceExt = read_record(chunk.bytes, chunk.header_size())?;
                pending_namespaces.push((
                    strings.get_optional(ns.prefix)?.unwrap_or_default().to_string(),
                    strings.get_optional(ns.uri)?.unwrap_or_default().to_string()
                ));
            }
            Some(ChunkType::XmlStartElement) => {
                let mut element = decode_start_element(&chunk, &strings, &resource_map)?;
                element.namespace_declarations = std::mem::take(&mut pending_namespaces);
                stack.push(element);
            }
            Some(ChunkType::XmlEndElement) => {
                let element = stack.pop().ok_or_else(|| {
                    VetError::MalformedChunk("end element without a matching start".into())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None if root.is_none() => root = Some(element),
                    None => warn!("Ignoring extra root element <{}>", element.name)
                }
            }
            Some(ChunkType::XmlCData) => {
                let cdata: XmlCDataExt = read_record(chunk.bytes, chunk.header_size())?;
                if let (Some(parent), Some(text)) = (stack.last_mut(), strings.get_optional(cdata.data)?) {
                    parent.children.push(XmlNode::Text(text.to_string()));
                }
            }
            Some(ChunkType::XmlEndNamespace) => {}
            _ => warn!(
                "Skipping unexpected chunk 0x{:04x} in binary XML",
                chunk.header.chunk_type
            )
        }
    }

    // Truncated files still give up whatever was read
    while let Some(element) = stack.pop() {
        warn!("Element <{}> was never closed", element.name);
        match stack.last_mut() {
            Some(parent) => parent.children.push(XmlNode::Element(element)),
            None => root = root.or(Some(element))
        }
    }

    root.map(|root| XmlDocument { root })
        .ok_or_else(|| VetError::MalformedChunk("binary XML has no root element".into()))
}

fn decode_start_element(
    chunk: &ResChunk,
    strings: &StringPool,
    resource_map: &[u32]
) -> Result<XmlElement> {
    let ext_offset = chunk.header_size();
    let start: XmlStartElementExt = read_record(chunk.bytes, ext_offset)?;
    let attribute_size = match start.attribute_size as usize {
        0 => 20,
        size => size
    };

    let mut attributes = Vec::with_capacity(start.attribute_count as usize);
    for i in 0..start.attribute_count as usize {
        let offset = ext_offset + start.attribute_start as usize + i * attribute_size;
        let attr: ext::XmlAttribute = read_record(chunk.bytes, offset)?;
        attributes.push(decode_attribute(&attr, strings, resource_map)?);
    }

    Ok(XmlElement {
        namespace: strings.get_optional(start.namespace)?.map(str::to_string),
        name: strings.get(start.name)?.to_string(),
        attributes,
        ..Default::default()
    })
}

fn decode_attribute(
    attr: &ext::XmlAttribute,
    strings: &StringPool,
    resource_map: &[u32]
) -> Result<XmlAttribute> {
    // The resource map runs parallel to the start of the string pool
    let resource_id = resource_map.get(attr.name as usize).copied();
    let pooled_name = strings.get(attr.name)?;
    let name = match (pooled_name.is_empty(), resource_id.and_then(attribute_name_for_id)) {
        (true, Some(known)) => known.to_string(),
        (true, None) => match resource_id {
            Some(id) => format!("0x{id:08x}"),
            None => String::new()
        },
        (false, _) => pooled_name.to_string()
    };

    let value = match TypedValue::decode(attr.value_data_type, attr.value_data, strings)? {
        // Some packers leave the typed value empty and keep only the raw string
        TypedValue::Null if attr.raw_value != UINT32_MINUS_ONE => {
            TypedValue::String(strings.get(attr.raw_value)?.to_string())
        }
        value => value
    };

    Ok(XmlAttribute {
        namespace: strings.get_optional(attr.namespace)?.map(str::to_string),
        name,
        resource_id,
        value
    })
}
