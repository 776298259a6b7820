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

use std::{collections::HashMap, io::Write};

use vet_common::*;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use crate::xml_file::{XmlDocument, XmlElement, XmlNode};

/// Renders a decoded binary XML document back into indented text XML.
pub fn render_xml(document: &XmlDocument) -> Result<String> {
    let mut output = vec![];
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .create_writer(&mut output);
    let mut prefixes = HashMap::new();
    write_element(&mut writer, &document.root, &mut prefixes)?;
    drop(writer);
    Ok(String::from_utf8_lossy(&output).into_owned())
}

// Namespaced names are written with the prefix their URI was declared with
fn qualified_name(namespace: Option<&str>, name: &str, prefixes: &HashMap<String, String>) -> String {
    match namespace.and_then(|uri| prefixes.get(uri)) {
        Some(prefix) => format!("{prefix}:{name}"),
        None => name.to_string()
    }
}

fn write_element<W: Write>(
    writer: &mut EventWriter<W>,
    element: &XmlElement,
    prefixes: &mut HashMap<String, String>
) -> Result<()> {
    for (prefix, uri) in &element.namespace_declarations {
        prefixes.insert(uri.clone(), prefix.clone());
    }

    let name = qualified_name(element.namespace.as_deref(), &element.name, prefixes);
    let attributes: Vec<(String, String)> = element
        .attributes
        .iter()
        .map(|attribute| {
            (
                qualified_name(attribute.namespace.as_deref(), &attribute.name, prefixes),
                attribute.value.to_string()
            )
        })
        .collect();

    let mut start = XmlEvent::start_element(name.as_str());
    for (prefix, uri) in &element.namespace_declarations {
        start = start.ns(prefix.as_str(), uri.as_str());
    }
    for (name, value) in &attributes {
        start = start.attr(name.as_str(), value.as_str());
    }
    writer.write(start)?;

    for child in &element.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child, prefixes)?,
            XmlNode::Text(text) => writer.write(XmlEvent::characters(text))?
        }
    }
    writer.write(XmlEvent::end_element())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixtures::FixtureApk, read_apk_manifest};

    #[test]
    fn renders_manifest_with_android_prefix() {
        let apk = FixtureApk {
            permissions: vec!["android.permission.CAMERA".into()],
            ..FixtureApk::new("com.example.camera", "Camera & Co", "5.0")
        };
        let manifest = read_apk_manifest(&apk.build().unwrap()).unwrap();
        let text = render_xml(&manifest.document).unwrap();

        assert!(text.starts_with("<?xml"));
        assert!(text.contains("xmlns:android=\"http://schemas.android.com/apk/res/android\""));
        assert!(text.contains("package=\"com.example.camera\""));
        assert!(text.contains("android:versionName=\"5.0\""));
        assert!(text.contains("android:versionCode=\"1\""));
        assert!(text.contains("<uses-permission android:name=\"android.permission.CAMERA\""));
        assert!(text.contains("android:label=\"Camera &amp; Co\""));
    }
}
