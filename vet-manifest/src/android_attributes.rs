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

use phf::phf_map;

pub const ANDROID_NAMESPACE: &str = "http://schemas.android.com/apk/res/android";

// Framework attribute IDs from android.R.attr. Shrunk manifests drop the
// attribute names from the string pool, leaving only these IDs in the
// resource map, so lookups go through the ID first.
static ANDROID_ATTRIBUTES: phf::Map<&'static str, u32> = phf_map! {
    "label" => 0x01010001,
    "icon" => 0x01010002,
    "name" => 0x01010003,
    "debuggable" => 0x0101000f,
    "minSdkVersion" => 0x0101020c,
    "versionCode" => 0x0101021b,
    "versionName" => 0x0101021c,
    "targetSdkVersion" => 0x01010270,
    "maxSdkVersion" => 0x01010271,
    "compileSdkVersion" => 0x01010572,
    "compileSdkVersionCodename" => 0x01010573,
};

pub fn attribute_id_for_name(name: &str) -> Option<u32> {
    ANDROID_ATTRIBUTES.get(name).copied()
}

pub fn attribute_name_for_id(id: u32) -> Option<&'static str> {
    ANDROID_ATTRIBUTES
        .entries()
        .find(|(_, attribute_id)| **attribute_id == id)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_both_ways() {
        assert_eq!(attribute_id_for_name("versionName"), Some(0x0101021c));
        assert_eq!(attribute_name_for_id(0x01010003), Some("name"));
        assert_eq!(attribute_id_for_name("theme"), None);
        assert_eq!(attribute_name_for_id(0x7f010000), None);
    }
}
