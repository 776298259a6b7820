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

use std::io::{Cursor, Read, Seek, Write};

use vet_common::*;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

pub const ANDROID_MANIFEST: &str = "AndroidManifest.xml";
pub const RESOURCE_TABLE: &str = "resources.arsc";
// Declared sizes come from the archive, so only trust them this far
const MAX_PREALLOCATION: u64 = 1 << 20;

pub struct File {
    pub path: String,
    pub data: Vec<u8>
}

fn initial_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size.min(MAX_PREALLOCATION)).unwrap_or(0)
}

/// Read-only view over an APK held in memory.
pub struct ApkArchive<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>
}

impl<'a> ApkArchive<'a> {
    pub fn new(apk_bytes: &'a [u8]) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(apk_bytes))?;
        tracing::debug!(entries = zip.len(), "opened APK archive");
        Ok(ApkArchive { zip })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Decompresses a single entry, failing with [VetError::MissingApkEntry] when
    /// it isn't in the archive.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(VetError::MissingApkEntry(name.to_string()))
            }
            Err(e) => return Err(e.into())
        };
        let mut data = Vec::with_capacity(initial_capacity(entry.size()));
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Like [ApkArchive::read_file], but a missing entry is not an error.
    pub fn read_optional_file(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.read_file(name) {
            Ok(data) => Ok(Some(data)),
            Err(VetError::MissingApkEntry(_)) => Ok(None),
            Err(e) => Err(e)
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        self.zip.file_names().map(String::from).collect()
    }

    /// Returns the entry names matching `predicate`, sorted so callers see a
    /// stable order regardless of how the archive was written.
    pub fn find_files<P: Fn(&str) -> bool>(&self, predicate: P) -> Vec<String> {
        let mut names: Vec<String> = self
            .zip
            .file_names()
            .filter(|name| predicate(name))
            .map(String::from)
            .collect();
        names.sort();
        names
    }
}

const UNCOMPRESSED_FILES: &[&str] = &[RESOURCE_TABLE];

// Output can be a file *or* a buffer in memory
pub fn zip_apk<T: Write + Seek>(files: &[File], output: T) -> Result<()> {
    let mut zip = ZipWriter::new(output);
    let compressed_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .with_alignment(4);
    // Some files in APKs are not allowed to be compressed
    let uncompressed_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .with_alignment(4);

    for file in files {
        let options = if UNCOMPRESSED_FILES.contains(&file.path.as_str()) {
            uncompressed_options
        } else {
            compressed_options
        };
        zip.start_file(file.path.as_str(), options)
            .map_err(|e| VetError::ZipWritingFailed(e.into()))?;
        zip.write_all(&file.data)?;
    }

    zip.finish()
        .map_err(|e| VetError::ZipWritingFailed(e.into()))?;
    Ok(())
}

/// Convenience wrapper around [zip_apk] for building archives in memory.
pub fn zip_apk_to_vec(files: &[File]) -> Result<Vec<u8>> {
    let mut zip_buf = vec![];
    zip_apk(files, Cursor::new(&mut zip_buf))?;
    Ok(zip_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_apk() -> Vec<u8> {
        zip_apk_to_vec(&[
            File {
                path: ANDROID_MANIFEST.into(),
                data: vec![3, 0, 8, 0]
            },
            File {
                path: RESOURCE_TABLE.into(),
                data: vec![2, 0, 12, 0]
            },
            File {
                path: "META-INF/CERT.RSA".into(),
                data: b"pkcs7".to_vec()
            },
        ])
        .unwrap()
    }

    #[test]
    fn reads_back_written_entries() {
        let apk = sample_apk();
        let mut archive = ApkArchive::new(&apk).unwrap();
        assert!(archive.contains(ANDROID_MANIFEST));
        assert_eq!(archive.read_file(RESOURCE_TABLE).unwrap(), vec![2, 0, 12, 0]);
        assert_eq!(archive.file_names().len(), 3);
    }

    #[test]
    fn missing_entry_is_reported_by_name() {
        let apk = sample_apk();
        let mut archive = ApkArchive::new(&apk).unwrap();
        match archive.read_file("classes.dex") {
            Err(VetError::MissingApkEntry(name)) => assert_eq!(name, "classes.dex"),
            other => panic!("unexpected result {other:?}")
        }
        assert!(archive.read_optional_file("classes.dex").unwrap().is_none());
    }

    #[test]
    fn finds_signature_files() {
        let apk = sample_apk();
        let archive = ApkArchive::new(&apk).unwrap();
        let found = archive.find_files(|name| name.starts_with("META-INF/"));
        assert_eq!(found, vec!["META-INF/CERT.RSA".to_string()]);
    }

    #[test]
    fn declared_size_does_not_drive_allocation() {
        assert_eq!(initial_capacity(4), 4);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOCATION as usize);
    }

    #[test]
    fn reads_entry_with_inflated_declared_size() {
        let mut apk = zip_apk_to_vec(&[File {
            path: "classes.dex".into(),
            data: vec![7; 64]
        }])
        .unwrap();
        // Claim almost 4GiB in the central directory's uncompressed size
        let central = apk
            .windows(4)
            .position(|window| window == b"PK\x01\x02")
            .unwrap();
        apk[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let mut archive = ApkArchive::new(&apk).unwrap();
        assert_eq!(archive.read_file("classes.dex").unwrap(), vec![7; 64]);
    }

    #[test]
    fn rejects_non_zip_input() {
        assert!(matches!(
            ApkArchive::new(b"definitely not a zip"),
            Err(VetError::ZipReadingFailed(_))
        ));
    }
}
