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

use std::{io, rc::Rc};

use deku::prelude::*;
use thiserror::Error;
use zip::result::ZipError;

/// Common error type making it easier to share `Result`s between VET crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone, Error)]
pub enum VetError {
    /// vet-cli encountered an error while processing something specific to the
    /// command line implementation, such as an unreadable input path.
    #[error("{0}")]
    Cli(String),
    /// An error occurred while reading from or writing to disk. Only `vet-cli`
    /// touches the filesystem, so this usually means a bad path was passed.
    #[error("File I/O failed: {0}")]
    FileIoError(Rc<io::Error>),
    /// The uploaded bytes could not be opened as a zip archive, or one of its
    /// entries could not be decompressed.
    #[error("Could not read the APK archive: {0}")]
    ZipReadingFailed(Rc<ZipError>),
    /// `vet-zip` failed to create a zip file in-memory.
    #[error("Could not write zip archive: {0}")]
    ZipWritingFailed(Rc<ZipError>),
    /// A file that every APK must contain (eg. `AndroidManifest.xml`) was not
    /// present in the archive.
    #[error("The APK does not contain {0}")]
    MissingApkEntry(String),
    /// A fixed-size binary record (chunk header, attribute, entry, signing block
    /// footer) could not be decoded. See [DekuError].
    #[error("Could not decode binary record: {0}")]
    ByteDeserialisationFailed(DekuError),
    /// The fixture builders failed to serialise a binary record. See [DekuError].
    #[error("Could not encode binary record: {0}")]
    ByteSerialisationFailed(DekuError),
    /// A chunk in a binary XML file or resource table declared sizes or offsets
    /// that do not fit inside the data it was read from.
    #[error("Malformed resource chunk: {0}")]
    MalformedChunk(String),
    /// Something referred to a string pool entry that does not exist.
    #[error("String pool index {index} is out of range ({count} strings)")]
    StringPoolIndexOutOfRange { index: u32, count: usize },
    /// An attribute referenced a resource ID that isn't in `resources.arsc`, or
    /// the reference chain was too long to follow.
    #[error("Could not resolve resource reference 0x{0:08x}")]
    UnresolvedReference(u32),
    /// One or more of the app name, package name or version could not be
    /// extracted. The APK may be corrupt or malformed.
    #[error(
        "Could not extract essential details (missing: {}). The APK may be corrupt or malformed.",
        .missing.join(", ")
    )]
    ExtractionIncomplete { missing: Vec<&'static str> },
    /// The End Of Central Directory marker could not be found in the APK.
    #[error("Could not locate the zip central directory")]
    SignerZipParsingFailed,
    /// An APK Signing Block was present but its sizes, magic or length-prefixed
    /// sequences were inconsistent.
    #[error("Malformed APK Signing Block: {0}")]
    SigningBlockMalformed(String),
    /// The APK has neither a v2/v3 signing block nor any v1 signature file.
    #[error("No signing certificates were found in the APK")]
    NoSignatureFound,
    /// A certificate's DER bytes could not be decoded as X.509.
    #[error("Could not decode signing certificate: {0}")]
    CertificateDecodingFailed(Rc<rasn::error::DecodeError>),
    /// A certificate taken from a PKCS#7 block could not be re-encoded as DER.
    #[error("Could not encode certificate: {0}")]
    CertificateEncodingFailed(Rc<rasn::error::EncodeError>),
    /// A PKCS#7 signature block decoded, but held something other than
    /// SignedData.
    #[error("Malformed signature block: {0}")]
    DerParsingFailed(String),
    /// The store could not be reached, timed out, or answered with an
    /// unexpected status.
    #[error("Store request failed: {0}")]
    StoreRequestFailed(String),
    /// The store answered, but the page did not contain the data we expected.
    #[error("Could not understand the store page: {0}")]
    StorePageParsingFailed(String),
    /// A decoded manifest could not be pretty-printed as text XML. See
    /// [xml::writer::Error].
    #[error("Could not write XML: {0}")]
    XmlWritingFailed(Rc<xml::writer::Error>),
    /// JSON could not be encoded or decoded.
    #[error("JSON error: {0}")]
    JsonFailed(Rc<serde_json::Error>)
}

/// Result type where the error is always [VetError].
pub type Result<T> = std::result::Result<T, VetError>;

/// This makes it easier for Result<Something, VetError> to be returned from WASM functions
impl From<VetError> for String {
    fn from(value: VetError) -> Self {
        value.to_string()
    }
}

// Automatic conversion from other types of error to VetError makes the rest of the code cleaner
impl From<io::Error> for VetError {
    fn from(value: io::Error) -> Self {
        VetError::FileIoError(value.into())
    }
}

impl From<DekuError> for VetError {
    fn from(value: DekuError) -> Self {
        VetError::ByteDeserialisationFailed(value)
    }
}

impl From<ZipError> for VetError {
    fn from(value: ZipError) -> Self {
        VetError::ZipReadingFailed(value.into())
    }
}

impl From<rasn::error::DecodeError> for VetError {
    fn from(value: rasn::error::DecodeError) -> Self {
        VetError::CertificateDecodingFailed(value.into())
    }
}

impl From<rasn::error::EncodeError> for VetError {
    fn from(value: rasn::error::EncodeError) -> Self {
        VetError::CertificateEncodingFailed(value.into())
    }
}

impl From<xml::writer::Error> for VetError {
    fn from(value: xml::writer::Error) -> Self {
        VetError::XmlWritingFailed(value.into())
    }
}

impl From<serde_json::Error> for VetError {
    fn from(value: serde_json::Error) -> Self {
        VetError::JsonFailed(value.into())
    }
}
