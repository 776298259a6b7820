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

//! Writable records for the v2/v3 signing block layout, used to build test
//! APKs. `signing_block` reads the same layout by hand since it only wants
//! the certificates.

use deku::prelude::*;
use vet_common::*;

#[derive(Debug, Clone, DekuWrite)]
pub struct SigningBlockRecord {
    // Counts everything after itself, so it equals size_of_self_counted
    pub size_of_self_not_counted: u64,
    pub pairs: Vec<Prefixed64<SchemePair>>,
    pub size_of_self_counted: u64,
    pub magic: [u8; 16]
}

#[derive(Debug, Clone, DekuWrite)]
pub struct SchemePair {
    pub id: u32,
    pub value: Vec<u8>
}

/// A u32 length-prefixed sequence of u32 length-prefixed items, the shape of
/// every list inside a scheme block.
pub type Sequence<T> = Prefixed32<Vec<Prefixed32<T>>>;

/// Present in v3 signers and their signed data, absent in v2.
#[derive(Debug, Clone, Copy, DekuWrite)]
pub struct SdkRange {
    pub min_sdk: u32,
    pub max_sdk: u32
}

#[derive(Debug, Clone, DekuWrite)]
pub struct SchemeBlockRecord {
    pub signers: Sequence<SignerRecord>
}

#[derive(Debug, Clone, DekuWrite)]
pub struct SignerRecord {
    pub signed_data: Prefixed32<SignedDataRecord>,
    pub sdk_range: Option<SdkRange>,
    pub signatures: Sequence<AlgorithmValue>,
    // SubjectPublicKeyInfo, DER
    pub public_key: Prefixed32<Vec<u8>>
}

#[derive(Debug, Clone, DekuWrite)]
pub struct SignedDataRecord {
    pub digests: Sequence<AlgorithmValue>,
    // X.509 certificates, DER
    pub certificates: Sequence<Vec<u8>>,
    pub sdk_range: Option<SdkRange>,
    // Length of an empty attribute list
    pub additional_attributes: u32
}

/// A digest or a signature: algorithm ID followed by the prefixed bytes.
#[derive(Debug, Clone, DekuWrite)]
pub struct AlgorithmValue {
    pub algorithm_id: u32,
    pub value: Prefixed32<Vec<u8>>
}

#[derive(Debug, Clone, DekuWrite)]
pub struct Prefixed64<T: DekuWriter> {
    pub length: u64,
    pub value: T
}

#[derive(Debug, Clone, DekuWrite)]
pub struct Prefixed32<T: DekuWriter> {
    pub length: u32,
    pub value: T
}

#[derive(Debug, Clone, DekuWrite)]
struct Unprefixed<T: DekuWriter> {
    value: T
}

fn encoded_len<T: DekuWriter + Clone>(value: &T) -> Result<usize> {
    let bytes = Unprefixed {
        value: value.clone()
    }
    .to_bytes()
    .map_err(VetError::ByteSerialisationFailed)?;
    Ok(bytes.len())
}

impl<T: DekuWriter + Clone> Prefixed32<T> {
    pub fn new(value: T) -> Result<Self> {
        let length = u32::try_from(encoded_len(&value)?)
            .map_err(|_| VetError::SigningBlockMalformed("value longer than u32::MAX".into()))?;
        Ok(Prefixed32 { length, value })
    }
}

impl<T: DekuWriter + Clone> Prefixed64<T> {
    pub fn new(value: T) -> Result<Self> {
        Ok(Prefixed64 {
            length: encoded_len(&value)? as u64,
            value
        })
    }
}

/// Wraps each item, then the whole list.
pub fn sequence<T: DekuWriter + Clone>(items: Vec<T>) -> Result<Sequence<T>> {
    let items = items
        .into_iter()
        .map(Prefixed32::new)
        .collect::<Result<Vec<_>>>()?;
    Prefixed32::new(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_count_encoded_bytes() {
        let prefixed = Prefixed32::new(vec![1u8, 2, 3]).unwrap();
        assert_eq!(prefixed.to_bytes().unwrap(), [3, 0, 0, 0, 1, 2, 3]);

        let list = sequence(vec![vec![7u8], vec![8u8, 9]]).unwrap();
        assert_eq!(
            list.to_bytes().unwrap(),
            [11, 0, 0, 0, 1, 0, 0, 0, 7, 2, 0, 0, 0, 8, 9]
        );
    }

    #[test]
    fn v2_signer_has_no_sdk_range() {
        let range = SdkRange { min_sdk: 24, max_sdk: 30 };
        let digest = AlgorithmValue {
            algorithm_id: 0x0103,
            value: Prefixed32::new(vec![]).unwrap()
        };
        let signed = |sdk_range| SignedDataRecord {
            digests: sequence(vec![digest.clone()]).unwrap(),
            certificates: sequence(vec![]).unwrap(),
            sdk_range,
            additional_attributes: 0
        };
        let v2_len = signed(None).to_bytes().unwrap().len();
        let v3_len = signed(Some(range)).to_bytes().unwrap().len();
        assert_eq!(v3_len, v2_len + 8);
    }
}
