// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;

/// The endpoint whose memory layout a buffer follows.  Service buffers are
/// kept in network order; firmware sends integers as little-endian words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor {
    Service,
    Firmware,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapPolicy {
    /// reverse the bytes of each 4-byte word (a 2-byte field is reversed whole)
    Convert,
    /// leave the bytes as transmitted
    Preserve,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructureType {
    GetMeasurementRequest,
    GetMeasurementResponse,
    SubKeyRequest,
    SubKeyResponse,
    PsgSignature,
    PsgPublicKey,
    SigmaTeardown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    ReservedHeader,
    Magic,
    Flags,
    Reserved,
    Reserved1,
    Reserved2,
    Reserved3,
    VerifierDhPubKey,
    AttestationCertificateType,
    VerifierInputContext,
    VerifierCounter,
    UserKeyChain,
    SdmSessionId,
    DeviceUniqueId,
    RomVersionNum,
    SdmFwBuildId,
    SdmFwSecurityVersionNum,
    DeviceFamilyFuseMap,
    PublicEfuseValues,
    DeviceDhPubKey,
    CmfDescriptorHash,
    NumberOfMeasurementBlocks,
    MeasurementRecordLen,
    MeasurementRecord,
    Mac,
    SizeR,
    SizeS,
    SizeX,
    SizeY,
    CurveMagic,
    Permissions,
    Cancellation,
    SignatureR,
    SignatureS,
    PointX,
    PointY,
}

use Field::*;
use SwapPolicy::*;

const GET_MEASUREMENT_REQUEST: &[(Field, SwapPolicy)] = &[
    (ReservedHeader, Convert),
    (Magic, Convert),
    (Flags, Convert),
    (VerifierDhPubKey, Preserve),
    (AttestationCertificateType, Convert),
    (Reserved2, Preserve),
    (VerifierInputContext, Preserve),
    (VerifierCounter, Convert),
    (UserKeyChain, Preserve),
];

const SUBKEY_REQUEST: &[(Field, SwapPolicy)] = &[
    (ReservedHeader, Convert),
    (Magic, Convert),
    (Reserved1, Preserve),
    (VerifierDhPubKey, Preserve),
    (AttestationCertificateType, Convert),
    (Reserved2, Preserve),
    (VerifierInputContext, Preserve),
    (VerifierCounter, Convert),
    (UserKeyChain, Preserve),
];

const GET_MEASUREMENT_RESPONSE: &[(Field, SwapPolicy)] = &[
    (ReservedHeader, Convert),
    (Magic, Convert),
    (SdmSessionId, Convert),
    (DeviceUniqueId, Preserve),
    (RomVersionNum, Convert),
    (SdmFwBuildId, Preserve),
    (SdmFwSecurityVersionNum, Convert),
    (DeviceFamilyFuseMap, Preserve),
    (Reserved, Preserve),
    (PublicEfuseValues, Convert),
    (DeviceDhPubKey, Preserve),
    (VerifierDhPubKey, Preserve),
    (CmfDescriptorHash, Preserve),
    (Reserved2, Preserve),
    (NumberOfMeasurementBlocks, Preserve),
    (Reserved3, Preserve),
    (MeasurementRecordLen, Convert),
    (MeasurementRecord, Preserve),
    (Mac, Preserve),
];

const SUBKEY_RESPONSE: &[(Field, SwapPolicy)] = &[
    (ReservedHeader, Convert),
    (Magic, Convert),
    (SdmSessionId, Convert),
    (DeviceUniqueId, Preserve),
    (RomVersionNum, Convert),
    (SdmFwBuildId, Preserve),
    (SdmFwSecurityVersionNum, Convert),
    (Reserved, Preserve),
    (PublicEfuseValues, Convert),
    (DeviceDhPubKey, Preserve),
    (VerifierDhPubKey, Preserve),
    (VerifierInputContext, Preserve),
    (VerifierCounter, Convert),
    (Mac, Preserve),
];

const PSG_SIGNATURE: &[(Field, SwapPolicy)] = &[
    (Magic, Convert),
    (SizeR, Convert),
    (SizeS, Convert),
    (CurveMagic, Convert),
    (SignatureR, Convert),
    (SignatureS, Convert),
];

const PSG_PUBLIC_KEY: &[(Field, SwapPolicy)] = &[
    (Magic, Convert),
    (SizeX, Convert),
    (SizeY, Convert),
    (CurveMagic, Convert),
    (Permissions, Convert),
    (Cancellation, Convert),
    (PointX, Convert),
    (PointY, Convert),
];

const SIGMA_TEARDOWN: &[(Field, SwapPolicy)] = &[
    (ReservedHeader, Convert),
    (Magic, Convert),
    (SdmSessionId, Convert),
];

impl StructureType {
    /// Every structure type that has an entry in the swap table
    pub const ALL: [StructureType; 7] = [
        StructureType::GetMeasurementRequest,
        StructureType::GetMeasurementResponse,
        StructureType::SubKeyRequest,
        StructureType::SubKeyResponse,
        StructureType::PsgSignature,
        StructureType::PsgPublicKey,
        StructureType::SigmaTeardown,
    ];

    fn firmware_table(self) -> &'static [(Field, SwapPolicy)] {
        match self {
            StructureType::GetMeasurementRequest => GET_MEASUREMENT_REQUEST,
            StructureType::GetMeasurementResponse => GET_MEASUREMENT_RESPONSE,
            StructureType::SubKeyRequest => SUBKEY_REQUEST,
            StructureType::SubKeyResponse => SUBKEY_RESPONSE,
            StructureType::PsgSignature => PSG_SIGNATURE,
            StructureType::PsgPublicKey => PSG_PUBLIC_KEY,
            StructureType::SigmaTeardown => SIGMA_TEARDOWN,
        }
    }

    pub fn fields(self) -> impl Iterator<Item = Field> {
        self.firmware_table().iter().map(|(f, _)| *f)
    }
}

/// Look up the swap policy of `field` within `structure` for `actor`
pub fn policy(structure: StructureType, actor: Actor, field: Field) -> Result<SwapPolicy, Error> {
    let p = structure
        .firmware_table()
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, p)| *p)
        .ok_or_else(|| {
            Error::Endianness(format!("field {field:?} is not part of {structure:?}"))
        })?;

    Ok(match actor {
        Actor::Service => Preserve,
        Actor::Firmware => p,
    })
}

/// Apply a swap policy to the given field bytes.  The operation is its own
/// inverse, so it serves both directions.
pub fn apply(bytes: &[u8], policy: SwapPolicy) -> Result<Vec<u8>, Error> {
    match policy {
        Preserve => Ok(bytes.to_vec()),
        Convert => match bytes.len() {
            0 | 1 => Ok(bytes.to_vec()),
            2 => Ok(bytes.iter().rev().copied().collect()),
            n if n % 4 == 0 => Ok(bytes
                .chunks_exact(4)
                .flat_map(|w| w.iter().rev().copied())
                .collect()),
            n => Err(Error::Endianness(format!(
                "cannot swap a {n}-byte field in 4-byte words"
            ))),
        },
    }
}

/// Convert the bytes of `field` between `actor` order and service order
pub fn convert(
    bytes: &[u8],
    structure: StructureType,
    field: Field,
    actor: Actor,
) -> Result<Vec<u8>, Error> {
    apply(bytes, policy(structure, actor, field)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn convert_swaps_words() {
        let r = convert(
            &hex!("0102030405060708"),
            StructureType::PsgSignature,
            SignatureR,
            Actor::Firmware,
        )
        .unwrap();

        assert_eq!(r, hex!("0403020108070605"));
    }

    #[test]
    fn convert_two_bytes() {
        let r = convert(
            &hex!("3412"),
            StructureType::GetMeasurementResponse,
            MeasurementRecordLen,
            Actor::Firmware,
        )
        .unwrap();

        assert_eq!(r, hex!("1234"));
    }

    #[test]
    fn service_actor_is_identity() {
        for s in StructureType::ALL {
            for f in s.fields() {
                assert_eq!(policy(s, Actor::Service, f).unwrap(), Preserve);
            }
        }
    }

    #[test]
    fn byte_strings_are_preserved() {
        let r = convert(
            &hex!("695D48644C08D307"),
            StructureType::GetMeasurementResponse,
            DeviceUniqueId,
            Actor::Firmware,
        )
        .unwrap();

        assert_eq!(r, hex!("695D48644C08D307"));
    }

    #[test]
    fn foreign_field_is_rejected() {
        let r = policy(StructureType::SigmaTeardown, Actor::Firmware, Mac);

        assert!(matches!(r, Err(Error::Endianness(_))));
    }

    #[test]
    fn odd_length_cannot_be_converted() {
        assert!(apply(&[1, 2, 3], Convert).is_err());
    }
}
