// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::endianness::{Actor, Field, StructureType};
use super::errors::Error;
use super::layout::{spec, FieldSpec, Reader, Writer};
use crate::crypto::{self, Curve};
use openssl::ec::EcKey;
use openssl::pkey::Public;

pub const SIGNATURE_MAGIC: u32 = 0x7488_1520;
pub const PUBLIC_KEY_MAGIC: u32 = 0x4065_6643;

const SECP256R1_MAGIC: u32 = 0x30;
const SECP384R1_MAGIC: u32 = 0x54;

const SIGNATURE_HEAD: &[FieldSpec] = &[
    spec(Field::Magic, 4),
    spec(Field::SizeR, 4),
    spec(Field::SizeS, 4),
    spec(Field::CurveMagic, 4),
];

const PUBLIC_KEY_HEAD: &[FieldSpec] = &[
    spec(Field::Magic, 4),
    spec(Field::SizeX, 4),
    spec(Field::SizeY, 4),
    spec(Field::CurveMagic, 4),
    spec(Field::Permissions, 4),
    spec(Field::Cancellation, 4),
];

pub fn curve_magic(curve: Curve) -> u32 {
    match curve {
        Curve::Secp256r1 => SECP256R1_MAGIC,
        Curve::Secp384r1 => SECP384R1_MAGIC,
    }
}

pub fn curve_from_magic(magic: u32) -> Result<Curve, Error> {
    match magic {
        SECP256R1_MAGIC => Ok(Curve::Secp256r1),
        SECP384R1_MAGIC => Ok(Curve::Secp384r1),
        m => Err(Error::Psg(format!("unknown curve magic {m:#x}"))),
    }
}

fn check_magic(got: u32, want: u32, what: &str) -> Result<(), Error> {
    if got != want {
        return Err(Error::Psg(format!(
            "{what} magic is {got:#010x}, expected {want:#010x}"
        )));
    }
    Ok(())
}

fn check_size(got: u32, curve: Curve, what: &str) -> Result<(), Error> {
    if got as usize != curve.size() {
        return Err(Error::Psg(format!(
            "{what} is {got} bytes, but {curve:?} needs {}",
            curve.size()
        )));
    }
    Ok(())
}

/// A signature in PSG record form: a 16-byte head followed by R and S
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PsgSignature {
    pub curve: Curve,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

impl PsgSignature {
    pub fn encoded_len(curve: Curve) -> usize {
        16 + 2 * curve.size()
    }

    /// Decode a signature from the start of `buf`, returning it together with
    /// the number of bytes consumed
    pub fn decode(buf: &[u8], actor: Actor) -> Result<(Self, usize), Error> {
        let mut r = Reader::new(buf, StructureType::PsgSignature, actor);
        let head = r.decode(SIGNATURE_HEAD)?;

        check_magic(head.u32(Field::Magic)?, SIGNATURE_MAGIC, "PSG signature")?;
        let curve = curve_from_magic(head.u32(Field::CurveMagic)?)?;
        check_size(head.u32(Field::SizeR)?, curve, "signature R")?;
        check_size(head.u32(Field::SizeS)?, curve, "signature S")?;

        let sig = Self {
            curve,
            r: r.read(Field::SignatureR, curve.size())?,
            s: r.read(Field::SignatureS, curve.size())?,
        };

        Ok((sig, r.position()))
    }

    pub fn encode(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let size = self.curve.size();
        let mut w = Writer::new(StructureType::PsgSignature, actor);

        w.put_u32(Field::Magic, SIGNATURE_MAGIC)?
            .put_u32(Field::SizeR, size as u32)?
            .put_u32(Field::SizeS, size as u32)?
            .put_u32(Field::CurveMagic, curve_magic(self.curve))?
            .put_fixed(Field::SignatureR, &self.r, size)?
            .put_fixed(Field::SignatureS, &self.s, size)?;

        Ok(w.finish())
    }

    pub fn from_der(der: &[u8], curve: Curve) -> Result<Self, Error> {
        let raw = crypto::der_to_raw(der, curve).map_err(|e| Error::Psg(e.to_string()))?;
        let (r, s) = raw.split_at(curve.size());

        Ok(Self {
            curve,
            r: r.to_vec(),
            s: s.to_vec(),
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        let mut raw = self.r.clone();
        raw.extend_from_slice(&self.s);

        crypto::raw_to_der(&raw).map_err(|e| Error::Psg(e.to_string()))
    }
}

/// A public key in PSG record form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PsgPublicKey {
    pub curve: Curve,
    pub permissions: u32,
    pub cancellation: u32,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl PsgPublicKey {
    pub fn encoded_len(curve: Curve) -> usize {
        24 + 2 * curve.size()
    }

    pub fn decode(buf: &[u8], actor: Actor) -> Result<(Self, usize), Error> {
        let mut r = Reader::new(buf, StructureType::PsgPublicKey, actor);
        let head = r.decode(PUBLIC_KEY_HEAD)?;

        check_magic(head.u32(Field::Magic)?, PUBLIC_KEY_MAGIC, "PSG public key")?;
        let curve = curve_from_magic(head.u32(Field::CurveMagic)?)?;
        check_size(head.u32(Field::SizeX)?, curve, "public key X")?;
        check_size(head.u32(Field::SizeY)?, curve, "public key Y")?;

        let key = Self {
            curve,
            permissions: head.u32(Field::Permissions)?,
            cancellation: head.u32(Field::Cancellation)?,
            x: r.read(Field::PointX, curve.size())?,
            y: r.read(Field::PointY, curve.size())?,
        };

        Ok((key, r.position()))
    }

    pub fn encode(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let size = self.curve.size();
        let mut w = Writer::new(StructureType::PsgPublicKey, actor);

        w.put_u32(Field::Magic, PUBLIC_KEY_MAGIC)?
            .put_u32(Field::SizeX, size as u32)?
            .put_u32(Field::SizeY, size as u32)?
            .put_u32(Field::CurveMagic, curve_magic(self.curve))?
            .put_u32(Field::Permissions, self.permissions)?
            .put_u32(Field::Cancellation, self.cancellation)?
            .put_fixed(Field::PointX, &self.x, size)?
            .put_fixed(Field::PointY, &self.y, size)?;

        Ok(w.finish())
    }

    pub fn to_ec_key(&self) -> Result<EcKey<Public>, Error> {
        crypto::public_key_from_xy(self.curve, &self.x, &self.y)
            .map_err(|e| Error::Psg(e.to_string()))
    }

    /// X‖Y
    pub fn xy(&self) -> Vec<u8> {
        [self.x.as_slice(), self.y.as_slice()].concat()
    }
}
