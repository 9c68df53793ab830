// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::endianness::{convert, Actor, Field, StructureType};
use super::errors::Error;

/// One entry of a field layout: which field, and how many bytes it takes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    pub len: usize,
}

pub const fn spec(field: Field, len: usize) -> FieldSpec {
    FieldSpec { field, len }
}

/// Decoded fields, in wire order, already converted to service order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(Field, Vec<u8>)>,
}

impl Record {
    pub fn get(&self, field: Field) -> Result<&[u8], Error> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| Error::Layout(format!("field {field:?} not decoded")))
    }

    pub fn u8(&self, field: Field) -> Result<u8, Error> {
        Ok(u8::from_be_bytes(fixed(self.get(field)?, field)?))
    }

    pub fn u16(&self, field: Field) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(fixed(self.get(field)?, field)?))
    }

    pub fn u32(&self, field: Field) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(fixed(self.get(field)?, field)?))
    }

    pub fn array<const N: usize>(&self, field: Field) -> Result<[u8; N], Error> {
        fixed(self.get(field)?, field)
    }

    fn push(&mut self, field: Field, value: Vec<u8>) {
        self.fields.push((field, value));
    }
}

fn fixed<const N: usize>(v: &[u8], field: Field) -> Result<[u8; N], Error> {
    v.try_into().map_err(|_| {
        Error::Layout(format!(
            "field {field:?} is {} bytes, expected {N}",
            v.len()
        ))
    })
}

/// Cursor over a received buffer that decodes fields according to a layout.
/// Variable-length parts are decoded in stages, with lengths taken from
/// fields read earlier.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    structure: StructureType,
    actor: Actor,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8], structure: StructureType, actor: Actor) -> Self {
        Self {
            buf,
            pos: 0,
            structure,
            actor,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    /// Unread bytes
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Raw (unconverted) bytes between two positions
    pub fn raw(&self, from: usize, to: usize) -> Result<&'a [u8], Error> {
        self.buf
            .get(from..to)
            .ok_or_else(|| Error::Layout(format!("range {from}..{to} out of buffer")))
    }

    pub fn advance(&mut self, n: usize) -> Result<(), Error> {
        self.take_raw(n, "advance").map(|_| ())
    }

    fn take_raw(&mut self, n: usize, what: &str) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.buf.len());

        match end {
            Some(end) => {
                let v = &self.buf[self.pos..end];
                self.pos = end;
                Ok(v)
            }
            None => Err(Error::Protocol(format!(
                "{:?} truncated at {what}: need {n} bytes at offset {}, have {}",
                self.structure,
                self.pos,
                self.buf.len() - self.pos
            ))),
        }
    }

    pub fn read(&mut self, field: Field, len: usize) -> Result<Vec<u8>, Error> {
        let raw = self.take_raw(len, &format!("{field:?}"))?;

        convert(raw, self.structure, field, self.actor)
    }

    pub fn decode(&mut self, layout: &[FieldSpec]) -> Result<Record, Error> {
        let mut r = Record::default();

        for s in layout {
            let v = self.read(s.field, s.len)?;
            r.push(s.field, v);
        }

        Ok(r)
    }

    /// Fail if anything is left unread
    pub fn finish(&self) -> Result<(), Error> {
        if self.pos != self.buf.len() {
            return Err(Error::Protocol(format!(
                "{:?} has {} trailing bytes",
                self.structure,
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}

/// Builds a buffer for `actor` out of service-order field values
pub struct Writer {
    buf: Vec<u8>,
    structure: StructureType,
    actor: Actor,
}

impl Writer {
    pub fn new(structure: StructureType, actor: Actor) -> Self {
        Self {
            buf: vec![],
            structure,
            actor,
        }
    }

    pub fn put(&mut self, field: Field, value: &[u8]) -> Result<&mut Self, Error> {
        let v = convert(value, self.structure, field, self.actor)?;
        self.buf.extend_from_slice(&v);
        Ok(self)
    }

    /// Put a value that must have exactly `len` bytes
    pub fn put_fixed(
        &mut self,
        field: Field,
        value: &[u8],
        len: usize,
    ) -> Result<&mut Self, Error> {
        if value.len() != len {
            return Err(Error::Layout(format!(
                "field {field:?} is {} bytes, expected {len}",
                value.len()
            )));
        }
        self.put(field, value)
    }

    pub fn put_u32(&mut self, field: Field, value: u32) -> Result<&mut Self, Error> {
        self.put(field, &value.to_be_bytes())
    }

    pub fn put_u16(&mut self, field: Field, value: u16) -> Result<&mut Self, Error> {
        self.put(field, &value.to_be_bytes())
    }

    pub fn put_u8(&mut self, field: Field, value: u8) -> Result<&mut Self, Error> {
        self.put(field, &[value])
    }

    pub fn zeros(&mut self, field: Field, len: usize) -> Result<&mut Self, Error> {
        self.put(field, &vec![0u8; len])
    }

    /// Append bytes that were encoded elsewhere (e.g. a nested PSG record)
    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const TEARDOWN: &[FieldSpec] = &[
        spec(Field::ReservedHeader, 4),
        spec(Field::Magic, 4),
        spec(Field::SdmSessionId, 4),
    ];

    #[test]
    fn decode_converts_fields() {
        let buf = hex!("00000000 D5000000 FFFFFFFF");
        let mut r = Reader::new(&buf, StructureType::SigmaTeardown, Actor::Firmware);

        let rec = r.decode(TEARDOWN).unwrap();
        r.finish().unwrap();

        assert_eq!(rec.u32(Field::Magic).unwrap(), 0xD5);
        assert_eq!(rec.u32(Field::SdmSessionId).unwrap(), 0xFFFF_FFFF);
        assert!(rec.get(Field::Mac).is_err());
    }

    #[test]
    fn decode_truncated() {
        let buf = hex!("00000000 D5000000");
        let mut r = Reader::new(&buf, StructureType::SigmaTeardown, Actor::Firmware);

        assert!(matches!(r.decode(TEARDOWN), Err(Error::Protocol(_))));
    }

    #[test]
    fn writer_is_inverse_of_reader() {
        let mut w = Writer::new(StructureType::SigmaTeardown, Actor::Firmware);
        w.zeros(Field::ReservedHeader, 4)
            .unwrap()
            .put_u32(Field::Magic, 0xD5)
            .unwrap()
            .put_u32(Field::SdmSessionId, 7)
            .unwrap();
        let buf = w.finish();

        assert_eq!(buf, hex!("00000000 D5000000 07000000"));

        let rec = Reader::new(&buf, StructureType::SigmaTeardown, Actor::Firmware)
            .decode(TEARDOWN)
            .unwrap();
        assert_eq!(rec.u32(Field::SdmSessionId).unwrap(), 7);
    }

    #[test]
    fn writer_rejects_foreign_field() {
        let mut w = Writer::new(StructureType::SigmaTeardown, Actor::Firmware);

        assert!(matches!(w.put(Field::Mac, &[0; 48]), Err(Error::Endianness(_))));
    }
}
