//! Walks the packed SMBIOS structure stream.
//!
//! Every access is bounds-checked against the table buffer, so malformed
//! firmware data ends the walk with [`Error::MalformedStream`] instead of
//! reading past the end.

use byteorder::{ByteOrder, LE};
use bytes::Buf;
use std::borrow::Cow;
use std::iter::FusedIterator;

use crate::error::{Error, Result};

/// Size in bytes of a structure header.
pub const HEADER_SIZE: usize = 4;

/// Structure type marking the end of the table.
pub const END_OF_TABLE: u8 = 127;

/// Indicates the type of data contained within an SMBIOS structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub header_type: u8,
    pub length: u8,
    pub handle: u16,
}

fn parse_header(mut buf: &[u8]) -> Header {
    Header {
        header_type: buf.get_u8(),
        length: buf.get_u8(),
        handle: buf.get_u16_le(),
    }
}

/// A single SMBIOS structure borrowed from the table it was found in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Structure<'a> {
    pub header: Header,
    offset: usize,
    end: usize,
    data: &'a [u8],
    strings: &'a [u8],
}

impl<'a> Structure<'a> {
    /// Parses the structure starting at `offset` in `buf`.
    pub fn parse(buf: &'a [u8], offset: usize) -> Result<Structure<'a>> {
        let malformed = |reason| Error::MalformedStream { offset, reason };

        let rest = buf.get(offset..).unwrap_or_default();
        if rest.len() < HEADER_SIZE {
            return Err(malformed("truncated structure header"));
        }

        let header = parse_header(&rest[..HEADER_SIZE]);
        let length = header.length as usize;
        if length < HEADER_SIZE {
            return Err(malformed("structure length underruns header"));
        }
        let data = rest
            .get(..length)
            .ok_or_else(|| malformed("formatted area runs past end of table"))?;

        // The string table ends at the first empty string. With no strings
        // at all the terminator is still two NUL bytes.
        let mut pos = length;
        let strings;
        let end;
        match rest.get(pos) {
            None => return Err(malformed("missing string table")),
            Some(0) => {
                strings = &rest[pos..pos];
                end = pos + 2;
            }
            Some(_) => {
                loop {
                    let nul = rest[pos..]
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or_else(|| malformed("unterminated string"))?;
                    pos += nul + 1;

                    match rest.get(pos) {
                        None => return Err(malformed("unterminated string table")),
                        Some(0) => break,
                        Some(_) => {}
                    }
                }
                strings = &rest[length..pos];
                end = pos + 1;
            }
        }

        Ok(Structure {
            header,
            offset,
            end: offset + end,
            data,
            strings,
        })
    }

    /// Offset of this structure from the start of the table.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset just past this structure's string table terminator, where the
    /// next structure begins.
    pub fn end(&self) -> usize {
        self.end
    }

    /// The header and formatted area.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// The formatted area following the header.
    pub fn formatted(&self) -> &'a [u8] {
        &self.data[HEADER_SIZE..]
    }

    /// Reads a byte at `offset` from the start of the structure.
    pub fn get_u8(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Reads a little-endian u16 at `offset` from the start of the structure.
    pub fn get_u16(&self, offset: usize) -> Option<u16> {
        self.field(offset, 2).map(LE::read_u16)
    }

    /// Reads a little-endian u32 at `offset` from the start of the structure.
    pub fn get_u32(&self, offset: usize) -> Option<u32> {
        self.field(offset, 4).map(LE::read_u32)
    }

    /// Reads a little-endian u64 at `offset` from the start of the structure.
    pub fn get_u64(&self, offset: usize) -> Option<u64> {
        self.field(offset, 8).map(LE::read_u64)
    }

    fn field(&self, offset: usize, size: usize) -> Option<&'a [u8]> {
        self.data.get(offset..offset.checked_add(size)?)
    }

    /// Iterates the raw bytes of each string in the string table.
    pub fn strings(&self) -> Strings<'a> {
        Strings { rest: self.strings }
    }

    /// Looks up a string by its 1-based index. Index 0 means "no string".
    pub fn string(&self, index: u8) -> Option<Cow<'a, str>> {
        let index = (index as usize).checked_sub(1)?;
        self.strings()
            .nth(index)
            .map(String::from_utf8_lossy)
    }

    /// Resolves the string whose index is stored in the byte at `offset`.
    pub fn string_at(&self, offset: usize) -> Option<Cow<'a, str>> {
        self.string(self.get_u8(offset)?)
    }
}

/// Iterator over the strings of a [`Structure`].
#[derive(Clone, Debug)]
pub struct Strings<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Strings<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }

        let nul = self
            .rest
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.rest.len());
        let string = &self.rest[..nul];
        self.rest = self.rest.get(nul + 1..).unwrap_or_default();

        Some(string)
    }
}

impl FusedIterator for Strings<'_> {}

/// Walks every structure in a table, in offset order.
///
/// The walk ends at the end of the buffer or at an end-of-table structure,
/// which is not yielded. A malformed structure is yielded once as an error
/// and ends the walk.
#[derive(Clone, Debug)]
pub struct Structures<'a> {
    buf: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Structures<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Structures {
            buf,
            offset: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for Structures<'a> {
    type Item = Result<Structure<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.buf.get(self.offset) {
            None | Some(&END_OF_TABLE) => {
                self.done = true;
                return None;
            }
            Some(_) => {}
        }

        match Structure::parse(self.buf, self.offset) {
            Ok(structure) => {
                self.offset = structure.end();
                Some(Ok(structure))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Structures<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unwrap_structures(buf: &[u8]) -> Vec<Structure<'_>> {
        Structures::new(buf)
            .collect::<Result<Vec<_>>>()
            .expect("expected well-formed structures")
    }

    fn strings(structure: &Structure<'_>) -> Vec<String> {
        structure
            .strings()
            .map(|s| String::from_utf8_lossy(s).to_string())
            .collect()
    }

    #[test]
    fn structure_header_only_ok() {
        let buf = [0x00, 0x04, 0x01, 0x00, 0x00, 0x00];
        let got = Structure::parse(&buf, 0).unwrap();

        assert_eq!(
            got.header,
            Header {
                header_type: 0,
                length: 4,
                handle: 1,
            }
        );
        assert!(got.formatted().is_empty());
        assert_eq!(got.strings().count(), 0);
        assert_eq!(got.end(), 6);
    }

    #[test]
    fn structure_no_strings_ok() {
        let buf = [0x01, 0x06, 0x01, 0x00, 0x01, 0x02, 0x00, 0x00];
        let got = Structure::parse(&buf, 0).unwrap();

        assert_eq!(got.formatted(), &[1, 2]);
        assert_eq!(got.strings().count(), 0);
        assert_eq!(got.string(1), None);
        assert_eq!(got.end(), 8);
    }

    #[test]
    fn structure_all_ok() {
        #[rustfmt::skip]
        let buf = [
            0x01, 0x06, 0x01, 0x00,
            0x01, 0x02,
            b'a', b'b', b'c', b'd', 0x00,
            b'1', b'2', b'3', b'4', 0x00,
            0x00,
        ];
        let got = Structure::parse(&buf, 0).unwrap();

        assert_eq!(got.formatted(), &[1, 2]);
        assert_eq!(strings(&got), vec!["abcd", "1234"]);
        assert_eq!(got.string(0), None);
        assert_eq!(got.string(2).as_deref(), Some("1234"));
        assert_eq!(got.string(3), None);
        assert_eq!(got.string_at(4).as_deref(), Some("abcd"));
        assert_eq!(got.string_at(5).as_deref(), Some("1234"));
        assert_eq!(got.end(), buf.len());
    }

    #[test]
    fn structure_fields() {
        #[rustfmt::skip]
        let buf = [
            0x11, 0x14, 0x22, 0x00,
            0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04,
            0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c,
            0x00, 0x00,
        ];
        let got = Structure::parse(&buf, 0).unwrap();

        assert_eq!(got.header.handle, 0x22);
        assert_eq!(got.get_u8(4), Some(0xde));
        assert_eq!(got.get_u16(4), Some(0xadde));
        assert_eq!(got.get_u32(4), Some(0xefbe_adde));
        assert_eq!(got.get_u64(12), Some(0x0c0b_0a09_0807_0605));
        assert_eq!(got.get_u16(19), None);
        assert_eq!(got.get_u64(usize::MAX), None);
    }

    #[test]
    fn structures_multiple_ok() {
        #[rustfmt::skip]
        let buf = [
            0x00, 0x05, 0x01, 0x00,
            0xff,
            0x00,
            0x00,

            0x01, 0x0c, 0x02, 0x00,
            0xde, 0xad, 0xbe, 0xef, 0xde, 0xad, 0xbe, 0xef,
            b'd', b'e', b'a', b'd', b'b', b'e', b'e', b'f', 0x00,
            0x00,

            127, 0x06, 0x03, 0x00,
            0x01, 0x02,
            b'a', b'b', b'c', b'd', 0x00,
            0x00,
        ];

        let got = unwrap_structures(&buf);
        assert_eq!(got.len(), 2);

        assert_eq!(got[0].offset(), 0);
        assert_eq!(got[0].header.header_type, 0);
        assert_eq!(got[0].formatted(), &[0xff]);
        assert_eq!(got[0].strings().count(), 0);

        assert_eq!(got[1].offset(), 7);
        assert_eq!(got[1].header.header_type, 1);
        assert_eq!(got[1].formatted(), &[0xde, 0xad, 0xbe, 0xef, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(strings(&got[1]), vec!["deadbeef"]);
    }

    #[test]
    fn structures_end_of_buffer() {
        let buf = [0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x01, 0x04, 0x02, 0x00, 0x00, 0x00];
        let got = unwrap_structures(&buf);

        assert_eq!(got.len(), 2);
        assert_eq!(got[1].offset(), 6);
    }

    #[test]
    fn structures_zero_length_header() {
        #[rustfmt::skip]
        let buf = [
            0x00, 0x04, 0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x02, 0x00, 0x00, 0x00,
            0x03, 0x04, 0x03, 0x00, 0x00, 0x00,
        ];

        let mut walk = Structures::new(&buf);
        assert_eq!(walk.next().unwrap().unwrap().offset(), 0);

        let err = walk.next().unwrap().expect_err("expected malformed header");
        assert!(matches!(err, Error::MalformedStream { offset: 6, .. }));

        assert!(walk.next().is_none());
        assert!(walk.next().is_none());
    }

    #[test]
    fn structures_truncated() {
        // Formatted area past the end.
        let err = Structure::parse(&[0x01, 0x10, 0x00, 0x00, 0x00], 0).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));

        // Header past the end.
        let err = Structure::parse(&[0x01, 0x10], 0).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));

        // String table with no final terminator.
        let err = Structure::parse(&[0x01, 0x04, 0x00, 0x00, b'a', 0x00], 0).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));

        // String with no NUL at all.
        let err = Structure::parse(&[0x01, 0x04, 0x00, 0x00, b'a', b'b'], 0).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));

        let err = Structure::parse(&[0x01, 0x04, 0x00, 0x00], 8).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { offset: 8, .. }));
    }

    #[test]
    fn structures_empty_table_skips_second_byte() {
        // With no strings the byte after the first NUL is consumed unread.
        let buf = [0x01, 0x04, 0x00, 0x00, 0x00, 0xaa, 0x02, 0x04, 0x00, 0x00, 0x00, 0x00];
        let got = unwrap_structures(&buf);

        assert_eq!(got.len(), 2);
        assert_eq!(got[1].header.header_type, 2);
        assert_eq!(got[1].offset(), 6);
    }

    #[derive(Clone, Debug)]
    struct Record {
        header_type: u8,
        formatted: Vec<u8>,
        strings: Vec<String>,
    }

    fn record() -> impl Strategy<Value = Record> {
        (
            (0u8..=255).prop_filter("end of table", |t| *t != END_OF_TABLE),
            prop::collection::vec(any::<u8>(), 0..24),
            prop::collection::vec("[a-zA-Z0-9 .]{1,12}", 0..4),
        )
            .prop_map(|(header_type, formatted, strings)| Record {
                header_type,
                formatted,
                strings,
            })
    }

    fn encode(records: &[Record]) -> (Vec<u8>, Vec<usize>) {
        let mut buf = Vec::new();
        let mut offsets = Vec::new();
        for (handle, record) in records.iter().enumerate() {
            offsets.push(buf.len());
            buf.push(record.header_type);
            buf.push((HEADER_SIZE + record.formatted.len()) as u8);
            buf.extend_from_slice(&(handle as u16).to_le_bytes());
            buf.extend_from_slice(&record.formatted);
            for string in &record.strings {
                buf.extend_from_slice(string.as_bytes());
                buf.push(0);
            }
            if record.strings.is_empty() {
                buf.push(0);
            }
            buf.push(0);
        }

        (buf, offsets)
    }

    proptest! {
        #[test]
        fn walk_visits_every_record_once(
            records in prop::collection::vec(record(), 0..16),
            terminate in any::<bool>(),
        ) {
            let (mut buf, offsets) = encode(&records);
            if terminate {
                buf.extend_from_slice(&[END_OF_TABLE, 0x04, 0xff, 0xff, 0x00, 0x00]);
                buf.extend_from_slice(&[0x01, 0x04, 0x00, 0x00, 0x00, 0x00]);
            }

            let got = unwrap_structures(&buf);
            prop_assert_eq!(got.len(), records.len());

            for ((structure, record), offset) in got.iter().zip(&records).zip(&offsets) {
                prop_assert_eq!(structure.offset(), *offset);
                prop_assert_eq!(structure.header.header_type, record.header_type);
                prop_assert_eq!(structure.formatted(), &record.formatted[..]);
                prop_assert_eq!(strings(structure), record.strings.clone());
            }
        }
    }
}
