/**
    xenstore-rs provides a Rust based xenstore implementation.
    Copyright (C) 2016 Star Lab Corp.

    This program is free software; you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation; either version 2 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License along
    with this program; if not, see <http://www.gnu.org/licenses/>.
**/

use byteorder::{ByteOrder, LittleEndian};
use std::io;

/// XenStore message types
pub const XS_DEBUG: u32 = 0;
pub const XS_DIRECTORY: u32 = 1;
pub const XS_READ: u32 = 2;
pub const XS_GET_PERMS: u32 = 3;
pub const XS_WATCH: u32 = 4;
pub const XS_UNWATCH: u32 = 5;
pub const XS_TRANSACTION_START: u32 = 6;
pub const XS_TRANSACTION_END: u32 = 7;
pub const XS_INTRODUCE: u32 = 8;
pub const XS_RELEASE: u32 = 9;
pub const XS_GET_DOMAIN_PATH: u32 = 10;
pub const XS_WRITE: u32 = 11;
pub const XS_MKDIR: u32 = 12;
pub const XS_RM: u32 = 13;
pub const XS_SET_PERMS: u32 = 14;
pub const XS_WATCH_EVENT: u32 = 15;
pub const XS_ERROR: u32 = 16;
pub const XS_IS_DOMAIN_INTRODUCED: u32 = 17;
pub const XS_RESUME: u32 = 18;
pub const XS_SET_TARGET: u32 = 19;
pub const XS_RESTRICT: u32 = 20;
pub const XS_RESET_WATCHES: u32 = 21;
pub const XS_INVALID: u32 = 0xffff;

/// XenStore error types
pub const XSE_EINVAL: &'static str = "EINVAL";
pub const XSE_EACCES: &'static str = "EACCES";
pub const XSE_EEXIST: &'static str = "EEXIST";
pub const XSE_EISDIR: &'static str = "EISDIR";
pub const XSE_ENOENT: &'static str = "ENOENT";
pub const XSE_ENOMEM: &'static str = "ENOMEM";
pub const XSE_ENOSPC: &'static str = "ENOSPC";
pub const XSE_EIO: &'static str = "EIO";
pub const XSE_ENOTEMPTY: &'static str = "ENOTEMPTY";
pub const XSE_ENOSYS: &'static str = "ENOSYS";
pub const XSE_EROFS: &'static str = "EROFS";
pub const XSE_EBUSY: &'static str = "EBUSY";
pub const XSE_EAGAIN: &'static str = "EAGAIN";
pub const XSE_EISCONN: &'static str = "EISCONN";
pub const XSE_E2BIG: &'static str = "E2BIG";

/// XenStore watch event vector indices
pub const XS_WATCH_PATH: usize = 0;
pub const XS_WATCH_TOKEN: usize = 1;

/// Miscellaneous protocol values
pub const XENSTORE_PAYLOAD_MAX: usize = 4096;
pub const XENSTORE_ABS_PATH_MAX: usize = 3072;
pub const XENSTORE_REL_PATH_MAX: usize = 2048;

pub type ReqId = u32;
pub type TxId = u32;
pub type DomainId = u32;

/// A `Header` is always 16 bytes long
pub const HEADER_SIZE: usize = 16;

/// The `Header` type that is generic to all messages
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub msg_type: u32,
    pub req_id: ReqId,
    pub tx_id: TxId,
    pub len: u32,
}

impl Header {
    /// Parse the header
    pub fn parse(bytes: &[u8]) -> io::Result<Header> {
        if bytes.len() < HEADER_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "expected 16 bytes"));
        }

        Ok(Header {
            msg_type: LittleEndian::read_u32(&bytes[0..4]),
            req_id: LittleEndian::read_u32(&bytes[4..8]),
            tx_id: LittleEndian::read_u32(&bytes[8..12]),
            len: LittleEndian::read_u32(&bytes[12..16]),
        })
    }

    /// Output the header as a vector of bytes
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.msg_type);
        LittleEndian::write_u32(&mut buf[4..8], self.req_id);
        LittleEndian::write_u32(&mut buf[8..12], self.tx_id);
        LittleEndian::write_u32(&mut buf[12..16], self.len);

        buf.to_vec()
    }

    /// Provide the length that the body should be
    pub fn len(&self) -> usize {
        self.len as usize
    }
}

/// Break a payload at NULL separators.
///
/// Every field on the wire is NUL-terminated, so a well formed payload ends
/// with a single NUL which produces one empty trailing fragment; that
/// fragment is discarded. A payload whose final field lacks its terminator
/// still yields the field.
pub fn split(body: &[u8]) -> Vec<&[u8]> {
    if body.is_empty() {
        return Vec::new();
    }

    let mut fields: Vec<&[u8]> = body.split(|b| *b == b'\0').collect();
    if fields.last().map_or(false, |f| f.is_empty()) {
        fields.pop();
    }

    fields
}

/// Concatenate fields into a payload, terminating each with a NUL.
pub fn join(fields: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::with_capacity(fields.iter().map(|f| f.len() + 1).sum());

    for field in fields {
        body.extend_from_slice(field);
        body.push(b'\0');
    }

    body
}

#[cfg(test)]
mod tests {

    use quickcheck::{quickcheck, Arbitrary, Gen};
    use super::*;

    impl Arbitrary for Header {
        fn arbitrary(g: &mut Gen) -> Header {
            Header {
                msg_type: u32::arbitrary(g),
                req_id: u32::arbitrary(g),
                tx_id: u32::arbitrary(g),
                len: u32::arbitrary(g),
            }
        }
    }

    #[test]
    fn header_parse_values() {
        let hdr = vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0];
        let header = Header::parse(&hdr).unwrap();

        assert_eq!(header.msg_type, 1);
        assert_eq!(header.req_id, 2);
        assert_eq!(header.tx_id, 3);
        assert_eq!(header.len, 4);
    }

    #[test]
    fn header_idempotent() {
        fn prop(hdr: Header) -> bool {
            let bytes = hdr.to_vec();
            let decoded_hdr = Header::parse(&bytes).unwrap();

            decoded_hdr == hdr
        }

        quickcheck(prop as fn(Header) -> bool);
    }

    #[test]
    fn header_parse_length() {
        fn prop(bytes: Vec<u8>) -> bool {
            // anything shorter than 16 bytes must fail to parse,
            // anything else must succeed
            let expected = bytes.len() >= HEADER_SIZE;
            let result = Header::parse(&bytes).is_ok();

            expected == result
        }

        quickcheck(prop as fn(Vec<u8>) -> bool);
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Fields(Vec<Vec<u8>>);

    impl Arbitrary for Fields {
        fn arbitrary(g: &mut Gen) -> Fields {
            // fields never contain the NUL separator itself
            let fields = Vec::<Vec<u8>>::arbitrary(g)
                .into_iter()
                .map(|f| f.into_iter().filter(|b| *b != b'\0').collect())
                .collect();

            Fields(fields)
        }
    }

    #[test]
    fn split_inverts_join() {
        fn prop(fields: Fields) -> bool {
            let body = join(&fields.0.iter().map(|f| &f[..]).collect::<Vec<&[u8]>>());
            let round: Vec<Vec<u8>> = split(&body).iter().map(|f| f.to_vec()).collect();

            round == fields.0
        }

        quickcheck(prop as fn(Fields) -> bool);
    }

    #[test]
    fn split_without_terminator() {
        // a missing final NUL still yields the last field
        assert_eq!(split(b"a\0b"), vec![&b"a"[..], &b"b"[..]]);
    }

    #[test]
    fn split_empty_body() {
        assert_eq!(split(b"").len(), 0);
    }

    #[test]
    fn split_keeps_interior_empty_fields() {
        assert_eq!(split(b"a\0\0b\0"), vec![&b"a"[..], &b""[..], &b"b"[..]]);
    }

    #[test]
    fn split_single_empty_field() {
        assert_eq!(split(b"\0"), vec![&b""[..]]);
    }
}
