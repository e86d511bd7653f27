//! Minimal STUN codec (RFC 5389 subset): Binding Request/Response with the
//! XOR-MAPPED-ADDRESS attribute, IPv4 only. Pure functions, no I/O.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{BufMut, BytesMut};
use rand::RngCore;

use crate::error::ProtocolError;

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_RESPONSE: u16 = 0x0101;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const HEADER_LEN: usize = 20;
const FAMILY_IPV4: u8 = 0x01;

/// 20-byte Binding Request with a random transaction id and no attributes.
pub fn binding_request() -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    buf.put_u16(BINDING_REQUEST);
    buf.put_u16(0);
    buf.put_u32(MAGIC_COOKIE);
    let mut transaction_id = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut transaction_id);
    buf.put_slice(&transaction_id);
    buf
}

/// Binding Response carrying `mapped` as a single XOR-MAPPED-ADDRESS
/// attribute. Counterpart of [`decode_binding_response`], also used to embed
/// a STUN responder in tests.
pub fn binding_response(transaction_id: &[u8; 12], mapped: SocketAddrV4) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 12);
    buf.put_u16(BINDING_RESPONSE);
    buf.put_u16(12);
    buf.put_u32(MAGIC_COOKIE);
    buf.put_slice(transaction_id);
    buf.put_u16(ATTR_XOR_MAPPED_ADDRESS);
    buf.put_u16(8);
    buf.put_u8(0);
    buf.put_u8(FAMILY_IPV4);
    let cookie = MAGIC_COOKIE.to_be_bytes();
    buf.put_u16(mapped.port() ^ (MAGIC_COOKIE >> 16) as u16);
    for (octet, key) in mapped.ip().octets().iter().zip(cookie) {
        buf.put_u8(octet ^ key);
    }
    buf
}

/// Extracts the mapped endpoint from a Binding Response.
///
/// Returns `Ok(None)` when no IPv4 XOR-MAPPED-ADDRESS attribute is present;
/// other attributes and non-IPv4 families are skipped.
pub fn decode_binding_response(buf: &[u8]) -> Result<Option<SocketAddrV4>, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated { len: buf.len() });
    }
    let message_length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if cookie != MAGIC_COOKIE {
        return Err(ProtocolError::BadMagicCookie(cookie));
    }
    let end = (HEADER_LEN + message_length).min(buf.len());
    let mut offset = HEADER_LEN;
    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let attr_len = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
        let value = &buf[(offset + 4).min(buf.len())..];
        if attr_type == ATTR_XOR_MAPPED_ADDRESS && attr_len >= 8 && value.len() >= 8 {
            let family = value[1];
            if family == FAMILY_IPV4 {
                let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
                let cookie = MAGIC_COOKIE.to_be_bytes();
                let mut octets = [0u8; 4];
                for (i, octet) in octets.iter_mut().enumerate() {
                    *octet = value[4 + i] ^ cookie[i];
                }
                return Ok(Some(SocketAddrV4::new(Ipv4Addr::from(octets), port)));
            }
        }
        // attribute values are padded to a 4-byte boundary
        offset += 4 + (attr_len + 3) / 4 * 4;
    }
    Ok(None)
}
