//! The fixed 64-byte SMB2 header that precedes every request and response.
//!
//! Only the synchronous header layout is implemented: every command this
//! server handles completes inline, so `SMB2_FLAGS_ASYNC_COMMAND` is never
//! set and the 4-byte field after `Status` is always `TreeId`, never
//! `AsyncId`'s low half.

use std::io;

use crate::protocol::consts::HeaderFlags;
use crate::protocol::status::NTStatus;
use crate::protocol::wire::{Cursor, Writer};

pub const HEADER_LEN: usize = 64;
const PROTOCOL_ID: [u8; 4] = [0xFE, b'S', b'M', b'B'];

/// The 64-byte SMB2 header (`[MS-SMB2] 2.2.1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub credit_charge: u16,
    pub status: NTStatus,
    pub command: u16,
    pub credit_request_response: u16,
    pub flags: HeaderFlags,
    pub next_command: u32,
    pub message_id: u64,
    pub tree_id: u32,
    pub session_id: u64,
    pub signature: [u8; 16],
}

impl Header {
    pub fn request(command: u16, message_id: u64) -> Self {
        Header {
            credit_charge: 1,
            status: NTStatus::SUCCESS,
            command,
            credit_request_response: 1,
            flags: HeaderFlags::empty(),
            next_command: 0,
            message_id,
            tree_id: 0,
            session_id: 0,
            signature: [0u8; 16],
        }
    }

    /// Builds the header for a response to `request`, setting
    /// `SERVER_TO_REDIR` and copying identifiers the client correlates on.
    pub fn response_to(request: &Header, status: NTStatus) -> Self {
        Header {
            credit_charge: request.credit_charge,
            status,
            command: request.command,
            credit_request_response: request.credit_request_response.max(1),
            flags: HeaderFlags::SERVER_TO_REDIR,
            next_command: 0,
            message_id: request.message_id,
            tree_id: request.tree_id,
            session_id: request.session_id,
            signature: [0u8; 16],
        }
    }

    pub fn is_signed(&self) -> bool {
        self.flags.contains(HeaderFlags::SIGNED)
    }

    pub fn read(c: &mut Cursor<'_>) -> io::Result<Header> {
        let protocol_id = c.read_bytes(4)?;
        if protocol_id != PROTOCOL_ID {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad SMB2 protocol id"));
        }
        let structure_size = c.read_u16()?;
        if structure_size != HEADER_LEN as u16 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad SMB2 header structure size"));
        }
        let credit_charge = c.read_u16()?;
        let status = NTStatus(c.read_u32()?);
        let command = c.read_u16()?;
        let credit_request_response = c.read_u16()?;
        let flags = HeaderFlags::from_bits_truncate(c.read_u32()?);
        let next_command = c.read_u32()?;
        let message_id = c.read_u64()?;
        let tree_id = c.read_u32()?;
        // Reserved/AsyncId high half, unused for synchronous messages.
        let _reserved = c.read_u32()?;
        let session_id = c.read_u64()?;
        let sig_bytes = c.read_bytes(16)?;
        let mut signature = [0u8; 16];
        signature.copy_from_slice(&sig_bytes);
        Ok(Header {
            credit_charge,
            status,
            command,
            credit_request_response,
            flags,
            next_command,
            message_id,
            tree_id,
            session_id,
            signature,
        })
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(&PROTOCOL_ID);
        w.write_u16(HEADER_LEN as u16);
        w.write_u16(self.credit_charge);
        w.write_u32(self.status.as_u32());
        w.write_u16(self.command);
        w.write_u16(self.credit_request_response);
        w.write_u32(self.flags.bits());
        w.write_u32(self.next_command);
        w.write_u64(self.message_id);
        w.write_u32(self.tree_id);
        w.write_u32(0); // reserved
        w.write_u64(self.session_id);
        w.write_bytes(&self.signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let mut req = Header::request(0x0005, 42);
        req.session_id = 7;
        req.tree_id = 3;
        let mut w = Writer::new();
        req.write(&mut w);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), HEADER_LEN);
        let mut c = Cursor::new(&bytes);
        let decoded = Header::read(&mut c).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_to_sets_server_to_redir_flag() {
        let req = Header::request(0x0005, 1);
        let resp = Header::response_to(&req, NTStatus::SUCCESS);
        assert!(resp.flags.contains(HeaderFlags::SERVER_TO_REDIR));
        assert_eq!(resp.message_id, req.message_id);
    }

    #[test]
    fn rejects_wrong_protocol_id() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0] = 0xFF;
        let mut c = Cursor::new(&bytes);
        assert!(Header::read(&mut c).is_err());
    }
}
