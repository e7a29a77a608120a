//! SMB2 READ (`[MS-SMB2] 2.2.19` / `2.2.20`).

use crate::protocol::header::Header;
use crate::protocol::status::{status_from_io_error, NTStatus};
use crate::protocol::wire::{Cursor, Writer};
use crate::protocol::consts::AccessMask;
use crate::vfs::Filesystem;

use super::close::read_file_id;
use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 49;
const RESPONSE_STRUCTURE_SIZE: u16 = 17;
const RESPONSE_DATA_OFFSET: u8 = 0x50; // header (64) + the 16 fixed response bytes

pub async fn handle<F: Filesystem>(ctx: &Context<F>, header: &Header, body: &[u8]) -> Response {
    let session = match ctx.sessions.get(header.session_id) {
        Some(s) => s,
        None => return Response::error(NTStatus::USER_SESSION_DELETED),
    };
    session.touch();
    let tree = match session.tree(header.tree_id) {
        Some(t) => t,
        None => return Response::error(NTStatus::NETWORK_NAME_DELETED),
    };

    let mut c = Cursor::new(body);
    if c.read_u16().unwrap_or(0) != REQUEST_STRUCTURE_SIZE {
        return Response::error(NTStatus::INVALID_PARAMETER);
    }
    let _padding = c.read_u8();
    let _flags = c.read_u8();
    let length = c.read_u32().unwrap_or(0).min(ctx.max_read_size);
    let offset = c.read_u64().unwrap_or(0);
    let file_id = match read_file_id(&mut c) {
        Ok(id) => id,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    let _minimum_count = c.read_u32();
    let _channel = c.read_u32();
    let _remaining_bytes = c.read_u32();
    let _read_channel_info_offset = c.read_u16();
    let _read_channel_info_length = c.read_u16();

    let open = match tree.opens.with_open(file_id, |o| (o.handle.clone(), o.granted_access, o.is_directory)) {
        Some(t) => t,
        None => return Response::error(NTStatus::FILE_CLOSED),
    };
    let (handle, granted_access, is_directory) = open;
    if is_directory {
        return Response::error(NTStatus::FILE_IS_A_DIRECTORY);
    }
    if !granted_access.contains(AccessMask::FILE_READ_DATA) {
        return Response::error(NTStatus::ACCESS_DENIED);
    }

    let data = match ctx.filesystem.read(&handle, offset, length).await {
        Ok(d) => d,
        Err(e) => return Response::error(status_from_io_error(&e)),
    };
    if data.is_empty() {
        return Response::error(NTStatus::END_OF_FILE);
    }

    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u8(RESPONSE_DATA_OFFSET);
    w.write_u8(0); // reserved
    w.write_u32(data.len() as u32);
    w.write_u32(0); // DataRemaining
    w.write_u32(0); // reserved
    w.write_bytes(&data);
    Response::ok(w.into_inner())
}
