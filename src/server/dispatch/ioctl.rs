//! SMB2 IOCTL (`[MS-SMB2] 2.2.31` / `2.2.32`).
//!
//! None of the FSCTLs this server would need to support (pipe transactions,
//! reparse points, copy-offload) are in scope; every request here is
//! answered with `STATUS_NOT_SUPPORTED`, mirroring a real server's handling
//! of an FSCTL it doesn't implement.

use crate::protocol::header::Header;
use crate::protocol::status::NTStatus;
use crate::protocol::wire::Cursor;
use crate::vfs::Filesystem;

use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 57;

pub fn handle<F: Filesystem>(_ctx: &Context<F>, _header: &Header, body: &[u8]) -> Response {
    let mut c = Cursor::new(body);
    if c.read_u16().unwrap_or(0) != REQUEST_STRUCTURE_SIZE {
        return Response::error(NTStatus::INVALID_PARAMETER);
    }
    Response::error(NTStatus::NOT_SUPPORTED)
}
