//! SMB2 LOGOFF (`[MS-SMB2] 2.2.7`): tears down a session and, with it,
//! every tree connection and open beneath it.

use super::{Context, Response};
use crate::protocol::header::Header;
use crate::protocol::status::NTStatus;
use crate::protocol::wire::Writer;
use crate::vfs::Filesystem;

const RESPONSE_STRUCTURE_SIZE: u16 = 4;

pub async fn handle<F: Filesystem>(ctx: &Context<F>, header: &Header) -> Response {
    if ctx.sessions.remove(header.session_id).is_none() {
        return Response::error(NTStatus::USER_SESSION_DELETED);
    }
    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(0); // reserved
    Response::ok(w.into_inner())
}
