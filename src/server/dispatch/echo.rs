//! SMB2 ECHO (`[MS-SMB2] 2.2.29` / `2.2.30`): a keepalive round trip that
//! needs neither a session nor a tree connection.

use crate::protocol::header::Header;
use crate::protocol::wire::Writer;

use super::Response;

const RESPONSE_STRUCTURE_SIZE: u16 = 4;

pub fn handle(_header: &Header) -> Response {
    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(0); // reserved
    Response::ok(w.into_inner())
}
