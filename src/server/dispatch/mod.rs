//! Per-command request handling.
//!
//! [`Context`] holds everything a handler needs: the share registry, the
//! session/tree/open registries, the backing filesystem, and the
//! connection-wide negotiation state. [`handle_message`] reads the SMB2
//! header, signs/verifies as required, and routes to the command-specific
//! handler; each handler only ever sees its own command's body.

mod close;
mod create;
mod echo;
mod flush;
mod ioctl;
mod logoff;
mod negotiate;
mod query_directory;
mod query_info;
mod read;
mod session_setup;
mod set_info;
mod tree_connect;
mod write;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::crypto::PreauthIntegrityHash;
use crate::protocol::consts::{Command, Dialect};
use crate::protocol::header::Header;
use crate::protocol::status::NTStatus;
use crate::protocol::wire::{Cursor, Writer};
use crate::server::config::ServerConfig;
use crate::server::ntlm::{CredentialStore, NtlmAuthenticator};
use crate::server::session::SessionManager;
use crate::server::share::ShareRegistry;
use crate::server::stats::ServerStats;
use crate::vfs::Filesystem;

/// Connection-wide state shared by every request a connection handles.
pub struct Context<F: Filesystem> {
    pub shares: ShareRegistry,
    pub sessions: SessionManager<F::Handle>,
    pub filesystem: Arc<F>,
    pub credentials: Arc<dyn CredentialStore>,
    pub server_guid: Uuid,
    pub server_name: String,
    pub min_dialect: Dialect,
    pub max_dialect: Dialect,
    pub signing_required: bool,
    pub allow_guest: bool,
    pub max_read_size: u32,
    pub max_write_size: u32,
    pub stats: ServerStats,
    pub dialect: Mutex<Option<Dialect>>,
    pub preauth_hash: Mutex<PreauthIntegrityHash>,
    /// The connecting client's GUID from NEGOTIATE, used to recognize a
    /// reconnect attempt in a later SESSION_SETUP's previous-session-id.
    pub client_guid: Mutex<Uuid>,
    pending_auth: Mutex<HashMap<u64, NtlmAuthenticator>>,
}

impl<F: Filesystem> Context<F> {
    pub fn new(
        shares: ShareRegistry,
        filesystem: Arc<F>,
        credentials: Arc<dyn CredentialStore>,
        config: &ServerConfig,
    ) -> Self {
        Context {
            shares,
            sessions: SessionManager::new(config.idle_timeout),
            filesystem,
            credentials,
            server_guid: config.server_guid,
            server_name: config.server_name.clone(),
            min_dialect: config.min_dialect,
            max_dialect: config.max_dialect,
            signing_required: config.signing_required,
            allow_guest: config.allow_guest,
            max_read_size: config.max_read_size,
            max_write_size: config.max_write_size,
            stats: ServerStats::new(),
            dialect: Mutex::new(None),
            preauth_hash: Mutex::new(PreauthIntegrityHash::new()),
            client_guid: Mutex::new(Uuid::nil()),
            pending_auth: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a session ID and stashes `authenticator` under it until the
    /// client's AUTHENTICATE_MESSAGE arrives.
    pub(crate) fn begin_pending_auth(&self, authenticator: NtlmAuthenticator) -> u64 {
        let id = self.sessions.allocate_session_id();
        self.pending_auth.lock().unwrap().insert(id, authenticator);
        id
    }

    pub(crate) fn take_pending_auth(&self, session_id: u64) -> Option<NtlmAuthenticator> {
        self.pending_auth.lock().unwrap().remove(&session_id)
    }

    pub fn dialect(&self) -> Option<Dialect> {
        *self.dialect.lock().unwrap()
    }

    /// Folds `message` into the rolling pre-authentication hash, only while
    /// still negotiating dialect 3.1.1 (the hash stops updating once a
    /// session key has been established).
    pub fn fold_preauth(&self, message: &[u8]) {
        if self.dialect() == Some(Dialect::Smb311) {
            self.preauth_hash.lock().unwrap().update(message);
        }
    }
}

/// The result of handling one request: a status and a command-specific
/// response body (header is built by the caller).
///
/// `session_id_override` lets SESSION_SETUP's first leg hand the client a
/// freshly allocated session ID even though the request that prompted it
/// carried session ID zero.
pub struct Response {
    pub status: NTStatus,
    pub body: Vec<u8>,
    pub session_id_override: Option<u64>,
    pub tree_id_override: Option<u32>,
}

impl Response {
    fn ok(body: Vec<u8>) -> Response {
        Response { status: NTStatus::SUCCESS, body, session_id_override: None, tree_id_override: None }
    }

    fn error(status: NTStatus) -> Response {
        Response { status, body: Vec::new(), session_id_override: None, tree_id_override: None }
    }

    fn pending(body: Vec<u8>, session_id: u64) -> Response {
        Response {
            status: NTStatus::MORE_PROCESSING_REQUIRED,
            body,
            session_id_override: Some(session_id),
            tree_id_override: None,
        }
    }

    fn with_tree_id(mut self, tree_id: u32) -> Response {
        self.tree_id_override = Some(tree_id);
        self
    }
}

/// Verifies a signed request's MAC against its session's signing key, the
/// inbound counterpart of [`crate::server::connection`]'s outbound
/// `sign_if_required`: the header's `Signature` field is zeroed, the MAC is
/// recomputed over the whole message, and compared constant-time against
/// the one the client sent (`[MS-SMB2] 3.1.4.1`). A request that isn't
/// signed, or whose session has no signing key (guest sessions, or no
/// session at all), passes through unchecked.
fn verify_signature<F: Filesystem>(ctx: &Context<F>, header: &Header, request: &[u8]) -> bool {
    if !header.is_signed() {
        return true;
    }
    let session = match ctx.sessions.get(header.session_id) {
        Some(s) => s,
        None => return true,
    };
    let signing_key = match &session.signing_key {
        Some(k) => k,
        None => return true,
    };
    if request.len() < crate::protocol::header::HEADER_LEN {
        return false;
    }
    let mut zeroed = request.to_vec();
    zeroed[48..64].fill(0);
    signing_key.verify(&zeroed, &header.signature)
}

/// Parses the SMB2 header from `request`, dispatches to the matching
/// command handler, and returns the complete wire response (header +
/// body). Signing, when the session requires it, is applied by the caller
/// in [`crate::server::connection`] once the response bytes are final,
/// since the signature covers the whole message including this header.
pub async fn handle_message<F: Filesystem>(ctx: &Context<F>, request: &[u8]) -> std::io::Result<(Header, Vec<u8>)> {
    let mut c = Cursor::new(request);
    let header = Header::read(&mut c)?;
    let body = &request[crate::protocol::header::HEADER_LEN..];

    let command = num_traits::FromPrimitive::from_u16(header.command);
    debug!(command = header.command, message_id = header.message_id, "dispatching SMB2 request");

    let response = if !verify_signature(ctx, &header, request) {
        warn!(command = header.command, session_id = header.session_id, "inbound signature verification failed");
        Response::error(NTStatus::ACCESS_DENIED)
    } else {
        match command {
            Some(Command::Negotiate) => negotiate::handle(ctx, body).await,
            Some(Command::SessionSetup) => session_setup::handle(ctx, &header, body).await,
            Some(Command::Logoff) => logoff::handle(ctx, &header).await,
            Some(Command::TreeConnect) => tree_connect::handle(ctx, &header, body).await,
            Some(Command::TreeDisconnect) => tree_connect::handle_disconnect(ctx, &header),
            Some(Command::Create) => create::handle(ctx, &header, body).await,
            Some(Command::Close) => close::handle(ctx, &header, body).await,
            Some(Command::Flush) => flush::handle(ctx, &header, body).await,
            Some(Command::Read) => read::handle(ctx, &header, body).await,
            Some(Command::Write) => write::handle(ctx, &header, body).await,
            Some(Command::QueryDirectory) => query_directory::handle(ctx, &header, body).await,
            Some(Command::QueryInfo) => query_info::handle(ctx, &header, body).await,
            Some(Command::SetInfo) => set_info::handle(ctx, &header, body).await,
            Some(Command::Ioctl) => ioctl::handle(ctx, &header, body),
            Some(Command::Echo) => echo::handle(&header),
            Some(Command::Cancel) | Some(Command::ChangeNotify) | None => {
                warn!(command = header.command, "unsupported SMB2 command");
                Response::error(NTStatus::NOT_SUPPORTED)
            }
        }
    };

    let mut response_header = Header::response_to(&header, response.status);
    if let Some(session_id) = response.session_id_override {
        response_header.session_id = session_id;
    }
    if let Some(tree_id) = response.tree_id_override {
        response_header.tree_id = tree_id;
    }
    let mut w = Writer::new();
    response_header.write(&mut w);
    w.write_bytes(&response.body);
    Ok((response_header, w.into_inner()))
}
