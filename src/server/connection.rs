//! The TCP listener and per-connection driver, the SMB2 counterpart of the
//! teacher's `NFSTcpListener`/`process_socket` pair: one generic listener
//! bound to a single [`Filesystem`] backend, spawning one task per accepted
//! connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::protocol::consts::Command;
use crate::protocol::header::{Header, HEADER_LEN};
use crate::protocol::status::NTStatus;
use crate::protocol::wire::{read_netbios_frame, write_netbios_frame};
use crate::server::config::ServerConfig;
use crate::server::dispatch::{handle_message, Context};
use crate::server::ntlm::CredentialStore;
use crate::server::share::ShareRegistry;
use crate::server::stats::ServerStatsSnapshot;
use crate::vfs::Filesystem;

/// A bound SMB2 server, generic over one [`Filesystem`] backend.
pub struct Server<F: Filesystem> {
    listener: TcpListener,
    ctx: Arc<Context<F>>,
    reap_interval: Duration,
}

impl<F: Filesystem> Server<F> {
    /// Binds `config.bind_addr` and builds the connection-wide [`Context`]
    /// from `shares`, `filesystem` and `credentials`.
    pub async fn bind(
        config: ServerConfig,
        shares: ShareRegistry,
        filesystem: F,
        credentials: Arc<dyn CredentialStore>,
    ) -> io::Result<Self> {
        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(addr = %bind_addr, "listening");
        let reap_interval = config.reap_interval;
        let ctx = Arc::new(Context::new(shares, Arc::new(filesystem), credentials, &config));
        Ok(Server { listener, ctx, reap_interval })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A point-in-time copy of this server's connection/traffic/auth-failure
    /// counters.
    pub fn stats(&self) -> ServerStatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Accepts connections until the listener errors. Each connection runs
    /// on its own task against the same shared [`Context`]; a periodic
    /// housekeeping task reaps idle sessions for as long as the server runs.
    pub async fn handle_forever(&self) -> io::Result<()> {
        let reap_ctx = self.ctx.clone();
        let reap_interval = self.reap_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reap_interval);
            loop {
                ticker.tick().await;
                reap_ctx.sessions.reap_idle();
            }
        });

        loop {
            let (socket, peer) = self.listener.accept().await?;
            let _ = socket.set_nodelay(true);
            let ctx = self.ctx.clone();
            ctx.stats.on_connection_accepted();
            info!(%peer, "accepted connection");
            tokio::spawn(async move {
                if let Err(err) = process_connection(socket, ctx).await {
                    debug!(%peer, %err, "connection closed");
                }
            });
        }
    }
}

/// Drives one accepted connection: reads NetBIOS-framed requests, dispatches
/// each to [`handle_message`], signs the response when the request's
/// session requires it, and writes the framed reply back.
async fn process_connection<F: Filesystem>(mut socket: TcpStream, ctx: Arc<Context<F>>) -> io::Result<()> {
    loop {
        let request = match read_netbios_frame(&mut socket).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };
        ctx.stats.on_bytes_in(request.len() as u64);

        let (response_header, mut response) = match handle_message(&ctx, &request).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "malformed SMB2 request, dropping connection");
                return Err(err);
            }
        };

        if response_header.command == Command::SessionSetup as u16 && response_header.status == NTStatus::LOGON_FAILURE {
            ctx.stats.on_auth_failure();
        }

        sign_if_required(&ctx, &response_header, &mut response);

        ctx.stats.on_bytes_out(response.len() as u64);
        if let Err(err) = write_netbios_frame(&mut socket, &response).await {
            error!(%err, "write failed");
            return Err(err);
        }
    }
}

/// Signs `response` in place when the session it belongs to has an
/// established signing key, per `[MS-SMB2] 3.1.4.1`: the header's 16-byte
/// `Signature` field is zeroed (already true for a freshly built response),
/// the `SIGNED` flag is set, and the MAC is computed over the whole message.
fn sign_if_required<F: Filesystem>(ctx: &Context<F>, header: &Header, response: &mut Vec<u8>) {
    let session = match ctx.sessions.get(header.session_id) {
        Some(s) => s,
        None => return,
    };
    let signing_key = match &session.signing_key {
        Some(k) => k,
        None => return,
    };
    if response.len() < HEADER_LEN {
        return;
    }

    // Flags is the little-endian u32 at byte offset 16; SIGNED (0x8) only
    // ever touches the low byte.
    response[16] |= crate::protocol::consts::HeaderFlags::SIGNED.bits() as u8;
    for byte in &mut response[48..64] {
        *byte = 0;
    }
    let signature = signing_key.sign(response);
    response[48..64].copy_from_slice(&signature);
}
