//! Resumable sessions and the store they are cached in.

mod store;

use std::fmt;
use std::time::{Duration, Instant};

pub use store::{SessionStore, StoreStats};

use crate::certificate::PeerIdentity;
use crate::crypto::MasterSecret;
use crate::message::{CipherSuite, ProtocolVersion, SessionId};

/// RFC 5077 session ticket, opaque to the client.
#[derive(Clone, PartialEq, Eq)]
pub struct Ticket {
    pub data: Vec<u8>,
    /// Seconds, as advised by the server. Zero means unspecified.
    pub lifetime_hint: u32,
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("len", &self.data.len())
            .field("lifetime_hint", &self.lifetime_hint)
            .finish()
    }
}

/// The outcome of a completed handshake that can be resumed.
///
/// Sessions are immutable once the handshake that created them is done and
/// are shared as `Arc<Session>` between the store and connections.
#[derive(Clone)]
pub struct Session {
    session_id: SessionId,
    version: ProtocolVersion,
    cipher_suite: CipherSuite,
    master_secret: MasterSecret,
    extended_master_secret: bool,
    peer_certificates: Vec<Vec<u8>>,
    peer_identity: Option<PeerIdentity>,
    ocsp_response: Option<Vec<u8>>,
    ticket: Option<Ticket>,
    created: Instant,
    timeout: Duration,
    not_resumable: bool,
}

impl Session {
    /// Default lifetime of a session, as for OpenSSL-derived stacks.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(7200);

    pub fn new(
        session_id: SessionId,
        version: ProtocolVersion,
        cipher_suite: CipherSuite,
        master_secret: MasterSecret,
        created: Instant,
    ) -> Self {
        Session {
            session_id,
            version,
            cipher_suite,
            master_secret,
            extended_master_secret: false,
            peer_certificates: Vec::new(),
            peer_identity: None,
            ocsp_response: None,
            ticket: None,
            created,
            timeout: Self::DEFAULT_TIMEOUT,
            not_resumable: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn with_extended_master_secret(mut self, enabled: bool) -> Self {
        self.extended_master_secret = enabled;
        self
    }

    pub fn with_peer(mut self, certificates: Vec<Vec<u8>>, identity: PeerIdentity) -> Self {
        self.peer_certificates = certificates;
        self.peer_identity = Some(identity);
        self
    }

    pub fn with_ocsp_response(mut self, response: Vec<u8>) -> Self {
        self.ocsp_response = Some(response);
        self
    }

    /// Mark the session as never to be cached or offered.
    pub fn not_resumable(mut self) -> Self {
        self.not_resumable = true;
        self
    }

    pub(crate) fn set_session_id(&mut self, session_id: SessionId) {
        self.session_id = session_id;
    }

    #[inline(always)]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[inline(always)]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    #[inline(always)]
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    #[inline(always)]
    pub fn master_secret(&self) -> &MasterSecret {
        &self.master_secret
    }

    #[inline(always)]
    pub fn extended_master_secret(&self) -> bool {
        self.extended_master_secret
    }

    #[inline(always)]
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        &self.peer_certificates
    }

    #[inline(always)]
    pub fn peer_identity(&self) -> Option<&PeerIdentity> {
        self.peer_identity.as_ref()
    }

    #[inline(always)]
    pub fn ocsp_response(&self) -> Option<&[u8]> {
        self.ocsp_response.as_deref()
    }

    #[inline(always)]
    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    #[inline(always)]
    pub fn created(&self) -> Instant {
        self.created
    }

    #[inline(always)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[inline(always)]
    pub fn is_resumable(&self) -> bool {
        !self.not_resumable
    }

    pub fn expires_at(&self) -> Instant {
        self.created + self.timeout
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("version", &self.version)
            .field("cipher_suite", &self.cipher_suite)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("ticket", &self.ticket)
            .field("timeout", &self.timeout)
            .field("not_resumable", &self.not_resumable)
            .finish_non_exhaustive()
    }
}
