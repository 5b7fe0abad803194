// TLS 1.2 / DTLS 1.2 client handshake (RFC 5246, RFC 6347):
//
// Full handshake
//
// 1. Client sends ClientHello
//    - DTLS: server may answer HelloVerifyRequest; client resends ClientHello
//      with the cookie and the transcript starts over
// 2. Server sends ServerHello, Certificate, CertificateStatus?,
//    ServerKeyExchange, CertificateRequest?, ServerHelloDone
// 3. Client sends Certificate?, ClientKeyExchange, CertificateVerify?,
//    ChangeCipherSpec, Finished
// 4. Server sends NewSessionTicket?, ChangeCipherSpec, Finished
//
// Abbreviated handshake (server echoed the offered session id)
//
// 1. Client sends ClientHello with the cached session id (and ticket)
// 2. Server sends ServerHello, NewSessionTicket?, ChangeCipherSpec, Finished
// 3. Client sends ChangeCipherSpec, Finished
//
// This implementation is a Sans-IO client: bytes move through a
// non-blocking Transport and time is passed in.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use tinyvec::ArrayVec;

use crate::certificate::PeerIdentity;
use crate::crypto::{constant_time_eq, KeyBlock, MasterSecret, MasterSecretSeed, Sender};
use crate::engine::Engine;
use crate::message::{parse_all, Certificate, CertificateRequest, CertificateStatus};
use crate::message::{CipherSuite, ClientHello, ClientKeyExchange, CompressionMethod, Cookie};
use crate::message::{Extension, ExtensionType, Finished, Handshake, HelloVerifyRequest};
use crate::message::{MessageType, NamedGroup, NewSessionTicket, ProtocolVersion, Random};
use crate::message::{ServerHello, ServerKeyExchange, SessionId, SignatureAndHashAlgorithm};
use crate::message::Variant;
use crate::observer::{Event, Outcome};
use crate::session::{Session, Ticket};
use crate::transport::{Direction, Transport};
use crate::{Config, Error, Interest, StateName, Step};

/// How many HelloVerifyRequests we answer before giving up.
const MAX_COOKIE_ROUNDS: u8 = 3;

/// Length of the session id we make up for a ticket-only session.
const TICKET_SESSION_ID_LEN: usize = 32;

/// TLS 1.2 / DTLS 1.2 handshake client over a [`Transport`].
///
/// Every call to [`step`][Client::step] does one unit of work: it sends one
/// message, reads one message, or flushes. [`drive`][Client::drive] repeats
/// until the client has to wait.
///
/// A client that returned an error is poisoned; every later call fails with
/// [`Error::Poisoned`].
pub struct Client<T: Transport> {
    config: Arc<Config>,

    transport: T,

    /// Records, queues, transcript and flight timer.
    engine: Engine,

    /// Current client state.
    state: State,

    /// A message read by a state that did not want it, for the next state.
    reuse: Option<Handshake>,

    /// Set on the first error.
    poisoned: bool,

    /// Random unique data. Used for ClientHello.
    random: Option<Random>,

    server_random: Option<Random>,

    /// Id given to [`Client::offer_session`].
    offer_id: Option<SessionId>,

    /// The cached session we offer, if the store had it.
    offered: Option<Arc<Session>>,

    /// The server accepted the offered session.
    hit: bool,

    version: Option<ProtocolVersion>,

    cipher_suite: Option<CipherSuite>,

    /// Session id from ServerHello.
    server_session_id: SessionId,

    /// Cookie is sent by the server in the HelloVerifyRequest.
    cookie: Cookie,

    send_cookie: bool,

    cookie_rounds: u8,

    /// Negotiated rfc7627.
    extended_master_secret: bool,

    /// Server will send NewSessionTicket.
    ticket_expected: bool,

    /// Server will send CertificateStatus.
    status_expected: bool,

    peer_certificates: Vec<Vec<u8>>,

    peer_identity: Option<PeerIdentity>,

    ocsp_response: Option<Vec<u8>>,

    ticket: Option<Ticket>,

    master_secret: Option<MasterSecret>,

    key_block: Option<KeyBlock>,

    /// The session once the handshake is done.
    session: Option<Arc<Session>>,
}

/// Key share from ServerKeyExchange.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerKeyShare {
    group: NamedGroup,
    public_key: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Start,
    SendClientHello,
    WaitHelloVerify,
    WaitServerHello,
    WaitCertificate,
    WaitCertStatus,
    WaitKeyExchange,
    WaitCertRequest(ServerKeyShare),
    WaitServerDone {
        kx: ServerKeyShare,
        /// Signature algorithms from CertificateRequest.
        cert_request: Option<Vec<SignatureAndHashAlgorithm>>,
    },
    SendCertificate {
        kx: ServerKeyShare,
        offered: Vec<SignatureAndHashAlgorithm>,
    },
    SendKeyExchange {
        kx: ServerKeyShare,
        /// Set when we sent a non-empty certificate and must prove it.
        sign_with: Option<Vec<SignatureAndHashAlgorithm>>,
    },
    SendCertVerify {
        offered: Vec<SignatureAndHashAlgorithm>,
    },
    SendChangeCipherSpec,
    SendFinished,
    Flush {
        next: Box<State>,
    },
    WaitSessionTicket,
    WaitFinished {
        ccs_seen: bool,
    },
    Done,
    Failed,
}

/// Result of one unit of work.
enum Poll {
    Ready(State),
    Pending(State, Interest),
}

impl<T: Transport> Client<T> {
    /// Create a client that will handshake over `transport`.
    pub fn new(config: Arc<Config>, transport: T) -> Client<T> {
        let engine = Engine::new(Arc::clone(&config));

        Client {
            config,
            transport,
            engine,
            state: State::Start,
            reuse: None,
            poisoned: false,
            random: None,
            server_random: None,
            offer_id: None,
            offered: None,
            hit: false,
            version: None,
            cipher_suite: None,
            server_session_id: SessionId::empty(),
            cookie: Cookie::empty(),
            send_cookie: false,
            cookie_rounds: 0,
            extended_master_secret: false,
            ticket_expected: false,
            status_expected: false,
            peer_certificates: Vec::new(),
            peer_identity: None,
            ocsp_response: None,
            ticket: None,
            master_secret: None,
            key_block: None,
            session: None,
        }
    }

    /// Try to resume the session cached under `id` in the configured store.
    ///
    /// Must be called before the first [`step`][Client::step]. Nothing is
    /// offered if the store has no live, compatible session for `id`.
    pub fn offer_session(&mut self, id: SessionId) -> Result<(), Error> {
        if self.state != State::Start {
            return Err(Error::InvalidState("offer_session after handshake start"));
        }
        self.offer_id = Some(id);
        Ok(())
    }

    /// Do one unit of handshake work.
    pub fn step(&mut self, now: Instant) -> Result<Step, Error> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        let from = self.state.name();

        match self.advance(now) {
            Ok(step) => {
                match step {
                    Step::Progressed => {}
                    Step::WouldBlock(interest) => self.exit(Outcome::WouldBlock(interest)),
                    Step::Done => self.exit(Outcome::Done),
                }
                Ok(step)
            }
            Err(e) => Err(self.fail(from, e)),
        }
    }

    /// Step until the client has to wait or is done.
    pub fn drive(&mut self, now: Instant) -> Result<Step, Error> {
        loop {
            match self.step(now)? {
                Step::Progressed => continue,
                step => return Ok(step),
            }
        }
    }

    /// When to call [`handle_timeout`][Client::handle_timeout] next (DTLS).
    pub fn next_timeout(&self) -> Option<Instant> {
        if self.poisoned || self.state == State::Done {
            return None;
        }
        self.engine.next_timeout()
    }

    /// Resend the current flight if its retransmission timer expired.
    ///
    /// [`step`][Client::step] does this too, this is for callers that only
    /// wake up on the timer.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        let from = self.state.name();
        match self.resend_if_due(now) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fail(from, e)),
        }
    }

    pub fn state(&self) -> StateName {
        self.state.name()
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// The established session, once done.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Whether the server accepted the offered session.
    pub fn is_resumed(&self) -> bool {
        self.hit
    }

    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn negotiated_cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    pub fn peer_identity(&self) -> Option<&PeerIdentity> {
        self.peer_identity.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn advance(&mut self, now: Instant) -> Result<Step, Error> {
        if self.state == State::Done {
            return Ok(Step::Done);
        }

        if self.state.is_waiting() {
            // Resends queued by the timer or by a duplicate from the peer.
            self.resend_if_due(now)?;
            if self.engine.has_pending_output()
                && !self.engine.flush_output(&mut self.transport)?
            {
                return Ok(Step::WouldBlock(Interest::Write));
            }
        }

        let from = self.state.name();
        let state = mem::replace(&mut self.state, State::Failed);

        match state.make_progress(self, now)? {
            Poll::Pending(state, interest) => {
                self.state = state;
                // A duplicate from the peer may have queued a resend.
                if interest == Interest::Read
                    && self.engine.has_pending_output()
                    && !self.engine.flush_output(&mut self.transport)?
                {
                    return Ok(Step::WouldBlock(Interest::Write));
                }
                Ok(Step::WouldBlock(interest))
            }
            Poll::Ready(next) => {
                let to = next.name();
                self.state = next;

                if from != to {
                    debug!("{} -> {}", from, to);
                    // The next state starts on a message we already have.
                    if self.reuse.is_none() {
                        self.emit(Event::StateChange { from, to });
                    }
                }

                if to == StateName::Done {
                    self.finish(now);
                    return Ok(Step::Done);
                }

                Ok(Step::Progressed)
            }
        }
    }

    fn resend_if_due(&mut self, now: Instant) -> Result<bool, Error> {
        if !self.engine.handle_timeout(now)? {
            return Ok(false);
        }
        self.engine.flush_output(&mut self.transport)?;
        Ok(true)
    }

    /// Take the reused message, or read one.
    fn next_message(&mut self) -> Result<Option<Handshake>, Error> {
        if let Some(handshake) = self.reuse.take() {
            return Ok(Some(handshake));
        }
        self.engine.next_handshake(&mut self.transport)
    }

    /// The received message is valid and part of the handshake.
    fn accept(&mut self, handshake: &Handshake) {
        self.engine.transcript_mut().push(handshake);
    }

    fn suite(&self) -> Result<CipherSuite, Error> {
        self.cipher_suite
            .ok_or(Error::InvalidState("no negotiated cipher suite"))
    }

    fn master(&self) -> Result<&MasterSecret, Error> {
        self.master_secret
            .as_ref()
            .ok_or(Error::InvalidState("no master secret"))
    }

    /// Derive the traffic keys once.
    fn keys(&mut self) -> Result<KeyBlock, Error> {
        if let Some(keys) = &self.key_block {
            return Ok(keys.clone());
        }

        let suite = self.suite()?;
        let client_random = self.random.ok_or(Error::InvalidState("no client random"))?;
        let server_random = self
            .server_random
            .ok_or(Error::InvalidState("no server random"))?;

        let keys = self.config.crypto_provider().derive_key_block(
            suite,
            self.master()?,
            &client_random,
            &server_random,
        )?;
        trace!("Derived {:?}", keys);

        self.key_block = Some(keys.clone());
        Ok(keys)
    }

    /// Whether a cached session can be offered under the current config.
    fn can_offer(&self, session: &Session) -> bool {
        session.is_resumable()
            && !session.session_id().is_empty()
            && session
                .version()
                .is_within(self.config.min_version(), self.config.max_version())
            && self.config.cipher_suites().contains(&session.cipher_suite())
            && session.extended_master_secret() == self.config.with_extended_master_secret()
    }

    fn finish(&mut self, now: Instant) {
        let session = match self.build_session(now) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                // Only reachable if a state skipped its bookkeeping.
                warn!("Handshake done without a session: {}", e);
                self.emit(Event::HandshakeDone { resumed: self.hit });
                return;
            }
        };

        if let Some(store) = self.config.session_store() {
            store.insert(Arc::clone(&session));
            store.count_completed(self.hit);
        }

        debug!(
            "Handshake complete (resumed: {}, suite: {:?})",
            self.hit,
            session.cipher_suite()
        );

        self.session = Some(session);
        self.emit(Event::HandshakeDone { resumed: self.hit });
    }

    fn build_session(&mut self, now: Instant) -> Result<Session, Error> {
        if self.hit {
            let offered = self
                .offered
                .as_ref()
                .ok_or(Error::InvalidState("resumed without a session"))?;
            let mut session = Session::clone(offered);
            // A renewed ticket replaces the old one.
            if let Some(ticket) = self.ticket.take() {
                session = session.with_ticket(ticket);
            }
            return Ok(session);
        }

        let version = self.version.ok_or(Error::InvalidState("no version"))?;
        let mut session = Session::new(
            self.server_session_id,
            version,
            self.suite()?,
            self.master()?.clone(),
            now,
        )
        .with_timeout(self.config.session_timeout())
        .with_extended_master_secret(self.extended_master_secret);

        if let Some(identity) = self.peer_identity.clone() {
            session = session.with_peer(mem::take(&mut self.peer_certificates), identity);
        }
        if let Some(response) = self.ocsp_response.take() {
            session = session.with_ocsp_response(response);
        }
        if let Some(ticket) = self.ticket.take() {
            // rfc5077 3.4, a ticket session needs an id to be offered.
            if session.session_id().is_empty() {
                let id = SessionId::random(TICKET_SESSION_ID_LEN, &mut self.engine.rng);
                session.set_session_id(id);
            }
            session = session.with_ticket(ticket);
        }

        Ok(session)
    }

    fn fail(&mut self, from: StateName, error: Error) -> Error {
        warn!("Handshake failed in {}: {}", from, error);

        self.poisoned = true;
        self.state = State::Failed;
        self.reuse = None;

        if let Some(description) = error.alert() {
            self.engine.send_alert(description);
            if let Err(e) = self.engine.flush_output(&mut self.transport) {
                debug!("Failed to send alert: {}", e);
            }
        }

        // A session that fails to resume is not offered again.
        if self.hit {
            if let (Some(store), Some(session)) = (self.config.session_store(), &self.offered) {
                store.remove(session.session_id());
            }
        }

        self.emit(Event::StateChange {
            from,
            to: StateName::Failed,
        });
        self.exit(Outcome::Failed(error.category()));

        error
    }

    fn emit(&self, event: Event) {
        if let Some(observer) = self.config.observer() {
            observer.on_event(&event);
        }
    }

    fn exit(&self, outcome: Outcome) {
        self.emit(Event::Exit {
            state: self.state.name(),
            outcome,
        });
    }
}

impl State {
    fn name(&self) -> StateName {
        match self {
            State::Start => StateName::Start,
            State::SendClientHello => StateName::SendClientHello,
            State::WaitHelloVerify => StateName::WaitHelloVerify,
            State::WaitServerHello => StateName::WaitServerHello,
            State::WaitCertificate => StateName::WaitCertificate,
            State::WaitCertStatus => StateName::WaitCertStatus,
            State::WaitKeyExchange => StateName::WaitKeyExchange,
            State::WaitCertRequest(_) => StateName::WaitCertRequest,
            State::WaitServerDone { .. } => StateName::WaitServerDone,
            State::SendCertificate { .. } => StateName::SendCertificate,
            State::SendKeyExchange { .. } => StateName::SendKeyExchange,
            State::SendCertVerify { .. } => StateName::SendCertVerify,
            State::SendChangeCipherSpec => StateName::SendChangeCipherSpec,
            State::SendFinished => StateName::SendFinished,
            State::Flush { .. } => StateName::Flush,
            State::WaitSessionTicket => StateName::WaitSessionTicket,
            State::WaitFinished { .. } => StateName::WaitFinished,
            State::Done => StateName::Done,
            State::Failed => StateName::Failed,
        }
    }

    /// States that read from the peer.
    fn is_waiting(&self) -> bool {
        matches!(
            self,
            State::WaitHelloVerify
                | State::WaitServerHello
                | State::WaitCertificate
                | State::WaitCertStatus
                | State::WaitKeyExchange
                | State::WaitCertRequest(_)
                | State::WaitServerDone { .. }
                | State::WaitSessionTicket
                | State::WaitFinished { .. }
        )
    }

    fn make_progress<T: Transport>(
        self,
        client: &mut Client<T>,
        now: Instant,
    ) -> Result<Poll, Error> {
        match self {
            State::Start => self.start(client, now),
            State::SendClientHello => self.send_client_hello(client),
            State::WaitHelloVerify => self.wait_hello_verify(client),
            State::WaitServerHello => self.wait_server_hello(client),
            State::WaitCertificate => self.wait_certificate(client),
            State::WaitCertStatus => self.wait_cert_status(client),
            State::WaitKeyExchange => self.wait_key_exchange(client),
            State::WaitCertRequest(kx) => State::wait_cert_request(kx, client),
            State::WaitServerDone { kx, cert_request } => {
                State::wait_server_done(kx, cert_request, client)
            }
            State::SendCertificate { kx, offered } => State::send_certificate(kx, offered, client),
            State::SendKeyExchange { kx, sign_with } => {
                State::send_key_exchange(kx, sign_with, client)
            }
            State::SendCertVerify { offered } => State::send_cert_verify(offered, client),
            State::SendChangeCipherSpec => self.send_change_cipher_spec(client),
            State::SendFinished => self.send_finished(client),
            State::Flush { next } => State::flush(next, client, now),
            State::WaitSessionTicket => self.wait_session_ticket(client),
            State::WaitFinished { ccs_seen } => State::wait_finished(ccs_seen, client),
            State::Done | State::Failed => Err(Error::InvalidState("handshake is over")),
        }
    }

    fn start<T: Transport>(self, client: &mut Client<T>, now: Instant) -> Result<Poll, Error> {
        client.emit(Event::HandshakeStart);

        client.random = Some(Random::new(&mut client.engine.rng));

        if let Some(store) = client.config.session_store() {
            store.count_connect();
        }

        if let (Some(id), Some(store)) = (client.offer_id, client.config.session_store()) {
            match store.lookup(&id, now) {
                Some(session) if client.can_offer(&session) => {
                    debug!("Offering cached session {}", id);
                    client.offered = Some(session);
                }
                Some(_) => debug!("Cached session {} does not fit the config", id),
                None => debug!("No cached session {}", id),
            }
        }

        client.engine.flight_begin(1);

        Ok(Poll::Ready(State::SendClientHello))
    }

    fn send_client_hello<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let random = client.random.ok_or(Error::InvalidState("no client random"))?;
        let config = Arc::clone(&client.config);
        let variant = config.variant();

        // Every ClientHello restarts the Finished MAC.
        client.engine.transcript_mut().reset();

        let offered = client.offered.as_ref();
        let session_id = offered
            .map(|s| *s.session_id())
            .unwrap_or_else(SessionId::empty);
        let ticket = offered
            .and_then(|s| s.ticket())
            .map(|t| t.data.clone())
            .unwrap_or_default();

        let mut cipher_suites = ArrayVec::default();
        for suite in config
            .cipher_suites()
            .iter()
            .filter(|s| s.is_valid_for(config.max_version()))
            .take(32)
        {
            cipher_suites.push(*suite);
        }

        let mut compression_methods = ArrayVec::default();
        compression_methods.push(CompressionMethod::Null);

        let mut supported_groups = Vec::new();
        supported_groups.extend_from_slice(&((config.groups().len() * 2) as u16).to_be_bytes());
        for group in config.groups() {
            supported_groups.extend_from_slice(&group.as_u16().to_be_bytes());
        }

        let signature_schemes = SignatureAndHashAlgorithm::supported();
        let mut signature_algorithms = Vec::new();
        signature_algorithms
            .extend_from_slice(&((signature_schemes.len() * 2) as u16).to_be_bytes());
        for scheme in signature_schemes {
            signature_algorithms.extend_from_slice(&scheme.as_u16().to_be_bytes());
        }

        // Uncompressed points only.
        const EC_POINT_FORMATS: &[u8] = &[1, 0];
        // Initial handshake, empty renegotiated_connection.
        const RENEGOTIATION_INFO: &[u8] = &[0];
        // OCSP, no responder ids, no request extensions.
        const STATUS_REQUEST: &[u8] = &[1, 0, 0, 0, 0];

        let mut extensions = ArrayVec::default();
        extensions.push(Extension::new(
            ExtensionType::SupportedGroups,
            &supported_groups,
        ));
        extensions.push(Extension::new(
            ExtensionType::EcPointFormats,
            EC_POINT_FORMATS,
        ));
        extensions.push(Extension::new(
            ExtensionType::SignatureAlgorithms,
            &signature_algorithms,
        ));
        extensions.push(Extension::new(
            ExtensionType::RenegotiationInfo,
            RENEGOTIATION_INFO,
        ));
        if config.with_extended_master_secret() {
            extensions.push(Extension::new(ExtensionType::ExtendedMasterSecret, &[]));
        }
        if config.with_session_tickets() {
            extensions.push(Extension::new(ExtensionType::SessionTicket, &ticket));
        }
        if config.with_ocsp_stapling() {
            extensions.push(Extension::new(ExtensionType::StatusRequest, STATUS_REQUEST));
        }

        let hello = ClientHello {
            client_version: config.max_version(),
            random,
            session_id,
            cookie: if client.send_cookie {
                client.cookie
            } else {
                Cookie::empty()
            },
            cipher_suites,
            compression_methods,
            extensions,
        };

        let mut body = Vec::new();
        hello.serialize(&mut body, variant);

        debug!(
            "Send ClientHello (session: {}, cookie: {})",
            !session_id.is_empty(),
            client.send_cookie
        );
        client.engine.send_handshake(MessageType::ClientHello, body);

        let next = match variant {
            Variant::Dtls => State::WaitHelloVerify,
            Variant::Tls => State::WaitServerHello,
        };

        Ok(Poll::Ready(State::Flush {
            next: Box::new(next),
        }))
    }

    fn wait_hello_verify<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(self, Interest::Read));
        };

        if handshake.msg_type != MessageType::HelloVerifyRequest {
            // The server skipped the cookie exchange.
            client.send_cookie = false;
            client.reuse = Some(handshake);
            return Ok(Poll::Ready(State::WaitServerHello));
        }

        let hvr = parse_all("HelloVerifyRequest", &handshake.body, HelloVerifyRequest::parse)?;

        if hvr.server_version.variant() != Some(Variant::Dtls) {
            return Err(Error::UnsupportedVersion(hvr.server_version));
        }

        if hvr.cookie.len() > client.config.max_cookie_len() {
            return Err(Error::IllegalParameter(format!(
                "cookie of {} bytes exceeds {}",
                hvr.cookie.len(),
                client.config.max_cookie_len()
            )));
        }

        client.cookie_rounds += 1;
        if client.cookie_rounds > MAX_COOKIE_ROUNDS {
            return Err(Error::UnexpectedMessage(format!(
                "more than {} HelloVerifyRequests",
                MAX_COOKIE_ROUNDS
            )));
        }

        client.cookie = Cookie::try_new(hvr.cookie)
            .map_err(|e| Error::IllegalParameter(e.to_string()))?;
        client.send_cookie = true;

        debug!(
            "HelloVerifyRequest round {} with {} byte cookie",
            client.cookie_rounds,
            hvr.cookie.len()
        );

        client.engine.flight_stop();
        client.engine.flight_begin(3);

        Ok(Poll::Ready(State::SendClientHello))
    }

    fn wait_server_hello<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(self, Interest::Read));
        };
        expect(&handshake, MessageType::ServerHello)?;

        let config = Arc::clone(&client.config);
        let hello = parse_all("ServerHello", &handshake.body, ServerHello::parse)?;

        let version = hello.server_version;
        if !version.is_within(config.min_version(), config.max_version()) {
            return Err(Error::UnsupportedVersion(version));
        }

        let suite = hello.cipher_suite;
        if !config.cipher_suites().contains(&suite) || !suite.is_valid_for(version) {
            return Err(Error::UnsupportedCipherSuite(suite));
        }

        if hello.compression_method != CompressionMethod::Null {
            return Err(Error::IllegalParameter(format!(
                "compression {:?}",
                hello.compression_method
            )));
        }

        check_server_extensions(&hello, &config)?;

        client.extended_master_secret = hello
            .find_extension(ExtensionType::ExtendedMasterSecret)
            .is_some();
        client.ticket_expected = hello.find_extension(ExtensionType::SessionTicket).is_some();
        client.status_expected = hello.find_extension(ExtensionType::StatusRequest).is_some();

        client.hit = match &client.offered {
            Some(session) => {
                !hello.session_id.is_empty() && *session.session_id() == hello.session_id
            }
            None => false,
        };

        if client.hit {
            if let Some(session) = &client.offered {
                if session.version() != version {
                    return Err(Error::UnsupportedVersion(version));
                }
                if session.cipher_suite() != suite {
                    return Err(Error::IllegalParameter(format!(
                        "resumed with {:?}, session has {:?}",
                        suite,
                        session.cipher_suite()
                    )));
                }
                // rfc7627 5.3
                if session.extended_master_secret() != client.extended_master_secret {
                    return Err(Error::HandshakeFailure(
                        "extended_master_secret differs from the resumed session".to_string(),
                    ));
                }
                client.master_secret = Some(session.master_secret().clone());
                client.peer_identity = session.peer_identity().cloned();
            }
        }

        debug!(
            "ServerHello: {:?} {:?} (resumed: {})",
            version, suite, client.hit
        );

        client.version = Some(version);
        client.cipher_suite = Some(suite);
        client.server_random = Some(hello.random);
        client.server_session_id = hello.session_id;
        client.engine.set_record_version(version);

        client.accept(&handshake);

        let next = if !client.hit {
            State::WaitCertificate
        } else if client.ticket_expected {
            State::WaitSessionTicket
        } else {
            State::WaitFinished { ccs_seen: false }
        };

        Ok(Poll::Ready(next))
    }

    fn wait_certificate<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(self, Interest::Read));
        };
        expect(&handshake, MessageType::Certificate)?;

        let certificate = parse_all("Certificate", &handshake.body, Certificate::parse)?;
        if certificate.certificate_list.is_empty() {
            return Err(Error::DecodeError("empty server certificate chain".to_string()));
        }

        let chain: Vec<Vec<u8>> = certificate
            .certificate_list
            .iter()
            .map(|c| c.to_vec())
            .collect();

        let identity = client.config.cert_verifier().verify_chain(&chain)?;
        debug!("Server certificate chain ({} certs) verified", chain.len());

        client.peer_certificates = chain;
        client.peer_identity = Some(identity);
        client.accept(&handshake);

        if client.status_expected {
            Ok(Poll::Ready(State::WaitCertStatus))
        } else {
            Ok(Poll::Ready(State::WaitKeyExchange))
        }
    }

    fn wait_cert_status<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(self, Interest::Read));
        };

        if handshake.msg_type != MessageType::CertificateStatus {
            // The server may decline to staple after acknowledging.
            debug!("No CertificateStatus, got {:?}", handshake.msg_type);
            client.reuse = Some(handshake);
            return Ok(Poll::Ready(State::WaitKeyExchange));
        }

        let status = parse_all(
            "CertificateStatus",
            &handshake.body,
            CertificateStatus::parse,
        )?;
        client.ocsp_response = Some(status.ocsp_response.to_vec());
        client.accept(&handshake);

        Ok(Poll::Ready(State::WaitKeyExchange))
    }

    fn wait_key_exchange<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(self, Interest::Read));
        };
        expect(&handshake, MessageType::ServerKeyExchange)?;

        let ske = parse_all(
            "ServerKeyExchange",
            &handshake.body,
            ServerKeyExchange::parse,
        )?;

        if !client.config.groups().contains(&ske.group) {
            return Err(Error::IllegalParameter(format!(
                "group {:?} not offered",
                ske.group
            )));
        }

        let algorithm = ske.signature.algorithm;
        if !SignatureAndHashAlgorithm::supported().contains(&algorithm)
            || algorithm.signature != client.suite()?.signature_algorithm()
        {
            return Err(Error::IllegalParameter(format!(
                "signature algorithm {:?}",
                algorithm
            )));
        }

        let client_random = client.random.ok_or(Error::InvalidState("no client random"))?;
        let server_random = client
            .server_random
            .ok_or(Error::InvalidState("no server random"))?;

        let mut signed = Vec::with_capacity(64 + ske.params.len());
        signed.extend_from_slice(client_random.as_bytes());
        signed.extend_from_slice(server_random.as_bytes());
        signed.extend_from_slice(ske.params);

        let peer = client
            .peer_identity
            .as_ref()
            .ok_or(Error::InvalidState("no peer identity"))?;
        client
            .config
            .cert_verifier()
            .verify_signature(peer, &signed, &ske.signature)?;

        trace!("ServerKeyExchange signature verified ({:?})", algorithm);

        let kx = ServerKeyShare {
            group: ske.group,
            public_key: ske.public_key.to_vec(),
        };
        client.accept(&handshake);

        Ok(Poll::Ready(State::WaitCertRequest(kx)))
    }

    fn wait_cert_request<T: Transport>(
        kx: ServerKeyShare,
        client: &mut Client<T>,
    ) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(State::WaitCertRequest(kx), Interest::Read));
        };

        if handshake.msg_type != MessageType::CertificateRequest {
            client.reuse = Some(handshake);
            return Ok(Poll::Ready(State::WaitServerDone {
                kx,
                cert_request: None,
            }));
        }

        let request = parse_all(
            "CertificateRequest",
            &handshake.body,
            CertificateRequest::parse,
        )?;
        debug!(
            "Server requests a client certificate ({} algorithms)",
            request.supported_signature_algorithms.len()
        );
        client.accept(&handshake);

        Ok(Poll::Ready(State::WaitServerDone {
            kx,
            cert_request: Some(request.supported_signature_algorithms.to_vec()),
        }))
    }

    fn wait_server_done<T: Transport>(
        kx: ServerKeyShare,
        cert_request: Option<Vec<SignatureAndHashAlgorithm>>,
        client: &mut Client<T>,
    ) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(
                State::WaitServerDone { kx, cert_request },
                Interest::Read,
            ));
        };
        expect(&handshake, MessageType::ServerHelloDone)?;

        if !handshake.body.is_empty() {
            return Err(Error::DecodeError("ServerHelloDone with a body".to_string()));
        }
        client.accept(&handshake);

        client.engine.flight_stop();
        client.engine.flight_begin(5);

        let next = match cert_request {
            Some(offered) => State::SendCertificate { kx, offered },
            None => State::SendKeyExchange {
                kx,
                sign_with: None,
            },
        };

        Ok(Poll::Ready(next))
    }

    fn send_certificate<T: Transport>(
        kx: ServerKeyShare,
        offered: Vec<SignatureAndHashAlgorithm>,
        client: &mut Client<T>,
    ) -> Result<Poll, Error> {
        let config = Arc::clone(&client.config);
        let chain = config
            .client_credential()
            .map(|c| c.certificate_chain())
            .unwrap_or_default();

        if chain.is_empty() {
            debug!("Send empty client Certificate");
        }

        let mut body = Vec::new();
        Certificate::new(chain.iter().map(|c| c.as_slice()).collect()).serialize(&mut body);
        client.engine.send_handshake(MessageType::Certificate, body);

        let sign_with = if chain.is_empty() {
            None
        } else {
            Some(offered)
        };

        Ok(Poll::Ready(State::SendKeyExchange { kx, sign_with }))
    }

    fn send_key_exchange<T: Transport>(
        kx: ServerKeyShare,
        sign_with: Option<Vec<SignatureAndHashAlgorithm>>,
        client: &mut Client<T>,
    ) -> Result<Poll, Error> {
        let config = Arc::clone(&client.config);
        let provider = config.crypto_provider();
        let suite = client.suite()?;

        let active = provider.start_key_exchange(kx.group)?;
        let mut body = Vec::new();
        ClientKeyExchange::new(active.public_key()).serialize(&mut body);

        let pre_master_secret = active.complete(&kx.public_key)?;

        client.engine.send_handshake(MessageType::ClientKeyExchange, body);

        let master_secret = if client.extended_master_secret {
            // Session hash covers everything up to and including ClientKeyExchange.
            let session_hash = client
                .engine
                .transcript()
                .hash(&**provider, suite.hash_algorithm())?;
            provider.derive_master_secret(
                suite,
                &pre_master_secret,
                MasterSecretSeed::Extended {
                    session_hash: &session_hash,
                },
            )?
        } else {
            let client_random = client.random.ok_or(Error::InvalidState("no client random"))?;
            let server_random = client
                .server_random
                .ok_or(Error::InvalidState("no server random"))?;
            provider.derive_master_secret(
                suite,
                &pre_master_secret,
                MasterSecretSeed::Standard {
                    client_random: &client_random,
                    server_random: &server_random,
                },
            )?
        };

        trace!(
            "Derived master secret (extended: {})",
            client.extended_master_secret
        );
        client.master_secret = Some(master_secret);

        match sign_with {
            Some(offered) => Ok(Poll::Ready(State::SendCertVerify { offered })),
            None => Ok(Poll::Ready(State::SendChangeCipherSpec)),
        }
    }

    fn send_cert_verify<T: Transport>(
        offered: Vec<SignatureAndHashAlgorithm>,
        client: &mut Client<T>,
    ) -> Result<Poll, Error> {
        let config = Arc::clone(&client.config);
        let credential = config
            .client_credential()
            .ok_or(Error::InvalidState("no client credential"))?;

        let signed = credential.sign(client.engine.transcript().bytes(), &offered)?;
        debug!("Send CertificateVerify ({:?})", signed.algorithm);

        let mut body = Vec::new();
        signed.serialize(&mut body);
        client.engine.send_handshake(MessageType::CertificateVerify, body);

        Ok(Poll::Ready(State::SendChangeCipherSpec))
    }

    fn send_change_cipher_spec<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let keys = client.keys()?;
        client.engine.send_change_cipher_spec(keys);

        Ok(Poll::Ready(State::SendFinished))
    }

    fn send_finished<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let suite = client.suite()?;
        let verify_data = client.config.crypto_provider().compute_finished_mac(
            suite,
            Sender::Client,
            client.master()?,
            client.engine.transcript().bytes(),
        )?;

        let mut body = Vec::new();
        Finished::new(&verify_data).serialize(&mut body);
        client.engine.send_handshake(MessageType::Finished, body);

        let next = if client.hit {
            State::Done
        } else if client.ticket_expected {
            State::WaitSessionTicket
        } else {
            State::WaitFinished { ccs_seen: false }
        };

        Ok(Poll::Ready(State::Flush {
            next: Box::new(next),
        }))
    }

    fn flush<T: Transport>(
        next: Box<State>,
        client: &mut Client<T>,
        now: Instant,
    ) -> Result<Poll, Error> {
        if !client.engine.flush_output(&mut client.transport)? {
            return Ok(Poll::Pending(State::Flush { next }, Interest::Write));
        }

        // The flight is out, count down to its resend.
        if next.is_waiting() {
            client.engine.flight_arm(now);
        }

        Ok(Poll::Ready(*next))
    }

    fn wait_session_ticket<T: Transport>(self, client: &mut Client<T>) -> Result<Poll, Error> {
        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(self, Interest::Read));
        };
        expect(&handshake, MessageType::NewSessionTicket)?;

        let nst = parse_all("NewSessionTicket", &handshake.body, NewSessionTicket::parse)?;

        // An empty ticket means the server changed its mind.
        if !nst.ticket.is_empty() {
            debug!(
                "Received session ticket ({} bytes, hint {}s)",
                nst.ticket.len(),
                nst.lifetime_hint
            );
            client.ticket = Some(Ticket {
                data: nst.ticket.to_vec(),
                lifetime_hint: nst.lifetime_hint,
            });
        }
        client.accept(&handshake);

        Ok(Poll::Ready(State::WaitFinished { ccs_seen: false }))
    }

    fn wait_finished<T: Transport>(ccs_seen: bool, client: &mut Client<T>) -> Result<Poll, Error> {
        if !ccs_seen {
            if !client.engine.take_change_cipher_spec(&mut client.transport)? {
                return Ok(Poll::Pending(
                    State::WaitFinished { ccs_seen },
                    Interest::Read,
                ));
            }

            let keys = client.keys()?;
            debug!("Switch read cipher state to epoch 1");
            client
                .transport
                .set_cipher_state(Direction::Read, 1, &keys)?;

            return Ok(Poll::Ready(State::WaitFinished { ccs_seen: true }));
        }

        let Some(handshake) = client.next_message()? else {
            return Ok(Poll::Pending(
                State::WaitFinished { ccs_seen },
                Interest::Read,
            ));
        };
        expect(&handshake, MessageType::Finished)?;

        let suite = client.suite()?;
        let finished = parse_all("Finished", &handshake.body, |i| Finished::parse(i, suite))?;

        // Expected MAC is over the transcript without the server Finished.
        let expected = client.config.crypto_provider().compute_finished_mac(
            suite,
            Sender::Server,
            client.master()?,
            client.engine.transcript().bytes(),
        )?;

        if !constant_time_eq(finished.verify_data, &expected) {
            return Err(Error::BadFinished);
        }
        trace!("Server Finished verified");

        client.accept(&handshake);
        client.engine.flight_stop();

        if client.hit {
            // Our final flight. Nothing answers it, so it is never resent.
            client.engine.flight_begin(5);
            Ok(Poll::Ready(State::SendChangeCipherSpec))
        } else {
            Ok(Poll::Ready(State::Done))
        }
    }
}

fn expect(handshake: &Handshake, msg_type: MessageType) -> Result<(), Error> {
    if handshake.msg_type != msg_type {
        return Err(Error::UnexpectedMessage(format!(
            "{:?} while expecting {:?}",
            handshake.msg_type, msg_type
        )));
    }
    Ok(())
}

/// The server may only answer extensions we sent.
fn check_server_extensions(hello: &ServerHello<'_>, config: &Config) -> Result<(), Error> {
    for (i, extension) in hello.extensions.iter().enumerate() {
        let t = extension.extension_type;

        if hello.extensions[..i].iter().any(|e| e.extension_type == t) {
            return Err(Error::DecodeError(format!("duplicate extension {:?}", t)));
        }

        let offered = match t {
            ExtensionType::EcPointFormats => true,
            ExtensionType::RenegotiationInfo => {
                if extension.extension_data != [0u8] {
                    return Err(Error::HandshakeFailure(
                        "renegotiation_info is not empty".to_string(),
                    ));
                }
                true
            }
            ExtensionType::ExtendedMasterSecret => config.with_extended_master_secret(),
            ExtensionType::SessionTicket => config.with_session_tickets(),
            ExtensionType::StatusRequest => config.with_ocsp_stapling(),
            _ => false,
        };

        if !offered {
            return Err(Error::UnsupportedExtension(t));
        }

        let must_be_empty = matches!(
            t,
            ExtensionType::ExtendedMasterSecret
                | ExtensionType::SessionTicket
                | ExtensionType::StatusRequest
        );
        if must_be_empty && !extension.extension_data.is_empty() {
            return Err(Error::DecodeError(format!("{:?} with data", t)));
        }
    }

    Ok(())
}
