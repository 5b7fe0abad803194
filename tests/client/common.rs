//! Shared helpers for client handshake tests: an in-memory transport and a
//! scripted server built from the public message codecs.

#![allow(unused)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tinyvec::ArrayVec;

use dconnect::crypto::rust_crypto::default_provider;
use dconnect::crypto::{ActiveKeyExchange, CryptoProvider, MasterSecret, MasterSecretSeed, Sender};
use dconnect::message::{
    Alert, AlertDescription, Certificate, CertificateRequest, CertificateStatus, CipherSuite,
    ClientCertificateType, ClientHello, ClientKeyExchange, CompressionMethod, ContentType,
    DigitallySigned, Extension, ExtensionType, Finished, Handshake, HashAlgorithm, Header,
    HelloVerifyRequest, MessageType, NamedGroup, NewSessionTicket, ProtocolVersion, Random,
    Record, Sequence, ServerHello, ServerKeyExchange, SessionId, SignatureAlgorithm,
    SignatureAndHashAlgorithm, Variant,
};
use dconnect::{
    CertVerifier, Client, ClientCredential, Config, ConfigBuilder, Direction, Error, Event,
    KeyBlock, Observer, PeerIdentity, SessionStore, Step, Transport,
};

pub const SERVER_CERT: &[u8] = b"server certificate";
pub const CLIENT_CERT: &[u8] = b"client certificate";
pub const SERVER_SIGNATURE: &[u8] = b"server signature";

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Non-blocking in-memory transport. Every `Vec<u8>` is one datagram (DTLS)
/// or one write (TLS).
#[derive(Default)]
pub struct TestTransport {
    pub inbound: VecDeque<Vec<u8>>,
    pub outbound: Vec<Vec<u8>>,
    /// Cipher state changes, with the number of writes done before each.
    pub switches: Vec<(Direction, u16, usize)>,
    pub block_writes: bool,
    pub fail_writes: bool,
    pub closed: bool,
}

impl TestTransport {
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        mem::take(&mut self.outbound)
    }
}

impl Transport for TestTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut data) = self.inbound.pop_front() else {
            if self.closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        };

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
            self.inbound.push_front(data.split_off(n));
        }
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.block_writes {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if self.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.outbound.push(buf.to_vec());
        Ok(buf.len())
    }

    fn set_cipher_state(
        &mut self,
        direction: Direction,
        epoch: u16,
        _keys: &KeyBlock,
    ) -> io::Result<()> {
        self.switches.push((direction, epoch, self.outbound.len()));
        Ok(())
    }
}

/// Accepts the test server's certificate and signature.
#[derive(Debug, Default)]
pub struct TestVerifier {
    pub reject: bool,
}

impl CertVerifier for TestVerifier {
    fn verify_chain(&self, chain: &[Vec<u8>]) -> Result<PeerIdentity, Error> {
        if self.reject || chain[0] != SERVER_CERT {
            return Err(Error::CertificateError("untrusted".to_string()));
        }
        Ok(PeerIdentity::new(chain[0].clone(), Some("server.test".to_string())))
    }

    fn verify_signature(
        &self,
        _peer: &PeerIdentity,
        _message: &[u8],
        signature: &DigitallySigned,
    ) -> Result<(), Error> {
        if signature.signature != SERVER_SIGNATURE {
            return Err(Error::CertificateError("bad signature".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TestCredential {
    chain: Vec<Vec<u8>>,
}

impl TestCredential {
    pub fn new() -> Self {
        TestCredential {
            chain: vec![CLIENT_CERT.to_vec()],
        }
    }
}

impl ClientCredential for TestCredential {
    fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    fn sign(
        &self,
        _message: &[u8],
        offered: &[SignatureAndHashAlgorithm],
    ) -> Result<DigitallySigned, Error> {
        let algorithm = offered
            .first()
            .copied()
            .ok_or_else(|| Error::HandshakeFailure("no algorithm".to_string()))?;
        Ok(DigitallySigned::new(algorithm, b"client signature".to_vec()))
    }
}

/// Observer that keeps every event.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for Recorder {
    fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(*event);
    }
}

pub fn config(variant: Variant) -> ConfigBuilder {
    Config::builder()
        .variant(variant)
        .rng_seed(42)
        .cert_verifier(Arc::new(TestVerifier::default()))
}

pub fn new_client(config: ConfigBuilder) -> Client<TestTransport> {
    let config = config.build().expect("build config");
    Client::new(Arc::new(config), TestTransport::default())
}

/// How the scripted server behaves.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub version: ProtocolVersion,
    pub suite: CipherSuite,
    pub group: NamedGroup,
    /// HelloVerifyRequests to send before accepting a ClientHello.
    pub cookie_rounds: usize,
    pub cookie_len: usize,
    pub hello_verify_version: ProtocolVersion,
    /// Give full handshakes a session id.
    pub issue_session_id: bool,
    /// Send this NewSessionTicket, if the client asked for tickets.
    pub ticket: Option<Vec<u8>>,
    pub ems: bool,
    pub cert_request: bool,
    /// Staple this OCSP response, if the client asked.
    pub staple: Option<Vec<u8>>,
    pub resume: bool,
    pub bad_finished: bool,
    /// Echo this extension in ServerHello even though nobody asked.
    pub unsolicited: Option<ExtensionType>,
    /// Replace the first reply with this message.
    pub first_reply: Option<MessageType>,
}

impl ServerOptions {
    pub fn new(variant: Variant) -> Self {
        let version = match variant {
            Variant::Dtls => ProtocolVersion::DTLS1_2,
            Variant::Tls => ProtocolVersion::TLS1_2,
        };
        ServerOptions {
            version,
            suite: CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            group: NamedGroup::X25519,
            cookie_rounds: 0,
            cookie_len: 16,
            hello_verify_version: ProtocolVersion::DTLS1_0,
            issue_session_id: true,
            ticket: None,
            ems: true,
            cert_request: false,
            staple: None,
            resume: true,
            bad_finished: false,
            unsolicited: None,
            first_reply: None,
        }
    }
}

/// What the server learned from one ClientHello.
#[derive(Debug, Clone)]
pub struct HelloInfo {
    pub message_seq: u16,
    pub random: Random,
    pub session_id: Vec<u8>,
    pub cookie: Vec<u8>,
    pub suites: Vec<CipherSuite>,
    pub extensions: Vec<(ExtensionType, Vec<u8>)>,
}

impl HelloInfo {
    pub fn extension(&self, t: ExtensionType) -> Option<&[u8]> {
        self.extensions
            .iter()
            .find(|(e, _)| *e == t)
            .map(|(_, d)| d.as_slice())
    }
}

#[derive(Clone)]
struct Resumable {
    master: MasterSecret,
    suite: CipherSuite,
    ems: bool,
}

enum Incoming {
    Handshake(Handshake),
    ChangeCipherSpec,
    Alert(Vec<u8>),
}

/// Scripted TLS 1.2 / DTLS 1.2 server that answers whole flights.
///
/// Record protection is skipped in both directions, just like the
/// [`TestTransport`] does.
pub struct MockServer {
    pub variant: Variant,
    pub opts: ServerOptions,
    provider: Arc<dyn CryptoProvider>,

    transcript: Vec<u8>,
    send_seq: u16,
    next_client_seq: u16,
    epoch: u16,
    record_seq: u64,
    stream: Vec<u8>,

    random: Random,
    client_random: Option<Random>,
    session_id: Vec<u8>,
    kx: Option<Box<dyn ActiveKeyExchange>>,
    master: Option<MasterSecret>,
    ems: bool,
    resumed: bool,
    cookies_sent: usize,
    last_cookie: Vec<u8>,
    last_flight: Vec<Vec<u8>>,

    sessions: HashMap<Vec<u8>, Resumable>,
    tickets: HashMap<Vec<u8>, Resumable>,

    pub hellos: Vec<HelloInfo>,
    pub received: Vec<MessageType>,
    pub client_certificates: Vec<Vec<u8>>,
    pub alerts: Vec<(u8, AlertDescription)>,
    pub client_finished_ok: Option<bool>,
    pub client_ccs: usize,
    pub dupes: usize,
    pub done: bool,
}

impl MockServer {
    pub fn new(variant: Variant) -> Self {
        Self::with_options(variant, ServerOptions::new(variant))
    }

    pub fn with_options(variant: Variant, opts: ServerOptions) -> Self {
        MockServer {
            variant,
            opts,
            provider: default_provider(),
            transcript: Vec::new(),
            send_seq: 0,
            next_client_seq: 0,
            epoch: 0,
            record_seq: 0,
            stream: Vec::new(),
            random: Random([0x5E; 32]),
            client_random: None,
            session_id: Vec::new(),
            kx: None,
            master: None,
            ems: false,
            resumed: false,
            cookies_sent: 0,
            last_cookie: Vec::new(),
            last_flight: Vec::new(),
            sessions: HashMap::new(),
            tickets: HashMap::new(),
            hellos: Vec::new(),
            received: Vec::new(),
            client_certificates: Vec::new(),
            alerts: Vec::new(),
            client_finished_ok: None,
            client_ccs: 0,
            dupes: 0,
            done: false,
        }
    }

    /// Forget the connection but keep the session caches.
    pub fn reset_connection(&mut self) {
        let sessions = mem::take(&mut self.sessions);
        let tickets = mem::take(&mut self.tickets);
        let opts = self.opts.clone();
        *self = MockServer::with_options(self.variant, opts);
        self.sessions = sessions;
        self.tickets = tickets;
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Take what the client wrote and answer it.
    pub fn handle(&mut self, input: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for message in self.parse(input) {
            match message {
                Incoming::Handshake(h) => out.extend(self.on_handshake(h)),
                Incoming::ChangeCipherSpec => self.client_ccs += 1,
                Incoming::Alert(a) => {
                    self.alerts
                        .push((a[0], AlertDescription::from_u8(a[1])));
                }
            }
        }
        if !out.is_empty() {
            self.last_flight = out.clone();
        }
        out
    }

    fn parse(&mut self, input: Vec<Vec<u8>>) -> Vec<Incoming> {
        let mut records = Vec::new();

        let mut collect = |mut data: &[u8], variant: Variant| -> usize {
            let start = data.len();
            while let Ok((rest, record)) = Record::parse(data, variant) {
                records.push((record.content_type, record.fragment.to_vec()));
                data = rest;
            }
            start - data.len()
        };

        match self.variant {
            Variant::Dtls => {
                for datagram in &input {
                    collect(datagram, Variant::Dtls);
                }
            }
            Variant::Tls => {
                for chunk in &input {
                    self.stream.extend_from_slice(chunk);
                }
                let used = collect(&self.stream, Variant::Tls);
                self.stream.drain(..used);
            }
        }

        let mut messages = Vec::new();
        for (content_type, fragment) in records {
            match content_type {
                ContentType::Handshake => {
                    let mut input = &fragment[..];
                    while !input.is_empty() {
                        let (rest, header) =
                            Header::parse(input, self.variant).expect("handshake header");
                        assert!(!header.is_fragment(), "test server does not reassemble");
                        let len = header.fragment_length as usize;
                        let body = rest[..len].to_vec();
                        input = &rest[len..];
                        messages.push(Incoming::Handshake(Handshake::new(
                            header.msg_type,
                            header.message_seq,
                            body,
                        )));
                    }
                }
                ContentType::ChangeCipherSpec => messages.push(Incoming::ChangeCipherSpec),
                ContentType::Alert => messages.push(Incoming::Alert(fragment)),
                other => panic!("unexpected record {:?}", other),
            }
        }
        messages
    }

    fn on_handshake(&mut self, h: Handshake) -> Vec<Vec<u8>> {
        if self.variant == Variant::Dtls {
            if h.message_seq < self.next_client_seq {
                self.dupes += 1;
                // The client lost our flight.
                if matches!(h.msg_type, MessageType::ClientHello | MessageType::Finished) {
                    return self.last_flight.clone();
                }
                return vec![];
            }
            self.next_client_seq = h.message_seq + 1;
        }

        self.received.push(h.msg_type);

        match h.msg_type {
            MessageType::ClientHello => self.on_client_hello(h),
            MessageType::Certificate => {
                let cert = Certificate::parse(&h.body).expect("client certificate").1;
                self.client_certificates = cert.certificate_list.iter().map(|c| c.to_vec()).collect();
                self.absorb(&h);
                vec![]
            }
            MessageType::ClientKeyExchange => {
                self.on_client_key_exchange(&h);
                vec![]
            }
            MessageType::CertificateVerify => {
                self.absorb(&h);
                vec![]
            }
            MessageType::Finished => self.on_client_finished(h),
            other => panic!("server got {:?}", other),
        }
    }

    fn on_client_hello(&mut self, h: Handshake) -> Vec<Vec<u8>> {
        let ch = ClientHello::parse(&h.body, self.variant).expect("ClientHello").1;

        let info = HelloInfo {
            message_seq: h.message_seq,
            random: ch.random,
            session_id: ch.session_id.to_vec(),
            cookie: ch.cookie.to_vec(),
            suites: ch.cipher_suites.to_vec(),
            extensions: ch
                .extensions
                .iter()
                .map(|e| (e.extension_type, e.extension_data.to_vec()))
                .collect(),
        };
        self.hellos.push(info.clone());

        // Replies use the message_seq of the ClientHello.
        self.send_seq = h.message_seq;
        self.transcript.clear();

        if self.variant == Variant::Dtls && self.cookies_sent < self.opts.cookie_rounds {
            self.cookies_sent += 1;
            let cookie = vec![self.cookies_sent as u8; self.opts.cookie_len];
            let mut body = Vec::new();
            HelloVerifyRequest::new(self.opts.hello_verify_version, &cookie).serialize(&mut body);
            self.last_cookie = cookie;
            // Not part of the transcript.
            let hvr = Handshake::new(MessageType::HelloVerifyRequest, self.send_seq, body);
            return self.records(vec![(ContentType::Handshake, wire(&hvr, self.variant))]);
        }

        if self.opts.cookie_rounds > 0 {
            assert_eq!(info.cookie, self.last_cookie, "ClientHello echoes the cookie");
        }

        self.absorb(&h);
        self.client_random = Some(ch.random);

        if let Some(kind) = self.opts.first_reply {
            let bogus = self.message(kind, vec![]);
            return self.flight(vec![bogus]);
        }

        let wants_ems = info.extension(ExtensionType::ExtendedMasterSecret).is_some();
        let wants_ticket = info.extension(ExtensionType::SessionTicket).is_some();
        let wants_status = info.extension(ExtensionType::StatusRequest).is_some();

        // A known ticket or id resumes.
        let resumable = info
            .extension(ExtensionType::SessionTicket)
            .and_then(|t| self.tickets.get(t))
            .or_else(|| self.sessions.get(&info.session_id))
            .cloned()
            .filter(|_| self.opts.resume && !info.session_id.is_empty());

        if let Some(r) = resumable {
            self.resumed = true;
            self.session_id = info.session_id.clone();
            self.master = Some(r.master);
            self.opts.suite = r.suite;
            self.ems = self.opts.ems && wants_ems;

            let hello = self.server_hello(self.ems, wants_ticket && self.opts.ticket.is_some(), false);
            let mut messages = vec![hello];
            if wants_ticket {
                if let Some(ticket) = self.opts.ticket.clone() {
                    messages.push(self.new_session_ticket(&ticket));
                }
            }
            let mut out = self.flight(messages);
            out.extend(self.change_cipher_spec_and_finished());
            return out;
        }

        self.resumed = false;
        self.ems = self.opts.ems && wants_ems;
        self.session_id = if self.opts.issue_session_id {
            // Every full handshake gets a fresh id.
            vec![0xA0 + self.sessions.len() as u8; 32]
        } else {
            vec![]
        };

        let staple = self.opts.staple.clone().filter(|_| wants_status);
        let ticket = wants_ticket && self.opts.ticket.is_some();

        let mut messages = vec![
            self.server_hello(self.ems, ticket, staple.is_some()),
            self.certificate(),
        ];
        if let Some(response) = staple {
            let mut body = Vec::new();
            CertificateStatus::new(&response).serialize(&mut body);
            messages.push(self.message(MessageType::CertificateStatus, body));
        }
        messages.push(self.server_key_exchange());
        if self.opts.cert_request {
            messages.push(self.certificate_request());
        }
        messages.push(self.message(MessageType::ServerHelloDone, vec![]));

        self.flight(messages)
    }

    fn on_client_key_exchange(&mut self, h: &Handshake) {
        let cke = ClientKeyExchange::parse(&h.body).expect("ClientKeyExchange").1;
        let kx = self.kx.take().expect("server key share");
        let pre_master = kx.complete(cke.public_key).expect("ecdhe");

        self.absorb(h);

        let suite = self.opts.suite;
        let master = if self.ems {
            let session_hash = self
                .provider
                .hash(suite.hash_algorithm(), &self.transcript)
                .expect("session hash");
            self.provider
                .derive_master_secret(
                    suite,
                    &pre_master,
                    MasterSecretSeed::Extended {
                        session_hash: &session_hash,
                    },
                )
                .expect("master secret")
        } else {
            let client_random = self.client_random.expect("client random");
            self.provider
                .derive_master_secret(
                    suite,
                    &pre_master,
                    MasterSecretSeed::Standard {
                        client_random: &client_random,
                        server_random: &self.random,
                    },
                )
                .expect("master secret")
        };
        self.master = Some(master);
    }

    fn on_client_finished(&mut self, h: Handshake) -> Vec<Vec<u8>> {
        let expected = self.finished_mac(Sender::Client);
        self.client_finished_ok = Some(h.body == expected);
        self.absorb(&h);

        let remember = Resumable {
            master: self.master.clone().expect("master"),
            suite: self.opts.suite,
            ems: self.ems,
        };

        if self.resumed {
            self.done = true;
            return vec![];
        }

        if !self.session_id.is_empty() {
            self.sessions.insert(self.session_id.clone(), remember.clone());
        }

        let mut out = vec![];
        let wants_ticket = self
            .hellos
            .last()
            .and_then(|i| i.extension(ExtensionType::SessionTicket))
            .is_some();
        if wants_ticket {
            if let Some(ticket) = self.opts.ticket.clone() {
                self.tickets.insert(ticket.clone(), remember);
                let nst = self.new_session_ticket(&ticket);
                out = self.flight(vec![nst]);
            }
        }
        out.extend(self.change_cipher_spec_and_finished());
        self.done = true;
        out
    }

    fn server_hello(&mut self, ems: bool, ticket: bool, status: bool) -> Handshake {
        let session_id = SessionId::try_new(&self.session_id).expect("session id");

        let mut extensions = ArrayVec::default();
        extensions.push(Extension::new(ExtensionType::RenegotiationInfo, &[0]));
        if ems {
            extensions.push(Extension::new(ExtensionType::ExtendedMasterSecret, &[]));
        }
        if ticket {
            extensions.push(Extension::new(ExtensionType::SessionTicket, &[]));
        }
        if status {
            extensions.push(Extension::new(ExtensionType::StatusRequest, &[]));
        }
        if let Some(t) = self.opts.unsolicited {
            extensions.push(Extension::new(t, &[]));
        }

        let hello = ServerHello {
            server_version: self.opts.version,
            random: self.random,
            session_id,
            cipher_suite: self.opts.suite,
            compression_method: CompressionMethod::Null,
            extensions,
        };
        let mut body = Vec::new();
        hello.serialize(&mut body);
        self.message(MessageType::ServerHello, body)
    }

    fn certificate(&mut self) -> Handshake {
        let mut body = Vec::new();
        Certificate::new(vec![SERVER_CERT]).serialize(&mut body);
        self.message(MessageType::Certificate, body)
    }

    fn server_key_exchange(&mut self) -> Handshake {
        let kx = self
            .provider
            .start_key_exchange(self.opts.group)
            .expect("server key exchange");
        let public_key = kx.public_key().to_vec();
        self.kx = Some(kx);

        let signature = match self.opts.suite.signature_algorithm() {
            SignatureAlgorithm::ECDSA => SignatureAlgorithm::ECDSA,
            _ => SignatureAlgorithm::RSA,
        };
        let params = ServerKeyExchange::encode_params(self.opts.group, &public_key);
        let ske = ServerKeyExchange {
            group: self.opts.group,
            public_key: &public_key,
            params: &params,
            signature: DigitallySigned::new(
                SignatureAndHashAlgorithm::new(HashAlgorithm::SHA256, signature),
                SERVER_SIGNATURE.to_vec(),
            ),
        };
        let mut body = Vec::new();
        ske.serialize(&mut body);
        self.message(MessageType::ServerKeyExchange, body)
    }

    fn certificate_request(&mut self) -> Handshake {
        let mut certificate_types = ArrayVec::default();
        certificate_types.push(ClientCertificateType::ECDSA_SIGN);
        let mut supported_signature_algorithms = ArrayVec::default();
        supported_signature_algorithms.push(SignatureAndHashAlgorithm::new(
            HashAlgorithm::SHA256,
            SignatureAlgorithm::ECDSA,
        ));
        let request = CertificateRequest {
            certificate_types,
            supported_signature_algorithms,
            certificate_authorities: vec![],
        };
        let mut body = Vec::new();
        request.serialize(&mut body);
        self.message(MessageType::CertificateRequest, body)
    }

    fn new_session_ticket(&mut self, ticket: &[u8]) -> Handshake {
        let mut body = Vec::new();
        NewSessionTicket::new(7200, ticket).serialize(&mut body);
        self.message(MessageType::NewSessionTicket, body)
    }

    fn change_cipher_spec_and_finished(&mut self) -> Vec<Vec<u8>> {
        let mut verify_data = self.finished_mac(Sender::Server);
        if self.opts.bad_finished {
            verify_data[0] ^= 0xFF;
        }
        let mut body = Vec::new();
        Finished::new(&verify_data).serialize(&mut body);
        let finished = self.message(MessageType::Finished, body);
        self.absorb(&finished);

        let mut out = self.records(vec![(ContentType::ChangeCipherSpec, vec![1])]);
        self.epoch = 1;
        self.record_seq = 0;
        out.extend(self.records(vec![(ContentType::Handshake, wire(&finished, self.variant))]));
        out
    }

    fn finished_mac(&self, sender: Sender) -> Vec<u8> {
        self.provider
            .compute_finished_mac(
                self.opts.suite,
                sender,
                self.master.as_ref().expect("master secret"),
                &self.transcript,
            )
            .expect("finished mac")
    }

    fn message(&mut self, msg_type: MessageType, body: Vec<u8>) -> Handshake {
        let h = Handshake::new(msg_type, self.send_seq, body);
        self.send_seq += 1;
        h
    }

    fn absorb(&mut self, h: &Handshake) {
        h.serialize(&mut self.transcript, self.variant);
    }

    /// Messages go in the transcript and one record each.
    fn flight(&mut self, messages: Vec<Handshake>) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        for h in &messages {
            self.absorb(h);
            records.push((ContentType::Handshake, wire(h, self.variant)));
        }
        self.records(records)
    }

    /// DTLS: one datagram per record. TLS: one write.
    fn records(&mut self, records: Vec<(ContentType, Vec<u8>)>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut stream = Vec::new();
        for (content_type, fragment) in records {
            let record = Record {
                content_type,
                version: self.opts.version,
                sequence: Sequence {
                    epoch: self.epoch,
                    sequence_number: self.record_seq,
                },
                fragment: &fragment,
            };
            self.record_seq += 1;

            match self.variant {
                Variant::Dtls => {
                    let mut datagram = Vec::new();
                    record.serialize(&mut datagram, Variant::Dtls);
                    out.push(datagram);
                }
                Variant::Tls => record.serialize(&mut stream, Variant::Tls),
            }
        }
        if !stream.is_empty() {
            out.push(stream);
        }
        out
    }

    /// A HelloVerifyRequest outside the scripted flow, as a stateless
    /// server would send for a resent ClientHello.
    pub fn hello_verify(&mut self, message_seq: u16, cookie: &[u8]) -> Vec<Vec<u8>> {
        let mut body = Vec::new();
        HelloVerifyRequest::new(self.opts.hello_verify_version, cookie).serialize(&mut body);
        let hvr = Handshake::new(MessageType::HelloVerifyRequest, message_seq, body);
        self.records(vec![(ContentType::Handshake, wire(&hvr, self.variant))])
    }

    /// A fatal alert record in epoch 0.
    pub fn alert(&mut self, description: AlertDescription) -> Vec<Vec<u8>> {
        let mut fragment = Vec::new();
        Alert::fatal(description).serialize(&mut fragment);
        self.records(vec![(ContentType::Alert, fragment)])
    }
}

fn wire(h: &Handshake, variant: Variant) -> Vec<u8> {
    let mut out = Vec::new();
    h.serialize(&mut out, variant);
    out
}

/// Exchange flights until the client is done and the server has nothing to say.
pub fn run_handshake(
    client: &mut Client<TestTransport>,
    server: &mut MockServer,
    now: Instant,
) -> Result<(), Error> {
    for _ in 0..20 {
        let step = client.drive(now)?;

        let written = client.transport_mut().take_outbound();
        let reply = server.handle(written);
        client.transport_mut().inbound.extend(reply);

        if step == Step::Done {
            return Ok(());
        }
    }
    panic!("handshake did not finish in state {}", client.state());
}

/// Drive the client and hand back what it wrote.
pub fn drive_out(client: &mut Client<TestTransport>, now: Instant) -> (Step, Vec<Vec<u8>>) {
    let step = client.drive(now).expect("drive");
    (step, client.transport_mut().take_outbound())
}

/// Content types of all records in DTLS datagrams or TLS writes.
pub fn record_types(variant: Variant, data: &[Vec<u8>]) -> Vec<ContentType> {
    let mut out = Vec::new();
    let joined: Vec<Vec<u8>> = match variant {
        Variant::Dtls => data.to_vec(),
        Variant::Tls => vec![data.concat()],
    };
    for chunk in &joined {
        let mut input = &chunk[..];
        while let Ok((rest, record)) = Record::parse(input, variant) {
            out.push(record.content_type);
            input = rest;
        }
    }
    out
}

/// Handshake messages (header and fragment) in DTLS datagrams, in order.
pub fn handshake_messages(data: &[Vec<u8>]) -> Vec<(MessageType, Vec<u8>)> {
    let mut out = Vec::new();
    for datagram in data {
        let mut input = &datagram[..];
        while let Ok((rest, record)) = Record::parse(input, Variant::Dtls) {
            if record.content_type == ContentType::Handshake {
                let mut hs = record.fragment;
                while let Ok((body, header)) = Header::parse(hs, Variant::Dtls) {
                    let end = (header.fragment_length as usize).min(body.len());
                    let header_len = hs.len() - body.len();
                    out.push((header.msg_type, hs[..header_len + end].to_vec()));
                    hs = &body[end..];
                }
            }
            input = rest;
        }
    }
    out
}

/// Handshake message types in DTLS datagrams, in order.
pub fn handshake_types(data: &[Vec<u8>]) -> Vec<MessageType> {
    handshake_messages(data).into_iter().map(|m| m.0).collect()
}

/// Alert descriptions in client output.
pub fn alerts(variant: Variant, data: &[Vec<u8>]) -> Vec<AlertDescription> {
    let mut out = Vec::new();
    let joined: Vec<Vec<u8>> = match variant {
        Variant::Dtls => data.to_vec(),
        Variant::Tls => vec![data.concat()],
    };
    for chunk in &joined {
        let mut input = &chunk[..];
        while let Ok((rest, record)) = Record::parse(input, variant) {
            if record.content_type == ContentType::Alert {
                out.push(AlertDescription::from_u8(record.fragment[1]));
            }
            input = rest;
        }
    }
    out
}

pub fn store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(16))
}
