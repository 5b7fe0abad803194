//! Full handshakes over DTLS and TLS.

use std::sync::Arc;
use std::time::Instant;

use dconnect::message::{CipherSuite, ExtensionType, MessageType, NamedGroup, ProtocolVersion};
use dconnect::{Direction, Event, Outcome, StateName, Step, Variant};

use crate::common::*;

#[test]
fn dtls_full_handshake() {
    init_log();
    let now = Instant::now();

    let recorder = Arc::new(Recorder::default());
    let mut client = new_client(config(Variant::Dtls).observer(recorder.clone()));
    let mut server = MockServer::new(Variant::Dtls);

    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert!(client.is_done());
    assert_eq!(client.state(), StateName::Done);
    assert!(!client.is_resumed());
    assert_eq!(client.negotiated_version(), Some(ProtocolVersion::DTLS1_2));
    assert_eq!(
        client.negotiated_cipher_suite(),
        Some(CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256)
    );
    assert_eq!(
        client.peer_identity().and_then(|p| p.name()),
        Some("server.test")
    );

    assert_eq!(server.client_finished_ok, Some(true));
    assert_eq!(
        server.received,
        vec![
            MessageType::ClientHello,
            MessageType::ClientKeyExchange,
            MessageType::Finished
        ]
    );
    assert_eq!(server.client_ccs, 1);

    let session = client.session().expect("session");
    assert_eq!(&session.session_id()[..], &[0xA0; 32][..]);
    assert!(session.extended_master_secret());
    assert_eq!(session.peer_certificates(), &[SERVER_CERT.to_vec()]);

    let switches: Vec<_> = client
        .transport()
        .switches
        .iter()
        .map(|(d, e, _)| (*d, *e))
        .collect();
    assert_eq!(switches, vec![(Direction::Write, 1), (Direction::Read, 1)]);

    let events = recorder.events();
    assert_eq!(events.first(), Some(&Event::HandshakeStart));
    assert!(events.contains(&Event::HandshakeDone { resumed: false }));
    assert_eq!(
        events.last(),
        Some(&Event::Exit {
            state: StateName::Done,
            outcome: Outcome::Done
        })
    );
    assert!(events.contains(&Event::StateChange {
        from: StateName::Start,
        to: StateName::SendClientHello
    }));
}

#[test]
fn tls_full_handshake() {
    init_log();
    let now = Instant::now();

    let mut client = new_client(config(Variant::Tls));
    let mut server = MockServer::new(Variant::Tls);

    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert!(client.is_done());
    assert_eq!(client.negotiated_version(), Some(ProtocolVersion::TLS1_2));
    assert_eq!(server.client_finished_ok, Some(true));

    let directions: Vec<_> = client.transport().switches.iter().map(|s| s.0).collect();
    assert_eq!(directions, vec![Direction::Write, Direction::Read]);
}

#[test]
fn client_hello_offers_configured_extensions() {
    let now = Instant::now();

    let mut client = new_client(config(Variant::Dtls).groups(&[NamedGroup::Secp256r1]));
    let mut server = MockServer::new(Variant::Dtls);

    let (step, out) = drive_out(&mut client, now);
    assert_eq!(step, Step::WouldBlock(dconnect::Interest::Read));
    server.handle(out);

    let hello = &server.hellos[0];
    assert_eq!(hello.message_seq, 0);
    assert!(hello.session_id.is_empty());
    assert!(hello.cookie.is_empty());
    assert_eq!(hello.extension(ExtensionType::RenegotiationInfo), Some(&[0][..]));
    assert_eq!(hello.extension(ExtensionType::ExtendedMasterSecret), Some(&[][..]));
    assert_eq!(hello.extension(ExtensionType::SessionTicket), Some(&[][..]));
    assert_eq!(hello.extension(ExtensionType::StatusRequest), None);
    // u16 length, then secp256r1
    assert_eq!(
        hello.extension(ExtensionType::SupportedGroups),
        Some(&[0, 2, 0, 23][..])
    );
    assert!(hello
        .suites
        .contains(&CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256));
}

#[test]
fn secp256r1_key_exchange() {
    let now = Instant::now();

    let mut opts = ServerOptions::new(Variant::Dtls);
    opts.group = NamedGroup::Secp256r1;

    let mut client = new_client(config(Variant::Dtls));
    let mut server = MockServer::with_options(Variant::Dtls, opts);

    run_handshake(&mut client, &mut server, now).expect("handshake");
    assert_eq!(server.client_finished_ok, Some(true));
}

#[test]
fn client_certificate_is_sent_and_proven() {
    init_log();
    let now = Instant::now();

    let mut opts = ServerOptions::new(Variant::Dtls);
    opts.cert_request = true;

    let mut client =
        new_client(config(Variant::Dtls).client_credential(Arc::new(TestCredential::new())));
    let mut server = MockServer::with_options(Variant::Dtls, opts);

    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert_eq!(
        server.received,
        vec![
            MessageType::ClientHello,
            MessageType::Certificate,
            MessageType::ClientKeyExchange,
            MessageType::CertificateVerify,
            MessageType::Finished
        ]
    );
    assert_eq!(server.client_certificates, vec![CLIENT_CERT.to_vec()]);
    assert_eq!(server.client_finished_ok, Some(true));
}

#[test]
fn empty_certificate_without_credential() {
    let now = Instant::now();

    let mut opts = ServerOptions::new(Variant::Tls);
    opts.cert_request = true;

    let mut client = new_client(config(Variant::Tls));
    let mut server = MockServer::with_options(Variant::Tls, opts);

    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert!(server.received.contains(&MessageType::Certificate));
    assert!(!server.received.contains(&MessageType::CertificateVerify));
    assert!(server.client_certificates.is_empty());
    assert_eq!(server.client_finished_ok, Some(true));
}

#[test]
fn stapled_ocsp_response_lands_in_session() {
    let now = Instant::now();

    let mut opts = ServerOptions::new(Variant::Dtls);
    opts.staple = Some(b"ocsp response".to_vec());

    let mut client = new_client(config(Variant::Dtls).with_ocsp_stapling(true));
    let mut server = MockServer::with_options(Variant::Dtls, opts);

    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert_eq!(
        server.hellos[0].extension(ExtensionType::StatusRequest),
        Some(&[1, 0, 0, 0, 0][..])
    );
    let session = client.session().expect("session");
    assert_eq!(session.ocsp_response(), Some(&b"ocsp response"[..]));
}

#[test]
fn server_may_skip_stapling() {
    let now = Instant::now();

    let mut client = new_client(config(Variant::Dtls).with_ocsp_stapling(true));
    let mut server = MockServer::new(Variant::Dtls);

    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert_eq!(client.session().expect("session").ocsp_response(), None);
}

#[test]
fn standard_master_secret_when_server_declines_ems() {
    let now = Instant::now();

    let mut opts = ServerOptions::new(Variant::Tls);
    opts.ems = false;

    let mut client = new_client(config(Variant::Tls));
    let mut server = MockServer::with_options(Variant::Tls, opts);

    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert_eq!(server.client_finished_ok, Some(true));
    assert!(!client.session().expect("session").extended_master_secret());
}

#[test]
fn stepping_a_finished_client_is_done() {
    let now = Instant::now();

    let mut client = new_client(config(Variant::Dtls));
    let mut server = MockServer::new(Variant::Dtls);
    run_handshake(&mut client, &mut server, now).expect("handshake");

    assert_eq!(client.step(now).expect("step"), Step::Done);
    assert_eq!(client.next_timeout(), None);
    assert!(client.transport().outbound.is_empty());
}
