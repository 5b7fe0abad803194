//! DTLS flight retransmission and duplicate handling.

use std::time::{Duration, Instant};

use dconnect::message::{ContentType, MessageType};
use dconnect::{Error, ErrorCategory, Interest, Step, Variant};

use crate::common::*;

#[test]
fn lost_client_hello_is_resent() {
    init_log();
    let now = Instant::now();

    let mut client = new_client(config(Variant::Dtls));
    let mut server = MockServer::new(Variant::Dtls);

    let (_, lost) = drive_out(&mut client, now);
    assert_eq!(handshake_types(&lost), vec![MessageType::ClientHello]);

    let deadline = client.next_timeout().expect("flight timer");
    assert!(deadline > now);

    // Nothing happens before the deadline.
    client.handle_timeout(now).expect("early timeout");
    assert!(client.transport().outbound.is_empty());

    client.handle_timeout(deadline).expect("timeout");
    let resent = client.transport_mut().take_outbound();
    assert_eq!(handshake_types(&resent), vec![MessageType::ClientHello]);
    // Same handshake bytes, new record sequence number.
    assert_eq!(handshake_messages(&resent), handshake_messages(&lost));
    assert_ne!(resent, lost);

    let later = client.next_timeout().expect("rearmed");
    assert!(later > deadline);

    let reply = server.handle(resent);
    client.transport_mut().inbound.extend(reply);
    run_handshake(&mut client, &mut server, deadline).expect("handshake");

    assert_eq!(server.client_finished_ok, Some(true));
    assert_eq!(client.next_timeout(), None);
}

#[test]
fn step_resends_when_due() {
    let now = Instant::now();

    let mut client = new_client(config(Variant::Dtls));
    drive_out(&mut client, now);

    let deadline = client.next_timeout().expect("flight timer");
    let (step, resent) = drive_out(&mut client, deadline);

    assert_eq!(step, Step::WouldBlock(Interest::Read));
    assert_eq!(handshake_types(&resent), vec![MessageType::ClientHello]);
}

#[test]
fn exhausted_retries_time_out() {
    let now = Instant::now();

    let mut client = new_client(
        config(Variant::Dtls)
            .flight_retries(2)
            .flight_start_rto(Duration::from_millis(100)),
    );
    drive_out(&mut client, now);

    let err = loop {
        let Some(deadline) = client.next_timeout() else {
            panic!("timer stopped before giving up");
        };
        if let Err(e) = client.handle_timeout(deadline) {
            break e;
        }
        assert!(
            client.transport().outbound.len() <= 2,
            "resent more often than configured"
        );
    };

    assert!(matches!(err, Error::Timeout(_)), "{:?}", err);
    assert_eq!(err.category(), ErrorCategory::Timeout);

    let resent = client.transport_mut().take_outbound();
    assert_eq!(
        handshake_types(&resent),
        vec![MessageType::ClientHello, MessageType::ClientHello]
    );

    assert_eq!(client.next_timeout(), None);
    assert!(matches!(
        client.handle_timeout(now),
        Err(Error::Poisoned)
    ));
}

#[test]
fn repeated_server_flight_triggers_resend() {
    //! A server that resends its ServerHelloDone flight did not get ours,
    //! so the client answers with the whole flight again.
    init_log();
    let now = Instant::now();

    let mut client = new_client(config(Variant::Dtls));
    let mut server = MockServer::new(Variant::Dtls);

    let (_, hello) = drive_out(&mut client, now);
    let flight4 = server.handle(hello);

    client.transport_mut().inbound.extend(flight4.clone());
    let (step, flight5) = drive_out(&mut client, now);
    assert_eq!(step, Step::WouldBlock(Interest::Read));
    assert_eq!(
        handshake_types(&flight5),
        vec![MessageType::ClientKeyExchange, MessageType::Finished]
    );

    // Flight 5 is lost, the server repeats flight 4.
    client.transport_mut().inbound.extend(flight4);
    let (_, resent) = drive_out(&mut client, now);
    assert_eq!(
        handshake_types(&resent),
        vec![MessageType::ClientKeyExchange, MessageType::Finished]
    );
    assert!(record_types(Variant::Dtls, &resent).contains(&ContentType::ChangeCipherSpec));

    let reply = server.handle(resent);
    client.transport_mut().inbound.extend(reply);
    assert_eq!(client.drive(now).expect("drive"), Step::Done);
    assert_eq!(server.client_finished_ok, Some(true));
}

#[test]
fn server_resends_lost_flight_on_duplicate_hello() {
    let now = Instant::now();

    let mut client = new_client(config(Variant::Dtls));
    let mut server = MockServer::new(Variant::Dtls);

    let (_, hello) = drive_out(&mut client, now);
    // Server reply is lost.
    let _ = server.handle(hello);

    let deadline = client.next_timeout().expect("flight timer");
    client.handle_timeout(deadline).expect("timeout");
    let resent = client.transport_mut().take_outbound();

    let reply = server.handle(resent);
    assert_eq!(server.dupes, 1);
    client.transport_mut().inbound.extend(reply);

    run_handshake(&mut client, &mut server, deadline).expect("handshake");
    assert_eq!(server.client_finished_ok, Some(true));
}
