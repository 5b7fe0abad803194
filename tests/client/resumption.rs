//! Session caching and abbreviated handshakes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dconnect::message::{AlertDescription, ExtensionType, MessageType, SessionId};
use dconnect::{Client, Config, ConfigBuilder, Direction, Error, Event, StateName, Variant};

use crate::common::*;

fn shared(builder: ConfigBuilder) -> Arc<Config> {
    Arc::new(builder.build().expect("build config"))
}

fn first_session(config: &Arc<Config>, server: &mut MockServer, now: Instant) -> SessionId {
    let mut client = Client::new(config.clone(), TestTransport::default());
    run_handshake(&mut client, server, now).expect("full handshake");
    server.reset_connection();
    *client.session().expect("session").session_id()
}

#[test]
fn full_handshake_caches_session() {
    let now = Instant::now();
    let store = store();
    let config = shared(config(Variant::Dtls).session_store(store.clone()));
    let mut server = MockServer::new(Variant::Dtls);

    let id = first_session(&config, &mut server, now);

    assert_eq!(store.len(), 1);
    let cached = store.lookup(&id, now).expect("cached");
    assert!(cached.is_resumable());
}

#[test]
fn cached_session_is_resumed() {
    init_log();
    let now = Instant::now();
    let store = store();
    let recorder = Arc::new(Recorder::default());
    let config = shared(
        config(Variant::Dtls)
            .session_store(store.clone())
            .observer(recorder.clone()),
    );
    let mut server = MockServer::new(Variant::Dtls);

    let id = first_session(&config, &mut server, now);
    let master = store
        .lookup(&id, now)
        .expect("cached")
        .master_secret()
        .as_bytes()
        .to_vec();
    let seen = recorder.events().len();

    let mut client = Client::new(config.clone(), TestTransport::default());
    client.offer_session(id).expect("offer");
    run_handshake(&mut client, &mut server, now).expect("abbreviated handshake");

    assert!(client.is_resumed());
    assert!(server.is_resumed());
    assert_eq!(server.client_finished_ok, Some(true));
    assert_eq!(server.hellos[0].session_id, id.to_vec());
    assert_eq!(
        server.received,
        vec![MessageType::ClientHello, MessageType::Finished]
    );

    let session = client.session().expect("session");
    assert_eq!(session.master_secret().as_bytes(), &master[..]);

    let stats = store.stats();
    assert_eq!((stats.connects, stats.completed, stats.resumed), (2, 2, 1));

    // Peer's keys are in use before ours.
    let directions: Vec<_> = client.transport().switches.iter().map(|s| s.0).collect();
    assert_eq!(directions, vec![Direction::Read, Direction::Write]);

    let events = &recorder.events()[seen..];
    assert!(events.contains(&Event::HandshakeDone { resumed: true }));
    assert!(!events.iter().any(|e| matches!(
        e,
        Event::StateChange { to, .. } if to.is_full_handshake_only()
    )));
}

#[test]
fn declined_resumption_falls_back_to_full_handshake() {
    let now = Instant::now();
    let store = store();
    let config = shared(config(Variant::Tls).session_store(store.clone()));
    let mut server = MockServer::new(Variant::Tls);

    let id = first_session(&config, &mut server, now);
    server.opts.resume = false;

    let mut client = Client::new(config.clone(), TestTransport::default());
    client.offer_session(id).expect("offer");
    run_handshake(&mut client, &mut server, now).expect("full handshake");

    assert!(!client.is_resumed());
    assert!(!server.is_resumed());
    assert_eq!(server.hellos[0].session_id, id.to_vec());
    assert!(server.received.contains(&MessageType::ClientKeyExchange));
    assert_eq!(server.client_finished_ok, Some(true));

    // The new session is cached next to the old one.
    let fresh = *client.session().expect("session").session_id();
    assert_ne!(fresh, id);
    assert!(store.lookup(&fresh, now).is_some());
    assert_eq!(store.len(), 2);

    let stats = store.stats();
    assert_eq!((stats.connects, stats.completed, stats.resumed), (2, 2, 0));
}

#[test]
fn ticket_session_gets_an_id_and_resumes() {
    let now = Instant::now();
    let store = store();
    let config = shared(config(Variant::Dtls).session_store(store.clone()));

    let mut opts = ServerOptions::new(Variant::Dtls);
    opts.issue_session_id = false;
    opts.ticket = Some(b"ticket-1".to_vec());
    let mut server = MockServer::with_options(Variant::Dtls, opts);

    let id = first_session(&config, &mut server, now);
    assert_eq!(id.len(), 32);

    let cached = store.lookup(&id, now).expect("cached");
    let ticket = cached.ticket().expect("ticket");
    assert_eq!(ticket.data, b"ticket-1");
    assert_eq!(ticket.lifetime_hint, 7200);

    let mut client = Client::new(config.clone(), TestTransport::default());
    client.offer_session(id).expect("offer");
    run_handshake(&mut client, &mut server, now).expect("ticket resumption");

    assert_eq!(
        server.hellos[0].extension(ExtensionType::SessionTicket),
        Some(&b"ticket-1"[..])
    );
    assert!(client.is_resumed());
    assert_eq!(server.client_finished_ok, Some(true));
    assert!(client.session().expect("session").ticket().is_some());
}

#[test]
fn ems_mismatch_on_resumption_fails_and_forgets_session() {
    let now = Instant::now();
    let store = store();
    let config = shared(config(Variant::Dtls).session_store(store.clone()));
    let mut server = MockServer::new(Variant::Dtls);

    let id = first_session(&config, &mut server, now);
    server.opts.ems = false;

    let mut client = Client::new(config.clone(), TestTransport::default());
    client.offer_session(id).expect("offer");
    let err = run_handshake(&mut client, &mut server, now).unwrap_err();

    assert!(matches!(err, Error::HandshakeFailure(_)), "{:?}", err);
    assert_eq!(
        alerts(Variant::Dtls, &client.transport().outbound),
        vec![AlertDescription::HandshakeFailure]
    );
    assert!(store.lookup(&id, now).is_none());
}

#[test]
fn offer_after_start_is_rejected() {
    let now = Instant::now();
    let mut client = new_client(config(Variant::Dtls));
    drive_out(&mut client, now);

    let id = SessionId::try_new(&[1; 32]).expect("id");
    assert!(matches!(
        client.offer_session(id),
        Err(Error::InvalidState(_))
    ));
    assert_eq!(client.state(), StateName::WaitHelloVerify);
}

#[test]
fn unknown_session_is_not_offered() {
    let now = Instant::now();
    let mut client = new_client(config(Variant::Dtls).session_store(store()));
    let mut server = MockServer::new(Variant::Dtls);

    client
        .offer_session(SessionId::try_new(&[9; 32]).expect("id"))
        .expect("offer");
    let (_, hello) = drive_out(&mut client, now);
    server.handle(hello);

    assert!(server.hellos[0].session_id.is_empty());
}

#[test]
fn expired_session_is_not_offered() {
    let now = Instant::now();
    let store = store();
    let config = shared(
        config(Variant::Dtls)
            .session_store(store.clone())
            .session_timeout(Duration::from_secs(10)),
    );
    let mut server = MockServer::new(Variant::Dtls);

    let id = first_session(&config, &mut server, now);

    let later = now + Duration::from_secs(20);
    let mut client = Client::new(config.clone(), TestTransport::default());
    client.offer_session(id).expect("offer");
    let (_, hello) = drive_out(&mut client, later);
    server.handle(hello);

    assert!(server.hellos[0].session_id.is_empty());
}

#[test]
fn session_from_other_settings_is_not_offered() {
    let now = Instant::now();
    let store = store();
    let config = shared(config(Variant::Dtls).session_store(store.clone()));
    let mut server = MockServer::new(Variant::Dtls);

    let id = first_session(&config, &mut server, now);

    let no_ems = shared(
        crate::common::config(Variant::Dtls)
            .session_store(store.clone())
            .with_extended_master_secret(false),
    );
    let mut client = Client::new(no_ems, TestTransport::default());
    client.offer_session(id).expect("offer");
    let (_, hello) = drive_out(&mut client, now);
    server.handle(hello);

    assert!(server.hellos[0].session_id.is_empty());
}
