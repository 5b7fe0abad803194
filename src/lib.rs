//! Client side of the TLS 1.2 and DTLS 1.2 handshake.
//!
//! dconnect is Sans-IO: it moves bytes through a non-blocking [`Transport`]
//! you provide and never reads the clock. The handshake advances one unit
//! of work per [`Client::step`], or as far as it can with [`Client::drive`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Instant;
//! # fn run(verifier: Arc<dyn dconnect::CertVerifier>, socket: impl dconnect::Transport) -> Result<(), dconnect::Error> {
//! use dconnect::{Client, Config, Interest, Step};
//!
//! let config = Config::builder().cert_verifier(verifier).build()?;
//! let mut client = Client::new(Arc::new(config), socket);
//!
//! loop {
//!     match client.drive(Instant::now())? {
//!         Step::Done => break,
//!         Step::WouldBlock(Interest::Read) => { /* wait for readable or next_timeout() */ }
//!         Step::WouldBlock(Interest::Write) => { /* wait for writable */ }
//!         Step::Progressed => unreachable!(),
//!     }
//! }
//!
//! let session = client.session().expect("session after handshake");
//! # let _ = session;
//! # Ok(())
//! # }
//! ```
//!
//! Record protection is not done here. Once keys are derived the
//! [`Transport`] is handed a [`KeyBlock`] per direction, see
//! [`Transport::set_cipher_state`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod certificate;
mod client;
mod config;
mod engine;
mod error;
mod observer;
mod rng;
mod session;
mod state;
mod timer;
mod transcript;
mod transport;
mod util;

pub mod crypto;
pub mod message;

pub use certificate::{CertVerifier, ClientCredential, PeerIdentity};
pub use client::Client;
pub use config::{Config, ConfigBuilder};
pub use crypto::KeyBlock;
pub use error::{Error, ErrorCategory};
pub use message::{CipherSuite, NamedGroup, ProtocolVersion, SessionId, Variant};
pub use observer::{Event, Observer, Outcome};
pub use rng::SeededRng;
pub use session::{Session, SessionStore, StoreStats, Ticket};
pub use state::StateName;
pub use transport::{Direction, Transport};

/// What a call to [`Client::step`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Did some work, call again.
    Progressed,
    /// Can't continue until the transport is ready.
    WouldBlock(Interest),
    /// The handshake is complete.
    Done,
}

/// Transport readiness a blocked client waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}
