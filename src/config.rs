use std::sync::Arc;
use std::time::Duration;

use crate::certificate::{CertVerifier, ClientCredential};
use crate::crypto::{rust_crypto, CryptoProvider};
use crate::message::{CipherSuite, Cookie, NamedGroup, ProtocolVersion, Variant};
use crate::observer::Observer;
use crate::session::{Session, SessionStore};
use crate::Error;

/// Smallest MTU we can build a ClientHello into.
const MIN_MTU: usize = 256;

/// Client handshake configuration.
#[derive(Clone)]
pub struct Config {
    variant: Variant,
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
    mtu: usize,
    max_queue_rx: usize,
    flight_start_rto: Duration,
    flight_retries: usize,
    max_flight_rto: Duration,
    rng_seed: Option<u64>,
    max_cookie_len: usize,
    max_handshake_len: usize,
    with_extended_master_secret: bool,
    with_session_tickets: bool,
    with_ocsp_stapling: bool,
    session_timeout: Duration,
    session_store: Option<Arc<SessionStore>>,
    crypto_provider: Arc<dyn CryptoProvider>,
    cert_verifier: Arc<dyn CertVerifier>,
    client_credential: Option<Arc<dyn ClientCredential>>,
    observer: Option<Arc<dyn Observer>>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            variant: Variant::Dtls,
            min_version: None,
            max_version: None,
            cipher_suites: CipherSuite::all().to_vec(),
            groups: vec![NamedGroup::X25519, NamedGroup::Secp256r1, NamedGroup::Secp384r1],
            mtu: 1150,
            max_queue_rx: 30,
            flight_start_rto: Duration::from_secs(1),
            flight_retries: 4,
            max_flight_rto: Duration::from_secs(60),
            rng_seed: None,
            max_cookie_len: 32,
            max_handshake_len: 65536,
            with_extended_master_secret: true,
            with_session_tickets: true,
            with_ocsp_stapling: false,
            session_timeout: Session::DEFAULT_TIMEOUT,
            session_store: None,
            crypto_provider: None,
            cert_verifier: None,
            client_credential: None,
            observer: None,
        }
    }

    /// TLS over a stream, or DTLS over datagrams.
    #[inline(always)]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Lowest protocol version accepted in ServerHello.
    #[inline(always)]
    pub fn min_version(&self) -> ProtocolVersion {
        self.min_version
    }

    /// Highest protocol version, which is also the one we offer.
    #[inline(always)]
    pub fn max_version(&self) -> ProtocolVersion {
        self.max_version
    }

    /// Cipher suites offered, in preference order.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// ECDHE groups offered, in preference order.
    #[inline(always)]
    pub fn groups(&self) -> &[NamedGroup] {
        &self.groups
    }

    /// Max transmission unit.
    ///
    /// The largest size UDP packets we will produce.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Max amount of incoming handshake messages to buffer ahead of the
    /// one we expect.
    #[inline(always)]
    pub fn max_queue_rx(&self) -> usize {
        self.max_queue_rx
    }

    /// Time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Max number of retries per flight.
    #[inline(always)]
    pub fn flight_retries(&self) -> usize {
        self.flight_retries
    }

    /// Upper bound for the doubling retransmission timeout.
    #[inline(always)]
    pub fn max_flight_rto(&self) -> Duration {
        self.max_flight_rto
    }

    /// Seed for deterministic randoms. `None` uses the thread RNG.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Longest HelloVerifyRequest cookie we accept.
    #[inline(always)]
    pub fn max_cookie_len(&self) -> usize {
        self.max_cookie_len
    }

    /// Longest handshake message we reassemble.
    #[inline(always)]
    pub fn max_handshake_len(&self) -> usize {
        self.max_handshake_len
    }

    /// Whether to enable Extended Master Secret extension (rfc7627).
    #[inline(always)]
    pub fn with_extended_master_secret(&self) -> bool {
        self.with_extended_master_secret
    }

    /// Whether to offer the session ticket extension (rfc5077).
    #[inline(always)]
    pub fn with_session_tickets(&self) -> bool {
        self.with_session_tickets
    }

    /// Whether to ask for a stapled OCSP response (rfc6066).
    #[inline(always)]
    pub fn with_ocsp_stapling(&self) -> bool {
        self.with_ocsp_stapling
    }

    /// Lifetime given to new sessions.
    #[inline(always)]
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    #[inline(always)]
    pub fn session_store(&self) -> Option<&Arc<SessionStore>> {
        self.session_store.as_ref()
    }

    #[inline(always)]
    pub fn crypto_provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.crypto_provider
    }

    #[inline(always)]
    pub fn cert_verifier(&self) -> &Arc<dyn CertVerifier> {
        &self.cert_verifier
    }

    #[inline(always)]
    pub fn client_credential(&self) -> Option<&Arc<dyn ClientCredential>> {
        self.client_credential.as_ref()
    }

    #[inline(always)]
    pub fn observer(&self) -> Option<&Arc<dyn Observer>> {
        self.observer.as_ref()
    }
}

/// Builder for the client configuration.
pub struct ConfigBuilder {
    variant: Variant,
    min_version: Option<ProtocolVersion>,
    max_version: Option<ProtocolVersion>,
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
    mtu: usize,
    max_queue_rx: usize,
    flight_start_rto: Duration,
    flight_retries: usize,
    max_flight_rto: Duration,
    rng_seed: Option<u64>,
    max_cookie_len: usize,
    max_handshake_len: usize,
    with_extended_master_secret: bool,
    with_session_tickets: bool,
    with_ocsp_stapling: bool,
    session_timeout: Duration,
    session_store: Option<Arc<SessionStore>>,
    crypto_provider: Option<Arc<dyn CryptoProvider>>,
    cert_verifier: Option<Arc<dyn CertVerifier>>,
    client_credential: Option<Arc<dyn ClientCredential>>,
    observer: Option<Arc<dyn Observer>>,
}

impl ConfigBuilder {
    /// Set TLS or DTLS.
    ///
    /// Defaults to DTLS.
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the lowest accepted protocol version.
    ///
    /// Defaults to version 1.2 of the variant.
    pub fn min_version(mut self, version: ProtocolVersion) -> Self {
        self.min_version = Some(version);
        self
    }

    /// Set the highest (offered) protocol version.
    ///
    /// Defaults to version 1.2 of the variant.
    pub fn max_version(mut self, version: ProtocolVersion) -> Self {
        self.max_version = Some(version);
        self
    }

    /// Set the cipher suites to offer.
    ///
    /// Defaults to all supported suites.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Set the ECDHE groups to offer.
    ///
    /// Defaults to X25519, P-256, P-384.
    pub fn groups(mut self, groups: &[NamedGroup]) -> Self {
        self.groups = groups.to_vec();
        self
    }

    /// Set the max transmission unit (MTU).
    ///
    /// The largest size UDP packets we will produce.
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the max amount of incoming messages to buffer ahead of the
    /// expected one.
    ///
    /// Defaults to 30.
    pub fn max_queue_rx(mut self, max_queue_rx: usize) -> Self {
        self.max_queue_rx = max_queue_rx;
        self
    }

    /// Set the time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    /// Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the max number of retries per flight.
    ///
    /// Defaults to 4.
    pub fn flight_retries(mut self, retries: usize) -> Self {
        self.flight_retries = retries;
        self
    }

    /// Set the cap for the retransmission timeout.
    ///
    /// Defaults to 60 seconds.
    pub fn max_flight_rto(mut self, rto: Duration) -> Self {
        self.max_flight_rto = rto;
        self
    }

    /// Seed the RNG for deterministic client randoms and jitter.
    ///
    /// Defaults to unseeded.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Set the longest HelloVerifyRequest cookie accepted.
    ///
    /// Defaults to 32. At most 255.
    pub fn max_cookie_len(mut self, len: usize) -> Self {
        self.max_cookie_len = len;
        self
    }

    /// Set the longest handshake message we reassemble.
    ///
    /// Defaults to 65536.
    pub fn max_handshake_len(mut self, len: usize) -> Self {
        self.max_handshake_len = len;
        self
    }

    /// Set whether to enable Extended Master Secret extension (rfc7627)
    ///
    /// Defaults to true.
    pub fn with_extended_master_secret(mut self, enabled: bool) -> Self {
        self.with_extended_master_secret = enabled;
        self
    }

    /// Set whether to offer session tickets (rfc5077).
    ///
    /// Defaults to true.
    pub fn with_session_tickets(mut self, enabled: bool) -> Self {
        self.with_session_tickets = enabled;
        self
    }

    /// Set whether to request OCSP stapling.
    ///
    /// Defaults to false.
    pub fn with_ocsp_stapling(mut self, enabled: bool) -> Self {
        self.with_ocsp_stapling = enabled;
        self
    }

    /// Set the lifetime of sessions created by this client.
    ///
    /// Defaults to 2 hours.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Cache completed sessions in `store` and resume from it.
    pub fn session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Set a custom crypto provider.
    ///
    /// Defaults to [`rust_crypto::default_provider`].
    pub fn with_crypto_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Set the server certificate verifier. Required.
    pub fn cert_verifier(mut self, verifier: Arc<dyn CertVerifier>) -> Self {
        self.cert_verifier = Some(verifier);
        self
    }

    /// Set the credential used when the server requests a client certificate.
    pub fn client_credential(mut self, credential: Arc<dyn ClientCredential>) -> Self {
        self.client_credential = Some(credential);
        self
    }

    /// Set an observer for handshake progress.
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::ConfigError` if a setting is out of range or no
    /// certificate verifier is set.
    pub fn build(self) -> Result<Config, Error> {
        let (default_min, default_max) = match self.variant {
            Variant::Tls => (ProtocolVersion::TLS1_2, ProtocolVersion::TLS1_2),
            Variant::Dtls => (ProtocolVersion::DTLS1_2, ProtocolVersion::DTLS1_2),
        };
        let min_version = self.min_version.unwrap_or(default_min);
        let max_version = self.max_version.unwrap_or(default_max);

        if min_version.variant() != Some(self.variant)
            || max_version.variant() != Some(self.variant)
        {
            return Err(Error::ConfigError(format!(
                "versions {:?}..{:?} do not match {:?}",
                min_version, max_version, self.variant
            )));
        }
        if min_version.rank() > max_version.rank() {
            return Err(Error::ConfigError(
                "min_version is above max_version".to_string(),
            ));
        }

        if !self
            .cipher_suites
            .iter()
            .any(|s| s.is_valid_for(max_version))
        {
            return Err(Error::ConfigError(
                "no cipher suite usable with max_version".to_string(),
            ));
        }

        let crypto_provider = self
            .crypto_provider
            .unwrap_or_else(rust_crypto::default_provider);

        let groups: Vec<NamedGroup> = self
            .groups
            .into_iter()
            .filter(|g| crypto_provider.supported_groups().contains(g))
            .collect();
        if groups.is_empty() {
            return Err(Error::ConfigError(
                "no group supported by the crypto provider".to_string(),
            ));
        }

        if self.mtu < MIN_MTU {
            return Err(Error::ConfigError(format!("mtu below {}", MIN_MTU)));
        }
        if self.max_cookie_len > Cookie::MAX_LEN {
            return Err(Error::ConfigError(format!(
                "max_cookie_len above {}",
                Cookie::MAX_LEN
            )));
        }
        if self.flight_start_rto.is_zero() || self.max_flight_rto < self.flight_start_rto {
            return Err(Error::ConfigError(
                "flight rto must be positive and at most max_flight_rto".to_string(),
            ));
        }

        let cert_verifier = self
            .cert_verifier
            .ok_or_else(|| Error::ConfigError("no certificate verifier".to_string()))?;

        Ok(Config {
            variant: self.variant,
            min_version,
            max_version,
            cipher_suites: self.cipher_suites,
            groups,
            mtu: self.mtu,
            max_queue_rx: self.max_queue_rx,
            flight_start_rto: self.flight_start_rto,
            flight_retries: self.flight_retries,
            max_flight_rto: self.max_flight_rto,
            rng_seed: self.rng_seed,
            max_cookie_len: self.max_cookie_len,
            max_handshake_len: self.max_handshake_len,
            with_extended_master_secret: self.with_extended_master_secret,
            with_session_tickets: self.with_session_tickets,
            with_ocsp_stapling: self.with_ocsp_stapling,
            session_timeout: self.session_timeout,
            session_store: self.session_store,
            crypto_provider,
            cert_verifier,
            client_credential: self.client_credential,
            observer: self.observer,
        })
    }
}
