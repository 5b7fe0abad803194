use std::fmt;

/// The states of the client handshake, as seen from outside.
///
/// States marked DTLS are never entered by a TLS client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateName {
    Start,
    SendClientHello,
    /// DTLS
    WaitHelloVerify,
    WaitServerHello,
    WaitCertificate,
    WaitCertStatus,
    WaitKeyExchange,
    WaitCertRequest,
    WaitServerDone,
    SendCertificate,
    SendKeyExchange,
    SendCertVerify,
    SendChangeCipherSpec,
    SendFinished,
    Flush,
    WaitSessionTicket,
    WaitFinished,
    Done,
    Failed,
}

impl StateName {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StateName::Done | StateName::Failed)
    }

    /// Whether a full handshake visits this state and a resumed one does not.
    pub fn is_full_handshake_only(&self) -> bool {
        matches!(
            self,
            StateName::WaitCertificate
                | StateName::WaitCertStatus
                | StateName::WaitKeyExchange
                | StateName::WaitCertRequest
                | StateName::WaitServerDone
                | StateName::SendCertificate
                | StateName::SendKeyExchange
                | StateName::SendCertVerify
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            StateName::Start => "START",
            StateName::SendClientHello => "SEND_CLIENT_HELLO",
            StateName::WaitHelloVerify => "WAIT_HELLO_VERIFY",
            StateName::WaitServerHello => "WAIT_SERVER_HELLO",
            StateName::WaitCertificate => "WAIT_CERTIFICATE",
            StateName::WaitCertStatus => "WAIT_CERT_STATUS",
            StateName::WaitKeyExchange => "WAIT_KEY_EXCHANGE",
            StateName::WaitCertRequest => "WAIT_CERT_REQUEST",
            StateName::WaitServerDone => "WAIT_SERVER_DONE",
            StateName::SendCertificate => "SEND_CERTIFICATE",
            StateName::SendKeyExchange => "SEND_KEY_EXCHANGE",
            StateName::SendCertVerify => "SEND_CERT_VERIFY",
            StateName::SendChangeCipherSpec => "SEND_CHANGE_CIPHER_SPEC",
            StateName::SendFinished => "SEND_FINISHED",
            StateName::Flush => "FLUSH",
            StateName::WaitSessionTicket => "WAIT_SESSION_TICKET",
            StateName::WaitFinished => "WAIT_FINISHED",
            StateName::Done => "DONE",
            StateName::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
