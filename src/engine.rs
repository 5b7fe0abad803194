use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use crate::crypto::KeyBlock;
use crate::message::{Alert, AlertDescription, AlertLevel, ContentType, Handshake, Header};
use crate::message::{MessageType, ProtocolVersion, Record, Sequence, Variant};
use crate::timer::{ExponentialBackoff, RetransmitTimer, TimerEvent};
use crate::transcript::Transcript;
use crate::transport::{Direction, Transport};
use crate::{Config, Error, SeededRng};

/// Explicit nonce and tag the transport adds to protected GCM records.
const DTLS_AEAD_OVERHEAD: usize = 8 + 16;

/// Largest plaintext in a TLS record.
const MAX_TLS_FRAGMENT: usize = 16_384;

/// How many bytes of TLS records we gather before starting a new write chunk.
const TLS_WRITE_CHUNK: usize = 32 * 1024;

/// Largest possible UDP payload.
const DTLS_READ_BUF: usize = 65_536;

const TLS_READ_BUF: usize = 16_384;

/// Input ready for the state machine, in arrival order.
#[derive(Debug)]
enum Incoming {
    Handshake(Handshake),
    ChangeCipherSpec,
}

/// A DTLS handshake message being reassembled from fragments.
#[derive(Debug)]
struct Partial {
    msg_type: MessageType,
    body: Vec<u8>,
    filled: Vec<bool>,
    received: usize,
}

impl Partial {
    fn new(header: &Header) -> Self {
        let len = header.length as usize;
        Partial {
            msg_type: header.msg_type,
            body: vec![0; len],
            filled: vec![false; len],
            received: 0,
        }
    }

    /// Copy in a fragment. False if it contradicts what we have.
    fn insert(&mut self, header: &Header, data: &[u8]) -> bool {
        if header.msg_type != self.msg_type || header.length as usize != self.body.len() {
            return false;
        }

        let start = header.fragment_offset as usize;
        for (i, byte) in data.iter().enumerate() {
            let at = start + i;
            if !self.filled[at] {
                self.filled[at] = true;
                self.body[at] = *byte;
                self.received += 1;
            }
        }

        true
    }

    fn is_complete(&self) -> bool {
        self.received == self.body.len()
    }
}

/// A record of the current flight, kept for resends.
#[derive(Debug)]
struct Entry {
    content_type: ContentType,
    epoch: u16,
    fragment: Vec<u8>,
}

/// Outgoing bytes. One datagram for DTLS.
#[derive(Debug, Default)]
struct Datagram {
    data: Vec<u8>,
    /// Estimated size on the wire once the transport protected it.
    wire_len: usize,
    /// Tell the transport to protect writes of this epoch before sending.
    cipher_change: Option<u16>,
}

/// Record layer plumbing under the handshake state machine.
///
/// Owns framing, the output queue, input reassembly, message sequence
/// numbers, the transcript and flight bookkeeping.
pub(crate) struct Engine {
    config: Arc<Config>,

    variant: Variant,

    /// Seedable random number generator for deterministic testing
    pub(crate) rng: SeededRng,

    /// Version put in outgoing record headers.
    record_version: ProtocolVersion,

    /// Epoch of the records we write.
    write_epoch: u16,

    /// Counters for sending records during epoch 0.
    ///
    /// This is kept separate since resends might force us to
    /// "go back" to these sequence number even if we technically
    /// progressed to epoch 1.
    sequence_epoch_0: Sequence,

    /// Counters for epoch 1 and beyond.
    sequence_epoch_n: Sequence,

    /// Queue of outgoing data.
    queue_tx: VecDeque<Datagram>,

    /// Bytes of the front of `queue_tx` already written (TLS).
    tx_offset: usize,

    read_buf: Vec<u8>,

    /// TLS bytes not yet forming a complete record.
    rx_stream: Vec<u8>,

    /// TLS handshake bytes not yet forming a complete message.
    hs_stream: Vec<u8>,

    /// DTLS messages by message_seq, awaiting more fragments or their turn.
    reassembly: BTreeMap<u16, Partial>,

    /// Complete input in order.
    ready: VecDeque<Incoming>,

    /// DTLS ChangeCipherSpec seen and not yet consumed.
    ccs_pending: bool,

    /// Expected peer handshake sequence number
    peer_handshake_seq_no: u16,

    /// Next handshake message sequence number for sending
    next_handshake_seq_no: u16,

    /// Handshakes collected for the Finished MAC.
    transcript: Transcript,

    /// The records that have been sent in the current flight.
    flight_saved_records: Vec<Entry>,

    timer: RetransmitTimer,

    /// Keys for our writes after ChangeCipherSpec.
    write_keys: Option<KeyBlock>,

    /// Body of the last HelloVerifyRequest, to tell a new cookie from a resend.
    last_hello_verify: Option<Vec<u8>>,

    /// The server moved past the cookie exchange. Late HelloVerifyRequests
    /// are dropped from here on.
    cookies_closed: bool,
}

impl Engine {
    pub fn new(config: Arc<Config>) -> Self {
        let mut rng = SeededRng::new(config.rng_seed());

        let backoff = ExponentialBackoff::new(
            config.flight_start_rto(),
            config.max_flight_rto(),
            config.flight_retries(),
            &mut rng,
        );

        let variant = config.variant();
        let read_len = match variant {
            Variant::Tls => TLS_READ_BUF,
            Variant::Dtls => DTLS_READ_BUF,
        };

        Engine {
            variant,
            rng,
            record_version: config.max_version(),
            write_epoch: 0,
            sequence_epoch_0: Sequence::new(0),
            sequence_epoch_n: Sequence::new(1),
            queue_tx: VecDeque::new(),
            tx_offset: 0,
            read_buf: vec![0; read_len],
            rx_stream: Vec::new(),
            hs_stream: Vec::new(),
            reassembly: BTreeMap::new(),
            ready: VecDeque::new(),
            ccs_pending: false,
            peer_handshake_seq_no: 0,
            next_handshake_seq_no: 0,
            transcript: Transcript::new(variant),
            flight_saved_records: Vec::new(),
            timer: RetransmitTimer::new(backoff),
            write_keys: None,
            last_hello_verify: None,
            cookies_closed: false,
            config,
        }
    }

    #[cfg(test)]
    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    pub fn set_record_version(&mut self, version: ProtocolVersion) {
        self.record_version = version;
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// The next complete handshake message, reading from the transport as
    /// needed. `None` when the transport would block.
    pub fn next_handshake<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Option<Handshake>, Error> {
        loop {
            match self.ready.pop_front() {
                Some(Incoming::Handshake(handshake)) => {
                    trace!(
                        "Received {:?} seq {} ({} bytes)",
                        handshake.msg_type,
                        handshake.message_seq,
                        handshake.body.len()
                    );
                    return Ok(Some(handshake));
                }
                Some(Incoming::ChangeCipherSpec) => {
                    return Err(Error::UnexpectedMessage("ChangeCipherSpec".to_string()));
                }
                None => {}
            }

            if !self.read_more(transport)? {
                return Ok(None);
            }
        }
    }

    /// Consume the peer's ChangeCipherSpec. False when the transport would
    /// block before one arrived.
    ///
    /// In DTLS handshake messages that arrive first stay queued.
    pub fn take_change_cipher_spec<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<bool, Error> {
        loop {
            match self.variant {
                Variant::Dtls => {
                    if mem::take(&mut self.ccs_pending) {
                        return Ok(true);
                    }
                }
                Variant::Tls => match self.ready.front() {
                    Some(Incoming::ChangeCipherSpec) => {
                        self.ready.pop_front();
                        return Ok(true);
                    }
                    Some(Incoming::Handshake(h)) => {
                        return Err(Error::UnexpectedMessage(format!(
                            "{:?} before ChangeCipherSpec",
                            h.msg_type
                        )));
                    }
                    None => {}
                },
            }

            if !self.read_more(transport)? {
                return Ok(false);
            }
        }
    }

    /// Read one chunk (DTLS: one datagram). False if it would block.
    fn read_more<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<bool, Error> {
        loop {
            match transport.try_read(&mut self.read_buf) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => {
                    // For lifetime issues, we take the buffer out of self
                    let buf = mem::take(&mut self.read_buf);
                    let result = self.process_input(&buf[..n]);
                    self.read_buf = buf;
                    result?;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn process_input(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.variant {
            Variant::Dtls => self.process_datagram(data),
            Variant::Tls => {
                self.rx_stream.extend_from_slice(data);
                self.process_stream()
            }
        }
    }

    fn process_datagram(&mut self, mut input: &[u8]) -> Result<(), Error> {
        while !input.is_empty() {
            let (rest, record) = match Record::parse(input, Variant::Dtls) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Discard {} bytes of malformed datagram: {:?}", input.len(), e);
                    return Ok(());
                }
            };
            input = rest;

            trace!("Received record: {:?}", record);

            match record.content_type {
                ContentType::Handshake => self.process_dtls_handshake(record.fragment)?,
                ContentType::ChangeCipherSpec => {
                    if record.fragment == [1] {
                        self.ccs_pending = true;
                    } else {
                        debug!("Discard malformed ChangeCipherSpec");
                    }
                }
                ContentType::Alert => self.process_alert(record.fragment)?,
                other => debug!("Discard {:?} record during handshake", other),
            }
        }

        Ok(())
    }

    fn process_dtls_handshake(&mut self, mut input: &[u8]) -> Result<(), Error> {
        while !input.is_empty() {
            let Ok((rest, header)) = Header::parse(input, Variant::Dtls) else {
                debug!("Discard truncated handshake header");
                return Ok(());
            };

            let len = header.fragment_length as usize;
            if rest.len() < len {
                debug!("Discard truncated handshake fragment");
                return Ok(());
            }
            let (data, rest) = rest.split_at(len);
            input = rest;

            self.insert_fragment(header, data)?;
        }

        Ok(())
    }

    fn insert_fragment(&mut self, header: Header, data: &[u8]) -> Result<(), Error> {
        // Before any allocation
        if header.length as usize > self.config.max_handshake_len() {
            return Err(Error::IllegalParameter(format!(
                "{:?} of {} bytes exceeds max_handshake_len",
                header.msg_type, header.length
            )));
        }

        let end = header.fragment_offset as u64 + header.fragment_length as u64;
        if end > header.length as u64 {
            debug!("Discard fragment beyond message end: {:?}", header);
            return Ok(());
        }

        if header.message_seq < self.peer_handshake_seq_no {
            if header.msg_type == MessageType::HelloVerifyRequest && self.cookies_closed {
                trace!("Drop late HelloVerifyRequest seq {}", header.message_seq);
                return Ok(());
            }

            // A stateless server may answer every ClientHello with a new
            // cookie under the same message_seq.
            if header.msg_type == MessageType::HelloVerifyRequest
                && !header.is_fragment()
                && self.last_hello_verify.as_deref() != Some(data)
            {
                debug!("New HelloVerifyRequest with seq {}", header.message_seq);
                self.last_hello_verify = Some(data.to_vec());
                self.ready.push_back(Incoming::Handshake(Handshake::new(
                    header.msg_type,
                    header.message_seq,
                    data.to_vec(),
                )));
                return Ok(());
            }

            // Some MessageType when resent, means we must trigger
            // an immediate resend of the entire flight.
            if header.msg_type.dupe_triggers_resend() && header.fragment_offset == 0 {
                self.flight_resend("dupe triggers resend");
            }
            trace!(
                "Drop retransmitted {:?} seq {}",
                header.msg_type,
                header.message_seq
            );
            return Ok(());
        }

        if !self.reassembly.contains_key(&header.message_seq)
            && self.reassembly.len() + self.ready.len() >= self.config.max_queue_rx()
        {
            warn!(
                "Receive queue full (max {}), seq {}",
                self.config.max_queue_rx(),
                header.message_seq
            );
            return Err(Error::ReceiveQueueFull);
        }

        let partial = self
            .reassembly
            .entry(header.message_seq)
            .or_insert_with(|| Partial::new(&header));

        if !partial.insert(&header, data) {
            debug!("Discard fragment inconsistent with earlier ones: {:?}", header);
            return Ok(());
        }

        // Release complete messages in sequence order.
        while self
            .reassembly
            .get(&self.peer_handshake_seq_no)
            .map(|p| p.is_complete())
            .unwrap_or(false)
        {
            let seq = self.peer_handshake_seq_no;
            let Some(partial) = self.reassembly.remove(&seq) else {
                break;
            };
            if partial.msg_type == MessageType::HelloVerifyRequest {
                self.last_hello_verify = Some(partial.body.clone());
            } else {
                self.cookies_closed = true;
            }
            self.ready.push_back(Incoming::Handshake(Handshake::new(
                partial.msg_type,
                seq,
                partial.body,
            )));
            self.peer_handshake_seq_no += 1;
        }

        Ok(())
    }

    fn process_stream(&mut self) -> Result<(), Error> {
        while let Some(len) = Record::peek_len(&self.rx_stream) {
            if len > Record::TLS_HEADER_LEN + Record::MAX_FRAGMENT_LEN {
                return Err(Error::DecodeError(format!("record of {} bytes", len)));
            }
            if self.rx_stream.len() < len {
                break;
            }

            let data: Vec<u8> = self.rx_stream.drain(..len).collect();
            let (_, record) = Record::parse(&data, Variant::Tls)?;

            trace!("Received record: {:?}", record);

            match record.content_type {
                ContentType::Handshake => {
                    if record.fragment.is_empty() {
                        return Err(Error::DecodeError("empty handshake record".to_string()));
                    }
                    self.hs_stream.extend_from_slice(record.fragment);
                    self.split_tls_handshakes()?;
                }
                ContentType::ChangeCipherSpec => {
                    if record.fragment != [1] {
                        return Err(Error::DecodeError("ChangeCipherSpec".to_string()));
                    }
                    if !self.hs_stream.is_empty() {
                        return Err(Error::UnexpectedMessage(
                            "ChangeCipherSpec inside a handshake message".to_string(),
                        ));
                    }
                    self.ready.push_back(Incoming::ChangeCipherSpec);
                }
                ContentType::Alert => self.process_alert(record.fragment)?,
                other => {
                    return Err(Error::UnexpectedMessage(format!(
                        "{:?} record during handshake",
                        other
                    )));
                }
            }
        }

        Ok(())
    }

    fn split_tls_handshakes(&mut self) -> Result<(), Error> {
        while self.hs_stream.len() >= Header::TLS_LEN {
            let (_, header) = Header::parse(&self.hs_stream, Variant::Tls)?;

            let len = header.length as usize;
            if len > self.config.max_handshake_len() {
                return Err(Error::IllegalParameter(format!(
                    "{:?} of {} bytes exceeds max_handshake_len",
                    header.msg_type, len
                )));
            }

            let total = Header::TLS_LEN + len;
            if self.hs_stream.len() < total {
                break;
            }

            let body = self.hs_stream[Header::TLS_LEN..total].to_vec();
            self.hs_stream.drain(..total);

            if header.msg_type == MessageType::HelloRequest {
                debug!("Ignore HelloRequest during handshake");
                continue;
            }

            if self.ready.len() >= self.config.max_queue_rx() {
                warn!("Receive queue full (max {})", self.config.max_queue_rx());
                return Err(Error::ReceiveQueueFull);
            }

            self.ready
                .push_back(Incoming::Handshake(Handshake::new(header.msg_type, 0, body)));
        }

        Ok(())
    }

    fn process_alert(&mut self, fragment: &[u8]) -> Result<(), Error> {
        let alert = match Alert::parse(fragment) {
            Ok((rest, alert)) if rest.is_empty() => alert,
            _ => {
                if self.variant == Variant::Dtls {
                    debug!("Discard malformed alert");
                    return Ok(());
                }
                return Err(Error::DecodeError("alert".to_string()));
            }
        };

        match (alert.level, alert.description) {
            (_, AlertDescription::CloseNotify) => {
                debug!("Peer sent close_notify");
                Err(Error::ConnectionClosed)
            }
            (AlertLevel::Fatal, description) => {
                warn!("Peer sent fatal alert: {:?}", description);
                Err(Error::AlertReceived(description))
            }
            (level, description) => {
                warn!("Ignore {:?} alert: {:?}", level, description);
                Ok(())
            }
        }
    }

    /// Queue a handshake message, adding it to the transcript.
    pub fn send_handshake(&mut self, msg_type: MessageType, body: Vec<u8>) {
        let handshake = Handshake::new(msg_type, self.next_handshake_seq_no, body);

        // Increment the sequence number for the next handshake message
        self.next_handshake_seq_no = self.next_handshake_seq_no.wrapping_add(1);

        // The server answers a ClientHello using its message_seq.
        if msg_type == MessageType::ClientHello && self.variant == Variant::Dtls {
            let seq = handshake.message_seq;
            if seq > self.peer_handshake_seq_no {
                self.peer_handshake_seq_no = seq;
                self.reassembly.retain(|s, _| *s >= seq);
            }
        }

        self.transcript.push(&handshake);

        debug!(
            "Send {:?} seq {} ({} bytes)",
            msg_type,
            handshake.message_seq,
            handshake.body.len()
        );

        match self.variant {
            Variant::Tls => {
                let mut wire = Vec::with_capacity(Header::TLS_LEN + handshake.body.len());
                handshake.serialize(&mut wire, Variant::Tls);
                for chunk in wire.chunks(MAX_TLS_FRAGMENT) {
                    self.create_record(ContentType::Handshake, self.write_epoch, true, chunk);
                }
            }
            Variant::Dtls => self.create_dtls_handshake(&handshake),
        }
    }

    /// Fragment a handshake to fit the MTU, packing into the current
    /// datagram when there is room.
    fn create_dtls_handshake(&mut self, handshake: &Handshake) {
        let epoch = self.write_epoch;
        let total_len = handshake.body.len();
        let mtu = self.config.mtu();
        let aead_overhead = if epoch >= 1 { DTLS_AEAD_OVERHEAD } else { 0 };

        // Fixed overhead per handshake record on the wire
        let fixed_overhead = Record::DTLS_HEADER_LEN + Header::DTLS_LEN + aead_overhead;

        let mut offset = 0;
        let mut fragment = Vec::new();

        // At least one record must be created even if total_len == 0
        loop {
            let used = self.queue_tx.back().map(|d| d.wire_len).unwrap_or(0);
            let available_in_current = mtu.saturating_sub(used);

            // Prefer the current datagram. If it can't fit even the fixed
            // overhead and a byte of body, start a fresh one.
            let available_for_body = if available_in_current > fixed_overhead {
                available_in_current - fixed_overhead
            } else {
                mtu.saturating_sub(fixed_overhead)
            };

            let chunk_len = (total_len - offset).min(available_for_body);

            let header = Header {
                msg_type: handshake.msg_type,
                length: total_len as u32,
                message_seq: handshake.message_seq,
                fragment_offset: offset as u32,
                fragment_length: chunk_len as u32,
            };

            fragment.clear();
            header.serialize(&mut fragment, Variant::Dtls);
            fragment.extend_from_slice(&handshake.body[offset..offset + chunk_len]);

            self.create_record(ContentType::Handshake, epoch, true, &fragment);

            offset += chunk_len;
            if offset >= total_len {
                break;
            }
        }
    }

    /// Queue ChangeCipherSpec and move our writes to the next epoch.
    ///
    /// The transport learns about `keys` right before the first datagram
    /// (DTLS) or byte (TLS) that needs them is written.
    pub fn send_change_cipher_spec(&mut self, keys: KeyBlock) {
        debug!("Send ChangeCipherSpec in epoch {}", self.write_epoch);
        self.create_record(ContentType::ChangeCipherSpec, self.write_epoch, true, &[1]);
        self.write_epoch += 1;
        self.write_keys = Some(keys);

        match self.variant {
            // Records carry their epoch, the datagram with the CCS can switch.
            Variant::Dtls => {
                if let Some(datagram) = self.queue_tx.back_mut() {
                    datagram.cipher_change = Some(self.write_epoch);
                }
            }
            // A stream has no epoch, so everything after the CCS goes in a
            // new chunk.
            Variant::Tls => self.queue_tx.push_back(Datagram {
                cipher_change: Some(self.write_epoch),
                ..Default::default()
            }),
        }
    }

    pub fn send_alert(&mut self, description: AlertDescription) {
        debug!("Send fatal alert: {:?}", description);
        let mut fragment = Vec::with_capacity(2);
        Alert::fatal(description).serialize(&mut fragment);
        self.create_record(ContentType::Alert, self.write_epoch, false, &fragment);
    }

    /// Frame a record and put it in the output queue.
    fn create_record(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        save_fragment: bool,
        fragment: &[u8],
    ) {
        // Use this as a marker to know whether we are to record fragments for resends.
        if save_fragment {
            self.flight_saved_records.push(Entry {
                content_type,
                epoch,
                fragment: fragment.to_vec(),
            });
        }

        let (max_len, overhead) = match self.variant {
            Variant::Tls => (TLS_WRITE_CHUNK, 0),
            Variant::Dtls if epoch >= 1 => (self.config.mtu(), DTLS_AEAD_OVERHEAD),
            Variant::Dtls => (self.config.mtu(), 0),
        };

        let header_len = Record::header_len(self.variant);
        let record_wire_len = header_len + fragment.len() + overhead;

        // Decide whether to append to the existing last datagram or create a new one
        let can_append = self
            .queue_tx
            .back()
            .map(|d| d.wire_len + record_wire_len <= max_len)
            .unwrap_or(false);

        // Sequence number to use for this record
        let sequence = match self.variant {
            Variant::Tls => Sequence::default(),
            Variant::Dtls if epoch == 0 => {
                let s = self.sequence_epoch_0;
                self.sequence_epoch_0.sequence_number += 1;
                s
            }
            Variant::Dtls => {
                if self.sequence_epoch_n.epoch != epoch {
                    self.sequence_epoch_n = Sequence::new(epoch);
                }
                let s = self.sequence_epoch_n;
                self.sequence_epoch_n.sequence_number += 1;
                s
            }
        };

        let record = Record {
            content_type,
            version: self.record_version,
            sequence,
            fragment,
        };

        trace!("Queue record: {:?}", record);

        if !can_append {
            self.queue_tx.push_back(Datagram::default());
        }
        if let Some(datagram) = self.queue_tx.back_mut() {
            record.serialize(&mut datagram.data, self.variant);
            datagram.wire_len += record_wire_len;
        }
    }

    pub fn has_pending_output(&self) -> bool {
        !self.queue_tx.is_empty()
    }

    /// Write queued output and flush the transport.
    ///
    /// False when the transport would block.
    pub fn flush_output<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<bool, Error> {
        while let Some(front) = self.queue_tx.front_mut() {
            if let Some(epoch) = front.cipher_change.take() {
                if let Some(keys) = &self.write_keys {
                    debug!("Switch write cipher state to epoch {}", epoch);
                    transport.set_cipher_state(Direction::Write, epoch, keys)?;
                }
            }

            if front.data.is_empty() {
                self.queue_tx.pop_front();
                continue;
            }

            let pending = &front.data[self.tx_offset..];

            match transport.try_write(pending) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "transport accepted no bytes",
                    )));
                }
                Ok(n) => {
                    // A datagram is sent whole or not at all.
                    if self.variant == Variant::Dtls || n >= pending.len() {
                        trace!("Sent {} bytes", front.data.len());
                        self.queue_tx.pop_front();
                        self.tx_offset = 0;
                    } else {
                        self.tx_offset += n;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        loop {
            match transport.flush() {
                Ok(()) => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    pub fn flight_begin(&mut self, flight_no: u8) {
        debug!("Begin flight {}", flight_no);
        self.flight_saved_records.clear();
        if self.variant == Variant::Dtls {
            self.timer.begin(&mut self.rng);
        }
    }

    /// Start the retransmission timer of a flight that awaits a response.
    pub fn flight_arm(&mut self, now: Instant) {
        self.timer.arm(now);
    }

    /// The response to the current flight arrived.
    pub fn flight_stop(&mut self) {
        self.timer.stop();
    }

    fn flight_resend(&mut self, reason: &str) {
        if self.flight_saved_records.is_empty() {
            return;
        }
        debug!("Resending flight due to {}", reason);

        // For lifetime issues, we take the entries out of self
        let records = mem::take(&mut self.flight_saved_records);

        for entry in &records {
            self.create_record(entry.content_type, entry.epoch, false, &entry.fragment);
        }

        // Put the entries back into self
        self.flight_saved_records = records;
    }

    pub fn next_timeout(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Resend the flight if its timer expired. True if a resend was queued.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<bool, Error> {
        match self.timer.poll(now, &mut self.rng) {
            TimerEvent::Idle => Ok(false),
            TimerEvent::Resend => {
                self.flight_resend("flight timeout");
                Ok(true)
            }
            TimerEvent::Exhausted => {
                warn!("Flight retransmissions exhausted");
                Err(Error::Timeout("flight retransmissions exhausted"))
            }
        }
    }
}
