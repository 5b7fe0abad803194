use std::time::{Duration, Instant};

use crate::SeededRng;

// In seconds.
const JITTER_RANGE: f32 = 0.5;

/// Doubling retransmission timeout with jitter and a bounded number of retries.
pub struct ExponentialBackoff {
    start_rto: Duration,
    max_rto: Duration,
    retries: usize,
    rto: Duration,
    jitter: f32,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(
        start_rto: Duration,
        max_rto: Duration,
        retries: usize,
        rng: &mut SeededRng,
    ) -> Self {
        Self {
            start_rto,
            max_rto,
            retries,
            rto: start_rto,
            jitter: Self::jitter(rng),
            left: retries,
        }
    }

    pub fn reset(&mut self, rng: &mut SeededRng) {
        self.rto = self.start_rto;
        self.jitter = Self::jitter(rng);
        self.left = self.retries;
    }

    pub fn rto(&self) -> Duration {
        if self.jitter < 0.0 {
            let duration = Duration::from_secs_f32(self.jitter.abs());
            self.rto.saturating_sub(duration)
        } else {
            self.rto + Duration::from_secs_f32(self.jitter)
        }
        .max(Duration::from_millis(50))
    }

    // A value between -0.25s and 0.25s
    fn jitter(rng: &mut SeededRng) -> f32 {
        rng.random::<f32>() * JITTER_RANGE - (JITTER_RANGE / 2.0)
    }

    pub fn attempt(&mut self, rng: &mut SeededRng) {
        let (n, overflow) = self.left.overflowing_sub(1);

        if overflow {
            return;
        }

        self.left = n;
        self.jitter = Self::jitter(rng);
        self.rto = (self.rto * 2).min(self.max_rto);
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Nothing in flight awaits a response.
    Disabled,
    /// A flight is being built, arm once it is flushed.
    Unarmed,
    Armed(Instant),
}

/// What happened when the retransmission timer was polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Idle,
    Resend,
    Exhausted,
}

/// Retransmission timer for the current flight.
pub struct RetransmitTimer {
    backoff: ExponentialBackoff,
    timeout: Timeout,
}

impl RetransmitTimer {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        RetransmitTimer {
            backoff,
            timeout: Timeout::Disabled,
        }
    }

    /// A new flight starts, with a fresh retry budget.
    pub fn begin(&mut self, rng: &mut SeededRng) {
        self.backoff.reset(rng);
        self.timeout = Timeout::Unarmed;
    }

    /// The flight has been written; start counting.
    pub fn arm(&mut self, now: Instant) {
        if self.timeout == Timeout::Unarmed {
            debug!("Flight timeout in: {:.03}s", self.backoff.rto().as_secs_f32());
            self.timeout = Timeout::Armed(now + self.backoff.rto());
        }
    }

    pub fn stop(&mut self) {
        if self.timeout != Timeout::Disabled {
            debug!("Stop flight timeout");
        }
        self.timeout = Timeout::Disabled;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.timeout {
            Timeout::Armed(at) => Some(at),
            _ => None,
        }
    }

    pub fn poll(&mut self, now: Instant, rng: &mut SeededRng) -> TimerEvent {
        let Timeout::Armed(at) = self.timeout else {
            return TimerEvent::Idle;
        };

        if now < at {
            return TimerEvent::Idle;
        }

        if !self.backoff.can_retry() {
            return TimerEvent::Exhausted;
        }

        self.backoff.attempt(rng);
        debug!(
            "Re-arm flight timeout due to resend in {:.03}s",
            self.backoff.rto().as_secs_f32()
        );
        self.timeout = Timeout::Armed(now + self.backoff.rto());

        TimerEvent::Resend
    }
}
