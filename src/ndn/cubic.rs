use crate::constants::{CUBIC_BETA, CUBIC_C, INITIAL_RTT, INITIAL_SSTHRESH};
use std::time::{Duration, Instant};

/// CUBIC congestion window for outstanding interests.
///
/// `cwnd` grows by one per tick in slow start, then follows
/// `W(t) = C * (t - K)^3 + W_last_max` where `t` is the time since the last
/// congestion event. The window never drops below one.
#[derive(Debug, Clone)]
pub struct Cubic {
    cwnd: f64,
    ssthresh: f64,
    w_last_max: f64,
    k: f64,
    last_congestion: Instant,
    rtt: Duration,
}

impl Cubic {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            cwnd: 1.0,
            ssthresh: INITIAL_SSTHRESH,
            w_last_max: 0.0,
            k: 0.0,
            last_congestion: now,
            rtt: INITIAL_RTT,
        }
    }

    pub fn with_ssthresh(mut self, ssthresh: f64) -> Self {
        self.ssthresh = ssthresh;
        self
    }

    pub fn with_rtt(mut self, rtt: Duration) -> Self {
        self.rtt = rtt;
        self
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn w_last_max(&self) -> f64 {
        self.w_last_max
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// Interests that may be sent this tick.
    pub fn window(&self) -> usize {
        self.cwnd.floor().max(1.0) as usize
    }

    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Per-tick window growth.
    pub fn update_at(&mut self, now: Instant) {
        if self.in_slow_start() {
            self.cwnd += 1.0;
            return;
        }

        let t = now.saturating_duration_since(self.last_congestion).as_secs_f64();
        let w_cubic = CUBIC_C * (t - self.k).powi(3) + self.w_last_max;
        if w_cubic > self.cwnd {
            self.cwnd += (w_cubic - self.cwnd) / self.cwnd;
        }
    }

    pub fn on_congestion(&mut self) {
        self.on_congestion_at(Instant::now());
    }

    /// Multiplicative decrease after a loss signal.
    pub fn on_congestion_at(&mut self, now: Instant) {
        self.cwnd = (self.cwnd * CUBIC_BETA).max(1.0);
        self.ssthresh = self.cwnd;
        self.w_last_max = self.w_last_max.max(self.cwnd);
        self.k = ((self.w_last_max - self.ssthresh) / CUBIC_C).cbrt();
        self.last_congestion = now;
        tracing::debug!(
            "congestion: cwnd {:.2}, w_last_max {:.2}, k {:.3}",
            self.cwnd,
            self.w_last_max,
            self.k
        );
    }

    /// Folds a response time into the RTT estimate.
    pub fn on_rtt_sample(&mut self, sample: Duration) {
        self.rtt = (self.rtt + sample) / 2;
    }

    /// An interest outstanding longer than twice the RTT counts as lost.
    pub fn is_timed_out(&self, outstanding: Duration) -> bool {
        outstanding > self.rtt * 2
    }
}

impl Default for Cubic {
    fn default() -> Self {
        Self::new()
    }
}
