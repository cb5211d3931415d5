//! Connection lifecycle for the push channel.
//!
//! `ReconnectionManager` owns no sockets and no timers. Every input returns the
//! directives the supervisor must execute, in order.

use std::time::Duration;

use rand::Rng;

use roadmap_core::model::UserId;

/// WebSocket close code for an intentional shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    /// Closed abnormally, a reconnect timer is pending.
    Reconnecting,
}

impl ChannelState {
    fn is_live(self) -> bool {
        matches!(self, ChannelState::Connecting | ChannelState::Open)
    }
}

/// Backoff between reconnect attempts: `min(base * multiplier^n, max)`,
/// spread by `±jitter`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: u32,
    /// Fraction in `[0, 1)`; 0 disables jitter.
    pub jitter: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Longest a connect plus authenticate may take before it counts as failed.
    pub connect_timeout: Duration,
}

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(3_000),
            max: Duration::from_secs(60),
            multiplier: 2,
            jitter: 0.2,
            max_attempts: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ReconnectPolicy {
    /// Same delay for every attempt, no jitter.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            max: delay,
            multiplier: 1,
            jitter: 0.0,
            max_attempts: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay before retry `retry` (zero-based), without jitter.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).checked_pow(retry).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    #[must_use]
    pub fn jittered(&self, retry: u32) -> Duration {
        let delay = self.delay_for(retry);
        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return delay;
        }
        let spread = self.jitter.min(0.9);
        let factor = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
        delay.mul_f64(factor).min(self.max)
    }
}

/// Side effect requested by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Connect(UserId),
    Close(u16),
    ScheduleReconnect(Duration),
    CancelReconnect,
}

#[derive(Debug, Clone)]
pub struct ReconnectionManager {
    policy: ReconnectPolicy,
    state: ChannelState,
    identity: Option<UserId>,
    /// Set by a manual disconnect; cleared by `connect` or a login.
    suppressed: bool,
    timer_pending: bool,
    retries: u32,
}

impl ReconnectionManager {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ChannelState::Disconnected,
            identity: None,
            suppressed: false,
            timer_pending: false,
            retries: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    #[must_use]
    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    #[must_use]
    pub fn timer_pending(&self) -> bool {
        self.timer_pending
    }

    /// A user became known. Switching users runs a full close/connect cycle.
    pub fn login(&mut self, user: UserId) -> Vec<Directive> {
        if self.identity == Some(user) && self.state.is_live() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.cancel_timer(&mut out);
        if self.state.is_live() {
            out.push(Directive::Close(NORMAL_CLOSURE));
        }
        self.identity = Some(user);
        self.suppressed = false;
        self.retries = 0;
        self.state = ChannelState::Connecting;
        out.push(Directive::Connect(user));
        out
    }

    pub fn logout(&mut self) -> Vec<Directive> {
        self.identity = None;
        self.retries = 0;
        self.shut(Vec::new())
    }

    /// Manual connect; re-enables auto-reconnect.
    pub fn connect(&mut self) -> Vec<Directive> {
        self.suppressed = false;
        let Some(user) = self.identity else {
            return Vec::new();
        };
        if self.state.is_live() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.cancel_timer(&mut out);
        self.state = ChannelState::Connecting;
        out.push(Directive::Connect(user));
        out
    }

    /// Manual disconnect; suppresses auto-reconnect until `connect` or `login`.
    pub fn disconnect(&mut self) -> Vec<Directive> {
        self.suppressed = true;
        self.shut(Vec::new())
    }

    pub fn teardown(&mut self) -> Vec<Directive> {
        self.suppressed = true;
        self.shut(Vec::new())
    }

    pub fn on_open(&mut self) -> Vec<Directive> {
        let mut out = Vec::new();
        self.cancel_timer(&mut out);
        self.retries = 0;
        self.state = ChannelState::Open;
        out
    }

    pub fn on_close(&mut self, code: u16) -> Vec<Directive> {
        if !self.state.is_live() {
            return Vec::new();
        }
        self.state = ChannelState::Disconnected;
        if code == NORMAL_CLOSURE {
            return Vec::new();
        }
        self.schedule()
    }

    pub fn on_connect_failed(&mut self) -> Vec<Directive> {
        self.on_close(ABNORMAL_CLOSURE)
    }

    pub fn on_timer_fired(&mut self) -> Vec<Directive> {
        self.timer_pending = false;
        match self.identity {
            Some(user) if !self.suppressed && !self.state.is_live() => {
                self.state = ChannelState::Connecting;
                vec![Directive::Connect(user)]
            }
            _ => {
                if self.state == ChannelState::Reconnecting {
                    self.state = ChannelState::Disconnected;
                }
                Vec::new()
            }
        }
    }

    fn schedule(&mut self) -> Vec<Directive> {
        if self.identity.is_none() || self.suppressed || self.timer_pending {
            return Vec::new();
        }
        if let Some(max) = self.policy.max_attempts.filter(|max| self.retries >= *max) {
            tracing::warn!(attempts = max, "push channel reconnect attempts exhausted");
            return Vec::new();
        }
        let delay = self.policy.jittered(self.retries);
        self.retries += 1;
        self.timer_pending = true;
        self.state = ChannelState::Reconnecting;
        vec![Directive::ScheduleReconnect(delay)]
    }

    fn cancel_timer(&mut self, out: &mut Vec<Directive>) {
        if self.timer_pending {
            self.timer_pending = false;
            out.push(Directive::CancelReconnect);
        }
    }

    fn shut(&mut self, mut out: Vec<Directive>) -> Vec<Directive> {
        self.cancel_timer(&mut out);
        if self.state.is_live() {
            out.push(Directive::Close(NORMAL_CLOSURE));
        }
        self.state = ChannelState::Disconnected;
        out
    }
}

impl Default for ReconnectionManager {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
