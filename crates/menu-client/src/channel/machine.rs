//! Reconnect state machine for the push channel.
//!
//! Pure: it only decides what the driver should do next. Timers, sockets and
//! message fan-out live in [`super::driver`].

use crate::config::PushSettings;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    /// Retry budget exhausted. Only an explicit restart leaves this state.
    Failed,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&PushSettings> for ReconnectPolicy {
    fn from(settings: &PushSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            handshake_timeout: Duration::from_millis(settings.handshake_timeout_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retrying after `failures` consecutive failed attempts:
    /// base, 2×base, 4×base, ... capped at `max_delay`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Start,
    HandshakeSucceeded,
    HandshakeFailed(String),
    Dropped(String),
    RetryTimerFired,
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    Connect,
    RetryAfter(Duration),
    /// Connected: keep reading. Failed: wait for a restart.
    Idle,
    Close,
}

#[derive(Debug, Clone)]
pub struct ChannelMachine {
    state: ConnectionState,
    failures: u32,
    closed: bool,
    policy: ReconnectPolicy,
}

impl ChannelMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            failures: 0,
            closed: false,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn handle(&mut self, event: ChannelEvent) -> ChannelCommand {
        if self.closed {
            return ChannelCommand::Idle;
        }

        match (self.state, event) {
            (_, ChannelEvent::Teardown) => {
                self.closed = true;
                self.state = ConnectionState::Disconnected;
                ChannelCommand::Close
            }

            (ConnectionState::Disconnected | ConnectionState::Failed, ChannelEvent::Start) => {
                self.failures = 0;
                self.connect()
            }

            (ConnectionState::Disconnected, ChannelEvent::RetryTimerFired) => self.connect(),

            (ConnectionState::Connecting { .. }, ChannelEvent::HandshakeSucceeded) => {
                self.failures = 0;
                self.state = ConnectionState::Connected;
                ChannelCommand::Idle
            }

            (
                ConnectionState::Connecting { .. },
                ChannelEvent::HandshakeFailed(_) | ChannelEvent::Dropped(_),
            ) => {
                self.failures += 1;
                if self.failures >= self.policy.max_attempts {
                    self.state = ConnectionState::Failed;
                    ChannelCommand::Idle
                } else {
                    self.state = ConnectionState::Disconnected;
                    ChannelCommand::RetryAfter(self.policy.delay_after(self.failures))
                }
            }

            (ConnectionState::Connected, ChannelEvent::Dropped(_)) => {
                self.failures = 0;
                self.state = ConnectionState::Disconnected;
                ChannelCommand::RetryAfter(self.policy.delay_after(1))
            }

            // Stale timer or duplicate notification.
            (state, event) => {
                tracing::trace!(?state, ?event, "Ignoring channel event");
                ChannelCommand::Idle
            }
        }
    }

    fn connect(&mut self) -> ChannelCommand {
        self.state = ConnectionState::Connecting {
            attempt: self.failures + 1,
        };
        ChannelCommand::Connect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ChannelMachine {
        ChannelMachine::new(ReconnectPolicy::default())
    }

    #[test]
    fn test_delays_back_off_and_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_connect_and_drop_cycle() {
        let mut m = machine();
        assert_eq!(m.handle(ChannelEvent::Start), ChannelCommand::Connect);
        assert_eq!(m.state(), ConnectionState::Connecting { attempt: 1 });
        assert_eq!(m.handle(ChannelEvent::HandshakeSucceeded), ChannelCommand::Idle);
        assert_eq!(m.state(), ConnectionState::Connected);

        assert_eq!(
            m.handle(ChannelEvent::Dropped("eof".into())),
            ChannelCommand::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.handle(ChannelEvent::RetryTimerFired), ChannelCommand::Connect);
        assert_eq!(m.handle(ChannelEvent::HandshakeSucceeded), ChannelCommand::Idle);
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_budget_exhaustion_enters_failed() {
        let mut m = machine();
        m.handle(ChannelEvent::Start);
        for attempt in 1..5 {
            assert_eq!(m.state(), ConnectionState::Connecting { attempt });
            assert!(matches!(
                m.handle(ChannelEvent::HandshakeFailed("refused".into())),
                ChannelCommand::RetryAfter(_)
            ));
            assert_eq!(m.handle(ChannelEvent::RetryTimerFired), ChannelCommand::Connect);
        }
        assert_eq!(
            m.handle(ChannelEvent::HandshakeFailed("refused".into())),
            ChannelCommand::Idle
        );
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.handle(ChannelEvent::RetryTimerFired), ChannelCommand::Idle);

        // Manual restart gets a fresh budget.
        assert_eq!(m.handle(ChannelEvent::Start), ChannelCommand::Connect);
        assert_eq!(m.state(), ConnectionState::Connecting { attempt: 1 });
    }

    #[test]
    fn test_success_resets_failures() {
        let mut m = machine();
        m.handle(ChannelEvent::Start);
        m.handle(ChannelEvent::HandshakeFailed("x".into()));
        m.handle(ChannelEvent::RetryTimerFired);
        assert_eq!(m.state(), ConnectionState::Connecting { attempt: 2 });
        m.handle(ChannelEvent::HandshakeSucceeded);
        m.handle(ChannelEvent::Dropped("x".into()));
        m.handle(ChannelEvent::RetryTimerFired);
        assert_eq!(m.state(), ConnectionState::Connecting { attempt: 1 });
    }

    #[test]
    fn test_teardown_is_terminal() {
        for setup in [0, 1, 2] {
            let mut m = machine();
            if setup >= 1 {
                m.handle(ChannelEvent::Start);
            }
            if setup >= 2 {
                m.handle(ChannelEvent::HandshakeSucceeded);
            }
            assert_eq!(m.handle(ChannelEvent::Teardown), ChannelCommand::Close);
            assert!(m.is_closed());
            assert_eq!(m.handle(ChannelEvent::Start), ChannelCommand::Idle);
            assert_eq!(m.handle(ChannelEvent::RetryTimerFired), ChannelCommand::Idle);
            assert_eq!(m.state(), ConnectionState::Disconnected);
        }
    }
}
