//! Pool and connection tuning knobs (spec §4.B, §4.C, §5).
//!
//! No CLI lives in this crate — callers in a binary build a [`PoolConfig`]
//! however they like (env vars, a file, `clap` in their own `main.rs`) and
//! hand it to [`crate::pool::RelayPool::new`].

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// How long to wait for the initial WebSocket handshake.
    pub connect_timeout: Duration,
    /// Interval between keepalive pings on an idle connection.
    pub ping_interval: Duration,
    /// Silence (no pong, no frame) after which a connection is considered dead.
    /// Spec: 2x the ping interval.
    pub pong_timeout: Duration,
    /// Base delay for exponential reconnect backoff.
    pub reconnect_base_delay: Duration,
    /// Cap on reconnect backoff.
    pub reconnect_max_delay: Duration,
    /// Bounded outbound queue depth per connection; oldest frame is dropped
    /// on overflow.
    pub send_queue_capacity: usize,
    /// Per-connection cap on reconnect attempts before the connection
    /// surfaces a permanent failure instead of retrying. `None` means
    /// unlimited, which is the right default for relays the pool itself
    /// owns for the life of the process (spec §4.B).
    pub max_reconnect_attempts: Option<u32>,
    /// Deadline for `RelayPool::publish` to collect `OK` acks.
    pub publish_deadline: Duration,
    /// Deadline for a subscription to reach EOSE-convergence.
    pub subscription_deadline: Duration,
    /// Minimum number of relays that must reach EOSE before a subscription
    /// is considered converged, even if others are still catching up.
    /// `None` asks the pool to compute `ceil(known_relays / 2)` with a
    /// floor of 2 at subscribe time (spec §4.C default).
    pub min_relays_for_eose: Option<usize>,
    /// Relay URLs to connect to by default.
    pub default_relays: Vec<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(10),
            send_queue_capacity: 256,
            max_reconnect_attempts: None,
            publish_deadline: Duration::from_secs(4),
            subscription_deadline: Duration::from_secs(8),
            min_relays_for_eose: None,
            default_relays: Vec::new(),
        }
    }
}

/// `ceil(n / 2)` floored at 2, the spec's default EOSE-convergence floor
/// (spec §4.C: "default ⌈N/2⌉ with a floor of 2").
pub fn default_min_relays_for_eose(known_relays: usize) -> usize {
    known_relays.div_ceil(2).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_min_relays_has_a_floor_of_two() {
        assert_eq!(default_min_relays_for_eose(0), 2);
        assert_eq!(default_min_relays_for_eose(1), 2);
        assert_eq!(default_min_relays_for_eose(2), 2);
        assert_eq!(default_min_relays_for_eose(3), 2);
        assert_eq!(default_min_relays_for_eose(4), 2);
        assert_eq!(default_min_relays_for_eose(5), 3);
        assert_eq!(default_min_relays_for_eose(8), 4);
    }
}
