//! Flood-control policy for deciding whether, and how, to relay a packet.
//!
//! A pure decision function plus a cryptographically-seeded RNG for jitter.
//! Stateless apart from the RNG. Jitter is drawn from a CSPRNG seeded from
//! OS entropy on construction, never from a fixed or derivable seed, so an
//! adversary observing one node's relay timing cannot predict another's.

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::packet::{PacketType, MAX_TTL};

/// Degree at or above which the controller treats the local neighborhood as
/// "dense" and clamps broadcast TTL more aggressively.
pub const DEFAULT_HIGH_DEGREE_THRESHOLD: usize = 6;

/// Outcome of a relay decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayDecision {
    pub should_relay: bool,
    pub new_ttl: u8,
    pub delay_ms: u64,
}

impl RelayDecision {
    fn drop_it(capped_ttl: u8) -> Self {
        Self {
            should_relay: false,
            new_ttl: capped_ttl,
            delay_ms: 0,
        }
    }
}

/// The flood-control policy plus its jitter RNG.
pub struct RelayController {
    rng: ChaCha8Rng,
    high_degree_threshold: usize,
}

impl RelayController {
    pub fn new(high_degree_threshold: usize) -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
            high_degree_threshold,
        }
    }

    /// Applies the ordered relay rules: TTL-exhausted and self-sent packets
    /// are dropped first; handshakes, directed unicasts, and emergency
    /// alerts each get their own always-relay jitter band; everything else
    /// follows the broadcast path, which clamps TTL and widens jitter as
    /// local degree grows.
    pub fn decide(
        &mut self,
        ttl: u8,
        sender_is_self: bool,
        packet_type: PacketType,
        is_directed: bool,
        degree: usize,
    ) -> RelayDecision {
        let capped_ttl = ttl.min(MAX_TTL);

        if capped_ttl <= 1 || sender_is_self {
            return RelayDecision::drop_it(capped_ttl);
        }

        if packet_type == PacketType::Handshake {
            return RelayDecision {
                should_relay: true,
                new_ttl: capped_ttl - 1,
                delay_ms: self.rng.gen_range(10..35),
            };
        }

        if is_directed {
            return RelayDecision {
                should_relay: true,
                new_ttl: capped_ttl - 1,
                delay_ms: self.rng.gen_range(20..60),
            };
        }

        if packet_type == PacketType::EmergencyAlert {
            return RelayDecision {
                should_relay: true,
                new_ttl: capped_ttl - 1,
                delay_ms: self.rng.gen_range(5..25),
            };
        }

        // Broadcast path.
        let is_announce = packet_type.is_topology_class();
        let ttl_limit = if degree >= self.high_degree_threshold {
            2u8.max(capped_ttl.min(5))
        } else {
            let sparse_cap = if is_announce { 7 } else { 6 };
            2u8.max(capped_ttl.min(sparse_cap))
        };
        let new_ttl = ttl_limit.saturating_sub(1);

        let delay_ms = if degree <= 2 {
            self.rng.gen_range(10..41)
        } else if degree <= 5 {
            self.rng.gen_range(60..151)
        } else if degree <= 9 {
            self.rng.gen_range(80..181)
        } else {
            self.rng.gen_range(100..221)
        };

        RelayDecision {
            should_relay: true,
            new_ttl,
            delay_ms,
        }
    }
}

impl Default for RelayController {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_DEGREE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> RelayController {
        RelayController::new(DEFAULT_HIGH_DEGREE_THRESHOLD)
    }

    #[test]
    fn ttl_one_never_relays() {
        let mut rc = controller();
        let d = rc.decide(1, false, PacketType::Chat, false, 3);
        assert!(!d.should_relay);
        assert_eq!(d.delay_ms, 0);
    }

    #[test]
    fn sender_is_self_never_relays() {
        let mut rc = controller();
        let d = rc.decide(5, true, PacketType::Chat, false, 3);
        assert!(!d.should_relay);
    }

    #[test]
    fn handshake_always_relays_with_bounded_jitter() {
        let mut rc = controller();
        for _ in 0..200 {
            let d = rc.decide(5, false, PacketType::Handshake, false, 3);
            assert!(d.should_relay);
            assert_eq!(d.new_ttl, 4);
            assert!((10..35).contains(&d.delay_ms));
        }
    }

    #[test]
    fn emergency_alert_always_relays_with_bounded_jitter() {
        let mut rc = controller();
        for _ in 0..200 {
            let d = rc.decide(7, false, PacketType::EmergencyAlert, false, 3);
            assert!(d.should_relay);
            assert!((5..25).contains(&d.delay_ms));
        }
    }

    #[test]
    fn directed_relays_with_own_jitter_band() {
        let mut rc = controller();
        for _ in 0..200 {
            let d = rc.decide(5, false, PacketType::Chat, true, 3);
            assert!(d.should_relay);
            assert_eq!(d.new_ttl, 4);
            assert!((20..60).contains(&d.delay_ms));
        }
    }

    #[test]
    fn dense_broadcast_clamps_ttl_and_widens_jitter() {
        let mut rc = controller();
        for _ in 0..200 {
            let d = rc.decide(7, false, PacketType::Chat, false, 10);
            assert!(d.should_relay);
            assert_eq!(d.new_ttl, 4); // min(2, min(7,5)) - 1
            assert!((100..221).contains(&d.delay_ms));
        }
    }

    #[test]
    fn sparse_broadcast_announce_gets_wider_ttl_cap_than_chat() {
        let mut rc = controller();
        let announce = rc.decide(7, false, PacketType::TopologyAnnounce, false, 1);
        let chat = rc.decide(7, false, PacketType::Chat, false, 1);
        assert_eq!(announce.new_ttl, 6); // cap 7 - 1
        assert_eq!(chat.new_ttl, 5); // cap 6 - 1
    }

    #[test]
    fn ttl_is_capped_to_max_before_any_rule() {
        let mut rc = controller();
        let d = rc.decide(200, false, PacketType::EmergencyAlert, false, 1);
        assert!((5..25).contains(&d.delay_ms));
        assert_eq!(d.new_ttl, MAX_TTL - 1);
    }
}
