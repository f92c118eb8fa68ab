//! Sequence numbers live in `[0, resolution)` and wrap around.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::result::{ZError, ZResult};

#[inline]
pub(crate) fn sn_increment(sn: u64, resolution: u64) -> u64 {
    (sn + 1) % resolution
}

#[inline]
pub(crate) fn sn_decrement(sn: u64, resolution: u64) -> u64 {
    (sn + resolution - 1) % resolution
}

/// True when `right` comes after `left` within half the resolution.
#[inline]
pub(crate) fn sn_precedes(left: u64, right: u64, resolution: u64) -> bool {
    let distance = (right + resolution - left) % resolution;
    distance != 0 && distance <= resolution / 2
}

pub(crate) fn random_sn(resolution: u64) -> u64 {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    SmallRng::seed_from_u64(seed).random_range(0..resolution)
}

/// Hands out the sequence numbers of one outgoing channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SnGenerator {
    next: u64,
    resolution: u64,
}

impl SnGenerator {
    pub fn new(initial: u64, resolution: u64) -> Self {
        SnGenerator {
            next: initial % resolution,
            resolution,
        }
    }

    pub fn get(&mut self) -> u64 {
        let sn = self.next;
        self.next = sn_increment(sn, self.resolution);
        sn
    }
}

/// What to do with an incoming frame, given its channel's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SnCheck {
    Accept,
    Duplicate,
}

/// Last sequence number received on one incoming channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RxChannel {
    last: u64,
    resolution: u64,
}

impl RxChannel {
    /// Ready to receive `initial` next.
    pub fn new(initial: u64, resolution: u64) -> Self {
        RxChannel {
            last: sn_decrement(initial % resolution, resolution),
            resolution,
        }
    }

    /// A reliable channel only takes the very next number; anything else means
    /// something was lost, and nothing will be resent.
    pub fn check_reliable(&mut self, sn: u64) -> ZResult<SnCheck> {
        let expected = sn_increment(self.last, self.resolution);
        if sn != expected {
            zerror!("Reliable sequence gap: expected {}, got {}", expected, sn);
            return Err(ZError::UnexpectedMessage);
        }
        self.last = sn;
        Ok(SnCheck::Accept)
    }

    /// A best-effort channel takes anything newer and drops the rest.
    pub fn check_best_effort(&mut self, sn: u64) -> SnCheck {
        if sn < self.resolution && sn_precedes(self.last, sn, self.resolution) {
            self.last = sn;
            SnCheck::Accept
        } else {
            zdebug!("Dropping stale best-effort frame {} (last {})", sn, self.last);
            SnCheck::Duplicate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_around() {
        assert_eq!(sn_increment(7, 8), 0);
        assert_eq!(sn_decrement(0, 8), 7);
        assert!(sn_precedes(7, 0, 8));
        assert!(sn_precedes(6, 2, 8));
        assert!(!sn_precedes(6, 3, 8));
        assert!(!sn_precedes(3, 3, 8));
    }

    #[test]
    fn generator_wraps() {
        let mut g = SnGenerator::new(6, 8);
        let sns: Vec<u64> = (0..4).map(|_| g.get()).collect();
        assert_eq!(sns, [6, 7, 0, 1]);
    }

    #[test]
    fn reliable_gap_is_unexpected() {
        let mut ch = RxChannel::new(0, 1 << 28);
        for sn in [0, 1, 2] {
            assert_eq!(ch.check_reliable(sn), Ok(SnCheck::Accept));
        }
        assert_eq!(ch.check_reliable(4), Err(ZError::UnexpectedMessage));
    }

    #[test]
    fn reliable_accepts_wrap() {
        let mut ch = RxChannel::new(7, 8);
        assert_eq!(ch.check_reliable(7), Ok(SnCheck::Accept));
        assert_eq!(ch.check_reliable(0), Ok(SnCheck::Accept));
    }

    #[test]
    fn best_effort_drops_duplicates_and_stale() {
        let mut ch = RxChannel::new(10, 1 << 16);
        assert_eq!(ch.check_best_effort(10), SnCheck::Accept);
        assert_eq!(ch.check_best_effort(10), SnCheck::Duplicate);
        assert_eq!(ch.check_best_effort(13), SnCheck::Accept);
        assert_eq!(ch.check_best_effort(12), SnCheck::Duplicate);
        assert_eq!(ch.check_best_effort(14), SnCheck::Accept);
    }

    #[test]
    fn random_sn_is_in_range() {
        for _ in 0..32 {
            assert!(random_sn(8) < 8);
        }
    }
}
