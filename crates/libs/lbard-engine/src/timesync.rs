//! UDP time sync: corrects
//! our clock bookkeeping only in slave mode, only on a lower-stratum
//! timestamp, throttled to one correction per 20 seconds.

use lbard_proto::time::LbardTime;

pub const TIME_SYNC_PORT: u16 = 0x5401;
/// Receivers add this to compensate for broadcast transit delay.
pub const TRANSIT_COMPENSATION_MS: u64 = 5;
const MIN_CORRECTION_INTERVAL_MS: u64 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRole {
    Master,
    Slave,
    Disabled,
}

pub struct TimeSync {
    role: TimeRole,
    our_stratum: u8,
    last_correction_ms: u64,
    /// Accumulated delta applied to our bookkeeping clock so far.
    pub correction_offset_ms: i64,
}

impl TimeSync {
    pub fn new(role: TimeRole, our_stratum: u8) -> Self {
        Self { role, our_stratum, last_correction_ms: 0, correction_offset_ms: 0 }
    }

    /// Considers a broadcast timestamp for adoption. Returns the delta (ms)
    /// that should be applied to local bookkeeping timers, if any.
    pub fn consider(&mut self, now_ms: u64, incoming: &LbardTime, our_now: &LbardTime) -> Option<i64> {
        if self.role != TimeRole::Slave {
            return None;
        }
        if incoming.stratum >= self.our_stratum {
            return None;
        }
        if now_ms.saturating_sub(self.last_correction_ms) < MIN_CORRECTION_INTERVAL_MS
            && self.last_correction_ms != 0
        {
            return None;
        }

        let incoming_ms = incoming.seconds as i64 * 1000
            + (incoming.micros / 1000) as i64
            + TRANSIT_COMPENSATION_MS as i64;
        let our_ms = our_now.seconds as i64 * 1000 + (our_now.micros / 1000) as i64;
        let delta = incoming_ms - our_ms;

        self.our_stratum = incoming.stratum + 1;
        self.last_correction_ms = now_ms;
        self.correction_offset_ms += delta;
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(stratum: u8, seconds: u64) -> LbardTime {
        LbardTime { stratum, seconds, micros: 0 }
    }

    #[test]
    fn master_role_never_adopts_a_correction() {
        let mut sync = TimeSync::new(TimeRole::Master, 2);
        assert_eq!(sync.consider(0, &t(1, 100), &t(2, 90)), None);
    }

    #[test]
    fn slave_adopts_lower_stratum_timestamp() {
        let mut sync = TimeSync::new(TimeRole::Slave, 5);
        let delta = sync.consider(0, &t(1, 100), &t(5, 90));
        assert!(delta.is_some());
        assert!(delta.unwrap() > 0);
    }

    #[test]
    fn equal_or_higher_stratum_is_ignored() {
        let mut sync = TimeSync::new(TimeRole::Slave, 1);
        assert_eq!(sync.consider(0, &t(1, 100), &t(1, 90)), None);
        assert_eq!(sync.consider(0, &t(2, 100), &t(1, 90)), None);
    }

    #[test]
    fn corrections_are_throttled_to_twenty_seconds() {
        let mut sync = TimeSync::new(TimeRole::Slave, 5);
        assert!(sync.consider(0, &t(1, 100), &t(5, 90)).is_some());
        assert_eq!(sync.consider(5_000, &t(1, 200), &t(1, 190)), None);
        assert!(sync.consider(25_000, &t(0, 300), &t(2, 290)).is_some());
    }
}
