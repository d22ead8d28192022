//! Congestion controller: every four-second window, nudge the
//! inter-packet gap toward a target channel occupancy, falling back to a
//! power-preserving slow interval — and eventually a radio reset — when
//! nothing else is heard on the channel at all.

pub const DEFAULT_TARGET: u32 = 15;
pub const WINDOW_MS: u64 = 4000;
const SILENT_INTERVAL_MS: u64 = 1000;
const MAX_INTERVAL_MS: u64 = 4000;
const MIN_INTERVAL_FLOOR_MS: u64 = 25;
const SILENT_WINDOWS_BEFORE_RESET: u32 = 4;

pub struct CongestionController {
    pub target: u32,
    interval_ms: u64,
    silent_windows: u32,
}

impl CongestionController {
    pub fn new(target: u32) -> Self {
        Self { target, interval_ms: SILENT_INTERVAL_MS, silent_windows: 0 }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Per-peer floor used in the 0.25..0.95 band: `1000/(target/active_peers)/4`.
    fn per_peer_floor_ms(&self, active_peers: u32) -> u64 {
        let active_peers = active_peers.max(1) as f64;
        let target = self.target.max(1) as f64;
        ((1000.0 / (target / active_peers)) / 4.0).round() as u64
    }

    /// Feeds one window's observations in and adjusts `interval_ms`.
    /// Returns `true` if the radio should be reset (four consecutive
    /// silent windows, guarding against a wedged driver).
    pub fn on_window_elapsed(&mut self, packets_seen: u32, packets_byus: u32, active_peers: u32) -> bool {
        if packets_seen == 0 {
            self.interval_ms = SILENT_INTERVAL_MS;
            self.silent_windows += 1;
            if self.silent_windows >= SILENT_WINDOWS_BEFORE_RESET {
                self.silent_windows = 0;
                return true;
            }
            return false;
        }
        self.silent_windows = 0;

        let ratio = (packets_seen + packets_byus) as f64 / self.target.max(1) as f64;
        if ratio < 0.25 {
            self.interval_ms = (self.interval_ms / 2).max(MIN_INTERVAL_FLOOR_MS);
        } else if ratio < 0.95 {
            if packets_byus <= packets_seen {
                let subtract = if ratio < 0.5 {
                    50
                } else if ratio < 0.75 {
                    20
                } else {
                    10
                };
                let floor = self.per_peer_floor_ms(active_peers).max(MIN_INTERVAL_FLOOR_MS);
                self.interval_ms = self.interval_ms.saturating_sub(subtract).max(floor);
            }
        } else if ratio <= 1.0 {
            // within target band: no change
        } else {
            let scaled = self.interval_ms as f64 * (ratio + 0.4);
            self.interval_ms = (scaled.round() as u64).min(MAX_INTERVAL_MS);
        }
        false
    }

    /// Uniform jitter added to the launch time of the next packet:
    /// `interval/4`, floored at 25ms.
    pub fn launch_jitter_ms(&self, rng: &mut impl rand::Rng) -> u64 {
        let span = (self.interval_ms / 4).max(MIN_INTERVAL_FLOOR_MS);
        rng.gen_range(0..=span)
    }
}
