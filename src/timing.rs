//! Carrier timing: pulse counts, periods and receiver classification
//! thresholds derived from the modulation frequency.

use fugit::HertzU32;

/// Default carrier modulation frequency (38 kHz), matched against a
/// VSOP383x-class band-pass photodiode receiver.
pub const DEFAULT_MOD_FREQ_HZ: u32 = 38_000;

/// 60% tolerance applied to burst widths when classifying a received pulse,
/// integer form of the `× 0.6` factor in the timing table.
const RECV_TOLERANCE_NUM: u32 = 6;
const RECV_TOLERANCE_DEN: u32 = 10;

/// One of the four carrier symbols the link layer ever transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Symbol {
    One,
    Zero,
    Header,
    Gap,
}

impl Symbol {
    /// Number of modulation pulses the carrier burst lasts.
    pub const fn burst_pulses(self) -> u16 {
        match self {
            Symbol::One => 23,
            Symbol::Zero => 12,
            Symbol::Header => 46,
            Symbol::Gap => 35,
        }
    }

    /// Number of modulation pulses the trailing idle lasts.
    pub const fn idle_pulses(self) -> u16 {
        match self {
            Symbol::One => 23,
            Symbol::Zero => 23,
            Symbol::Header => 35,
            Symbol::Gap => 23,
        }
    }
}

/// Pre-scaled burst-width thresholds used by [`crate::receiver::SymbolReceiver`]
/// to classify a measured pulse, cached so they aren't recomputed per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecvThresholds {
    pub one: u32,
    pub zero: u32,
    pub gap: u32,
    pub header_one: u32,
}

impl RecvThresholds {
    fn from_period(period_us: u32) -> Self {
        let scale = |pulses: u16| (period_us * pulses as u32 * RECV_TOLERANCE_NUM) / RECV_TOLERANCE_DEN;
        Self {
            one: scale(Symbol::One.burst_pulses()),
            zero: scale(Symbol::Zero.burst_pulses()),
            gap: scale(Symbol::Gap.burst_pulses()),
            header_one: scale(Symbol::Header.burst_pulses()),
        }
    }
}

/// Modulation frequency and the derived per-pulse period, shared logically
/// between a transmitter and a receiver (each holds its own copy, kept in
/// sync whenever the frequency changes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    mod_freq_hz: u32,
    period_us: u32,
    thresholds: RecvThresholds,
}

impl TimingConfig {
    pub fn new(mod_freq_hz: u32) -> Self {
        let mut cfg = Self {
            mod_freq_hz,
            period_us: 1,
            thresholds: RecvThresholds::from_period(1),
        };
        cfg.set_freq(mod_freq_hz);
        cfg
    }

    /// Set the modulation frequency and recompute derived values.
    ///
    /// A value below 1000 is interpreted as kHz (so `38` means 38 kHz, the
    /// same as `38_000`). Zero is clamped to 1 before the kHz check, matching
    /// `original_source/IRComm.c`'s `calc_period` (which clamps first, then
    /// multiplies), so `0` ends up at 1 kHz rather than falling through to a
    /// literal 0 Hz.
    pub fn set_freq(&mut self, mod_freq_hz: u32) {
        let freq = mod_freq_hz.max(1);
        self.mod_freq_hz = if freq < 1000 { freq * 1000 } else { freq };
        self.recompute();
    }

    /// Idempotent: recomputing without changing the frequency is a no-op on
    /// the derived values.
    pub fn recompute(&mut self) {
        let freq = self.mod_freq_hz.max(1);
        self.period_us = ((1_000_000 + freq / 2) / freq).max(1);
        self.thresholds = RecvThresholds::from_period(self.period_us);
    }

    pub const fn period_us(&self) -> u32 {
        self.period_us
    }

    pub const fn mod_freq_hz(&self) -> u32 {
        self.mod_freq_hz
    }

    pub fn mod_freq(&self) -> HertzU32 {
        HertzU32::from_raw(self.mod_freq_hz)
    }

    /// High portion of a single modulation pulse (80% duty cycle).
    pub const fn high_period_us(&self) -> u32 {
        self.period_us * 4 / 5
    }

    pub const fn pulses_for(&self, symbol: Symbol) -> (u16, u16) {
        (symbol.burst_pulses(), symbol.idle_pulses())
    }

    pub const fn recv_thresholds(&self) -> RecvThresholds {
        self.thresholds
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MOD_FREQ_HZ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_38khz() {
        let cfg = TimingConfig::default();
        assert_eq!(cfg.mod_freq_hz(), 38_000);
        assert_eq!(cfg.period_us(), 26);
    }

    #[test]
    fn khz_interpretation() {
        let cfg = TimingConfig::new(38);
        assert_eq!(cfg.mod_freq_hz(), 38_000);
    }

    #[test]
    fn zero_freq_clamps_to_one_khz() {
        let cfg = TimingConfig::new(0);
        assert_eq!(cfg.mod_freq_hz(), 1000);
        assert_eq!(cfg.period_us(), 1000);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut cfg = TimingConfig::new(38_000);
        let before = cfg;
        cfg.recompute();
        assert_eq!(before, cfg);
    }

    #[test]
    fn period_never_below_one_for_arbitrary_freq() {
        for freq in [1u32, 2, 999, 1000, 40_000, u32::MAX] {
            let cfg = TimingConfig::new(freq);
            assert!(cfg.period_us() >= 1);
        }
    }

    #[test]
    fn high_period_is_four_fifths_of_period() {
        let cfg = TimingConfig::default();
        assert_eq!(cfg.high_period_us(), cfg.period_us() * 4 / 5);
    }
}
