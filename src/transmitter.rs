//! Symbol transmitter: bit-bangs framed SWIM packets onto the optical line.

use crate::parity::frame_with_parity;
use crate::port::{Clock, TxPort};
use crate::timing::{Symbol, TimingConfig};

/// Default number of identical frames sent per packet.
pub const DEFAULT_REPEAT_COUNT: u8 = 3;

/// Bit-bangs header, data/parity frames and gaps onto a [`TxPort`], timed
/// against a [`Clock`].
///
/// Timing is best-effort against the monotonic clock; there is no interrupt
/// use and no cancellation beyond the caller never calling in again.
pub struct SymbolTransmitter<P: TxPort> {
    port: P,
    timing: TimingConfig,
    ir_pin: u8,
    repeat_count: u8,
}

impl<P: TxPort> SymbolTransmitter<P> {
    pub fn new(port: P, timing: TimingConfig, ir_pin: u8, repeat_count: u8) -> Self {
        Self {
            port,
            timing,
            ir_pin,
            repeat_count,
        }
    }

    /// Set line direction to OUTPUT. Direction is tracked by the owning
    /// protocol layer; this exists so call sites match §4.5 of the spec.
    pub fn init(&mut self) {
        self.port.set_low();
    }

    pub const fn period_us(&self) -> u32 {
        self.timing.period_us()
    }

    pub const fn mod_freq_hz(&self) -> u32 {
        self.timing.mod_freq_hz()
    }

    pub const fn ir_pin(&self) -> u8 {
        self.ir_pin
    }

    pub fn set_timing(&mut self, timing: TimingConfig) {
        self.timing = timing;
    }

    /// Reclaim the underlying port, e.g. to inspect what a test double
    /// recorded.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Gate the line high for `burst_pulses` pulse periods, then low for
    /// `idle_pulses` pulse periods.
    ///
    /// The 38 kHz sub-carrier itself is generated by a hardware PWM block
    /// gated by this pin, not bit-banged here; this port only frames the
    /// envelope a demodulating IR receiver would present on its output.
    fn send_bit<C: Clock>(&mut self, clock: &C, burst_pulses: u16, idle_pulses: u16) {
        let period = self.timing.period_us() as u64;

        if burst_pulses > 0 {
            self.port.set_high();
            let start = clock.now_us();
            let burst_us = period * burst_pulses as u64;
            while clock.now_us() - start < burst_us {}
        }

        if idle_pulses > 0 {
            self.port.set_low();
            let start = clock.now_us();
            let idle_us = period * idle_pulses as u64;
            while clock.now_us() - start < idle_us {}
        }
    }

    fn send_symbol<C: Clock>(&mut self, clock: &C, symbol: Symbol) {
        let (burst, idle) = self.timing.pulses_for(symbol);
        self.send_bit(clock, burst, idle);
    }

    pub fn send_one<C: Clock>(&mut self, clock: &C) {
        self.send_symbol(clock, Symbol::One);
    }

    pub fn send_zero<C: Clock>(&mut self, clock: &C) {
        self.send_symbol(clock, Symbol::Zero);
    }

    pub fn send_header<C: Clock>(&mut self, clock: &C) {
        self.send_symbol(clock, Symbol::Header);
    }

    pub fn send_gap<C: Clock>(&mut self, clock: &C) {
        self.send_symbol(clock, Symbol::Gap);
    }

    /// Emit `Header + R × (Frame + Gap-except-last)`.
    ///
    /// `data_bits` may be 0, in which case each frame is just the parity
    /// bits (or nothing, if `parity_bits` is also 0): header plus `R` empty
    /// frames separated by gaps.
    pub fn send_packet<C: Clock>(&mut self, clock: &C, data_bits: u8, payload: u64, parity_bits: u8) {
        let frame = frame_with_parity(payload, data_bits, parity_bits);
        let frame_width = data_bits + parity_bits;

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "send_packet: data_bits={} parity_bits={} repeat={}",
            data_bits,
            parity_bits,
            self.repeat_count
        );

        self.send_header(clock);

        for repeat in 0..self.repeat_count {
            if frame_width > 0 {
                for i in (0..frame_width).rev() {
                    if (frame >> i) & 1 != 0 {
                        self.send_one(clock);
                    } else {
                        self.send_zero(clock);
                    }
                }
            }
            if repeat + 1 < self.repeat_count {
                self.send_gap(clock);
            }
        }
    }
}
