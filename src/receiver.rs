//! Symbol receiver: the packet state machine that samples pulse widths,
//! classifies symbols, reassembles repeated frames and recovers a payload
//! by majority vote.

use crate::port::{Clock, RxPort};
use crate::timing::TimingConfig;
use heapless::Vec as HVec;

/// Any single pulse-width measurement above this many microseconds is
/// treated as "nothing arrived" rather than a real symbol.
pub const PULSE_TIMEOUT_US: u32 = 25_000;

/// Multiplier (in units of `period_us`) bounding how long `recv_packet` will
/// wait in `IDLE` for a header to start arriving.
pub const PACKET_TIMEOUT_PULSES: u32 = 100_000;

/// Upper bound on repeat count the receiver's scratch buffer can hold.
pub const MAX_REPEATS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecvError {
    #[error("no edge observed within the pulse timeout")]
    PulseTimeout,
    #[error("pulse timeout while reading frame data")]
    PktRead,
    #[error("pulse timeout while reading inter-repeat gap")]
    GapRead,
    #[error("no header arrived before the idle timeout")]
    IdleTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvState {
    Idle,
    PktArrived,
    PktRead,
    PktGap,
}

/// Samples pulse widths on an [`RxPort`] and reassembles SWIM packets.
pub struct SymbolReceiver<P: RxPort> {
    port: P,
    timing: TimingConfig,
    ir_pin: u8,
    repeat_count: u8,
}

impl<P: RxPort> SymbolReceiver<P> {
    pub fn new(port: P, timing: TimingConfig, ir_pin: u8, repeat_count: u8) -> Self {
        Self {
            port,
            timing,
            ir_pin,
            repeat_count,
        }
    }

    /// Set line direction to INPUT. Direction is tracked by the owning
    /// protocol layer; this exists so call sites match §4.5 of the spec.
    pub fn init(&mut self) {}

    pub const fn period_us(&self) -> u32 {
        self.timing.period_us()
    }

    pub const fn ir_pin(&self) -> u8 {
        self.ir_pin
    }

    pub fn set_timing(&mut self, timing: TimingConfig) {
        self.timing = timing;
    }

    /// Measure one carrier burst: wait for the line to rise, then fall.
    /// Aborts with [`RecvError::PulseTimeout`] if either edge is more than
    /// `PULSE_TIMEOUT_US` away.
    pub fn pulse_width<C: Clock>(&self, clock: &C) -> Result<u32, RecvError> {
        let rise_start = clock.now_us();
        while !self.port.read() {
            if (clock.now_us() - rise_start) as u32 > PULSE_TIMEOUT_US {
                return Err(RecvError::PulseTimeout);
            }
        }

        let start = clock.now_us();
        while self.port.read() {
            if (clock.now_us() - start) as u32 > PULSE_TIMEOUT_US {
                return Err(RecvError::PulseTimeout);
            }
        }

        Ok((clock.now_us() - start) as u32)
    }

    /// Classify one carrier burst as `0` or `1`.
    pub fn recv_bit<C: Clock>(&self, clock: &C) -> Result<bool, RecvError> {
        let width = self.pulse_width(clock)?;
        Ok(width >= self.timing.recv_thresholds().one)
    }

    /// Read `bits` classified symbols MSB-first into a `u32`.
    pub fn read_data<C: Clock>(&self, clock: &C, bits: u8) -> Result<u32, RecvError> {
        let mut data = 0u32;
        for i in 0..bits {
            let bit = self.recv_bit(clock)?;
            if bit {
                data |= 1 << (bits - 1 - i);
            }
        }
        Ok(data)
    }

    /// Run the packet state machine: wait for a header, read `R` repeats of
    /// a `bits`-wide frame separated by gaps, and majority-vote the result.
    ///
    /// Per §9.4 the transmitter never emits a trailing gap after the last
    /// repeat, so `FINISH` is reached right after the `R`-th frame's data
    /// bits, without requiring an `R`-th gap.
    pub fn recv_packet<C: Clock>(&self, clock: &C, bits: u8) -> Result<u64, RecvError> {
        let mut tmp_buf: HVec<u64, MAX_REPEATS> = HVec::new();
        let repeat_count = (self.repeat_count as usize).min(MAX_REPEATS);
        for _ in 0..repeat_count {
            let _ = tmp_buf.push(0);
        }

        let mut state = RecvState::Idle;
        let mut buf_index = 0usize;
        let mut data_index = 0u8;
        let thresholds = self.timing.recv_thresholds();
        let idle_timeout_ms = (PACKET_TIMEOUT_PULSES as u64 * self.timing.period_us() as u64) / 1000;

        let idle_start = clock.now_ms();
        loop {
            match state {
                RecvState::Idle => {
                    if self.port.read() {
                        state = RecvState::PktArrived;
                        #[cfg(feature = "defmt")]
                        defmt::trace!("recv_packet: IDLE -> PKT_ARRIVED");
                    } else if clock.now_ms() - idle_start > idle_timeout_ms {
                        #[cfg(feature = "defmt")]
                        defmt::debug!("recv_packet: idle timeout");
                        return Err(RecvError::IdleTimeout);
                    }
                }
                RecvState::PktArrived => match self.pulse_width(clock) {
                    Err(_) => {
                        state = RecvState::Idle;
                        #[cfg(feature = "defmt")]
                        defmt::trace!("recv_packet: PKT_ARRIVED -> IDLE (pulse timeout)");
                    }
                    Ok(width) => {
                        if width >= thresholds.header_one {
                            buf_index = 0;
                            data_index = 0;
                            state = RecvState::PktRead;
                            #[cfg(feature = "defmt")]
                            defmt::trace!("recv_packet: PKT_ARRIVED -> PKT_READ");
                        }
                    }
                },
                RecvState::PktRead => {
                    let width = self.pulse_width(clock).map_err(|_| RecvError::PktRead)?;
                    let bit = width >= thresholds.one;
                    if bit {
                        tmp_buf[buf_index] |= 1u64 << (bits - 1 - data_index);
                    }
                    data_index += 1;
                    if data_index == bits {
                        data_index = 0;
                        buf_index += 1;
                        if buf_index >= repeat_count {
                            #[cfg(feature = "defmt")]
                            defmt::debug!("recv_packet: SUCCESS");
                            return Ok(majority_vote(&tmp_buf, bits));
                        }
                        state = RecvState::PktGap;
                        #[cfg(feature = "defmt")]
                        defmt::trace!("recv_packet: PKT_READ -> PKT_GAP");
                    }
                }
                RecvState::PktGap => {
                    let width = self.pulse_width(clock).map_err(|_| RecvError::GapRead)?;
                    if width >= thresholds.gap {
                        state = RecvState::PktRead;
                        #[cfg(feature = "defmt")]
                        defmt::trace!("recv_packet: PKT_GAP -> PKT_READ");
                    }
                }
            }
        }
    }
}

/// For each bit position, set it iff at least `ceil(R/2)` of the `R`
/// repeats agree it's set. `R == 1` returns the single copy unchanged.
pub fn majority_vote(repeats: &[u64], bits: u8) -> u64 {
    if repeats.len() <= 1 {
        return repeats.first().copied().unwrap_or(0);
    }
    let majority = repeats.len().div_ceil(2);
    let mut result = 0u64;
    for i in 0..bits {
        let ones = repeats.iter().filter(|r| (*r >> i) & 1 != 0).count();
        if ones >= majority {
            result |= 1 << i;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parity::frame_with_parity;
    use crate::port::test_doubles::{VirtualClock, WaveformPlayer, WaveformRecorder};
    use crate::transmitter::SymbolTransmitter;

    #[test]
    fn majority_vote_single_repeat_passes_through() {
        assert_eq!(majority_vote(&[0b1010], 4), 0b1010);
    }

    #[test]
    fn majority_vote_unanimous_value_wins() {
        let repeats = [0b101u64, 0b101, 0b101];
        assert_eq!(majority_vote(&repeats, 3), 0b101);
    }

    #[test]
    fn majority_vote_recovers_from_one_of_three_bit_error() {
        // Bit 1 flipped in one of three copies; majority (2/3) still agree.
        let repeats = [0b101u64, 0b111, 0b101];
        assert_eq!(majority_vote(&repeats, 3), 0b101);
    }

    #[test]
    fn majority_vote_corrupted_with_two_of_three_errors() {
        // Bit 1 flipped in two of three copies; majority now disagrees.
        let repeats = [0b101u64, 0b111, 0b111];
        assert_eq!(majority_vote(&repeats, 3), 0b111);
    }

    fn round_trip(data_bits: u8, payload: u64, parity_bits: u8, repeat_count: u8) -> Result<u64, RecvError> {
        let timing = TimingConfig::default();
        let tx_clock = VirtualClock::new(1);
        let recorder = WaveformRecorder::new(&tx_clock);
        let mut tx = SymbolTransmitter::new(recorder, timing, 11, repeat_count);
        tx.send_packet(&tx_clock, data_bits, payload, parity_bits);
        let trace = tx.into_port().into_trace();

        let rx_clock = VirtualClock::new(1);
        let player = WaveformPlayer::new(&rx_clock, trace);
        let rx = SymbolReceiver::new(player, timing, 11, repeat_count);
        rx.recv_packet(&rx_clock, data_bits + parity_bits)
    }

    #[test]
    fn round_trip_recovers_payload_for_various_widths() {
        for &bits in &[3u8, 8, 17, 32] {
            let payload = if bits >= 32 { 0xDEAD_BEEFu64 } else { (1u64 << bits) - 1 };
            let got = round_trip(bits, payload & ((1u64 << bits) - 1), 1, 3).unwrap();
            let expected_frame = frame_with_parity(payload & ((1u64 << bits) - 1), bits, 1);
            assert_eq!(got, expected_frame);
        }
    }

    #[test]
    fn round_trip_recovers_empty_data_frame() {
        // D=0: every repeated frame carries only its parity bit.
        let got = round_trip(0, 0, 1, 3).unwrap();
        let expected_frame = frame_with_parity(0, 0, 1);
        assert_eq!(got, expected_frame);
    }

    #[test]
    fn idle_timeout_when_transmitter_silent() {
        let clock = VirtualClock::new(50);
        let player = WaveformPlayer::new(&clock, Vec::new());
        let timing = TimingConfig::default();
        let rx = SymbolReceiver::new(player, timing, 11, 3);
        let result = rx.recv_packet(&clock, 8);
        assert_eq!(result, Err(RecvError::IdleTimeout));
    }
}
