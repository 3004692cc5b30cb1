//! Hardware port traits.
//!
//! The core never talks to a GPIO register or a timer peripheral directly;
//! it talks to whatever implements [`Clock`], [`TxPort`] and [`RxPort`].
//! The platform adapter (board support code, not part of this crate) is the
//! only place that ever touches real silicon.

/// Monotonic time source, microsecond and millisecond resolution.
///
/// Both clocks are expected to be the same underlying timer at different
/// granularity; callers rely on `now_us` for pulse-width measurement and on
/// `now_ms` for the coarser idle-packet timeout.
pub trait Clock {
    /// Monotonic microseconds. Rollover is acceptable as long as differences
    /// between two calls taken close together remain valid once truncated to
    /// `u32`.
    fn now_us(&self) -> u64;
    /// Monotonic milliseconds.
    fn now_ms(&self) -> u64;
}

/// Output side of the shared optical line.
pub trait TxPort {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

/// Input side of the shared optical line.
///
/// `read` returns `true` when carrier is present. Active-low inversion for
/// open-drain receivers (VSOP383x-class) is the adapter's responsibility,
/// not this trait's.
pub trait RxPort {
    fn read(&self) -> bool;
}

/// Host-side test doubles: a simulated clock plus a waveform recorder/player
/// pair standing in for a real optical line.
///
/// A direct `Cell<bool>` loopback can't stand in for the line: transmitter
/// and receiver are both driven by busy-wait loops against the same clock,
/// so a round-trip test needs the receiver to see the *sequence* of level
/// transitions the transmitter produced, each tagged with the simulated
/// timestamp it happened at, not just the line's final level. The recorder
/// captures that sequence while the transmitter runs; the player replays it
/// while the receiver runs against a clock reset to the same starting point.
#[cfg(test)]
pub(crate) mod test_doubles {
    use super::{Clock, RxPort, TxPort};
    use core::cell::Cell;
    use std::vec::Vec;

    /// Clock that advances by a fixed step every time it is read, so
    /// busy-wait loops in the core make simulated progress without a real
    /// timer or a second thread.
    pub struct VirtualClock {
        us: Cell<u64>,
        step: u64,
    }

    impl VirtualClock {
        pub fn new(step_us: u64) -> Self {
            Self {
                us: Cell::new(0),
                step: step_us,
            }
        }

        /// Current simulated time without advancing it.
        pub fn peek(&self) -> u64 {
            self.us.get()
        }

        pub fn reset(&self) {
            self.us.set(0);
        }

        fn tick(&self) -> u64 {
            let now = self.us.get();
            self.us.set(now + self.step);
            now
        }
    }

    impl Clock for VirtualClock {
        fn now_us(&self) -> u64 {
            self.tick()
        }

        fn now_ms(&self) -> u64 {
            self.tick() / 1000
        }
    }

    /// Lets a shared `&VirtualClock` stand in for an owned `Clock`, so a
    /// single simulated clock can be threaded through a transmitter, a
    /// receiver and the protocol layer that owns both.
    impl Clock for &VirtualClock {
        fn now_us(&self) -> u64 {
            (*self).now_us()
        }

        fn now_ms(&self) -> u64 {
            (*self).now_ms()
        }
    }

    /// Records every level change along with the simulated time it occurred.
    pub struct WaveformRecorder<'a> {
        clock: &'a VirtualClock,
        trace: Vec<(u64, bool)>,
    }

    impl<'a> WaveformRecorder<'a> {
        pub fn new(clock: &'a VirtualClock) -> Self {
            Self {
                clock,
                trace: Vec::new(),
            }
        }

        pub fn into_trace(self) -> Vec<(u64, bool)> {
            self.trace
        }

        fn record(&mut self, level: bool) {
            self.trace.push((self.clock.peek(), level));
        }
    }

    impl TxPort for WaveformRecorder<'_> {
        fn set_high(&mut self) {
            self.record(true);
        }

        fn set_low(&mut self) {
            self.record(false);
        }
    }

    /// Replays a recorded waveform against whatever clock drives the reader.
    pub struct WaveformPlayer<'a> {
        clock: &'a VirtualClock,
        trace: Vec<(u64, bool)>,
    }

    impl<'a> WaveformPlayer<'a> {
        pub fn new(clock: &'a VirtualClock, trace: Vec<(u64, bool)>) -> Self {
            Self { clock, trace }
        }
    }

    impl RxPort for WaveformPlayer<'_> {
        fn read(&self) -> bool {
            let now = self.clock.peek();
            let mut level = false;
            for &(ts, lvl) in &self.trace {
                if ts > now {
                    break;
                }
                level = lvl;
            }
            level
        }
    }
}
