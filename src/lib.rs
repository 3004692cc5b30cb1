//! Optical link-layer communication stack for the SWIM surface/submerged
//! command protocol: carrier timing, symbol transmit/receive, packet framing
//! with parity and repeat-vote recovery, and the command/response layer that
//! rides on top.
#![cfg_attr(not(test), no_std)]

pub mod fifo;
pub mod parity;
pub mod port;
pub mod protocol;
pub mod receiver;
pub mod timing;
pub mod transmitter;

pub use fifo::{DefaultSampleFifo, FifoEntry, SampleFifo, TimingSampleFifo};
pub use parity::{compute_parity, frame_with_parity, parity_check};
pub use port::{Clock, RxPort, TxPort};
pub use protocol::{
    Command, ConfigError, PinMode, SwimConfig, SwimError, SwimProtocol, SWIM_FAILURE, SWIM_SUCCESS,
};
pub use receiver::{majority_vote, RecvError, SymbolReceiver};
pub use timing::{RecvThresholds, Symbol, TimingConfig, DEFAULT_MOD_FREQ_HZ};
pub use transmitter::{SymbolTransmitter, DEFAULT_REPEAT_COUNT};
