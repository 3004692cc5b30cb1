//! The SWIM surface/submerged command protocol: command framing, the
//! per-command response dispatch and the FIFO-backed sample cache, layered
//! on top of the symbol transmitter and receiver.

use crate::fifo::{FifoEntry, SampleFifo};
use crate::parity::parity_check;
use crate::port::{Clock, RxPort, TxPort};
use crate::receiver::{RecvError, SymbolReceiver};
use crate::timing::TimingConfig;
use crate::transmitter::SymbolTransmitter;

/// Width, in bits, of the 3-bit command code embedded in every command
/// frame.
pub const CMD_CODE_BITS: u8 = 3;
/// Width, in bits, of the argument field that follows the code in a
/// command frame.
pub const CMD_ARG_BITS: u8 = 5;
/// Width, in bits, of a full command frame (code plus argument), before
/// parity.
pub const CMD_FRAME_BITS: u8 = CMD_CODE_BITS + CMD_ARG_BITS;
/// Width, in bits, of a channel data response frame, before parity:
/// `[addr:5][adc:12]`.
pub const CHANNEL_FRAME_BITS: u8 = 17;
/// Value every `ACK` response frame carries.
pub const ACK: u8 = 0b111;
/// Width, in bits, of an `ACK` response frame.
pub const ACK_BITS: u8 = 3;

/// Compatibility constant mirroring the original protocol's boolean-style
/// success code.
pub const SWIM_SUCCESS: i32 = 0;
/// Compatibility constant mirroring the original protocol's boolean-style
/// failure code.
pub const SWIM_FAILURE: i32 = -1;

/// The eight 3-bit command codes the link layer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Sleep,
    ReadAll,
    ReadOne,
    ReadBatt,
    ReadFpgaTemp,
    ReadUptime,
    Reserved,
    Wakeup,
}

impl Command {
    pub const fn from_code(code: u8) -> Self {
        match code & 0b111 {
            0b000 => Command::Sleep,
            0b001 => Command::ReadAll,
            0b010 => Command::ReadOne,
            0b011 => Command::ReadBatt,
            0b100 => Command::ReadFpgaTemp,
            0b101 => Command::ReadUptime,
            0b110 => Command::Reserved,
            _ => Command::Wakeup,
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Command::Sleep => 0b000,
            Command::ReadAll => 0b001,
            Command::ReadOne => 0b010,
            Command::ReadBatt => 0b011,
            Command::ReadFpgaTemp => 0b100,
            Command::ReadUptime => 0b101,
            Command::Reserved => 0b110,
            Command::Wakeup => 0b111,
        }
    }

    /// Width of the response this command's responder emits, in bits.
    /// `Sleep`, `Wakeup` and `Reserved` all answer with a 3-bit `ACK`.
    pub const fn response_data_bits(self) -> u8 {
        match self {
            Command::ReadAll | Command::ReadOne => CHANNEL_FRAME_BITS,
            Command::ReadBatt | Command::ReadFpgaTemp => 8,
            Command::ReadUptime => 32,
            Command::Sleep | Command::Wakeup | Command::Reserved => ACK_BITS,
        }
    }
}

/// Which direction the shared optical line currently drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    Output,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("fifo_depth must be non-zero")]
    ZeroFifoDepth,
    #[error("parity_bits must be 0, 1 or 2")]
    InvalidParityBits,
    #[error("repeat_count must be non-zero")]
    ZeroRepeatCount,
    #[error("fifo_depth does not match the compiled-in FIFO capacity")]
    FifoDepthMismatch,
}

/// Link-layer configuration: carrier frequency, parity scheme and repeat
/// count for a [`SwimProtocol`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwimConfig {
    pub ir_pin: u8,
    pub mod_freq_hz: u32,
    pub fifo_depth: u32,
    pub parity_bits: u8,
    pub repeat_count: u8,
}

impl SwimConfig {
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.fifo_depth == 0 {
            return Err(ConfigError::ZeroFifoDepth);
        }
        if self.parity_bits > 2 {
            return Err(ConfigError::InvalidParityBits);
        }
        if self.repeat_count == 0 {
            return Err(ConfigError::ZeroRepeatCount);
        }
        Ok(())
    }
}

impl Default for SwimConfig {
    fn default() -> Self {
        Self {
            ir_pin: 0,
            mod_freq_hz: crate::timing::DEFAULT_MOD_FREQ_HZ,
            fifo_depth: 30,
            parity_bits: 1,
            repeat_count: crate::transmitter::DEFAULT_REPEAT_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwimError {
    #[error("receive error: {0}")]
    Recv(#[from] RecvError),
    #[error("parity check failed on received frame")]
    ParityMismatch,
    #[error("FIFO empty, no frame to send")]
    FifoEmpty,
}

/// Owns a transmitter, a receiver, a sample cache and the small bit of
/// protocol state (last decoded command, battery level, uptime,
/// temperature) the command set above reads and writes.
pub struct SwimProtocol<P: TxPort, Q: RxPort, C: Clock, const N: usize> {
    tx: SymbolTransmitter<P>,
    rx: SymbolReceiver<Q>,
    clock: C,
    fifo: SampleFifo<N>,
    config: SwimConfig,
    pin_mode: PinMode,
    cmd_cache: Option<Command>,
    cmd_arg: u8,
    battery_level: u8,
    uptime_s: u32,
    temperature: i16,
}

impl<P: TxPort, Q: RxPort, C: Clock, const N: usize> SwimProtocol<P, Q, C, N> {
    pub fn new(tx_port: P, rx_port: Q, clock: C, config: SwimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.fifo_depth as usize != N {
            return Err(ConfigError::FifoDepthMismatch);
        }
        let timing = TimingConfig::new(config.mod_freq_hz);
        Ok(Self {
            tx: SymbolTransmitter::new(tx_port, timing, config.ir_pin, config.repeat_count),
            rx: SymbolReceiver::new(rx_port, timing, config.ir_pin, config.repeat_count),
            clock,
            fifo: SampleFifo::new(),
            config,
            pin_mode: PinMode::Input,
            cmd_cache: None,
            cmd_arg: 0,
            battery_level: 0,
            uptime_s: 0,
            temperature: 0,
        })
    }

    pub const fn config(&self) -> &SwimConfig {
        &self.config
    }

    pub const fn pin_mode(&self) -> PinMode {
        self.pin_mode
    }

    pub fn set_battery_level(&mut self, level: u8) {
        self.battery_level = level;
    }

    pub fn set_uptime(&mut self, uptime_s: u32) {
        self.uptime_s = uptime_s;
    }

    pub fn set_temperature(&mut self, temperature: i16) {
        self.temperature = temperature;
    }

    pub const fn last_command(&self) -> Option<Command> {
        self.cmd_cache
    }

    pub const fn last_command_arg(&self) -> u8 {
        self.cmd_arg
    }

    pub fn push_sample(&mut self, addr: u8, adc_sample: u16) {
        self.fifo.push(FifoEntry::pack(addr, adc_sample));
    }

    fn pop_sample(&mut self) -> Option<(u8, u16)> {
        if self.fifo.is_empty() {
            return None;
        }
        Some(FifoEntry::unpack(self.fifo.pop()))
    }

    fn switch_to_output(&mut self) {
        if self.pin_mode != PinMode::Output {
            self.tx.init();
            self.pin_mode = PinMode::Output;
        }
    }

    fn switch_to_input(&mut self) {
        if self.pin_mode != PinMode::Input {
            self.rx.init();
            self.pin_mode = PinMode::Input;
        }
    }

    /// Send a command frame: 3-bit code followed by a 5-bit argument.
    /// Initiator side of the exchange.
    pub fn send_cmd(&mut self, cmd: Command, arg: u8) {
        self.switch_to_output();
        #[cfg(feature = "defmt")]
        defmt::debug!("send_cmd: code={} arg={}", cmd.code(), arg);
        let frame = ((cmd.code() as u64) << CMD_ARG_BITS) | (arg & 0x1F) as u64;
        self.tx
            .send_packet(&self.clock, CMD_FRAME_BITS, frame, self.config.parity_bits);
    }

    /// Receive a command frame, decode its code and argument, and cache
    /// both for a subsequent [`Self::respond`]. Responder side of the
    /// exchange.
    pub fn read_cmd(&mut self) -> Result<Command, SwimError> {
        self.switch_to_input();
        let frame = self
            .rx
            .recv_packet(&self.clock, CMD_FRAME_BITS + self.config.parity_bits)?;
        if !parity_check(frame, CMD_FRAME_BITS, self.config.parity_bits) {
            return Err(SwimError::ParityMismatch);
        }
        let data = frame >> self.config.parity_bits;
        let cmd = Command::from_code((data >> CMD_ARG_BITS) as u8);
        #[cfg(feature = "defmt")]
        defmt::debug!("read_cmd: decoded code={}", cmd.code());
        self.cmd_cache = Some(cmd);
        self.cmd_arg = (data & 0x1F) as u8;
        Ok(cmd)
    }

    fn send_frame(&mut self, bits: u8, payload: u64) {
        self.switch_to_output();
        self.tx.send_packet(&self.clock, bits, payload, self.config.parity_bits);
    }

    fn recv_frame(&mut self, bits: u8) -> Result<u64, SwimError> {
        self.switch_to_input();
        let frame = self.rx.recv_packet(&self.clock, bits + self.config.parity_bits)?;
        if !parity_check(frame, bits, self.config.parity_bits) {
            return Err(SwimError::ParityMismatch);
        }
        Ok(frame >> self.config.parity_bits)
    }

    fn send_ack(&mut self) {
        self.send_frame(ACK_BITS, ACK as u64);
    }

    /// Responder side: emit whatever frame(s) `self.last_command()` calls
    /// for, per the per-command response table. Must be called after a
    /// successful [`Self::read_cmd`].
    ///
    /// `ReadAll`/`ReadOne` against an empty FIFO send nothing and return
    /// [`SwimError::FifoEmpty`], matching `senddata_swim_protocol`'s
    /// `SWIM_FAILURE` on an empty FIFO.
    pub fn respond(&mut self) -> Result<(), SwimError> {
        match self.cmd_cache {
            Some(Command::ReadAll) => {
                if self.fifo.is_empty() {
                    return Err(SwimError::FifoEmpty);
                }
                while let Some((addr, adc)) = self.pop_sample() {
                    let payload = ((addr as u64) << 12) | adc as u64;
                    self.send_frame(CHANNEL_FRAME_BITS, payload);
                }
                Ok(())
            }
            Some(Command::ReadOne) => match self.pop_sample() {
                Some((addr, adc)) => {
                    let payload = ((addr as u64) << 12) | adc as u64;
                    self.send_frame(CHANNEL_FRAME_BITS, payload);
                    Ok(())
                }
                None => Err(SwimError::FifoEmpty),
            },
            Some(Command::ReadBatt) => {
                self.send_frame(8, self.battery_level as u64);
                Ok(())
            }
            Some(Command::ReadFpgaTemp) => {
                self.send_frame(8, self.temperature as u16 as u64);
                Ok(())
            }
            Some(Command::ReadUptime) => {
                self.send_frame(32, self.uptime_s as u64);
                Ok(())
            }
            Some(Command::Sleep) | Some(Command::Wakeup) | Some(Command::Reserved) | None => {
                self.send_ack();
                Ok(())
            }
        }
    }

    /// Initiator side: send a `WAKEUP` command with no argument.
    pub fn send_wakeup(&mut self) {
        self.send_cmd(Command::Wakeup, 0);
    }

    /// Initiator side: send a `SLEEP` command with no argument.
    pub fn send_sleep(&mut self) {
        self.send_cmd(Command::Sleep, 0);
    }

    /// Initiator side: receive one channel data frame and cache it in this
    /// node's own FIFO, as the response to a prior `READ_ONE`.
    pub fn read_one(&mut self) -> Result<(u8, u16), SwimError> {
        let payload = self.recv_frame(CHANNEL_FRAME_BITS)?;
        let addr = (payload >> 12) as u8 & 0x1F;
        let adc = (payload & 0xFFF) as u16;
        self.push_sample(addr, adc);
        Ok((addr, adc))
    }

    /// Initiator side: receive channel data frames until the responder
    /// falls silent, caching each in this node's own FIFO.
    ///
    /// The responder never announces how many frames `READ_ALL` will
    /// send, so a dropped or parity-failed frame along the way is not
    /// itself the end of the stream: only an idle timeout means the
    /// responder is done.
    pub fn read_all(&mut self) -> usize {
        let mut count = 0;
        loop {
            match self.recv_frame(CHANNEL_FRAME_BITS) {
                Ok(payload) => {
                    let addr = (payload >> 12) as u8 & 0x1F;
                    let adc = (payload & 0xFFF) as u16;
                    self.push_sample(addr, adc);
                    count += 1;
                }
                Err(SwimError::Recv(RecvError::IdleTimeout)) => break,
                Err(_) => continue,
            }
        }
        count
    }

    /// Initiator side: receive the 8-bit battery-level response.
    pub fn read_batt(&mut self) -> Result<u8, SwimError> {
        Ok(self.recv_frame(8)? as u8)
    }

    /// Initiator side: receive the 8-bit FPGA temperature response.
    pub fn read_fpga_temp(&mut self) -> Result<u8, SwimError> {
        Ok(self.recv_frame(8)? as u8)
    }

    /// Initiator side: receive the 32-bit uptime response.
    pub fn read_uptime(&mut self) -> Result<u32, SwimError> {
        Ok(self.recv_frame(32)? as u32)
    }

    /// Initiator side: receive an `ACK` frame (response to `SLEEP`,
    /// `WAKEUP`, or a reserved command code).
    pub fn read_ack(&mut self) -> Result<u8, SwimError> {
        Ok(self.recv_frame(ACK_BITS)? as u8)
    }
}
