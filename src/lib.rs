#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Async, `no_std` driver core for STMicroelectronics FingerTipS (FTS)
//! capacitive touch controllers.
//!
//! FTS controllers expose a register-oriented command interface over SPI and
//! report everything — touch data, command echoes, firmware faults — through
//! an event FIFO. This crate implements the protocol engine that makes that
//! asynchronous, lossy channel behave like a request/response API:
//!
//! - Polling the event FIFO for frames matching a wildcard pattern, with
//!   retry-until-timeout semantics and error-event siphoning
//! - The system-reset sequence (reset line toggle or register write) with a
//!   bounded retry budget and post-reset synchronization
//! - Command writes with firmware echo verification
//! - Sync-frame requests detected through a changing frame counter
//! - Decoding the controller's fixed-layout system-info record
//! - The CRC-8 helper and the CRC status audit flow
//!
//! The driver is built on `embedded-hal` / `embedded-hal-async` 1.0 traits so
//! it works across MCU families.
//!
//! ```no_run
//! use st_fts::{Fts, InterruptLine, ScanMode};
//!
//! async fn example<SPI, RST, IRQ, D, E>(
//!   spi: SPI,
//!   reset_pin: RST,
//!   irq: IRQ,
//!   delay: D,
//! ) -> Result<(), st_fts::Error<E>>
//! where
//!   SPI: embedded_hal_async::spi::SpiDevice<u8, Error = E>,
//!   RST: embedded_hal::digital::OutputPin,
//!   IRQ: InterruptLine,
//!   D: embedded_hal_async::delay::DelayNs,
//! {
//!   let mut touch = Fts::new(spi, Some(reset_pin), irq, delay);
//!   touch.initialize().await?;
//!   touch.enable_interrupts();
//!   touch.set_scan_mode(ScanMode::Active { channels: 0x01 }).await?;
//!   Ok(())
//! }
//! ```

#[macro_use]
mod fmt;

mod control;
mod crc;
mod defs;
mod event;
mod frame;
#[cfg(test)]
mod mock;
mod reset;
mod rw;
mod sysinfo;

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

pub use crc::{compute_crc8, CrcOutcome};
pub use defs::{Feature, HostData, ScanMode, SysCmd, FIFO_EVENT_SIZE};
use event::ErrorLog;
pub use event::{EventPattern, PolledEvent};
pub use reset::{InterruptLine, ResetFlags};
pub use sysinfo::SystemInfo;

/// Errors that can occur while driving the controller.
///
/// `E` is the SPI device error type. Transport failures (`BusRead`,
/// `BusWrite`) propagate unchanged to the immediate caller; the three
/// composite variants (`ResetFailed`, `EchoCheckFailed`, `RequestDataFailed`)
/// wrap the last underlying [`Cause`] after their internal retry budget is
/// exhausted.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E = core::convert::Infallible> {
  /// A bus read transaction failed with the underlying SPI error.
  BusRead(E),
  /// A bus write transaction failed with the underlying SPI error.
  BusWrite(E),
  /// Driving the reset line failed.
  Gpio,
  /// The expected event or state change did not appear within the timeout.
  Timeout,
  /// A host-data record carried the wrong header signature.
  WrongSignature { found: u8 },
  /// A host-data record carried a data-type id other than the one requested.
  WrongDataType { found: u8 },
  /// The system-info decode did not consume exactly the expected record size,
  /// indicating a wire-format or firmware-version skew.
  OffsetMismatch { parsed: usize },
  /// Malformed caller input, e.g. an empty command or an oversized payload.
  InvalidArgument,
  /// The firmware reported a fault class no retry can fix (hard fault,
  /// watchdog, ESD). Polling stops immediately when one is seen.
  ControllerFault { code: u8 },
  /// All system-reset attempts failed; carries the last underlying cause.
  ResetFailed(Cause<E>),
  /// The command echo was not confirmed; carries the underlying cause.
  EchoCheckFailed(Cause<E>),
  /// All sync-frame request attempts failed; carries the last cause.
  RequestDataFailed(Cause<E>),
}

/// Flattened underlying cause carried by the composite [`Error`] variants.
///
/// This is the crate's rendering of the firmware driver convention of OR-ing
/// a base error code into a `*_FAIL` flag: the composite names the broad
/// operation that failed, the cause says why.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cause<E> {
  BusRead(E),
  BusWrite(E),
  Gpio,
  Timeout,
  /// Framing failure: wrong signature, data type, or record length.
  Signature,
  /// Unrecoverable controller fault with the reported error code.
  Fault(u8),
  /// The echo matched, but only after this many error events were swallowed.
  DirtyEcho(u8),
  Argument,
}

impl<E> From<Error<E>> for Cause<E> {
  fn from(err: Error<E>) -> Self {
    match err {
      Error::BusRead(e) => Cause::BusRead(e),
      Error::BusWrite(e) => Cause::BusWrite(e),
      Error::Gpio => Cause::Gpio,
      Error::Timeout => Cause::Timeout,
      Error::WrongSignature { .. } | Error::WrongDataType { .. } => Cause::Signature,
      Error::OffsetMismatch { .. } => Cause::Signature,
      Error::InvalidArgument => Cause::Argument,
      Error::ControllerFault { code } => Cause::Fault(code),
      Error::ResetFailed(c) | Error::EchoCheckFailed(c) | Error::RequestDataFailed(c) => c,
    }
  }
}

impl<E> Error<E> {
  /// Whether this error (or the cause inside a composite) was a raw bus
  /// transaction failure, i.e. the device was unreachable rather than
  /// reachable-but-inconsistent.
  pub fn is_bus(&self) -> bool {
    matches!(
      self,
      Error::BusRead(_)
        | Error::BusWrite(_)
        | Error::ResetFailed(Cause::BusRead(_) | Cause::BusWrite(_))
        | Error::EchoCheckFailed(Cause::BusRead(_) | Cause::BusWrite(_))
        | Error::RequestDataFailed(Cause::BusRead(_) | Cause::BusWrite(_))
    )
  }
}

/// Protocol engine for an FTS touch controller.
///
/// The driver owns the SPI device, the optional reset line, the interrupt
/// line and a delay source. All process-wide state of the original firmware
/// driver (system-info snapshot, reset flags, interrupt-disable counter) is
/// held here, one instance per device.
pub struct Fts<SPI, RST, IRQ, D> {
  spi: SPI,
  reset_pin: Option<RST>,
  irq: IRQ,
  delay: D,
  info: SystemInfo,
  error_log: ErrorLog,
  reset_flags: ResetFlags,
  irq_disables: u32,
  resetting: bool,
}

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Create a new driver instance.
  ///
  /// `reset_pin` is the discrete reset line if one is wired; pass `None` to
  /// fall back to the soft-reset register write during [`Fts::system_reset`].
  /// The choice is fixed for the lifetime of the driver.
  pub fn new(spi: SPI, reset_pin: Option<RST>, irq: IRQ, delay: D) -> Self {
    Self {
      spi,
      reset_pin,
      irq,
      delay,
      info: SystemInfo::default(),
      error_log: ErrorLog::new(),
      reset_flags: ResetFlags::default(),
      irq_disables: 0,
      resetting: false,
    }
  }

  /// Bring the controller to a known state: perform a system reset, then
  /// load the system-info record the firmware publishes after reset.
  ///
  /// Interrupts are left masked afterwards; call
  /// [`Fts::enable_interrupts`] once the caller's event handling is ready.
  pub async fn initialize(&mut self) -> Result<(), Error<E>> {
    info!("initializing FTS core");
    self.system_reset().await?;
    self.read_sys_info(false).await?;
    Ok(())
  }

  /// The most recently published system-info snapshot.
  ///
  /// Republished wholesale after every successful parse and after every
  /// failed parse (with one of the two default fill patterns); callers must
  /// not cache sub-fields across a reset.
  pub fn system_info(&self) -> &SystemInfo {
    &self.info
  }
}
