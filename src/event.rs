use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use crate::defs::*;
use crate::{Error, Fts, InterruptLine, ResetFlags};

/// Wildcard template tested against FIFO event frames.
///
/// Each position is either an expected byte or a wildcard ("don't care").
/// A pattern is at most [`FIFO_EVENT_SIZE`] positions long; event bytes
/// beyond the pattern length are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventPattern {
  positions: [Option<u8>; FIFO_EVENT_SIZE],
  len: usize,
}

impl EventPattern {
  /// Build a pattern from explicit positions, `None` being a wildcard.
  /// Anything beyond the event size is truncated.
  pub fn new(positions: &[Option<u8>]) -> Self {
    let len = positions.len().min(FIFO_EVENT_SIZE);
    let mut stored = [None; FIFO_EVENT_SIZE];
    stored[..len].copy_from_slice(&positions[..len]);
    Self { positions: stored, len }
  }

  /// Build a pattern that requires the leading bytes to match exactly.
  pub fn exact(bytes: &[u8]) -> Self {
    let len = bytes.len().min(FIFO_EVENT_SIZE);
    let mut stored = [None; FIFO_EVENT_SIZE];
    for (slot, byte) in stored[..len].iter_mut().zip(bytes) {
      *slot = Some(*byte);
    }
    Self { positions: stored, len }
  }

  /// True iff every non-wildcard position equals the corresponding event byte.
  pub fn matches(&self, event: &[u8; FIFO_EVENT_SIZE]) -> bool {
    self.positions[..self.len]
      .iter()
      .zip(event)
      .all(|(expected, byte)| expected.map_or(true, |e| e == *byte))
  }

  /// The expected class byte, if position 0 is not a wildcard.
  pub(crate) fn leading(&self) -> Option<u8> {
    self.positions.first().copied().flatten()
  }
}

/// Outcome of a successful [`Fts::poll_for_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PolledEvent {
  /// The matching event frame.
  pub raw: [u8; FIFO_EVENT_SIZE],
  /// Error events swallowed strictly before the match. A non-zero count on
  /// success means the link was flaky but the operation still completed.
  pub errors_seen: u8,
  /// Whether an unsolicited controller-ready event was observed while
  /// polling, i.e. the device reset itself. The sticky reset flags have
  /// already been set when this is true.
  pub unsolicited_reset: bool,
}

/// Severity assigned to an error event by the classifier.
enum Severity {
  /// Logged and counted; polling continues.
  Recoverable,
  /// The firmware is in a state no retry can fix; polling must stop.
  Fatal,
}

fn classify(event: &[u8; FIFO_EVENT_SIZE]) -> Severity {
  match event[1] {
    EVT_TYPE_ERROR_HARD_FAULT | EVT_TYPE_ERROR_WATCHDOG | EVT_TYPE_ERROR_ESD => Severity::Fatal,
    _ => Severity::Recoverable,
  }
}

/// Fixed-capacity ring of recently observed error events.
///
/// Cleared at the start of every reset attempt; consulted by the CRC audit
/// so error events siphoned while waiting for controller-ready are not lost.
pub(crate) struct ErrorLog {
  entries: [[u8; FIFO_EVENT_SIZE]; ERROR_LOG_DEPTH],
  head: usize,
  len: usize,
}

impl ErrorLog {
  pub(crate) fn new() -> Self {
    Self { entries: [[0; FIFO_EVENT_SIZE]; ERROR_LOG_DEPTH], head: 0, len: 0 }
  }

  pub(crate) fn clear(&mut self) {
    self.head = 0;
    self.len = 0;
  }

  pub(crate) fn push(&mut self, event: [u8; FIFO_EVENT_SIZE]) {
    self.entries[self.head] = event;
    self.head = (self.head + 1) % ERROR_LOG_DEPTH;
    self.len = (self.len + 1).min(ERROR_LOG_DEPTH);
  }

  /// Oldest-first scan for an error event whose type byte is in `types`.
  pub(crate) fn find_type(&self, types: &[u8]) -> Option<u8> {
    let start = (self.head + ERROR_LOG_DEPTH - self.len) % ERROR_LOG_DEPTH;
    (0..self.len)
      .map(|i| self.entries[(start + i) % ERROR_LOG_DEPTH])
      .find(|e| types.contains(&e[1]))
      .map(|e| e[1])
  }
}

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Poll the event FIFO until a frame matches `pattern` or `timeout_ms`
  /// elapses, sampling once per `TIMEOUT_RESOLUTION` interval.
  ///
  /// Error events seen along the way are logged, counted and classified; a
  /// fatal classification aborts immediately with
  /// [`Error::ControllerFault`]. An unsolicited controller-ready event
  /// (when the pattern is not waiting for one) sets both sticky reset
  /// flags as a side effect and is reported in the returned
  /// [`PolledEvent`]. A bus read failure aborts the loop; the poller never
  /// retries transport errors.
  pub async fn poll_for_event(
    &mut self,
    pattern: &EventPattern,
    timeout_ms: u32,
  ) -> Result<PolledEvent, Error<E>> {
    let attempts = (timeout_ms / TIMEOUT_RESOLUTION).max(1);
    let mut errors_seen: u8 = 0;
    let mut unsolicited = false;

    for _ in 0..attempts {
      let event = self.read_event().await?;

      if event[0] == EVT_ID_ERROR {
        warn!("error event = {:x}", event);
        errors_seen = errors_seen.saturating_add(1);
        self.error_log.push(event);
        if let Severity::Fatal = classify(&event) {
          warn!("controller fault {:#x} forces polling to stop", event[1]);
          return Err(Error::ControllerFault { code: event[1] });
        }
      } else {
        if event[0] != EVT_ID_NOEVENT {
          trace!("read event = {:x}", event);
        }
        if event[0] == EVT_ID_CONTROLLER_READY && pattern.leading() != Some(EVT_ID_CONTROLLER_READY) {
          debug!("unmanned controller-ready event, setting reset flags");
          self.reset_flags = ResetFlags { during_suspend: true, during_resume: true };
          unsolicited = true;
        }
      }

      if pattern.matches(&event) {
        trace!("found event = {:x}, {} errors swallowed", event, errors_seen);
        return Ok(PolledEvent { raw: event, errors_seen, unsolicited_reset: unsolicited });
      }

      self.delay.delay_ms(TIMEOUT_RESOLUTION).await;
    }

    warn!("no matching event within {} ms", timeout_ms);
    Err(Error::Timeout)
  }

  /// Search for an error event whose type byte is in `types`: first the
  /// in-driver error log, then the live FIFO within `GENERAL_TIMEOUT`.
  pub(crate) async fn poll_for_error_type(&mut self, types: &[u8]) -> Result<u8, Error<E>> {
    if let Some(code) = self.error_log.find_type(types) {
      return Ok(code);
    }
    let attempts = (GENERAL_TIMEOUT / TIMEOUT_RESOLUTION).max(1);
    for _ in 0..attempts {
      let event = self.read_event().await?;
      if event[0] == EVT_ID_ERROR {
        self.error_log.push(event);
        if types.contains(&event[1]) {
          return Ok(event[1]);
        }
      }
      self.delay.delay_ms(TIMEOUT_RESOLUTION).await;
    }
    Err(Error::Timeout)
  }
}
