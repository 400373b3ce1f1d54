use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use crate::defs::*;
use crate::{Error, Fts, InterruptLine};

/// Generator polynomial used by the firmware for all CRC-8 checksums.
const CRC8_POLYNOMIAL: u8 = 0x9B;

const CRC_CFG_ERRORS: [u8; 2] = [EVT_TYPE_ERROR_CRC_CFG_HEAD, EVT_TYPE_ERROR_CRC_CFG];
const CRC_CX_ERRORS: [u8; 4] = [
  EVT_TYPE_ERROR_CRC_CX,
  EVT_TYPE_ERROR_CRC_CX_HEAD,
  EVT_TYPE_ERROR_CRC_CX_SUB,
  EVT_TYPE_ERROR_CRC_CX_SUB_HEAD,
];

/// Result of the CRC status audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrcOutcome {
  /// No integrity error reported.
  Clean,
  /// The CRC status register itself flags an error; no further diagnosis
  /// was attempted.
  Status { bits: u8 },
  /// The post-reset error stream carries a configuration-CRC error.
  Config { code: u8 },
  /// The post-reset error stream carries a compensation-data CRC error.
  Cx { code: u8 },
}

/// Bit-serial CRC-8 over `data`, MSB first, polynomial 0x9B, initial
/// remainder zero. Fails with [`Error::InvalidArgument`] on an empty buffer.
pub fn compute_crc8(data: &[u8]) -> Result<u8, Error> {
  if data.is_empty() {
    return Err(Error::InvalidArgument);
  }
  let mut remainder: u8 = 0;
  for &byte in data {
    remainder ^= byte;
    for _ in 0..8 {
      remainder = if remainder & 0x80 != 0 {
        (remainder << 1) ^ CRC8_POLYNOMIAL
      } else {
        remainder << 1
      };
    }
  }
  Ok(remainder)
}

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Check whether a CRC error in the controller prevents the firmware from
  /// running, and if so which data block is corrupted.
  ///
  /// The status register gives the cheap answer; when its masked bits are
  /// clean, a full system reset is performed and the post-reset error
  /// stream is searched first for configuration-CRC errors, then for
  /// compensation (Cx) CRC errors, returning the most specific outcome
  /// found.
  pub async fn crc_status_check(&mut self) -> Result<CrcOutcome, Error<E>> {
    let mut value = [0u8; 1];
    self.read_hw_register(ADDR_CRC, &mut value).await?;
    let status = value[0] & CRC_MASK;
    if status != 0 {
      warn!("crc status register reports {:#x}", status);
      return Ok(CrcOutcome::Status { bits: status });
    }

    debug!("crc status clean, verifying over a fresh reset");
    self.system_reset().await?;

    match self.poll_for_error_type(&CRC_CFG_ERRORS).await {
      Ok(code) => {
        warn!("config crc error {:#x}", code);
        Ok(CrcOutcome::Config { code })
      }
      Err(Error::Timeout) => match self.poll_for_error_type(&CRC_CX_ERRORS).await {
        Ok(code) => {
          warn!("cx crc error {:#x}", code);
          Ok(CrcOutcome::Cx { code })
        }
        Err(Error::Timeout) => {
          debug!("no crc error event found");
          Ok(CrcOutcome::Clean)
        }
        Err(err) => Err(err),
      },
      Err(err) => Err(err),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mock::{fifo_event, MockDelay, MockIrq, MockPin, ScriptedBus};

  #[test]
  fn crc8_matches_known_vectors() {
    assert_eq!(compute_crc8(&[0x01]), Ok(0x9B));
    assert_eq!(compute_crc8(&[0xA5, 0x5A]), Ok(0x42));
    assert_eq!(compute_crc8(b"123456789"), Ok(0xEA));
    assert_eq!(compute_crc8(&[0xDE, 0xAD, 0xBE, 0xEF]), Ok(0xD8));
  }

  #[test]
  fn crc8_is_deterministic() {
    let data = [0x10, 0x20, 0x30, 0x40];
    assert_eq!(compute_crc8(&data), compute_crc8(&data));
  }

  #[test]
  fn crc8_rejects_an_empty_buffer() {
    assert_eq!(compute_crc8(&[]), Err(Error::InvalidArgument));
  }

  #[tokio::test]
  async fn dirty_status_register_short_circuits() {
    let mut bus = ScriptedBus::new();
    bus.crc_status = 0x02;
    {
      let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
      assert_eq!(fts.crc_status_check().await, Ok(CrcOutcome::Status { bits: 0x02 }));
    }
    // No reset was attempted.
    assert!(bus.writes.iter().all(|w| w[0] != FTS_CMD_HW_REG_W));
  }

  #[tokio::test]
  async fn config_crc_error_found_in_post_reset_stream() {
    let mut bus = ScriptedBus::new();
    bus.ready_on_reset = true;
    // Emitted before the ready event: siphoned into the error log during
    // the reset wait, then found by the audit.
    bus.push_event(fifo_event(EVT_ID_ERROR, EVT_TYPE_ERROR_CRC_CFG));
    let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
    assert_eq!(
      fts.crc_status_check().await,
      Ok(CrcOutcome::Config { code: EVT_TYPE_ERROR_CRC_CFG })
    );
  }

  #[tokio::test]
  async fn cx_crc_error_is_only_reported_without_config_error() {
    let mut bus = ScriptedBus::new();
    bus.ready_on_reset = true;
    bus.push_event(fifo_event(EVT_ID_ERROR, EVT_TYPE_ERROR_CRC_CX_SUB));
    let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
    assert_eq!(
      fts.crc_status_check().await,
      Ok(CrcOutcome::Cx { code: EVT_TYPE_ERROR_CRC_CX_SUB })
    );
  }

  #[tokio::test]
  async fn clean_stream_reports_clean() {
    let mut bus = ScriptedBus::new();
    bus.ready_on_reset = true;
    let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
    assert_eq!(fts.crc_status_check().await, Ok(CrcOutcome::Clean));
  }
}
