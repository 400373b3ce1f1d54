use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use crate::defs::*;
use crate::{Cause, Error, Fts, InterruptLine};

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Ask the firmware to stage a host-data frame and wait until it is ready.
  ///
  /// Readiness is inferred from the monotonically incrementing frame counter
  /// in the framebuffer header: the counter is sampled as a baseline, the
  /// request is written, then the header is re-read at the polling interval
  /// until the counter moves. A timed-out or unreadable baseline restarts
  /// the whole attempt from a fresh baseline, since the firmware may have
  /// produced an intervening frame. Exhausting all attempts fails with
  /// [`Error::RequestDataFailed`] wrapping the last cause.
  pub async fn request_sync_frame(&mut self, kind: HostData) -> Result<(), Error<E>> {
    debug!("requesting sync frame {:#x}", kind as u8);
    let request = [FTS_CMD_SYSTEM, SysCmd::LoadData as u8, kind as u8];
    let mut last: Cause<E> = Cause::Timeout;

    for attempt in 0..RETRY_MAX_REQU_DATA {
      let mut header = [0u8; DATA_HEADER];
      if let Err(err) = self.read_framebuffer(ADDR_FRAMEBUFFER, &mut header).await {
        warn!("cannot read frame counter on attempt {}", attempt + 1);
        last = err.into();
        continue;
      }
      if header[0] != HEADER_SIGNATURE {
        warn!("invalid header signature {:#x} while reading frame counter", header[0]);
        last = Cause::Signature;
        continue;
      }
      let baseline = u16::from_le_bytes([header[2], header[3]]);
      trace!("base frame count = {}", baseline);

      if let Err(err) = self.write_command(&request).await {
        last = err.into();
        continue;
      }

      let budget = (TIMEOUT_REQU_DATA / TIMEOUT_RESOLUTION).max(1);
      let mut current = baseline;
      for _ in 0..budget {
        match self.read_framebuffer(ADDR_FRAMEBUFFER, &mut header).await {
          Ok(()) if header[0] == HEADER_SIGNATURE => {
            current = u16::from_le_bytes([header[2], header[3]]);
          }
          // Transient bad reads keep the baseline; the attempt only fails
          // once the inner budget is spent.
          _ => trace!("unreadable frame-count header, keeping previous count"),
        }
        if current != baseline {
          debug!("new frame count = {}, frame ready", current);
          return Ok(());
        }
        self.delay.delay_ms(TIMEOUT_RESOLUTION).await;
      }
      warn!("frame count unchanged on attempt {}", attempt + 1);
      last = Cause::Timeout;
    }

    Err(Error::RequestDataFailed(last))
  }
}
