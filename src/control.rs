use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use crate::defs::*;
use crate::event::EventPattern;
use crate::{Cause, Error, Fts, InterruptLine};

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Select the scanning mode. Low-power mode carries no settings byte.
  pub async fn set_scan_mode(&mut self, mode: ScanMode) -> Result<(), Error<E>> {
    debug!("setting scan mode");
    match mode {
      ScanMode::Active { channels } => {
        self.write_command(&[FTS_CMD_SCAN_MODE, SCAN_MODE_ACTIVE, channels]).await
      }
      ScanMode::LowPower => self.write_command(&[FTS_CMD_SCAN_MODE, SCAN_MODE_LOW_POWER]).await,
    }
  }

  /// Enable or tune a firmware feature. `settings` is the feature-specific
  /// option block, e.g. a gesture mask.
  pub async fn set_feature(&mut self, feature: Feature, settings: &[u8]) -> Result<(), Error<E>> {
    debug!("setting feature {:#x}", feature as u8);
    if 2 + settings.len() > MAX_CMD_SIZE {
      return Err(Error::InvalidArgument);
    }
    let mut cmd = [0u8; MAX_CMD_SIZE];
    cmd[0] = FTS_CMD_FEATURE;
    cmd[1] = feature as u8;
    cmd[2..2 + settings.len()].copy_from_slice(settings);
    self.write_command(&cmd[..2 + settings.len()]).await
  }

  /// Write a system command and verify the firmware echoed it back.
  ///
  /// [`SysCmd::LoadData`] is special-cased: its semantics are "stage a host
  /// data frame", signalled by a changing frame counter rather than a
  /// literal echo, so it routes through [`Fts::request_sync_frame`] with
  /// `settings[0]` naming the data block.
  pub async fn write_system_command(&mut self, cmd: SysCmd, settings: &[u8]) -> Result<(), Error<E>> {
    if cmd == SysCmd::LoadData {
      let ty = settings.first().copied().ok_or(Error::InvalidArgument)?;
      let ty = HostData::from_byte(ty).ok_or(Error::InvalidArgument)?;
      return self.request_sync_frame(ty).await;
    }
    if 2 + settings.len() > MAX_CMD_SIZE {
      return Err(Error::InvalidArgument);
    }
    let mut buf = [0u8; MAX_CMD_SIZE];
    buf[0] = FTS_CMD_SYSTEM;
    buf[1] = cmd as u8;
    buf[2..2 + settings.len()].copy_from_slice(settings);
    let len = 2 + settings.len();
    debug!("writing system command {:#x}", cmd as u8);
    self.write_command(&buf[..len]).await?;
    self.check_echo(&buf[..len]).await
  }

  /// Wait for the echo event confirming the firmware received `cmd`.
  ///
  /// The echo pattern is `[status-update, echo, cmd bytes...]`, truncated so
  /// the final event byte is never constrained; the firmware is free to put
  /// anything there. The check is stricter than a plain poll: an echo that
  /// matched but was preceded by any error event still fails, because error
  /// traffic around an echo means the command state is unreliable.
  pub async fn check_echo(&mut self, cmd: &[u8]) -> Result<(), Error<E>> {
    if cmd.is_empty() {
      return Err(Error::InvalidArgument);
    }
    let take = cmd.len().min(FIFO_EVENT_SIZE - 3);
    let mut positions = [None; FIFO_EVENT_SIZE];
    positions[0] = Some(EVT_ID_STATUS_UPDATE);
    positions[1] = Some(EVT_TYPE_STATUS_ECHO);
    for (slot, byte) in positions[2..2 + take].iter_mut().zip(cmd) {
      *slot = Some(*byte);
    }
    let pattern = EventPattern::new(&positions[..2 + take]);

    match self.poll_for_event(&pattern, TIMEOUT_ECHO).await {
      Ok(polled) if polled.errors_seen == 0 => {
        trace!("echo ok");
        Ok(())
      }
      Ok(polled) => {
        warn!("echo found, but {} error events preceded it", polled.errors_seen);
        Err(Error::EchoCheckFailed(Cause::DirtyEcho(polled.errors_seen)))
      }
      Err(err) => {
        warn!("echo event not found");
        Err(Error::EchoCheckFailed(err.into()))
      }
    }
  }
}
