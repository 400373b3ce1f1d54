use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use crate::defs::*;
use crate::event::EventPattern;
use crate::{Cause, Error, Fts};

/// Platform interrupt line for the controller's attention signal.
///
/// `embedded-hal` has no IRQ-masking abstraction, so the platform supplies
/// this seam. [`InterruptLine::mask_nosync`] must be callable from contexts
/// that cannot sleep (it must not wait for a running handler to finish);
/// platforms without that distinction can rely on the default forwarding to
/// [`InterruptLine::mask`].
pub trait InterruptLine {
  fn mask(&mut self);
  fn mask_nosync(&mut self) {
    self.mask();
  }
  fn unmask(&mut self);
}

impl<T: InterruptLine + ?Sized> InterruptLine for &mut T {
  fn mask(&mut self) {
    T::mask(self)
  }
  fn mask_nosync(&mut self) {
    T::mask_nosync(self)
  }
  fn unmask(&mut self) {
    T::unmask(self)
  }
}

/// Sticky flags recording that a reset (explicit or firmware-initiated)
/// happened. Suspend/resume logic consults and clears them to decide whether
/// device state must be restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetFlags {
  pub during_suspend: bool,
  pub during_resume: bool,
}

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Perform a system reset of the controller.
  ///
  /// Each of the up-to-[`RETRY_SYSTEM_RESET`] attempts clears the error log,
  /// masks interrupts via the no-sync path, drives the reset line low-high
  /// when one is wired (hardware reset) or writes the reset command to the
  /// control register (soft reset), then waits for the controller-ready
  /// event. On success both sticky reset flags are set. On exhaustion the
  /// returned [`Error::ResetFailed`] carries the last underlying cause.
  ///
  /// Interrupts are deliberately left masked on return; the caller decides
  /// when event handling may resume and calls [`Fts::enable_interrupts`].
  /// While the returned future is pending, [`Fts::is_resetting`] reports
  /// true; the future resolving is the completion signal.
  pub async fn system_reset(&mut self) -> Result<(), Error<E>> {
    info!("system resetting...");
    self.resetting = true;
    let mut outcome: Result<(), Cause<E>> = Err(Cause::Timeout);

    for attempt in 0..RETRY_SYSTEM_RESET {
      self.error_log.clear();
      self.disable_interrupts_nosync();

      let driven = if self.reset_pin.is_some() {
        self.pulse_reset_line().await
      } else {
        self
          .write_hw_register(ADDR_SYSTEM_RESET, &[SYSTEM_RESET_VALUE])
          .await
          .map_err(Cause::from)
      };
      if let Err(cause) = driven {
        warn!("reset drive failed on attempt {}", attempt + 1);
        outcome = Err(cause);
        continue;
      }

      let ready = EventPattern::exact(&[EVT_ID_CONTROLLER_READY]);
      match self.poll_for_event(&ready, GENERAL_TIMEOUT).await {
        Ok(_) => {
          outcome = Ok(());
          break;
        }
        Err(err) => {
          warn!("controller ready not seen on attempt {}", attempt + 1);
          outcome = Err(err.into());
        }
      }
    }

    self.resetting = false;
    match outcome {
      Ok(()) => {
        info!("system reset done");
        self.reset_flags = ResetFlags { during_suspend: true, during_resume: true };
        Ok(())
      }
      Err(cause) => Err(Error::ResetFailed(cause)),
    }
  }

  async fn pulse_reset_line(&mut self) -> Result<(), Cause<E>> {
    if let Some(pin) = self.reset_pin.as_mut() {
      pin.set_low().map_err(|_| Cause::Gpio)?;
      self.delay.delay_ms(RESET_PULSE_MS).await;
    }
    if let Some(pin) = self.reset_pin.as_mut() {
      pin.set_high().map_err(|_| Cause::Gpio)?;
    }
    Ok(())
  }

  /// Whether a reset sequence is currently in progress. Other components may
  /// consult this to defer operations that would race the reset.
  pub fn is_resetting(&self) -> bool {
    self.resetting
  }

  /// Current sticky reset flags.
  pub fn reset_flags(&self) -> ResetFlags {
    self.reset_flags
  }

  /// Overwrite the sticky reset flags. Suspend/resume logic clears the flag
  /// it consumed; the engine only ever sets them.
  pub fn set_reset_flags(&mut self, flags: ResetFlags) {
    self.reset_flags = flags;
  }

  /// Mask the interrupt line, incrementing the disable counter only on the
  /// 0 -> 1 transition so repeated calls never stack extra masks.
  pub fn disable_interrupts(&mut self) {
    debug!("interrupt disable, depth = {}", self.irq_disables);
    if self.irq_disables == 0 {
      self.irq.mask();
      self.irq_disables += 1;
    }
  }

  /// [`Fts::disable_interrupts`] variant safe for contexts that must not
  /// sleep: masks without waiting for a running handler, with the counter
  /// test-and-set under a critical section.
  pub fn disable_interrupts_nosync(&mut self) {
    critical_section::with(|_| {
      if self.irq_disables == 0 {
        self.irq.mask_nosync();
        self.irq_disables += 1;
      }
    });
  }

  /// Drain the disable counter to zero, unmasking the line as it drains.
  /// A no-op when the counter is already zero.
  pub fn enable_interrupts(&mut self) {
    debug!("interrupt enable, depth = {}", self.irq_disables);
    while self.irq_disables > 0 {
      self.irq.unmask();
      self.irq_disables -= 1;
    }
  }

  /// Zero the disable counter without touching the line. Used when the
  /// platform has already re-armed the interrupt out of band.
  pub fn reset_irq_depth(&mut self) {
    self.irq_disables = 0;
  }
}
