//! Scripted bus and peripheral doubles shared by the unit tests.

use std::collections::VecDeque;
use std::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::{ErrorKind, Operation, SpiDevice};

use crate::defs::*;

/// Transport error injected by the scripted bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

impl embedded_hal::spi::Error for BusFault {
  fn kind(&self) -> ErrorKind {
    ErrorKind::Other
  }
}

/// One-frame event with the given class and type bytes.
pub fn fifo_event(class: u8, ty: u8) -> [u8; FIFO_EVENT_SIZE] {
  let mut frame = [0u8; FIFO_EVENT_SIZE];
  frame[0] = class;
  frame[1] = ty;
  frame
}

/// Echo event the firmware would emit after accepting `cmd`.
pub fn echo_event(cmd: &[u8]) -> [u8; FIFO_EVENT_SIZE] {
  let mut frame = [0u8; FIFO_EVENT_SIZE];
  frame[0] = EVT_ID_STATUS_UPDATE;
  frame[1] = EVT_TYPE_STATUS_ECHO;
  let take = cmd.len().min(FIFO_EVENT_SIZE - 2);
  frame[2..2 + take].copy_from_slice(&cmd[..take]);
  frame
}

/// SPI device double scripted through public fields.
///
/// Reads are answered from the opcode: the FIFO opcode pops the scripted
/// event queue (an empty queue yields no-event frames), the framebuffer
/// opcode serves `framebuffer` at the addressed offset and the hardware
/// register opcode serves `crc_status`. Pure writes are recorded verbatim
/// in `writes`.
pub struct ScriptedBus {
  pub events: VecDeque<[u8; FIFO_EVENT_SIZE]>,
  pub framebuffer: Vec<u8>,
  pub crc_status: u8,
  pub fail_reads: bool,
  pub fail_writes: bool,
  /// Queue a controller-ready event when the soft-reset register is written.
  pub ready_on_reset: bool,
  /// Bump the frame counter in `framebuffer` when a load-data request lands.
  pub bump_count_on_request: bool,
  pub fifo_reads: usize,
  pub writes: Vec<Vec<u8>>,
}

impl ScriptedBus {
  pub fn new() -> Self {
    Self {
      events: VecDeque::new(),
      framebuffer: vec![0; DATA_HEADER],
      crc_status: 0,
      fail_reads: false,
      fail_writes: false,
      ready_on_reset: false,
      bump_count_on_request: false,
      fifo_reads: 0,
      writes: Vec::new(),
    }
  }

  pub fn push_event(&mut self, event: [u8; FIFO_EVENT_SIZE]) {
    self.events.push_back(event);
  }

  fn response_for(&mut self, cmd: &[u8]) -> Vec<u8> {
    match cmd[0] {
      FIFO_CMD_READONE => {
        self.fifo_reads += 1;
        let frame = self.events.pop_front().unwrap_or([EVT_ID_NOEVENT; FIFO_EVENT_SIZE]);
        let mut response = vec![0u8; DUMMY_FIFO];
        response.extend_from_slice(&frame);
        response
      }
      FTS_CMD_FRAMEBUFFER_R => {
        let addr = usize::from(u16::from_be_bytes([cmd[1], cmd[2]]));
        let mut response = vec![0u8; DUMMY_FRAMEBUFFER];
        response.extend_from_slice(&self.framebuffer[addr.min(self.framebuffer.len())..]);
        response
      }
      FTS_CMD_HW_REG_R => {
        let mut response = vec![0u8; DUMMY_HW_REG];
        response.push(self.crc_status);
        response
      }
      _ => Vec::new(),
    }
  }
}

impl embedded_hal_async::spi::ErrorType for ScriptedBus {
  type Error = BusFault;
}

impl SpiDevice<u8> for ScriptedBus {
  async fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), BusFault> {
    let mut cmd = Vec::new();
    let mut has_reads = false;
    for op in operations.iter() {
      match op {
        Operation::Write(bytes) => cmd.extend_from_slice(bytes),
        Operation::Read(_) => has_reads = true,
        _ => {}
      }
    }

    if has_reads {
      if self.fail_reads {
        return Err(BusFault);
      }
      let response = self.response_for(&cmd);
      let mut pos = 0;
      for op in operations.iter_mut() {
        if let Operation::Read(out) = op {
          for slot in out.iter_mut() {
            *slot = response.get(pos).copied().unwrap_or(0);
            pos += 1;
          }
        }
      }
      return Ok(());
    }

    if self.fail_writes {
      return Err(BusFault);
    }
    if self.ready_on_reset && cmd[0] == FTS_CMD_HW_REG_W {
      self.push_event(fifo_event(EVT_ID_CONTROLLER_READY, 0));
    }
    if self.bump_count_on_request
      && cmd.len() >= 2
      && cmd[0] == FTS_CMD_SYSTEM
      && cmd[1] == SysCmd::LoadData as u8
    {
      let count = u16::from_le_bytes([self.framebuffer[2], self.framebuffer[3]]).wrapping_add(1);
      self.framebuffer[2..4].copy_from_slice(&count.to_le_bytes());
    }
    self.writes.push(cmd);
    Ok(())
  }
}

/// Delay double counting calls instead of sleeping.
#[derive(Default)]
pub struct MockDelay {
  pub sleeps: u32,
  pub slept_ms: u64,
}

impl DelayNs for MockDelay {
  async fn delay_ns(&mut self, ns: u32) {
    self.sleeps += 1;
    self.slept_ms += u64::from(ns) / 1_000_000;
  }

  async fn delay_ms(&mut self, ms: u32) {
    self.sleeps += 1;
    self.slept_ms += u64::from(ms);
  }
}

/// Reset line double recording every driven level.
#[derive(Default)]
pub struct MockPin {
  pub levels: Vec<bool>,
}

impl embedded_hal::digital::ErrorType for MockPin {
  type Error = Infallible;
}

impl OutputPin for MockPin {
  fn set_low(&mut self) -> Result<(), Infallible> {
    self.levels.push(false);
    Ok(())
  }

  fn set_high(&mut self) -> Result<(), Infallible> {
    self.levels.push(true);
    Ok(())
  }
}

/// Interrupt line double tracking mask state and call counts.
#[derive(Default)]
pub struct MockIrq {
  pub masked: bool,
  pub masks: u32,
  pub nosync_masks: u32,
  pub unmasks: u32,
}

impl crate::InterruptLine for MockIrq {
  fn mask(&mut self) {
    self.masked = true;
    self.masks += 1;
  }

  fn mask_nosync(&mut self) {
    self.masked = true;
    self.nosync_masks += 1;
  }

  fn unmask(&mut self) {
    self.masked = false;
    self.unmasks += 1;
  }
}
