use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::{Operation, SpiDevice};

use crate::defs::*;
use crate::{Error, Fts, InterruptLine};

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Write `data` to a register: one transaction of
  /// `[opcode, address (big-endian, `addr_bytes` wide), data...]`.
  pub(crate) async fn write_register(
    &mut self,
    opcode: u8,
    addr_bytes: usize,
    address: u32,
    data: &[u8],
  ) -> Result<(), Error<E>> {
    let total = 1 + addr_bytes + data.len();
    if total > MAX_CMD_SIZE {
      return Err(Error::InvalidArgument);
    }
    let mut buf = [0u8; MAX_CMD_SIZE];
    buf[0] = opcode;
    let addr = address.to_be_bytes();
    buf[1..1 + addr_bytes].copy_from_slice(&addr[4 - addr_bytes..]);
    buf[1 + addr_bytes..total].copy_from_slice(data);
    self.spi.write(&buf[..total]).await.map_err(Error::BusWrite)
  }

  /// Read a register: write the `[opcode, address]` header, skip `dummy`
  /// turnaround bytes, then clock `out.len()` payload bytes, all in one
  /// transaction.
  pub(crate) async fn read_register(
    &mut self,
    opcode: u8,
    addr_bytes: usize,
    address: u32,
    out: &mut [u8],
    dummy: usize,
  ) -> Result<(), Error<E>> {
    let mut header = [0u8; 5];
    header[0] = opcode;
    let addr = address.to_be_bytes();
    header[1..1 + addr_bytes].copy_from_slice(&addr[4 - addr_bytes..]);
    let header = &header[..1 + addr_bytes];

    let mut skip = [0u8; 4];
    if dummy > 0 {
      let mut ops = [
        Operation::Write(header),
        Operation::Read(&mut skip[..dummy]),
        Operation::Read(out),
      ];
      self.spi.transaction(&mut ops).await.map_err(Error::BusRead)
    } else {
      let mut ops = [Operation::Write(header), Operation::Read(out)];
      self.spi.transaction(&mut ops).await.map_err(Error::BusRead)
    }
  }

  /// Raw firmware command write, no address framing. The payload must have
  /// been staged in a plain buffer by the caller (the DMA-safe write of the
  /// reference driver).
  pub(crate) async fn write_command(&mut self, cmd: &[u8]) -> Result<(), Error<E>> {
    if cmd.is_empty() || cmd.len() > MAX_CMD_SIZE {
      return Err(Error::InvalidArgument);
    }
    self.spi.write(cmd).await.map_err(Error::BusWrite)
  }

  /// Pop one event frame from the FIFO.
  pub(crate) async fn read_event(&mut self) -> Result<[u8; FIFO_EVENT_SIZE], Error<E>> {
    let mut event = [0u8; FIFO_EVENT_SIZE];
    self.read_register(FIFO_CMD_READONE, 0, 0, &mut event, DUMMY_FIFO).await?;
    Ok(event)
  }

  pub(crate) async fn read_framebuffer(&mut self, address: u16, out: &mut [u8]) -> Result<(), Error<E>> {
    self.read_register(FTS_CMD_FRAMEBUFFER_R, BITS_16, u32::from(address), out, DUMMY_FRAMEBUFFER).await
  }

  pub(crate) async fn read_hw_register(&mut self, address: u32, out: &mut [u8]) -> Result<(), Error<E>> {
    self.read_register(FTS_CMD_HW_REG_R, ADDR_SIZE_HW_REG, address, out, DUMMY_HW_REG).await
  }

  pub(crate) async fn write_hw_register(&mut self, address: u32, data: &[u8]) -> Result<(), Error<E>> {
    self.write_register(FTS_CMD_HW_REG_W, ADDR_SIZE_HW_REG, address, data).await
  }

  /// Read `out.len()` bytes from the config memory starting at `offset`.
  pub async fn read_config(&mut self, offset: u16, out: &mut [u8]) -> Result<(), Error<E>> {
    let address = ADDR_CONFIG_OFFSET + u32::from(offset);
    trace!("reading config memory at {:#x}", address);
    self.read_register(FTS_CMD_CONFIG_R, BITS_16, address, out, DUMMY_CONFIG).await
  }
}
