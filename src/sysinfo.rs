use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

use crate::defs::*;
use crate::{Error, Fts, HostData, InterruptLine};

/// Decoded snapshot of the controller's system-info record.
///
/// The firmware republishes the record after every system reset; the driver
/// re-parses it and overwrites this snapshot wholesale. The memory addresses
/// at the bottom locate the raw/filtered/strength/baseline data blocks other
/// subsystems read directly from the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemInfo {
  pub api_ver_rev: u16,
  pub api_ver_minor: u8,
  pub api_ver_major: u8,
  pub chip0_ver: u16,
  pub chip0_id: u16,
  pub chip1_ver: u16,
  pub chip1_id: u16,
  pub fw_ver: u16,
  pub svn_rev: u16,
  pub cfg_ver: u16,
  pub cfg_project_id: u16,
  pub cx_ver: u16,
  pub cx_project_id: u16,
  pub cfg_afe_ver: u8,
  pub cx_afe_ver: u8,
  pub panel_cfg_afe_ver: u8,
  /// Firmware protocol generation; drives the resolution transform below.
  pub protocol: u8,
  pub die_info: [u8; DIE_INFO_SIZE],
  pub release_info: [u8; RELEASE_INFO_SIZE],
  pub fw_crc: u32,
  pub cfg_crc: u32,
  /// Screen resolution, normalized so that `scr_res_x <= scr_res_y`.
  pub scr_res_x: u16,
  pub scr_res_y: u16,
  pub scr_tx_len: u8,
  pub scr_rx_len: u8,
  pub key_len: u8,
  pub force_len: u8,
  pub dbg_info_addr: u16,
  pub ms_tch_raw_addr: u16,
  pub ms_tch_filter_addr: u16,
  pub ms_tch_stren_addr: u16,
  pub ms_tch_baseline_addr: u16,
  pub ss_tch_tx_raw_addr: u16,
  pub ss_tch_tx_filter_addr: u16,
  pub ss_tch_tx_stren_addr: u16,
  pub ss_tch_tx_baseline_addr: u16,
  pub ss_tch_rx_raw_addr: u16,
  pub ss_tch_rx_filter_addr: u16,
  pub ss_tch_rx_stren_addr: u16,
  pub ss_tch_rx_baseline_addr: u16,
  pub key_raw_addr: u16,
  pub key_filter_addr: u16,
  pub key_stren_addr: u16,
  pub key_baseline_addr: u16,
  pub frc_raw_addr: u16,
  pub frc_filter_addr: u16,
  pub frc_stren_addr: u16,
  pub frc_baseline_addr: u16,
  pub ss_hvr_tx_raw_addr: u16,
  pub ss_hvr_tx_filter_addr: u16,
  pub ss_hvr_tx_stren_addr: u16,
  pub ss_hvr_tx_baseline_addr: u16,
  pub ss_hvr_rx_raw_addr: u16,
  pub ss_hvr_rx_filter_addr: u16,
  pub ss_hvr_rx_stren_addr: u16,
  pub ss_hvr_rx_baseline_addr: u16,
  pub ss_prx_tx_raw_addr: u16,
  pub ss_prx_tx_filter_addr: u16,
  pub ss_prx_tx_stren_addr: u16,
  pub ss_prx_tx_baseline_addr: u16,
  pub ss_prx_rx_raw_addr: u16,
  pub ss_prx_rx_filter_addr: u16,
  pub ss_prx_rx_stren_addr: u16,
  pub ss_prx_rx_baseline_addr: u16,
}

impl SystemInfo {
  /// Default fill applied when a parse fails. The 0xFF sentinel pattern
  /// marks "device unreachable" (bus failure); the all-zero pattern marks
  /// "device reachable but data invalid".
  pub(crate) fn invalid(bus_error: bool) -> Self {
    let mut info = Self::default();
    if bus_error {
      info.fw_ver = 0xFFFF;
      info.cfg_project_id = 0xFFFF;
      info.cx_ver = 0xFFFF;
      info.release_info = [0xFF; RELEASE_INFO_SIZE];
    }
    info
  }
}

/// Little-endian cursor over the fixed-layout record.
struct Reader<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> Reader<'a> {
  fn new(buf: &'a [u8]) -> Self {
    Self { buf, pos: 0 }
  }

  fn u8(&mut self) -> u8 {
    let v = self.buf[self.pos];
    self.pos += 1;
    v
  }

  fn u16(&mut self) -> u16 {
    let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
    self.pos += 2;
    v
  }

  fn u32(&mut self) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
    self.pos += 4;
    u32::from_le_bytes(bytes)
  }

  fn array<const N: usize>(&mut self) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
    self.pos += N;
    out
  }

  fn skip(&mut self, n: usize) {
    self.pos += n;
  }

  /// The walk must consume the record exactly; anything else means the wire
  /// layout and this decoder disagree.
  fn finish<E>(self) -> Result<(), Error<E>> {
    if self.pos != SYS_INFO_SIZE {
      warn!("parsed {} bytes, expected {}", self.pos, SYS_INFO_SIZE);
      return Err(Error::OffsetMismatch { parsed: self.pos });
    }
    Ok(())
  }
}

/// Decode a raw system-info record. Reserved gaps in the wire format are
/// stepped over exactly; the final cursor position must land on
/// `SYS_INFO_SIZE` or the record is declared skewed.
fn decode<E>(data: &[u8; SYS_INFO_SIZE]) -> Result<SystemInfo, Error<E>> {
  if data[0] != HEADER_SIGNATURE {
    warn!("wrong header signature: {:#x} != {:#x}", data[0], HEADER_SIGNATURE);
    return Err(Error::WrongSignature { found: data[0] });
  }
  if data[1] != HostData::SysInfo as u8 {
    warn!("wrong data type id: {:#x}", data[1]);
    return Err(Error::WrongDataType { found: data[1] });
  }

  let mut r = Reader::new(data);
  let mut info = SystemInfo::default();
  r.skip(4);

  info.api_ver_rev = r.u16();
  info.api_ver_minor = r.u8();
  info.api_ver_major = r.u8();
  info.chip0_ver = r.u16();
  info.chip0_id = r.u16();
  info.chip1_ver = r.u16();
  info.chip1_id = r.u16();
  info.fw_ver = r.u16();
  info.svn_rev = r.u16();
  info.cfg_ver = r.u16();
  info.cfg_project_id = r.u16();
  info.cx_ver = r.u16();
  info.cx_project_id = r.u16();
  info.cfg_afe_ver = r.u8();
  info.cx_afe_ver = r.u8();
  info.panel_cfg_afe_ver = r.u8();
  info.protocol = r.u8();
  info.die_info = r.array();
  info.release_info = r.array();
  info.fw_crc = r.u32();
  info.cfg_crc = r.u32();
  r.skip(8);

  info.scr_res_x = r.u16();
  info.scr_res_y = r.u16();
  if info.scr_res_x > info.scr_res_y {
    core::mem::swap(&mut info.scr_res_x, &mut info.scr_res_y);
  }
  if info.protocol == 6 {
    // Protocol-6 controllers report the resolution in units of ten; this is
    // a generation quirk, not a general rule. Computed widened, truncating
    // on the store back to the field width.
    info.scr_res_x = ((u32::from(info.scr_res_x) + 1) * 10 - 1) as u16;
    info.scr_res_y = ((u32::from(info.scr_res_y) + 1) * 10 - 1) as u16;
  }
  info.scr_tx_len = r.u8();
  info.scr_rx_len = r.u8();
  info.key_len = r.u8();
  info.force_len = r.u8();
  r.skip(40);

  info.dbg_info_addr = r.u16();
  r.skip(6);

  info.ms_tch_raw_addr = r.u16();
  info.ms_tch_filter_addr = r.u16();
  info.ms_tch_stren_addr = r.u16();
  info.ms_tch_baseline_addr = r.u16();
  info.ss_tch_tx_raw_addr = r.u16();
  info.ss_tch_tx_filter_addr = r.u16();
  info.ss_tch_tx_stren_addr = r.u16();
  info.ss_tch_tx_baseline_addr = r.u16();
  info.ss_tch_rx_raw_addr = r.u16();
  info.ss_tch_rx_filter_addr = r.u16();
  info.ss_tch_rx_stren_addr = r.u16();
  info.ss_tch_rx_baseline_addr = r.u16();
  info.key_raw_addr = r.u16();
  info.key_filter_addr = r.u16();
  info.key_stren_addr = r.u16();
  info.key_baseline_addr = r.u16();
  info.frc_raw_addr = r.u16();
  info.frc_filter_addr = r.u16();
  info.frc_stren_addr = r.u16();
  info.frc_baseline_addr = r.u16();
  info.ss_hvr_tx_raw_addr = r.u16();
  info.ss_hvr_tx_filter_addr = r.u16();
  info.ss_hvr_tx_stren_addr = r.u16();
  info.ss_hvr_tx_baseline_addr = r.u16();
  info.ss_hvr_rx_raw_addr = r.u16();
  info.ss_hvr_rx_filter_addr = r.u16();
  info.ss_hvr_rx_stren_addr = r.u16();
  info.ss_hvr_rx_baseline_addr = r.u16();
  info.ss_prx_tx_raw_addr = r.u16();
  info.ss_prx_tx_filter_addr = r.u16();
  info.ss_prx_tx_stren_addr = r.u16();
  info.ss_prx_tx_baseline_addr = r.u16();
  info.ss_prx_rx_raw_addr = r.u16();
  info.ss_prx_rx_filter_addr = r.u16();
  info.ss_prx_rx_stren_addr = r.u16();
  info.ss_prx_rx_baseline_addr = r.u16();

  r.finish()?;

  info!(
    "system info: fw = {:#x}, protocol = {}, resolution = {}x{}",
    info.fw_ver,
    info.protocol,
    info.scr_res_x,
    info.scr_res_y
  );
  Ok(info)
}

impl<SPI, E, RST, IRQ, D> Fts<SPI, RST, IRQ, D>
where
  SPI: SpiDevice<u8, Error = E>,
  RST: OutputPin,
  IRQ: InterruptLine,
  D: DelayNs,
{
  /// Read and decode the system-info record from the framebuffer.
  ///
  /// With `force_reload` the firmware is first asked to restage the record
  /// (routing through the sync-frame requester). The published snapshot is
  /// replaced atomically: on success with the decoded record, on any
  /// failure with a default fill chosen by the failure class (0xFF pattern
  /// for bus errors, zeros otherwise). A partial snapshot is never
  /// observable.
  pub async fn read_sys_info(&mut self, force_reload: bool) -> Result<&SystemInfo, Error<E>> {
    match self.fetch_sys_info(force_reload).await {
      Ok(info) => {
        self.info = info;
        Ok(&self.info)
      }
      Err(err) => {
        warn!("system info read failed, applying default fill");
        self.info = SystemInfo::invalid(err.is_bus());
        Err(err)
      }
    }
  }

  async fn fetch_sys_info(&mut self, force_reload: bool) -> Result<SystemInfo, Error<E>> {
    if force_reload {
      debug!("requesting a system info reload");
      self.request_sync_frame(HostData::SysInfo).await?;
    }
    debug!("reading system info record");
    let mut data = [0u8; SYS_INFO_SIZE];
    self.read_framebuffer(ADDR_FRAMEBUFFER, &mut data).await?;
    decode(&data)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mock::{MockDelay, MockIrq, MockPin, ScriptedBus};

  fn record(protocol: u8, res_x: u16, res_y: u16) -> Vec<u8> {
    let mut data = vec![0u8; SYS_INFO_SIZE];
    data[0] = HEADER_SIGNATURE;
    data[1] = HostData::SysInfo as u8;
    data[4..6].copy_from_slice(&0x0102u16.to_le_bytes()); // api rev
    data[6] = 3; // api minor
    data[7] = 4; // api major
    data[16..18].copy_from_slice(&0x2041u16.to_le_bytes()); // fw ver
    data[31] = protocol;
    for (i, b) in data[32..48].iter_mut().enumerate() {
      *b = i as u8; // die info
    }
    data[56..60].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes()); // fw crc
    data[72..74].copy_from_slice(&res_x.to_le_bytes());
    data[74..76].copy_from_slice(&res_y.to_le_bytes());
    data[76] = 16; // tx len
    data[77] = 34; // rx len
    data[128..130].copy_from_slice(&0x1234u16.to_le_bytes()); // ms raw addr
    data
  }

  fn as_array(data: Vec<u8>) -> [u8; SYS_INFO_SIZE] {
    data.try_into().unwrap()
  }

  #[test]
  fn resolution_is_normalized_width_le_height() {
    let info = decode::<()>(&as_array(record(4, 500, 300))).unwrap();
    assert_eq!((info.scr_res_x, info.scr_res_y), (300, 500));
  }

  #[test]
  fn protocol_6_rescales_both_axes() {
    let info = decode::<()>(&as_array(record(6, 500, 300))).unwrap();
    assert_eq!((info.scr_res_x, info.scr_res_y), ((300 + 1) * 10 - 1, (500 + 1) * 10 - 1));
  }

  #[test]
  fn protocol_6_rescale_widens_before_the_store() {
    // (6553 + 1) * 10 - 1 = 65539 does not fit a u16; the transform computes
    // widened and truncates on the store instead of overflowing.
    let info = decode::<()>(&as_array(record(6, 6553, 300))).unwrap();
    assert_eq!(info.scr_res_x, (300 + 1) * 10 - 1);
    assert_eq!(info.scr_res_y, 65539u32 as u16);
  }

  #[test]
  fn partially_consumed_record_fails_with_offset_mismatch() {
    let data = record(4, 300, 500);
    let mut r = Reader::new(&data);
    r.skip(SYS_INFO_SIZE - 2);
    assert_eq!(
      r.finish::<()>(),
      Err(Error::OffsetMismatch { parsed: SYS_INFO_SIZE - 2 })
    );
  }

  #[test]
  fn fully_consumed_record_passes_the_offset_check() {
    let data = record(4, 300, 500);
    let mut r = Reader::new(&data);
    r.skip(SYS_INFO_SIZE);
    assert_eq!(r.finish::<()>(), Ok(()));
  }

  #[test]
  fn fields_land_on_their_wire_offsets() {
    let info = decode::<()>(&as_array(record(4, 300, 500))).unwrap();
    assert_eq!(info.api_ver_rev, 0x0102);
    assert_eq!(info.api_ver_minor, 3);
    assert_eq!(info.api_ver_major, 4);
    assert_eq!(info.fw_ver, 0x2041);
    assert_eq!(info.fw_crc, 0xDEAD_BEEF);
    assert_eq!(info.die_info[5], 5);
    assert_eq!((info.scr_tx_len, info.scr_rx_len), (16, 34));
    assert_eq!(info.ms_tch_raw_addr, 0x1234);
  }

  #[test]
  fn wrong_signature_and_data_type_are_distinct_errors() {
    let mut bad_sign = record(4, 300, 500);
    bad_sign[0] = 0x11;
    assert_eq!(
      decode::<()>(&as_array(bad_sign)),
      Err(Error::WrongSignature { found: 0x11 })
    );

    let mut bad_type = record(4, 300, 500);
    bad_type[1] = 0x55;
    assert_eq!(
      decode::<()>(&as_array(bad_type)),
      Err(Error::WrongDataType { found: 0x55 })
    );
  }

  #[tokio::test]
  async fn published_snapshot_survives_only_full_parses() {
    let mut bus = ScriptedBus::new();
    bus.framebuffer = record(4, 300, 500);
    let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
    let info = fts.read_sys_info(false).await.unwrap();
    assert_eq!(info.fw_ver, 0x2041);
    assert_eq!(fts.system_info().fw_ver, 0x2041);
  }

  #[tokio::test]
  async fn invalid_record_publishes_the_zero_fill() {
    let mut bus = ScriptedBus::new();
    bus.framebuffer = {
      let mut r = record(4, 300, 500);
      r[0] = 0x11;
      r
    };
    let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
    assert!(matches!(
      fts.read_sys_info(false).await,
      Err(Error::WrongSignature { found: 0x11 })
    ));
    assert_eq!(fts.system_info().fw_ver, 0x0000);
    assert_eq!(fts.system_info().release_info, [0u8; RELEASE_INFO_SIZE]);
  }

  #[tokio::test]
  async fn bus_failure_publishes_the_sentinel_fill() {
    let mut bus = ScriptedBus::new();
    bus.fail_reads = true;
    let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
    assert!(matches!(fts.read_sys_info(false).await, Err(Error::BusRead(_))));
    assert_eq!(fts.system_info().fw_ver, 0xFFFF);
    assert_eq!(fts.system_info().cx_ver, 0xFFFF);
    assert_eq!(fts.system_info().release_info, [0xFF; RELEASE_INFO_SIZE]);
    assert_eq!(fts.system_info().scr_tx_len, 0);
  }

  #[tokio::test]
  async fn force_reload_requests_the_record_first() {
    let mut bus = ScriptedBus::new();
    bus.framebuffer = record(4, 300, 500);
    // Splice a valid sync-frame counter header in front of the record bytes:
    // the record already starts with [signature, SysInfo], and bytes 2..4
    // (reserved in the record) double as the frame counter.
    bus.bump_count_on_request = true;
    {
      let mut fts = crate::Fts::new(&mut bus, None::<MockPin>, MockIrq::default(), MockDelay::default());
      fts.read_sys_info(true).await.unwrap();
    }
    assert_eq!(bus.writes[0], vec![FTS_CMD_SYSTEM, SysCmd::LoadData as u8, HostData::SysInfo as u8]);
  }
}
