/******************************************************************************
 * Refer to the STMicroelectronics FingerTipS (FTS) programming guide for     *
 * details on the register-access framing and the event FIFO.                 *
 * ========================================================================== *
 *                     FTS - Opcodes, Addresses & Event IDs                   *
*******************************************************************************/

/// Size in bytes of one FIFO event frame.
pub const FIFO_EVENT_SIZE: usize = 8;

// Register-access opcodes. Every bus transaction starts with one of these,
// followed by a big-endian address of the width given alongside.
pub(crate) const FTS_CMD_SCAN_MODE: u8 = 0xA0;
pub(crate) const FTS_CMD_FEATURE: u8 = 0xA2;
pub(crate) const FTS_CMD_SYSTEM: u8 = 0xA4;
pub(crate) const FTS_CMD_FRAMEBUFFER_R: u8 = 0xA6;
pub(crate) const FTS_CMD_CONFIG_R: u8 = 0xA8;
pub(crate) const FTS_CMD_HW_REG_R: u8 = 0xFA;
pub(crate) const FTS_CMD_HW_REG_W: u8 = 0xFB;
pub(crate) const FIFO_CMD_READONE: u8 = 0x87;

// Address widths in bytes.
pub(crate) const BITS_16: usize = 2;
pub(crate) const ADDR_SIZE_HW_REG: usize = 4;

// Hardware register addresses.
pub(crate) const ADDR_SYSTEM_RESET: u32 = 0x2000_0024;
pub(crate) const ADDR_CRC: u32 = 0x2000_0078;
pub(crate) const ADDR_FRAMEBUFFER: u16 = 0x0000;
pub(crate) const ADDR_CONFIG_OFFSET: u32 = 0x8000;

// Scan mode selectors (byte 1 of a scan-mode command).
pub(crate) const SCAN_MODE_ACTIVE: u8 = 0x00;
pub(crate) const SCAN_MODE_LOW_POWER: u8 = 0x01;

pub(crate) const SYSTEM_RESET_VALUE: u8 = 0x80;
/// Bits of the CRC status register that flag a code/config integrity failure.
pub(crate) const CRC_MASK: u8 = 0x03;

// Dummy bytes preceding the payload on SPI reads.
pub(crate) const DUMMY_FIFO: usize = 1;
pub(crate) const DUMMY_FRAMEBUFFER: usize = 1;
pub(crate) const DUMMY_CONFIG: usize = 1;
pub(crate) const DUMMY_HW_REG: usize = 1;

// Event IDs (byte 0 of a FIFO frame).
pub(crate) const EVT_ID_NOEVENT: u8 = 0x00;
pub(crate) const EVT_ID_CONTROLLER_READY: u8 = 0x03;
pub(crate) const EVT_ID_STATUS_UPDATE: u8 = 0x43;
pub(crate) const EVT_ID_ERROR: u8 = 0xF3;

// Status-update event types (byte 1 when byte 0 is EVT_ID_STATUS_UPDATE).
pub(crate) const EVT_TYPE_STATUS_ECHO: u8 = 0x01;

// Error event types (byte 1 when byte 0 is EVT_ID_ERROR).
pub(crate) const EVT_TYPE_ERROR_HARD_FAULT: u8 = 0x01;
pub(crate) const EVT_TYPE_ERROR_WATCHDOG: u8 = 0x06;
pub(crate) const EVT_TYPE_ERROR_ESD: u8 = 0x0A;
pub(crate) const EVT_TYPE_ERROR_CRC_CFG_HEAD: u8 = 0x21;
pub(crate) const EVT_TYPE_ERROR_CRC_CFG: u8 = 0x22;
pub(crate) const EVT_TYPE_ERROR_CRC_CX: u8 = 0x23;
pub(crate) const EVT_TYPE_ERROR_CRC_CX_HEAD: u8 = 0x24;
pub(crate) const EVT_TYPE_ERROR_CRC_CX_SUB: u8 = 0x25;
pub(crate) const EVT_TYPE_ERROR_CRC_CX_SUB_HEAD: u8 = 0x26;

// Host-data framing.
pub(crate) const HEADER_SIGNATURE: u8 = 0xA5;
pub(crate) const DATA_HEADER: usize = 4;

// System-info record geometry.
pub(crate) const SYS_INFO_SIZE: usize = 200;
pub(crate) const DIE_INFO_SIZE: usize = 16;
pub(crate) const RELEASE_INFO_SIZE: usize = 8;

// Timeouts (milliseconds) and retry budgets.
pub(crate) const TIMEOUT_RESOLUTION: u32 = 10;
pub(crate) const GENERAL_TIMEOUT: u32 = 5000;
pub(crate) const TIMEOUT_ECHO: u32 = 500;
pub(crate) const TIMEOUT_REQU_DATA: u32 = 2000;
pub(crate) const RETRY_SYSTEM_RESET: u32 = 3;
pub(crate) const RETRY_MAX_REQU_DATA: u32 = 2;
pub(crate) const RESET_PULSE_MS: u32 = 10;

/// Depth of the in-driver ring of recently observed error events.
pub(crate) const ERROR_LOG_DEPTH: usize = 8;

// Largest command the firmware accepts in one write (opcode + payload).
pub(crate) const MAX_CMD_SIZE: usize = 32;

/// Scan mode selection written with [`crate::Fts::set_scan_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanMode {
  /// Full-rate scanning; `channels` is the active-mode bitmask.
  Active { channels: u8 },
  /// Reduced-rate scanning for idle/doze operation.
  LowPower,
}

/// Feature toggled with [`crate::Fts::set_feature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Feature {
  GloveMode = 0x01,
  CoverMode = 0x02,
  ChargerMode = 0x03,
  GestureMode = 0x04,
  GripDetection = 0x05,
}

/// System command subcode written with [`crate::Fts::write_system_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SysCmd {
  Special = 0x00,
  Interrupt = 0x01,
  ForceCalibration = 0x02,
  CxTuning = 0x03,
  ItoTest = 0x04,
  /// Stage host data; routed through the sync-frame requester, since the
  /// firmware signals completion by bumping a frame counter instead of
  /// echoing the command.
  LoadData = 0x05,
}

/// Host-data block the firmware can stage for [`crate::Fts::request_sync_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HostData {
  SysInfo = 0x01,
  CxMutual = 0x10,
  CxSelf = 0x11,
  SyncFrameRaw = 0x15,
  SyncFrameFilter = 0x16,
  SyncFrameStrength = 0x17,
}

impl HostData {
  pub(crate) fn from_byte(b: u8) -> Option<Self> {
    match b {
      0x01 => Some(Self::SysInfo),
      0x10 => Some(Self::CxMutual),
      0x11 => Some(Self::CxSelf),
      0x15 => Some(Self::SyncFrameRaw),
      0x16 => Some(Self::SyncFrameFilter),
      0x17 => Some(Self::SyncFrameStrength),
      _ => None,
    }
  }
}
