//! Command and response records for the 2D command set.

use bytemuck::{Pod, Zeroable};

use super::{CtrlHeader, CtrlType, DisplayOne, Format, MAX_SCANOUTS, Rect, ResourceId};

/// A request record: a fixed-layout command the driver writes for the
/// device to read, paired with the reply record the device answers with.
pub trait GpuCommand: Pod {
    type Reply: GpuReply;
}

/// A response record written by the device into driver-owned memory.
pub trait GpuReply: Pod {
    /// The success constant this reply must carry.
    const EXPECTED: CtrlType;

    fn header(&self) -> &CtrlHeader;
}

/// GET_DISPLAY_INFO: query scanout geometry. Informational only.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CmdGetDisplayInfo {
    pub header: CtrlHeader,
}

impl CmdGetDisplayInfo {
    pub const fn new() -> Self {
        Self {
            header: CtrlHeader::new(CtrlType::GetDisplayInfo),
        }
    }
}

impl Default for CmdGetDisplayInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// RESOURCE_CREATE_2D: create a host-side 2D resource.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CmdResourceCreate2d {
    pub header: CtrlHeader,
    pub resource_id: u32,
    pub format: u32,
    pub width: u32,
    pub height: u32,
}

impl CmdResourceCreate2d {
    pub fn new(resource_id: ResourceId, format: Format, width: u32, height: u32) -> Self {
        Self {
            header: CtrlHeader::new(CtrlType::ResourceCreate2d),
            resource_id: resource_id.raw(),
            format: format as u32,
            width,
            height,
        }
    }
}

/// SET_SCANOUT: bind a resource rectangle to a display scanout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CmdSetScanout {
    pub header: CtrlHeader,
    pub rect: Rect,
    pub scanout_id: u32,
    pub resource_id: u32,
}

impl CmdSetScanout {
    pub fn new(scanout_id: u32, resource_id: ResourceId, rect: Rect) -> Self {
        Self {
            header: CtrlHeader::new(CtrlType::SetScanout),
            rect,
            scanout_id,
            resource_id: resource_id.raw(),
        }
    }
}

/// RESOURCE_FLUSH: present a resource rectangle to its scanout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CmdResourceFlush {
    pub header: CtrlHeader,
    pub rect: Rect,
    pub resource_id: u32,
    pub padding: u32,
}

impl CmdResourceFlush {
    pub fn new(resource_id: ResourceId, rect: Rect) -> Self {
        Self {
            header: CtrlHeader::new(CtrlType::ResourceFlush),
            rect,
            resource_id: resource_id.raw(),
            padding: 0,
        }
    }
}

/// TRANSFER_TO_HOST_2D: mark a backing rectangle as freshly written.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CmdTransferToHost2d {
    pub header: CtrlHeader,
    pub rect: Rect,
    pub offset: u64,
    pub resource_id: u32,
    pub padding: u32,
}

impl CmdTransferToHost2d {
    pub fn new(resource_id: ResourceId, rect: Rect, offset: u64) -> Self {
        Self {
            header: CtrlHeader::new(CtrlType::TransferToHost2d),
            rect,
            offset,
            resource_id: resource_id.raw(),
            padding: 0,
        }
    }
}

/// Guest memory entry for RESOURCE_ATTACH_BACKING.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MemEntry {
    pub addr: u64,
    pub length: u32,
    pub padding: u32,
}

impl MemEntry {
    pub const fn new(addr: u64, length: u32) -> Self {
        Self {
            addr,
            length,
            padding: 0,
        }
    }
}

/// RESOURCE_ATTACH_BACKING with its single memory entry inline.
///
/// This driver registers exactly one region per resource, so command and
/// entry travel as one record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CmdAttachBackingOne {
    pub header: CtrlHeader,
    pub resource_id: u32,
    pub nr_entries: u32,
    pub entry: MemEntry,
}

impl CmdAttachBackingOne {
    pub fn new(resource_id: ResourceId, addr: u64, length: u32) -> Self {
        Self {
            header: CtrlHeader::new(CtrlType::ResourceAttachBacking),
            resource_id: resource_id.raw(),
            nr_entries: 1,
            entry: MemEntry::new(addr, length),
        }
    }
}

/// Header-only response (OK_NODATA).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct RespNoData {
    pub header: CtrlHeader,
}

impl GpuReply for RespNoData {
    const EXPECTED: CtrlType = CtrlType::OkNodata;

    fn header(&self) -> &CtrlHeader {
        &self.header
    }
}

/// Response to GET_DISPLAY_INFO.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RespDisplayInfo {
    pub header: CtrlHeader,
    pub pmodes: [DisplayOne; MAX_SCANOUTS],
}

impl GpuReply for RespDisplayInfo {
    const EXPECTED: CtrlType = CtrlType::OkDisplayInfo;

    fn header(&self) -> &CtrlHeader {
        &self.header
    }
}

impl GpuCommand for CmdGetDisplayInfo {
    type Reply = RespDisplayInfo;
}

impl GpuCommand for CmdResourceCreate2d {
    type Reply = RespNoData;
}

impl GpuCommand for CmdSetScanout {
    type Reply = RespNoData;
}

impl GpuCommand for CmdResourceFlush {
    type Reply = RespNoData;
}

impl GpuCommand for CmdTransferToHost2d {
    type Reply = RespNoData;
}

impl GpuCommand for CmdAttachBackingOne {
    type Reply = RespNoData;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{bytes_of, from_bytes};

    #[test]
    fn record_sizes_match_the_wire() {
        assert_eq!(size_of::<CmdGetDisplayInfo>(), 24);
        assert_eq!(size_of::<CmdResourceCreate2d>(), 40);
        assert_eq!(size_of::<CmdSetScanout>(), 48);
        assert_eq!(size_of::<CmdResourceFlush>(), 48);
        assert_eq!(size_of::<CmdTransferToHost2d>(), 56);
        assert_eq!(size_of::<CmdAttachBackingOne>(), 48);
        assert_eq!(size_of::<RespDisplayInfo>(), 24 + 16 * 24);
    }

    #[test]
    fn resource_create_round_trips() {
        let cmd = CmdResourceCreate2d::new(ResourceId::new(1), Format::B8G8R8A8Unorm, 800, 600);
        let bytes = bytes_of(&cmd);
        assert_eq!(bytes.len(), 40);

        // 24-byte header: type, then all-zero flags/fence/ctx/padding.
        assert_eq!(bytes[0..4], 0x0101u32.to_le_bytes());
        assert!(bytes[4..24].iter().all(|&b| b == 0));
        // Four u32 fields in documented order.
        assert_eq!(bytes[24..28], 1u32.to_le_bytes());
        assert_eq!(bytes[28..32], 1u32.to_le_bytes());
        assert_eq!(bytes[32..36], 800u32.to_le_bytes());
        assert_eq!(bytes[36..40], 600u32.to_le_bytes());

        let decoded: &CmdResourceCreate2d = from_bytes(bytes);
        assert_eq!(decoded.header.ctrl_type, CtrlType::ResourceCreate2d as u32);
        assert_eq!(decoded.resource_id, 1);
        assert_eq!(decoded.format, Format::B8G8R8A8Unorm as u32);
        assert_eq!(decoded.width, 800);
        assert_eq!(decoded.height, 600);
    }

    #[test]
    fn attach_backing_carries_one_entry() {
        let cmd = CmdAttachBackingOne::new(ResourceId::new(1), 0x4100_0000, 800 * 600 * 4);
        assert_eq!(cmd.nr_entries, 1);
        let bytes = bytes_of(&cmd);
        assert_eq!(bytes[0..4], 0x0106u32.to_le_bytes());
        assert_eq!(bytes[32..40], 0x4100_0000u64.to_le_bytes());
        assert_eq!(bytes[40..44], (800u32 * 600 * 4).to_le_bytes());
    }
}
