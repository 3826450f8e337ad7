use super::{Subsystem, SubsystemKind};
use crate::error::{DeviceError, DeviceResult};
use crate::pool::ChannelRef;
use arrayvec::ArrayString;
use core::fmt;
use serde::{Deserialize, Serialize};

pub const MAX_APN_LEN: usize = 63;

pub type ApnBuffer = ArrayString<MAX_APN_LEN>;

/// Caller-visible handle of a packet-data context owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u32);

impl ContextId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// A PDP context bound to its own channel.
pub trait PacketContext: Subsystem {
    fn id(&self) -> ContextId;
    fn apn(&self) -> Option<&str>;

    /// Define the context on the modem.
    fn define(&mut self) -> DeviceResult<()>;
}

#[derive(Debug)]
pub struct AtContext {
    channel: ChannelRef,
    id: ContextId,
    apn: Option<ApnBuffer>,
}

impl AtContext {
    /// Fails with [`DeviceError::Parameter`] when the APN does not fit.
    pub fn new(channel: ChannelRef, id: ContextId, apn: Option<&str>) -> DeviceResult<Self> {
        let apn = apn
            .map(|apn| ApnBuffer::from(apn).map_err(|_| DeviceError::Parameter))
            .transpose()?;
        Ok(Self { channel, id, apn })
    }
}

impl Subsystem for AtContext {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Context
    }

    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    fn into_channel(self: Box<Self>) -> ChannelRef {
        self.channel
    }
}

impl PacketContext for AtContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn apn(&self) -> Option<&str> {
        self.apn.as_ref().map(ApnBuffer::as_str)
    }

    fn define(&mut self) -> DeviceResult<()> {
        let cid = i32::try_from(self.id.get()).map_err(|_| DeviceError::Parameter)?;
        let mut tx = self.channel.transaction();
        tx.cmd_start("AT+CGDCONT=");
        tx.write_int(cid);
        tx.write_string("IP");
        if let Some(apn) = &self.apn {
            tx.write_string(apn);
        }
        tx.cmd_stop_read_resp();
        tx.finish()
    }
}
