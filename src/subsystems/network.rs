use super::{Subsystem, SubsystemKind};
use crate::error::DeviceResult;
use crate::pool::ChannelRef;

/// Network registration and packet-domain attach.
pub trait Network: Subsystem {
    fn attach(&mut self) -> DeviceResult<()>;
    fn detach(&mut self) -> DeviceResult<()>;
}

/// Network control over plain 3GPP 27.007 commands.
#[derive(Debug)]
pub struct AtNetwork {
    channel: ChannelRef,
}

impl AtNetwork {
    pub fn new(channel: ChannelRef) -> Self {
        Self { channel }
    }

    fn set_attached(&mut self, attached: bool) -> DeviceResult<()> {
        let mut tx = self.channel.transaction();
        tx.cmd_start("AT+CGATT=");
        tx.write_int(i32::from(attached));
        tx.cmd_stop_read_resp();
        tx.finish()
    }
}

impl Subsystem for AtNetwork {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Network
    }

    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    fn into_channel(self: Box<Self>) -> ChannelRef {
        self.channel
    }
}

impl Network for AtNetwork {
    fn attach(&mut self) -> DeviceResult<()> {
        self.set_attached(true)
    }

    fn detach(&mut self) -> DeviceResult<()> {
        self.set_attached(false)
    }
}
