use super::{Subsystem, SubsystemKind};
use crate::error::DeviceResult;
use crate::pool::ChannelRef;

/// Modem power and functionality control.
pub trait Power: Subsystem {
    /// Put the channel into plain command mode (echo off).
    fn set_at_mode(&mut self) -> DeviceResult<()>;

    /// Full functionality with a modem reset.
    fn reset(&mut self) -> DeviceResult<()>;
}

#[derive(Debug)]
pub struct AtPower {
    channel: ChannelRef,
}

impl AtPower {
    pub fn new(channel: ChannelRef) -> Self {
        Self { channel }
    }
}

impl Subsystem for AtPower {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Power
    }

    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    fn into_channel(self: Box<Self>) -> ChannelRef {
        self.channel
    }
}

impl Power for AtPower {
    fn set_at_mode(&mut self) -> DeviceResult<()> {
        let mut tx = self.channel.transaction();
        tx.flush();
        tx.cmd_start("ATE0");
        tx.cmd_stop_read_resp();
        tx.finish()
    }

    fn reset(&mut self) -> DeviceResult<()> {
        let mut tx = self.channel.transaction();
        tx.cmd_start("AT+CFUN=");
        tx.write_int(1);
        tx.write_int(1);
        tx.cmd_stop_read_resp();
        tx.finish()
    }
}
