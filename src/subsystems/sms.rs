use super::{Subsystem, SubsystemKind};
use crate::error::DeviceResult;
use crate::pool::ChannelRef;

pub trait Sms: Subsystem {
    /// Select text (`true`) or PDU (`false`) message format.
    fn set_text_mode(&mut self, text: bool) -> DeviceResult<()>;
}

#[derive(Debug)]
pub struct AtSms {
    channel: ChannelRef,
}

impl AtSms {
    pub fn new(channel: ChannelRef) -> Self {
        Self { channel }
    }
}

impl Subsystem for AtSms {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Sms
    }

    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    fn into_channel(self: Box<Self>) -> ChannelRef {
        self.channel
    }
}

impl Sms for AtSms {
    fn set_text_mode(&mut self, text: bool) -> DeviceResult<()> {
        let mut tx = self.channel.transaction();
        tx.cmd_start("AT+CMGF=");
        tx.write_int(i32::from(text));
        tx.cmd_stop_read_resp();
        tx.finish()
    }
}
