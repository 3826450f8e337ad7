use super::{Subsystem, SubsystemKind};
use crate::channel::read_field;
use crate::error::DeviceResult;
use crate::pool::ChannelRef;

pub const MAX_INFO_LEN: usize = 64;

pub type InfoString = heapless::String<MAX_INFO_LEN>;

/// Device identification queries.
pub trait Information: Subsystem {
    fn manufacturer(&mut self) -> DeviceResult<InfoString>;
    fn model(&mut self) -> DeviceResult<InfoString>;
    fn revision(&mut self) -> DeviceResult<InfoString>;
    fn serial_number(&mut self) -> DeviceResult<InfoString>;
}

#[derive(Debug)]
pub struct AtInformation {
    channel: ChannelRef,
}

impl AtInformation {
    pub fn new(channel: ChannelRef) -> Self {
        Self { channel }
    }

    // Identification responses carry no prefix; an unreadable field yields
    // an empty string and the transaction error decides the result.
    fn query(&mut self, cmd: &str) -> DeviceResult<InfoString> {
        let mut value = InfoString::new();
        let mut buf = [0u8; MAX_INFO_LEN];

        let mut tx = self.channel.transaction();
        tx.cmd_start(cmd);
        tx.cmd_stop();
        tx.resp_start("");
        if let Some(text) = read_field(&mut *tx, &mut buf) {
            let _ = value.push_str(text);
        }
        tx.resp_stop();
        tx.finish().map(|()| value)
    }
}

impl Subsystem for AtInformation {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Information
    }

    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    fn into_channel(self: Box<Self>) -> ChannelRef {
        self.channel
    }
}

impl Information for AtInformation {
    fn manufacturer(&mut self) -> DeviceResult<InfoString> {
        self.query("AT+CGMI")
    }

    fn model(&mut self) -> DeviceResult<InfoString> {
        self.query("AT+CGMM")
    }

    fn revision(&mut self) -> DeviceResult<InfoString> {
        self.query("AT+CGMR")
    }

    fn serial_number(&mut self) -> DeviceResult<InfoString> {
        self.query("AT+CGSN")
    }
}
