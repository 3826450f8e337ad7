//! Construction hooks for device-specific subsystem implementations.
//!
//! The coordinator owns lifecycle (counting, binding, release); a profile
//! only decides which concrete type gets built around a channel.

use crate::error::DeviceResult;
use crate::pool::ChannelRef;
use crate::subsystems::{
    AtContext, AtInformation, AtNetwork, AtPower, AtSms, ContextId, Information, Network,
    PacketContext, Power, Sms,
};

pub trait DeviceProfile: Send {
    fn create_network(&self, channel: ChannelRef) -> Box<dyn Network> {
        Box::new(AtNetwork::new(channel))
    }

    fn create_sms(&self, channel: ChannelRef) -> Box<dyn Sms> {
        Box::new(AtSms::new(channel))
    }

    fn create_power(&self, channel: ChannelRef) -> Box<dyn Power> {
        Box::new(AtPower::new(channel))
    }

    fn create_information(&self, channel: ChannelRef) -> Box<dyn Information> {
        Box::new(AtInformation::new(channel))
    }

    fn create_context(
        &self,
        channel: ChannelRef,
        id: ContextId,
        apn: Option<&str>,
    ) -> DeviceResult<Box<dyn PacketContext>> {
        Ok(Box::new(AtContext::new(channel, id, apn)?))
    }

    /// Delay between consecutive commands, in milliseconds.
    fn send_delay_ms(&self) -> u16 {
        0
    }
}

/// Plain 3GPP 27.007 modem with no vendor extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericProfile;

impl DeviceProfile for GenericProfile {}
