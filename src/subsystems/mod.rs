pub mod context;
pub mod information;
pub mod network;
pub mod power;
pub mod sms;

pub use context::{AtContext, ContextId, PacketContext};
pub use information::{AtInformation, Information, InfoString};
pub use network::{AtNetwork, Network};
pub use power::{AtPower, Power};
pub use sms::{AtSms, Sms};

use crate::channel::LinkId;
use crate::error::{DeviceError, DeviceResult};
use crate::pool::{ChannelPool, ChannelRef};
use core::fmt;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubsystemKind {
    Network,
    Sms,
    Power,
    Information,
    Context,
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubsystemKind::Network => "network",
            SubsystemKind::Sms => "sms",
            SubsystemKind::Power => "power",
            SubsystemKind::Information => "information",
            SubsystemKind::Context => "context",
        };
        f.write_str(name)
    }
}

/// Anything bound to a pooled channel for its whole lifetime.
pub trait Subsystem: Send {
    fn kind(&self) -> SubsystemKind;

    fn channel(&self) -> &ChannelRef;

    /// Destroy the instance and hand back the channel it was bound to.
    fn into_channel(self: Box<Self>) -> ChannelRef;
}

/// Lazily created, reference-counted home of one subsystem instance.
///
/// The instance exists iff the count is non-zero. Its channel is released
/// only after the instance itself has been destroyed.
pub struct SubsystemSlot<T: ?Sized> {
    kind: SubsystemKind,
    instance: Option<Box<T>>,
    ref_count: u32,
}

impl<T: ?Sized + Subsystem> SubsystemSlot<T> {
    pub const fn new(kind: SubsystemKind) -> Self {
        Self {
            kind,
            instance: None,
            ref_count: 0,
        }
    }

    /// Create the instance on first use and count one more user.
    pub fn open<F>(&mut self, pool: &ChannelPool, link: Option<&LinkId>, create: F) -> DeviceResult<&mut T>
    where
        F: FnOnce(ChannelRef) -> Box<T>,
    {
        if self.instance.is_none() {
            let channel = pool.acquire(link)?;
            debug!(kind = %self.kind, link = %channel.link(), "subsystem created");
            self.instance = Some(create(channel));
        }
        self.ref_count += 1;
        self.instance.as_deref_mut().ok_or(DeviceError::Device)
    }

    /// Count one user less; the last close destroys the instance.
    ///
    /// Closing a slot that holds no instance does nothing.
    pub fn close(&mut self) {
        if self.instance.is_none() {
            return;
        }
        self.ref_count = self.ref_count.saturating_sub(1);
        if self.ref_count > 0 {
            return;
        }
        if let Some(instance) = self.instance.take() {
            let channel = instance.into_channel();
            debug!(kind = %self.kind, link = %channel.link(), "subsystem destroyed");
            drop(channel);
        }
    }

    /// Close regardless of the recorded count.
    pub fn force_close(&mut self) {
        if self.instance.is_none() {
            self.ref_count = 0;
            return;
        }
        self.ref_count = 1;
        self.close();
    }

    pub fn get(&self) -> Option<&T> {
        self.instance.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.instance.as_deref_mut()
    }

    pub fn is_open(&self) -> bool {
        self.instance.is_some()
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }
}

impl<T: ?Sized> fmt::Debug for SubsystemSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsystemSlot")
            .field("kind", &self.kind)
            .field("open", &self.instance.is_some())
            .field("ref_count", &self.ref_count)
            .finish()
    }
}
