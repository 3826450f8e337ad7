//! The AT command channel capability consumed by the device coordinator.
//!
//! Byte-level framing, tokenizing and retries live behind [`AtChannel`]; this
//! crate only drives it through scoped [`Transaction`]s.

use crate::error::{DeviceError, DeviceResult};
use arrayvec::ArrayString;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

pub const MAX_LINK_NAME_LEN: usize = 32;

/// Default AT response timeout in milliseconds.
pub const DEFAULT_AT_TIMEOUT_MS: u32 = 1000;

/// Identity of one physical link to the modem, e.g. `"uart0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(ArrayString<MAX_LINK_NAME_LEN>);

impl LinkId {
    pub fn new(name: &str) -> DeviceResult<Self> {
        if name.is_empty() {
            return Err(DeviceError::Parameter);
        }
        ArrayString::from(name)
            .map(Self)
            .map_err(|_| DeviceError::Parameter)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for LinkId {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings applied to a channel when the pool creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub timeout_ms: u32,
    pub debug: bool,
    pub send_delay_ms: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_AT_TIMEOUT_MS,
            debug: false,
            send_delay_ms: 0,
        }
    }
}

/// A stateful AT command/response parser bound to one link.
pub trait AtChannel: Send {
    fn link(&self) -> &LinkId;

    /// Start of a transaction. Implementations clear the recorded error here.
    fn lock(&mut self);
    fn unlock(&mut self);

    /// Discard any unread input.
    fn flush(&mut self);

    fn cmd_start(&mut self, cmd: &str);
    fn write_int(&mut self, value: i32);
    fn write_string(&mut self, value: &str);
    fn cmd_stop(&mut self);

    fn resp_start(&mut self, prefix: &str);

    /// Read the next string field of the current response into `buf`.
    ///
    /// Returns the number of bytes written, or `None` when the field is
    /// absent or the response could not be read.
    fn read_string(&mut self, buf: &mut [u8]) -> Option<usize>;
    fn resp_stop(&mut self);

    /// Send the command and consume its final result code.
    fn cmd_stop_read_resp(&mut self) {
        self.cmd_stop();
        self.resp_start("");
        self.resp_stop();
    }

    fn last_error(&self) -> DeviceResult<()>;
    fn clear_error(&mut self);

    fn set_timeout(&mut self, timeout_ms: u32, as_default: bool);
    fn set_debug(&mut self, on: bool);
}

/// Creates channels for links on behalf of the pool.
pub trait ChannelFactory: Send {
    fn open(&mut self, link: &LinkId, config: &ChannelConfig) -> DeviceResult<Box<dyn AtChannel>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PendingSettings {
    timeout_ms: Option<u32>,
    debug: Option<bool>,
}

impl PendingSettings {
    fn apply(self, channel: &mut dyn AtChannel) {
        if let Some(timeout_ms) = self.timeout_ms {
            channel.set_timeout(timeout_ms, true);
        }
        if let Some(on) = self.debug {
            channel.set_debug(on);
        }
    }
}

/// A channel shared by every holder of the same link.
///
/// Settings changed while a transaction holds the channel are parked and
/// applied when that transaction ends, so changing them never waits on a
/// busy channel.
pub struct ChannelCell {
    channel: Mutex<Box<dyn AtChannel>>,
    pending: Mutex<PendingSettings>,
}

impl ChannelCell {
    pub fn new(channel: Box<dyn AtChannel>) -> Self {
        Self {
            channel: Mutex::new(channel),
            pending: Mutex::new(PendingSettings::default()),
        }
    }

    /// Set the default AT timeout, now if the channel is idle.
    pub fn set_timeout(&self, timeout_ms: u32) {
        self.update(|pending| pending.timeout_ms = Some(timeout_ms));
    }

    /// Switch traffic debugging, now if the channel is idle.
    pub fn set_debug(&self, on: bool) {
        self.update(|pending| pending.debug = Some(on));
    }

    /// Whether settings are waiting for the current transaction to end.
    pub fn has_pending(&self) -> bool {
        *self.lock_pending() != PendingSettings::default()
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingSettings> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_pending(&self) -> PendingSettings {
        core::mem::take(&mut *self.lock_pending())
    }

    fn update(&self, change: impl FnOnce(&mut PendingSettings)) {
        change(&mut self.lock_pending());
        let mut guard = match self.channel.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        self.take_pending().apply(&mut **guard);
    }
}

impl fmt::Debug for ChannelCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCell")
            .field("pending", &*self.lock_pending())
            .finish_non_exhaustive()
    }
}

pub type SharedChannel = Arc<ChannelCell>;

/// Exclusive use of a channel for one request/response exchange.
///
/// `unlock` runs when the transaction is dropped, so every exit path
/// releases the channel. Settings parked while it was open are applied as
/// it ends.
pub struct Transaction<'a> {
    cell: &'a ChannelCell,
    guard: MutexGuard<'a, Box<dyn AtChannel>>,
}

impl<'a> Transaction<'a> {
    pub fn begin(cell: &'a ChannelCell) -> Self {
        let mut guard = cell.channel.lock().unwrap_or_else(PoisonError::into_inner);
        cell.take_pending().apply(&mut **guard);
        guard.lock();
        Self { cell, guard }
    }

    /// End the transaction, returning the error recorded during it.
    pub fn finish(self) -> DeviceResult<()> {
        self.guard.last_error()
    }
}

impl Deref for Transaction<'_> {
    type Target = dyn AtChannel;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.guard.unlock();
        self.cell.take_pending().apply(&mut **self.guard);
    }
}

/// Read a string field into a fixed buffer and return it as text.
///
/// Invalid UTF-8 is treated like an absent field.
pub fn read_field<'b>(channel: &mut dyn AtChannel, buf: &'b mut [u8]) -> Option<&'b str> {
    let len = channel.read_string(buf)?;
    core::str::from_utf8(&buf[..len.min(buf.len())]).ok()
}
