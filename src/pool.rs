use crate::channel::{ChannelCell, ChannelConfig, ChannelFactory, LinkId, SharedChannel, Transaction};
use crate::error::{DeviceError, DeviceResult};
use core::fmt;
use static_assertions::assert_impl_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

struct PoolEntry {
    link: LinkId,
    channel: SharedChannel,
    ref_count: u32,
}

struct PoolState {
    default_link: LinkId,
    config: ChannelConfig,
    factory: Box<dyn ChannelFactory>,
    entries: Vec<PoolEntry>,
    closed: bool,
}

impl PoolState {
    fn position(&self, channel: &SharedChannel) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.channel, channel))
    }

    fn channels(&self) -> Vec<SharedChannel> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.channel))
            .collect()
    }

    fn release(&mut self, channel: &SharedChannel) {
        let Some(index) = self.position(channel) else {
            // Entry already destroyed by a forced teardown.
            debug!("release of a channel no longer in the pool ignored");
            return;
        };

        let entry = &mut self.entries[index];
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            let entry = self.entries.remove(index);
            debug!(link = %entry.link, "channel destroyed");
        }
    }
}

fn lock_state(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of live AT channels, at most one per link.
///
/// Each [`ChannelRef`] handed out accounts for one reference; the entry and
/// its channel are destroyed when the last reference is released. Count
/// updates and the destroy decision happen under one lock.
#[derive(Clone)]
pub struct ChannelPool {
    state: Arc<Mutex<PoolState>>,
}

impl ChannelPool {
    pub fn new(default_link: LinkId, factory: Box<dyn ChannelFactory>, config: ChannelConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                default_link,
                config,
                factory,
                entries: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Get a reference to the channel for `link`, creating it on first use.
    ///
    /// `None` selects the default link. Fails with
    /// [`DeviceError::NoConnection`] once the pool has been cleared.
    pub fn acquire(&self, link: Option<&LinkId>) -> DeviceResult<ChannelRef> {
        let mut state = lock_state(&self.state);
        let link = link.copied().unwrap_or(state.default_link);
        if state.closed {
            debug!(%link, "acquire on a cleared pool refused");
            return Err(DeviceError::NoConnection);
        }

        if let Some(entry) = state.entries.iter_mut().find(|entry| entry.link == link) {
            entry.ref_count += 1;
            return Ok(ChannelRef {
                link,
                channel: Arc::clone(&entry.channel),
                pool: Arc::downgrade(&self.state),
            });
        }

        let config = state.config;
        let channel = state.factory.open(&link, &config)?;
        let channel: SharedChannel = Arc::new(ChannelCell::new(channel));
        state.entries.push(PoolEntry {
            link,
            channel: Arc::clone(&channel),
            ref_count: 1,
        });
        debug!(%link, timeout_ms = config.timeout_ms, debug = config.debug, "channel created");

        Ok(ChannelRef {
            link,
            channel,
            pool: Arc::downgrade(&self.state),
        })
    }

    /// Give back one reference. `None` is accepted and ignored.
    pub fn release(&self, channel: Option<ChannelRef>) {
        drop(channel);
    }

    /// Set the timeout of every live channel and of channels created later.
    ///
    /// A channel in the middle of a transaction picks the value up when the
    /// transaction ends.
    pub fn set_timeout(&self, timeout_ms: u32) {
        let channels = {
            let mut state = lock_state(&self.state);
            state.config.timeout_ms = timeout_ms;
            state.channels()
        };
        for channel in channels {
            channel.set_timeout(timeout_ms);
        }
    }

    /// Switch modem traffic debugging for every live channel and later ones.
    pub fn set_debug(&self, on: bool) {
        let channels = {
            let mut state = lock_state(&self.state);
            state.config.debug = on;
            state.channels()
        };
        for channel in channels {
            channel.set_debug(on);
        }
    }

    pub fn config(&self) -> ChannelConfig {
        lock_state(&self.state).config
    }

    pub fn default_link(&self) -> LinkId {
        lock_state(&self.state).default_link
    }

    pub fn ref_count(&self, link: &LinkId) -> Option<u32> {
        lock_state(&self.state)
            .entries
            .iter()
            .find(|entry| entry.link == *link)
            .map(|entry| entry.ref_count)
    }

    pub fn contains(&self, link: &LinkId) -> bool {
        self.ref_count(link).is_some()
    }

    pub fn live_count(&self) -> usize {
        lock_state(&self.state).entries.len()
    }

    /// Destroy every entry regardless of outstanding references and close
    /// the pool for good.
    ///
    /// References still held afterwards release as no-ops, and their channel
    /// lives on until the last of them is dropped. Later acquires fail, so a
    /// link never ends up with two live channels.
    pub fn clear(&self) {
        let entries = {
            let mut state = lock_state(&self.state);
            state.closed = true;
            core::mem::take(&mut state.entries)
        };
        for entry in entries {
            if entry.ref_count > 0 {
                warn!(link = %entry.link, refs = entry.ref_count, "destroying channel with outstanding references");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        lock_state(&self.state).closed
    }
}

impl fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock_state(&self.state);
        f.debug_struct("ChannelPool")
            .field("default_link", &state.default_link)
            .field("config", &state.config)
            .field("live", &state.entries.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// One counted reference to a pooled channel. Dropping it releases the reference.
pub struct ChannelRef {
    link: LinkId,
    channel: SharedChannel,
    pool: Weak<Mutex<PoolState>>,
}

impl ChannelRef {
    pub fn link(&self) -> &LinkId {
        &self.link
    }

    /// Start a locked request/response exchange on the channel.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::begin(&self.channel)
    }

    /// Whether settings changed during an open transaction still wait to be applied.
    pub fn has_pending_settings(&self) -> bool {
        self.channel.has_pending()
    }

    /// Whether both references point at the same pool entry.
    pub fn same_channel(&self, other: &ChannelRef) -> bool {
        Arc::ptr_eq(&self.channel, &other.channel)
    }
}

impl Drop for ChannelRef {
    fn drop(&mut self) {
        if let Some(state) = self.pool.upgrade() {
            lock_state(&state).release(&self.channel);
        }
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRef").field("link", &self.link).finish()
    }
}

assert_impl_all!(ChannelRef: Send);
assert_impl_all!(ChannelPool: Send, Sync, Clone);
