use crate::channel::{ChannelFactory, LinkId};
use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::pool::{ChannelPool, ChannelRef};
use crate::profile::{DeviceProfile, GenericProfile};
use crate::psm;
use crate::subsystems::{
    ContextId, Information, Network, PacketContext, Power, Sms, SubsystemKind, SubsystemSlot,
};
use core::fmt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// `+CPIN:` answers are short; anything longer is truncated before matching.
pub const MAX_SIM_RESPONSE_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    Ready,
    PinNeeded,
    PukNeeded,
    Unknown,
}

impl SimState {
    /// Classify a `+CPIN:` response field; `None` means it could not be read.
    pub fn from_response(response: Option<&[u8]>) -> Self {
        match response {
            Some(r) if r.starts_with(b"READY") => SimState::Ready,
            Some(r) if r.starts_with(b"SIM PIN") => SimState::PinNeeded,
            Some(r) if r.starts_with(b"SIM PUK") => SimState::PukNeeded,
            Some(r) => {
                error!(response = %String::from_utf8_lossy(r), "unknown SIM state");
                SimState::Unknown
            }
            None => {
                // SIM may not be ready yet or +CPIN may be unsupported
                warn!("SIM not readable");
                SimState::Unknown
            }
        }
    }
}

/// Callback for the modem announcing it is ready.
pub type ReadyCallback = Box<dyn FnMut() + Send>;

/// Owner of the channel pool, the subsystem slots and the packet contexts
/// of one modem.
///
/// Dropping the device tears everything down, including channels still
/// referenced by subsystems that were never closed.
pub struct CellularDevice {
    config: DeviceConfig,
    profile: Box<dyn DeviceProfile>,
    pool: ChannelPool,
    at: Option<ChannelRef>,

    network: SubsystemSlot<dyn Network>,
    sms: SubsystemSlot<dyn Sms>,
    power: SubsystemSlot<dyn Power>,
    information: SubsystemSlot<dyn Information>,

    contexts: Vec<Box<dyn PacketContext>>,
    next_context_id: u32,
}

impl CellularDevice {
    pub fn new(config: DeviceConfig, factory: Box<dyn ChannelFactory>) -> DeviceResult<Self> {
        Self::with_profile(config, factory, Box::new(GenericProfile))
    }

    pub fn with_profile(
        config: DeviceConfig,
        factory: Box<dyn ChannelFactory>,
        profile: Box<dyn DeviceProfile>,
    ) -> DeviceResult<Self> {
        config.validate()?;
        let pool = ChannelPool::new(
            config.default_link()?,
            factory,
            config.channel_config(profile.send_delay_ms()),
        );
        let at = pool.acquire(None)?;
        info!(link = %at.link(), timeout_ms = config.default_timeout_ms, "cellular device created");

        Ok(Self {
            config,
            profile,
            pool,
            at: Some(at),
            network: SubsystemSlot::new(SubsystemKind::Network),
            sms: SubsystemSlot::new(SubsystemKind::Sms),
            power: SubsystemSlot::new(SubsystemKind::Power),
            information: SubsystemSlot::new(SubsystemKind::Information),
            contexts: Vec::new(),
            next_context_id: 1,
        })
    }

    fn at(&self) -> DeviceResult<&ChannelRef> {
        self.at.as_ref().ok_or(DeviceError::NoConnection)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    // Subsystems

    pub fn open_network(&mut self, link: Option<&LinkId>) -> DeviceResult<&mut (dyn Network + 'static)> {
        let profile = &self.profile;
        self.network
            .open(&self.pool, link, |channel| profile.create_network(channel))
    }

    pub fn open_sms(&mut self, link: Option<&LinkId>) -> DeviceResult<&mut (dyn Sms + 'static)> {
        let profile = &self.profile;
        self.sms.open(&self.pool, link, |channel| profile.create_sms(channel))
    }

    pub fn open_power(&mut self, link: Option<&LinkId>) -> DeviceResult<&mut (dyn Power + 'static)> {
        let profile = &self.profile;
        self.power.open(&self.pool, link, |channel| profile.create_power(channel))
    }

    pub fn open_information(
        &mut self,
        link: Option<&LinkId>,
    ) -> DeviceResult<&mut (dyn Information + 'static)> {
        let profile = &self.profile;
        self.information
            .open(&self.pool, link, |channel| profile.create_information(channel))
    }

    pub fn close_network(&mut self) {
        self.network.close();
    }

    pub fn close_sms(&mut self) {
        self.sms.close();
    }

    pub fn close_power(&mut self) {
        self.power.close();
    }

    pub fn close_information(&mut self) {
        self.information.close();
    }

    pub fn is_open(&self, kind: SubsystemKind) -> bool {
        match kind {
            SubsystemKind::Network => self.network.is_open(),
            SubsystemKind::Sms => self.sms.is_open(),
            SubsystemKind::Power => self.power.is_open(),
            SubsystemKind::Information => self.information.is_open(),
            SubsystemKind::Context => !self.contexts.is_empty(),
        }
    }

    /// Open count of a singleton subsystem; for contexts, how many exist.
    pub fn ref_count(&self, kind: SubsystemKind) -> u32 {
        match kind {
            SubsystemKind::Network => self.network.ref_count(),
            SubsystemKind::Sms => self.sms.ref_count(),
            SubsystemKind::Power => self.power.ref_count(),
            SubsystemKind::Information => self.information.ref_count(),
            SubsystemKind::Context => u32::try_from(self.context_count()).unwrap_or(u32::MAX),
        }
    }

    // Packet contexts

    /// Create a packet context on `link` and append it to the context list.
    pub fn create_context(&mut self, link: Option<&LinkId>, apn: Option<&str>) -> DeviceResult<ContextId> {
        let channel = self.pool.acquire(link)?;
        let id = self.allocate_context_id();
        let context = self.profile.create_context(channel, id, apn)?;

        info!(context = %id, link = %context.channel().link(), apn = context.apn().unwrap_or(""), "context created");
        self.contexts.push(context);
        Ok(id)
    }

    // Ids wrap around after u32::MAX and skip those still held by live contexts.
    fn allocate_context_id(&mut self) -> ContextId {
        loop {
            let id = ContextId::new(self.next_context_id);
            self.next_context_id = self.next_context_id.checked_add(1).unwrap_or(1);
            if !self.contexts.iter().any(|context| context.id() == id) {
                return id;
            }
        }
    }

    /// Remove and destroy a context. Returns `false` if `id` is unknown.
    pub fn delete_context(&mut self, id: ContextId) -> bool {
        let Some(index) = self.contexts.iter().position(|context| context.id() == id) else {
            return false;
        };
        let context = self.contexts.remove(index);
        debug!(context = %id, link = %context.channel().link(), "context deleted");
        true
    }

    /// Contexts in creation order.
    pub fn contexts(&self) -> &[Box<dyn PacketContext>] {
        &self.contexts
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn context(&self, id: ContextId) -> Option<&(dyn PacketContext + 'static)> {
        self.contexts
            .iter()
            .find(|context| context.id() == id)
            .map(|context| &**context)
    }

    pub fn context_mut(&mut self, id: ContextId) -> Option<&mut (dyn PacketContext + 'static)> {
        self.contexts
            .iter_mut()
            .find(|context| context.id() == id)
            .map(|context| &mut **context)
    }

    // Modem control

    /// Query the SIM lock state.
    ///
    /// The state is `Unknown` when the answer is missing or unrecognised; the
    /// second element is the transaction result and may be `Ok` regardless.
    pub fn sim_state(&mut self) -> (SimState, DeviceResult<()>) {
        let at = match self.at() {
            Ok(at) => at,
            Err(e) => return (SimState::Unknown, Err(e)),
        };

        let mut buf = [0u8; MAX_SIM_RESPONSE_LENGTH];
        let mut tx = at.transaction();
        tx.flush();
        tx.cmd_start("AT+CPIN?");
        tx.cmd_stop();
        tx.resp_start("+CPIN:");
        let len = tx.read_string(&mut buf);
        let state = SimState::from_response(len.map(|len| &buf[..len.min(buf.len())]));
        tx.resp_stop();
        let result = tx.finish();

        // Unknown states were already reported while classifying.
        match state {
            SimState::Ready => info!("SIM is ready"),
            SimState::PinNeeded => info!("SIM PIN required"),
            SimState::PukNeeded => error!("SIM PUK required"),
            SimState::Unknown => {}
        }
        (state, result)
    }

    /// Unlock the SIM with `pin` unless it is already unlocked.
    pub fn set_pin(&mut self, pin: Option<&str>) -> DeviceResult<()> {
        // The modem rejects a PIN while the SIM is ready.
        if let (SimState::Ready, Ok(())) = self.sim_state() {
            return Ok(());
        }
        let pin = pin.ok_or(DeviceError::Parameter)?;

        let mut tx = self.at()?.transaction();
        tx.cmd_start("AT+CPIN=");
        tx.write_string(pin);
        tx.cmd_stop_read_resp();
        tx.finish()
    }

    /// Probe the modem with `AT`, twice.
    ///
    /// Right after leaving data mode the first `AT` only tells the modem we
    /// are back in command mode, so only the second answer counts.
    pub fn is_ready(&mut self) -> DeviceResult<()> {
        let mut tx = self.at()?.transaction();
        tx.cmd_start("AT");
        tx.cmd_stop_read_resp();

        tx.clear_error();
        tx.cmd_start("AT");
        tx.cmd_stop_read_resp();
        tx.finish()
    }

    /// The generic device has no ready indication.
    pub fn set_ready_callback(&mut self, _callback: ReadyCallback) -> DeviceResult<()> {
        Err(DeviceError::Unsupported)
    }

    /// Request power saving mode, or disable it when both times are zero.
    ///
    /// The network may grant different timers than requested; an error here
    /// means the request itself was refused and is only worth a warning.
    pub fn set_power_save_mode(&mut self, periodic_s: u32, active_s: u32) -> DeviceResult<()> {
        let mut tx = self.at()?.transaction();

        if periodic_s == 0 && active_s == 0 {
            tx.cmd_start("AT+CPSMS=");
            tx.write_int(0);
            tx.cmd_stop_read_resp();
            let result = tx.finish();
            if result.is_ok() {
                info!("power save mode disabled");
            }
            return result;
        }

        let periodic = psm::encode_periodic(periodic_s).bits();
        let active = psm::encode_active(active_s).bits();

        tx.cmd_start("AT+CPSMS=");
        tx.write_int(1);
        // GPRS timers, then the same values for LTE
        for _ in 0..2 {
            tx.write_string(&periodic);
            tx.write_string(&active);
        }
        tx.cmd_stop_read_resp();
        let result = tx.finish();

        match result {
            Ok(()) => info!(periodic = %periodic, active = %active, "power save mode requested"),
            Err(e) => warn!(error = %e, "power save mode not enabled"),
        }
        result
    }

    /// Set the AT timeout of every channel, now and for channels opened later.
    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.config.default_timeout_ms = timeout_ms;
        self.pool.set_timeout(timeout_ms);
    }

    pub fn modem_debug_on(&mut self, on: bool) {
        self.config.modem_debug = on;
        self.pool.set_debug(on);
    }

    /// Module bring-up hook: logs the modem model when configured to.
    ///
    /// Identification is best effort and never fails the hook.
    pub fn init_module(&mut self) -> DeviceResult<()> {
        if !self.config.identify_on_init {
            return Ok(());
        }

        match self.open_information(None) {
            Ok(information) => {
                let model = information.model();
                self.close_information();
                match model {
                    Ok(model) => info!(model = %model, "modem identified"),
                    Err(e) => debug!(error = %e, "modem model not available"),
                }
            }
            Err(e) => warn!(error = %e, "information subsystem not available"),
        }
        Ok(())
    }

    // Teardown

    // Repairs whatever counts callers left behind, so nothing outlives the device.
    fn teardown(&mut self) {
        self.network.force_close();
        self.sms.force_close();
        self.power.force_close();
        self.information.force_close();

        self.contexts.clear();
        self.at = None;
        self.pool.clear();
        debug!("cellular device torn down");
    }

    /// Tear the device down and release every channel.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for CellularDevice {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for CellularDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellularDevice")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("network", &self.network)
            .field("sms", &self.sms)
            .field("power", &self.power)
            .field("information", &self.information)
            .field("contexts", &self.contexts.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackFactory, LoopbackScript};

    fn device() -> CellularDevice {
        CellularDevice::new(
            DeviceConfig::default(),
            Box::new(LoopbackFactory::new(LoopbackScript::new())),
        )
        .unwrap()
    }

    #[test]
    fn test_context_ids_wrap_past_live_contexts() {
        let mut device = device();
        let long_lived = device.create_context(None, None).unwrap();
        let second = device.create_context(None, None).unwrap();
        assert_eq!(long_lived, ContextId::new(1));
        assert_eq!(second, ContextId::new(2));

        device.next_context_id = u32::MAX;
        let last = device.create_context(None, None).unwrap();
        let wrapped = device.create_context(None, None).unwrap();

        assert_eq!(last, ContextId::new(u32::MAX));
        assert_eq!(wrapped, ContextId::new(3));
        assert_eq!(device.context_count(), 4);
    }

    #[test]
    fn test_freed_id_is_reused_after_wrap() {
        let mut device = device();
        let first = device.create_context(None, None).unwrap();
        let _second = device.create_context(None, None).unwrap();
        assert!(device.delete_context(first));

        device.next_context_id = u32::MAX;
        device.create_context(None, None).unwrap();

        assert_eq!(device.create_context(None, None).unwrap(), ContextId::new(1));
    }
}
