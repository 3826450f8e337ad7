use crate::channel::{ChannelConfig, LinkId, DEFAULT_AT_TIMEOUT_MS};
use crate::error::{DeviceError, DeviceResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LINK_NAME: &str = "uart0";

/// Device coordinator settings, usually loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Link used when an operation does not name one.
    pub default_link: String,
    pub default_timeout_ms: u32,
    pub modem_debug: bool,
    /// Query and log the modem model during `init_module`.
    pub identify_on_init: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            default_link: DEFAULT_LINK_NAME.to_string(),
            default_timeout_ms: DEFAULT_AT_TIMEOUT_MS,
            modem_debug: false,
            identify_on_init: true,
        }
    }
}

impl DeviceConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn default_link(&self) -> DeviceResult<LinkId> {
        LinkId::new(&self.default_link)
    }

    pub fn channel_config(&self, send_delay_ms: u16) -> ChannelConfig {
        ChannelConfig {
            timeout_ms: self.default_timeout_ms,
            debug: self.modem_debug,
            send_delay_ms,
        }
    }

    pub fn validate(&self) -> DeviceResult<()> {
        if self.default_timeout_ms == 0 {
            return Err(DeviceError::Parameter);
        }
        self.default_link().map(|_| ())
    }
}
