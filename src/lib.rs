//! # Cellular Device
//!
//! Coordination of one AT command channel shared by the logical parts of a
//! cellular modem driver: network, SMS, power, device information and any
//! number of packet-data contexts.
//!
//! ## Features
//!
//! - **Channel pooling**: one reference-counted channel per physical link
//! - **Subsystem lifecycle**: lazily opened, reference-counted singletons
//! - **Packet contexts**: independently created and deleted, each on its own link
//! - **Forced teardown**: dropping the device releases every channel
//! - **SIM and readiness**: `+CPIN` classification, PIN entry, `AT` probing
//! - **Power saving**: 3GPP GPRS Timer / GPRS Timer 3 encoding for `+CPSMS`
//!
//! ## Quick Start
//!
//! ```rust
//! use cellular_device::{CellularDevice, DeviceConfig, SimState};
//! use cellular_device::loopback::{LoopbackFactory, LoopbackScript};
//! use cellular_device::subsystems::Network;
//!
//! let script = LoopbackScript::with_defaults();
//! let factory = LoopbackFactory::new(script.clone());
//! let mut device = CellularDevice::new(DeviceConfig::default(), Box::new(factory)).unwrap();
//!
//! assert!(device.is_ready().is_ok());
//! assert_eq!(device.sim_state().0, SimState::Ready);
//!
//! device.open_network(None).unwrap().attach().unwrap();
//! device.close_network();
//!
//! device.set_power_save_mode(3600, 60).unwrap();
//! assert_eq!(script.count("AT+CPSMS=1"), 1);
//! ```
//!
//! ## Architecture
//!
//! - [`channel`] - AT channel capability and scoped transactions
//! - [`pool`] - Per-link channel registry
//! - [`subsystems`] - Subsystem traits, default implementations and slots
//! - [`profile`] - Overridable subsystem construction
//! - [`device`] - The coordinator
//! - [`psm`] - Power saving timer encoding
//! - [`loopback`] - Scripted in-memory modem

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::new_without_default)]

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod loopback;
pub mod pool;
pub mod profile;
pub mod psm;
pub mod subsystems;

// Re-export main public types for convenience
pub use channel::{AtChannel, ChannelCell, ChannelConfig, ChannelFactory, LinkId, Transaction};
pub use config::DeviceConfig;
pub use device::{CellularDevice, SimState};
pub use error::{DeviceError, DeviceResult};
pub use pool::{ChannelPool, ChannelRef};
pub use profile::{DeviceProfile, GenericProfile};
pub use subsystems::{ContextId, SubsystemKind};
