//! Domain types shared by the relay: device identity and connection state.

pub mod device;

pub use device::{ConnectionState, DeviceId, DeviceSummary};
