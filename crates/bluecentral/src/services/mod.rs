//! Ready-made service descriptors
//!
//! Register these with [`Central::register_service`](crate::central::Central::register_service),
//! or use them as a template for application-specific services.

mod battery;
mod device_info;


pub use self::battery::{BatteryService, BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
pub use self::device_info::{DeviceInfoField, DeviceInfoService, DEVICE_INFO_SERVICE_UUID};
