//! Rad Pro Device Simulation Library
//!
//! This crate provides a virtual Rad Pro Geiger counter for exercising the
//! polling stack without physical hardware. It includes:
//!
//! - **VirtualDevice**: answers `GET` requests the way the firmware does, with
//!   fault injection for error responses, silence and reboots
//! - **run_virtual_device_task**: serves a virtual device over any async stream
//!
//! # Example
//!
//! ```rust
//! use radpro_sim::VirtualDevice;
//!
//! let mut device = VirtualDevice::new();
//! device.add_pulses(5);
//!
//! assert_eq!(device.handle_line("GET tubePulseCount").as_deref(), Some("OK 5"));
//! assert_eq!(device.handle_line("GET nothing").as_deref(), Some("ERROR"));
//! ```

pub mod device;
pub mod task;

pub use device::{VirtualDevice, VirtualDeviceConfig};
pub use task::{run_virtual_device_task, spawn_virtual_device, DeviceCommand, VirtualDeviceLink};
