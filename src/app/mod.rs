//! Application core, pure domain logic with zero I/O.
//!
//! The rule service turns triggers (boot, timers, value changes, reloads)
//! into rule runs.  All interaction with the heat pump, the filesystem and
//! the outside world happens through the **port traits** in [`ports`], so
//! this layer is fully testable without hardware.

pub mod commands;
pub mod ports;
pub mod service;
