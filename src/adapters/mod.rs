//! Adapters, concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                         | Connects to               |
//! |-------------|------------------------------------|---------------------------|
//! | `fs`        | RuleSource                         | LittleFS / host directory |
//! | `heatpump`  | every `RuleHost` port              | decoder, OpenTherm, 1-wire|
//! | `log_sink`  | DiagnosticsSink                    | Serial log output         |
//! | `nvs`       | ConfigPort                         | NVS / in-memory store     |
//! |             | StoragePort                        |                           |
//! | `system`    | SystemPort                         | Crash log + `esp_restart` |
//! | `time`      | ClockPort                          | SNTP wall clock, uptime   |

pub mod fs;
pub mod heatpump;
pub mod log_sink;
pub mod nvs;
pub mod system;
pub mod time;
