//! Port traits, the hexagonal boundary between the rule engine and the
//! rest of the firmware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ RuleService / RuleEngine (domain)
//! ```
//!
//! The heat-pump decoder, the command encoder, the OpenTherm field table,
//! the one-wire driver, the timer queue and the log fan-out all live outside
//! the engine.  They implement these traits; the engine consumes them via
//! generics so it never touches serial ports, flash or sockets directly.
//!
//! ## Threading
//!
//! Every port is called from the single rule-engine context.  No port
//! method may block waiting on another task.

use crate::config::EngineConfig;

// ───────────────────────────────────────────────────────────────
// Telemetry registry (driven adapter: decoder → domain)
// ───────────────────────────────────────────────────────────────

/// Ordered list of decoded heat-pump topics.
pub trait TelemetryRegistry {
    fn topic_count(&self) -> usize;

    fn topic_name(&self, index: usize) -> Option<&str>;

    /// Current decoded value as text.  Empty means "unknown".
    fn topic_value(&self, index: usize) -> Option<&str>;

    /// Case-insensitive topic lookup.
    fn find_topic(&self, name: &str) -> Option<usize> {
        (0..self.topic_count())
            .find(|&i| self.topic_name(i).is_some_and(|t| t.eq_ignore_ascii_case(name)))
    }
}

// ───────────────────────────────────────────────────────────────
// Command dispatcher (driven adapter: domain → heat pump)
// ───────────────────────────────────────────────────────────────

/// Protocol bytes plus the human-readable line logged when sending them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    pub bytes: heapless::Vec<u8, 128>,
    pub log_line: heapless::String<128>,
}

/// Turns symbolic commands into protocol frames and queues them.
pub trait CommandDispatcher {
    /// Whether `name` is a known command (case-insensitive).
    fn is_command(&self, name: &str) -> bool;

    /// Commands that only exist on the optional PCB.
    fn is_optional(&self, name: &str) -> bool;

    /// Encode `payload` for command `name`.  `None` if not recognized.
    fn encode(&self, name: &str, payload: &str) -> Option<EncodedCommand>;

    /// Queue an encoded command for the serial writer.
    fn send(&mut self, command: &EncodedCommand);
}

// ───────────────────────────────────────────────────────────────
// Device-field registry (OpenTherm gateway state)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Float,
}

/// Direction as seen from the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDirection {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl FieldDirection {
    pub fn writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Float(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceField {
    pub name: &'static str,
    pub kind: FieldType,
    pub direction: FieldDirection,
    pub value: FieldValue,
}

pub trait DeviceFieldRegistry {
    fn fields(&self) -> &[DeviceField];

    fn fields_mut(&mut self) -> &mut [DeviceField];

    fn find_field(&self, name: &str) -> Option<usize> {
        self.fields()
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor registry (one-wire driver → domain)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// 16 hex digits, as printed by the one-wire driver.
    pub address: heapless::String<16>,
    pub temperature: f32,
}

pub trait SensorRegistry {
    fn sensors(&self) -> &[SensorReading];
}

// ───────────────────────────────────────────────────────────────
// Timer queue
// ───────────────────────────────────────────────────────────────

/// An entry returned by [`TimerPort::pop`] once its delay has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredTimer {
    pub id: u32,
    pub repeat: bool,
}

/// Rule timers.  Only the insert/pop contract matters to the engine.
pub trait TimerPort {
    /// Arm timer `id` to expire after `delay_secs`.  Re-arming an existing id
    /// replaces it.  Returns `false` if the queue is full.
    fn insert(&mut self, delay_secs: u32, repeat: bool, id: u32) -> bool;

    /// Next expired timer, if any.
    fn pop(&mut self) -> Option<ExpiredTimer>;

    /// Seconds until timer `id` expires, `None` if it is not armed.
    fn remaining(&self, id: u32) -> Option<u32>;

    /// Disarm every timer.
    fn clear(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Broken-down local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub hour: u8,
    pub minute: u8,
    /// 1 = January.
    pub month: u8,
    /// 0 = Sunday.
    pub weekday: u8,
}

pub trait ClockPort {
    /// `None` while the wall clock is not synchronised.
    fn local_time(&self) -> Option<LocalTime>;

    /// Monotonic microseconds since boot.
    fn uptime_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Diagnostics sink (domain → console / MQTT / websocket)
// ───────────────────────────────────────────────────────────────

/// Receives formatted diagnostic text.  Fan-out is the adapter's concern.
pub trait DiagnosticsSink {
    fn line(&mut self, text: &str);
}

// ───────────────────────────────────────────────────────────────
// System control
// ───────────────────────────────────────────────────────────────

/// Unrecoverable conditions end here.
pub trait SystemPort {
    /// Record `reason` and request a controlled restart.  On host builds the
    /// adapter records the request and returns.
    fn fatal(&mut self, reason: &str);
}

// ───────────────────────────────────────────────────────────────
// Rule source (filesystem)
// ───────────────────────────────────────────────────────────────

pub trait RuleSource {
    fn read_rules(&self, path: &str) -> Result<String, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Composite host bounds
// ───────────────────────────────────────────────────────────────

/// Registries the compiler validates identifiers against.
pub trait BindingCatalog: TelemetryRegistry + CommandDispatcher + DeviceFieldRegistry {}

impl<T: TelemetryRegistry + CommandDispatcher + DeviceFieldRegistry> BindingCatalog for T {}

/// Everything a rule run can touch.  A single `&mut impl RuleHost` avoids
/// juggling several mutable borrows across the evaluator.
pub trait RuleHost:
    BindingCatalog + SensorRegistry + TimerPort + ClockPort + DiagnosticsSink + SystemPort
{
}

impl<T> RuleHost for T where
    T: BindingCatalog + SensorRegistry + TimerPort + ClockPort + DiagnosticsSink + SystemPort
{
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists engine configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    /// Returns [`EngineConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<EngineConfig, ConfigError>;

    fn save(&self, config: &EngineConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for config and crash logs.
///
/// Write operations MUST be atomic: no partial writes on power loss.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// The `&'static str` names the field and the allowed range.
    ValidationFailed(&'static str),
    IoError,
}

/// Errors from [`StoragePort`] and [`RuleSource`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
    /// Stored bytes are not valid UTF-8 rule text.
    InvalidText,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidText => write!(f, "invalid text"),
        }
    }
}
