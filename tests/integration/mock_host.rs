//! Recording rule host for integration tests.
//!
//! Implements every port a rule run touches.  Sent commands, diagnostic
//! lines and fatal reasons are kept so tests can assert on the full history.

use std::cell::Cell;

use heishamon::app::ports::{
    ClockPort, CommandDispatcher, DeviceField, DeviceFieldRegistry, DiagnosticsSink,
    EncodedCommand, ExpiredTimer, FieldDirection, FieldType, FieldValue, LocalTime, RuleSource,
    SensorReading, SensorRegistry, StorageError, SystemPort, TelemetryRegistry, TimerPort,
};
use heishamon::timerqueue::TimerQueue;

pub struct MockHost {
    pub topics: Vec<(&'static str, String)>,
    pub fields: Vec<DeviceField>,
    pub sensors: Vec<SensorReading>,
    pub timers: TimerQueue,
    pub time: Option<LocalTime>,
    clock_us: Cell<u64>,
    pub sent: Vec<String>,
    pub lines: Vec<String>,
    pub fatal: Vec<String>,
}

const COMMANDS: &[&str] = &["SetHeatpump", "SetDHWTemp", "SetQuietMode", "SetSmartGridMode"];
const OPTIONAL: &[&str] = &["SetSmartGridMode"];

fn field(name: &'static str, kind: FieldType, direction: FieldDirection, value: FieldValue) -> DeviceField {
    DeviceField { name, kind, direction, value }
}

#[allow(dead_code)]
impl MockHost {
    pub fn new() -> Self {
        Self {
            topics: vec![
                ("Heatpump_State", "1".into()),
                ("Outside_Temp", "4".into()),
                ("DHW_Temp", "45.5".into()),
                ("Compressor_Freq", "".into()),
            ],
            fields: vec![
                field("chSetpoint", FieldType::Float, FieldDirection::ReadWrite, FieldValue::Float(35.0)),
                field("roomTemp", FieldType::Float, FieldDirection::ReadOnly, FieldValue::Float(21.0)),
                field("flameState", FieldType::Bool, FieldDirection::WriteOnly, FieldValue::Bool(false)),
            ],
            sensors: Vec::new(),
            timers: TimerQueue::new(),
            time: None,
            clock_us: Cell::new(0),
            sent: Vec::new(),
            lines: Vec::new(),
            fatal: Vec::new(),
        }
    }

    pub fn set_topic(&mut self, name: &str, value: &str) {
        if let Some(t) = self.topics.iter_mut().find(|(n, _)| *n == name) {
            t.1 = value.to_owned();
        }
    }

    pub fn add_sensor(&mut self, address: &str, temperature: f32) {
        let mut a = heapless::String::new();
        a.push_str(address).unwrap();
        self.sensors.push(SensorReading { address: a, temperature });
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value)
    }

    /// Rule names in the order their run headers were emitted.
    pub fn run_headers(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| l.strip_prefix("==== ")?.strip_suffix(" ===="))
            .collect()
    }
}

impl TelemetryRegistry for MockHost {
    fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn topic_name(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(|t| t.0)
    }

    fn topic_value(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(|t| t.1.as_str())
    }
}

impl CommandDispatcher for MockHost {
    fn is_command(&self, name: &str) -> bool {
        COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn is_optional(&self, name: &str) -> bool {
        OPTIONAL.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn encode(&self, name: &str, payload: &str) -> Option<EncodedCommand> {
        let name = COMMANDS.iter().find(|c| c.eq_ignore_ascii_case(name))?;
        let mut log_line = heapless::String::new();
        log_line.push_str(&format!("{name}={payload}")).ok()?;
        Some(EncodedCommand {
            bytes: heapless::Vec::new(),
            log_line,
        })
    }

    fn send(&mut self, command: &EncodedCommand) {
        self.sent.push(command.log_line.to_string());
    }
}

impl DeviceFieldRegistry for MockHost {
    fn fields(&self) -> &[DeviceField] {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut [DeviceField] {
        &mut self.fields
    }
}

impl SensorRegistry for MockHost {
    fn sensors(&self) -> &[SensorReading] {
        &self.sensors
    }
}

impl TimerPort for MockHost {
    fn insert(&mut self, delay_secs: u32, repeat: bool, id: u32) -> bool {
        self.timers.insert(delay_secs, repeat, id)
    }

    fn pop(&mut self) -> Option<ExpiredTimer> {
        self.timers.pop()
    }

    fn remaining(&self, id: u32) -> Option<u32> {
        self.timers.remaining(id)
    }

    fn clear(&mut self) {
        self.timers.clear();
    }
}

impl ClockPort for MockHost {
    fn local_time(&self) -> Option<LocalTime> {
        self.time
    }

    fn uptime_us(&self) -> u64 {
        self.clock_us.set(self.clock_us.get() + 250);
        self.clock_us.get()
    }
}

impl DiagnosticsSink for MockHost {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_owned());
    }
}

impl SystemPort for MockHost {
    fn fatal(&mut self, reason: &str) {
        self.fatal.push(reason.to_owned());
    }
}

// ── Rule sources ──────────────────────────────────────────────

/// Serves one fixed rule text for any path.
pub struct TextSource(pub String);

impl RuleSource for TextSource {
    fn read_rules(&self, _path: &str) -> Result<String, StorageError> {
        Ok(self.0.clone())
    }
}

pub struct MissingSource;

impl RuleSource for MissingSource {
    fn read_rules(&self, _path: &str) -> Result<String, StorageError> {
        Err(StorageError::NotFound)
    }
}
