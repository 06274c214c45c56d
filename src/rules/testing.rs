//! In-memory [`RuleHost`](crate::app::ports::RuleHost) for unit tests.
//!
//! Registries are plain vectors; everything the engine pushes out (commands,
//! diagnostic lines, fatal reasons) is recorded for assertions.

use core::cell::Cell;

use crate::app::ports::{
    ClockPort, CommandDispatcher, DeviceField, DeviceFieldRegistry, DiagnosticsSink,
    EncodedCommand, ExpiredTimer, FieldDirection, FieldType, FieldValue, LocalTime,
    SensorReading, SensorRegistry, SystemPort, TelemetryRegistry, TimerPort,
};
use crate::timerqueue::TimerQueue;

pub(crate) struct StubHost {
    pub topics: Vec<(&'static str, String)>,
    pub commands: Vec<&'static str>,
    pub optional: Vec<&'static str>,
    pub fields: Vec<DeviceField>,
    pub sensors: Vec<SensorReading>,
    pub timers: TimerQueue,
    pub time: Option<LocalTime>,
    pub uptime: Cell<u64>,
    /// `log_line` of every sent command.
    pub sent: Vec<String>,
    pub lines: Vec<String>,
    pub fatal: Vec<String>,
}

impl StubHost {
    pub fn new() -> Self {
        let mut address = heapless::String::new();
        let _ = address.push_str("28610695f0ff3c01");
        Self {
            topics: vec![
                ("Heatpump_State", "1".to_owned()),
                ("Outside_Temp", "7".to_owned()),
                ("Main_Outlet_Temp", "34.5".to_owned()),
                ("Pump_Flow", String::new()),
            ],
            commands: vec!["SetHeatpump", "SetZ1HeatRequestTemperature", "SetOptPCB"],
            optional: vec!["SetOptPCB"],
            fields: vec![
                DeviceField {
                    name: "roomTemp",
                    kind: FieldType::Float,
                    direction: FieldDirection::ReadWrite,
                    value: FieldValue::Float(20.5),
                },
                DeviceField {
                    name: "flameState",
                    kind: FieldType::Bool,
                    direction: FieldDirection::ReadOnly,
                    value: FieldValue::Bool(true),
                },
                DeviceField {
                    name: "chEnable",
                    kind: FieldType::Bool,
                    direction: FieldDirection::WriteOnly,
                    value: FieldValue::Bool(false),
                },
            ],
            sensors: vec![SensorReading {
                address,
                temperature: 19.25,
            }],
            timers: TimerQueue::new(),
            time: None,
            uptime: Cell::new(0),
            sent: Vec::new(),
            lines: Vec::new(),
            fatal: Vec::new(),
        }
    }

    pub fn set_topic(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.topics.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            entry.1 = value.to_owned();
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value)
    }
}

impl TelemetryRegistry for StubHost {
    fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn topic_name(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(|(n, _)| *n)
    }

    fn topic_value(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(|(_, v)| v.as_str())
    }
}

impl CommandDispatcher for StubHost {
    fn is_command(&self, name: &str) -> bool {
        self.commands.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn is_optional(&self, name: &str) -> bool {
        self.optional.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn encode(&self, name: &str, payload: &str) -> Option<EncodedCommand> {
        let canonical = self.commands.iter().find(|c| c.eq_ignore_ascii_case(name))?;
        let mut log_line = heapless::String::new();
        let _ = log_line.push_str(canonical);
        let _ = log_line.push('=');
        let _ = log_line.push_str(payload);
        let mut bytes = heapless::Vec::new();
        let _ = bytes.extend_from_slice(payload.as_bytes());
        Some(EncodedCommand { bytes, log_line })
    }

    fn send(&mut self, command: &EncodedCommand) {
        self.sent.push(command.log_line.as_str().to_owned());
    }
}

impl DeviceFieldRegistry for StubHost {
    fn fields(&self) -> &[DeviceField] {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut [DeviceField] {
        &mut self.fields
    }
}

impl SensorRegistry for StubHost {
    fn sensors(&self) -> &[SensorReading] {
        &self.sensors
    }
}

impl TimerPort for StubHost {
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

impl ClockPort for StubHost {
    fn local_time(&self) -> Option<LocalTime> {
        self.time
    }

    /// Advances 100 µs per call so elapsed times are non-zero.
    fn uptime_us(&self) -> u64 {
        let now = self.uptime.get() + 100;
        self.uptime.set(now);
        now
    }
}

impl DiagnosticsSink for StubHost {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_owned());
    }
}

impl SystemPort for StubHost {
    fn fatal(&mut self, reason: &str) {
        self.fatal.push(reason.to_owned());
    }
}
