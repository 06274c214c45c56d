//! Heat-pump host adapter.
//!
//! Holds the decoded telemetry, the command table, the OpenTherm field table
//! and the one-wire readings in memory, and implements every port a rule run
//! touches ([`RuleHost`](crate::app::ports::RuleHost)).
//!
//! ```text
//!  serial decoder ──update_topic()──▶ ┌──────────────┐ ──take_command()──▶ serial writer
//!  OpenTherm      ──update_field()──▶ │ HeatPumpHost │
//!  one-wire       ──update_sensor()─▶ └──────────────┘
//!                         │ changed value
//!                         ▼
//!                  Trigger::Event ──▶ TriggerQueue
//! ```
//!
//! Outbound commands wait in a 10-entry buffer; when the serial writer falls
//! behind, new commands are dropped with a warning.

use heapless::Deque;
use log::{debug, warn};

use crate::app::commands::Trigger;
use crate::app::ports::{
    ClockPort, CommandDispatcher, DeviceField, DeviceFieldRegistry, DiagnosticsSink,
    EncodedCommand, ExpiredTimer, FieldDirection, FieldType, FieldValue, LocalTime,
    SensorReading, SensorRegistry, StoragePort, SystemPort, TelemetryRegistry, TimerPort,
};
use crate::rules::token::SENSOR_PREFIX;
use crate::timerqueue::TimerQueue;

use super::log_sink::LogDiagnosticsSink;
use super::system::SystemController;
use super::time::SystemClock;

pub const COMMAND_BUFFER_LEN: usize = 10;

/// Topic text capacity; the decoder never produces longer values.
pub type TopicValue = heapless::String<16>;

pub const TOPICS: &[&str] = &[
    "Heatpump_State",
    "Pump_Flow",
    "Force_DHW_State",
    "Quiet_Mode_Schedule",
    "Operating_Mode_State",
    "Main_Inlet_Temp",
    "Main_Outlet_Temp",
    "Main_Target_Temp",
    "Compressor_Freq",
    "DHW_Target_Temp",
    "DHW_Temp",
    "Operations_Hours",
    "Operations_Counter",
    "Main_Schedule_State",
    "Outside_Temp",
    "Heat_Energy_Production",
    "Heat_Energy_Consumption",
    "Powerful_Mode_Time",
    "Quiet_Mode_Level",
    "Holiday_Mode_State",
    "ThreeWay_Valve_State",
    "Outside_Pipe_Temp",
    "DHW_Heat_Delta",
    "Heat_Delta",
    "Cool_Delta",
    "DHW_Holiday_Shift_Temp",
    "Defrosting_State",
    "Z1_Heat_Request_Temp",
    "Z1_Cool_Request_Temp",
    "Room_Thermostat_Temp",
    "Z2_Heat_Request_Temp",
    "Z2_Cool_Request_Temp",
    "Z1_Water_Temp",
    "Z2_Water_Temp",
    "Error",
    "Buffer_Temp",
    "Solar_Temp",
    "Pool_Temp",
];

pub const COMMANDS: &[&str] = &[
    "SetHeatpump",
    "SetPump",
    "SetPumpSpeed",
    "SetQuietMode",
    "SetZ1HeatRequestTemperature",
    "SetZ1CoolRequestTemperature",
    "SetZ2HeatRequestTemperature",
    "SetZ2CoolRequestTemperature",
    "SetForceDHW",
    "SetForceDefrost",
    "SetForceSterilization",
    "SetHolidayMode",
    "SetPowerfulMode",
    "SetOperationMode",
    "SetDHWTemp",
];

/// Only meaningful with the optional PCB fitted.
pub const OPTIONAL_COMMANDS: &[&str] = &[
    "SetHeatCoolMode",
    "SetCompressorState",
    "SetSmartGridMode",
    "SetExternalThermostat1State",
    "SetExternalThermostat2State",
    "SetDemandControl",
    "SetPoolTemp",
    "SetBufferTemp",
    "SetZ1RoomTemp",
    "SetZ1WaterTemp",
    "SetZ2RoomTemp",
    "SetZ2WaterTemp",
    "SetSolarTemp",
];

fn field(name: &'static str, kind: FieldType, direction: FieldDirection) -> DeviceField {
    DeviceField {
        name,
        kind,
        direction,
        value: match kind {
            FieldType::Bool => FieldValue::Bool(false),
            FieldType::Float => FieldValue::Float(0.0),
        },
    }
}

/// OpenTherm gateway fields exposed as `?name`.
pub fn opentherm_fields() -> Vec<DeviceField> {
    use FieldDirection::{ReadOnly, ReadWrite, WriteOnly};
    use FieldType::{Bool, Float};
    vec![
        field("chEnable", Bool, ReadOnly),
        field("dhwEnable", Bool, ReadOnly),
        field("coolingEnable", Bool, ReadOnly),
        field("chSetpoint", Float, ReadOnly),
        field("roomTemp", Float, ReadOnly),
        field("roomTempSet", Float, ReadOnly),
        field("dhwSetpoint", Float, ReadOnly),
        field("chPressure", Float, WriteOnly),
        field("outsideTemp", Float, ReadWrite),
        field("inletTemp", Float, ReadWrite),
        field("outletTemp", Float, ReadWrite),
        field("dhwTemp", Float, ReadWrite),
        field("flameState", Bool, WriteOnly),
        field("chState", Bool, WriteOnly),
        field("dhwState", Bool, WriteOnly),
        field("coolingState", Bool, WriteOnly),
        field("relativeModulation", Float, WriteOnly),
    ]
}

fn canonical(table: &'static [&'static str], name: &str) -> Option<&'static str> {
    table.iter().copied().find(|c| c.eq_ignore_ascii_case(name))
}

// ───────────────────────────────────────────────────────────────
// HeatPumpHost
// ───────────────────────────────────────────────────────────────

pub struct HeatPumpHost<S: StoragePort> {
    topics: Vec<TopicValue>,
    fields: Vec<DeviceField>,
    sensors: Vec<SensorReading>,
    outbox: Deque<EncodedCommand, COMMAND_BUFFER_LEN>,
    dropped_commands: u32,
    timers: TimerQueue,
    clock: SystemClock,
    sink: LogDiagnosticsSink,
    system: SystemController<S>,
}

impl<S: StoragePort> HeatPumpHost<S> {
    pub fn new(system: SystemController<S>) -> Self {
        Self {
            topics: vec![TopicValue::new(); TOPICS.len()],
            fields: opentherm_fields(),
            sensors: Vec::new(),
            outbox: Deque::new(),
            dropped_commands: 0,
            timers: TimerQueue::new(),
            clock: SystemClock::new(),
            sink: LogDiagnosticsSink::new(),
            system,
        }
    }

    // ── Inbound updates ───────────────────────────────────────

    /// Store a decoded value.  Returns the `@topic` event when it changed.
    pub fn update_topic(&mut self, name: &str, value: &str) -> Option<Trigger> {
        let index = self.find_topic(name)?;
        let slot = &mut self.topics[index];
        if slot.as_str() == value {
            return None;
        }
        slot.clear();
        if slot.push_str(value).is_err() {
            warn!("HeatPump: value for {} too long ({} bytes), stored empty", TOPICS[index], value.len());
        }
        Trigger::event("@", TOPICS[index])
    }

    /// Store an OpenTherm value.  Returns the `?field` event when it changed.
    pub fn update_field(&mut self, name: &str, value: FieldValue) -> Option<Trigger> {
        let index = self.find_field(name)?;
        let field = &mut self.fields[index];
        let value = match (field.kind, value) {
            (FieldType::Bool, FieldValue::Float(f)) => FieldValue::Bool(f != 0.0),
            (FieldType::Float, FieldValue::Bool(b)) => FieldValue::Float(if b { 1.0 } else { 0.0 }),
            (_, v) => v,
        };
        if field.value == value {
            return None;
        }
        field.value = value;
        Trigger::event("?", field.name)
    }

    /// Store a one-wire reading.  Returns the `ds18b20#<address>` event when
    /// the temperature changed or the sensor is new.
    pub fn update_sensor(&mut self, address: &str, temperature: f32) -> Option<Trigger> {
        match self
            .sensors
            .iter_mut()
            .find(|s| s.address.eq_ignore_ascii_case(address))
        {
            Some(s) if s.temperature == temperature => return None,
            Some(s) => s.temperature = temperature,
            None => {
                let mut addr = heapless::String::new();
                addr.push_str(address).ok()?;
                self.sensors.push(SensorReading { address: addr, temperature });
            }
        }
        Trigger::event(SENSOR_PREFIX, address)
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Oldest queued command, for the serial writer.
    pub fn take_command(&mut self) -> Option<EncodedCommand> {
        self.outbox.pop_front()
    }

    pub fn pending_commands(&self) -> usize {
        self.outbox.len()
    }

    pub fn dropped_commands(&self) -> u32 {
        self.dropped_commands
    }

    // ── Time ──────────────────────────────────────────────────

    /// Move the timer queue forward; called once per second by the main loop.
    pub fn tick(&mut self, secs: u32) {
        self.timers.advance(secs);
    }

    pub fn system(&self) -> &SystemController<S> {
        &self.system
    }
}

impl<S: StoragePort> TelemetryRegistry for HeatPumpHost<S> {
    fn topic_count(&self) -> usize {
        TOPICS.len()
    }

    fn topic_name(&self, index: usize) -> Option<&str> {
        TOPICS.get(index).copied()
    }

    fn topic_value(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(TopicValue::as_str)
    }
}

impl<S: StoragePort> CommandDispatcher for HeatPumpHost<S> {
    fn is_command(&self, name: &str) -> bool {
        canonical(COMMANDS, name).is_some() || canonical(OPTIONAL_COMMANDS, name).is_some()
    }

    fn is_optional(&self, name: &str) -> bool {
        canonical(OPTIONAL_COMMANDS, name).is_some()
    }

    /// The payload travels as text; the serial writer owns the Panasonic
    /// frame layout and checksum.
    fn encode(&self, name: &str, payload: &str) -> Option<EncodedCommand> {
        let name = canonical(COMMANDS, name).or_else(|| canonical(OPTIONAL_COMMANDS, name))?;
        let mut log_line = heapless::String::new();
        log_line.push_str(name).ok()?;
        log_line.push('=').ok()?;
        log_line.push_str(payload).ok()?;
        let mut bytes = heapless::Vec::new();
        bytes.extend_from_slice(log_line.as_bytes()).ok()?;
        Some(EncodedCommand { bytes, log_line })
    }

    fn send(&mut self, command: &EncodedCommand) {
        if self.outbox.push_back(command.clone()).is_err() {
            self.dropped_commands = self.dropped_commands.wrapping_add(1);
            warn!("HeatPump: command buffer full, dropped {}", command.log_line);
            return;
        }
        debug!("HeatPump: queued {} ({} pending)", command.log_line, self.outbox.len());
    }
}

impl<S: StoragePort> DeviceFieldRegistry for HeatPumpHost<S> {
    fn fields(&self) -> &[DeviceField] {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut [DeviceField] {
        &mut self.fields
    }
}

impl<S: StoragePort> SensorRegistry for HeatPumpHost<S> {
    fn sensors(&self) -> &[SensorReading] {
        &self.sensors
    }
}

impl<S: StoragePort> TimerPort for HeatPumpHost<S> {
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

impl<S: StoragePort> ClockPort for HeatPumpHost<S> {
    fn local_time(&self) -> Option<LocalTime> {
        self.clock.local_time()
    }

    fn uptime_us(&self) -> u64 {
        self.clock.uptime_us()
    }
}

impl<S: StoragePort> DiagnosticsSink for HeatPumpHost<S> {
    fn line(&mut self, text: &str) {
        self.sink.line(text);
    }
}

impl<S: StoragePort> SystemPort for HeatPumpHost<S> {
    fn fatal(&mut self, reason: &str) {
        self.system.fatal(reason);
    }
}
