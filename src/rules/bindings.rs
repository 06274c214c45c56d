//! Reads and writes of externally bound names.
//!
//! `$locals` and `#globals` live in the engine's [`VarTable`]s; everything
//! else goes through the host ports:
//!
//! | Binding       | Read                           | Write                              |
//! |---------------|--------------------------------|------------------------------------|
//! | `@topic`      | decoded text parsed to a value | encoded and sent as a command      |
//! | `@command`    | topic of the same name, if any | encoded and sent                   |
//! | `?field`      | bool → 0/1, float              | bool ← truthy, float ← value       |
//! | `%time`       | local clock, `NULL` if unsynced | rejected at compile time          |
//! | `ds18b20#…`   | last temperature               | rejected at compile time           |
//!
//! While a rule set is loading, its check pass may evaluate assignments but
//! no write reaches the heat pump or the device fields.  Outside of loading,
//! sending is also suppressed in listen-only mode, and for optional-PCB
//! commands unless the optional PCB is enabled.
//!
//! [`VarTable`]: crate::rules::store::VarTable

use log::{debug, info};

use crate::app::ports::{FieldType, FieldValue, RuleHost};
use crate::config::EngineConfig;
use crate::error::LookupMiss;
use crate::rules::token::{Binding, TimeField};
use crate::rules::value::Value;

/// Whether rule runs may reach the heat pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// A rule set is being compiled and checked; external writes are dropped.
    Loading,
    Live,
}

/// Command gating taken from the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchPolicy {
    pub listen_only: bool,
    pub optional_pcb: bool,
}

impl From<&EngineConfig> for DispatchPolicy {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            listen_only: cfg.listen_only,
            optional_pcb: cfg.optional_pcb,
        }
    }
}

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent,
    /// Blocked by mode or policy.
    Suppressed,
    Updated,
    /// `NULL` value, read-only field, or a binding with no external state.
    Ignored,
}

/// Strip the one-byte sigil.
fn bare(name: &str) -> &str {
    name.get(1..).unwrap_or("")
}

/// Current value of an external binding.  Local and global names are not
/// handled here and read as `Null`.
pub fn read(binding: Binding, name: &str, host: &impl RuleHost) -> Result<Value, LookupMiss> {
    match binding {
        Binding::Telemetry(index) => host
            .topic_value(usize::from(index))
            .map(Value::parse)
            .ok_or(LookupMiss::Topic),
        Binding::Command => Ok(host
            .find_topic(bare(name))
            .and_then(|i| host.topic_value(i))
            .map_or(Value::Null, Value::parse)),
        Binding::DeviceField(index) => {
            let field = host.fields().get(usize::from(index)).ok_or(LookupMiss::DeviceField)?;
            Ok(match field.value {
                FieldValue::Bool(b) => Value::Integer(i32::from(b)),
                FieldValue::Float(f) => Value::from_float(f),
            })
        }
        Binding::Time(field) => Ok(host.local_time().map_or(Value::Null, |t| {
            Value::Integer(i32::from(match field {
                TimeField::Hour => t.hour,
                TimeField::Minute => t.minute,
                TimeField::Month => t.month,
                TimeField::Day => t.weekday + 1,
            }))
        })),
        Binding::Sensor(address) => host
            .sensors()
            .iter()
            .find(|s| s.address.as_bytes().eq_ignore_ascii_case(&address))
            .map(|s| Value::from_float(s.temperature))
            .ok_or(LookupMiss::Sensor),
        Binding::Local | Binding::Global | Binding::None => Ok(Value::Null),
    }
}

/// Apply an assignment to an external binding.
pub fn write(
    binding: Binding,
    name: &str,
    value: Value,
    mode: EngineMode,
    policy: DispatchPolicy,
    host: &mut impl RuleHost,
) -> Result<WriteOutcome, LookupMiss> {
    match binding {
        Binding::Telemetry(_) | Binding::Command => send_command(bare(name), value, mode, policy, host),
        Binding::DeviceField(_) if mode == EngineMode::Loading => {
            debug!("bindings: {} suppressed while loading", name);
            Ok(WriteOutcome::Suppressed)
        }
        Binding::DeviceField(index) => {
            let field = host
                .fields_mut()
                .get_mut(usize::from(index))
                .ok_or(LookupMiss::DeviceField)?;
            if !field.direction.writable() || value.is_null() {
                return Ok(WriteOutcome::Ignored);
            }
            field.value = match field.kind {
                FieldType::Bool => FieldValue::Bool(value.truthy()),
                FieldType::Float => FieldValue::Float(value.as_f32().unwrap_or_default()),
            };
            debug!("bindings: ?{} <- {}", field.name, value);
            Ok(WriteOutcome::Updated)
        }
        _ => Ok(WriteOutcome::Ignored),
    }
}

fn send_command(
    command: &str,
    value: Value,
    mode: EngineMode,
    policy: DispatchPolicy,
    host: &mut impl RuleHost,
) -> Result<WriteOutcome, LookupMiss> {
    if value.is_null() {
        return Ok(WriteOutcome::Ignored);
    }
    if mode == EngineMode::Loading || policy.listen_only {
        debug!("bindings: @{} suppressed ({:?}, listen_only={})", command, mode, policy.listen_only);
        return Ok(WriteOutcome::Suppressed);
    }
    if host.is_optional(command) && !policy.optional_pcb {
        debug!("bindings: @{} needs the optional PCB", command);
        return Ok(WriteOutcome::Suppressed);
    }
    let payload = value.to_string();
    let encoded = host.encode(command, &payload).ok_or(LookupMiss::Command)?;
    info!("{}", encoded.log_line);
    host.send(&encoded);
    Ok(WriteOutcome::Sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{DeviceFieldRegistry, LocalTime, TelemetryRegistry};
    use crate::rules::testing::StubHost;

    const LIVE: EngineMode = EngineMode::Live;

    fn topic(host: &StubHost, name: &str) -> Binding {
        Binding::Telemetry(host.find_topic(name).unwrap() as u16)
    }

    #[test]
    fn telemetry_reads_parse_decoded_text() {
        let host = StubHost::new();
        let b = topic(&host, "Outside_Temp");
        assert_eq!(read(b, "@Outside_Temp", &host), Ok(Value::Integer(7)));
        let b = topic(&host, "Main_Outlet_Temp");
        assert_eq!(read(b, "@Main_Outlet_Temp", &host), Ok(Value::Float(34.5)));
        let b = topic(&host, "Pump_Flow");
        assert_eq!(read(b, "@Pump_Flow", &host), Ok(Value::Null));
    }

    #[test]
    fn time_reads_are_null_until_synced() {
        let mut host = StubHost::new();
        let day = Binding::Time(TimeField::Day);
        assert_eq!(read(day, "%day", &host), Ok(Value::Null));
        host.time = Some(LocalTime { hour: 6, minute: 30, month: 12, weekday: 0 });
        assert_eq!(read(day, "%day", &host), Ok(Value::Integer(1)));
        assert_eq!(read(Binding::Time(TimeField::Month), "%month", &host), Ok(Value::Integer(12)));
    }

    #[test]
    fn sensor_reads_match_address() {
        let host = StubHost::new();
        let hit = Binding::Sensor(*b"28610695f0ff3c01");
        assert_eq!(read(hit, "", &host), Ok(Value::Float(19.25)));
        let miss = Binding::Sensor(*b"28610695f0ff3c02");
        assert_eq!(read(miss, "", &host), Err(LookupMiss::Sensor));
    }

    #[test]
    fn command_writes_format_payload() {
        let mut host = StubHost::new();
        let policy = DispatchPolicy::default();
        let out = write(Binding::Command, "@SetHeatpump", Value::Integer(1), LIVE, policy, &mut host);
        assert_eq!(out, Ok(WriteOutcome::Sent));
        let out = write(
            Binding::Command,
            "@SetZ1HeatRequestTemperature",
            Value::Float(21.5),
            LIVE,
            policy,
            &mut host,
        );
        assert_eq!(out, Ok(WriteOutcome::Sent));
        assert_eq!(host.sent, ["SetHeatpump=1", "SetZ1HeatRequestTemperature=21.5"]);
    }

    #[test]
    fn command_writes_are_gated() {
        let mut host = StubHost::new();
        let open = DispatchPolicy::default();
        let v = Value::Integer(1);
        assert_eq!(
            write(Binding::Command, "@SetHeatpump", v, EngineMode::Loading, open, &mut host),
            Ok(WriteOutcome::Suppressed)
        );
        let listen = DispatchPolicy { listen_only: true, optional_pcb: true };
        assert_eq!(
            write(Binding::Command, "@SetHeatpump", v, LIVE, listen, &mut host),
            Ok(WriteOutcome::Suppressed)
        );
        assert_eq!(
            write(Binding::Command, "@SetOptPCB", v, LIVE, open, &mut host),
            Ok(WriteOutcome::Suppressed)
        );
        let pcb = DispatchPolicy { listen_only: false, optional_pcb: true };
        assert_eq!(
            write(Binding::Command, "@SetOptPCB", v, LIVE, pcb, &mut host),
            Ok(WriteOutcome::Sent)
        );
        assert_eq!(
            write(Binding::Command, "@SetHeatpump", Value::Null, LIVE, open, &mut host),
            Ok(WriteOutcome::Ignored)
        );
        assert_eq!(host.sent, ["SetOptPCB=1"]);
    }

    #[test]
    fn field_writes_respect_direction_and_type() {
        let mut host = StubHost::new();
        let p = DispatchPolicy::default();
        let room = Binding::DeviceField(host.find_field("roomTemp").unwrap() as u16);
        let flame = Binding::DeviceField(host.find_field("flameState").unwrap() as u16);
        let ch = Binding::DeviceField(host.find_field("chEnable").unwrap() as u16);

        assert_eq!(write(room, "?roomTemp", Value::Integer(19), LIVE, p, &mut host), Ok(WriteOutcome::Updated));
        assert_eq!(host.field("roomTemp"), Some(FieldValue::Float(19.0)));

        assert_eq!(write(flame, "?flameState", Value::Integer(0), LIVE, p, &mut host), Ok(WriteOutcome::Ignored));
        assert_eq!(host.field("flameState"), Some(FieldValue::Bool(true)));

        assert_eq!(write(ch, "?chEnable", Value::Float(0.5), LIVE, p, &mut host), Ok(WriteOutcome::Updated));
        assert_eq!(host.field("chEnable"), Some(FieldValue::Bool(true)));
        assert_eq!(read(ch, "?chEnable", &host), Ok(Value::Integer(1)));
    }

    #[test]
    fn field_writes_wait_for_live_mode() {
        let mut host = StubHost::new();
        let p = DispatchPolicy::default();
        let room = Binding::DeviceField(host.find_field("roomTemp").unwrap() as u16);
        let before = host.field("roomTemp");
        assert_eq!(
            write(room, "?roomTemp", Value::Integer(30), EngineMode::Loading, p, &mut host),
            Ok(WriteOutcome::Suppressed)
        );
        assert_eq!(host.field("roomTemp"), before);
    }
}
