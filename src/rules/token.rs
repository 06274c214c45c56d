//! Token classifier.
//!
//! Decides what a textual identifier denotes and how many bytes of the input
//! it spans.  The prefix scheme:
//!
//! | Prefix       | Binding                         | Validated against        |
//! |--------------|---------------------------------|--------------------------|
//! | `$`          | local variable                  | none                     |
//! | `#`          | global variable                 | none                     |
//! | `@`          | command, else telemetry topic   | command + topic lists    |
//! | `?`          | OpenTherm device field          | device-field list        |
//! | `%`          | `hour` `minute` `month` `day`   | fixed set                |
//! | `ds18b20#`   | one-wire sensor (16 hex digits) | fixed length             |
//!
//! Anything else that starts with a letter is a plain name (rule label or
//! function).  Binding names that match no registry entry are rejected here,
//! at compile time, so a rule upload cannot silently reference missing state.

use crate::app::ports::BindingCatalog;

pub const SENSOR_PREFIX: &str = "ds18b20#";
/// Prefix plus 16 hex digits.
pub const SENSOR_NAME_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Local,
    Global,
    Telemetry,
    Command,
    DeviceField,
    Time,
    Sensor,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Hour,
    Minute,
    Month,
    Day,
}

impl TimeField {
    fn from_name(name: &str) -> Option<Self> {
        [
            ("hour", Self::Hour),
            ("minute", Self::Minute),
            ("month", Self::Month),
            ("day", Self::Day),
        ]
        .into_iter()
        .find_map(|(n, f)| n.eq_ignore_ascii_case(name).then_some(f))
    }
}

/// Lower-case hex address of a one-wire sensor.
pub type SensorAddress = [u8; 16];

/// Resolved meaning of an identifier, carried on every variable node so the
/// evaluator dispatches on a closed enum instead of re-reading prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local,
    Global,
    /// Index into the telemetry registry.
    Telemetry(u16),
    Command,
    /// Index into the device-field registry.
    DeviceField(u16),
    Time(TimeField),
    Sensor(SensorAddress),
    None,
}

impl Binding {
    pub fn category(self) -> Category {
        match self {
            Self::Local => Category::Local,
            Self::Global => Category::Global,
            Self::Telemetry(_) => Category::Telemetry,
            Self::Command => Category::Command,
            Self::DeviceField(_) => Category::DeviceField,
            Self::Time(_) => Category::Time,
            Self::Sensor(_) => Category::Sensor,
            Self::None => Category::None,
        }
    }

    /// Whether the name can appear on the left of `=`.
    pub fn assignable(self) -> bool {
        !matches!(self, Self::Time(_) | Self::Sensor(_) | Self::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub binding: Binding,
    /// Bytes of input the identifier spans, sigil included.
    pub len: usize,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of the run of identifier bytes at the start of `text`.
pub fn word_len(text: &str) -> usize {
    text.bytes().take_while(|&b| is_word_byte(b)).count()
}

/// Classify the identifier at the start of `text`.
///
/// Returns `None` when the text does not start with a valid identifier or
/// names a binding that does not exist.
pub fn classify(text: &str, catalog: &impl BindingCatalog) -> Option<Classified> {
    let bytes = text.as_bytes();
    let first = *bytes.first()?;

    if has_sensor_prefix(text) {
        return classify_sensor(bytes);
    }

    if first.is_ascii_alphabetic() || first == b'_' {
        return Some(Classified {
            binding: Binding::None,
            len: word_len(text),
        });
    }
    if !matches!(first, b'$' | b'#' | b'@' | b'?' | b'%') {
        return None;
    }

    let name_len = word_len(&text[1..]);
    if name_len == 0 {
        return None;
    }
    let name = &text[1..=name_len];
    let len = name_len + 1;

    let binding = match first {
        b'$' => Binding::Local,
        b'#' => Binding::Global,
        b'@' => {
            if catalog.is_command(name) {
                Binding::Command
            } else {
                Binding::Telemetry(catalog.find_topic(name)?.try_into().ok()?)
            }
        }
        b'?' => Binding::DeviceField(catalog.find_field(name)?.try_into().ok()?),
        // '%'
        _ => Binding::Time(TimeField::from_name(name)?),
    };
    Some(Classified { binding, len })
}

fn has_sensor_prefix(text: &str) -> bool {
    text.as_bytes()
        .get(..SENSOR_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(SENSOR_PREFIX.as_bytes()))
}

fn classify_sensor(bytes: &[u8]) -> Option<Classified> {
    let digits = bytes.get(SENSOR_PREFIX.len()..SENSOR_NAME_LEN)?;
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    if bytes.get(SENSOR_NAME_LEN).is_some_and(|&b| is_word_byte(b)) {
        return None;
    }
    let mut address = [0u8; 16];
    for (dst, src) in address.iter_mut().zip(digits) {
        *dst = src.to_ascii_lowercase();
    }
    Some(Classified {
        binding: Binding::Sensor(address),
        len: SENSOR_NAME_LEN,
    })
}

/// Whether `name` may label a rule block.
///
/// Binding-shaped names (`@`, `?`, `%`, sensors) must resolve in full;
/// variable sigils can never fire; any other non-blank label is accepted
/// (`System#Boot`, `timer=3`, user function names).
pub fn is_event(name: &str, catalog: &impl BindingCatalog) -> bool {
    let Some(first) = name.bytes().next() else {
        return false;
    };
    match first {
        b'$' | b'#' => false,
        b'@' | b'?' | b'%' => classify(name, catalog).is_some_and(|c| c.len == name.len()),
        _ if has_sensor_prefix(name) => {
            classify(name, catalog).is_some_and(|c| c.len == name.len())
        }
        _ => !name.bytes().any(|b| b.is_ascii_whitespace()),
    }
}
