//! Built-in rule functions.
//!
//! Calls are resolved against this fixed table at compile time; an unknown
//! name or an argument count outside the declared range is a parse error.

use log::{debug, warn};

use crate::app::ports::TimerPort;
use crate::rules::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Max,
    Min,
    Coalesce,
    Round,
    SetTimer,
    IsSet,
}

struct Entry {
    name: &'static str,
    builtin: Builtin,
    min_args: u8,
    max_args: u8,
}

/// Upper bound on variadic argument lists.
pub const MAX_ARGS: usize = 8;

const TABLE: [Entry; 6] = [
    Entry { name: "max", builtin: Builtin::Max, min_args: 1, max_args: MAX_ARGS as u8 },
    Entry { name: "min", builtin: Builtin::Min, min_args: 1, max_args: MAX_ARGS as u8 },
    Entry { name: "coalesce", builtin: Builtin::Coalesce, min_args: 1, max_args: MAX_ARGS as u8 },
    Entry { name: "round", builtin: Builtin::Round, min_args: 1, max_args: 2 },
    Entry { name: "setTimer", builtin: Builtin::SetTimer, min_args: 1, max_args: 2 },
    Entry { name: "isset", builtin: Builtin::IsSet, min_args: 1, max_args: 1 },
];

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        TABLE
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.builtin)
    }

    fn entry(self) -> &'static Entry {
        // Every variant has exactly one row.
        let pos = TABLE.iter().position(|e| e.builtin == self).unwrap_or(0);
        &TABLE[pos]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn accepts(self, argc: usize) -> bool {
        let e = self.entry();
        (e.min_args as usize..=e.max_args as usize).contains(&argc)
    }

    /// Evaluate with already-evaluated arguments.
    pub fn call(self, args: &[Value], timers: &mut impl TimerPort) -> Value {
        match self {
            Self::Max => extreme(args, |candidate, best| candidate > best),
            Self::Min => extreme(args, |candidate, best| candidate < best),
            Self::Coalesce => args.iter().copied().find(|v| !v.is_null()).unwrap_or_default(),
            Self::Round => round(args),
            Self::IsSet => Value::Integer(i32::from(args.first().is_some_and(|v| !v.is_null()))),
            Self::SetTimer => set_timer(args, timers),
        }
    }
}

fn extreme(args: &[Value], better: impl Fn(f32, f32) -> bool) -> Value {
    let mut best = Value::Null;
    for &arg in args {
        let Some(candidate) = arg.as_f32() else {
            continue;
        };
        match best.as_f32() {
            Some(current) if !better(candidate, current) => {}
            _ => best = arg,
        }
    }
    best
}

fn round(args: &[Value]) -> Value {
    let Some(x) = args.first().and_then(|v| v.as_f32()) else {
        return Value::Null;
    };
    match args.get(1) {
        None => {
            let r = x.round();
            if r >= i32::MIN as f32 && r < i32::MAX as f32 {
                Value::Integer(r as i32)
            } else {
                Value::Null
            }
        }
        Some(&Value::Integer(decimals)) if (0..=6).contains(&decimals) => {
            let scale = 10f32.powi(decimals);
            Value::from_float((x * scale).round() / scale)
        }
        Some(_) => Value::Null,
    }
}

fn set_timer(args: &[Value], timers: &mut impl TimerPort) -> Value {
    let Some(id) = args.first().and_then(|v| v.as_integer()).and_then(|i| u32::try_from(i).ok())
    else {
        debug!("setTimer: timer id must be a non-negative integer");
        return Value::Null;
    };
    match args.get(1) {
        None => timers
            .remaining(id)
            .map_or(Value::Null, |secs| Value::Integer(i32::try_from(secs).unwrap_or(i32::MAX))),
        Some(v) => {
            match v.as_integer().and_then(|s| u32::try_from(s).ok()) {
                Some(secs) => {
                    if !timers.insert(secs, false, id) {
                        warn!("setTimer: timer {} not armed, queue full", id);
                    }
                }
                None => debug!("setTimer: delay for timer {} must be a non-negative integer", id),
            }
            Value::Null
        }
    }
}
