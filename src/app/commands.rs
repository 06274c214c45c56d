//! Inbound triggers for the rule service.
//!
//! Timer callbacks, the telemetry decoder, the web/console front end and boot
//! all ask for rule work by queueing a [`Trigger`]; the main loop hands each
//! one to [`RuleService::handle`](super::service::RuleService::handle).

use crate::rules::ast::Name;

/// Event prefix (`"@"`, `"?"`, `"ds18b20#"`…).
pub type Prefix = heapless::String<8>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Run `System#Boot`.
    Boot,
    /// Rule timer `id` expired.
    Timer(u32),
    /// A bound value changed; runs the rule named `prefix` + `name`.
    Event { prefix: Prefix, name: Name },
    /// Re-read and recompile the rule file.
    Reload,
    /// Dump every rule's variables to the diagnostics sink.
    DumpDiagnostics,
    /// Unload all rules.
    Shutdown,
}

impl Trigger {
    /// `None` if either part is too long to be a rule name.
    pub fn event(prefix: &str, name: &str) -> Option<Self> {
        let mut p = Prefix::new();
        p.push_str(prefix).ok()?;
        let mut n = Name::new();
        n.push_str(name).ok()?;
        Some(Self::Event { prefix: p, name: n })
    }
}
