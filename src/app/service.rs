//! Rule service, the entry points the rest of the firmware calls.
//!
//! [`RuleService`] wraps the [`RuleEngine`] and maps outside happenings onto
//! rule names.  All I/O flows through port traits passed in at each call, so
//! the service runs unchanged against the mock host in tests.
//!
//! ```text
//!  RuleSource ──▶ ┌────────────────────────┐ ──▶ DiagnosticsSink
//!                 │      RuleService       │
//!  Trigger ─────▶ │  boot · timer · event  │ ──▶ CommandDispatcher
//!                 └────────────────────────┘
//! ```
//!
//! | Entry point      | Rule run                 |
//! |------------------|--------------------------|
//! | `boot`           | `System#Boot`            |
//! | `on_timer(3)`    | `timer=3`                |
//! | `on_event("@", "Outside_Temp")` | `@Outside_Temp` |

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::diagnostics;
use crate::rules::{RuleEngine, RunReport};

use super::commands::Trigger;
use super::ports::{DiagnosticsSink, RuleHost, RuleSource, TimerPort};

/// Rule run at startup.
pub const BOOT_RULE: &str = "System#Boot";

// ───────────────────────────────────────────────────────────────
// RuleService
// ───────────────────────────────────────────────────────────────

pub struct RuleService {
    engine: RuleEngine,
    /// Successful loads since start.
    loads: u32,
}

impl RuleService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: RuleEngine::new(config),
            loads: 0,
        }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RuleEngine {
        &mut self.engine
    }

    pub fn load_count(&self) -> u32 {
        self.loads
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Run `System#Boot` if the loaded rules define it.
    pub fn boot(&mut self, host: &mut impl RuleHost) -> Option<RunReport> {
        self.run_named(BOOT_RULE, host)
    }

    /// Release every rule and variable.  Idempotent.
    pub fn deinitialize(&mut self) {
        self.engine.deinitialize();
    }

    /// Read `path` and make it the active rule set.
    ///
    /// On failure the previously loaded rules stay active.
    pub fn load(&mut self, path: &str, source: &impl RuleSource, host: &mut impl RuleHost) -> bool {
        let text = match source.read_rules(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("RuleService: cannot read {}: {}", path, e);
                return false;
            }
        };
        match self.engine.parse(&text, host) {
            Ok(count) => {
                self.loads = self.loads.wrapping_add(1);
                info!("RuleService: loaded {} rules from {}", count, path);
                true
            }
            Err(e) => {
                warn!("RuleService: {} rejected, {}", path, e);
                false
            }
        }
    }

    // ── Triggers ──────────────────────────────────────────────

    pub fn on_timer(&mut self, id: u32, host: &mut impl RuleHost) -> Option<RunReport> {
        self.run_named(&format!("timer={}", id), host)
    }

    /// Run the rule named `prefix` + `name`, e.g. `@` + `Outside_Temp`.
    pub fn on_event(&mut self, prefix: &str, name: &str, host: &mut impl RuleHost) -> Option<RunReport> {
        let mut event = String::with_capacity(prefix.len() + name.len());
        event.push_str(prefix);
        event.push_str(name);
        self.run_named(&event, host)
    }

    /// Run the rule for every timer that has expired.  Returns how many fired.
    pub fn service_timers(&mut self, host: &mut impl RuleHost) -> usize {
        let mut fired = 0;
        while let Some(timer) = TimerPort::pop(host) {
            fired += 1;
            self.on_timer(timer.id, host);
        }
        fired
    }

    pub fn run_diagnostics_dump(&self, sink: &mut impl DiagnosticsSink) {
        diagnostics::emit_engine_dump(&self.engine, sink);
    }

    /// Dispatch one queued trigger.  Reloads read from the configured path.
    pub fn handle(&mut self, trigger: Trigger, source: &impl RuleSource, host: &mut impl RuleHost) {
        match trigger {
            Trigger::Boot => {
                self.boot(host);
            }
            Trigger::Timer(id) => {
                self.on_timer(id, host);
            }
            Trigger::Event { prefix, name } => {
                self.on_event(&prefix, &name, host);
            }
            Trigger::Reload => {
                let path = self.engine.config().rules_path.clone();
                if self.load(&path, source, host) {
                    self.boot(host);
                }
            }
            Trigger::DumpDiagnostics => self.run_diagnostics_dump(host),
            Trigger::Shutdown => self.deinitialize(),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Engine state as JSON for the web front end.
    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.engine.snapshot())
    }

    fn run_named(&mut self, name: &str, host: &mut impl RuleHost) -> Option<RunReport> {
        let Some(index) = self.engine.rule_by_name(name) else {
            debug!("RuleService: no rule '{}'", name);
            return None;
        };
        match self.engine.run(index, host) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("RuleService: '{}' failed, {}", name, e);
                None
            }
        }
    }
}
