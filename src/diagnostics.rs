//! Rule-run diagnostics and crash logging.
//!
//! Every completed rule run is written to the [`DiagnosticsSink`] as:
//!
//! ```text
//! ==== <rule name> ====
//! >>> local variables
//! $x = 1
//! >>> global variables
//! #count = 3
//! <<< <rule name> took 412 us
//! ```
//!
//! Fatal engine conditions (memory exhaustion, panics) are stored in a
//! 4-slot NVS ring buffer under the "crash" namespace before the controlled
//! restart, so the next boot can report what happened.

use core::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::app::ports::{DiagnosticsSink, StoragePort};
use crate::rules::{RuleEngine, RunReport};

pub const CRASH_RING_SLOTS: usize = 4;
const CRASH_NAMESPACE: &str = "crash";
const CRASH_INDEX_KEY: &str = "crash_idx";

// ───────────────────────────────────────────────────────────────
// Run reports
// ───────────────────────────────────────────────────────────────

fn emit_block(sink: &mut impl DiagnosticsSink, dump: &str) {
    for line in dump.lines() {
        sink.line(line);
    }
}

/// Write one run report (without its chained runs).
pub fn emit_run_report(report: &RunReport, sink: &mut impl DiagnosticsSink) {
    sink.line(&format!("==== {} ====", report.name));
    sink.line(">>> local variables");
    emit_block(sink, &report.locals);
    sink.line(">>> global variables");
    emit_block(sink, &report.globals);
    sink.line(&format!("<<< {} took {} us", report.name, report.elapsed_us));
}

/// Every rule's current locals, then the globals.
pub fn emit_engine_dump(engine: &RuleEngine, sink: &mut impl DiagnosticsSink) {
    if !engine.is_loaded() {
        sink.line("no rules loaded");
        return;
    }
    for index in 0..engine.rule_count() {
        let name = engine.rule_name(index).unwrap_or("?");
        sink.line(&format!("==== {} ====", name));
        sink.line(">>> local variables");
        if let Some(locals) = engine.format_locals(index) {
            emit_block(sink, &locals);
        }
    }
    sink.line(">>> global variables");
    emit_block(sink, &engine.format_globals());
}

// ───────────────────────────────────────────────────────────────
// Crash log
// ───────────────────────────────────────────────────────────────

fn bounded<const N: usize>(text: &str) -> heapless::String<N> {
    let mut end = text.len().min(N);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut s = heapless::String::new();
    let _ = s.push_str(&text[..end]);
    s
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashEntry {
    pub uptime_secs: u64,
    pub reason: heapless::String<64>,
    /// Rule running when the crash happened, empty if none.
    pub rule: heapless::String<48>,
}

impl CrashEntry {
    pub fn new(uptime_secs: u64, reason: &str, rule: &str) -> Self {
        Self {
            uptime_secs,
            reason: bounded(reason),
            rule: bounded(rule),
        }
    }
}

/// NVS-backed ring buffer of [`CrashEntry`] values.
#[derive(Debug, Default)]
pub struct CrashLog {
    write_index: usize,
}

impl CrashLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after the last written slot.
    pub fn init(&mut self, nvs: &impl StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = nvs.read(CRASH_NAMESPACE, CRASH_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % CRASH_RING_SLOTS;
        }
    }

    pub fn record(&mut self, nvs: &mut impl StoragePort, entry: &CrashEntry) {
        let key = Self::slot_key(self.write_index);
        match postcard::to_allocvec(entry) {
            Ok(bytes) => {
                if let Err(e) = nvs.write(CRASH_NAMESPACE, &key, &bytes) {
                    log::error!("CrashLog: slot {} not written, {}", self.write_index, e);
                }
            }
            Err(e) => log::error!("CrashLog: encode failed, {}", e),
        }

        self.write_index = (self.write_index + 1) % CRASH_RING_SLOTS;
        let idx = (self.write_index as u32).to_le_bytes();
        if let Err(e) = nvs.write(CRASH_NAMESPACE, CRASH_INDEX_KEY, &idx) {
            log::error!("CrashLog: ring index {} not written, {}", self.write_index, e);
        }
    }

    /// Stored entries, oldest first.
    pub fn entries(&self, nvs: &impl StoragePort) -> heapless::Vec<CrashEntry, CRASH_RING_SLOTS> {
        let mut out = heapless::Vec::new();
        for offset in 0..CRASH_RING_SLOTS {
            let slot = (self.write_index + offset) % CRASH_RING_SLOTS;
            let mut buf = [0u8; 160];
            let Ok(len) = nvs.read(CRASH_NAMESPACE, &Self::slot_key(slot), &mut buf) else {
                continue;
            };
            if let Ok(entry) = postcard::from_bytes::<CrashEntry>(&buf[..len]) {
                let _ = out.push(entry);
            }
        }
        out
    }

    pub fn clear(&mut self, nvs: &mut impl StoragePort) {
        for slot in 0..CRASH_RING_SLOTS {
            let _ = nvs.delete(CRASH_NAMESPACE, &Self::slot_key(slot));
        }
        let _ = nvs.delete(CRASH_NAMESPACE, CRASH_INDEX_KEY);
        self.write_index = 0;
    }

    fn slot_key(index: usize) -> heapless::String<8> {
        let mut s = heapless::String::new();
        let _ = write!(s, "e{}", index);
        s
    }
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that persists the panic message as a crash entry.
///
/// Call once during init, after NVS is ready.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {}", reason);

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: esp_timer_get_time reads the RTC counter and does not
            // allocate, so it is usable from the panic context.
            let uptime = (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000;
            let entry = CrashEntry::new(uptime, reason, "");
            match crate::adapters::nvs::NvsStorage::new() {
                Ok(mut nvs) => {
                    let mut crash_log = CrashLog::new();
                    crash_log.init(&nvs);
                    crash_log.record(&mut nvs, &entry);
                }
                Err(_) => log::error!("Panic handler: NVS unavailable, crash entry not persisted"),
            }
        }
    }));
}
