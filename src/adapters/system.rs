//! System control adapter.
//!
//! Implements [`SystemPort`]: a fatal rule-engine condition is written to
//! the crash log and the chip restarts.  On host builds the request is only
//! recorded so tests can inspect it.

use log::error;

use crate::app::ports::{StoragePort, SystemPort};
use crate::diagnostics::{CRASH_RING_SLOTS, CrashEntry, CrashLog};

use super::time::SystemClock;

pub struct SystemController<S: StoragePort> {
    storage: S,
    crash_log: CrashLog,
    clock: SystemClock,
    restarts_requested: u32,
}

impl<S: StoragePort> SystemController<S> {
    pub fn new(storage: S) -> Self {
        let mut crash_log = CrashLog::new();
        crash_log.init(&storage);
        Self {
            storage,
            crash_log,
            clock: SystemClock::new(),
            restarts_requested: 0,
        }
    }

    pub fn crash_entries(&self) -> heapless::Vec<CrashEntry, CRASH_RING_SLOTS> {
        self.crash_log.entries(&self.storage)
    }

    pub fn clear_crash_log(&mut self) {
        self.crash_log.clear(&mut self.storage);
    }

    pub fn restarts_requested(&self) -> u32 {
        self.restarts_requested
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<S: StoragePort> SystemPort for SystemController<S> {
    fn fatal(&mut self, reason: &str) {
        error!("System: fatal, {}", reason);
        let entry = CrashEntry::new(self.clock.uptime_secs(), reason, "");
        self.crash_log.record(&mut self.storage, &entry);
        self.restarts_requested = self.restarts_requested.wrapping_add(1);

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: does not return; NVS writes above are committed.
            unsafe { esp_idf_svc::sys::esp_restart() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStorage;

    #[test]
    fn fatal_records_crash_entry() {
        let mut sys = SystemController::new(NvsStorage::new().unwrap());
        sys.fatal("global variable table full");
        assert_eq!(sys.restarts_requested(), 1);
        let entries = sys.crash_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason.as_str(), "global variable table full");

        sys.clear_crash_log();
        assert!(sys.crash_entries().is_empty());
    }
}
