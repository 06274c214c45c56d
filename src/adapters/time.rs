//! Wall clock and uptime.
//!
//! Implements [`ClockPort`] for the `%hour` / `%minute` / `%month` / `%day`
//! bindings and for rule run timing.
//!
//! - **`target_os = "espidf"`**: uptime from `esp_timer_get_time()`.
//! - **otherwise**: uptime from `std::time::Instant`.
//!
//! Wall-clock time goes through `chrono::Local` on both; the timezone comes
//! from the `TZ` environment the network layer sets after SNTP sync.

use chrono::{DateTime, Datelike, Local, Timelike};

use crate::app::ports::{ClockPort, LocalTime};

/// Anything earlier is an unsynchronised RTC still counting from 1970.
const EPOCH_2020: i64 = 1_577_836_800;

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime_us() / 1_000_000
    }
}

/// Break `now` down for the rule bindings.  `None` before 2020.
pub fn decompose(now: &DateTime<Local>) -> Option<LocalTime> {
    if now.timestamp() < EPOCH_2020 {
        return None;
    }
    Some(LocalTime {
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        month: now.month() as u8,
        weekday: now.weekday().num_days_from_sunday() as u8,
    })
}

impl ClockPort for SystemClock {
    fn local_time(&self) -> Option<LocalTime> {
        decompose(&Local::now())
    }

    #[cfg(target_os = "espidf")]
    fn uptime_us(&self) -> u64 {
        // SAFETY: reads the monotonic high-resolution timer; no preconditions.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}
