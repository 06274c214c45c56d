//! HeishaMon firmware, main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HeatPumpHost        NvsStorage     FsRuleSource   SystemClock │
//! │  (every RuleHost     (Config +      (RuleSource)   (ClockPort) │
//! │   port)               Storage)                                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              RuleService (pure logic)                  │    │
//! │  │  compiler · variable stores · engine                   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  TriggerQueue (boot · timers · value changes · reload)         │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{self, UartDriver};
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use heishamon::adapters::fs::FsRuleSource;
use heishamon::adapters::heatpump::HeatPumpHost;
use heishamon::adapters::nvs::NvsStorage;
use heishamon::adapters::system::SystemController;
use heishamon::app::commands::Trigger;
use heishamon::app::ports::ConfigPort;
use heishamon::app::service::RuleService;
use heishamon::config::EngineConfig;
use heishamon::diagnostics;
use heishamon::events::TriggerQueue;

/// VFS mount point of the data partition holding `rules.txt`.
const DATA_MOUNT: &str = "/data";

fn mount_data_partition() -> Result<()> {
    let conf = esp_idf_svc::sys::esp_vfs_spiffs_conf_t {
        base_path: c"/data".as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: false,
    };
    // SAFETY: `conf` and its strings outlive the call; mounted once at boot.
    esp_idf_svc::sys::esp!(unsafe { esp_idf_svc::sys::esp_vfs_spiffs_register(&conf) })?;
    Ok(())
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  HeishaMon v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    diagnostics::install_panic_handler();

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let nvs = NvsStorage::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            EngineConfig::default()
        }
    };

    // ── 3. Heat-pump serial link ──────────────────────────────
    let peripherals = Peripherals::take()?;
    let uart_cfg = uart::config::Config::new()
        .baudrate(Hertz(9600))
        .parity_even();
    let serial = UartDriver::new(
        peripherals.uart2,
        peripherals.pins.gpio17,
        peripherals.pins.gpio16,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_cfg,
    )?;

    // ── 4. Rule engine ────────────────────────────────────────
    if let Err(e) = mount_data_partition() {
        warn!("Data partition not mounted ({}), rules unavailable", e);
    }
    let source = FsRuleSource::new(DATA_MOUNT);
    let system = SystemController::new(nvs);
    for entry in system.crash_entries() {
        warn!(
            "Previous crash at {}s: {} (rule '{}')",
            entry.uptime_secs, entry.reason, entry.rule
        );
    }
    let mut host = HeatPumpHost::new(system);
    let mut service = RuleService::new(config);

    let mut triggers = TriggerQueue::new();
    let (mut tx, mut rx) = triggers.split();
    tx.push(Trigger::Reload);

    info!("System ready. Entering trigger loop.");

    // ── 5. Trigger loop ───────────────────────────────────────
    loop {
        rx.drain(|trigger| service.handle(trigger, &source, &mut host));

        host.tick(1);
        service.service_timers(&mut host);

        while let Some(cmd) = host.take_command() {
            if let Err(e) = serial.write(&cmd.bytes) {
                warn!("Serial: {} not written ({})", cmd.log_line, e);
            }
        }

        FreeRtos::delay_ms(1000);
    }
}
