//! The shipped host adapters wired to the rule service, as `main` does.

use heishamon::adapters::fs::FsRuleSource;
use heishamon::adapters::heatpump::{COMMAND_BUFFER_LEN, HeatPumpHost};
use heishamon::adapters::nvs::NvsStorage;
use heishamon::adapters::system::SystemController;
use heishamon::app::commands::Trigger;
use heishamon::app::ports::{ConfigPort, FieldValue};
use heishamon::app::service::RuleService;
use heishamon::config::EngineConfig;
use heishamon::rules::Value;

fn host() -> HeatPumpHost<NvsStorage> {
    HeatPumpHost::new(SystemController::new(NvsStorage::new().unwrap()))
}

fn rules_dir(name: &str, text: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("heishamon-it-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("rules.txt"), text).unwrap();
    dir
}

#[test]
fn file_backed_boot_and_topic_event() {
    let dir = rules_dir(
        "boot",
        "on System#Boot then\n  #boots = 1;\nend\n\
         on @Outside_Temp then\n  if @Outside_Temp < 0 then @SetHeatpump = 1; end\nend\n",
    );
    let source = FsRuleSource::new(&dir);
    let mut hp = host();
    let mut svc = RuleService::new(EngineConfig::default());

    svc.handle(Trigger::Reload, &source, &mut hp);
    assert_eq!(svc.engine().global("#boots"), Value::Integer(1));

    let trigger = hp.update_topic("Outside_Temp", "-4").expect("value changed");
    svc.handle(trigger, &source, &mut hp);

    let cmd = hp.take_command().expect("command queued");
    assert_eq!(cmd.log_line.as_str(), "SetHeatpump=1");
    assert_eq!(hp.take_command(), None);

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_rule_file_leaves_engine_empty() {
    let source = FsRuleSource::new(std::env::temp_dir().join("heishamon-it-none"));
    let mut hp = host();
    let mut svc = RuleService::new(EngineConfig::default());
    svc.handle(Trigger::Reload, &source, &mut hp);
    assert!(!svc.engine().is_loaded());
}

#[test]
fn command_burst_overflows_buffer() {
    let dir = rules_dir(
        "burst",
        "on burst then\n\
           @SetDHWTemp = 40; @SetDHWTemp = 41; @SetDHWTemp = 42; @SetDHWTemp = 43;\n\
           @SetDHWTemp = 44; @SetDHWTemp = 45; @SetDHWTemp = 46; @SetDHWTemp = 47;\n\
           @SetDHWTemp = 48; @SetDHWTemp = 49; @SetDHWTemp = 50; @SetDHWTemp = 51;\n\
         end\n",
    );
    let source = FsRuleSource::new(&dir);
    let mut hp = host();
    let mut svc = RuleService::new(EngineConfig::default());
    assert!(svc.load("/rules.txt", &source, &mut hp));
    svc.on_event("", "burst", &mut hp).unwrap();

    assert_eq!(hp.pending_commands(), COMMAND_BUFFER_LEN);
    assert_eq!(hp.dropped_commands(), 2);
    assert_eq!(hp.take_command().unwrap().log_line.as_str(), "SetDHWTemp=40");
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn opentherm_field_event_and_write() {
    let dir = rules_dir(
        "ot",
        "on ?chEnable then\n  ?flameState = ?chEnable;\n  ?chSetpoint = 50;\nend\n",
    );
    let source = FsRuleSource::new(&dir);
    let mut hp = host();
    let mut svc = RuleService::new(EngineConfig::default());
    assert!(svc.load("/rules.txt", &source, &mut hp));

    let trigger = hp.update_field("chEnable", FieldValue::Bool(true)).unwrap();
    svc.handle(trigger, &source, &mut hp);

    use heishamon::app::ports::DeviceFieldRegistry;
    let value = |name: &str| hp.find_field(name).map(|i| hp.fields()[i].value);
    assert_eq!(value("flameState"), Some(FieldValue::Bool(true)));
    // chSetpoint is read-only from the rules' side.
    assert_eq!(value("chSetpoint"), Some(FieldValue::Float(0.0)));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn global_exhaustion_lands_in_crash_log() {
    let dir = rules_dir("crash", "on fill then #a = 1; #b = 2; end\n");
    let source = FsRuleSource::new(&dir);
    let mut hp = host();
    let cfg = EngineConfig { max_global_slots: 1, ..EngineConfig::default() };
    let mut svc = RuleService::new(cfg);
    assert!(svc.load("/rules.txt", &source, &mut hp));
    assert!(svc.on_event("", "fill", &mut hp).is_none());

    let crashes = hp.system().crash_entries();
    assert_eq!(crashes.len(), 1);
    assert_eq!(crashes[0].reason.as_str(), "global variable table full");
    assert_eq!(hp.system().restarts_requested(), 1);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn stored_config_survives_reload() {
    let nvs = NvsStorage::new().unwrap();
    let cfg = EngineConfig { listen_only: true, ..EngineConfig::default() };
    nvs.save(&cfg).unwrap();
    let loaded = nvs.load().unwrap();
    assert!(loaded.listen_only);

    let dir = rules_dir("listen", "on go then @SetHeatpump = 0; end\n");
    let source = FsRuleSource::new(&dir);
    let mut hp = host();
    let mut svc = RuleService::new(loaded);
    assert!(svc.load("/rules.txt", &source, &mut hp));
    svc.on_event("", "go", &mut hp).unwrap();
    assert_eq!(hp.pending_commands(), 0);
    std::fs::remove_dir_all(dir).ok();
}
