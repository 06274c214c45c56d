//! End-to-end rule scenarios through `RuleService` against the recording host.

use heishamon::app::ports::{FieldValue, LocalTime};
use heishamon::app::service::RuleService;
use heishamon::config::EngineConfig;
use heishamon::rules::{RunState, Value};

use crate::mock_host::{MockHost, TextSource};

fn service_with(rules: &str, config: EngineConfig, host: &mut MockHost) -> RuleService {
    let mut svc = RuleService::new(config);
    assert!(
        svc.load("/rules.txt", &TextSource(rules.to_owned()), host),
        "rules should compile"
    );
    svc
}

fn service(rules: &str, host: &mut MockHost) -> RuleService {
    service_with(rules, EngineConfig::default(), host)
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_sets_global_and_dumps_it() {
    let mut host = MockHost::new();
    let mut svc = service("on System#Boot then\n  #count = 1;\nend\n", &mut host);

    let report = svc.boot(&mut host).expect("boot rule exists");
    assert_eq!(report.outcome, RunState::Done);
    assert!(host.lines.iter().any(|l| l == "#count = 1"));
    assert_eq!(host.run_headers(), ["System#Boot"]);
    assert!(
        host.lines.last().is_some_and(|l| l.starts_with("<<< System#Boot took ")),
        "last line should carry the elapsed time: {:?}",
        host.lines.last()
    );
}

#[test]
fn boot_without_boot_rule_is_silent() {
    let mut host = MockHost::new();
    let mut svc = service("on timer=1 then #x = 1; end", &mut host);
    assert!(svc.boot(&mut host).is_none());
    assert!(host.lines.is_empty());
}

// ── Chaining ──────────────────────────────────────────────────

#[test]
fn chained_rule_dump_follows_caller_and_returns() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on A then\n\
           #trace = 1;\n\
           B();\n\
           #trace = #trace * 10 + 3;\n\
         end\n\
         on B then\n\
           #trace = #trace * 10 + 2;\n\
         end\n",
        &mut host,
    );

    let report = svc.on_event("", "A", &mut host).expect("A exists");
    assert_eq!(report.outcome, RunState::Chained);
    assert_eq!(report.chained[0].name, "B");
    assert_eq!(report.chained[0].returned_to, Some(report.rule));

    // A ran, then B, then the rest of A.
    assert_eq!(svc.engine().global("#trace"), Value::Integer(123));
    assert_eq!(host.run_headers(), ["A", "B"]);
}

#[test]
fn cyclic_rules_end_in_error_not_overflow() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on ping then #n = coalesce(#n, 0) + 1; pong(); end\n\
         on pong then ping(); end",
        &mut host,
    );
    let report = svc.on_event("", "ping", &mut host).unwrap();
    assert_eq!(report.chained[0].outcome, RunState::Error);
    assert_eq!(svc.engine().global("#n"), Value::Integer(1));
}

// ── Variables ─────────────────────────────────────────────────

#[test]
fn unset_local_reads_as_null() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on probe then\n  $y = $x;\n  #seen = isset($x);\n  #sum = $x + 1;\nend",
        &mut host,
    );
    let report = svc.on_event("", "probe", &mut host).unwrap();
    assert_eq!(report.outcome, RunState::Done);
    assert_eq!(report.locals, "$y = NULL\n");
    assert_eq!(svc.engine().global("#seen"), Value::Integer(0));
    assert_eq!(svc.engine().global("#sum"), Value::Null);
}

#[test]
fn local_dump_lists_exactly_this_runs_writes() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on r then\n  if #flip then $a = 1; else $b = 2; end\n  #flip = !#flip;\nend",
        &mut host,
    );
    let first = svc.on_event("", "r", &mut host).unwrap();
    assert_eq!(first.locals, "$b = 2\n");
    let second = svc.on_event("", "r", &mut host).unwrap();
    assert_eq!(second.locals, "$a = 1\n");
}

// ── External bindings ─────────────────────────────────────────

#[test]
fn telemetry_reads_are_not_cached() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on @Outside_Temp then\n  #first = @Outside_Temp;\nend\n\
         on again then\n  #second = @Outside_Temp;\nend",
        &mut host,
    );
    svc.on_event("@", "Outside_Temp", &mut host).unwrap();
    host.set_topic("Outside_Temp", "-3.5");
    svc.on_event("", "again", &mut host).unwrap();
    assert_eq!(svc.engine().global("#first"), Value::Integer(4));
    assert_eq!(svc.engine().global("#second"), Value::Float(-3.5));
}

#[test]
fn empty_topic_reads_as_null() {
    let mut host = MockHost::new();
    let mut svc = service("on r then #f = @Compressor_Freq; end", &mut host);
    svc.on_event("", "r", &mut host).unwrap();
    assert_eq!(svc.engine().global("#f"), Value::Null);
}

#[test]
fn command_writes_are_dispatched() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on @DHW_Temp then\n\
           if @DHW_Temp < 50 then @SetDHWTemp = 52.5; end\n\
           @SetQuietMode = round(2.4);\n\
         end",
        &mut host,
    );
    svc.on_event("@", "DHW_Temp", &mut host).unwrap();
    assert_eq!(host.sent, ["SetDHWTemp=52.5", "SetQuietMode=2"]);
}

#[test]
fn listen_only_run_completes_without_sending() {
    let mut host = MockHost::new();
    let cfg = EngineConfig { listen_only: true, ..EngineConfig::default() };
    let mut svc = service_with("on go then\n  @SetHeatpump = 1;\n  #after = 1;\nend", cfg, &mut host);

    let report = svc.on_event("", "go", &mut host).expect("go exists");
    assert_eq!(report.outcome, RunState::Done);
    assert!(host.sent.is_empty());
    assert_eq!(svc.engine().global("#after"), Value::Integer(1));
    assert_eq!(host.run_headers(), ["go"]);
}

#[test]
fn loading_evaluates_rules_without_side_effects() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on System#Boot then\n\
           @SetHeatpump = 1;\n\
           ?chSetpoint = 50;\n\
           #booted = 1;\n\
         end",
        &mut host,
    );
    assert!(host.sent.is_empty(), "nothing reaches the heat pump while loading");
    assert_eq!(host.field("chSetpoint"), Some(FieldValue::Float(35.0)));
    assert!(host.lines.is_empty());
    assert_eq!(svc.engine().global("#booted"), Value::Null);

    let report = svc.boot(&mut host).expect("boot rule exists");
    assert_eq!(report.outcome, RunState::Done);
    assert_eq!(host.sent, ["SetHeatpump=1"]);
    assert_eq!(host.field("chSetpoint"), Some(FieldValue::Float(50.0)));
}

#[test]
fn optional_pcb_commands_need_the_pcb() {
    let rules = "on go then @SetSmartGridMode = 1; end";

    let mut host = MockHost::new();
    let mut svc = service(rules, &mut host);
    svc.on_event("", "go", &mut host).unwrap();
    assert!(host.sent.is_empty());

    let mut host = MockHost::new();
    let cfg = EngineConfig { optional_pcb: true, ..EngineConfig::default() };
    let mut svc = service_with(rules, cfg, &mut host);
    svc.on_event("", "go", &mut host).unwrap();
    assert_eq!(host.sent, ["SetSmartGridMode=1"]);
}

#[test]
fn device_field_direction_is_respected() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on ot then\n\
           ?roomTemp = 5;\n\
           ?chSetpoint = 41.5;\n\
           ?flameState = 1;\n\
           #sp = ?chSetpoint;\n\
         end",
        &mut host,
    );
    svc.on_event("", "ot", &mut host).unwrap();
    assert_eq!(host.field("roomTemp"), Some(FieldValue::Float(21.0)));
    assert_eq!(host.field("chSetpoint"), Some(FieldValue::Float(41.5)));
    assert_eq!(host.field("flameState"), Some(FieldValue::Bool(true)));
    assert_eq!(svc.engine().global("#sp"), Value::Float(41.5));
}

#[test]
fn sensor_and_time_bindings() {
    let mut host = MockHost::new();
    host.add_sensor("28ff641d1b160341", 18.5);
    let mut svc = service(
        "on t then\n\
           #probe = ds18b20#28FF641D1B160341;\n\
           #gone = ds18b20#28aaaaaaaaaaaaaa;\n\
           #h = %hour;\n\
         end",
        &mut host,
    );
    svc.on_event("", "t", &mut host).unwrap();
    assert_eq!(svc.engine().global("#probe"), Value::Float(18.5));
    assert_eq!(svc.engine().global("#gone"), Value::Null);
    assert_eq!(svc.engine().global("#h"), Value::Null, "clock not synced");

    host.time = Some(LocalTime { hour: 6, minute: 30, month: 1, weekday: 0 });
    svc.on_event("", "t", &mut host).unwrap();
    assert_eq!(svc.engine().global("#h"), Value::Integer(6));
}

// ── Timers ────────────────────────────────────────────────────

#[test]
fn timer_rule_fires_after_delay() {
    let mut host = MockHost::new();
    let mut svc = service(
        "on System#Boot then setTimer(7, 30); end\n\
         on timer=7 then #fired = 1; end",
        &mut host,
    );
    svc.boot(&mut host);
    host.timers.advance(29);
    assert_eq!(svc.service_timers(&mut host), 0);
    host.timers.advance(1);
    assert_eq!(svc.service_timers(&mut host), 1);
    assert_eq!(svc.engine().global("#fired"), Value::Integer(1));
}

#[test]
fn unknown_event_is_ignored() {
    let mut host = MockHost::new();
    let mut svc = service("on a then end", &mut host);
    assert!(svc.on_event("@", "Heatpump_State", &mut host).is_none());
    assert!(svc.on_timer(99, &mut host).is_none());
    assert!(host.lines.is_empty());
}
