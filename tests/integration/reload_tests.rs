//! Reload, teardown and trigger-queue behaviour of the rule service.

use heishamon::app::commands::Trigger;
use heishamon::app::service::RuleService;
use heishamon::config::EngineConfig;
use heishamon::error::Error;
use heishamon::events::TriggerQueue;
use heishamon::rules::{RuleEngine, Value};

use crate::mock_host::{MissingSource, MockHost, TextSource};

const GOOD: &str = "\
// boot counter
on System#Boot then
  #count = 1;
end

on @Outside_Temp then
  #count = #count + 1;
end
";

#[test]
fn invalid_reload_keeps_previous_rules_runnable() {
    let mut host = MockHost::new();
    let mut svc = RuleService::new(EngineConfig::default());
    assert!(svc.load("/rules.txt", &TextSource(GOOD.into()), &mut host));
    svc.boot(&mut host);

    let broken = "on System#Boot then\n  #count = (1 + ;\nend\n";
    assert!(!svc.load("/rules.txt", &TextSource(broken.into()), &mut host));
    assert!(!svc.load("/rules.txt", &MissingSource, &mut host));

    assert_eq!(svc.engine().global("#count"), Value::Integer(1));
    svc.on_event("@", "Outside_Temp", &mut host).expect("old rule still loaded");
    assert_eq!(svc.engine().global("#count"), Value::Integer(2));
}

#[test]
fn unknown_identifier_rejects_whole_file() {
    let mut host = MockHost::new();
    let mut engine = RuleEngine::new(EngineConfig::default());
    let src = "on a then #x = 1; end\non b then #y = @No_Such_Topic; end";
    match engine.parse(src, &mut host) {
        Err(Error::Parse(e)) => assert_eq!(e.line, 2),
        other => panic!("expected a parse error, got {:?}", other),
    }
    assert!(!engine.is_loaded());
    assert_eq!(engine.rule_by_name("a"), None);
}

#[test]
fn commands_are_suppressed_while_loading() {
    let mut host = MockHost::new();
    let mut engine = RuleEngine::new(EngineConfig::default());
    engine.parse("on a then @SetHeatpump = 1; end", &mut host).unwrap();
    assert!(host.sent.is_empty(), "compiling never dispatches");
    let idx = engine.rule_by_name("a").unwrap();
    engine.run(idx, &mut host).unwrap();
    assert_eq!(host.sent, ["SetHeatpump=1"]);
}

#[test]
fn successful_reload_resets_globals_and_timers() {
    let mut host = MockHost::new();
    let mut svc = RuleService::new(EngineConfig::default());
    let first = "on System#Boot then #old = 1; setTimer(1, 60); end";
    assert!(svc.load("/rules.txt", &TextSource(first.into()), &mut host));
    svc.boot(&mut host);
    assert!(!host.timers.is_empty());

    assert!(svc.load("/rules.txt", &TextSource(GOOD.into()), &mut host));
    assert!(host.timers.is_empty());
    assert_eq!(svc.engine().global("#old"), Value::Null);
    assert_eq!(svc.load_count(), 2);
}

#[test]
fn arena_capacity_bounds_rule_size() {
    let mut host = MockHost::new();
    let cfg = EngineConfig { arena_capacity: 64, ..EngineConfig::default() };
    let mut engine = RuleEngine::new(cfg);
    let mut big = String::from("on big then\n");
    for i in 0..64 {
        big.push_str(&format!("  #v{} = {} + {};\n", i, i, i));
    }
    big.push_str("end\n");
    assert!(matches!(engine.parse(&big, &mut host), Err(Error::Parse(_))));
    assert!(engine.parse("on small then #v = 1; end", &mut host).is_ok());
}

#[test]
fn teardown_is_idempotent() {
    let mut host = MockHost::new();
    let mut svc = RuleService::new(EngineConfig::default());
    svc.deinitialize();
    assert!(svc.load("/rules.txt", &TextSource(GOOD.into()), &mut host));
    svc.deinitialize();
    svc.deinitialize();
    assert!(!svc.engine().is_loaded());
    assert!(svc.boot(&mut host).is_none());
}

#[test]
fn queued_triggers_drive_the_service() {
    let mut host = MockHost::new();
    let mut svc = RuleService::new(EngineConfig::default());
    let source = TextSource(GOOD.into());

    let mut queue = TriggerQueue::new();
    let (mut tx, mut rx) = queue.split();
    assert!(tx.push(Trigger::Reload));
    assert!(tx.push(Trigger::event("@", "Outside_Temp").unwrap()));
    assert!(tx.push(Trigger::DumpDiagnostics));

    rx.drain(|t| svc.handle(t, &source, &mut host));

    // Reload runs System#Boot, then the event bumps the counter.
    assert_eq!(svc.engine().global("#count"), Value::Integer(2));
    assert_eq!(
        host.run_headers(),
        ["System#Boot", "@Outside_Temp", "System#Boot", "@Outside_Temp"]
    );

    assert!(tx.push(Trigger::Shutdown));
    rx.drain(|t| svc.handle(t, &source, &mut host));
    assert!(!svc.engine().is_loaded());
}

#[test]
fn snapshot_renders_as_json() {
    let mut host = MockHost::new();
    let mut svc = RuleService::new(EngineConfig::default());
    assert!(svc.load("/rules.txt", &TextSource(GOOD.into()), &mut host));
    svc.boot(&mut host);
    let json = svc.snapshot_json().unwrap();
    assert!(json.contains("\"@Outside_Temp\""));
    assert!(json.contains("\"#count\""));
}
