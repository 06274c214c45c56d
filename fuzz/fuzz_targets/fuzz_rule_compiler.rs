//! Fuzz target: rule compiler and evaluator
//!
//! Feeds arbitrary text to `RuleEngine::parse` against the shipped heat-pump
//! host.  Whatever compiles is then run once per rule.  Checks:
//! - No panics from the lexer, parser or evaluator
//! - A rejected source never replaces the loaded rule set
//! - Node usage never exceeds the configured arena capacity
//!
//! cargo fuzz run fuzz_rule_compiler

#![no_main]

use heishamon::adapters::heatpump::HeatPumpHost;
use heishamon::adapters::nvs::NvsStorage;
use heishamon::adapters::system::SystemController;
use heishamon::config::EngineConfig;
use heishamon::rules::RuleEngine;
use libfuzzer_sys::fuzz_target;

const BASELINE: &str = "on System#Boot then #base = 1; end";

fuzz_target!(|data: &[u8]| {
    let Ok(source) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(nvs) = NvsStorage::new() else {
        return;
    };
    let mut host = HeatPumpHost::new(SystemController::new(nvs));
    let config = EngineConfig {
        arena_capacity: 256,
        max_chain_depth: 4,
        ..EngineConfig::default()
    };
    let mut engine = RuleEngine::new(config);
    assert!(engine.parse(BASELINE, &mut host).is_ok());

    match engine.parse(source, &mut host) {
        Ok(count) => {
            assert_eq!(engine.rule_count(), count);
            let snap = engine.snapshot();
            assert!(snap.nodes_used <= snap.nodes_capacity);
            for index in 0..count {
                let _ = engine.run(index, &mut host);
            }
        }
        Err(_) => {
            assert_eq!(engine.rule_count(), 1, "failed parse replaced the rule set");
            assert_eq!(engine.rule_by_name("System#Boot"), Some(0));
        }
    }
});
