//! Rule engine configuration
//!
//! Sizing limits and dispatch switches for the rule engine.
//! Values can be overridden via NVS or the web settings page.

use serde::{Deserialize, Serialize};

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Source ---
    /// Path of the rule source file on the data partition
    pub rules_path: heapless::String<64>,

    // --- Memory ---
    /// Maximum number of compiled program nodes across all rules
    pub arena_capacity: u16,
    /// Maximum local variable slots per rule
    pub max_local_slots: u16,
    /// Maximum global variable slots
    pub max_global_slots: u16,
    /// Maximum number of rule blocks in one file
    pub max_rules: u16,

    // --- Execution ---
    /// Maximum nesting of rule-to-rule calls before a cycle is reported
    pub max_chain_depth: u8,
    /// Byte budget of one local or global diagnostics dump
    pub dump_bytes: u16,

    // --- Dispatch ---
    /// Never send commands to the heat pump
    pub listen_only: bool,
    /// Optional PCB is installed; its commands may be dispatched
    pub optional_pcb: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut rules_path = heapless::String::new();
        let _ = rules_path.push_str("/rules.txt");
        Self {
            rules_path,

            // Memory
            arena_capacity: 2048,
            max_local_slots: 32,
            max_global_slots: 64,
            max_rules: 64,

            // Execution
            max_chain_depth: 8,
            dump_bytes: 512,

            // Dispatch
            listen_only: false,
            optional_pcb: false,
        }
    }
}
