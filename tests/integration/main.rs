//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises one slice of the rule engine through its
//! public API against recording ports.  All tests run on the host with no
//! hardware required.

mod engine_scenarios;
mod host_adapter_tests;
mod mock_host;
mod reload_tests;
