//! Log-based diagnostics sink.
//!
//! Implements [`DiagnosticsSink`] by forwarding each line to the logger
//! (UART / USB-CDC in production).  The MQTT and websocket log fan-out
//! attach to the same `log` facade, so nothing else is needed here.

use log::info;

use crate::app::ports::DiagnosticsSink;

#[derive(Default)]
pub struct LogDiagnosticsSink {
    lines: u32,
}

impl LogDiagnosticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines emitted since start.
    pub fn lines(&self) -> u32 {
        self.lines
    }
}

impl DiagnosticsSink for LogDiagnosticsSink {
    fn line(&mut self, text: &str) {
        self.lines = self.lines.wrapping_add(1);
        info!("RULES | {}", text);
    }
}
