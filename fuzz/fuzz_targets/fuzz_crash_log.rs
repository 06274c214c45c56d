//! Fuzz target: `CrashLog` ring buffer
//!
//! Drives arbitrary record / re-open / clear sequences through the simulated
//! NVS backend and checks:
//! - No panics, including on multi-byte reasons cut at the length limit
//! - At most `CRASH_RING_SLOTS` entries are ever returned
//! - A re-opened log resumes at the same slot
//!
//! cargo fuzz run fuzz_crash_log

#![no_main]

use heishamon::adapters::nvs::NvsStorage;
use heishamon::diagnostics::{CRASH_RING_SLOTS, CrashEntry, CrashLog};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&ops, rest)) = data.split_first() else {
        return;
    };
    let Ok(mut nvs) = NvsStorage::new() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);
    let mut log = CrashLog::new();
    log.init(&nvs);

    let writes = usize::from(ops % 12) + 1;
    for i in 0..writes {
        let start = text.char_indices().nth(i).map_or(0, |(p, _)| p);
        let reason = &text[start..];
        let rule = &text[..start];
        log.record(&mut nvs, &CrashEntry::new(i as u64, reason, rule));

        if ops & 0x80 != 0 {
            let mut reopened = CrashLog::new();
            reopened.init(&nvs);
            log = reopened;
        }
    }

    let entries = log.entries(&nvs);
    assert!(entries.len() <= CRASH_RING_SLOTS);
    assert_eq!(entries.len(), writes.min(CRASH_RING_SLOTS));
    assert!(entries.iter().all(|e| e.reason.len() <= 64 && e.rule.len() <= 48));

    log.clear(&mut nvs);
    assert!(log.entries(&nvs).is_empty());
});
