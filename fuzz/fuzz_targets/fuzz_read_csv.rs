#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Hand-edited data files must produce an error, never a panic.
    let _ = freeloader_core::read_csv(data);
});
