#![no_main]
//! Fuzz target for session config parsing
//!
//! Feeds random bytes as TOML to the config parser; parsing and validation
//! must never panic, and a validated config must convert its timeouts.

use libfuzzer_sys::fuzz_target;

use termscope::Config;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<Config>(s) {
            if config.validate().is_ok() {
                assert!(!config.idle_timeout().is_zero());
                assert!(!config.flush_timeout().is_zero());
            }
        }
    }
});
