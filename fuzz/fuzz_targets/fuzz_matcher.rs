#![no_main]
//! Fuzz target for view-check matchers
//!
//! The first line of the input is a pattern, the rest the text it is
//! checked against. Compilation may fail, but evaluation must not panic.

use libfuzzer_sys::fuzz_target;

use termscope::{Needle, Observation};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let (pattern, text) = s.split_once('\n').unwrap_or((s, ""));

    if let Ok(matcher) = Needle::pattern(pattern).to_matcher() {
        let _ = matcher.matches(&Observation::Text(text));
        let _ = matcher.describe().to_string();
    }

    let literal = Needle::text(pattern).to_matcher().expect("literals always compile");
    assert_eq!(literal.matches(&Observation::Text(text)), text.contains(pattern));
});
