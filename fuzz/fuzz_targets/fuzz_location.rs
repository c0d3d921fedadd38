// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for Location parsing and manipulation

#![no_main]

use libfuzzer_sys::fuzz_target;
use vfa_core::Location;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(location) = Location::parse(input) else {
        return;
    };

    // The canonical form parses back to the same location.
    let text = location.to_string_with(true, false);
    let reparsed = Location::parse(&text).expect("canonical form must parse");
    assert_eq!(reparsed, location);

    let _ = location.name();
    let _ = location.extension();
    let _ = location.parent();
    let _ = location.path_string(true);
    let _ = location.native_path();
    if let Some(name) = input.rsplit('/').next() {
        let _ = location.resolve_direct_child(name);
        let _ = location.resolve_child(name);
    }
});
