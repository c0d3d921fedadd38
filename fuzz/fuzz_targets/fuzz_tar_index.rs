// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for tar header parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use vfa_core::stream::MemoryRandomAccess;
use vfa_core::ArchiveFormat;
use vfa_providers::TarFormat;

fuzz_target!(|data: &[u8]| {
    let mut archive = MemoryRandomAccess::new(data.to_vec());
    if let Ok(entries) = TarFormat.read_index(&mut archive) {
        for entry in &entries {
            assert!(entry.is_directory || entry.offset + entry.size <= data.len() as u64);
        }
    }
});
