#![no_main]

use libfuzzer_sys::fuzz_target;

use tiercache::cache::{DiskIndex, IndexSnapshot};

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = IndexSnapshot::from_bytes(data) else {
        return;
    };
    let expected: u64 = snapshot
        .sizes
        .values()
        .fold(0u64, |acc, size| acc.saturating_add(*size));
    let index = DiskIndex::from_snapshot(snapshot);
    assert_eq!(index.usage(), expected);
    assert_eq!(index.snapshot().sizes.len(), index.len());
});
