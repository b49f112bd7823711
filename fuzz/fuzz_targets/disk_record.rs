#![no_main]

use libfuzzer_sys::fuzz_target;

use tiercache::cache::fuzzing::decode_disk_record;

fuzz_target!(|data: &[u8]| {
    let _ = decode_disk_record(data);
});
