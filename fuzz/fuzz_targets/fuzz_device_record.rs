//! Fuzz target: `DeviceConfig::decode`
//!
//! Arbitrary bytes as a stored device record: decoding must never panic,
//! and anything it accepts must survive an encode/decode cycle unchanged.
//!
//! cargo fuzz run fuzz_device_record

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::app::config_store::{DeviceConfig, NAME_CAPACITY, REASON_CAPACITY, RECORD_LEN};

fuzz_target!(|data: &[u8]| {
    let Some(record) = DeviceConfig::decode(data) else {
        return;
    };
    assert_eq!(data.len(), RECORD_LEN);
    assert!(record.name.len() <= NAME_CAPACITY);
    assert!(record.reset_reason.len() <= REASON_CAPACITY);

    let again = DeviceConfig::decode(&record.encode()).expect("encoded record decodes");
    assert_eq!(again, record);
});
