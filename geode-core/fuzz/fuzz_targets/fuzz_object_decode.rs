#![no_main]

use libfuzzer_sys::fuzz_target;

use geode_core::serialization::value::read_object;
use geode_core::serialization::{DataInput, ObjectDataInput};

fuzz_target!(|data: &[u8]| {
    let mut input = ObjectDataInput::new(data);
    while input.remaining() > 0 {
        if read_object(&mut input).is_err() {
            break;
        }
    }

    let mut input = ObjectDataInput::new(data);
    let _ = input.read_string();
    let _ = input.read_array_len();
    let _ = input.read_string_array();
});
