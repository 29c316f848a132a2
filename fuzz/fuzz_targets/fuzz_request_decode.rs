#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Request bodies come straight off the socket; decoding must not panic
    let _ = census::server::protocol::decode::<census::server::QueryRequest>(data);

    let mut cursor = std::io::Cursor::new(data);
    let _ = census::server::protocol::read_frame(&mut cursor, 4096);
});
