#![no_main]

use libfuzzer_sys::fuzz_target;
use match_sync::core::codec::{BincodeCodec, FrameCodec, PacketCodec};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Inbound buffers come straight off the socket; decoding must never panic.
    let _ = BincodeCodec.opcode(data);
    let _ = BincodeCodec.decode(data);
    if let Ok(Some(len)) = BincodeCodec.frame_len(data) {
        let _ = BincodeCodec.decode(&data[..len]);
    }

    let mut buf = bytes::BytesMut::from(data);
    while let Ok(Some(_)) = FrameCodec.decode(&mut buf) {}
});
