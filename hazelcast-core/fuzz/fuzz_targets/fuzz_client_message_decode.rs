#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use hazelcast_core::protocol::codecs::backup::decode_backup_event;
use hazelcast_core::protocol::codecs::error::decode_error_response;
use hazelcast_core::protocol::codecs::AuthenticationResponse;
use hazelcast_core::protocol::{ClientMessageCodec, FragmentAssembler};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = ClientMessageCodec::new();
    let mut assembler = FragmentAssembler::new();
    let mut buf = BytesMut::from(data);

    while let Ok(Some(fragment)) = codec.decode(&mut buf) {
        let Some(msg) = assembler.accept(fragment) else {
            continue;
        };
        let _ = msg.message_type();
        let _ = msg.correlation_id();
        let _ = msg.partition_id();
        let _ = msg.number_of_backup_acks();
        let _ = msg.is_event();
        let _ = msg.wire_size();
        let _ = AuthenticationResponse::decode(&msg);
        let _ = decode_error_response(&msg);
        let _ = decode_backup_event(&msg);
    }
});
