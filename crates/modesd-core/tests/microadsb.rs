//! microADSB decode, resynchronization, and init-dialog scenarios.

mod common;

use common::MockTransport;
use pretty_assertions::assert_eq;
use std::io::Cursor;
use std::time::Duration;

use modesd_core::device::microadsb::{self, MicroAdsbSession, ModeFlags};
use modesd_core::device::{DecodeOutcome, DeviceSession, ReadOutcome};
use modesd_core::error::DeviceError;

const SHORT_RECORD: &[u8] = b"@00001BA972C05DA7717DBBB591;#000000EC;\n\r";
const LONG_RECORD: &[u8] = b"@00001BB20C208D896114583BC127EC054587426E;#000000ED;\n\r";

#[test]
fn marker_mismatch_consumes_through_next_terminator() {
    // misaligned span, then resync data containing an interior ';'
    // (squitter/counter separator) that must not end the scan
    let mut bytes = vec![b'0'; 40];
    bytes.extend_from_slice(b"BBB591;#000000EC;\n\r");
    let mut src = Cursor::new(bytes);
    assert_eq!(
        microadsb::decode_frame(&mut src, ModeFlags::default()).unwrap(),
        DecodeOutcome::Skip { consumed: 19 }
    );
}

#[test]
fn stream_recovers_after_resync() {
    let mut bytes = vec![b'0'; 40];
    bytes.extend_from_slice(b"tail;\n\r");
    bytes.extend_from_slice(SHORT_RECORD);

    let transport = MockTransport::with_script(bytes);
    let mut session = MicroAdsbSession::from_transport(Box::new(transport), ModeFlags::default());
    let timeout = Duration::from_secs(2);

    assert!(matches!(
        session.read_frame(timeout).unwrap(),
        ReadOutcome::NoFrame { skipped: 7 }
    ));
    match session.read_frame(timeout).unwrap() {
        ReadOutcome::Frame(frame) => {
            assert_eq!(frame.payload_hex, "5DA7717DBBB591");
            assert_eq!(frame.skipped_bytes, 7);
            assert_eq!(frame.sequence_number, Some(0xEC));
            assert_eq!(frame.device_ticks, Some(0x00001BA972C0));
        }
        other => panic!("expected frame, got {other:?}"),
    }
}

#[test]
fn one_record_then_garbage_is_idempotent() {
    let mut bytes = LONG_RECORD.to_vec();
    bytes.extend(vec![b'X'; 40]);
    bytes.extend_from_slice(b";\n\r");

    let transport = MockTransport::with_script(bytes);
    let mut session = MicroAdsbSession::from_transport(Box::new(transport), ModeFlags::default());
    let timeout = Duration::from_secs(2);

    match session.read_frame(timeout).unwrap() {
        ReadOutcome::Frame(frame) => {
            assert_eq!(frame.payload_hex.len(), 28);
            assert_eq!(frame.skipped_bytes, 0);
        }
        other => panic!("expected frame, got {other:?}"),
    }
    assert!(matches!(
        session.read_frame(timeout).unwrap(),
        ReadOutcome::NoFrame { skipped: 3 }
    ));
    assert!(matches!(
        session.read_frame(timeout),
        Err(DeviceError::Eof)
    ));
}

#[test]
fn short_and_extended_records_interleave() {
    let mut bytes = SHORT_RECORD.to_vec();
    bytes.extend_from_slice(LONG_RECORD);
    bytes.extend_from_slice(SHORT_RECORD);

    let transport = MockTransport::with_script(bytes);
    let mut session = MicroAdsbSession::from_transport(Box::new(transport), ModeFlags::default());
    let timeout = Duration::from_secs(2);

    let mut lens = Vec::new();
    for _ in 0..3 {
        match session.read_frame(timeout).unwrap() {
            ReadOutcome::Frame(frame) => lens.push(frame.payload_hex.len()),
            other => panic!("expected frame, got {other:?}"),
        }
    }
    assert_eq!(lens, vec![14, 28, 14]);
}

#[test]
fn handshake_accepts_known_version_and_sets_mode() {
    let mut script = Vec::new();
    script.extend_from_slice(b"#00-00-05-04\r\n");
    script.extend_from_slice(b"#43-32\r\n");
    let mut transport = MockTransport::with_script(script);

    microadsb::handshake(&mut transport, ModeFlags::default()).unwrap();

    assert_eq!(transport.tx, b"#00\n#43-32\n".to_vec());
}

#[test]
fn handshake_rejects_unknown_version() {
    let mut transport = MockTransport::with_script(b"#00-00-09-01\r\n".to_vec());
    let err = microadsb::handshake(&mut transport, ModeFlags::default()).unwrap_err();
    match err {
        DeviceError::UnknownVersion(v) => assert_eq!(v, "#00-00-09-01"),
        other => panic!("expected UnknownVersion, got {other:?}"),
    }
}

#[test]
fn handshake_rejects_bad_mode_ack() {
    let mut script = Vec::new();
    script.extend_from_slice(b"#00-00-08-04\r\n");
    script.extend_from_slice(b"#FF\r\n");
    let mut transport = MockTransport::with_script(script);

    let err = microadsb::handshake(&mut transport, ModeFlags::default()).unwrap_err();
    assert!(matches!(err, DeviceError::BadAck { .. }));
}
