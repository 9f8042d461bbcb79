// Capture Client Tests
// モックシリアルでデバイスとのやり取りを再現し、受信から保存までを検証します

use std::fs;
use std::time::Duration;

use capture_client::link::{CAPTURE_BYTE, REINIT_BYTE, RESYNC_BYTE};
use capture_client::serial::mock::MockSerial;
use capture_client::{CaptureClient, ClientError, ClientSettings, ImageStore};

fn settings() -> ClientSettings {
    ClientSettings {
        ready_timeout: Duration::from_millis(150),
        marker_timeout: Duration::from_millis(150),
        transfer_timeout: Duration::from_millis(500),
        idle_gap: Duration::from_millis(50),
        min_image_bytes: 4,
        resend_init_on_silence: true,
    }
}

fn status(text: &str) -> Vec<u8> {
    format!("ACK CMD {} END\n", text).into_bytes()
}

fn marker_with(data: &[u8]) -> Vec<u8> {
    let mut chunk = b"ACK IMG END\n".to_vec();
    chunk.extend_from_slice(data);
    chunk
}

fn jpeg(body_len: usize) -> Vec<u8> {
    let mut image = vec![0xFF, 0xD8];
    image.extend(std::iter::repeat(0x55).take(body_len));
    image.extend_from_slice(&[0xFF, 0xD9]);
    image
}

#[test]
fn test_capture_and_save() {
    let image = jpeg(2000);
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![
            status("Capture Started..."),
            status("Capture Done."),
            [status("Length: 2100"), status("Payload: 2004")].concat(),
            marker_with(&image[..500]),
            image[500..].to_vec(),
        ],
    );
    let dir = tempfile::tempdir().unwrap();
    let store = ImageStore::new(dir.path());

    let mut client = CaptureClient::new(mock.clone(), settings());
    let saved = client.capture_and_save(&store).unwrap();

    assert_eq!(saved.size, image.len());
    assert_eq!(fs::read(&saved.path).unwrap(), image);
    assert_eq!(mock.get_sent_data(), vec![CAPTURE_BYTE]);
    assert_eq!(mock.clear_count(), 1);
}

#[test]
fn test_capture_reports_device_lengths() {
    let image = jpeg(100);
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![
            status("Length: 4096"),
            status("Payload: 104"),
            // 起動ログなど枠のない行は無視される
            b"sensor warming up\n".to_vec(),
            b"ACK IMG ".to_vec(),
            b"END\n".to_vec(),
            image.clone(),
        ],
    );

    let mut client = CaptureClient::new(mock, settings());
    let captured = client.capture().unwrap();

    assert_eq!(captured.data, image);
    assert!(captured.eoi_found);
    assert_eq!(captured.fifo_length, Some(4096));
    assert_eq!(captured.declared_payload, Some(104));
}

#[test]
fn test_missing_header_saves_nothing() {
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![status("Capture Done."), marker_with(&[0x00; 3000])],
    );
    let dir = tempfile::tempdir().unwrap();
    let store = ImageStore::new(dir.path());

    let mut client = CaptureClient::new(
        mock,
        ClientSettings {
            transfer_timeout: Duration::from_millis(100),
            ..settings()
        },
    );

    match client.capture_and_save(&store) {
        Err(ClientError::NoImageHeader { received, head }) => {
            assert_eq!(received, 3000);
            assert_eq!(head, "00".repeat(16));
        }
        other => panic!("Expected NoImageHeader, got {:?}", other),
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_device_error_before_marker() {
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![status("Capture Started..."), status("ERROR: Capture timeout")],
    );

    let mut client = CaptureClient::new(mock, settings());
    match client.capture() {
        Err(ClientError::DeviceError(text)) => assert_eq!(text, "ERROR: Capture timeout"),
        other => panic!("Expected DeviceError, got {:?}", other),
    }
}

#[test]
fn test_marker_timeout() {
    let mock = MockSerial::new();
    mock.respond_to(CAPTURE_BYTE, vec![status("Capture Started...")]);

    let mut client = CaptureClient::new(mock, settings());
    match client.capture() {
        Err(ClientError::MarkerTimeout(timeout)) => {
            assert_eq!(timeout, Duration::from_millis(150))
        }
        other => panic!("Expected MarkerTimeout, got {:?}", other),
    }
}

#[test]
fn test_small_image_is_rejected() {
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![marker_with(&[0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9])],
    );
    let dir = tempfile::tempdir().unwrap();
    let store = ImageStore::new(dir.path());

    let mut client = CaptureClient::new(
        mock,
        ClientSettings {
            min_image_bytes: 1000,
            ..settings()
        },
    );

    match client.capture_and_save(&store) {
        Err(ClientError::TruncatedImage { received, minimum }) => {
            assert_eq!(received, 6);
            assert_eq!(minimum, 1000);
        }
        other => panic!("Expected TruncatedImage, got {:?}", other),
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_payload_count_bounds_image() {
    // EOI のない 10 バイトの後ろに次の応答が続いても、通知された 8 バイトで切る
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![
            status("Payload: 8"),
            marker_with(&[0xFF, 0xD8, 1, 2, 3, 4, 5, 6, 7, 8]),
        ],
    );

    let mut client = CaptureClient::new(mock, settings());
    let captured = client.capture().unwrap();

    assert_eq!(captured.data, vec![0xFF, 0xD8, 1, 2, 3, 4, 5, 6]);
    assert!(!captured.eoi_found);
    assert_eq!(captured.declared_payload, Some(8));
}

#[test]
fn test_transformed_header_stream_is_accepted() {
    // ビット反転でロックしたデバイスは 00 27 から送ってくる
    let mut image = vec![0x00, 0x27];
    image.extend(std::iter::repeat(0x55).take(2000));
    image.extend_from_slice(&[0x00, 0x26]);
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![
            status("Payload: 2004"),
            marker_with(&image[..1000]),
            image[1000..].to_vec(),
        ],
    );

    let mut client = CaptureClient::new(
        mock,
        ClientSettings {
            transfer_timeout: Duration::from_secs(5),
            idle_gap: Duration::from_secs(5),
            ..settings()
        },
    );
    let started = std::time::Instant::now();
    let captured = client.capture().unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(captured.data, image);
    assert!(captured.eoi_found);
    assert_eq!(captured.declared_payload, Some(2004));
}

#[test]
fn test_transformed_header_without_end_marker_stops_at_count() {
    let mut image = vec![0xFF, 0xB0];
    image.extend(std::iter::repeat(0x33).take(98));
    let mock = MockSerial::new();
    mock.respond_to(
        CAPTURE_BYTE,
        vec![
            status("Payload: 100"),
            marker_with(&image),
            status("Frame sent"),
        ],
    );

    let mut client = CaptureClient::new(
        mock,
        ClientSettings {
            transfer_timeout: Duration::from_secs(5),
            idle_gap: Duration::from_secs(5),
            ..settings()
        },
    );
    let started = std::time::Instant::now();
    let captured = client.capture().unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(captured.data, image);
    assert!(!captured.eoi_found);
}

#[test]
fn test_idle_gap_ends_stream_without_eoi() {
    let mut image = vec![0xFF, 0xD8];
    image.extend(std::iter::repeat(0x42).take(2000));
    let mock = MockSerial::new();
    mock.respond_to(CAPTURE_BYTE, vec![marker_with(&image[..1000]), image[1000..].to_vec()]);

    let mut client = CaptureClient::new(
        mock,
        ClientSettings {
            transfer_timeout: Duration::from_secs(5),
            ..settings()
        },
    );
    let captured = client.capture().unwrap();

    assert_eq!(captured.data, image);
    assert!(!captured.eoi_found);
}

#[test]
fn test_transfer_timeout_after_header() {
    let mock = MockSerial::new();
    mock.respond_to(CAPTURE_BYTE, vec![marker_with(&[0xFF, 0xD8, 0x01, 0x02])]);

    let mut client = CaptureClient::new(
        mock,
        ClientSettings {
            transfer_timeout: Duration::from_millis(100),
            idle_gap: Duration::from_secs(5),
            ..settings()
        },
    );

    match client.capture() {
        Err(ClientError::TransferTimeout { received }) => assert_eq!(received, 4),
        other => panic!("Expected TransferTimeout, got {:?}", other),
    }
}

#[test]
fn test_wait_ready() {
    let mock = MockSerial::new();
    mock.queue_read_data(&status("CPLD Revision: 0x73"));
    mock.queue_read_data(&status("Camera Ready!"));

    let mut client = CaptureClient::new(mock.clone(), settings());
    client.wait_ready().unwrap();

    assert!(mock.get_sent_data().is_empty());
}

#[test]
fn test_wait_ready_pokes_silent_device() {
    let mock = MockSerial::new();
    mock.respond_to(REINIT_BYTE, vec![status("Camera Ready!")]);

    let mut client = CaptureClient::new(mock.clone(), settings());
    client.wait_ready().unwrap();

    assert_eq!(mock.get_sent_data(), vec![REINIT_BYTE]);
}

#[test]
fn test_wait_ready_without_poke() {
    let mock = MockSerial::new();
    let mut client = CaptureClient::new(
        mock.clone(),
        ClientSettings {
            resend_init_on_silence: false,
            ..settings()
        },
    );

    assert!(matches!(client.wait_ready(), Err(ClientError::NotReady)));
    assert!(mock.get_sent_data().is_empty());
}

#[test]
fn test_wait_ready_reports_init_failure() {
    let mock = MockSerial::new();
    mock.queue_read_data(&status("ERROR: SPI interface Error!"));

    let mut client = CaptureClient::new(mock.clone(), settings());
    match client.wait_ready() {
        Err(ClientError::DeviceError(text)) => assert_eq!(text, "ERROR: SPI interface Error!"),
        other => panic!("Expected DeviceError, got {:?}", other),
    }
    assert_eq!(mock.get_sent_data(), vec![REINIT_BYTE]);
}

#[test]
fn test_request_resync() {
    let mock = MockSerial::new();
    mock.respond_to(
        RESYNC_BYTE,
        vec![
            status("Resync requested"),
            status("Sync locked: mode 0x02 (standard @ 2)"),
        ],
    );

    let mut client = CaptureClient::new(mock, settings());
    let text = client.request_resync().unwrap();

    assert_eq!(text, "Sync locked: mode 0x02 (standard @ 2)");
}

#[test]
fn test_request_resync_failure() {
    let mock = MockSerial::new();
    mock.respond_to(RESYNC_BYTE, vec![status("ERROR: Sync failed")]);

    let mut client = CaptureClient::new(mock, settings());
    assert!(matches!(
        client.request_resync(),
        Err(ClientError::DeviceError(_))
    ));
}

#[test]
fn test_write_error_propagates() {
    let mock = MockSerial::new();
    mock.set_write_error(true);

    let mut client = CaptureClient::new(mock, settings());
    assert!(matches!(client.capture(), Err(ClientError::Serial(_))));
}

#[test]
fn test_read_error_propagates() {
    let mock = MockSerial::new();
    mock.set_read_error(true);

    let mut client = CaptureClient::new(mock.clone(), settings());
    assert!(matches!(client.capture(), Err(ClientError::Serial(_))));
    assert_eq!(mock.get_sent_data(), vec![CAPTURE_BYTE]);
}
