// Sync Search Tests
// 16モードの探索とロックの挙動を検証します

use arducam_capture::core::{SyncSettings, SyncSearch};
use arducam_capture::hardware::camera::registers::ARDUCHIP_TIM;
use arducam_capture::hardware::mock::{MockArduChip, MockChipSelect, MockClock, MockSensor};
use arducam_capture::{
    CameraController, CorruptionKind, DeviceMode, I2cSensorBus, SpiControlBus, SyncError,
};

type TestCamera = CameraController<
    SpiControlBus<MockArduChip, MockChipSelect>,
    I2cSensorBus<MockSensor, MockClock>,
    MockClock,
>;

fn camera(chip: &MockArduChip) -> TestCamera {
    let clock = MockClock::new();
    CameraController::new(
        SpiControlBus::new(chip.clone(), chip.chip_select()).unwrap(),
        I2cSensorBus::new(MockSensor::new(), clock.clone()),
        clock,
    )
}

fn frame_with(soi: [u8; 2], offset: usize) -> Vec<u8> {
    let mut frame = vec![0x11; 4096];
    frame[offset..offset + 2].copy_from_slice(&soi);
    frame
}

#[test]
fn test_locks_first_mode_with_header() {
    let chip = MockArduChip::new();
    chip.set_default_frame(vec![0x11; 4096]);
    chip.set_frame_for_mode(0x05, frame_with(CorruptionKind::BitReversed.soi(), 3));
    let mut cam = camera(&chip);

    let outcome = SyncSearch::new(SyncSettings::default())
        .run(&mut cam)
        .unwrap();

    assert_eq!(outcome.mode.bits(), 0x05);
    assert_eq!(outcome.header.kind, CorruptionKind::BitReversed);
    assert_eq!(outcome.header.offset, 3);
    // 0x02 (既定) から 0x05 まで
    assert_eq!(outcome.modes_tried, 4);
    assert_eq!(cam.mode().bits(), 0x05);
    assert!(cam.is_synced());
    assert_eq!(chip.captured_modes(), vec![0x02, 0x03, 0x04, 0x05]);
    assert!(!chip.done_flag());
}

#[test]
fn test_resync_relocks_same_mode_immediately() {
    let chip = MockArduChip::new();
    chip.set_default_frame(vec![0x11; 4096]);
    chip.set_frame_for_mode(0x0B, frame_with(CorruptionKind::ShiftedLeft.soi(), 100));
    let mut cam = camera(&chip);
    let search = SyncSearch::new(SyncSettings::default());

    let first = search.run(&mut cam).unwrap();
    let second = search.run(&mut cam).unwrap();

    assert_eq!(first.mode, second.mode);
    assert_eq!(first.header, second.header);
    assert_eq!(second.modes_tried, 1);
}

#[test]
fn test_header_outside_sample_is_not_seen() {
    let chip = MockArduChip::new();
    chip.set_default_frame(frame_with(CorruptionKind::Standard.soi(), 2000));
    let mut cam = camera(&chip);

    let err = SyncSearch::new(SyncSettings::default())
        .run(&mut cam)
        .unwrap_err();
    assert!(matches!(err, SyncError::SyncFailed { modes_tried: 16 }));
}

#[test]
fn test_failed_sweep_restores_prior_mode() {
    let chip = MockArduChip::new();
    chip.set_default_frame(vec![0x11; 4096]);
    let mut cam = camera(&chip);

    let err = SyncSearch::new(SyncSettings::default())
        .run(&mut cam)
        .unwrap_err();

    assert!(matches!(err, SyncError::SyncFailed { modes_tried: 16 }));
    assert_eq!(cam.mode(), DeviceMode::DEFAULT);
    assert!(!cam.is_synced());
    assert_eq!(chip.register(ARDUCHIP_TIM) & 0x0F, DeviceMode::DEFAULT.bits());
    assert_eq!(chip.captured_modes().len(), 16);
}

#[test]
fn test_failed_resync_keeps_previous_lock() {
    let chip = MockArduChip::new();
    chip.set_default_frame(vec![0x11; 4096]);
    chip.set_frame_for_mode(0x07, frame_with(CorruptionKind::Standard.soi(), 0));
    let mut cam = camera(&chip);
    let search = SyncSearch::new(SyncSettings::default());
    search.run(&mut cam).unwrap();

    // リンクが劣化してどのモードでもヘッダが出なくなった
    chip.set_frame_for_mode(0x07, vec![0x11; 4096]);
    let err = search.run(&mut cam).unwrap_err();

    assert!(matches!(err, SyncError::SyncFailed { .. }));
    assert_eq!(cam.mode().bits(), 0x07);
    assert_eq!(chip.register(ARDUCHIP_TIM) & 0x0F, 0x07);
}

#[test]
fn test_fill_timeout_moves_to_next_mode() {
    let chip = MockArduChip::new();
    chip.set_fill_after_polls(None);
    let mut cam = camera(&chip);

    let err = SyncSearch::new(SyncSettings {
        fill_wait_ms: 50,
        ..SyncSettings::default()
    })
    .run(&mut cam)
    .unwrap_err();

    assert!(matches!(err, SyncError::SyncFailed { modes_tried: 16 }));
    assert_eq!(chip.burst_count(), 0);
    assert!(!chip.done_flag());
}
