mod common;

use std::time::Duration;

use common::{fake_factory, finish_and_wait, read, spaced, u32_at};
use framecorder::mux::mp4::{find_box, find_box_path, iter_boxes, VIDEO_TIMESCALE};
use framecorder::{Backpressure, Format, QueueConfig, RecordingConfig};

const STBL: [&[u8; 4]; 5] = [b"moov", b"trak", b"mdia", b"minf", b"stbl"];

fn lossless_queue() -> QueueConfig {
    QueueConfig::default().video(Backpressure::Block {
        timeout: Duration::from_secs(10),
    })
}

fn stbl_child<'a>(data: &'a [u8], child: &[u8; 4]) -> &'a [u8] {
    let path = [STBL[0], STBL[1], STBL[2], STBL[3], STBL[4], child];
    find_box_path(data, &path).unwrap()
}

fn traks(data: &[u8]) -> Vec<Vec<u8>> {
    let moov = find_box(data, b"moov").unwrap();
    let content = moov.content(data);
    iter_boxes(content)
        .into_iter()
        .filter(|b| &b.box_type == b"trak")
        .map(|b| b.content(content).to_vec())
        .collect()
}

#[test]
fn test_three_seconds_at_30_fps() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("clip.mp4"))
        .size(640, 480)
        .frame_rate(30.0)
        .audio(0, 0)
        .queue(lossless_queue());
    let session = fake_factory(false).create(Format::Mp4, config).unwrap();

    let frame = vec![0x80u8; 640 * 480 * 4];
    for ts in spaced(90, 30.0) {
        session.commit_frame(&frame, ts).unwrap();
    }
    let path = finish_and_wait(&session).expect("recording should succeed");
    let data = read(&path);

    let top: Vec<[u8; 4]> = iter_boxes(&data).iter().map(|b| b.box_type).collect();
    assert_eq!(top, vec![*b"ftyp", *b"mdat", *b"moov"]);

    let mdhd = find_box_path(&data, &[b"moov", b"trak", b"mdia", b"mdhd"]).unwrap();
    assert_eq!(u32_at(mdhd, 12), VIDEO_TIMESCALE);
    assert_eq!(u32_at(mdhd, 16), 3 * VIDEO_TIMESCALE);

    let mvhd = find_box_path(&data, &[b"moov", b"mvhd"]).unwrap();
    assert_eq!(u32_at(mvhd, 12), 1_000);
    assert_eq!(u32_at(mvhd, 16), 3_000);

    assert_eq!(u32_at(stbl_child(&data, b"stsz"), 8), 90);
    // Default 2 s keyframe interval at 30 fps
    let stss = stbl_child(&data, b"stss");
    assert_eq!(u32_at(stss, 4), 2);
    assert_eq!(u32_at(stss, 8), 1);
    assert_eq!(u32_at(stss, 12), 61);
}

#[test]
fn test_single_commit_yields_one_sample() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("one.mp4")).size(32, 32);
    let session = fake_factory(false).create(Format::Mp4, config).unwrap();
    session.commit_frame(&[0u8; 32 * 32 * 4], 1_234_567).unwrap();
    let data = read(&finish_and_wait(&session).unwrap());

    assert_eq!(u32_at(stbl_child(&data, b"stsz"), 8), 1);
    let mdhd = find_box_path(&data, &[b"moov", b"trak", b"mdia", b"mdhd"]).unwrap();
    assert_eq!(u32_at(mdhd, 16), VIDEO_TIMESCALE / 30);
}

#[test]
fn test_stall_is_filled_with_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("stall.mp4"))
        .size(32, 32)
        .frame_rate(30.0);
    let session = fake_factory(false).create(Format::Mp4, config).unwrap();
    session.commit_frame(&[1u8; 32 * 32 * 4], 0).unwrap();
    // One second with no frames
    session.commit_frame(&[2u8; 32 * 32 * 4], 1_000_000_000).unwrap();
    let data = read(&finish_and_wait(&session).unwrap());

    // 30 ticks of the first frame plus the second one
    assert_eq!(u32_at(stbl_child(&data, b"stsz"), 8), 31);
    let mdhd = find_box_path(&data, &[b"moov", b"trak", b"mdia", b"mdhd"]).unwrap();
    assert_eq!(u32_at(mdhd, 16), 31 * 3_000);
}

#[test]
fn test_hevc_sample_entry() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("clip.mp4"))
        .size(64, 48)
        .frame_rate(25.0);
    let session = fake_factory(false).create(Format::Hevc, config).unwrap();
    for ts in spaced(10, 25.0) {
        session.commit_frame(&[0u8; 64 * 48 * 4], ts).unwrap();
    }
    let data = read(&finish_and_wait(&session).unwrap());

    let stsd = stbl_child(&data, b"stsd");
    let hvc1 = find_box(&stsd[8..], b"hvc1").expect("hvc1 sample entry");
    let entry = hvc1.content(&stsd[8..]);
    assert!(find_box(&entry[78..], b"hvcC").is_some());
    assert_eq!(u32_at(stbl_child(&data, b"stsz"), 8), 10);

    let ftyp = find_box(&data, b"ftyp").unwrap();
    assert!(ftyp.content(&data).windows(4).any(|w| w == b"hvc1"));
}

#[test]
fn test_aac_audio_track() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("av.mp4"))
        .size(32, 32)
        .frame_rate(30.0)
        .audio(48_000, 2)
        .queue(lossless_queue());
    let session = fake_factory(true).create(Format::Mp4, config).unwrap();

    let block = vec![0.1f32; 1600 * 2];
    for ts in spaced(30, 30.0) {
        session.commit_frame(&[0u8; 32 * 32 * 4], ts).unwrap();
        session.commit_samples(&block, ts).unwrap();
    }
    let data = read(&finish_and_wait(&session).unwrap());

    let traks = traks(&data);
    assert_eq!(traks.len(), 2);
    let audio = &traks[1];
    let mdhd = find_box_path(audio, &[b"mdia", b"mdhd"]).unwrap();
    assert_eq!(u32_at(mdhd, 12), 48_000);
    // 30 blocks of 1600 frames = one second
    assert_eq!(u32_at(mdhd, 16), 48_000);

    let stsd = find_box_path(audio, &[b"mdia", b"minf", b"stbl", b"stsd"]).unwrap();
    assert!(find_box(&stsd[8..], b"mp4a").is_some());
    // 46 full 1024-frame packets plus the flushed remainder
    let stsz = find_box_path(audio, &[b"mdia", b"minf", b"stbl", b"stsz"]).unwrap();
    assert_eq!(u32_at(stsz, 8), 47);
}

#[test]
fn test_pcm_fallback_without_aac() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("pcm.mp4"))
        .size(32, 32)
        .audio(44_100, 1);
    let session = fake_factory(false).create(Format::Mp4, config).unwrap();
    session.commit_frame(&[0u8; 32 * 32 * 4], 0).unwrap();
    session.commit_samples(&[0.5f32; 441], 0).unwrap();
    let data = read(&finish_and_wait(&session).unwrap());

    let traks = traks(&data);
    assert_eq!(traks.len(), 2);
    let stsd = find_box_path(&traks[1], &[b"mdia", b"minf", b"stbl", b"stsd"]).unwrap();
    assert!(find_box(&stsd[8..], b"sowt").is_some());
}

#[test]
fn test_odd_size_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("odd.mp4")).size(33, 32);
    let err = fake_factory(false).create(Format::Mp4, config).unwrap_err();
    assert_eq!(err.status(), framecorder::MediaStatus::InvalidArgument);
}
