mod common;

use std::time::Duration;

use common::{fake_factory, finish_and_wait, read, spaced};
use framecorder::mux::wav;
use framecorder::mux::webm::{find_element, id, iter_elements, read_uint};
use framecorder::{Backpressure, Format, MediaStatus, QueueConfig, RecorderFactory, RecordingConfig};

#[test]
fn test_gif_five_frames_loop_forever() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("anim.gif"))
        .size(100, 100)
        .frame_delay(0.1);
    let session = RecorderFactory::new().create(Format::Gif, config).unwrap();

    for (i, ts) in spaced(5, 10.0).into_iter().enumerate() {
        let shade = (i * 50) as u8;
        let frame: Vec<u8> = (0..100 * 100)
            .flat_map(|_| [shade, 255 - shade, 128, 255])
            .collect();
        session.commit_frame(&frame, ts).unwrap();
    }
    let path = finish_and_wait(&session).expect("GIF should finalize");
    let bytes = read(&path);

    let netscape = bytes
        .windows(11)
        .position(|w| w == b"NETSCAPE2.0")
        .expect("loop extension");
    // Sub-block: size 3, id 1, loop count 0 = infinite
    assert_eq!(&bytes[netscape + 11..netscape + 15], &[3, 1, 0, 0]);

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!((decoder.width(), decoder.height()), (100, 100));
    let mut delays = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        delays.push(frame.delay);
    }
    assert_eq!(delays, vec![10; 5]);
}

#[test]
fn test_gif_delay_follows_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("var.gif"))
        .size(8, 8)
        .frame_delay(0.05);
    let session = RecorderFactory::new().create(Format::Gif, config).unwrap();
    let frame = [200u8; 8 * 8 * 4];
    // 20 ms (clamped up to 50 ms), then 300 ms, then the last frame
    for ts in [0, 20_000_000, 320_000_000] {
        session.commit_frame(&frame, ts).unwrap();
    }
    let path = finish_and_wait(&session).unwrap();

    let mut decoder = gif::DecodeOptions::new()
        .read_info(std::fs::File::open(&path).unwrap())
        .unwrap();
    let mut delays = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        delays.push(frame.delay);
    }
    assert_eq!(delays, vec![5, 30, 5]);
}

#[test]
fn test_wav_size_matches_bytes_written() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("tone.wav")).audio(44_100, 2);
    let session = RecorderFactory::new().create(Format::Wav, config).unwrap();

    let mut samples_written = 0usize;
    for (i, ts) in spaced(20, 100.0).into_iter().enumerate() {
        let block: Vec<f32> = (0..441 * 2).map(|n| ((n + i) as f32 * 0.01).sin()).collect();
        session.commit_samples(&block, ts).unwrap();
        samples_written += block.len();
    }
    let path = finish_and_wait(&session).unwrap();
    let data = read(&path);

    let info = wav::parse_header(&data).unwrap();
    assert_eq!(info.data_size as usize, samples_written * 2);
    assert_eq!(info.riff_size as usize, data.len() - 8);
    assert_eq!(info.sample_rate, 44_100);
    assert_eq!(info.channels, 2);
    assert_eq!(data.len(), wav::HEADER_SIZE + samples_written * 2);
}

#[test]
fn test_wav_clamps_out_of_range_samples() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("clip.wav")).audio(8_000, 1);
    let session = RecorderFactory::new().create(Format::Wav, config).unwrap();
    session.commit_samples(&[2.0, -2.0, 0.0, 1.0], 0).unwrap();
    let data = read(&finish_and_wait(&session).unwrap());

    let pcm: Vec<i16> = data[wav::HEADER_SIZE..]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(pcm, vec![i16::MAX, -i16::MAX, 0, i16::MAX]);
}

#[test]
fn test_wav_backwards_audio_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("bad.wav")).audio(8_000, 1);
    let session = RecorderFactory::new().create(Format::Wav, config).unwrap();
    session.commit_samples(&[0.0; 80], 10_000_000).unwrap();
    session.commit_samples(&[0.0; 80], 5_000_000).unwrap();
    assert_eq!(finish_and_wait(&session), None);
}

#[test]
fn test_wav_rejects_oversized_sample_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.wav");
    let config = RecordingConfig::new(&path).audio(3_000_000_000, 2);
    let err = RecorderFactory::new().create(Format::Wav, config).unwrap_err();
    assert_eq!(err.status(), MediaStatus::InvalidArgument);
    assert!(!path.exists());
}

#[test]
fn test_webm_with_opus() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("clip.webm"))
        .size(64, 48)
        .frame_rate(25.0)
        .audio(48_000, 2)
        .keyframe_interval(1.0)
        .queue(QueueConfig::default().video(Backpressure::Block {
            timeout: Duration::from_secs(10),
        }));
    let session = fake_factory(false).create(Format::Webm, config).unwrap();

    let frame = [0u8; 64 * 48 * 4];
    let block = vec![0.0f32; 1920 * 2];
    for ts in spaced(50, 25.0) {
        session.commit_frame(&frame, ts).unwrap();
        session.commit_samples(&block, ts).unwrap();
    }
    let data = read(&finish_and_wait(&session).unwrap());

    let top = iter_elements(&data);
    assert_eq!(top[0].id, id::EBML);
    let segment = &top[1];
    assert_eq!(segment.id, id::SEGMENT);
    // Sizes were patched away from the unknown-size sentinel
    assert_eq!(
        segment.size,
        Some((data.len() - segment.offset - segment.header_size) as u64)
    );
    let body = segment.payload(&data);

    let tracks = find_element(body, id::TRACKS).unwrap();
    let entries: Vec<_> = iter_elements(tracks.payload(body))
        .into_iter()
        .filter(|e| e.id == id::TRACK_ENTRY)
        .collect();
    assert_eq!(entries.len(), 2);
    let audio_entry = entries[1].payload(tracks.payload(body));
    let codec = find_element(audio_entry, id::CODEC_ID).unwrap();
    assert_eq!(codec.payload(audio_entry), b"A_OPUS");
    let private = find_element(audio_entry, id::CODEC_PRIVATE).unwrap();
    assert_eq!(&private.payload(audio_entry)[..8], b"OpusHead");

    let info = find_element(body, id::INFO).unwrap();
    let duration = find_element(info.payload(body), id::DURATION).unwrap();
    let bytes: [u8; 8] = duration.payload(info.payload(body)).try_into().unwrap();
    assert_eq!(f64::from_be_bytes(bytes), 2_000.0);

    let mut video_blocks = 0;
    let mut audio_blocks = 0;
    for cluster in iter_elements(body).into_iter().filter(|e| e.id == id::CLUSTER) {
        assert!(cluster.size.is_some());
        let content = cluster.payload(body);
        for block in iter_elements(content).into_iter().filter(|e| e.id == id::SIMPLE_BLOCK) {
            match block.payload(content)[0] {
                0x81 => video_blocks += 1,
                0x82 => audio_blocks += 1,
                other => panic!("unexpected track byte {:#x}", other),
            }
        }
    }
    assert_eq!(video_blocks, 50);
    // 50 blocks of 1920 frames = 100 Opus packets of 960
    assert_eq!(audio_blocks, 100);

    let cues = find_element(body, id::CUES).unwrap();
    let first = iter_elements(cues.payload(body)).remove(0);
    let time = find_element(first.payload(cues.payload(body)), id::CUE_TIME).unwrap();
    assert_eq!(read_uint(time.payload(first.payload(cues.payload(body)))), 0);
}

#[test]
fn test_webm_needs_external_codecs() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfig::new(dir.path().join("clip.webm")).size(64, 48);
    let err = RecorderFactory::new().create(Format::Webm, config).unwrap_err();
    assert_eq!(err.status(), MediaStatus::NotImplemented);
}

#[test]
fn test_jpeg_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("frames");
    let config = RecordingConfig::new(&out).size(16, 8).quality(90);
    let session = RecorderFactory::new().create(Format::Jpeg, config).unwrap();
    assert!(out.is_dir());

    for i in 0..3 {
        session.commit_frame(&[i as u8 * 80; 16 * 8 * 4], i * 1_000_000).unwrap();
    }
    let path = finish_and_wait(&session).unwrap();
    assert_eq!(path, out);

    for n in 1..=3 {
        let image = read(&out.join(format!("{}.jpg", n)));
        assert_eq!(&image[..2], &[0xFF, 0xD8]);
        assert_eq!(&image[image.len() - 2..], &[0xFF, 0xD9]);
    }
    assert!(!out.join("4.jpg").exists());
}
