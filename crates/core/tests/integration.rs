//! Integration test: capture file → prepare → paced playback.
//!
//! Builds small captures with `CaptureWriter`, prepares them through the
//! public API and plays them into recording sinks or a loopback UDP socket.

use std::net::UdpSocket;
use std::path::PathBuf;
use std::time::Duration;

use replay::media::rtp::RtpHeader;
use replay::session::{MarkReady, PeerState};
use replay::{
    CaptureFormat, CaptureWriter, MediaSink, Playlist, ReplayConfig, ReplayError, Replayer,
    Result, Scheduler,
};

const SPS: [u8; 4] = [0x67, 0x42, 0x00, 0x1f];
const PPS: [u8; 4] = [0x68, 0xce, 0x3c, 0x80];
const IDR: [u8; 3] = [0x65, 0x88, 0x84];
const P_SLICE: [u8; 3] = [0x41, 0x9a, 0x02];

fn rtp(seq: u16, ts: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x80, 0x80 | 102];
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&ts.to_be_bytes());
    packet.extend_from_slice(&1u32.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

fn stap_a(units: &[&[u8]]) -> Vec<u8> {
    let mut payload = vec![0x78];
    for unit in units {
        payload.extend_from_slice(&(unit.len() as u16).to_be_bytes());
        payload.extend_from_slice(unit);
    }
    payload
}

fn length_prefixed(units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&(unit.len() as u32).to_be_bytes());
        out.extend_from_slice(unit);
    }
    out
}

fn write_capture(name: &str, format: CaptureFormat, packets: &[Vec<u8>]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "rtp-replay-{}-{}.cap",
        name,
        std::process::id()
    ));
    let mut writer = CaptureWriter::create(&path, format).expect("create capture");
    for packet in packets {
        writer.write_record(packet, 0).expect("write record");
    }
    writer.finish().expect("finish capture");
    path
}

/// Keyframe access unit in one STAP-A, then a P-slice 3000 ticks later.
fn two_sample_capture() -> Vec<Vec<u8>> {
    vec![
        rtp(10, 1000, &stap_a(&[&SPS, &PPS, &IDR])),
        rtp(11, 4000, &P_SLICE),
    ]
}

fn unpaced() -> ReplayConfig {
    ReplayConfig {
        pacing: false,
        ..ReplayConfig::default()
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Vec<(u32, Vec<u8>)>,
    timestamp: u32,
    accept: usize,
}

impl RecordingSink {
    fn accepting(accept: usize) -> Self {
        Self {
            accept,
            ..Self::default()
        }
    }
}

impl MediaSink for RecordingSink {
    fn set_outgoing_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    fn try_send(&mut self, sample: &[u8]) -> Result<bool> {
        if self.sent.len() >= self.accept {
            return Ok(false);
        }
        self.sent.push((self.timestamp, sample.to_vec()));
        Ok(true)
    }
}

#[test]
fn capture_to_sink_in_order() {
    let path = write_capture("order", CaptureFormat::Plain, &two_sample_capture());
    let replayer = Replayer::new(unpaced());
    let playlist = replayer.prepare(&path).expect("prepare");
    std::fs::remove_file(&path).ok();

    assert_eq!(playlist.len(), 2);
    assert_eq!(playlist.stats().samples, 2);
    assert_eq!(playlist.stats().timing_entries, playlist.stats().samples);
    let delays: Vec<i64> = playlist.entries().iter().map(|e| e.delay_millis).collect();
    assert_eq!(delays, vec![0, 33]);
    assert_eq!(playlist.paced_duration_millis(), 33);

    let mut sink = RecordingSink::accepting(usize::MAX);
    let report = replayer.play(&playlist, &mut sink).expect("play");
    assert_eq!(report.sent, 2);

    assert_eq!(sink.sent[0].0, 1000);
    assert_eq!(sink.sent[0].1, length_prefixed(&[&SPS, &PPS, &IDR]));
    assert_eq!(sink.sent[1].0, 4000);
    assert_eq!(sink.sent[1].1, length_prefixed(&[&P_SLICE]));
}

#[test]
fn refused_send_stops_playback() {
    let path = write_capture("refuse", CaptureFormat::Plain, &two_sample_capture());
    let replayer = Replayer::new(unpaced());
    let playlist = replayer.prepare(&path).expect("prepare");
    std::fs::remove_file(&path).ok();

    let mut sink = RecordingSink::accepting(1);
    let err = replayer.play(&playlist, &mut sink).unwrap_err();
    assert!(matches!(err, ReplayError::SendFailure { index: 1, .. }));
    assert_eq!(sink.sent.len(), 1);
}

#[test]
fn paced_playback_sleeps_between_samples() {
    let path = write_capture("paced", CaptureFormat::Framed, &two_sample_capture());
    let config = ReplayConfig {
        capture_format: CaptureFormat::Framed,
        ..ReplayConfig::default()
    };
    let playlist = Playlist::from_capture(&path, &config).expect("prepare");
    std::fs::remove_file(&path).ok();

    let slept = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = slept.clone();
    let mut scheduler = Scheduler::new().with_sleeper(move |d| recorded.lock().push(d));
    let mut sink = RecordingSink::accepting(usize::MAX);
    scheduler.run(playlist.entries(), &mut sink).expect("run");

    assert_eq!(sink.sent.len(), 2);
    assert_eq!(*slept.lock(), vec![Duration::from_millis(33)]);
}

#[test]
fn fu_a_across_packets_with_malformed_record_between() {
    let packets = vec![
        rtp(1, 9000, &[0x7c, 0x85, 0x88, 0x01]),
        rtp(2, 9000, &[]),
        rtp(3, 9000, &[0x7c, 0x05, 0x02, 0x03]),
        rtp(4, 9000, &[0x7c, 0x45, 0x04]),
    ];
    let path = write_capture("fua", CaptureFormat::Plain, &packets);
    let playlist = Playlist::from_capture(&path, &ReplayConfig::default()).expect("prepare");
    std::fs::remove_file(&path).ok();

    assert_eq!(playlist.stats().records, 4);
    assert_eq!(playlist.stats().depacketizer.malformed, 1);
    assert_eq!(playlist.stats().samples, 1);
    assert_eq!(playlist.stats().timing_entries, 1);
    assert_eq!(playlist.len(), 1);
    let entry = &playlist.entries()[0];
    assert_eq!(entry.timestamp, 9000);
    assert_eq!(
        entry.sample.as_bytes(),
        length_prefixed(&[&[0x65, 0x88, 0x01, 0x02, 0x03, 0x04]])
    );
}

#[test]
fn missing_capture_is_an_open_error() {
    let replayer = Replayer::new(ReplayConfig::default());
    let err = replayer
        .prepare("/nonexistent/rtp-replay/capture.cap")
        .unwrap_err();
    assert!(matches!(err, ReplayError::CaptureOpen { .. }));
}

#[test]
fn replay_to_peer_over_udp() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let dest = receiver.local_addr().unwrap();

    let path = write_capture("udp", CaptureFormat::Plain, &two_sample_capture());
    let replayer = Replayer::new(unpaced());
    let playlist = replayer.prepare(&path).expect("prepare");
    std::fs::remove_file(&path).ok();

    let peer = replayer.peers().register("offer", dest);
    replayer.peers().open_track("offer", &MarkReady).unwrap();
    assert_eq!(peer.state(), PeerState::Ready);

    let report = replayer.play_to_peer("offer", &playlist).expect("play");
    assert_eq!(report.sent, 2);
    assert_eq!(peer.state(), PeerState::Closed);
    assert!(replayer.peers().is_empty());

    // SPS, PPS and IDR go out as single NAL packets sharing one timestamp.
    let mut buf = [0u8; 1500];
    let mut received = Vec::new();
    for _ in 0..4 {
        let n = receiver.recv(&mut buf).expect("recv");
        let (header, payload) = RtpHeader::parse(&buf[..n]).unwrap();
        received.push((header.timestamp, header.marker, payload.to_vec()));
    }
    assert_eq!(received[0], (1000, false, SPS.to_vec()));
    assert_eq!(received[1], (1000, false, PPS.to_vec()));
    assert_eq!(received[2], (1000, true, IDR.to_vec()));
    assert_eq!(received[3], (4000, true, P_SLICE.to_vec()));
}
