use clap::Parser;
use replay::media::h264::H264Packetizer;
use replay::sdp::generate_sdp;
use replay::session::MarkReady;
use replay::{CaptureFormat, Playlist, ReplayConfig, Replayer};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process::ExitCode;

const PEER_ID: &str = "cli";

#[derive(Parser)]
#[command(
    name = "rtp-replay",
    about = "Replay a captured H.264 RTP stream with its original pacing"
)]
struct Args {
    /// Capture file to replay
    capture: PathBuf,

    /// Destination for the replayed RTP stream (host:port)
    #[arg(long, short)]
    dest: String,

    /// Records carry the 8-byte framing prefix written by the recorder
    #[arg(long)]
    framed: bool,

    /// Outbound RTP payload type
    #[arg(long, default_value_t = 102)]
    payload_type: u8,

    /// Outbound SSRC
    #[arg(long, default_value_t = 1)]
    ssrc: u32,

    /// Largest outbound RTP payload before FU-A fragmentation
    #[arg(long, default_value_t = 1400)]
    mtu: usize,

    /// Captured packets larger than this are skipped
    #[arg(long, default_value_t = 65535)]
    max_packet_size: usize,

    /// Write a session description for the replayed stream to this file
    #[arg(long)]
    sdp: Option<PathBuf>,

    /// Send samples back to back without sleeping
    #[arg(long)]
    no_pacing: bool,

    /// Prepare the capture and print what would be sent
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn config(&self) -> ReplayConfig {
        ReplayConfig {
            capture_format: if self.framed {
                CaptureFormat::Framed
            } else {
                CaptureFormat::Plain
            },
            max_packet_size: self.max_packet_size,
            payload_type: self.payload_type,
            ssrc: Some(self.ssrc),
            mtu: self.mtu,
            pacing: !self.no_pacing,
            ..ReplayConfig::default()
        }
    }
}

fn resolve(dest: &str) -> Result<SocketAddr, String> {
    dest.to_socket_addrs()
        .map_err(|e| format!("invalid destination {}: {}", dest, e))?
        .next()
        .ok_or_else(|| format!("destination {} did not resolve", dest))
}

/// Packetizer that has seen the stream's parameter sets, for `sprop-parameter-sets`.
fn primed_packetizer(config: &ReplayConfig, playlist: &Playlist) -> H264Packetizer {
    let mut packetizer = config.packetizer();
    for entry in playlist.entries() {
        if packetizer.sprop_parameter_sets().is_some() {
            break;
        }
        packetizer.packetize_sample(entry.sample.as_bytes());
    }
    packetizer
}

fn print_stats(playlist: &Playlist) {
    let stats = playlist.stats();
    println!("records:         {}", stats.records);
    println!("invalid records: {}", stats.invalid_records);
    println!("malformed:       {}", stats.depacketizer.malformed);
    println!("unknown types:   {}", stats.depacketizer.unknown_type);
    println!("stream bytes:    {}", stats.stream_bytes);
    println!("NAL units:       {}", stats.nal_units);
    println!("samples:         {}", stats.samples);
    println!("timing entries:  {}", stats.timing_entries);
    println!("paced duration:  {} ms", playlist.paced_duration_millis());
}

fn run(args: &Args) -> Result<(), String> {
    let destination = resolve(&args.dest)?;
    let replayer = Replayer::new(args.config());

    let playlist = replayer
        .prepare(&args.capture)
        .map_err(|e| format!("failed to prepare capture: {}", e))?;

    if let Some(path) = &args.sdp {
        let packetizer = primed_packetizer(replayer.config(), &playlist);
        let sdp = generate_sdp(&packetizer, destination, replayer.config());
        std::fs::write(path, sdp)
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
        tracing::info!(path = %path.display(), "wrote SDP");
    }

    if args.dry_run {
        print_stats(&playlist);
        return Ok(());
    }

    replayer.peers().register(PEER_ID, destination);
    replayer
        .peers()
        .open_track(PEER_ID, &MarkReady)
        .map_err(|e| e.to_string())?;

    println!(
        "Replaying {} samples from {} to {}",
        playlist.len(),
        args.capture.display(),
        destination
    );
    let report = replayer
        .play_to_peer(PEER_ID, &playlist)
        .map_err(|e| format!("replay failed: {}", e))?;
    println!("Sent {} samples ({} bytes)", report.sent, report.bytes);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
