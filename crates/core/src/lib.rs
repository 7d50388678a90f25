pub mod capture;
pub mod error;
pub mod media;
pub mod playlist;
pub mod replayer;
pub mod scheduler;
pub mod sdp;
pub mod session;
pub mod timing;
pub mod transport;

pub use capture::{CaptureFormat, CaptureReader, CaptureRecord, CaptureWriter};
pub use error::{Result, ReplayError};
pub use media::MediaSink;
pub use playlist::{Playlist, ScheduleEntry};
pub use replayer::{ReplayConfig, Replayer};
pub use scheduler::{PlaybackReport, Scheduler};
