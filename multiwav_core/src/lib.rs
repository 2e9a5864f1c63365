//! Streaming extraction of channel groups from multi-file multichannel WAV
//! recordings.
//!
//! A recorder splits one long take across many consecutive WAV files. This
//! crate treats those files as a single stream, cuts a frame range out of it
//! and writes every exported channel group to its own set of WAV files,
//! rotating to a new file before the container's size limit is reached.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

pub mod catalog;
pub mod engine;
pub mod format;
pub mod groups;
pub mod session_log;
pub mod stream;
pub mod timecode;
pub mod wav;
pub mod writer;

pub use catalog::{discover_inputs, InputCatalog, InputFile};
pub use engine::{
    CallbackReporter, CancelToken, ExtractionEngine, ExtractionJob, ProgressEvent,
    ProgressReporter, RunMetrics, RunOutcome, BLOCK_FRAMES,
};
pub use format::SampleFormat;
pub use groups::{plan_groups, ChannelGroup, ChannelSettings};
pub use session_log::SessionMetadata;
pub use timecode::{format_timecode, parse_timecode, Timecode, TimecodeError};
pub use writer::MAX_FILE_BYTES;

/// Errors that can occur while reading a recording or extracting from it.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No input file was given, or a directory holds no WAV file.
    #[error("no input files")]
    NoInputFiles,

    /// An input file disagrees with the first one on rate or channel count.
    #[error("{} has {found}, expected {expected}", .path.display())]
    FormatMismatch {
        path: PathBuf,
        expected: AudioShape,
        found: AudioShape,
    },

    /// The recording has more channels than the engine supports.
    #[error("recording has {channels} channels, at most {limit} are supported")]
    ChannelLimitExceeded { channels: u16, limit: u16 },

    /// A start or end time could not be parsed.
    #[error("invalid {field} time '{input}': {source}")]
    TimeParse {
        field: &'static str,
        input: String,
        source: TimecodeError,
    },

    /// The requested range is reversed or runs past the recording.
    #[error("frame range {start}..{end} is outside the recording of {total} frames")]
    InvalidRange { start: u64, end: u64, total: u64 },

    /// A channel group names channels the recording does not have.
    #[error("channel group {}-{} exceeds the {channels} channels of the recording", .first + 1, .last + 1)]
    GroupOutOfRange {
        first: usize,
        last: usize,
        channels: usize,
    },

    /// A group label that cannot be part of a file name.
    #[error("channel label '{label}' of group {} contains a path separator", .first + 1)]
    InvalidLabel { first: usize, label: String },

    /// A session log shorter than its fixed layout.
    #[error("session log has {len} bytes, at least {required} are required")]
    TruncatedLog { len: usize, required: usize },

    /// A seek beyond the last frame.
    #[error("cannot seek to frame {requested} of {total}")]
    SeekOutOfRange { requested: u64, total: u64 },

    /// Opening, reading or writing a file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The WAV codec rejected a file.
    #[error("WAV error in {}: {source}", .path.display())]
    Wav {
        path: PathBuf,
        source: hound::Error,
    },

    /// A WAV file whose sample encoding cannot be decoded.
    #[error("{} uses an unsupported encoding: {detail}", .path.display())]
    UnsupportedEncoding { path: PathBuf, detail: String },

    /// An output file exists and overwriting was not allowed.
    #[error("{} already exists", .0.display())]
    OutputExists(PathBuf),
}

impl ExtractError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn wav(path: impl AsRef<Path>, source: hound::Error) -> Self {
        Self::Wav {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Sample rate and channel count shared by every file of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioShape {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioShape {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl fmt::Display for AudioShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} channels at {}Hz", self.channels, self.sample_rate)
    }
}

/// Configuration for one extraction.
#[derive(Clone, Debug)]
pub struct Config {
    /// Input files in recording order.
    pub inputs: Vec<PathBuf>,
    /// Directory the group files are written to. Created when missing.
    pub output_dir: PathBuf,
    pub start: Timecode,
    /// `None` runs to the end of the recording.
    pub end: Option<Timecode>,
    pub format: SampleFormat,
    pub channels: ChannelSettings,
    /// Replace output files left by an earlier run.
    pub overwrite: bool,
    /// Byte ceiling of a single output file.
    pub max_file_bytes: u64,
    /// Frames read per block.
    pub block_frames: NonZeroUsize,
}

impl Config {
    /// Start building a [`Config`] for the given inputs and output directory.
    pub fn builder<I, P, Q>(inputs: I, output_dir: Q) -> ConfigBuilder
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        ConfigBuilder {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output_dir: output_dir.into(),
            start: None,
            end: None,
            format: SampleFormat::default(),
            channels: ChannelSettings::default(),
            overwrite: false,
            max_file_bytes: MAX_FILE_BYTES,
            block_frames: NonZeroUsize::new(BLOCK_FRAMES).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Turn the time specifications into frames and plan the groups for
    /// `catalog`.
    pub fn resolve(&self, catalog: &InputCatalog) -> Result<ExtractionJob, ExtractError> {
        let rate = catalog.sample_rate();
        let total = catalog.total_frames();
        // A time too large for a frame count lies past the end of any
        // recording, so it saturates and fails the range check below.
        let start_frame = self.start.to_frame(rate).unwrap_or(u64::MAX);
        let end_frame = self
            .end
            .map_or(Some(total), |end| end.to_frame(rate))
            .unwrap_or(u64::MAX);

        let groups = plan_groups(usize::from(catalog.channel_count()), &self.channels);
        debug!(
            "resolved {}..{} to frames {start_frame}..{end_frame} with {} group(s)",
            self.start,
            self.end.map_or_else(|| "end".to_owned(), |end| end.to_string()),
            groups.len()
        );

        let mut job = ExtractionJob::new(
            start_frame,
            end_frame,
            self.format,
            groups,
            self.output_dir.clone(),
        );
        job.max_file_bytes = self.max_file_bytes;
        job.validate(catalog)?;
        Ok(job)
    }
}

/// Builder for [`Config`]. Time strings are parsed in [`ConfigBuilder::build`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    start: Option<String>,
    end: Option<String>,
    format: SampleFormat,
    channels: ChannelSettings,
    overwrite: bool,
    max_file_bytes: u64,
    block_frames: NonZeroUsize,
}

impl ConfigBuilder {
    /// Start of the range as `[[hh:]mm:]ss[.frames]`. Defaults to the
    /// beginning of the recording.
    pub fn start(mut self, value: impl Into<String>) -> Self {
        self.start = Some(value.into());
        self
    }

    /// End of the range, exclusive. Defaults to the end of the recording.
    pub fn end(mut self, value: impl Into<String>) -> Self {
        self.end = Some(value.into());
        self
    }

    pub fn format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn channels(mut self, channels: ChannelSettings) -> Self {
        self.channels = channels;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn block_frames(mut self, block_frames: NonZeroUsize) -> Self {
        self.block_frames = block_frames;
        self
    }

    pub fn build(self) -> Result<Config, ExtractError> {
        if self.inputs.is_empty() {
            return Err(ExtractError::NoInputFiles);
        }

        let start = match self.start {
            Some(value) => parse_field("start", value)?,
            None => Timecode::default(),
        };
        let end = self
            .end
            .map(|value| parse_field("end", value))
            .transpose()?;

        Ok(Config {
            inputs: self.inputs,
            output_dir: self.output_dir,
            start,
            end,
            format: self.format,
            channels: self.channels,
            overwrite: self.overwrite,
            max_file_bytes: self.max_file_bytes,
            block_frames: self.block_frames,
        })
    }
}

fn parse_field(field: &'static str, input: String) -> Result<Timecode, ExtractError> {
    parse_timecode(&input).map_err(|source| ExtractError::TimeParse {
        field,
        input,
        source,
    })
}

/// First file of every exported group, without writing anything.
pub fn plan_outputs(config: &Config) -> Result<Vec<PathBuf>, ExtractError> {
    let catalog = InputCatalog::build(&config.inputs)?;
    Ok(config.resolve(&catalog)?.first_output_paths())
}

/// Perform the extraction described by `config`.
pub fn run(config: Config) -> Result<RunMetrics, ExtractError> {
    struct Silent;
    impl ProgressReporter for Silent {}

    run_with_metrics(config, &mut Silent)
}

/// Perform the extraction, handing every [`ProgressEvent`] to `on_progress`.
pub fn run_with_progress<F>(config: Config, on_progress: F) -> Result<RunMetrics, ExtractError>
where
    F: FnMut(ProgressEvent),
{
    run_with_metrics(config, &mut CallbackReporter::new(on_progress))
}

/// Perform the extraction with a custom reporter, which may also cancel it.
pub fn run_with_metrics<R>(config: Config, reporter: &mut R) -> Result<RunMetrics, ExtractError>
where
    R: ProgressReporter + ?Sized,
{
    let catalog = InputCatalog::build(&config.inputs)?;
    let job = config.resolve(&catalog)?;

    if !config.overwrite {
        if let Some(existing) = job.first_output_paths().into_iter().find(|p| p.exists()) {
            return Err(ExtractError::OutputExists(existing));
        }
    }

    ExtractionEngine::new(&catalog, job)
        .with_block_frames(config.block_frames)
        .run(reporter)
}
