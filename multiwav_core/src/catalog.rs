use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::timecode::format_timecode;
use crate::wav::{SampleSource, SourceEncoding};
use crate::{AudioShape, ExtractError};

/// Highest channel count a recording may have.
pub const MAX_CHANNELS: u16 = 64;

/// Extension of the container files picked up by [`discover_inputs`].
pub const INPUT_EXTENSION: &str = "wav";

/// Header facts of one file in a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub frames: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SourceEncoding,
}

/// Where a global frame index lands inside the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLocation {
    /// Index of the file holding the frame; equals the file count at the end
    /// of the stream.
    pub file_index: usize,
    /// Global frame index of the first frame of that file.
    pub file_start: u64,
    /// Offset of the frame within that file.
    pub offset: u64,
}

/// Ordered, validated list of files that together form one recording.
#[derive(Debug, Clone)]
pub struct InputCatalog {
    files: Vec<InputFile>,
    sample_rate: u32,
    channels: u16,
    total_frames: u64,
}

impl InputCatalog {
    /// Inspect every file header, in order, and check that all files share
    /// the sample rate and channel count of the first one.
    pub fn build<I, P>(paths: I) -> Result<Self, ExtractError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut files: Vec<InputFile> = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let source = SampleSource::open(path)?;
            let spec = *source.spec();
            drop(source);

            if spec.sample_rate == 0 {
                return Err(ExtractError::UnsupportedEncoding {
                    path: path.to_path_buf(),
                    detail: "sample rate of 0 Hz".to_owned(),
                });
            }

            match files.first() {
                None => {
                    if spec.channels > MAX_CHANNELS {
                        return Err(ExtractError::ChannelLimitExceeded {
                            channels: spec.channels,
                            limit: MAX_CHANNELS,
                        });
                    }
                }
                Some(first) => {
                    if first.sample_rate != spec.sample_rate || first.channels != spec.channels {
                        return Err(ExtractError::FormatMismatch {
                            path: path.to_path_buf(),
                            expected: AudioShape::new(first.sample_rate, first.channels),
                            found: AudioShape::new(spec.sample_rate, spec.channels),
                        });
                    }
                }
            }

            info!("{}: {} samples", path.display(), spec.frames);
            files.push(InputFile {
                path: path.to_path_buf(),
                frames: spec.frames,
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                encoding: spec.encoding,
            });
        }

        let (sample_rate, channels) = match files.first() {
            Some(first) => (first.sample_rate, first.channels),
            None => return Err(ExtractError::NoInputFiles),
        };
        let total_frames = files.iter().map(|file| file.frames).sum();

        Ok(Self {
            files,
            sample_rate,
            channels,
            total_frames,
        })
    }

    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Map a global frame index to a file and an offset within it.
    ///
    /// Frames on a file boundary belong to the later file. Only frame counts
    /// are consulted; no file is opened.
    pub fn locate(&self, frame: u64) -> Option<StreamLocation> {
        if frame > self.total_frames {
            return None;
        }
        let mut file_start = 0;
        for (file_index, file) in self.files.iter().enumerate() {
            if frame < file_start + file.frames {
                return Some(StreamLocation {
                    file_index,
                    file_start,
                    offset: frame - file_start,
                });
            }
            file_start += file.frames;
        }
        Some(StreamLocation {
            file_index: self.files.len(),
            file_start,
            offset: 0,
        })
    }

    /// Recording length as `HH:MM:SS(+N frames)`.
    pub fn duration_label(&self) -> String {
        let rate = u64::from(self.sample_rate.max(1));
        let seconds = self.total_frames / rate;
        format!(
            "{:02}:{:02}:{:02}(+{} frames)",
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60,
            self.total_frames % rate
        )
    }

    /// One-line description of the recording.
    pub fn summary(&self) -> String {
        format!(
            "{} channels, {} at {}Hz",
            self.channels,
            self.duration_label(),
            self.sample_rate
        )
    }

    /// The end of the recording as a time specification string.
    pub fn end_timecode(&self) -> String {
        format_timecode(self.total_frames, self.sample_rate)
    }
}

/// List the WAV files of `dir`, sorted by file name.
///
/// The extension match ignores case. The sort order is taken to be the
/// recording order.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let entries = fs::read_dir(dir).map_err(|source| ExtractError::io(dir, source))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ExtractError::io(dir, source))?;
        let path = entry.path();
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(INPUT_EXTENSION));
        if is_wav && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(ExtractError::NoInputFiles);
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
