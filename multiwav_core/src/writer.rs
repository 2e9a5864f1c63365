use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::format::SampleFormat;
use crate::wav::SampleSink;
use crate::ExtractError;

/// Default ceiling on the sample data of a single output file. The usable
/// amount is further clamped by [`frame_capacity`] so that header and data
/// together fit the 32-bit size fields of the RIFF container.
pub const MAX_FILE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Bytes set aside for the largest header either WAV writer produces
/// (68 bytes for an extensible `fmt ` chunk).
const HEADER_RESERVE: u64 = 80;

/// Most sample data bytes a single RIFF file can describe.
const CONTAINER_DATA_LIMIT: u64 = u32::MAX as u64 + 1 - HEADER_RESERVE;

/// Extension of every file written by the engine.
pub const OUTPUT_EXTENSION: &str = "wav";

/// Frames that fit in one output file for the given format and group width.
pub fn frame_capacity(max_file_bytes: u64, format: SampleFormat, channels: u16) -> u64 {
    let samples = max_file_bytes.min(CONTAINER_DATA_LIMIT) / format.bytes_per_sample();
    (samples / u64::from(channels.max(1))).max(1)
}

/// Path of the `index`-th file of a group: `<base>.wav` for the first,
/// `<base>-<index>.wav` afterwards.
pub fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    if index > 0 {
        name.push(format!("-{index}"));
    }
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    PathBuf::from(name)
}

/// Rotation bookkeeping of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
    pub current_file_index: u32,
    pub frames_written_in_current_file: u64,
    pub frame_capacity_per_file: u64,
}

/// Writes one channel group, starting a new file whenever the next block
/// would push the current one past its frame capacity.
///
/// Rotation is decided once per block, before it is written: a block is
/// never split across two files. A file that is still empty takes the block
/// regardless of its size.
pub struct RotatingGroupWriter {
    base_path: PathBuf,
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
    state: RotationState,
    sink: Option<SampleSink>,
    written: Vec<PathBuf>,
}

impl RotatingGroupWriter {
    /// Create the group's first file right away.
    pub fn create(
        base_path: impl Into<PathBuf>,
        sample_rate: u32,
        channels: u16,
        format: SampleFormat,
        max_file_bytes: u64,
    ) -> Result<Self, ExtractError> {
        let base_path = base_path.into();
        let path = rotated_path(&base_path, 0);
        let sink = SampleSink::create(&path, sample_rate, channels, format)?;
        info!("writing {}", path.display());

        Ok(Self {
            base_path,
            sample_rate,
            channels,
            format,
            state: RotationState {
                current_file_index: 0,
                frames_written_in_current_file: 0,
                frame_capacity_per_file: frame_capacity(max_file_bytes, format, channels),
            },
            sink: Some(sink),
            written: vec![path],
        })
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    /// Append interleaved frames of this group.
    pub fn write(&mut self, samples: &[f64]) -> Result<(), ExtractError> {
        let frames = (samples.len() / usize::from(self.channels)) as u64;
        let state = &self.state;
        if state.frames_written_in_current_file > 0
            && state.frames_written_in_current_file + frames > state.frame_capacity_per_file
        {
            self.rotate()?;
        }

        if self.sink.is_none() {
            self.open_next()?;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.write_block(samples)?;
        }
        self.state.frames_written_in_current_file += frames;
        Ok(())
    }

    /// Close the current file and return every path written.
    pub fn finish(mut self) -> Result<Vec<PathBuf>, ExtractError> {
        if let Some(sink) = self.sink.take() {
            sink.finalize()?;
        }
        Ok(std::mem::take(&mut self.written))
    }

    fn rotate(&mut self) -> Result<(), ExtractError> {
        if let Some(sink) = self.sink.take() {
            sink.finalize()?;
        }
        self.state.current_file_index += 1;
        self.state.frames_written_in_current_file = 0;
        debug!(
            "rotating {} to file {} after reaching {} frames",
            self.base_path.display(),
            self.state.current_file_index,
            self.state.frame_capacity_per_file
        );
        self.open_next()
    }

    fn open_next(&mut self) -> Result<(), ExtractError> {
        let path = rotated_path(&self.base_path, self.state.current_file_index);
        let sink = SampleSink::create(&path, self.sample_rate, self.channels, self.format)?;
        info!("writing {}", path.display());
        self.written.push(path);
        self.sink = Some(sink);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::SampleSource;

    fn frames_in(path: &Path) -> u64 {
        SampleSource::open(path).unwrap().spec().frames
    }

    #[test]
    fn capacity_depends_on_width_and_channels() {
        assert_eq!(frame_capacity(100, SampleFormat::Pcm16, 1), 50);
        assert_eq!(frame_capacity(100, SampleFormat::Pcm16, 2), 25);
        assert_eq!(frame_capacity(100, SampleFormat::Pcm24, 1), 33);
        assert_eq!(frame_capacity(100, SampleFormat::Double, 3), 4);
        assert_eq!(frame_capacity(MAX_FILE_BYTES, SampleFormat::Pcm24, 2), 715_827_869);
        assert_eq!(frame_capacity(4, SampleFormat::Double, 8), 1);
    }

    #[test]
    fn full_files_fit_the_riff_size_fields() {
        let riff_limit = u64::from(u32::MAX);
        for format in SampleFormat::ALL {
            for channels in 1..=64u16 {
                let capacity = frame_capacity(MAX_FILE_BYTES, format, channels);
                let data = capacity * format.bytes_per_sample() * u64::from(channels);
                assert!(
                    data + HEADER_RESERVE <= riff_limit + 1,
                    "{format} x {channels}: {data} data bytes leave no room for the header"
                );
                // Canonical 44-byte header: RIFF size is 36 + data.
                assert!(data + 36 <= riff_limit, "{format} x {channels}");
                // Extensible 68-byte header: RIFF size is 60 + data.
                assert!(data + 60 <= riff_limit, "{format} x {channels}");
            }
        }
    }

    #[test]
    fn rotated_paths_are_numbered_from_one() {
        let base = Path::new("/out/ch1-2_Drums");
        assert_eq!(rotated_path(base, 0), PathBuf::from("/out/ch1-2_Drums.wav"));
        assert_eq!(rotated_path(base, 1), PathBuf::from("/out/ch1-2_Drums-1.wav"));
        assert_eq!(rotated_path(base, 12), PathBuf::from("/out/ch1-2_Drums-12.wav"));
    }

    #[test]
    fn rotation_is_checked_per_block_and_never_splits_one() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ch1");
        let mut writer = RotatingGroupWriter::create(&base, 8_000, 1, SampleFormat::Pcm16, 100).unwrap();
        assert_eq!(writer.state().frame_capacity_per_file, 50);

        for _ in 0..3 {
            writer.write(&[0.5; 40]).unwrap();
        }
        let paths = writer.finish().unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("ch1.wav"),
                dir.path().join("ch1-1.wav"),
                dir.path().join("ch1-2.wav"),
            ]
        );
        let sizes: Vec<u64> = paths.iter().map(|p| frames_in(p)).collect();
        assert_eq!(sizes, vec![40, 40, 40]);
    }

    #[test]
    fn blocks_fill_a_file_up_to_its_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ch2");
        let mut writer = RotatingGroupWriter::create(&base, 8_000, 1, SampleFormat::Pcm16, 100).unwrap();

        for _ in 0..5 {
            writer.write(&[0.0; 25]).unwrap();
        }
        assert_eq!(
            writer.state(),
            RotationState {
                current_file_index: 2,
                frames_written_in_current_file: 25,
                frame_capacity_per_file: 50,
            }
        );
        let sizes: Vec<u64> = writer.finish().unwrap().iter().map(|p| frames_in(p)).collect();
        assert_eq!(sizes, vec![50, 50, 25]);
    }

    #[test]
    fn wider_groups_rotate_sooner() {
        let dir = tempfile::tempdir().unwrap();
        let mut mono =
            RotatingGroupWriter::create(dir.path().join("ch1"), 8_000, 1, SampleFormat::Pcm16, 100).unwrap();
        let mut stereo =
            RotatingGroupWriter::create(dir.path().join("ch2-3"), 8_000, 2, SampleFormat::Pcm16, 100).unwrap();

        for _ in 0..4 {
            mono.write(&[0.0; 20]).unwrap();
            stereo.write(&[0.0; 40]).unwrap();
        }
        assert_eq!(mono.finish().unwrap().len(), 2);
        assert_eq!(stereo.finish().unwrap().len(), 4);
    }

    #[test]
    fn oversized_block_goes_into_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            RotatingGroupWriter::create(dir.path().join("ch1"), 8_000, 1, SampleFormat::Pcm16, 100).unwrap();

        writer.write(&[0.0; 80]).unwrap();
        writer.write(&[0.0; 80]).unwrap();
        let sizes: Vec<u64> = writer.finish().unwrap().iter().map(|p| frames_in(p)).collect();
        assert_eq!(sizes, vec![80, 80]);
    }

    #[test]
    fn group_without_data_leaves_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            RotatingGroupWriter::create(dir.path().join("ch4"), 8_000, 1, SampleFormat::Float, MAX_FILE_BYTES)
                .unwrap();
        let paths = writer.finish().unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(frames_in(&paths[0]), 0);
    }
}
