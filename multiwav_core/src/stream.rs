use log::debug;

use crate::catalog::InputCatalog;
use crate::wav::SampleSource;
use crate::ExtractError;

/// A run of interleaved frames read from a single input file.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    samples: Vec<f64>,
    channels: usize,
    start_frame: u64,
}

impl Block {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Global frame index of the first frame in the block.
    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Copy the columns `first..=last` of every frame into `out`, interleaved.
    pub fn copy_channels(&self, first: usize, last: usize, out: &mut Vec<f64>) {
        out.clear();
        if first == 0 && last + 1 == self.channels {
            out.extend_from_slice(&self.samples);
            return;
        }
        out.reserve(self.frames() * (last - first + 1));
        for frame in self.samples.chunks_exact(self.channels) {
            out.extend_from_slice(&frame[first..=last]);
        }
    }
}

/// Presents the files of an [`InputCatalog`] as one seekable stream.
///
/// The reader is a small state machine: the index of the current file, the
/// offset inside it, and at most one open file handle. A read never spans
/// two files; the call after a short read continues in the next file.
pub struct ContinuousStreamReader<'a> {
    catalog: &'a InputCatalog,
    file_index: usize,
    file_start: u64,
    offset: u64,
    source: Option<SampleSource>,
}

impl<'a> ContinuousStreamReader<'a> {
    pub fn new(catalog: &'a InputCatalog) -> Self {
        Self {
            catalog,
            file_index: 0,
            file_start: 0,
            offset: 0,
            source: None,
        }
    }

    /// Global frame index of the next frame to be read.
    pub fn position(&self) -> u64 {
        self.file_start + self.offset
    }

    /// Index of the file the next read comes from.
    pub fn file_index(&self) -> usize {
        self.file_index
    }

    /// Whether an input file is currently open.
    pub fn has_open_file(&self) -> bool {
        self.source.is_some()
    }

    /// Move to `frame`. Files before the target are skipped using their frame
    /// counts only; nothing is read from them.
    pub fn seek(&mut self, frame: u64) -> Result<(), ExtractError> {
        let location = self
            .catalog
            .locate(frame)
            .ok_or(ExtractError::SeekOutOfRange {
                requested: frame,
                total: self.catalog.total_frames(),
            })?;

        if location.file_index != self.file_index {
            self.source = None;
        }
        self.file_index = location.file_index;
        self.file_start = location.file_start;
        self.offset = location.offset;

        if let Some(source) = &mut self.source {
            source.seek(self.offset)?;
        }
        debug!(
            "seek to frame {frame}: file {} offset {}",
            self.file_index, self.offset
        );
        Ok(())
    }

    /// Read up to `max_frames` frames from the current file. Returns `None`
    /// once the stream is exhausted.
    pub fn read_block(&mut self, max_frames: usize) -> Result<Option<Block>, ExtractError> {
        let catalog = self.catalog;
        let channels = usize::from(catalog.channel_count());

        loop {
            let Some(file) = catalog.files().get(self.file_index) else {
                self.source = None;
                return Ok(None);
            };

            if self.offset >= file.frames {
                self.advance_file();
                continue;
            }

            let start_frame = self.position();
            let wanted = (file.frames - self.offset).min(max_frames as u64) as usize;
            let mut samples = Vec::with_capacity(wanted * channels);
            if wanted > 0 {
                let read = self.open_current()?.read_block(wanted, &mut samples)?;
                if read == 0 {
                    return Err(ExtractError::io(
                        &file.path,
                        std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!("file ended at frame {} of {}", self.offset, file.frames),
                        ),
                    ));
                }
                self.offset += read as u64;
            }

            return Ok(Some(Block {
                samples,
                channels,
                start_frame,
            }));
        }
    }

    fn advance_file(&mut self) {
        if let Some(file) = self.catalog.files().get(self.file_index) {
            self.file_start += file.frames;
        }
        self.source = None;
        self.file_index += 1;
        self.offset = 0;
    }

    fn open_current(&mut self) -> Result<&mut SampleSource, ExtractError> {
        let source = match self.source.take() {
            Some(source) => source,
            None => {
                let file = &self.catalog.files()[self.file_index];
                let mut source = SampleSource::open(&file.path)?;
                if self.offset > 0 {
                    source.seek(self.offset)?;
                }
                debug!("opened input {}", file.path.display());
                source
            }
        };
        Ok(self.source.insert(source))
    }
}
