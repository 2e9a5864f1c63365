use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::catalog::InputCatalog;
use crate::format::SampleFormat;
use crate::groups::ChannelGroup;
use crate::stream::ContinuousStreamReader;
use crate::writer::{rotated_path, RotatingGroupWriter, MAX_FILE_BYTES};
use crate::ExtractError;

/// Frames read from the input stream per iteration.
pub const BLOCK_FRAMES: usize = 10_000;

/// Everything the engine needs to know about one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    pub start_frame: u64,
    /// Exclusive.
    pub end_frame: u64,
    pub sample_format: SampleFormat,
    /// Exported groups, in channel order.
    pub groups: Vec<ChannelGroup>,
    pub output_dir: PathBuf,
    pub max_file_bytes: u64,
}

impl ExtractionJob {
    pub fn new(
        start_frame: u64,
        end_frame: u64,
        sample_format: SampleFormat,
        groups: Vec<ChannelGroup>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            start_frame,
            end_frame,
            sample_format,
            groups,
            output_dir: output_dir.into(),
            max_file_bytes: MAX_FILE_BYTES,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.end_frame.saturating_sub(self.start_frame)
    }

    /// The first file of every group, in the order they are created.
    pub fn first_output_paths(&self) -> Vec<PathBuf> {
        self.groups
            .iter()
            .map(|group| rotated_path(&self.output_dir.join(group.base_name()), 0))
            .collect()
    }

    /// Check the range and the groups against the recording.
    pub fn validate(&self, catalog: &InputCatalog) -> Result<(), ExtractError> {
        let total = catalog.total_frames();
        if self.start_frame > self.end_frame || self.end_frame > total {
            return Err(ExtractError::InvalidRange {
                start: self.start_frame,
                end: self.end_frame,
                total,
            });
        }

        let channels = usize::from(catalog.channel_count());
        for group in &self.groups {
            if group.first_channel > group.last_channel || group.last_channel >= channels {
                return Err(ExtractError::GroupOutOfRange {
                    first: group.first_channel,
                    last: group.last_channel,
                    channels,
                });
            }
            if group.label.contains(['/', '\\']) {
                return Err(ExtractError::InvalidLabel {
                    first: group.first_channel,
                    label: group.label.clone(),
                });
            }
        }
        Ok(())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped at a block boundary on request. Files written so far are kept.
    Cancelled,
}

/// Notifications emitted while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Start { total_frames: u64, sample_rate: u32 },
    Advance { processed_frames: u64, fraction: f64 },
    Finish { outcome: RunOutcome },
}

/// Receives progress and answers the cancellation check made after every
/// block.
pub trait ProgressReporter {
    fn report(&mut self, _event: ProgressEvent) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared flag used to stop a running job from another thread or a signal
/// handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// [`ProgressReporter`] that forwards events to a closure.
pub struct CallbackReporter<F> {
    callback: F,
    cancel: Option<CancelToken>,
}

impl<F> CallbackReporter<F>
where
    F: FnMut(ProgressEvent),
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl<F> ProgressReporter for CallbackReporter<F>
where
    F: FnMut(ProgressEvent),
{
    fn report(&mut self, event: ProgressEvent) {
        (self.callback)(event);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetrics {
    pub outcome: RunOutcome,
    pub frames_processed: u64,
    pub blocks_processed: u64,
    pub peak_block_frames: usize,
    /// Every file created, grouped by channel group and in rotation order.
    pub files_written: Vec<PathBuf>,
}

/// Fraction of the job done, in `[0, 1]`. An empty range counts as done.
pub fn progress_fraction(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (processed as f64 / total as f64).min(1.0)
}

struct GroupOutput<'g> {
    group: &'g ChannelGroup,
    writer: RotatingGroupWriter,
    scratch: Vec<f64>,
}

/// Drives one extraction: seek, read a block, hand every group its columns,
/// report progress, repeat.
pub struct ExtractionEngine<'a> {
    catalog: &'a InputCatalog,
    job: ExtractionJob,
    block_frames: NonZeroUsize,
}

impl<'a> ExtractionEngine<'a> {
    pub fn new(catalog: &'a InputCatalog, job: ExtractionJob) -> Self {
        Self {
            catalog,
            job,
            block_frames: NonZeroUsize::new(BLOCK_FRAMES).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Override the number of frames read per block.
    pub fn with_block_frames(mut self, block_frames: NonZeroUsize) -> Self {
        self.block_frames = block_frames;
        self
    }

    /// Run the job to completion, cancellation, or the first error.
    ///
    /// Validation happens before any file is created. On error, files already
    /// written stay on disk; every open file is closed on the way out.
    pub fn run<R>(&self, reporter: &mut R) -> Result<RunMetrics, ExtractError>
    where
        R: ProgressReporter + ?Sized,
    {
        let job = &self.job;
        job.validate(self.catalog)?;

        fs::create_dir_all(&job.output_dir)
            .map_err(|source| ExtractError::io(&job.output_dir, source))?;

        let mut reader = ContinuousStreamReader::new(self.catalog);
        reader.seek(job.start_frame)?;

        let sample_rate = self.catalog.sample_rate();
        let mut outputs = job
            .groups
            .iter()
            .map(|group| {
                let writer = RotatingGroupWriter::create(
                    job.output_dir.join(group.base_name()),
                    sample_rate,
                    group.channel_count() as u16,
                    job.sample_format,
                    job.max_file_bytes,
                )?;
                Ok(GroupOutput {
                    group,
                    writer,
                    scratch: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>, ExtractError>>()?;

        let total = job.frame_count();
        info!(
            "extracting frames {}..{} as {} into {} group(s)",
            job.start_frame,
            job.end_frame,
            job.sample_format,
            outputs.len()
        );
        reporter.report(ProgressEvent::Start {
            total_frames: total,
            sample_rate,
        });

        let mut outcome = RunOutcome::Completed;
        let mut frames_processed = 0u64;
        let mut blocks_processed = 0u64;
        let mut peak_block_frames = 0usize;

        while reader.position() < job.end_frame {
            let remaining = job.end_frame - reader.position();
            let wanted = remaining.min(self.block_frames.get() as u64) as usize;
            let Some(block) = reader.read_block(wanted)? else {
                warn!(
                    "input ended at frame {} before the requested end {}",
                    reader.position(),
                    job.end_frame
                );
                break;
            };

            for output in &mut outputs {
                block.copy_channels(
                    output.group.first_channel,
                    output.group.last_channel,
                    &mut output.scratch,
                );
                output.writer.write(&output.scratch)?;
            }

            frames_processed += block.frames() as u64;
            blocks_processed += 1;
            peak_block_frames = peak_block_frames.max(block.frames());
            reporter.report(ProgressEvent::Advance {
                processed_frames: frames_processed,
                fraction: progress_fraction(frames_processed, total),
            });

            if reporter.is_cancelled() {
                info!("cancelled after {frames_processed} of {total} frames");
                outcome = RunOutcome::Cancelled;
                break;
            }
        }

        let mut files_written = Vec::new();
        for output in outputs {
            files_written.extend(output.writer.finish()?);
        }

        reporter.report(ProgressEvent::Finish { outcome });
        Ok(RunMetrics {
            outcome,
            frames_processed,
            blocks_processed,
            peak_block_frames,
            files_written,
        })
    }
}
