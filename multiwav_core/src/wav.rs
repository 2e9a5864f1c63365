//! Single-file WAV access: open, seek, read a block, write a block, close.
//!
//! Integer PCM and 32-bit float files go through `hound`. `hound` rejects
//! 64-bit IEEE float, so those files are handled by a small RIFF reader and
//! writer that share the chunk walker below.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use hound::{WavReader, WavSpec, WavWriter};

use crate::format::{int_to_sample, sample_to_int, SampleFormat};
use crate::ExtractError;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size of the canonical header emitted by [`Float64Writer`].
const FLOAT64_HEADER_LEN: u64 = 44;

/// Length of an extensible `fmt ` body, the longest layout that is parsed.
const FMT_PARSED_LEN: u64 = 40;

/// How samples are stored in an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Int { bits: u16 },
    Float32,
    Float64,
}

/// Header facts of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u64,
    pub encoding: SourceEncoding,
}

/// Read handle on one WAV file. Dropping it closes the file.
pub struct SampleSource {
    path: PathBuf,
    spec: SourceSpec,
    reader: SourceReader,
}

enum SourceReader {
    Hound(WavReader<BufReader<File>>),
    Float64(Float64Reader),
}

impl SampleSource {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let file = File::open(path).map_err(|source| ExtractError::io(path, source))?;
        let mut reader = BufReader::new(file);
        let layout =
            read_riff_layout(&mut reader).map_err(|source| ExtractError::io(path, source))?;

        if layout.format.is_float() && layout.format.bits_per_sample == 64 {
            let channels = layout.format.channels;
            let block_align = u64::from(channels) * 8;
            let spec = SourceSpec {
                sample_rate: layout.format.sample_rate,
                channels,
                frames: layout.data_len / block_align,
                encoding: SourceEncoding::Float64,
            };
            let float_reader = Float64Reader {
                reader,
                channels: usize::from(channels),
                data_offset: layout.data_offset,
                frames: spec.frames,
                position: 0,
                scratch: Vec::new(),
            };
            return Ok(Self {
                path: path.to_path_buf(),
                spec,
                reader: SourceReader::Float64(float_reader),
            });
        }

        reader
            .seek(SeekFrom::Start(0))
            .map_err(|source| ExtractError::io(path, source))?;
        let wav = WavReader::new(reader).map_err(|source| ExtractError::wav(path, source))?;
        let header = wav.spec();
        let encoding = match (header.sample_format, header.bits_per_sample) {
            (hound::SampleFormat::Int, bits) => SourceEncoding::Int { bits },
            (hound::SampleFormat::Float, 32) => SourceEncoding::Float32,
            (hound::SampleFormat::Float, bits) => {
                return Err(ExtractError::UnsupportedEncoding {
                    path: path.to_path_buf(),
                    detail: format!("{bits}-bit float"),
                })
            }
        };
        let spec = SourceSpec {
            sample_rate: header.sample_rate,
            channels: header.channels,
            frames: u64::from(wav.duration()),
            encoding,
        };

        Ok(Self {
            path: path.to_path_buf(),
            spec,
            reader: SourceReader::Hound(wav),
        })
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    /// Position the next read at `frame` within this file.
    pub fn seek(&mut self, frame: u64) -> Result<(), ExtractError> {
        if frame > self.spec.frames {
            return Err(ExtractError::SeekOutOfRange {
                requested: frame,
                total: self.spec.frames,
            });
        }
        let result = match &mut self.reader {
            SourceReader::Hound(wav) => wav.seek(frame as u32),
            SourceReader::Float64(reader) => reader.seek(frame),
        };
        result.map_err(|source| ExtractError::io(&self.path, source))
    }

    /// Append up to `max_frames` interleaved frames to `out`, returning the
    /// number of frames read. Zero means the file is exhausted.
    pub fn read_block(&mut self, max_frames: usize, out: &mut Vec<f64>) -> Result<usize, ExtractError> {
        let channels = usize::from(self.spec.channels);
        let wanted = max_frames * channels;
        let before = out.len();
        out.reserve(wanted);

        match (&mut self.reader, self.spec.encoding) {
            (SourceReader::Hound(wav), SourceEncoding::Int { bits }) => {
                for sample in wav.samples::<i32>().take(wanted) {
                    let value = sample.map_err(|source| ExtractError::wav(&self.path, source))?;
                    out.push(int_to_sample(value, bits));
                }
            }
            (SourceReader::Hound(wav), _) => {
                for sample in wav.samples::<f32>().take(wanted) {
                    let value = sample.map_err(|source| ExtractError::wav(&self.path, source))?;
                    out.push(f64::from(value));
                }
            }
            (SourceReader::Float64(reader), _) => {
                reader
                    .read_frames(max_frames, out)
                    .map_err(|source| ExtractError::io(&self.path, source))?;
            }
        }

        let read = out.len() - before;
        if read % channels != 0 {
            return Err(ExtractError::io(
                &self.path,
                io::Error::new(io::ErrorKind::UnexpectedEof, "file ends mid-frame"),
            ));
        }
        Ok(read / channels)
    }
}

struct Float64Reader {
    reader: BufReader<File>,
    channels: usize,
    data_offset: u64,
    frames: u64,
    position: u64,
    scratch: Vec<u8>,
}

impl Float64Reader {
    fn seek(&mut self, frame: u64) -> io::Result<()> {
        let offset = self.data_offset + frame * self.channels as u64 * 8;
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = frame;
        Ok(())
    }

    fn read_frames(&mut self, max_frames: usize, out: &mut Vec<f64>) -> io::Result<()> {
        let remaining = self.frames - self.position;
        let frames = remaining.min(max_frames as u64) as usize;
        if frames == 0 {
            return Ok(());
        }
        self.scratch.resize(frames * self.channels * 8, 0);
        self.reader.read_exact(&mut self.scratch)?;
        out.extend(self.scratch.chunks_exact(8).map(|bytes| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            f64::from_le_bytes(raw)
        }));
        self.position += frames as u64;
        Ok(())
    }
}

/// Write handle on one output WAV file.
///
/// Dropping a sink without calling [`SampleSink::finalize`] still patches the
/// header, so the file stays readable after an error or a cancelled run.
pub struct SampleSink {
    path: PathBuf,
    format: SampleFormat,
    writer: SinkWriter,
}

enum SinkWriter {
    Hound(WavWriter<BufWriter<File>>),
    Float64(Float64Writer),
}

impl SampleSink {
    pub fn create(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        format: SampleFormat,
    ) -> Result<Self, ExtractError> {
        let file = File::create(path).map_err(|source| ExtractError::io(path, source))?;
        let writer = match format {
            SampleFormat::Double => SinkWriter::Float64(
                Float64Writer::new(BufWriter::new(file), sample_rate, channels)
                    .map_err(|source| ExtractError::io(path, source))?,
            ),
            _ => {
                let spec = WavSpec {
                    channels,
                    sample_rate,
                    bits_per_sample: format.bits_per_sample(),
                    sample_format: if format.is_float() {
                        hound::SampleFormat::Float
                    } else {
                        hound::SampleFormat::Int
                    },
                };
                SinkWriter::Hound(
                    WavWriter::new(BufWriter::new(file), spec)
                        .map_err(|source| ExtractError::wav(path, source))?,
                )
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            format,
            writer,
        })
    }

    /// Append interleaved samples.
    pub fn write_block(&mut self, samples: &[f64]) -> Result<(), ExtractError> {
        match &mut self.writer {
            SinkWriter::Hound(wav) => {
                let bits = self.format.bits_per_sample();
                let result = if self.format.is_float() {
                    samples
                        .iter()
                        .try_for_each(|&sample| wav.write_sample(sample as f32))
                } else {
                    samples
                        .iter()
                        .try_for_each(|&sample| wav.write_sample(sample_to_int(sample, bits)))
                };
                result.map_err(|source| ExtractError::wav(&self.path, source))
            }
            SinkWriter::Float64(writer) => writer
                .write_samples(samples)
                .map_err(|source| ExtractError::io(&self.path, source)),
        }
    }

    /// Patch the header and flush everything to disk.
    pub fn finalize(self) -> Result<(), ExtractError> {
        let path = self.path;
        match self.writer {
            SinkWriter::Hound(wav) => wav
                .finalize()
                .map_err(|source| ExtractError::wav(&path, source)),
            SinkWriter::Float64(mut writer) => writer
                .finalize()
                .map_err(|source| ExtractError::io(&path, source)),
        }
    }
}

struct Float64Writer {
    writer: BufWriter<File>,
    data_bytes: u64,
    finalized: bool,
}

impl Float64Writer {
    fn new(mut writer: BufWriter<File>, sample_rate: u32, channels: u16) -> io::Result<Self> {
        let block_align = channels * 8;
        let byte_rate = sample_rate * u32::from(block_align);

        writer.write_all(b"RIFF")?;
        writer.write_all(&((FLOAT64_HEADER_LEN - 8) as u32).to_le_bytes())?;
        writer.write_all(b"WAVE")?;
        writer.write_all(b"fmt ")?;
        writer.write_all(&16u32.to_le_bytes())?;
        writer.write_all(&WAVE_FORMAT_IEEE_FLOAT.to_le_bytes())?;
        writer.write_all(&channels.to_le_bytes())?;
        writer.write_all(&sample_rate.to_le_bytes())?;
        writer.write_all(&byte_rate.to_le_bytes())?;
        writer.write_all(&block_align.to_le_bytes())?;
        writer.write_all(&64u16.to_le_bytes())?;
        writer.write_all(b"data")?;
        writer.write_all(&0u32.to_le_bytes())?;

        Ok(Self {
            writer,
            data_bytes: 0,
            finalized: false,
        })
    }

    fn write_samples(&mut self, samples: &[f64]) -> io::Result<()> {
        let bytes = samples.len() as u64 * 8;
        if FLOAT64_HEADER_LEN - 8 + self.data_bytes + bytes > u64::from(u32::MAX) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "WAV data chunk would exceed 4 GiB",
            ));
        }
        for sample in samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.data_bytes += bytes;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        let riff_len = (FLOAT64_HEADER_LEN - 8 + self.data_bytes) as u32;
        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_all(&riff_len.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(FLOAT64_HEADER_LEN - 4))?;
        self.writer.write_all(&(self.data_bytes as u32).to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()
    }
}

impl Drop for Float64Writer {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn is_float(&self) -> bool {
        self.format_tag == WAVE_FORMAT_IEEE_FLOAT
    }
}

#[derive(Debug, Clone, Copy)]
struct RiffLayout {
    format: FmtChunk,
    data_offset: u64,
    data_len: u64,
}

/// Walk the RIFF chunks up to the start of the `data` payload.
fn read_riff_layout<R: Read + Seek>(reader: &mut R) -> io::Result<RiffLayout> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag)?;
    if &tag != b"RIFF" {
        return Err(invalid_data("missing RIFF header"));
    }
    read_u32(reader)?;
    reader.read_exact(&mut tag)?;
    if &tag != b"WAVE" {
        return Err(invalid_data("missing WAVE form type"));
    }

    let mut format = None;
    loop {
        reader.read_exact(&mut tag)?;
        let len = u64::from(read_u32(reader)?);
        match &tag {
            b"fmt " => {
                // Only the leading fields are parsed; any extension beyond the
                // extensible layout is skipped rather than buffered.
                let kept = len.min(FMT_PARSED_LEN);
                let mut body = [0u8; FMT_PARSED_LEN as usize];
                reader.read_exact(&mut body[..kept as usize])?;
                format = Some(parse_fmt(&body[..kept as usize])?);
                let skipped = len - kept + len % 2;
                if skipped > 0 {
                    reader.seek(SeekFrom::Current(skipped as i64))?;
                }
            }
            b"data" => {
                let format = format.ok_or_else(|| invalid_data("data chunk precedes fmt chunk"))?;
                let data_offset = reader.stream_position()?;
                return Ok(RiffLayout {
                    format,
                    data_offset,
                    data_len: len,
                });
            }
            _ => {
                reader.seek(SeekFrom::Current((len + len % 2) as i64))?;
            }
        }
    }
}

fn parse_fmt(body: &[u8]) -> io::Result<FmtChunk> {
    if body.len() < 16 {
        return Err(invalid_data("fmt chunk is too short"));
    }
    let u16_at = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
    let mut format_tag = u16_at(0);
    if format_tag == WAVE_FORMAT_EXTENSIBLE {
        // The sub-format GUID starts with the plain format tag.
        if body.len() < 26 {
            return Err(invalid_data("extensible fmt chunk is too short"));
        }
        format_tag = u16_at(24);
    }
    if format_tag != WAVE_FORMAT_PCM && format_tag != WAVE_FORMAT_IEEE_FLOAT {
        return Err(invalid_data("unsupported WAV format tag"));
    }

    Ok(FmtChunk {
        format_tag,
        channels: u16_at(2),
        sample_rate: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
        bits_per_sample: u16_at(14),
    })
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn invalid_data(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
