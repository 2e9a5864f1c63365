//! Decoder for the `SE_LOG.BIN` file the recorder writes next to its takes.
//!
//! The log has a fixed layout:
//!
//! | bytes        | content                                          |
//! |--------------|--------------------------------------------------|
//! | `0..4`       | packed creation timestamp, little endian         |
//! | `1052..1552` | marker frame offsets, `u32` LE, zero terminated  |
//! | `1552..1572` | session name, NUL terminated                     |

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use log::warn;

use crate::timecode::format_timecode;
use crate::ExtractError;

/// File name of the session log inside a recording directory.
pub const SESSION_LOG_FILE: &str = "SE_LOG.BIN";

const TIMESTAMP_RANGE: std::ops::Range<usize> = 0..4;
const MARKER_RANGE: std::ops::Range<usize> = 1052..1552;
const NAME_RANGE: std::ops::Range<usize> = 1552..1572;

/// Smallest blob that holds every field.
pub const SESSION_LOG_LEN: usize = NAME_RANGE.end;

/// Creation time as stored by the recorder. Fields are kept as decoded, so a
/// zeroed log yields month and day 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl SessionTimestamp {
    /// Unpack the FAT-style timestamp word.
    pub fn from_packed(raw: u32) -> Self {
        Self {
            year: (raw >> 25) as u16 + 1980,
            month: ((raw & 0x1FF_FFFF) >> 21) as u8,
            day: ((raw & 0x1F_FFFF) >> 16) as u8,
            hour: ((raw & 0xFFFF) >> 11) as u8,
            minute: ((raw & 0x7FF) >> 5) as u8,
            second: ((raw & 0x1F) * 2) as u8,
        }
    }

    /// The timestamp as a calendar value, if it names a real date and time.
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?
            .and_hms_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
            )
    }
}

impl fmt::Display for SessionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Information decoded from a session log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub session_name: Option<String>,
    pub created_at: Option<SessionTimestamp>,
    /// Marker positions in frames, in the order the recorder stored them.
    pub markers: Vec<u32>,
}

impl SessionMetadata {
    /// Read `SE_LOG.BIN` from a recording directory.
    ///
    /// A missing log gives empty metadata. A log too short to decode is
    /// reported as a warning and also gives empty metadata.
    pub fn load(dir: &Path) -> Result<Self, ExtractError> {
        let path = dir.join(SESSION_LOG_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ExtractError::io(&path, source)),
        };

        match parse_session_log(&bytes) {
            Ok(metadata) => Ok(metadata),
            Err(err @ ExtractError::TruncatedLog { .. }) => {
                warn!("ignoring {}: {err}", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Marker positions rendered as `h:mm:ss.f` time specifications.
    pub fn marker_timecodes(&self, sample_rate: u32) -> Vec<String> {
        self.markers
            .iter()
            .map(|&marker| format_timecode(u64::from(marker), sample_rate))
            .collect()
    }
}

/// Decode a session log blob.
pub fn parse_session_log(bytes: &[u8]) -> Result<SessionMetadata, ExtractError> {
    if bytes.len() < SESSION_LOG_LEN {
        return Err(ExtractError::TruncatedLog {
            len: bytes.len(),
            required: SESSION_LOG_LEN,
        });
    }

    let raw = read_u32_le(&bytes[TIMESTAMP_RANGE]);

    let markers = bytes[MARKER_RANGE]
        .chunks_exact(4)
        .map(read_u32_le)
        .take_while(|&marker| marker != 0)
        .collect();

    let name_field = &bytes[NAME_RANGE];
    let name_len = name_field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_field.len());
    let session_name = (name_len > 0)
        .then(|| String::from_utf8_lossy(&name_field[..name_len]).into_owned());

    Ok(SessionMetadata {
        session_name,
        created_at: Some(SessionTimestamp::from_packed(raw)),
        markers,
    })
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
