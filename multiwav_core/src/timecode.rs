use std::fmt;

/// A position written as `[[hh:]mm:]ss[.frames]`.
///
/// The trailing part after the dot is a frame count, not a decimal fraction:
/// `"0:01.500"` at 48 kHz means one second plus 500 frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timecode {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub frames: u64,
}

impl Timecode {
    pub fn new(hours: u64, minutes: u64, seconds: u64, frames: u64) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            frames,
        }
    }

    /// Global frame index for a recording running at `sample_rate`, or `None`
    /// when the position does not fit in a `u64` frame count.
    pub fn to_frame(self, sample_rate: u32) -> Option<u64> {
        self.hours
            .checked_mul(60)?
            .checked_add(self.minutes)?
            .checked_mul(60)?
            .checked_add(self.seconds)?
            .checked_mul(u64::from(sample_rate))?
            .checked_add(self.frames)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:02}:{:02}.{}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

impl std::str::FromStr for Timecode {
    type Err = TimecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_timecode(value)
    }
}

/// Parse a `[[hh:]mm:]ss[.frames]` time specification.
pub fn parse_timecode(value: &str) -> Result<Timecode, TimecodeError> {
    if value.is_empty() {
        return Err(TimecodeError::Empty);
    }

    let (clock, frames) = match value.split_once('.') {
        None => (value, None),
        Some((_, rest)) if rest.contains('.') => return Err(TimecodeError::TooManyDots),
        Some((clock, frames)) => (clock, Some(frames)),
    };

    let fields: Vec<&str> = clock.split(':').collect();
    if fields.len() > 3 {
        return Err(TimecodeError::TooManyFields {
            count: fields.len(),
        });
    }

    let mut timecode = Timecode {
        frames: frames.map(|f| parse_field(f, Field::Frames)).transpose()?.unwrap_or(0),
        ..Timecode::default()
    };

    let mut fields = fields.into_iter().rev();
    if let Some(seconds) = fields.next() {
        timecode.seconds = parse_field(seconds, Field::Seconds)?;
    }
    if let Some(minutes) = fields.next() {
        timecode.minutes = parse_field(minutes, Field::Minutes)?;
    }
    if let Some(hours) = fields.next() {
        timecode.hours = parse_field(hours, Field::Hours)?;
    }

    Ok(timecode)
}

/// Render a frame index as `h:mm:ss.f`, the inverse of [`parse_timecode`]
/// for normalised values.
pub fn format_timecode(frame: u64, sample_rate: u32) -> String {
    let rate = u64::from(sample_rate.max(1));
    let seconds = frame / rate;
    Timecode::new(seconds / 3600, (seconds / 60) % 60, seconds % 60, frame % rate).to_string()
}

fn parse_field(text: &str, field: Field) -> Result<u64, TimecodeError> {
    let value: i64 = text.parse().map_err(|_| TimecodeError::InvalidNumber {
        field,
        text: text.to_owned(),
    })?;
    u64::try_from(value).map_err(|_| TimecodeError::Negative { field })
}

/// Component of a time specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Hours,
    Minutes,
    Seconds,
    Frames,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Hours => "hours",
            Field::Minutes => "minutes",
            Field::Seconds => "seconds",
            Field::Frames => "frames",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimecodeError {
    Empty,
    TooManyDots,
    TooManyFields { count: usize },
    InvalidNumber { field: Field, text: String },
    Negative { field: Field },
}

impl std::error::Error for TimecodeError {}

impl fmt::Display for TimecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimecodeError::Empty => write!(f, "time cannot be empty"),
            TimecodeError::TooManyDots => {
                write!(f, "expected at most one '.' before the frame count")
            }
            TimecodeError::TooManyFields { count } => write!(
                f,
                "expected at most three ':'-separated fields but found {count}"
            ),
            TimecodeError::InvalidNumber { field, text } => {
                write!(f, "{} '{}' is not a whole number", field.name(), text)
            }
            TimecodeError::Negative { field } => {
                write!(f, "{} cannot be negative", field.name())
            }
        }
    }
}
