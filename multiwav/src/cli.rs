use std::path::PathBuf;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, ArgMatches, Command};
use multiwav_core::catalog::MAX_CHANNELS;
use multiwav_core::{parse_timecode, ChannelSettings, SampleFormat};

pub const DEFAULT_START: &str = "0";

/// Parse a 1-based channel number into a 0-based index.
pub fn parse_channel(value: &str) -> Result<usize, String> {
    let channel = value
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid channel '{value}'"))?;
    if channel == 0 || channel > usize::from(MAX_CHANNELS) {
        return Err(format!("channel {channel} is outside 1..={MAX_CHANNELS}"));
    }
    Ok(channel - 1)
}

/// Parse a `CH=LABEL` pair, where `CH` is 1-based.
pub fn parse_channel_name(value: &str) -> Result<(usize, String), String> {
    let (channel, label) = value
        .split_once('=')
        .ok_or_else(|| format!("expected CH=LABEL, got '{value}'"))?;
    let label = label.trim();
    if label.is_empty() {
        return Err(format!("empty label for channel {}", channel.trim()));
    }
    if label.contains(['/', '\\']) {
        return Err(format!("label '{label}' must not contain path separators"));
    }
    Ok((parse_channel(channel)?, label.to_owned()))
}

fn parse_time(value: &str) -> Result<String, String> {
    parse_timecode(value)
        .map(|_| value.to_owned())
        .map_err(|err| format!("invalid time '{value}': {err}"))
}

fn parse_format(value: &str) -> Result<SampleFormat, String> {
    value.parse::<SampleFormat>().map_err(|err| err.to_string())
}

/// Collect `--skip`, `--link` and `--name` into per-channel settings.
pub fn channel_settings(matches: &ArgMatches) -> ChannelSettings {
    let mut settings = ChannelSettings::new();
    for &channel in matches.get_many::<usize>("skip").into_iter().flatten() {
        settings.set_export(channel, false);
    }
    for &channel in matches.get_many::<usize>("link").into_iter().flatten() {
        settings.set_link(channel, true);
    }
    for (channel, label) in matches
        .get_many::<(usize, String)>("name")
        .into_iter()
        .flatten()
    {
        settings.set_name(*channel, label.clone());
    }
    settings
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Extract and regroup channels from multi-file multichannel WAV recordings")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Directory where the channel files will be written")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("start")
                .short('s')
                .long("start")
                .value_name("TIME")
                .help("Start of the range as [[hh:]mm:]ss[.frames]")
                .default_value(DEFAULT_START)
                .value_parser(ValueParser::new(parse_time)),
        )
        .arg(
            Arg::new("end")
                .short('e')
                .long("end")
                .value_name("TIME")
                .help("End of the range, exclusive [default: end of recording]")
                .value_parser(ValueParser::new(parse_time)),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Sample format of the written files (PCM_16, PCM_24, PCM_32, FLOAT, DOUBLE)")
                .default_value(SampleFormat::default().name())
                .value_parser(ValueParser::new(parse_format)),
        )
        .arg(
            Arg::new("skip")
                .long("skip")
                .value_name("CHANNELS")
                .help("Comma-separated channels that are not exported")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .value_parser(ValueParser::new(parse_channel)),
        )
        .arg(
            Arg::new("link")
                .long("link")
                .value_name("CHANNELS")
                .help("Comma-separated channels merged into the group of the preceding channel")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .value_parser(ValueParser::new(parse_channel)),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .value_name("CH=LABEL")
                .help("Label appended to the file names of the group starting at CH")
                .action(ArgAction::Append)
                .value_parser(ValueParser::new(parse_channel_name)),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Allow overwriting existing files in the output directory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Preview the files that would be created without writing them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .help("Print the recording layout and session markers, then exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("input_dir")
                .value_name("INPUT_DIR")
                .help("Directory holding the recording's WAV files")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_for(args: &[&str]) -> ChannelSettings {
        let matches = build_cli()
            .try_get_matches_from(["multiwav"].iter().chain(args).chain(&["rec"]))
            .unwrap();
        channel_settings(&matches)
    }

    #[test]
    fn parse_channel_is_one_based() {
        assert_eq!(parse_channel("1").unwrap(), 0);
        assert_eq!(parse_channel(" 64 ").unwrap(), 63);
        assert!(parse_channel("0").is_err());
        assert!(parse_channel("65").is_err());
        assert!(parse_channel("two").is_err());
    }

    #[test]
    fn parse_channel_name_splits_on_equals() {
        assert_eq!(
            parse_channel_name("3=Snare Top").unwrap(),
            (2, "Snare Top".to_owned())
        );
        assert!(parse_channel_name("3").is_err());
        assert!(parse_channel_name("3=").is_err());
        assert!(parse_channel_name("3=a/b").is_err());
        assert!(parse_channel_name("x=Kick").is_err());
    }

    #[test]
    fn parse_format_lists_the_choices() {
        assert_eq!(parse_format("double").unwrap(), SampleFormat::Double);
        let err = parse_format("mp3").unwrap_err();
        assert!(err.contains("PCM_24"), "{err}");
    }

    #[test]
    fn defaults_apply() {
        let matches = build_cli().try_get_matches_from(["multiwav", "rec"]).unwrap();
        assert_eq!(matches.get_one::<String>("start").unwrap(), DEFAULT_START);
        assert!(matches.get_one::<String>("end").is_none());
        assert_eq!(
            *matches.get_one::<SampleFormat>("format").unwrap(),
            SampleFormat::Pcm24
        );
        assert_eq!(
            matches.get_one::<PathBuf>("output").unwrap(),
            &PathBuf::from(".")
        );
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(build_cli()
            .try_get_matches_from(["multiwav", "--start", "1:2:3:4", "rec"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["multiwav", "-e", "1.2.3", "rec"])
            .is_err());
    }

    #[test]
    fn channel_options_become_settings() {
        let settings = settings_for(&[
            "--skip", "4,5", "--link", "2", "--link", "7", "--name", "1=Kick", "--name", "2=OH",
        ]);

        assert!(!settings.export(3));
        assert!(!settings.export(4));
        assert!(settings.export(0));
        assert!(settings.link(1));
        assert!(settings.link(6));
        assert!(!settings.link(2));
        assert_eq!(settings.name(0), "Kick");
        assert_eq!(settings.name(1), "OH");
    }
}
