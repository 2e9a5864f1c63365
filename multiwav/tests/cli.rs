use assert_cmd::Command;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Write a recording of `channels` sine channels split across files of the
/// given lengths.
///
/// Fixtures are produced on the fly so that the repository stays free from
/// committed binary assets while still exercising the pipeline end-to-end.
fn write_recording(
    dir: &Path,
    sample_rate: u32,
    channels: u16,
    lengths: &[u32],
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut paths = Vec::new();
    let mut frame = 0u32;
    for (index, &frames) in lengths.iter().enumerate() {
        let path = dir.join(format!("{index:08X}.WAV"));
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for _ in 0..frames {
            for channel in 0..channels {
                let frequency = 220.0 * f32::from(channel + 1);
                let theta = frame as f32 / sample_rate as f32 * std::f32::consts::TAU * frequency;
                writer.write_sample((theta.sin() * 20_000.0) as i16)?;
            }
            frame += 1;
        }
        writer.finalize()?;
        paths.push(path);
    }
    Ok(paths)
}

fn write_session_log(dir: &Path, name: &str, markers: &[u32]) -> Result<(), Box<dyn Error>> {
    let mut log = vec![0u8; 1_572];
    // 2024-03-09 20:15:00
    let stamp: u32 = (44 << 25) | (3 << 21) | (9 << 16) | (20 << 11) | (15 << 5);
    log[0..4].copy_from_slice(&stamp.to_le_bytes());
    for (index, marker) in markers.iter().enumerate() {
        let at = 1_052 + index * 4;
        log[at..at + 4].copy_from_slice(&marker.to_le_bytes());
    }
    log[1_552..1_552 + name.len()].copy_from_slice(name.as_bytes());
    fs::write(dir.join("SE_LOG.BIN"), log)?;
    Ok(())
}

fn frames_in(path: &Path) -> Result<u32, Box<dyn Error>> {
    Ok(hound::WavReader::open(path)?.duration())
}

#[test]
fn cli_extracts_and_regroups_channels() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    write_recording(input_dir.path(), 1_000, 4, &[250, 250])?;
    let output_dir = tempdir()?;

    let mut cmd = Command::cargo_bin("multiwav")?;
    let assert = cmd
        .args(["-s", "0.100", "-e", "0.400", "-f", "PCM_16"])
        .args(["--link", "3", "--skip", "4", "--name", "1=Kick"])
        .arg("--output")
        .arg(output_dir.path())
        .arg(input_dir.path())
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("Extracted 300 frames into 2 file(s)."), "{stdout}");

    let mut produced: Vec<String> = fs::read_dir(output_dir.path())?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    produced.sort();
    assert_eq!(produced, vec!["ch1_Kick.wav", "ch2-3.wav"]);

    let pair = hound::WavReader::open(output_dir.path().join("ch2-3.wav"))?;
    assert_eq!(pair.spec().channels, 2);
    assert_eq!(pair.spec().bits_per_sample, 16);
    assert_eq!(pair.duration(), 300);
    assert_eq!(frames_in(&output_dir.path().join("ch1_Kick.wav"))?, 300);

    output_dir.close()?;
    input_dir.close()?;
    Ok(())
}

#[test]
fn cli_reports_missing_input_directory() -> Result<(), Box<dyn Error>> {
    let output_dir = tempdir()?;

    let mut cmd = Command::cargo_bin("multiwav")?;
    let assert = cmd
        .arg("--output")
        .arg(output_dir.path())
        .arg("missing-recording")
        .assert()
        .failure();

    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("input directory does not exist"), "{stderr}");

    output_dir.close()?;
    Ok(())
}

#[test]
fn cli_reports_directory_without_recordings() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    fs::write(input_dir.path().join("notes.txt"), "not audio")?;

    let mut cmd = Command::cargo_bin("multiwav")?;
    let assert = cmd.arg("--dry-run").arg(input_dir.path()).assert().failure();

    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("no input files"), "{stderr}");
    Ok(())
}

#[test]
fn cli_dry_run_prints_plan_without_creating_files() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    write_recording(input_dir.path(), 8_000, 3, &[800])?;

    let output_dir = tempdir()?;
    let mut cmd = Command::cargo_bin("multiwav")?;
    let assert = cmd
        .args(["--link", "2", "--dry-run", "--output"])
        .arg(output_dir.path())
        .arg(input_dir.path())
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("Dry run: would write 2 group(s):"), "{stdout}");
    for path in [
        output_dir.path().join("ch1-2.wav"),
        output_dir.path().join("ch3.wav"),
    ] {
        let needle = format!("  {}", path.display());
        assert!(stdout.contains(&needle), "missing dry-run entry for {needle}");
    }

    let mut produced = fs::read_dir(output_dir.path())?;
    assert!(produced.next().is_none(), "dry run should not create files");

    output_dir.close()?;
    input_dir.close()?;
    Ok(())
}

#[test]
fn cli_info_prints_layout_and_markers() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    write_recording(input_dir.path(), 1_000, 2, &[1_500, 1_000])?;
    write_session_log(input_dir.path(), "Live Set", &[1_250, 2_000])?;

    let mut cmd = Command::cargo_bin("multiwav")?;
    let assert = cmd.arg("--info").arg(input_dir.path()).assert().success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(
        stdout.contains("2 file(s): 2 channels, 00:00:02(+500 frames) at 1000Hz"),
        "{stdout}"
    );
    assert!(stdout.contains("Session: Live Set"), "{stdout}");
    assert!(stdout.contains("Created: 2024-03-09 20:15:00"), "{stdout}");
    assert!(stdout.contains("0:00:01.250"), "{stdout}");
    assert!(stdout.contains("0:00:02.0"), "{stdout}");
    Ok(())
}

#[test]
fn cli_keeps_existing_outputs_unless_overwrite_is_given() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    write_recording(input_dir.path(), 1_000, 1, &[100])?;
    let output_dir = tempdir()?;

    let run = |extra: &[&str]| -> Result<_, Box<dyn Error>> {
        let mut cmd = Command::cargo_bin("multiwav")?;
        Ok(cmd
            .args(extra)
            .arg("--output")
            .arg(output_dir.path())
            .arg(input_dir.path())
            .assert())
    };

    run(&[])?.success();

    let assert = run(&[])?.failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("already exists"), "{stderr}");

    run(&["--overwrite"])?.success();
    Ok(())
}

#[test]
fn cli_rejects_malformed_time() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    write_recording(input_dir.path(), 1_000, 1, &[100])?;

    let mut cmd = Command::cargo_bin("multiwav")?;
    let assert = cmd
        .args(["--start", "1:2:3:4"])
        .arg(input_dir.path())
        .assert()
        .failure();

    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("invalid time '1:2:3:4'"), "{stderr}");
    Ok(())
}

#[test]
fn cli_rejects_range_past_the_recording() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    write_recording(input_dir.path(), 1_000, 1, &[100])?;
    let output_dir = tempdir()?;
    let target = output_dir.path().join("never");

    let mut cmd = Command::cargo_bin("multiwav")?;
    let assert = cmd
        .args(["--end", "5"])
        .arg("--output")
        .arg(&target)
        .arg(input_dir.path())
        .assert()
        .failure();

    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("outside the recording of 100 frames"), "{stderr}");
    assert!(!target.exists());
    Ok(())
}
