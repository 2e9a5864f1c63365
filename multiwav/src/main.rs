mod cli;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use multiwav_core::{
    discover_inputs, format_timecode, plan_outputs, run_with_metrics, CallbackReporter,
    CancelToken, Config, InputCatalog, ProgressEvent, RunOutcome, SampleFormat, SessionMetadata,
};

use crate::cli::{build_cli, channel_settings};

/// Exit status used when the user interrupts an extraction.
const EXIT_CANCELLED: i32 = 130;

struct ProgressState {
    sample_rate: u32,
    total_label: String,
}

fn print_info(input_dir: &Path, inputs: &[PathBuf]) -> anyhow::Result<()> {
    let catalog = InputCatalog::build(inputs)
        .with_context(|| format!("failed to read recording in '{}'", input_dir.display()))?;
    let session = SessionMetadata::load(input_dir)
        .with_context(|| format!("failed to read session log in '{}'", input_dir.display()))?;

    println!("{} file(s): {}", catalog.files().len(), catalog.summary());
    println!("End: {}", catalog.end_timecode());
    if let Some(name) = &session.session_name {
        println!("Session: {name}");
    }
    if let Some(created) = session.created_at {
        match created.to_datetime() {
            Some(datetime) => println!("Created: {}", datetime.format("%Y-%m-%d %H:%M:%S")),
            None => println!("Created: {created} (invalid date)"),
        }
    }
    let markers = session.marker_timecodes(catalog.sample_rate());
    if !markers.is_empty() {
        println!("Markers:");
        for (index, marker) in markers.iter().enumerate() {
            println!("  {:>3}  {marker}", index + 1);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();

    let input_dir = matches
        .get_one::<PathBuf>("input_dir")
        .expect("required argument");
    if !input_dir.is_dir() {
        return Err(anyhow!(
            "input directory does not exist: {}",
            input_dir.display()
        ));
    }

    let inputs = discover_inputs(input_dir)
        .with_context(|| format!("failed to list recordings in '{}'", input_dir.display()))?;

    if matches.get_flag("info") {
        return print_info(input_dir, &inputs);
    }

    let output_dir = matches
        .get_one::<PathBuf>("output")
        .expect("defaulted argument");
    let start = matches
        .get_one::<String>("start")
        .expect("defaulted argument");
    let format = *matches
        .get_one::<SampleFormat>("format")
        .expect("defaulted argument");

    let mut builder = Config::builder(inputs, output_dir)
        .start(start)
        .format(format)
        .channels(channel_settings(&matches))
        .overwrite(matches.get_flag("overwrite"));
    if let Some(end) = matches.get_one::<String>("end") {
        builder = builder.end(end);
    }
    let config = builder.build().with_context(|| {
        format!(
            "failed to create configuration for '{}'",
            input_dir.display()
        )
    })?;

    if matches.get_flag("dry-run") {
        let plan = plan_outputs(&config)
            .with_context(|| format!("failed to plan outputs for '{}'", input_dir.display()))?;

        if plan.is_empty() {
            println!("Dry run: no channel group is exported.");
        } else {
            println!("Dry run: would write {} group(s):", plan.len());
            for path in plan {
                println!("  {}", path.display());
            }
        }

        return Ok(());
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install the Ctrl-C handler")?;

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());

    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let state = RefCell::new(ProgressState {
        sample_rate: 1,
        total_label: String::new(),
    });

    let progress_handle = progress.clone();
    let mut reporter = CallbackReporter::new(move |event| match event {
        ProgressEvent::Start {
            total_frames,
            sample_rate,
        } => {
            let mut state = state.borrow_mut();
            state.sample_rate = sample_rate;
            state.total_label = format_timecode(total_frames, sample_rate);
            progress_handle.set_style(bar_style.clone());
            progress_handle.set_length(total_frames.max(1));
            progress_handle.enable_steady_tick(Duration::from_millis(100));
            progress_handle.set_message(format!("0:00:00.0 / {}", state.total_label));
        }
        ProgressEvent::Advance {
            processed_frames, ..
        } => {
            let state = state.borrow();
            progress_handle.set_position(processed_frames);
            progress_handle.set_message(format!(
                "{} / {}",
                format_timecode(processed_frames, state.sample_rate),
                state.total_label
            ));
        }
        ProgressEvent::Finish { outcome } => {
            progress_handle.set_message(match outcome {
                RunOutcome::Completed => "Completed",
                RunOutcome::Cancelled => "Cancelled",
            });
        }
    })
    .with_cancel(cancel);

    let result = run_with_metrics(config, &mut reporter)
        .with_context(|| format!("failed to extract from '{}'", input_dir.display()));

    progress.finish_and_clear();

    let metrics = result?;
    match metrics.outcome {
        RunOutcome::Completed => {
            println!(
                "Extracted {} frames into {} file(s).",
                metrics.frames_processed,
                metrics.files_written.len()
            );
            Ok(())
        }
        RunOutcome::Cancelled => {
            eprintln!(
                "Cancelled after {} frames; {} partial file(s) kept.",
                metrics.frames_processed,
                metrics.files_written.len()
            );
            std::process::exit(EXIT_CANCELLED);
        }
    }
}
