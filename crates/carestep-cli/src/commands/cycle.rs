//! The `carestep cycle` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use carestep_providers::config::load_config_from;

pub fn execute(
    date: Option<String>,
    time: Option<String>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json"),
        "unknown format '{}', expected text or json",
        format
    );
    let reference = reference_time(date.as_deref(), time.as_deref())?;
    let config = load_config_from(config_path.as_deref())?;
    let cycle = config.calendar.current_cycle(reference);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&cycle)?),
        _ => {
            println!("Cycle month: {}", cycle.year_month);
            println!("Phase: {}", cycle.phase);
            println!(
                "Input deadline: {} ({} day(s) left)",
                cycle.deadline_label(),
                cycle.days_left
            );
            if cycle.is_urgent() {
                println!("Deadline is near: submit your records soon.");
            }
        }
    }

    Ok(())
}

fn reference_time(date: Option<&str>, time: Option<&str>) -> Result<NaiveDateTime> {
    let now = chrono::Local::now().naive_local();
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{d}', expected YYYY-MM-DD"))?,
        None => now.date(),
    };
    let time = match time {
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M")
            .with_context(|| format!("invalid time '{t}', expected HH:MM"))?,
        None if date == now.date() => now.time(),
        None => NaiveTime::MIN,
    };
    Ok(date.and_time(time))
}
