//! The `carestep validate` command.

use std::path::PathBuf;

use anyhow::Result;

use carestep_core::parser;

pub fn execute(submission_path: PathBuf) -> Result<()> {
    let files = parser::load_submissions(&submission_path)?;
    anyhow::ensure!(
        !files.is_empty(),
        "no submissions found in {}",
        submission_path.display()
    );

    for file in &files {
        let staff = file.staff_id.as_deref().unwrap_or("-");
        println!("Submission: {} ({}, staff {staff})", file.id, file.stage());
    }

    let warnings = parser::validate_files(&files);
    for (id, w) in &warnings {
        println!("  [{id}] WARNING: {w}");
    }

    if warnings.is_empty() {
        println!("All {} submission(s) valid.", files.len());
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
