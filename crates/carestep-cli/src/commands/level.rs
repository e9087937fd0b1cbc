//! The `carestep level` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use carestep_core::progression::{level_for, LEVEL_BANDS};

pub fn execute(score: u32) -> Result<()> {
    let band = level_for(score);

    let mut table = Table::new();
    table.set_header(vec!["", "Score", "Level", "Grade", "Name", "Label", "HR points"]);
    for b in &LEVEL_BANDS {
        let marker = if b == band { ">" } else { "" };
        table.add_row(vec![
            Cell::new(marker),
            Cell::new(format!("{}-{}", b.min, b.max)),
            Cell::new(b.level),
            Cell::new(b.grade),
            Cell::new(b.name),
            Cell::new(b.label),
            Cell::new(b.hr_points),
        ]);
    }

    println!("Score {score}: {} ({}), {} HR points", band.name, band.label, band.hr_points);
    println!("{table}");
    Ok(())
}
