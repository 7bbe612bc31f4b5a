use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::gitlab::wait::FinalStatus;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn final_status_cell(status: FinalStatus) -> Cell {
    let color = match status {
        FinalStatus::Success => TableColor::Green,
        FinalStatus::Failed => TableColor::Red,
        FinalStatus::Canceled | FinalStatus::Skipped | FinalStatus::Timeout => TableColor::Yellow,
    };
    Cell::new(status).fg(color)
}

/// Zero counts stay uncolored so only non-empty buckets stand out.
pub fn color_coded_count_cell(count: usize, color: TableColor) -> Cell {
    if count == 0 {
        Cell::new(count)
    } else {
        Cell::new(count).fg(color)
    }
}
