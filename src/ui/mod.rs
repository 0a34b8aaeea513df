pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{change_summary, dim, error, header, info, phase, section, success, summary_row, warn};
pub use table::{stats_table, TableBuilder};
pub use theme::{theme, Theme};
