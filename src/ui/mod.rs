//! Terminal rendering for the CLI

pub mod output;
pub mod table;
pub mod theme;

pub use output::{error, header, info, section, success, warn, Icons};
pub use table::{entity_table, model_link_table, part_link_table, stats_table};
pub use theme::{theme, Theme};
