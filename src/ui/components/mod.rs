pub mod stats_table;
pub mod system_overview;

pub use stats_table::{render_disk_table, render_network_table};
pub use system_overview::render_system_overview;
