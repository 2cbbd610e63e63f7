pub mod collectors;
pub mod domain;
pub mod query;
pub mod ui;
