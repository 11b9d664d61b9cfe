pub mod questions;
pub mod sentiment;
pub mod themes;
