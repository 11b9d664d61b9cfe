pub mod attribution;
pub mod overview;
pub mod quality;
pub mod reports;
