pub mod driver;
pub mod grid;
