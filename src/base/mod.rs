pub mod mem;
pub mod unit;
