pub mod base;
pub mod cache;
pub mod interconnect;
pub mod mem;
pub mod sim;
pub mod units;

#[cfg(test)]
mod unit_tests;
