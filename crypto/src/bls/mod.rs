pub mod constants;
pub mod keys;
pub mod ops;
