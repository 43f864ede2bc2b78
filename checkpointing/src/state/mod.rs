pub mod address;
pub mod bitmap;
pub mod checkpoint;
pub mod frame;
pub mod valset;
pub mod vote_extension;
