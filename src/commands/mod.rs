pub mod jar;
pub mod trace;
