#![allow(clippy::needless_return, clippy::redundant_field_names)]

// interface and unixruntime are public so the benchmarks can reach them.
pub mod interface;
pub mod unixruntime;
mod tests;
