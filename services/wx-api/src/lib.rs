//! Thin HTTP surface exercising the Mixer/Reader/Splitter/ColumnFile core
//! end-to-end. Deliberately minimal — see SPEC_FULL.md §10.1: the core's
//! job is the storage/interpolation semantics, not HTTP routing.

pub mod config;
pub mod handlers;
pub mod state;
