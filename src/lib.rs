#![doc = include_str!("../readme.md")]

pub mod core;
pub mod engine;
