// src/lib.rs
pub mod config;
pub mod drivers;
pub mod engine;
pub mod gui;
pub mod recorder;
pub mod types;
pub mod visualizer;
