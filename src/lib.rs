#![forbid(unsafe_code)]

pub mod app;
pub mod assets;
pub mod cli;
pub mod config;
pub mod imaging;
pub mod logging;
pub mod pages;
pub mod pdf;
pub mod preview;
pub mod theme;
