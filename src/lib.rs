//! License Plate Logo Overlay
//!
//! This library provides the core functionality for the plate-overlay tool,
//! which batch-submits vehicle images to a remote image-editing API that
//! places a custom logo over detected license plates, then downloads and
//! stores the edited results.

pub mod config;
pub mod models;
pub mod runner;
pub mod services;
