//! Integration tests module
//!
//! This module organizes all integration tests for the r-chimetts application.

pub mod config_test;
pub mod playback_test;
pub mod timeline_test;
pub mod transcoder_test;
