//! Minimal CLI parsing for run overrides.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct CliOptions {
    /// Choose the first candidate without prompting
    pub auto_select: bool,
    /// Process a single path instead of the configured source roots
    pub single_path: Option<PathBuf>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        let mut options = CliOptions::default();
        for arg in env::args().skip(1) {
            match arg.as_str() {
                "--auto-select" => options.auto_select = true,
                _ if !arg.starts_with('-') => options.single_path = Some(PathBuf::from(arg)),
                _ => {}
            }
        }
        options
    }
}
