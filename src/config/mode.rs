//! Run mode from marker files in the working directory.
//!
//! - `.debug`: debug logging and a separate database file
//! - `.noprint`: render documents but skip the printer
//! - `.test`: with `.debug`, replay the latest job per kind and exit

use std::path::Path;

pub const DEBUG_MARKER: &str = ".debug";
pub const NO_PRINT_MARKER: &str = ".noprint";
pub const TEST_MARKER: &str = ".test";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    pub debug: bool,
    pub no_print: bool,
    pub test: bool,
}

impl RunMode {
    /// Check `dir` for marker files. Missing markers are simply off.
    pub fn detect(dir: &Path) -> Self {
        Self {
            debug: dir.join(DEBUG_MARKER).exists(),
            no_print: dir.join(NO_PRINT_MARKER).exists(),
            test: dir.join(TEST_MARKER).exists(),
        }
    }

    /// Replay-then-exit only happens when both debug and test are set.
    pub fn replay_requested(&self) -> bool {
        self.debug && self.test
    }
}
