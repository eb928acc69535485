//! Helpers for decoding lock records and prompt answers.

use log::warn;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::types::constants::AFFIRMATIVE;

/// Largest identifier that can be signalled without being read as a process group.
const MAX_PID: u32 = i32::MAX as u32;

/// Parses lock file contents into a process identifier.
///
/// Surrounding whitespace is ignored. Returns `None` for anything that is not
/// a positive decimal integer that fits a signed 32-bit PID.
pub(crate) fn parse_pid(contents: &str) -> Option<u32> {
    let trimmed = contents.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match trimmed.parse::<u32>() {
        Ok(0) => None,
        Ok(pid) if pid <= MAX_PID => Some(pid),
        Ok(pid) => {
            warn!("PID {pid} in lock file is out of range");
            None
        }
        Err(_) => None,
    }
}

/// Encodes a process identifier the way it is stored on disk.
pub(crate) fn encode_pid(pid: u32) -> String {
    pid.to_string()
}

/// Whether an answer confirms displacement (`yes`, any case).
pub(crate) fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case(AFFIRMATIVE)
}

/// Prompt text shown before displacing a running owner.
pub(crate) fn displacement_question(pid: u32, default_answer: &str) -> String {
    format!("Another instance is running with PID {pid}. Terminate it? (yes/no) [{default_answer}]: ")
}

/// Where `pid` parks a stale record while checking it: next to the lock file,
/// so the rename stays on one filesystem.
pub(crate) fn aside_path(path: &Path, pid: u32) -> PathBuf {
    let mut aside = OsString::from(path.as_os_str());
    aside.push(format!(".{pid}.stale"));
    PathBuf::from(aside)
}
