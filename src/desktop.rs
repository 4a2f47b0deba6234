//! Desktop shell actions
//!
//! Thin wrappers over external programs: `xdg-open` for revealing a session
//! directory and `ffplay` (resolved like the merge tool) for playback.

use crate::mux;
use log::debug;
use std::path::Path;
use std::process::Command;

const OPENER: &str = "xdg-open";
const PLAYER: &str = "ffplay";

/// Reveal a directory (or file) in the desktop file manager
pub fn open_folder(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("path does not exist: {}", path.display()));
    }
    debug!("Opening {}", path.display());
    let status = Command::new(OPENER)
        .arg(path)
        .status()
        .map_err(|e| format!("failed to run {}: {}", OPENER, e))?;
    if !status.success() {
        return Err(format!("{} exited with {}", OPENER, status));
    }
    Ok(())
}

/// Play a media file with ffplay, blocking until playback ends
pub fn play(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("file does not exist: {}", path.display()));
    }
    let player = mux::find_in_path(PLAYER)
        .ok_or_else(|| format!("{} not found in PATH", PLAYER))?;
    debug!("Playing {} with {}", path.display(), player.display());
    let status = Command::new(player)
        .arg("-autoexit")
        .arg(path)
        .status()
        .map_err(|e| format!("failed to run {}: {}", PLAYER, e))?;
    if !status.success() {
        return Err(format!("{} exited with {}", PLAYER, status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_paths_are_rejected_before_spawning() {
        assert!(open_folder(Path::new("/nonexistent/camrec")).is_err());
        assert!(play(Path::new("/nonexistent/camrec.mp4")).is_err());
    }
}
