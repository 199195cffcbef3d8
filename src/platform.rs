use std::path::Path;
use std::process::Command;

use crate::logw;

#[cfg(target_os = "windows")]
const OPENER: &str = "explorer";
#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(all(unix, not(target_os = "macos")))]
const OPENER: &str = "xdg-open";

/// Hand a finished ad (or its folder) to the desktop's default handler.
///
/// Remote URLs are opened the same way. Returns false when nothing was
/// launched.
pub fn open_path<P: AsRef<Path>>(target: P) -> bool {
    let target = target.as_ref();
    if target.as_os_str().is_empty() {
        return false;
    }
    match Command::new(OPENER).arg(target).spawn() {
        Ok(_) => true,
        Err(err) => {
            logw(format!("Could not open {} with {}: {}", target.display(), OPENER, err));
            false
        }
    }
}
