//! Foreground window to process resolution

use tracing::debug;

use crate::platform::{Platform, ProcessAccess, WindowRef};

/// The shared container process that owns every UWP top-level window; the
/// hosted application lives in a child window with a different owner.
pub const FRAME_HOST_IMAGE: &str = "applicationframehost.exe";

/// A resolved foreground process. The image name is lowercased so it can be
/// classified directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProcess {
    pub pid: u32,
    pub image_name: String,
}

/// Resolve the process a foreground window should be attributed to.
///
/// Returns `None` for stale windows (zero pid or thread id) and for
/// processes that vanish mid-resolution. Frame-host windows are
/// dereferenced to the first child window owned by another process; when no
/// such child exists the host itself is returned.
pub fn resolve_target<P: Platform>(platform: &P, window: WindowRef) -> Option<TargetProcess> {
    let owner = platform.window_owner(window);
    if owner.pid == 0 || owner.thread_id == 0 {
        return None;
    }

    let image_name = image_name_of(platform, owner.pid)?;
    if image_name != FRAME_HOST_IMAGE {
        return Some(TargetProcess {
            pid: owner.pid,
            image_name,
        });
    }

    for child in platform.child_windows(window) {
        let child_owner = platform.window_owner(child);
        if child_owner.pid == 0 || child_owner.pid == owner.pid {
            continue;
        }
        if let Some(name) = image_name_of(platform, child_owner.pid) {
            return Some(TargetProcess {
                pid: child_owner.pid,
                image_name: name,
            });
        }
    }

    Some(TargetProcess {
        pid: owner.pid,
        image_name,
    })
}

fn image_name_of<P: Platform>(platform: &P, pid: u32) -> Option<String> {
    let handle = match platform.open_process(pid, ProcessAccess::QuerySetInfo) {
        Ok(handle) => handle,
        Err(e) => {
            debug!(pid, "cannot open foreground process: {e}");
            return None;
        }
    };
    match platform.image_name(&handle) {
        Ok(name) => Some(name.to_lowercase()),
        Err(e) => {
            debug!(pid, "cannot query image name: {e}");
            None
        }
    }
}
