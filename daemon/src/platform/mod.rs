//! Operating system seam: process table, power primitives, window system

use thiserror::Error;
use tokio::sync::mpsc;

#[cfg(windows)]
pub mod windows;

#[cfg(windows)]
pub use self::windows::WindowsPlatform as NativePlatform;

#[cfg(not(windows))]
pub mod stub;

#[cfg(not(windows))]
pub use stub::StubPlatform as NativePlatform;

/// One row of the session process table, derived fresh on every sweep.
/// Pids are reused by the OS, so entries are never cached across sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub image_name: String,
}

/// Opaque window handle value from the windowing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowRef(pub isize);

/// Owning process and thread of a window. Zero ids mean the window is stale
/// or already closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOwner {
    pub pid: u32,
    pub thread_id: u32,
}

/// Access requested when opening a process handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAccess {
    /// Enough to change power/priority state.
    SetInfo,
    /// Query the image name plus change power/priority state.
    QuerySetInfo,
}

/// Execution-speed bit of the power throttling control block.
pub const THROTTLE_EXECUTION_SPEED: u32 = 0x1;

/// A power throttling request. The control mask selects which mechanisms
/// the call governs; the state mask turns the selected ones on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePacket {
    pub control_mask: u32,
    pub state_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityClass {
    Idle,
    Normal,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("process {pid} is gone")]
    ProcessGone { pid: u32 },
    #[error("access to process {pid} denied")]
    AccessDenied { pid: u32 },
    #[error("foreground watch failed: {0}")]
    WatchFailed(String),
    #[error("not supported on this platform")]
    Unsupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The operating system surface the throttling engine runs against.
///
/// Process handles are RAII values: dropping one releases the underlying OS
/// handle, so every open is paired with a close on every exit path. No
/// handle outlives a single resolve/apply cycle.
pub trait Platform: Send + Sync + 'static {
    /// Owned process handle.
    type Handle: Send;
    /// Keeps the foreground watch alive; dropping it unsubscribes.
    type FocusGuard: Send;

    /// Processes belonging to the daemon's own interactive session.
    fn session_processes(&self) -> Vec<ProcessEntry>;

    fn open_process(&self, pid: u32, access: ProcessAccess)
        -> Result<Self::Handle, PlatformError>;

    /// Image file name of the process, e.g. `Notepad.exe`.
    fn image_name(&self, handle: &Self::Handle) -> Result<String, PlatformError>;

    fn set_power_throttle(
        &self,
        handle: &Self::Handle,
        packet: ThrottlePacket,
    ) -> Result<(), PlatformError>;

    fn set_priority_class(
        &self,
        handle: &Self::Handle,
        class: PriorityClass,
    ) -> Result<(), PlatformError>;

    /// Owner ids of a window; zero ids signal a stale window.
    fn window_owner(&self, window: WindowRef) -> WindowOwner;

    /// Direct children of a window, front to back.
    fn child_windows(&self, window: WindowRef) -> Vec<WindowRef>;

    /// Start delivering foreground-window-changed events into `events` in
    /// the order they occur. The subscription ends when the returned guard
    /// is dropped.
    fn watch_foreground(
        &self,
        events: mpsc::Sender<WindowRef>,
    ) -> Result<Self::FocusGuard, PlatformError>;
}
