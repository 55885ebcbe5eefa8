//! Stub platform for development on non-Windows hosts

use tokio::sync::mpsc;
use tracing::warn;

use super::{
    Platform, PlatformError, PriorityClass, ProcessAccess, ProcessEntry, ThrottlePacket,
    WindowOwner, WindowRef,
};

/// Reports an empty session and refuses every process operation. Lets the
/// daemon build and run anywhere while the engine itself is exercised
/// through the test fake.
pub struct StubPlatform;

impl StubPlatform {
    pub fn new() -> Self {
        warn!("process power throttling is not supported on this platform");
        Self
    }
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StubHandle;
pub struct StubWatch;

impl Platform for StubPlatform {
    type Handle = StubHandle;
    type FocusGuard = StubWatch;

    fn session_processes(&self) -> Vec<ProcessEntry> {
        Vec::new()
    }

    fn open_process(&self, _pid: u32, _access: ProcessAccess) -> Result<StubHandle, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn image_name(&self, _handle: &StubHandle) -> Result<String, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn set_power_throttle(
        &self,
        _handle: &StubHandle,
        _packet: ThrottlePacket,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn set_priority_class(
        &self,
        _handle: &StubHandle,
        _class: PriorityClass,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn window_owner(&self, _window: WindowRef) -> WindowOwner {
        WindowOwner { pid: 0, thread_id: 0 }
    }

    fn child_windows(&self, _window: WindowRef) -> Vec<WindowRef> {
        Vec::new()
    }

    fn watch_foreground(
        &self,
        _events: mpsc::Sender<WindowRef>,
    ) -> Result<StubWatch, PlatformError> {
        Ok(StubWatch)
    }
}
