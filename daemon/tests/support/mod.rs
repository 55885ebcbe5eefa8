//! In-memory platform fake for engine tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use powerguard_daemon::platform::{
    Platform, PlatformError, PriorityClass, ProcessAccess, ProcessEntry, ThrottlePacket,
    WindowOwner, WindowRef, THROTTLE_EXECUTION_SPEED,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Normal,
    Throttled,
}

#[derive(Debug, Clone)]
struct FakeProcess {
    name: String,
    power: PowerState,
    priority: PriorityClass,
}

/// One power-throttle call observed by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleCall {
    pub pid: u32,
    pub throttled: bool,
}

#[derive(Default)]
struct FakeState {
    processes: HashMap<u32, FakeProcess>,
    unopenable: HashSet<u32>,
    windows: HashMap<isize, WindowOwner>,
    children: HashMap<isize, Vec<WindowRef>>,
    calls: Vec<ThrottleCall>,
    watch_count: usize,
    fail_watch: bool,
}

/// Models a single-session process table plus a window system, and records
/// every power transition the engine requests.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

pub struct FakeHandle {
    pid: u32,
}

pub struct FakeWatch;

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_process(&self, pid: u32, name: &str) {
        self.state.lock().unwrap().processes.insert(
            pid,
            FakeProcess {
                name: name.to_string(),
                power: PowerState::Normal,
                priority: PriorityClass::Normal,
            },
        );
    }

    /// Keep the process in the table but make every open fail, as if it
    /// exited between enumeration and handle acquisition.
    pub fn refuse_open(&self, pid: u32) {
        self.state.lock().unwrap().unopenable.insert(pid);
    }

    pub fn add_window(&self, window: isize, pid: u32, thread_id: u32) {
        self.state
            .lock()
            .unwrap()
            .windows
            .insert(window, WindowOwner { pid, thread_id });
    }

    pub fn add_child_window(&self, parent: isize, child: isize) {
        self.state
            .lock()
            .unwrap()
            .children
            .entry(parent)
            .or_default()
            .push(WindowRef(child));
    }

    pub fn power_of(&self, pid: u32) -> PowerState {
        self.state.lock().unwrap().processes[&pid].power
    }

    pub fn priority_of(&self, pid: u32) -> PriorityClass {
        self.state.lock().unwrap().processes[&pid].priority
    }

    pub fn calls(&self) -> Vec<ThrottleCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn watch_count(&self) -> usize {
        self.state.lock().unwrap().watch_count
    }

    pub fn fail_watch(&self) {
        self.state.lock().unwrap().fail_watch = true;
    }
}

impl Platform for FakePlatform {
    type Handle = FakeHandle;
    type FocusGuard = FakeWatch;

    fn session_processes(&self) -> Vec<ProcessEntry> {
        self.state
            .lock()
            .unwrap()
            .processes
            .iter()
            .map(|(pid, p)| ProcessEntry {
                pid: *pid,
                image_name: p.name.clone(),
            })
            .collect()
    }

    fn open_process(&self, pid: u32, _access: ProcessAccess) -> Result<FakeHandle, PlatformError> {
        let state = self.state.lock().unwrap();
        if state.unopenable.contains(&pid) || !state.processes.contains_key(&pid) {
            return Err(PlatformError::ProcessGone { pid });
        }
        Ok(FakeHandle { pid })
    }

    fn image_name(&self, handle: &FakeHandle) -> Result<String, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .processes
            .get(&handle.pid)
            .map(|p| p.name.clone())
            .ok_or(PlatformError::ProcessGone { pid: handle.pid })
    }

    fn set_power_throttle(
        &self,
        handle: &FakeHandle,
        packet: ThrottlePacket,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        let throttled = packet.state_mask & THROTTLE_EXECUTION_SPEED != 0;
        let process = state
            .processes
            .get_mut(&handle.pid)
            .ok_or(PlatformError::ProcessGone { pid: handle.pid })?;
        process.power = if throttled {
            PowerState::Throttled
        } else {
            PowerState::Normal
        };
        state.calls.push(ThrottleCall {
            pid: handle.pid,
            throttled,
        });
        Ok(())
    }

    fn set_priority_class(
        &self,
        handle: &FakeHandle,
        class: PriorityClass,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        let process = state
            .processes
            .get_mut(&handle.pid)
            .ok_or(PlatformError::ProcessGone { pid: handle.pid })?;
        process.priority = class;
        Ok(())
    }

    fn window_owner(&self, window: WindowRef) -> WindowOwner {
        self.state
            .lock()
            .unwrap()
            .windows
            .get(&window.0)
            .copied()
            .unwrap_or(WindowOwner { pid: 0, thread_id: 0 })
    }

    fn child_windows(&self, window: WindowRef) -> Vec<WindowRef> {
        self.state
            .lock()
            .unwrap()
            .children
            .get(&window.0)
            .cloned()
            .unwrap_or_default()
    }

    fn watch_foreground(
        &self,
        _events: mpsc::Sender<WindowRef>,
    ) -> Result<FakeWatch, PlatformError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_watch {
            return Err(PlatformError::WatchFailed("hook rejected".into()));
        }
        state.watch_count += 1;
        Ok(FakeWatch)
    }
}
