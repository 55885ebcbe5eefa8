//! Win32 implementation: Toolhelp process table, EcoQoS power throttling,
//! priority classes, and the foreground-window event hook.

use std::ffi::c_void;
use std::sync::Mutex;
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE, HWND, LPARAM, WPARAM};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::RemoteDesktop::ProcessIdToSessionId;
use windows::Win32::System::Threading::{
    GetCurrentProcessId, GetCurrentThreadId, OpenProcess, QueryFullProcessImageNameW,
    SetPriorityClass, SetProcessInformation, IDLE_PRIORITY_CLASS, NORMAL_PRIORITY_CLASS,
    PROCESS_NAME_WIN32, PROCESS_POWER_THROTTLING_CURRENT_VERSION, PROCESS_POWER_THROTTLING_STATE,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_INFORMATION, PROCESS_ACCESS_RIGHTS,
    ProcessPowerThrottling,
};
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, EnumChildWindows, GetMessageW, GetWindowThreadProcessId,
    PostThreadMessageW, TranslateMessage, EVENT_SYSTEM_FOREGROUND, MSG, WINEVENT_OUTOFCONTEXT,
    WM_QUIT,
};

use super::{
    Platform, PlatformError, PriorityClass, ProcessAccess, ProcessEntry, ThrottlePacket,
    WindowOwner, WindowRef,
};

// HRESULTs OpenProcess commonly fails with when a process has exited or is
// protected; everything else maps to a generic io error.
const E_ACCESS_DENIED: i32 = 0x8007_0005u32 as i32;
const E_INVALID_PARAMETER: i32 = 0x8007_0057u32 as i32;

/// Single slot feeding the win-event callback, which carries no user data
/// pointer of its own.
static FOCUS_SENDER: Mutex<Option<mpsc::Sender<WindowRef>>> = Mutex::new(None);

/// Owned Win32 handle, closed on drop.
pub struct OwnedHandle(HANDLE);

// HANDLE is a plain kernel object identifier; ownership is what matters.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

pub struct WindowsPlatform {
    session_id: u32,
}

impl WindowsPlatform {
    pub fn new() -> Self {
        let mut session_id = 0u32;
        unsafe {
            if ProcessIdToSessionId(GetCurrentProcessId(), &mut session_id).is_err() {
                warn!("could not determine own session id; session filtering disabled");
            }
        }
        Self { session_id }
    }

    fn in_own_session(&self, pid: u32) -> bool {
        let mut session = 0u32;
        unsafe { ProcessIdToSessionId(pid, &mut session).is_ok() && session == self.session_id }
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for WindowsPlatform {
    type Handle = OwnedHandle;
    type FocusGuard = ForegroundWatch;

    fn session_processes(&self) -> Vec<ProcessEntry> {
        let mut out = Vec::new();
        unsafe {
            let snapshot = match CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) {
                Ok(handle) => OwnedHandle(handle),
                Err(e) => {
                    warn!("process snapshot failed: {e}");
                    return out;
                }
            };
            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };
            if Process32FirstW(snapshot.0, &mut entry).is_err() {
                return out;
            }
            loop {
                let pid = entry.th32ProcessID;
                if pid != 0 && self.in_own_session(pid) {
                    let len = entry
                        .szExeFile
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szExeFile.len());
                    out.push(ProcessEntry {
                        pid,
                        image_name: String::from_utf16_lossy(&entry.szExeFile[..len]),
                    });
                }
                if Process32NextW(snapshot.0, &mut entry).is_err() {
                    break;
                }
            }
        }
        out
    }

    fn open_process(&self, pid: u32, access: ProcessAccess) -> Result<OwnedHandle, PlatformError> {
        let rights: PROCESS_ACCESS_RIGHTS = match access {
            ProcessAccess::SetInfo => PROCESS_SET_INFORMATION,
            ProcessAccess::QuerySetInfo => {
                PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_SET_INFORMATION
            }
        };
        unsafe {
            match OpenProcess(rights, false, pid) {
                Ok(handle) if !handle.is_invalid() => Ok(OwnedHandle(handle)),
                Ok(_) => Err(PlatformError::ProcessGone { pid }),
                Err(e) => match e.code().0 {
                    E_ACCESS_DENIED => Err(PlatformError::AccessDenied { pid }),
                    E_INVALID_PARAMETER => Err(PlatformError::ProcessGone { pid }),
                    _ => Err(PlatformError::Io(std::io::Error::other(e))),
                },
            }
        }
    }

    fn image_name(&self, handle: &OwnedHandle) -> Result<String, PlatformError> {
        let mut buf = [0u16; 1024];
        let mut len = buf.len() as u32;
        unsafe {
            QueryFullProcessImageNameW(
                handle.0,
                PROCESS_NAME_WIN32,
                PWSTR(buf.as_mut_ptr()),
                &mut len,
            )
            .map_err(|e| PlatformError::Io(std::io::Error::other(e)))?;
        }
        let path = String::from_utf16_lossy(&buf[..len as usize]);
        let name = path.rsplit(['\\', '/']).next().unwrap_or(&path);
        Ok(name.to_string())
    }

    fn set_power_throttle(
        &self,
        handle: &OwnedHandle,
        packet: ThrottlePacket,
    ) -> Result<(), PlatformError> {
        let state = PROCESS_POWER_THROTTLING_STATE {
            Version: PROCESS_POWER_THROTTLING_CURRENT_VERSION,
            ControlMask: packet.control_mask,
            StateMask: packet.state_mask,
        };
        unsafe {
            SetProcessInformation(
                handle.0,
                ProcessPowerThrottling,
                &state as *const _ as *const c_void,
                std::mem::size_of::<PROCESS_POWER_THROTTLING_STATE>() as u32,
            )
            .map_err(|e| PlatformError::Io(std::io::Error::other(e)))
        }
    }

    fn set_priority_class(
        &self,
        handle: &OwnedHandle,
        class: PriorityClass,
    ) -> Result<(), PlatformError> {
        let flags = match class {
            PriorityClass::Idle => IDLE_PRIORITY_CLASS,
            PriorityClass::Normal => NORMAL_PRIORITY_CLASS,
        };
        unsafe {
            SetPriorityClass(handle.0, flags)
                .map_err(|e| PlatformError::Io(std::io::Error::other(e)))
        }
    }

    fn window_owner(&self, window: WindowRef) -> WindowOwner {
        let mut pid = 0u32;
        let thread_id =
            unsafe { GetWindowThreadProcessId(HWND(window.0 as *mut c_void), Some(&mut pid)) };
        WindowOwner { pid, thread_id }
    }

    fn child_windows(&self, window: WindowRef) -> Vec<WindowRef> {
        unsafe extern "system" fn push_child(hwnd: HWND, lparam: LPARAM) -> BOOL {
            let out = unsafe { &mut *(lparam.0 as *mut Vec<WindowRef>) };
            out.push(WindowRef(hwnd.0 as isize));
            true.into()
        }

        let mut out: Vec<WindowRef> = Vec::new();
        unsafe {
            let _ = EnumChildWindows(
                Some(HWND(window.0 as *mut c_void)),
                Some(push_child),
                LPARAM(&mut out as *mut Vec<WindowRef> as isize),
            );
        }
        out
    }

    fn watch_foreground(
        &self,
        events: mpsc::Sender<WindowRef>,
    ) -> Result<ForegroundWatch, PlatformError> {
        set_focus_sender(Some(events));

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("foreground-watch".into())
            .spawn(move || unsafe {
                // The hook must be installed on the thread that pumps
                // messages; events are delivered through this loop.
                let hook = SetWinEventHook(
                    EVENT_SYSTEM_FOREGROUND,
                    EVENT_SYSTEM_FOREGROUND,
                    None,
                    Some(foreground_event_proc),
                    0,
                    0,
                    WINEVENT_OUTOFCONTEXT,
                );
                if hook.is_invalid() {
                    let _ = ready_tx.send(Err(windows::core::Error::from_win32().to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(GetCurrentThreadId()));

                let mut msg = MSG::default();
                while GetMessageW(&mut msg, None, 0, 0).as_bool() {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
                let _ = UnhookWinEvent(hook);
            })
            .map_err(PlatformError::Io)?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => Ok(ForegroundWatch {
                thread_id,
                thread: Some(thread),
            }),
            Ok(Err(message)) => {
                set_focus_sender(None);
                let _ = thread.join();
                Err(PlatformError::WatchFailed(message))
            }
            Err(_) => {
                set_focus_sender(None);
                Err(PlatformError::WatchFailed(
                    "watch thread exited before installing the hook".into(),
                ))
            }
        }
    }
}

/// Keeps the foreground hook installed; drop stops the message pump,
/// unhooks, and clears the event sender.
pub struct ForegroundWatch {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl Drop for ForegroundWatch {
    fn drop(&mut self) {
        unsafe {
            let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        set_focus_sender(None);
    }
}

fn set_focus_sender(sender: Option<mpsc::Sender<WindowRef>>) {
    match FOCUS_SENDER.lock() {
        Ok(mut slot) => *slot = sender,
        Err(poisoned) => *poisoned.into_inner() = sender,
    }
}

unsafe extern "system" fn foreground_event_proc(
    _hook: HWINEVENTHOOK,
    _event: u32,
    hwnd: HWND,
    _id_object: i32,
    _id_child: i32,
    _id_event_thread: u32,
    _dwms_event_time: u32,
) {
    let sender = match FOCUS_SENDER.lock() {
        Ok(slot) => slot.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    if let Some(tx) = sender {
        // Never block the event pump; a dropped event is corrected by the
        // next housekeeping sweep.
        if tx.try_send(WindowRef(hwnd.0 as isize)).is_err() {
            debug!("focus event queue full, dropping event");
        }
    }
}
