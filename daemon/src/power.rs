//! Process power state executor

use std::sync::Arc;

use tracing::debug;

use crate::platform::{
    Platform, PriorityClass, ProcessAccess, ThrottlePacket, THROTTLE_EXECUTION_SPEED,
};

/// Moves processes into and out of the reduced-power state.
///
/// The throttle-on and throttle-off control packets are built once at
/// construction; each `apply` call is an independent open-use-release cycle
/// against a fresh handle.
pub struct PowerController<P: Platform> {
    platform: Arc<P>,
    throttle_on: ThrottlePacket,
    throttle_off: ThrottlePacket,
}

impl<P: Platform> PowerController<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            throttle_on: ThrottlePacket {
                control_mask: THROTTLE_EXECUTION_SPEED,
                state_mask: THROTTLE_EXECUTION_SPEED,
            },
            throttle_off: ThrottlePacket {
                control_mask: THROTTLE_EXECUTION_SPEED,
                state_mask: 0,
            },
        }
    }

    /// Throttle (`true`) or boost (`false`) one process: execution-speed
    /// throttling plus the matching priority class.
    ///
    /// Returns `false` when the process could not be reached; the process
    /// may have exited, and the next sweep or focus change retries
    /// naturally.
    pub fn apply(&self, pid: u32, throttled: bool) -> bool {
        let handle = match self.platform.open_process(pid, ProcessAccess::SetInfo) {
            Ok(handle) => handle,
            Err(e) => {
                debug!(pid, "skipping unreachable process: {e}");
                return false;
            }
        };

        let packet = if throttled {
            self.throttle_on
        } else {
            self.throttle_off
        };
        if let Err(e) = self.platform.set_power_throttle(&handle, packet) {
            debug!(pid, "power throttle call failed: {e}");
            return false;
        }

        let class = if throttled {
            PriorityClass::Idle
        } else {
            PriorityClass::Normal
        };
        if let Err(e) = self.platform.set_priority_class(&handle, class) {
            debug!(pid, "priority class call failed: {e}");
            return false;
        }

        true
    }
}
