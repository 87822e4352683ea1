// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The frame ring: which allocations belong to which frame, and when the GPU
//! is done with them.
//!
//! ```text
//!   Recording ──close──▶ Pending(fence) ──signaled──▶ Reclaimable ──▶ Recording
//!                              │
//!                              └──timeout, Defer──▶ stalled list (re-polled every boundary)
//! ```

use super::handle::BlockHandle;
use crate::renderer::api::{FenceId, FenceStatus, FenceTimeoutPolicy};
use crate::renderer::error::{FrameError, ResourceError};
use crate::renderer::traits::GraphicsDevice;
use std::time::Duration;

/// Lifecycle state of one ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Collecting the allocations of the current frame. A non-current slot in
    /// this state is idle and owns nothing.
    Recording,
    /// Closed; its allocations wait for the fence.
    Pending(FenceId),
    /// Closed, and its fence was seen signaled at a later boundary. The
    /// allocations go back when the slot becomes current again.
    Reclaimable,
}

#[derive(Debug)]
struct FrameSlot {
    frame: u64,
    state: SlotState,
    allocations: Vec<BlockHandle>,
}

impl FrameSlot {
    fn begin_recording(&mut self, frame: u64) {
        self.frame = frame;
        self.state = SlotState::Recording;
    }
}

/// A closed frame whose fence did not signal in time.
#[derive(Debug)]
struct StalledFrame {
    frame: u64,
    fence: FenceId,
    allocations: Vec<BlockHandle>,
}

/// What a boundary or a drain gave back.
#[derive(Debug, Default)]
pub(crate) struct Reclaimed {
    pub(crate) handles: Vec<BlockHandle>,
    pub(crate) failure: Option<FrameError>,
}

impl Reclaimed {
    fn fail(&mut self, error: FrameError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        } else {
            log::warn!("Additional frame error: {error}");
        }
    }
}

/// Fixed-depth ring of frame slots.
#[derive(Debug)]
pub(crate) struct FrameRing {
    slots: Vec<FrameSlot>,
    index: usize,
    frame: u64,
    stalled: Vec<StalledFrame>,
    timeout: Duration,
    policy: FenceTimeoutPolicy,
    fence_timeouts: u64,
}

impl FrameRing {
    pub(crate) fn new(depth: usize, timeout: Duration, policy: FenceTimeoutPolicy) -> Self {
        let slots = (0..depth)
            .map(|_| FrameSlot {
                frame: 0,
                state: SlotState::Recording,
                allocations: Vec::new(),
            })
            .collect();
        Self {
            slots,
            index: 0,
            frame: 0,
            stalled: Vec::new(),
            timeout,
            policy,
            fence_timeouts: 0,
        }
    }

    /// The frame currently recording.
    pub(crate) fn frame(&self) -> u64 {
        self.frame
    }

    pub(crate) fn depth(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn current_slot(&self) -> usize {
        self.index
    }

    pub(crate) fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    pub(crate) fn stalled_frames(&self) -> usize {
        self.stalled.len()
    }

    pub(crate) fn fence_timeouts(&self) -> u64 {
        self.fence_timeouts
    }

    /// Number of allocations not yet returned, current frame included.
    pub(crate) fn allocations_in_flight(&self) -> usize {
        self.slots.iter().map(|s| s.allocations.len()).sum::<usize>()
            + self.stalled.iter().map(|s| s.allocations.len()).sum::<usize>()
    }

    /// Registers an allocation in the current frame.
    pub(crate) fn track(&mut self, handle: BlockHandle) {
        self.slots[self.index].allocations.push(handle);
    }

    /// Closes the current frame and reclaims the oldest one.
    ///
    /// When no fence can be inserted the boundary does not happen: the frame
    /// keeps recording and the error is reported.
    pub(crate) fn advance(&mut self, device: &dyn GraphicsDevice) -> Reclaimed {
        let mut out = Reclaimed::default();
        let fence = match device.insert_fence() {
            Ok(fence) => fence,
            Err(e) => {
                out.fail(e.into());
                return out;
            }
        };
        self.slots[self.index].state = SlotState::Pending(fence);
        self.index = (self.index + 1) % self.slots.len();
        self.frame += 1;

        if let Err(e) = self.poll_stalled(device, &mut out) {
            out.fail(e.into());
        }
        if let Err(e) = self.reclaim_current(device, &mut out) {
            out.fail(e.into());
        }
        if let Err(e) = self.poll_pending(device) {
            out.fail(e.into());
        }
        out
    }

    /// Returns every closed frame's allocations once the GPU is idle.
    ///
    /// The current frame keeps its allocations.
    pub(crate) fn drain(&mut self, device: &dyn GraphicsDevice, timeout: Duration) -> Reclaimed {
        let mut out = Reclaimed::default();
        let fence = match device.insert_fence() {
            Ok(fence) => fence,
            Err(e) => {
                out.fail(e.into());
                return out;
            }
        };
        let status = poll_then_wait(device, fence, timeout);
        if let Err(e) = device.destroy_fence(fence) {
            log::warn!("Failed to destroy idle fence {fence:?}: {e}");
        }
        match status {
            Ok(FenceStatus::Signaled) => {}
            Ok(FenceStatus::Pending) => {
                out.fail(FrameError::FenceTimeout {
                    frame: self.frame,
                    fence,
                    waited: timeout,
                });
                return out;
            }
            Err(e) => {
                out.fail(e.into());
                return out;
            }
        }

        // Fences signal in submission order: every earlier fence is done too.
        let current = self.index;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i == current {
                continue;
            }
            match slot.state {
                SlotState::Recording => continue,
                SlotState::Pending(fence) => {
                    if let Err(e) = device.destroy_fence(fence) {
                        log::warn!("Failed to destroy fence {fence:?}: {e}");
                    }
                }
                SlotState::Reclaimable => {}
            }
            out.handles.append(&mut slot.allocations);
            slot.state = SlotState::Recording;
        }
        for mut stalled in self.stalled.drain(..) {
            if let Err(e) = device.destroy_fence(stalled.fence) {
                log::warn!("Failed to destroy fence {:?}: {e}", stalled.fence);
            }
            out.handles.append(&mut stalled.allocations);
        }
        log::debug!(
            "Transient ring drained at frame {}: {} allocations returned",
            self.frame,
            out.handles.len()
        );
        out
    }

    /// Gives up every tracked allocation without checking fences. Only for
    /// teardown, after which the backing memory is destroyed.
    pub(crate) fn abandon(&mut self, device: &dyn GraphicsDevice) -> Vec<BlockHandle> {
        let mut handles = Vec::new();
        for slot in &mut self.slots {
            if let SlotState::Pending(fence) = slot.state {
                if let Err(e) = device.destroy_fence(fence) {
                    log::warn!("Failed to destroy fence {fence:?}: {e}");
                }
            }
            handles.append(&mut slot.allocations);
            slot.state = SlotState::Recording;
        }
        for mut stalled in self.stalled.drain(..) {
            if let Err(e) = device.destroy_fence(stalled.fence) {
                log::warn!("Failed to destroy fence {:?}: {e}", stalled.fence);
            }
            handles.append(&mut stalled.allocations);
        }
        handles
    }

    fn poll_stalled(
        &mut self,
        device: &dyn GraphicsDevice,
        out: &mut Reclaimed,
    ) -> Result<(), ResourceError> {
        let mut i = 0;
        while i < self.stalled.len() {
            let fence = self.stalled[i].fence;
            if device.fence_status(fence)? == FenceStatus::Pending {
                i += 1;
                continue;
            }
            let mut stalled = self.stalled.remove(i);
            log::info!(
                "Stalled frame {} completed, returning {} allocations",
                stalled.frame,
                stalled.allocations.len()
            );
            out.handles.append(&mut stalled.allocations);
            device.destroy_fence(fence)?;
        }
        Ok(())
    }

    fn reclaim_current(
        &mut self,
        device: &dyn GraphicsDevice,
        out: &mut Reclaimed,
    ) -> Result<(), ResourceError> {
        let frame = self.frame;
        let slot = &mut self.slots[self.index];
        let fence = match slot.state {
            SlotState::Pending(fence) => fence,
            SlotState::Reclaimable => {
                out.handles.append(&mut slot.allocations);
                slot.begin_recording(frame);
                return Ok(());
            }
            SlotState::Recording => {
                slot.begin_recording(frame);
                return Ok(());
            }
        };
        let closed_frame = slot.frame;

        let status = match poll_then_wait(device, fence, self.timeout) {
            Ok(status) => status,
            Err(e) => {
                self.stalled.push(StalledFrame {
                    frame: closed_frame,
                    fence,
                    allocations: std::mem::take(&mut slot.allocations),
                });
                slot.begin_recording(frame);
                return Err(e);
            }
        };

        if status == FenceStatus::Pending {
            self.fence_timeouts += 1;
            match self.policy {
                FenceTimeoutPolicy::Defer => {
                    log::error!(
                        "Fence {:?} of frame {} still pending after {:?}; deferring {} allocations",
                        fence,
                        closed_frame,
                        self.timeout,
                        slot.allocations.len()
                    );
                    self.stalled.push(StalledFrame {
                        frame: closed_frame,
                        fence,
                        allocations: std::mem::take(&mut slot.allocations),
                    });
                    slot.begin_recording(frame);
                    out.fail(FrameError::FenceTimeout {
                        frame: closed_frame,
                        fence,
                        waited: self.timeout,
                    });
                    return Ok(());
                }
                FenceTimeoutPolicy::Reclaim => {
                    log::warn!(
                        "Fence {:?} of frame {} still pending after {:?}; reclaiming anyway",
                        fence,
                        closed_frame,
                        self.timeout
                    );
                }
            }
        }

        out.handles.append(&mut slot.allocations);
        slot.begin_recording(frame);
        device.destroy_fence(fence)
    }

    /// Marks closed slots whose fence already signaled as reclaimable, without
    /// blocking. Their fences are released right away.
    fn poll_pending(&mut self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        let current = self.index;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i == current {
                continue;
            }
            let SlotState::Pending(fence) = slot.state else {
                continue;
            };
            if device.fence_status(fence)? == FenceStatus::Signaled {
                slot.state = SlotState::Reclaimable;
                device.destroy_fence(fence)?;
            }
        }
        Ok(())
    }
}

/// Non-blocking poll first, bounded wait only if still pending.
fn poll_then_wait(
    device: &dyn GraphicsDevice,
    fence: FenceId,
    timeout: Duration,
) -> Result<FenceStatus, ResourceError> {
    match device.fence_status(fence)? {
        FenceStatus::Signaled => Ok(FenceStatus::Signaled),
        FenceStatus::Pending => device.wait_fence(fence, timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::mock::MockGraphicsDevice;

    fn large(id: usize) -> BlockHandle {
        BlockHandle::Large {
            buffer: crate::renderer::api::BufferId(id),
        }
    }

    fn ring(policy: FenceTimeoutPolicy) -> FrameRing {
        FrameRing::new(3, Duration::from_millis(1), policy)
    }

    #[test]
    fn test_allocations_return_after_ring_depth_boundaries() {
        let device = MockGraphicsDevice::new();
        let mut ring = ring(FenceTimeoutPolicy::Defer);
        ring.track(large(1));
        ring.track(large(2));

        assert!(ring.advance(&device).handles.is_empty());
        assert!(ring.advance(&device).handles.is_empty());
        let reclaimed = ring.advance(&device);

        assert!(reclaimed.failure.is_none());
        assert_eq!(reclaimed.handles, vec![large(1), large(2)]);
        assert_eq!(ring.frame(), 3);
        assert_eq!(ring.current_slot(), 0);
        // Signaled fences are released as soon as a boundary sees them.
        assert_eq!(device.live_fences(), 0);
    }

    #[test]
    fn test_slot_states_follow_the_ring() {
        let device = MockGraphicsDevice::new();
        device.hold_fences();
        let mut ring = ring(FenceTimeoutPolicy::Defer);
        ring.track(large(3));

        ring.advance(&device);
        assert!(matches!(ring.slot_state(0), Some(SlotState::Pending(_))));
        assert_eq!(ring.slot_state(1), Some(SlotState::Recording));
        assert_eq!(ring.current_slot(), 1);

        device.signal_all();
        let reclaimed = ring.advance(&device);
        assert!(reclaimed.handles.is_empty());
        assert_eq!(ring.slot_state(0), Some(SlotState::Reclaimable));
        assert_eq!(ring.slot_state(1), Some(SlotState::Reclaimable));
        assert_eq!(ring.slot_state(2), Some(SlotState::Recording));
        assert_eq!(device.live_fences(), 0);
        assert_eq!(ring.allocations_in_flight(), 1);

        // A reclaimable slot gives its allocations back once it is current again.
        let reclaimed = ring.advance(&device);
        assert_eq!(reclaimed.handles, vec![large(3)]);
        assert_eq!(ring.slot_state(0), Some(SlotState::Recording));
        assert_eq!(device.wait_count(), 0);
    }

    #[test]
    fn test_signaled_fence_is_not_waited() {
        let device = MockGraphicsDevice::new();
        let mut ring = ring(FenceTimeoutPolicy::Defer);
        for _ in 0..6 {
            ring.advance(&device);
        }
        assert_eq!(device.wait_count(), 0);
    }

    #[test]
    fn test_defer_moves_pending_frame_to_stalled_list() {
        let device = MockGraphicsDevice::new();
        device.hold_fences();
        let mut ring = ring(FenceTimeoutPolicy::Defer);
        ring.track(large(7));

        ring.advance(&device);
        ring.advance(&device);
        let reclaimed = ring.advance(&device);

        assert!(reclaimed.handles.is_empty());
        assert!(matches!(
            reclaimed.failure,
            Some(FrameError::FenceTimeout { frame: 0, .. })
        ));
        assert_eq!(ring.stalled_frames(), 1);
        assert_eq!(ring.fence_timeouts(), 1);
        assert_eq!(ring.slot_state(0), Some(SlotState::Recording));
        assert_eq!(ring.allocations_in_flight(), 1);

        device.signal_all();
        let reclaimed = ring.advance(&device);
        assert!(reclaimed.failure.is_none());
        assert_eq!(reclaimed.handles, vec![large(7)]);
        assert_eq!(ring.stalled_frames(), 0);
    }

    #[test]
    fn test_reclaim_policy_returns_pending_frame() {
        let device = MockGraphicsDevice::new();
        device.hold_fences();
        let mut ring = ring(FenceTimeoutPolicy::Reclaim);
        ring.track(large(7));

        ring.advance(&device);
        ring.advance(&device);
        let reclaimed = ring.advance(&device);

        assert!(reclaimed.failure.is_none());
        assert_eq!(reclaimed.handles, vec![large(7)]);
        assert_eq!(ring.fence_timeouts(), 1);
        assert_eq!(device.wait_count(), 1);
    }

    #[test]
    fn test_drain_keeps_current_frame() {
        let device = MockGraphicsDevice::new();
        let mut ring = ring(FenceTimeoutPolicy::Defer);
        ring.track(large(1));
        ring.advance(&device);
        ring.track(large(2));

        let reclaimed = ring.drain(&device, Duration::from_millis(1));
        assert!(reclaimed.failure.is_none());
        assert_eq!(reclaimed.handles, vec![large(1)]);
        assert_eq!(ring.allocations_in_flight(), 1);
        assert_eq!(device.live_fences(), 0);
    }
}
