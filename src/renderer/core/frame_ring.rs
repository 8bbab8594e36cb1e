//! Frame Resource Ring
//!
//! F interchangeable frame slots, created once and reused round-robin. Frame
//! number `N` records into slot `N mod F`, and before it does, the ring blocks
//! until the submission made from that slot at frame `N - F` has completed.
//! That wait is the only blocking point of the frame loop.
//!
//! ```text
//!  frame:   0   1   2   3   4   5 ...
//!  slot:    0   1   2   0   1   2
//!  waits:   -   -   -   0   1   2      (submission of frame N - F)
//! ```
//!
//! wgpu performs the surface acquire/present synchronization itself, so a
//! slot's only explicit fence is the [`wgpu::SubmissionIndex`] of its last
//! submit. Per-frame GPU buffers live with the passes that own them and are
//! indexed by [`FrameIndex::slot`].

use crate::errors::Result;

/// CPU-side wait on submitted GPU work.
pub trait FrameFence {
    /// Identifies one submission.
    type Token;

    /// Blocks the calling thread until the work behind `token` has finished.
    fn wait(&self, token: &Self::Token) -> Result<()>;
}

impl FrameFence for wgpu::Device {
    type Token = wgpu::SubmissionIndex;

    fn wait(&self, token: &Self::Token) -> Result<()> {
        self.poll(wgpu::PollType::Wait {
            submission_index: Some(token.clone()),
            timeout: None,
        })?;
        Ok(())
    }
}

/// Bump arena for objects that only live for one use of a frame slot.
///
/// Stands in for a per-frame transient descriptor pool: bind groups created
/// while recording frame `N` are kept alive until the slot's fence proves the
/// GPU is done with them, then dropped in one go.
#[derive(Debug)]
pub struct TransientArena<T> {
    items: Vec<T>,
    peak: usize,
}

impl<T> Default for TransientArena<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            peak: 0,
        }
    }
}

impl<T> TransientArena<T> {
    /// Stores `item` until the next reset and returns a reference to it.
    pub fn alloc(&mut self, item: T) -> &T {
        self.items.push(item);
        self.peak = self.peak.max(self.items.len());
        let last = self.items.len() - 1;
        &self.items[last]
    }

    /// Drops everything allocated since the last reset, keeping the storage.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Largest number of live items seen in one frame.
    #[inline]
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak
    }
}

pub type TransientBindGroups = TransientArena<wgpu::BindGroup>;

/// Position of the frame being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndex {
    /// Monotonic frame number `N`.
    pub number: u64,
    /// Slot `N mod F`.
    pub slot: usize,
}

/// One frame-in-flight execution context.
#[derive(Debug)]
pub struct FrameSlot<T> {
    index: usize,
    /// Submission made the last time this slot was used.
    fence: Option<T>,
    /// Frame number that last submitted from this slot.
    last_frame: Option<u64>,
    pub transient: TransientBindGroups,
}

impl<T> FrameSlot<T> {
    fn new(index: usize) -> Self {
        Self {
            index,
            fence: None,
            last_frame: None,
            transient: TransientBindGroups::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.fence.is_some()
    }
}

/// Ring of F frame slots.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<FrameSlot<T>>,
    frame_number: u64,
    recording: bool,
}

impl<T> FrameRing<T> {
    /// Creates `frames_in_flight` slots (at least one).
    #[must_use]
    pub fn new(frames_in_flight: usize) -> Self {
        let count = frames_in_flight.max(1);
        Self {
            slots: (0..count).map(FrameSlot::new).collect(),
            frame_number: 0,
            recording: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Number of the next (or currently recording) frame.
    #[inline]
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    #[must_use]
    pub fn slot_for(&self, frame_number: u64) -> usize {
        (frame_number % self.slots.len() as u64) as usize
    }

    #[inline]
    #[must_use]
    pub fn current_index(&self) -> FrameIndex {
        FrameIndex {
            number: self.frame_number,
            slot: self.slot_for(self.frame_number),
        }
    }

    /// Waits for the slot of frame `N` to retire its previous submission,
    /// then resets its transient arena.
    pub fn begin_frame<F>(&mut self, fence: &F) -> Result<FrameIndex>
    where
        F: FrameFence<Token = T>,
    {
        debug_assert!(!self.recording, "begin_frame called twice without end_frame");
        let index = self.current_index();
        let slot = &mut self.slots[index.slot];

        if let Some(token) = slot.fence.take() {
            fence.wait(&token)?;
        }
        slot.transient.reset();

        self.recording = true;
        log::trace!("Frame {} recording into slot {}", index.number, index.slot);
        Ok(index)
    }

    /// Records the submission made for the current frame and advances `N`.
    pub fn end_frame(&mut self, token: T) {
        debug_assert!(self.recording, "end_frame without begin_frame");
        let index = self.current_index();
        let slot = &mut self.slots[index.slot];
        slot.fence = Some(token);
        slot.last_frame = Some(index.number);

        self.recording = false;
        self.frame_number += 1;
    }

    /// Ends a frame that submitted nothing (e.g. the surface was outdated).
    /// `N` does not advance, so the same slot is reused next time.
    pub fn abandon_frame(&mut self) {
        self.recording = false;
    }

    #[must_use]
    pub fn current_slot(&self) -> &FrameSlot<T> {
        &self.slots[self.slot_for(self.frame_number)]
    }

    pub fn current_slot_mut(&mut self) -> &mut FrameSlot<T> {
        let slot = self.slot_for(self.frame_number);
        &mut self.slots[slot]
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot<T>> {
        self.slots.get(index)
    }

    /// Waits for every slot's outstanding submission (shutdown, resize).
    pub fn wait_all<F>(&mut self, fence: &F) -> Result<()>
    where
        F: FrameFence<Token = T>,
    {
        for slot in &mut self.slots {
            if let Some(token) = slot.fence.take() {
                fence.wait(&token)?;
            }
            slot.transient.reset();
        }
        Ok(())
    }
}
