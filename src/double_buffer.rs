//! Two-slot batch storage with a single atomically published active index.
//!
//! The publisher only ever writes the inactive slot and then bumps the
//! generation word; the low bit of the generation is the active slot. Each
//! slot also carries a sequence counter so a reader that was lapped by two
//! publishes mid-copy notices and retries instead of returning a blend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

struct Slot {
    seq: AtomicU32,
    generation: AtomicU64,
    values: Box<[AtomicU32]>,
}

impl Slot {
    fn zeroed(len: usize) -> Self {
        Self {
            seq: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            values: (0..len).map(|_| AtomicU32::new(0.0f32.to_bits())).collect(),
        }
    }

    fn write(&self, batch: &[f32], generation: u64) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.generation.store(generation, Ordering::Relaxed);
        for (cell, value) in self.values.iter().zip(batch) {
            cell.store(value.to_bits(), Ordering::Relaxed);
        }
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    fn try_read(&self, out: &mut [f32]) -> Option<u64> {
        let start = self.seq.load(Ordering::Acquire);
        if start & 1 == 1 {
            return None;
        }
        let generation = self.generation.load(Ordering::Relaxed);
        for (value, cell) in out.iter_mut().zip(self.values.iter()) {
            *value = f32::from_bits(cell.load(Ordering::Relaxed));
        }
        fence(Ordering::Acquire);
        (self.seq.load(Ordering::Relaxed) == start).then_some(generation)
    }
}

struct Shared {
    slots: [Slot; 2],
    generation: AtomicU64,
    len: usize,
}

impl Shared {
    fn active_slot(generation: u64) -> usize {
        (generation & 1) as usize
    }
}

/// The most recently published batch together with its publish count.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveBatch {
    pub generation: u64,
    pub values: Vec<f32>,
}

/// Create a double buffer holding batches of `len` values.
///
/// Both slots start as all zeros, so readers see a zero batch with
/// generation 0 until the first publish.
pub fn double_buffer(len: usize) -> (BatchPublisher, BatchView) {
    let shared = Arc::new(Shared {
        slots: [Slot::zeroed(len), Slot::zeroed(len)],
        generation: AtomicU64::new(0),
        len,
    });
    (
        BatchPublisher {
            shared: Arc::clone(&shared),
        },
        BatchView { shared },
    )
}

/// Sole writer of a double buffer.
pub struct BatchPublisher {
    shared: Arc<Shared>,
}

impl BatchPublisher {
    /// Write `batch` into the inactive slot, then make it active.
    pub fn publish(&mut self, batch: &[f32]) {
        assert_eq!(
            batch.len(),
            self.shared.len,
            "published batch does not match buffer length"
        );
        let current = self.shared.generation.load(Ordering::Relaxed);
        let next = current.wrapping_add(1);
        self.shared.slots[Shared::active_slot(next)].write(batch, next);
        self.shared.generation.store(next, Ordering::Release);
    }
}

/// Read handle onto the active slot. Cheap to clone and share across threads.
#[derive(Clone)]
pub struct BatchView {
    shared: Arc<Shared>,
}

impl BatchView {
    pub fn len(&self) -> usize {
        self.shared.len
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Copy the active batch into `out` and return its generation.
    ///
    /// `out` must hold exactly `len()` values. Never takes a lock; retries
    /// only if the publisher overwrote the slot during the copy.
    pub fn read_active_into(&self, out: &mut [f32]) -> u64 {
        assert_eq!(out.len(), self.shared.len, "output does not match buffer length");
        loop {
            let generation = self.shared.generation.load(Ordering::Acquire);
            let slot = &self.shared.slots[Shared::active_slot(generation)];
            // The slot's own generation can be newer than `generation` if two
            // publishes landed in between; it always matches the copied data.
            if let Some(copied) = slot.try_read(out) {
                return copied;
            }
            std::hint::spin_loop();
        }
    }

    pub fn active_view(&self) -> ActiveBatch {
        let mut values = vec![0.0; self.shared.len];
        let generation = self.read_active_into(&mut values);
        ActiveBatch { generation, values }
    }
}
