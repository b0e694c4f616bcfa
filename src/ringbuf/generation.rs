//! Fixed-slot ring addressed by publish generation
//!
//! Record `g` (the `g`-th publish, counting from 0) lives in slot
//! `g % queue_size`. The writer never waits: publishing record `g` simply
//! overwrites record `g - queue_size`. Readers carry their own cursor and
//! work out which records are still retained with [`GenerationRing::plan_read`].
//!
//! The ring itself is not synchronized; it is owned by a topic node and only
//! touched under that node's lock.

use crate::error::{OrbError, Result};

/// Where a reader's next copy comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPlan {
    /// Generation of the record to read
    pub generation: u64,
    /// Records skipped because they were overwritten
    pub lost: u64,
}

/// Ring of `queue_size` fixed-size slots
#[derive(Debug)]
pub struct GenerationRing {
    payload_size: usize,
    queue_size: u32,
    data: Box<[u8]>,
    timestamps: Box<[u64]>,
}

impl GenerationRing {
    /// Allocate a ring of `queue_size` slots of `payload_size` bytes each
    pub fn new(queue_size: u32, payload_size: usize) -> Result<Self> {
        if queue_size == 0 {
            return Err(OrbError::invalid_parameter(
                "queue_size",
                "Queue size must be greater than 0",
            ));
        }
        if payload_size == 0 {
            return Err(OrbError::invalid_parameter(
                "payload_size",
                "Payload size must be greater than 0",
            ));
        }

        let len = (queue_size as usize)
            .checked_mul(payload_size)
            .ok_or_else(|| OrbError::invalid_parameter("queue_size", "Ring too large"))?;

        Ok(Self {
            payload_size,
            queue_size,
            data: vec![0u8; len].into_boxed_slice(),
            timestamps: vec![0u64; queue_size as usize].into_boxed_slice(),
        })
    }

    /// Number of slots
    pub fn queue_size(&self) -> u32 {
        self.queue_size
    }

    /// Bytes per slot
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    fn slot(&self, generation: u64) -> usize {
        (generation % self.queue_size as u64) as usize
    }

    /// Store record `generation`, overwriting whatever the slot held
    pub fn write(&mut self, generation: u64, payload: &[u8], timestamp: u64) {
        debug_assert_eq!(payload.len(), self.payload_size);
        let slot = self.slot(generation);
        let start = slot * self.payload_size;
        self.data[start..start + self.payload_size].copy_from_slice(payload);
        self.timestamps[slot] = timestamp;
    }

    /// Copy record `generation` into `out`, returning its timestamp.
    ///
    /// The caller must have checked retention through [`Self::plan_read`].
    pub fn read(&self, generation: u64, out: &mut [u8]) -> u64 {
        let slot = self.slot(generation);
        let start = slot * self.payload_size;
        out[..self.payload_size].copy_from_slice(&self.data[start..start + self.payload_size]);
        self.timestamps[slot]
    }

    /// Oldest generation still retained when `head` records were published
    pub fn oldest_retained(&self, head: u64) -> u64 {
        head.saturating_sub(self.queue_size as u64)
    }

    /// Decide which record a reader at `cursor` gets next.
    ///
    /// Returns `None` when the reader is caught up with `head`.
    pub fn plan_read(&self, cursor: u64, head: u64) -> Option<ReadPlan> {
        if cursor >= head {
            return None;
        }

        let oldest = self.oldest_retained(head);
        let generation = cursor.max(oldest);
        Some(ReadPlan {
            generation,
            lost: generation - cursor,
        })
    }
}
