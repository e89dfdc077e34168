//! Cache for stop notifications that arrive while a synchronous reply is awaited.
//!
//! In non-stop mode the stub multiplexes replies and `%Stop` notifications over one
//! stream, so a syscall stop can show up between a request and its reply. Such stops
//! are queued here and replayed, in arrival order, by the next event poll.

use std::collections::VecDeque;

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::packet::Packet;

pub const DEFAULT_CAPACITY: usize = 32;

/// Bounded FIFO of cached syscall stop packets.
#[derive(Debug)]
pub struct NotificationQueue {
    packets: VecDeque<Packet>,
    capacity: usize,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NotificationQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let packets = VecDeque::with_capacity(capacity);
        Self { packets, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raise the capacity by `additional` entries.
    ///
    /// This is the only way the queue grows.
    pub fn grow(&mut self, additional: usize) {
        self.capacity += additional;
        self.packets.reserve(additional);
    }

    /// Queue a syscall stop notification.
    ///
    /// Returns `Ok(false)` if the packet is not a syscall stop, in which case it is
    /// discarded. Fails with [`Error::QueueFull`] if there is no room, leaving the queue
    /// unchanged; the stub resends notifications we have not acknowledged.
    pub fn push(&mut self, packet: Packet) -> Result<bool> {
        if !packet.is_syscall_stop() {
            trace!(?packet, "discarding non-syscall notification");
            return Ok(false);
        }

        if self.packets.len() >= self.capacity {
            warn!(?packet, capacity = self.capacity, "notification queue full, dropping");
            return Err(Error::QueueFull);
        }

        trace!(?packet, pending = self.packets.len() + 1, "queued notification");
        self.packets.push_back(packet);

        Ok(true)
    }

    pub fn pop(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.packets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
