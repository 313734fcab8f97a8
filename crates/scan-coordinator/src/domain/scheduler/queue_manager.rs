//! Queue management for the scan scheduler

use std::collections::VecDeque;

use api_types::Image;

/// The two FIFO work queues an image can wait in.
///
/// An image sits in at most one of them, at most once. The scheduler keeps
/// that invariant by only pushing images whose status transition succeeded.
#[derive(Debug, Default)]
pub struct QueueManager {
    hub_check_queue: VecDeque<Image>,
    scan_queue: VecDeque<Image>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    HubCheck,
    Scan,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, queue: QueueType) -> &VecDeque<Image> {
        match queue {
            QueueType::HubCheck => &self.hub_check_queue,
            QueueType::Scan => &self.scan_queue,
        }
    }

    fn queue_mut(&mut self, queue: QueueType) -> &mut VecDeque<Image> {
        match queue {
            QueueType::HubCheck => &mut self.hub_check_queue,
            QueueType::Scan => &mut self.scan_queue,
        }
    }

    /// Append an image at the tail of a queue
    pub fn push(&mut self, queue: QueueType, image: Image) {
        self.queue_mut(queue).push_back(image);
    }

    /// Head of a queue without removing it
    pub fn front(&self, queue: QueueType) -> Option<&Image> {
        self.queue(queue).front()
    }

    /// Remove and return the head of a queue
    pub fn pop(&mut self, queue: QueueType) -> Option<Image> {
        self.queue_mut(queue).pop_front()
    }

    pub fn len(&self, queue: QueueType) -> usize {
        self.queue(queue).len()
    }

    pub fn is_empty(&self, queue: QueueType) -> bool {
        self.queue(queue).is_empty()
    }

    /// Images in a queue, head first
    pub fn images(&self, queue: QueueType) -> impl Iterator<Item = &Image> {
        self.queue(queue).iter()
    }

    /// Which queue, if any, holds the image
    pub fn membership(&self, sha: &str) -> Option<QueueType> {
        [QueueType::HubCheck, QueueType::Scan]
            .into_iter()
            .find(|queue| self.queue(*queue).iter().any(|image| image.sha == sha))
    }
}
