// Bounded FIFO between the receive loop and the processing loop.
// Push never waits; on overflow one event is dropped according to OverflowPolicy.

use crate::models::DockerEvent;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Which event to discard when the inbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the incoming event; queued events are kept in order.
    #[default]
    DropNewest,
    /// Evict the oldest queued event and queue the incoming one.
    DropOldest,
}

#[derive(Debug, PartialEq)]
pub enum Pushed {
    Queued,
    /// The event that was discarded (the incoming one or the evicted head).
    Dropped(DockerEvent),
    /// Inbox already closed; the event was not queued.
    Closed(DockerEvent),
}

pub struct Inbox {
    queue: Mutex<VecDeque<DockerEvent>>,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
    notify: Notify,
}

impl Inbox {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DockerEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: DockerEvent) -> Pushed {
        if self.is_closed() {
            return Pushed::Closed(event);
        }
        let pushed = {
            let mut q = self.lock();
            if q.len() < self.capacity {
                q.push_back(event);
                Pushed::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropNewest => Pushed::Dropped(event),
                    OverflowPolicy::DropOldest => {
                        let evicted = q.pop_front();
                        q.push_back(event);
                        match evicted {
                            Some(e) => Pushed::Dropped(e),
                            None => Pushed::Queued,
                        }
                    }
                }
            }
        };
        if matches!(pushed, Pushed::Queued) || self.policy == OverflowPolicy::DropOldest {
            self.notify.notify_one();
        }
        pushed
    }

    /// Next event in arrival order. After `close`, drains what is left and then returns None.
    pub async fn pop(&self) -> Option<DockerEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut q = self.lock();
                if let Some(event) = q.pop_front() {
                    return Some(event);
                }
                if self.is_closed() {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}
