//! Per-priority admission queues.
//!
//! Each priority owns its own FIFO semaphore (concurrency cap) and rate window
//! (N admissions per interval), so a flood in one class never consumes
//! another class's capacity.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use switchyard_config::QueueLimits;
use switchyard_utils::Priority;
use tokio::sync::{Semaphore, SemaphorePermit, watch};
use tokio::time::Instant;

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Tasks waiting for admission.
    pub size: usize,
    /// Tasks admitted and still running.
    pub pending: usize,
    pub paused: bool,
}

/// Sliding window of recent admission times.
#[derive(Debug)]
struct RateWindow {
    cap: usize,
    interval: std::time::Duration,
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    /// Wait until another admission fits in the window, then record it.
    async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            while self
                .admitted
                .front()
                .is_some_and(|at| now.duration_since(*at) >= self.interval)
            {
                self.admitted.pop_front();
            }
            if self.admitted.len() < self.cap {
                self.admitted.push_back(now);
                return;
            }
            if let Some(oldest) = self.admitted.front().copied() {
                tokio::time::sleep_until(oldest + self.interval).await;
            }
        }
    }
}

#[derive(Debug)]
pub struct PriorityQueue {
    priority: Priority,
    limits: QueueLimits,
    semaphore: Semaphore,
    rate: tokio::sync::Mutex<RateWindow>,
    paused: watch::Sender<bool>,
    closed: AtomicBool,
    waiting: AtomicUsize,
    running: AtomicUsize,
}

/// Holds one concurrency slot; released on drop.
#[derive(Debug)]
pub struct Admission<'a> {
    queue: &'a PriorityQueue,
    _permit: SemaphorePermit<'a>,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.queue.running.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Waiting<'a>(&'a AtomicUsize);

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PriorityQueue {
    #[must_use]
    pub fn new(priority: Priority, limits: QueueLimits) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            priority,
            limits,
            semaphore: Semaphore::new(limits.concurrency.max(1)),
            rate: tokio::sync::Mutex::new(RateWindow {
                cap: (limits.interval_cap as usize).max(1),
                interval: limits.interval,
                admitted: VecDeque::new(),
            }),
            paused,
            closed: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn limits(&self) -> QueueLimits {
        self.limits
    }

    /// Wait for a slot: FIFO on the concurrency cap, then the pause gate,
    /// then the rate window.
    pub async fn admit(&self) -> Result<Admission<'_>, DispatchError> {
        self.waiting.fetch_add(1, Ordering::AcqRel);
        let waiting = Waiting(&self.waiting);

        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| DispatchError::Shutdown)?;

        let mut paused = self.paused.subscribe();
        if paused.wait_for(|p| !*p).await.is_err() || self.is_closed() {
            return Err(DispatchError::Shutdown);
        }

        self.rate.lock().await.acquire().await;
        if self.is_closed() {
            return Err(DispatchError::Shutdown);
        }

        drop(waiting);
        self.running.fetch_add(1, Ordering::AcqRel);
        Ok(Admission {
            queue: self,
            _permit: permit,
        })
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
        tracing::info!(priority = %self.priority, "queue paused");
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
        tracing::info!(priority = %self.priority, "queue resumed");
    }

    /// Drop every waiting task with [`DispatchError::Shutdown`]. Admitted
    /// tasks keep their slots until they finish.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
        // Wake anything parked on the pause gate so it observes the close.
        self.paused.send_replace(false);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            size: self.waiting.load(Ordering::Acquire),
            pending: self.running.load(Ordering::Acquire),
            paused: *self.paused.borrow(),
        }
    }
}
