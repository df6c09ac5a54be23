use crate::error::Result;
use async_trait::async_trait;
use image::RgbImage;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// A camera or stream that yields RGB frames on demand
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the device. Fails with `Error::DeviceUnavailable`.
    async fn open(&mut self, device: &str, width: u32, height: u32) -> Result<()>;

    /// Read the next frame. Fails with `Error::ReadFailed`; a failed read is not
    /// fatal and the next call may succeed.
    async fn read_frame(&mut self) -> Result<RgbImage>;

    /// Release the device. Safe to call when not open.
    async fn close(&mut self);
}

/// Coarse health of the capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealth {
    Healthy,
    /// At least `max_consecutive_read_failures` reads in a row have failed
    Degraded,
}

/// Counts consecutive read failures and flips the stream health
#[derive(Debug)]
pub struct HealthMonitor {
    consecutive_failures: AtomicU32,
    degraded: AtomicBool,
    threshold: u32,
}

impl HealthMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            degraded: AtomicBool::new(false),
            threshold: threshold.max(1),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("Frame source recovered");
        }
    }

    pub fn record_failure(&self) {
        let failures = self
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);

        if failures >= self.threshold && !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(
                "Frame source degraded: {} consecutive read failures",
                failures
            );
        }
    }

    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.degraded.store(false, Ordering::Relaxed);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> StreamHealth {
        if self.degraded.load(Ordering::Relaxed) {
            StreamHealth::Degraded
        } else {
            StreamHealth::Healthy
        }
    }
}
