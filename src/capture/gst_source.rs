use super::source::FrameSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use log::{debug, info, warn};
use std::time::Duration;

/// How long `open` waits for the pipeline to reach PLAYING
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// GStreamer-backed camera / stream reader.
///
/// The pipeline ends in an appsink that keeps a single buffer and drops older
/// ones, so a slow reader always gets the newest frame.
pub struct GstFrameSource {
    read_timeout: Duration,
    active: Option<ActivePipeline>,
}

struct ActivePipeline {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

impl GstFrameSource {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            active: None,
        }
    }

    fn build(device: &str, width: u32, height: u32) -> Result<ActivePipeline> {
        gst::init().map_err(|e| {
            Error::DeviceUnavailable(format!("Failed to initialize GStreamer: {}", e))
        })?;

        let pipeline_str = launch_line(device, width, height);
        debug!("Creating pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| Error::DeviceUnavailable(format!("Invalid source {}: {}", device, e)))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| Error::DeviceUnavailable("Launch line is not a pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| Error::DeviceUnavailable("Could not find appsink element".to_string()))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| Error::DeviceUnavailable("Element is not an AppSink".to_string()))?;

        Ok(ActivePipeline { pipeline, appsink })
    }
}

impl Default for GstFrameSource {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl FrameSource for GstFrameSource {
    async fn open(&mut self, device: &str, width: u32, height: u32) -> Result<()> {
        if self.active.is_some() {
            self.close().await;
        }

        let device = device.to_string();
        let active = tokio::task::spawn_blocking(move || {
            let active = Self::build(&device, width, height)?;

            if let Err(e) = active.pipeline.set_state(gst::State::Playing) {
                let _ = active.pipeline.set_state(gst::State::Null);
                return Err(Error::DeviceUnavailable(format!(
                    "Failed to start {}: {}",
                    device, e
                )));
            }

            let timeout = gst::ClockTime::from_mseconds(OPEN_TIMEOUT.as_millis() as u64);
            let (result, _, _) = active.pipeline.state(timeout);
            if let Err(e) = result {
                let _ = active.pipeline.set_state(gst::State::Null);
                return Err(Error::DeviceUnavailable(format!(
                    "{} did not start playing: {}",
                    device, e
                )));
            }

            info!("Opened video source {} at {}x{}", device, width, height);
            Ok(active)
        })
        .await
        .map_err(|e| Error::DeviceUnavailable(format!("Source open task failed: {}", e)))??;

        self.active = Some(active);
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<RgbImage> {
        let appsink = self
            .active
            .as_ref()
            .map(|active| active.appsink.clone())
            .ok_or_else(|| Error::ReadFailed("Source is not open".to_string()))?;
        let timeout = gst::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);

        tokio::task::spawn_blocking(move || match appsink.try_pull_sample(timeout) {
            Some(sample) => sample_to_image(&sample),
            None if appsink.is_eos() => Err(Error::ReadFailed("End of stream".to_string())),
            None => Err(Error::ReadFailed("Timed out waiting for a frame".to_string())),
        })
        .await
        .map_err(|e| Error::ReadFailed(format!("Frame read task failed: {}", e)))?
    }

    async fn close(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.pipeline.set_state(gst::State::Null) {
                warn!("Failed to stop video pipeline: {}", e);
            }
            info!("Closed video source");
        }
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.pipeline.set_state(gst::State::Null);
        }
    }
}

/// GStreamer launch line for a device string.
///
/// `"0"` or `/dev/videoN` is a V4L2 camera, `rtsp://` an RTSP stream,
/// `test` / `test:N` a test pattern; anything else is handed to uridecodebin.
pub fn launch_line(device: &str, width: u32, height: u32) -> String {
    let source = if let Ok(index) = device.parse::<u32>() {
        format!("v4l2src device=/dev/video{}", index)
    } else if device.starts_with("/dev/video") {
        format!("v4l2src device={}", device)
    } else if device.starts_with("rtsp://") {
        format!("rtspsrc location={} latency=200 ! decodebin", device)
    } else if device == "test" {
        "videotestsrc is-live=true".to_string()
    } else if let Some(pattern) = device.strip_prefix("test:") {
        format!(
            "videotestsrc is-live=true pattern={}",
            pattern.parse::<u32>().unwrap_or(0)
        )
    } else {
        format!("uridecodebin uri={}", device)
    };

    format!(
        "{} ! videoconvert ! videoscale ! video/x-raw,format=RGB,width={},height={} ! \
         appsink name=sink max-buffers=1 drop=true sync=false",
        source, width, height
    )
}

fn sample_to_image(sample: &gst::Sample) -> Result<RgbImage> {
    let caps = sample
        .caps()
        .ok_or_else(|| Error::ReadFailed("Sample has no caps".to_string()))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| Error::ReadFailed(format!("Unsupported caps: {}", e)))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| Error::ReadFailed("No buffer in sample".to_string()))?;
    let map = buffer
        .map_readable()
        .map_err(|e| Error::ReadFailed(format!("Failed to map buffer: {}", e)))?;

    let stride = info.stride()[0].max(0) as usize;
    let pixels = copy_rows(map.as_slice(), info.width(), info.height(), stride)
        .ok_or_else(|| Error::ReadFailed("Truncated RGB buffer".to_string()))?;

    RgbImage::from_raw(info.width(), info.height(), pixels)
        .ok_or_else(|| Error::ReadFailed("Frame size mismatch".to_string()))
}

/// Pack padded RGB rows into a tight `width * 3` row layout
fn copy_rows(data: &[u8], width: u32, height: u32, stride: usize) -> Option<Vec<u8>> {
    let row_bytes = width as usize * 3;
    let height = height as usize;

    if height == 0 || row_bytes == 0 {
        return Some(Vec::new());
    }
    if stride < row_bytes || data.len() < stride * (height - 1) + row_bytes {
        return None;
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in data.chunks(stride).take(height) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    Some(pixels)
}
