use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use super::capture::{Artifact, CaptureRequest, CaptureSource, WEBM_MIME_TYPE};
use crate::config::parse_var;
use crate::error::{CaptureError, Result};

const DEFAULT_VIDEO_SOURCE: &str = "ximagesrc";
const DEFAULT_AUDIO_SOURCE: &str = "pulsesrc";
const DEFAULT_FINALIZE_TIMEOUT_SECS: u64 = 10;
const PREROLL_TIMEOUT_SECS: u64 = 5;

/// GStreamer element names used to build the capture pipeline.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub video_source: String,
    pub audio_source: String,
    pub microphone: bool,
    pub finalize_timeout_secs: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            video_source: DEFAULT_VIDEO_SOURCE.to_string(),
            audio_source: DEFAULT_AUDIO_SOURCE.to_string(),
            microphone: true,
            finalize_timeout_secs: DEFAULT_FINALIZE_TIMEOUT_SECS,
        }
    }
}

impl CaptureSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            video_source: std::env::var("CAPTURE_VIDEO_SOURCE").unwrap_or(defaults.video_source),
            audio_source: std::env::var("CAPTURE_AUDIO_SOURCE").unwrap_or(defaults.audio_source),
            microphone: parse_var("CAPTURE_MICROPHONE", defaults.microphone)?,
            finalize_timeout_secs: parse_var(
                "CAPTURE_FINALIZE_TIMEOUT_SECS",
                defaults.finalize_timeout_secs,
            )?,
        })
    }

    pub fn request(&self) -> CaptureRequest {
        CaptureRequest {
            screen: true,
            microphone: self.microphone,
        }
    }
}

struct ActivePipeline {
    pipeline: gst::Pipeline,
    chunks: Arc<Mutex<Vec<u8>>>,
}

/// Screen + microphone capture encoded to WebM (VP8/Opus) through GStreamer.
pub struct ScreenCapture {
    settings: CaptureSettings,
    active: Option<ActivePipeline>,
}

impl ScreenCapture {
    pub fn new(settings: CaptureSettings) -> Result<Self> {
        gst::init().map_err(|e| CaptureError::platform(format!("GStreamer init failed: {}", e)))?;

        Ok(Self {
            settings,
            active: None,
        })
    }

    fn build(&self, request: &CaptureRequest) -> Result<ActivePipeline> {
        let pipeline = gst::Pipeline::new();
        let chunks = Arc::new(Mutex::new(Vec::new()));

        let webmmux = make("webmmux")?;
        webmmux.set_property("streamable", true);

        let sink = gst_app::AppSink::builder().sync(false).build();
        let sink_chunks = chunks.clone();
        sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    let mut chunks = sink_chunks.lock().map_err(|_| gst::FlowError::Error)?;
                    chunks.extend_from_slice(map.as_slice());
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .add_many([&webmmux, sink.upcast_ref()])
            .map_err(|e| CaptureError::platform(format!("Failed to add muxer: {}", e)))?;
        webmmux
            .link(&sink)
            .map_err(|e| CaptureError::platform(format!("Failed to link mux to sink: {}", e)))?;

        // Video branch: screen source -> videoconvert -> vp8enc -> webmmux
        if request.screen {
            let source = make(&self.settings.video_source)?;
            let videoconvert = make("videoconvert")?;
            let queue = make("queue")?;
            let vp8enc = gst::ElementFactory::make("vp8enc")
                .property("deadline", 1i64)
                .property("cpu-used", 4i32)
                .build()
                .map_err(|e| CaptureError::platform(format!("Failed to create vp8enc: {}", e)))?;

            pipeline
                .add_many([&source, &videoconvert, &queue, &vp8enc])
                .map_err(|e| CaptureError::platform(format!("Failed to add video elements: {}", e)))?;
            gst::Element::link_many([&source, &videoconvert, &queue, &vp8enc])
                .map_err(|e| CaptureError::platform(format!("Failed to link video elements: {}", e)))?;
            link_to_mux(&vp8enc, &webmmux, "video_%u")?;
        }

        // Audio branch: microphone -> audioconvert -> audioresample -> opusenc -> webmmux
        if request.microphone {
            let source = make(&self.settings.audio_source)?;
            let audioconvert = make("audioconvert")?;
            let audioresample = make("audioresample")?;
            let queue = make("queue")?;
            let opusenc = make("opusenc")?;

            pipeline
                .add_many([&source, &audioconvert, &audioresample, &queue, &opusenc])
                .map_err(|e| CaptureError::platform(format!("Failed to add audio elements: {}", e)))?;
            gst::Element::link_many([&source, &audioconvert, &audioresample, &queue, &opusenc])
                .map_err(|e| CaptureError::platform(format!("Failed to link audio elements: {}", e)))?;
            link_to_mux(&opusenc, &webmmux, "audio_%u")?;
        }

        Ok(ActivePipeline { pipeline, chunks })
    }
}

impl CaptureSource for ScreenCapture {
    fn open(&mut self, request: CaptureRequest) -> BoxFuture<'_, Result<()>> {
        async move {
            self.release();

            let active = self.build(&request)?;
            let pipeline = active.pipeline.clone();

            tokio::task::spawn_blocking(move || start_pipeline(&pipeline))
                .await
                .map_err(|e| CaptureError::internal(format!("Capture start task failed: {}", e)))??;

            tracing::info!(
                video_source = %self.settings.video_source,
                microphone = request.microphone,
                "Capture pipeline playing"
            );
            self.active = Some(active);
            Ok(())
        }
        .boxed()
    }

    fn pause(&mut self) -> Result<()> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| CaptureError::platform("No capture pipeline to pause"))?;
        active
            .pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| CaptureError::platform(format!("Failed to pause pipeline: {}", e)))?;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| CaptureError::platform("No capture pipeline to resume"))?;
        active
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::platform(format!("Failed to resume pipeline: {}", e)))?;
        Ok(())
    }

    fn finish(&mut self) -> BoxFuture<'_, Result<Artifact>> {
        async move {
            let active = self
                .active
                .take()
                .ok_or_else(|| CaptureError::platform("No capture pipeline to finish"))?;
            let pipeline = active.pipeline.clone();
            let timeout = self.settings.finalize_timeout_secs;

            let drained = tokio::task::spawn_blocking(move || drain_pipeline(&pipeline, timeout))
                .await
                .map_err(|e| CaptureError::internal(format!("Capture finish task failed: {}", e)));

            let _ = active.pipeline.set_state(gst::State::Null);
            drained??;

            let data = active
                .chunks
                .lock()
                .map(|mut chunks| std::mem::take(&mut *chunks))
                .map_err(|_| CaptureError::internal("Capture buffer lock poisoned"))?;
            if data.is_empty() {
                return Err(CaptureError::platform("Encoder produced no data"));
            }

            tracing::info!(bytes = data.len(), "Capture pipeline finalized");
            Ok(Artifact::new(Bytes::from(data), WEBM_MIME_TYPE))
        }
        .boxed()
    }

    fn release(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.pipeline.set_state(gst::State::Null) {
                tracing::warn!(error = %e, "Failed to release capture pipeline");
            } else {
                tracing::debug!("Capture devices released");
            }
        }
    }
}

impl Drop for ScreenCapture {
    fn drop(&mut self) {
        self.release();
    }
}

fn make(factory: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| CaptureError::platform(format!("Failed to create {}: {}", factory, e)))
}

fn link_to_mux(encoder: &gst::Element, mux: &gst::Element, template: &str) -> Result<()> {
    let mux_pad = mux
        .request_pad_simple(template)
        .ok_or_else(|| CaptureError::platform(format!("Failed to get mux pad {}", template)))?;
    let src_pad = encoder
        .static_pad("src")
        .ok_or_else(|| CaptureError::platform("Failed to get encoder src pad"))?;
    src_pad
        .link(&mux_pad)
        .map_err(|e| CaptureError::platform(format!("Failed to link encoder to mux: {}", e)))?;
    Ok(())
}

/// Sets the pipeline playing and waits for the sources to come up.
fn start_pipeline(pipeline: &gst::Pipeline) -> Result<()> {
    let started = pipeline.set_state(gst::State::Playing);
    let (settled, _, _) = pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));

    if let Some(err) = pop_bus_error(pipeline) {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(err);
    }

    if let Err(e) = started.and(settled) {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(CaptureError::platform(format!("Failed to start pipeline: {}", e)));
    }
    Ok(())
}

/// Pushes EOS through the pipeline and waits for the muxer to flush.
fn drain_pipeline(pipeline: &gst::Pipeline, timeout_secs: u64) -> Result<()> {
    // A paused pipeline will not carry EOS to the sink.
    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| CaptureError::platform(format!("Failed to resume for finalize: {}", e)))?;
    pipeline.send_event(gst::event::Eos::new());

    let bus = pipeline
        .bus()
        .ok_or_else(|| CaptureError::internal("Pipeline has no bus"))?;
    for msg in bus.iter_timed(gst::ClockTime::from_seconds(timeout_secs)) {
        match msg.view() {
            gst::MessageView::Eos(_) => return Ok(()),
            gst::MessageView::Error(err) => return Err(classify(err.error())),
            _ => {}
        }
    }

    Err(CaptureError::platform(format!(
        "Encoder did not finalize within {}s",
        timeout_secs
    )))
}

fn pop_bus_error(pipeline: &gst::Pipeline) -> Option<CaptureError> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
        gst::MessageView::Error(err) => {
            tracing::warn!(
                source = ?err.src().map(|s| s.path_string()),
                debug = ?err.debug(),
                "Capture source reported an error"
            );
            Some(classify(err.error()))
        }
        _ => None,
    }
}

/// Device refusals become `PermissionDenied`; everything else is a platform failure.
fn classify(error: gst::glib::Error) -> CaptureError {
    if error.matches(gst::ResourceError::NotAuthorized)
        || error.matches(gst::ResourceError::OpenRead)
        || error.matches(gst::ResourceError::OpenReadWrite)
    {
        CaptureError::PermissionDenied(error.to_string())
    } else {
        CaptureError::platform(error.to_string())
    }
}
