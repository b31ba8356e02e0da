use std::time::Instant;

use crate::{
    pacing::FpsMeter,
    record::{RecordConfig, RecordingSummary},
    Frame, FrameSink, FrameSource, Result,
};

/// Consumer of preview frames, e.g. a window or a headless status view.
pub trait DisplaySurface {
    fn present(&mut self, frame: &Frame);
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplaySurface for NullDisplay {
    fn present(&mut self, _frame: &Frame) {}
}

/// One preview tick: pull a frame, show it, record it while armed.
#[derive(Debug)]
pub struct PreviewPipeline {
    source: FrameSource,
    sink: FrameSink,
    frame_index: u64,
    meter: FpsMeter,
}

impl PreviewPipeline {
    pub fn new(source: FrameSource, sink: FrameSink) -> Self {
        Self {
            source,
            sink,
            frame_index: 0,
            meter: FpsMeter::new(Instant::now()),
        }
    }

    /// Runs one tick and returns the index assigned to its frame.
    pub fn tick(&mut self, display: &mut dyn DisplaySurface) -> u64 {
        let frame = self.source.next_frame();
        display.present(&frame);

        let index = self.frame_index;
        self.sink.write(&frame, index);

        self.frame_index += 1;
        self.meter.record(Instant::now());
        index
    }

    /// Arms the sink using the size of a freshly produced frame, so the
    /// session matches what the next ticks deliver.
    pub fn start_recording(&mut self, config: &RecordConfig) -> Result<()> {
        let probe = self.source.next_frame();
        self.sink.start(config, probe.size())
    }

    pub fn stop_recording(&mut self) -> Option<RecordingSummary> {
        self.sink.stop()
    }

    pub fn is_recording(&self) -> bool {
        self.sink.is_armed()
    }

    /// Index the next tick will use.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn fps(&self) -> f64 {
        self.meter.fps()
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn sink(&self) -> &FrameSink {
        &self.sink
    }

    /// Stops any recording and releases the capture device.
    pub fn shutdown(&mut self) -> Option<RecordingSummary> {
        let summary = self.sink.stop();
        self.source.close();
        summary
    }
}
