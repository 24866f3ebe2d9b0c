//! Host map engine collaborator.
//!
//! The host owns projection and drawing. Once per frame the tracker pulls
//! the camera from it and pushes back the polygons to draw.

use crate::render::RenderFrame;
use crate::viewport::CameraState;

pub trait MapHost: Send {
    /// Current camera, or `None` while the map is not ready to draw
    fn camera(&mut self) -> Option<CameraState>;

    /// Replace the drawn vehicles with this frame's footprints
    fn present(&mut self, frame: RenderFrame);
}

/// Headless host with a fixed camera that keeps the latest frame
#[derive(Clone, Debug)]
pub struct RecordingHost {
    camera: Option<CameraState>,
    presented: usize,
    last: Option<RenderFrame>,
}

impl RecordingHost {
    pub fn new(camera: CameraState) -> Self {
        Self {
            camera: Some(camera),
            presented: 0,
            last: None,
        }
    }

    /// A host whose map never becomes ready
    pub fn detached() -> Self {
        Self {
            camera: None,
            presented: 0,
            last: None,
        }
    }

    pub fn presented(&self) -> usize {
        self.presented
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.last.as_ref()
    }
}

impl MapHost for RecordingHost {
    fn camera(&mut self) -> Option<CameraState> {
        self.camera
    }

    fn present(&mut self, frame: RenderFrame) {
        self.presented += 1;
        self.last = Some(frame);
    }
}
