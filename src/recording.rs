//! Capturing and replaying frames.
//!
//! [`FrameRecorder`] is a [`TouchListener`] that copies every frame it sees
//! into memory. [`Recording`] is the owned, serializable result; it is saved
//! as JSON and can be fed back through
//! [`VirtualBackend::replay`](crate::backends::virtual_input::VirtualBackend::replay).
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use openmt::{FrameRecorder, Manager};
//!
//! let recorder = Arc::new(FrameRecorder::new());
//! let id = Manager::shared().add_listener(&recorder).expect("listen");
//! // ... touch the trackpad ...
//! Manager::shared().remove_listener(id);
//! recorder.take().save("session.json").expect("save");
//! ```

use crate::error::Result;
use crate::listener::TouchListener;
use crate::touch::{TouchEvent, TouchSample};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One captured frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub device_id: u64,
    pub frame: i32,
    pub timestamp: f64,
    pub samples: Vec<TouchSample>,
}

impl From<&TouchEvent> for RecordedFrame {
    fn from(ev: &TouchEvent) -> Self {
        Self {
            device_id: ev.device_id,
            frame: ev.frame,
            timestamp: ev.timestamp,
            samples: ev.touches.clone(),
        }
    }
}

/// Ordered list of captured frames.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Seconds between the first and last frame.
    pub fn duration(&self) -> f64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => 0.0,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Listener that captures frames, optionally up to a limit.
#[derive(Default)]
pub struct FrameRecorder {
    frames: Mutex<Vec<RecordedFrame>>,
    limit: Option<usize>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop capturing after `limit` frames.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            limit: Some(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Move everything captured so far into a [`Recording`].
    pub fn take(&self) -> Recording {
        Recording {
            frames: std::mem::take(&mut *self.frames.lock()),
        }
    }
}

impl TouchListener for FrameRecorder {
    fn touches_changed(&self, event: &TouchEvent) {
        let mut frames = self.frames.lock();
        if self.limit.map_or(true, |l| frames.len() < l) {
            frames.push(RecordedFrame::from(event));
        }
    }
}
