//! Touch samples and frames.
//!
//! A backend reports one *frame* per hardware scan: every contact currently
//! on the surface as a [`TouchSample`], plus a timestamp and a frame counter.
//! openmt does not interpret samples. It only moves them from the backend to
//! listeners, either as a borrowed [`RawFrame`] or as an owned [`TouchEvent`].
//!
//! ## Value conventions
//! - Positions and velocities are normalized to the device surface
//!   (`0.0..=1.0`, origin bottom-left) when the backend can normalize.
//! - `timestamp` is seconds on the backend's monotonic clock. It is only
//!   meaningful relative to other frames of the same device.
//! - `frame` increases monotonically per device. Nothing is promised across
//!   devices.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a single contact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TouchState {
    #[default]
    NotTouching,
    Starting,
    Hovering,
    Making,
    Touching,
    Breaking,
    Lingering,
    Leaving,
}

impl TouchState {
    /// Maps the hardware's numeric phase code. Unknown codes read as
    /// `NotTouching`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            1 => Self::Starting,
            2 => Self::Hovering,
            3 => Self::Making,
            4 => Self::Touching,
            5 => Self::Breaking,
            6 => Self::Lingering,
            7 => Self::Leaving,
            _ => Self::NotTouching,
        }
    }

    /// `true` while the contact is in firm contact with the surface.
    pub fn is_down(self) -> bool {
        matches!(self, Self::Making | Self::Touching)
    }
}

/// Two-component vector used for positions and velocities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One contact within a frame, as supplied by the hardware layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchSample {
    /// Contact identifier. Stable for the lifetime of one contact.
    pub identifier: i32,
    pub state: TouchState,
    pub position: Vector2,
    pub velocity: Vector2,
    /// Contact area / capacitance total.
    pub total: f32,
    pub pressure: f32,
    /// Ellipse fit of the contact: `x` = major axis, `y` = minor axis.
    pub axis: Vector2,
    /// Ellipse orientation in radians.
    pub angle: f32,
    pub density: f32,
}

/// Borrowed view of one hardware frame, handed to raw listeners.
///
/// Lives only for the duration of a dispatch; copy out what you need.
#[derive(Clone, Copy, Debug)]
pub struct RawFrame<'a> {
    pub samples: &'a [TouchSample],
    pub timestamp: f64,
    pub frame: i32,
    pub device_id: u64,
}

impl RawFrame<'_> {
    /// Number of contacts in this frame.
    #[inline]
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Copy into an owned event.
    pub fn to_event(&self) -> TouchEvent {
        TouchEvent {
            device_id: self.device_id,
            frame: self.frame,
            timestamp: self.timestamp,
            touches: self.samples.to_vec(),
        }
    }
}

/// Owned "touches changed" notification handed to structured listeners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub device_id: u64,
    pub frame: i32,
    pub timestamp: f64,
    pub touches: Vec<TouchSample>,
}
