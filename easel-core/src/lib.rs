//! # easel-core — Scene model for Easel
//!
//! The locally owned side of collaborative editing: drawable objects, their
//! replicated wire mapping, and the scene store that owns them.
//!
//! ## Modules
//!
//! - [`object`] — `DrawableObject`, closed `Shape` variants, typed JSON mapping
//! - [`geometry`] — derived bounds and control handles (never replicated)
//! - [`canvas`] — canvas-level settings
//! - [`registry`] — id ↔ handle identity table
//! - [`scene`] — `SceneStore`, the only path that mutates the scene
//! - [`origin`] — transaction origin tags

use serde::{Deserialize, Serialize};

pub mod canvas;
pub mod geometry;
pub mod object;
pub mod origin;
pub mod registry;
pub mod scene;

pub use canvas::{CanvasSetting, CanvasSettings};
pub use geometry::DerivedGeometry;
pub use object::{
    BaseProps, DecodeError, DrawableObject, EllipseProps, GroupProps, ImageProps, ObjectId,
    ObjectKind, ObjectProps, PathCommand, PathProps, RectangleProps, Shape, TextProps, Transient,
};
pub use origin::TxOrigin;
pub use registry::{IdentityRegistry, ObjectHandle};
pub use scene::{
    EditPhase, InvariantViolation, SceneChange, SceneError, SceneEvent, SceneSnapshot, SceneStore,
    Upsert,
};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rotate about the origin by `radians`, clockwise in screen space.
    pub fn rotated(self, radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    pub fn offset(self, by: Point) -> Self {
        Self {
            x: self.x + by.x,
            y: self.y + by.y,
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Smallest rect containing every point. `None` for an empty slice.
    pub fn enclosing(points: &[Point]) -> Option<Rect> {
        let first = points.first()?;
        let (mut min, mut max) = (*first, *first);
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some(Rect {
            x: min.x,
            y: min.y,
            width: max.x - min.x,
            height: max.y - min.y,
        })
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x <= self.x + self.width && p.y <= self.y + self.height
    }
}
