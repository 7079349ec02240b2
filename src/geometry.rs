//! Coordinate math for floating windows
//!
//! Everything here is pure. Positions are top-left corners in viewport
//! pixels, with `y` growing downwards.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A point or offset in viewport pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pos {
    pub x: f32,
    pub y: f32,
}

impl Pos {
    pub const ZERO: Pos = Pos { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Pos {
    type Output = Pos;

    fn add(self, rhs: Pos) -> Pos {
        Pos::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Pos {
    type Output = Pos;

    fn sub(self, rhs: Pos) -> Pos {
        Pos::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub w: f32,
    pub h: f32,
}

impl Size {
    pub const fn new(w: f32, h: f32) -> Self {
        Self { w, h }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Pos,
    pub size: Size,
}

impl Rect {
    pub const fn new(origin: Pos, size: Size) -> Self {
        Self { origin, size }
    }

    /// Edges are inclusive
    pub fn contains(&self, p: Pos) -> bool {
        p.x >= self.origin.x
            && p.x <= self.origin.x + self.size.w
            && p.y >= self.origin.y
            && p.y <= self.origin.y + self.size.h
    }
}

/// Constrain `value` to `[min, max]`.
///
/// Returns `min` when the range is inverted (viewport smaller than the
/// window), where `f32::clamp` would panic.
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if max < min {
        return min;
    }
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Pointer travel since the drag started
pub fn compute_delta(current: Pos, drag_start: Pos) -> Pos {
    current - drag_start
}

/// Top-left corner that centers a window, never closer than `min_margin` to
/// the top/left edges
pub fn center_in_viewport(viewport: Size, window: Size, min_margin: f32) -> Pos {
    Pos::new(
        min_margin.max((viewport.w / 2.0 - window.w / 2.0).round()),
        min_margin.max((viewport.h / 2.0 - window.h / 2.0).round()),
    )
}

/// Clamp a window position so `approx` fits inside `viewport` with `margin`
/// on every side, independently per axis
pub fn clamp_position(pos: Pos, viewport: Size, approx: Size, margin: f32) -> Pos {
    Pos::new(
        clamp(pos.x, margin, viewport.w - approx.w - margin),
        clamp(pos.y, margin, viewport.h - approx.h - margin),
    )
}
