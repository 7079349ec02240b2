//! Per-window drag state machine.
//!
//! ```text
//! Idle ──(primary press on title bar)──► Dragging
//!   ▲                                       │ move: origin + (pointer - start), clamped
//!   └────────(pointer up / cancel)──────────┘
//! ```
//!
//! A session captures the pointer that started it; moves and releases from
//! other pointers are ignored until the captured one lets go.

use crate::geometry::{clamp_position, compute_delta, Pos, Size};
use serde::{Deserialize, Serialize};

/// Pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// What happened to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerEventKind {
    Down(PointerButton),
    Move,
    Up,
    Cancel,
}

/// A pointer event in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub pointer_id: u64,
    pub pos: Pos,
    pub kind: PointerEventKind,
}

impl PointerEvent {
    /// Mouse pointer id used by the single-pointer constructors.
    pub const MOUSE: u64 = 1;

    pub fn down(x: f32, y: f32) -> Self {
        Self::down_with(PointerButton::Primary, x, y)
    }

    pub fn down_with(button: PointerButton, x: f32, y: f32) -> Self {
        Self {
            pointer_id: Self::MOUSE,
            pos: Pos::new(x, y),
            kind: PointerEventKind::Down(button),
        }
    }

    pub fn moved(x: f32, y: f32) -> Self {
        Self {
            pointer_id: Self::MOUSE,
            pos: Pos::new(x, y),
            kind: PointerEventKind::Move,
        }
    }

    pub fn up(x: f32, y: f32) -> Self {
        Self {
            pointer_id: Self::MOUSE,
            pos: Pos::new(x, y),
            kind: PointerEventKind::Up,
        }
    }

    pub fn cancel() -> Self {
        Self {
            pointer_id: Self::MOUSE,
            pos: Pos::ZERO,
            kind: PointerEventKind::Cancel,
        }
    }

    /// Same event for another pointer (touch, pen).
    pub fn with_pointer(mut self, pointer_id: u64) -> Self {
        self.pointer_id = pointer_id;
        self
    }
}

/// Drag state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DragState {
    #[default]
    Idle,
    Dragging,
}

/// Limits a dragged window is kept inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragBounds {
    pub viewport: Size,
    /// Approximate window size, used only for clamping
    pub approx: Size,
    pub margin: f32,
}

/// One window's drag session.
#[derive(Debug, Clone, Default)]
pub struct DragSession {
    start_pointer: Pos,
    origin: Pos,
    pointer_id: Option<u64>,
    active: bool,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        if self.active {
            DragState::Dragging
        } else {
            DragState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Pointer id captured by the running session.
    pub fn captured_pointer(&self) -> Option<u64> {
        self.pointer_id.filter(|_| self.active)
    }

    /// Start dragging on a title-bar press.
    ///
    /// Only the primary button starts a drag. `current` is the window's
    /// position, `None` when it has not been placed yet.
    pub fn begin(&mut self, event: &PointerEvent, current: Option<Pos>) -> bool {
        if event.kind != PointerEventKind::Down(PointerButton::Primary) {
            return false;
        }
        self.start_pointer = event.pos;
        self.origin = current.unwrap_or(Pos::ZERO);
        self.pointer_id = Some(event.pointer_id);
        self.active = true;
        true
    }

    /// New window position for a globally observed move, `None` when idle or
    /// when the move belongs to another pointer.
    pub fn update(&self, event: &PointerEvent, bounds: &DragBounds) -> Option<Pos> {
        if !self.active || event.kind != PointerEventKind::Move {
            return None;
        }
        if self.pointer_id != Some(event.pointer_id) {
            return None;
        }
        let delta = compute_delta(event.pos, self.start_pointer);
        Some(clamp_position(
            self.origin + delta,
            bounds.viewport,
            bounds.approx,
            bounds.margin,
        ))
    }

    /// End on the captured pointer's release or cancel. Returns true if a
    /// drag was running.
    pub fn release(&mut self, event: &PointerEvent) -> bool {
        if !matches!(event.kind, PointerEventKind::Up | PointerEventKind::Cancel) {
            return false;
        }
        if !self.active || self.pointer_id != Some(event.pointer_id) {
            return false;
        }
        self.reset();
        true
    }

    /// Drop the session unconditionally (dialog closed mid-drag).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bounds() -> DragBounds {
        DragBounds {
            viewport: Size::new(1280.0, 800.0),
            approx: Size::new(520.0, 360.0),
            margin: 12.0,
        }
    }

    #[test]
    fn move_before_press_is_noop() {
        let session = DragSession::new();
        assert_eq!(session.update(&PointerEvent::moved(300.0, 300.0), &bounds()), None);
        assert_eq!(session.state(), DragState::Idle);
    }

    #[test]
    fn secondary_button_does_not_start_drag() {
        let mut session = DragSession::new();
        let press = PointerEvent::down_with(PointerButton::Secondary, 10.0, 10.0);
        assert!(!session.begin(&press, Some(Pos::new(100.0, 100.0))));
        assert!(!session.is_active());
    }

    #[test]
    fn drag_moves_by_pointer_delta() {
        let mut session = DragSession::new();
        session.begin(&PointerEvent::down(400.0, 220.0), Some(Pos::new(380.0, 200.0)));

        let pos = session.update(&PointerEvent::moved(450.0, 260.0), &bounds());
        assert_eq!(pos, Some(Pos::new(430.0, 240.0)));
        assert_eq!(session.captured_pointer(), Some(PointerEvent::MOUSE));

        assert!(session.release(&PointerEvent::up(450.0, 260.0)));
        assert_eq!(session.state(), DragState::Idle);
        assert_eq!(session.captured_pointer(), None);
    }

    #[test]
    fn unset_origin_drags_from_zero() {
        let mut session = DragSession::new();
        session.begin(&PointerEvent::down(10.0, 10.0), None);
        let pos = session.update(&PointerEvent::moved(110.0, 60.0), &bounds());
        assert_eq!(pos, Some(Pos::new(100.0, 50.0)));
    }

    #[test]
    fn drag_is_clamped_to_viewport() {
        let mut session = DragSession::new();
        session.begin(&PointerEvent::down(0.0, 0.0), Some(Pos::new(100.0, 100.0)));
        let pos = session.update(&PointerEvent::moved(5000.0, -5000.0), &bounds());
        assert_eq!(pos, Some(Pos::new(1280.0 - 520.0 - 12.0, 12.0)));
    }

    #[test]
    fn other_pointer_is_ignored() {
        let mut session = DragSession::new();
        session.begin(&PointerEvent::down(0.0, 0.0), Some(Pos::new(100.0, 100.0)));

        let stray = PointerEvent::moved(50.0, 50.0).with_pointer(7);
        assert_eq!(session.update(&stray, &bounds()), None);
        assert!(!session.release(&PointerEvent::up(0.0, 0.0).with_pointer(7)));
        assert!(session.is_active());

        assert!(session.release(&PointerEvent::cancel()));
        assert!(!session.is_active());
    }

    proptest! {
        #[test]
        fn final_position_matches_clamped_delta(
            ox in 12f32..700.0, oy in 12f32..400.0,
            dx in -2000f32..2000.0, dy in -2000f32..2000.0,
        ) {
            let b = bounds();
            let start = Pos::new(500.0, 500.0);
            let end = Pos::new(500.0 + dx, 500.0 + dy);
            let mut session = DragSession::new();
            session.begin(&PointerEvent::down(start.x, start.y), Some(Pos::new(ox, oy)));
            let pos = session
                .update(&PointerEvent::moved(end.x, end.y), &b)
                .unwrap();
            let expected = clamp_position(Pos::new(ox, oy) + (end - start), b.viewport, b.approx, b.margin);
            prop_assert_eq!(pos, expected);
            prop_assert!(pos.x >= b.margin && pos.y >= b.margin);
        }
    }
}
