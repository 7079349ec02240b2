//! Floating windows: drag sessions and the window manager.

pub mod drag;
pub mod manager;

pub use drag::{
    DragBounds, DragSession, DragState, PointerButton, PointerEvent, PointerEventKind,
};
pub use manager::{
    DropdownMenu, PointerListeners, PointerSubscription, WindowKind, WindowManager,
    DEFAULT_MARGIN,
};
