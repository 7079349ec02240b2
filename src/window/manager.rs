//! Floating window manager.
//!
//! Owns the main explorer window and the three dialogs (about, schema,
//! upload). Every window has its own `DragSession`; global pointer
//! move/up/cancel events reach a window only while it holds a
//! `PointerSubscription`, which is acquired when the window opens and
//! released when it closes or the manager is dropped.
//!
//! Position lifecycle of a dialog:
//!
//! ```text
//! closed/unset ──open──► centered ──drag──► moved ──close──► closed/unset
//! ```

use super::drag::{DragBounds, DragSession, DragState, PointerEvent, PointerEventKind};
use crate::geometry::{center_in_viewport, clamp_position, Pos, Rect, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default gap kept between a window and the viewport edge.
pub const DEFAULT_MARGIN: f32 = 12.0;

// =============================================================================
// WINDOW KINDS
// =============================================================================

/// The floating windows of the explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindowKind {
    /// Always-visible explorer window
    Main,
    About,
    Schema,
    Upload,
}

impl WindowKind {
    pub const ALL: [WindowKind; 4] = [
        WindowKind::Main,
        WindowKind::About,
        WindowKind::Schema,
        WindowKind::Upload,
    ];

    /// Dialogs open and close; the main window does not.
    pub fn is_dialog(self) -> bool {
        !matches!(self, WindowKind::Main)
    }

    /// Intended rendered size, used for centering.
    pub fn nominal_size(self) -> Size {
        match self {
            WindowKind::Main => Size::new(960.0, 640.0),
            WindowKind::About => Size::new(520.0, 360.0),
            WindowKind::Schema => Size::new(560.0, 520.0),
            WindowKind::Upload => Size::new(480.0, 280.0),
        }
    }

    /// Size assumed when clamping a drag. The rendered size is not known
    /// synchronously, so this is an estimate.
    pub fn approx_size(self) -> Size {
        match self {
            WindowKind::Main => Size::new(900.0, 600.0),
            WindowKind::About => Size::new(520.0, 360.0),
            WindowKind::Schema => Size::new(560.0, 480.0),
            WindowKind::Upload => Size::new(480.0, 280.0),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            WindowKind::Main => "NL2SQL Explorer",
            WindowKind::About => "About",
            WindowKind::Schema => "Schema",
            WindowKind::Upload => "Upload dataset",
        }
    }
}

// =============================================================================
// SCOPED POINTER LISTENERS
// =============================================================================

/// Registry of windows currently listening to global pointer events.
#[derive(Debug, Clone, Default)]
pub struct PointerListeners {
    inner: Arc<Mutex<BTreeMap<WindowKind, usize>>>,
}

impl PointerListeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<WindowKind, usize>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach global move/up/cancel listeners for `kind`. They stay attached
    /// until the returned guard is dropped.
    pub fn subscribe(&self, kind: WindowKind) -> PointerSubscription {
        *self.lock().entry(kind).or_insert(0) += 1;
        PointerSubscription {
            kind,
            registry: Arc::clone(&self.inner),
        }
    }

    pub fn is_listening(&self, kind: WindowKind) -> bool {
        self.lock().get(&kind).copied().unwrap_or(0) > 0
    }

    /// Number of live subscriptions across all windows.
    pub fn active_count(&self) -> usize {
        self.lock().values().sum()
    }
}

/// Live global-listener attachment for one window. Dropping it detaches.
#[derive(Debug)]
pub struct PointerSubscription {
    kind: WindowKind,
    registry: Arc<Mutex<BTreeMap<WindowKind, usize>>>,
}

impl PointerSubscription {
    pub fn kind(&self) -> WindowKind {
        self.kind
    }
}

impl Drop for PointerSubscription {
    fn drop(&mut self) {
        let mut map = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(count) = map.get_mut(&self.kind) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                map.remove(&self.kind);
            }
        }
    }
}

// =============================================================================
// DROPDOWN MENU
// =============================================================================

/// A dropdown menu that closes when the pointer goes down outside it.
#[derive(Debug, Clone, Default)]
pub struct DropdownMenu {
    open: bool,
    bounds: Option<Rect>,
}

impl DropdownMenu {
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// `bounds` should cover the menu and its trigger.
    pub fn open(&mut self, bounds: Rect) {
        self.open = true;
        self.bounds = Some(bounds);
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn toggle(&mut self, bounds: Rect) {
        if self.open {
            self.close();
        } else {
            self.open(bounds);
        }
    }

    /// Global pointer-down handler. Returns true if the menu was dismissed.
    pub fn on_pointer_down(&mut self, pos: Pos) -> bool {
        if !self.open {
            return false;
        }
        let inside = self.bounds.map(|b| b.contains(pos)).unwrap_or(false);
        if !inside {
            self.open = false;
            tracing::debug!("dropdown dismissed by outside press");
        }
        !inside
    }
}

// =============================================================================
// WINDOW MANAGER
// =============================================================================

/// One floating window.
#[derive(Debug)]
struct Window {
    kind: WindowKind,
    open: bool,
    position: Option<Pos>,
    drag: DragSession,
    subscription: Option<PointerSubscription>,
}

impl Window {
    fn new(kind: WindowKind) -> Self {
        Self {
            kind,
            open: false,
            position: None,
            drag: DragSession::new(),
            subscription: None,
        }
    }
}

/// Owns every floating window and routes pointer events to them.
#[derive(Debug)]
pub struct WindowManager {
    viewport: Size,
    margin: f32,
    windows: BTreeMap<WindowKind, Window>,
    /// At most one dialog is open at a time
    active_dialog: Option<WindowKind>,
    listeners: PointerListeners,
    menu: DropdownMenu,
    mounted: bool,
}

impl WindowManager {
    pub fn new(viewport: Size) -> Self {
        Self::with_margin(viewport, DEFAULT_MARGIN)
    }

    pub fn with_margin(viewport: Size, margin: f32) -> Self {
        Self {
            viewport,
            margin,
            windows: WindowKind::ALL
                .into_iter()
                .map(|k| (k, Window::new(k)))
                .collect(),
            active_dialog: None,
            listeners: PointerListeners::new(),
            menu: DropdownMenu::default(),
            mounted: false,
        }
    }

    /// Show the main window. It is centered here once and never re-centered.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        let (viewport, margin) = (self.viewport, self.margin);
        let subscription = self.listeners.subscribe(WindowKind::Main);
        if let Some(main) = self.windows.get_mut(&WindowKind::Main) {
            main.open = true;
            main.position = Some(center_in_viewport(
                viewport,
                WindowKind::Main.nominal_size(),
                margin,
            ));
            main.subscription = Some(subscription);
            tracing::debug!(position = ?main.position, "main window mounted");
        }
    }

    /// Close everything and release every listener.
    pub fn unmount(&mut self) {
        if let Some(kind) = self.active_dialog {
            self.close(kind);
        }
        if let Some(main) = self.windows.get_mut(&WindowKind::Main) {
            main.drag.reset();
            main.subscription = None;
            main.open = false;
        }
        self.mounted = false;
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// New viewport size. Every placed window is pulled back inside it.
    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        let margin = self.margin;
        for window in self.windows.values_mut() {
            if let Some(pos) = window.position {
                let clamped = clamp_position(pos, viewport, window.kind.approx_size(), margin);
                if clamped != pos {
                    tracing::debug!(window = ?window.kind, from = ?pos, to = ?clamped, "window re-clamped");
                    window.position = Some(clamped);
                }
            }
        }
    }

    pub fn listeners(&self) -> &PointerListeners {
        &self.listeners
    }

    pub fn menu(&self) -> &DropdownMenu {
        &self.menu
    }

    pub fn menu_mut(&mut self) -> &mut DropdownMenu {
        &mut self.menu
    }

    pub fn active_dialog(&self) -> Option<WindowKind> {
        self.active_dialog
    }

    pub fn is_open(&self, kind: WindowKind) -> bool {
        self.windows.get(&kind).map(|w| w.open).unwrap_or(false)
    }

    pub fn position(&self, kind: WindowKind) -> Option<Pos> {
        self.windows.get(&kind).and_then(|w| w.position)
    }

    pub fn drag_state(&self, kind: WindowKind) -> DragState {
        self.windows
            .get(&kind)
            .map(|w| w.drag.state())
            .unwrap_or_default()
    }

    /// Open a dialog. Any other open dialog is closed first. A dialog without
    /// a position is centered in the current viewport.
    pub fn open(&mut self, kind: WindowKind) {
        if !kind.is_dialog() {
            self.mount();
            return;
        }
        if self.active_dialog == Some(kind) {
            return;
        }
        if let Some(current) = self.active_dialog {
            self.close(current);
        }

        let (viewport, margin) = (self.viewport, self.margin);
        let subscription = self.listeners.subscribe(kind);
        if let Some(window) = self.windows.get_mut(&kind) {
            window.open = true;
            if window.position.is_none() {
                window.position = Some(center_in_viewport(viewport, kind.nominal_size(), margin));
            }
            window.subscription = Some(subscription);
            tracing::debug!(window = ?kind, position = ?window.position, "dialog opened");
        }
        self.active_dialog = Some(kind);
    }

    /// Close a dialog: end any drag, forget its position, detach listeners.
    pub fn close(&mut self, kind: WindowKind) {
        if !kind.is_dialog() {
            return;
        }
        if let Some(window) = self.windows.get_mut(&kind) {
            if window.open {
                tracing::debug!(window = ?kind, "dialog closed");
            }
            window.open = false;
            window.position = None;
            window.drag.reset();
            window.subscription = None;
        }
        if self.active_dialog == Some(kind) {
            self.active_dialog = None;
        }
    }

    pub fn close_active(&mut self) {
        if let Some(kind) = self.active_dialog {
            self.close(kind);
        }
    }

    pub fn toggle(&mut self, kind: WindowKind) {
        if self.is_open(kind) {
            self.close(kind);
        } else {
            self.open(kind);
        }
    }

    /// Pointer pressed on a window's title bar. Returns true if a drag
    /// started.
    pub fn title_bar_pressed(&mut self, kind: WindowKind, event: &PointerEvent) -> bool {
        let Some(window) = self.windows.get_mut(&kind) else {
            return false;
        };
        if !window.open {
            return false;
        }
        let started = window.drag.begin(event, window.position);
        if started {
            tracing::debug!(window = ?kind, pointer = event.pointer_id, "drag started");
        }
        started
    }

    /// Globally observed pointer event.
    ///
    /// Presses go to the dropdown's outside-click check. Moves, releases and
    /// cancels go to every window that currently holds a subscription.
    /// Returns true if any window moved or stopped dragging, or the menu
    /// closed.
    pub fn handle_global(&mut self, event: &PointerEvent) -> bool {
        if let PointerEventKind::Down(_) = event.kind {
            return self.menu.on_pointer_down(event.pos);
        }

        let (viewport, margin) = (self.viewport, self.margin);
        let mut changed = false;
        for window in self.windows.values_mut() {
            if window.subscription.is_none() {
                continue;
            }
            match event.kind {
                PointerEventKind::Move => {
                    let bounds = DragBounds {
                        viewport,
                        approx: window.kind.approx_size(),
                        margin,
                    };
                    if let Some(pos) = window.drag.update(event, &bounds) {
                        window.position = Some(pos);
                        changed = true;
                    }
                }
                PointerEventKind::Up | PointerEventKind::Cancel => {
                    if window.drag.release(event) {
                        tracing::debug!(window = ?window.kind, position = ?window.position, "drag ended");
                        changed = true;
                    }
                }
                PointerEventKind::Down(_) => {}
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> WindowManager {
        let mut wm = WindowManager::new(Size::new(1280.0, 800.0));
        wm.mount();
        wm
    }

    fn drag(wm: &mut WindowManager, kind: WindowKind, dx: f32, dy: f32) {
        let start = wm.position(kind).unwrap_or(Pos::ZERO) + Pos::new(20.0, 10.0);
        assert!(wm.title_bar_pressed(kind, &PointerEvent::down(start.x, start.y)));
        wm.handle_global(&PointerEvent::moved(start.x + dx, start.y + dy));
        wm.handle_global(&PointerEvent::up(start.x + dx, start.y + dy));
    }

    #[test]
    fn test_main_window_centered_on_mount() {
        let wm = manager();
        assert!(wm.is_open(WindowKind::Main));
        assert_eq!(wm.position(WindowKind::Main), Some(Pos::new(160.0, 80.0)));
        assert!(wm.listeners().is_listening(WindowKind::Main));
    }

    #[test]
    fn test_main_window_is_not_recentered() {
        let mut wm = manager();
        drag(&mut wm, WindowKind::Main, 40.0, 30.0);
        let moved = wm.position(WindowKind::Main);

        wm.mount();
        wm.open(WindowKind::About);
        wm.close(WindowKind::About);
        assert_eq!(wm.position(WindowKind::Main), moved);
    }

    #[test]
    fn test_dialog_centered_on_open() {
        let mut wm = manager();
        assert_eq!(wm.position(WindowKind::About), None);
        wm.open(WindowKind::About);
        assert_eq!(wm.position(WindowKind::About), Some(Pos::new(380.0, 220.0)));
        assert_eq!(wm.active_dialog(), Some(WindowKind::About));
    }

    #[test]
    fn test_drag_final_position_is_clamped_delta() {
        let mut wm = manager();
        wm.open(WindowKind::Schema);
        let origin = wm.position(WindowKind::Schema).unwrap();

        drag(&mut wm, WindowKind::Schema, 900.0, -35.0);

        let expected = clamp_position(
            origin + Pos::new(900.0, -35.0),
            wm.viewport(),
            WindowKind::Schema.approx_size(),
            DEFAULT_MARGIN,
        );
        assert_eq!(wm.position(WindowKind::Schema), Some(expected));
        assert_eq!(wm.drag_state(WindowKind::Schema), DragState::Idle);
    }

    #[test]
    fn test_move_before_press_is_noop() {
        let mut wm = manager();
        wm.open(WindowKind::About);
        let before = wm.position(WindowKind::About);
        assert!(!wm.handle_global(&PointerEvent::moved(5.0, 5.0)));
        assert_eq!(wm.position(WindowKind::About), before);
    }

    #[test]
    fn test_close_and_reopen_recenters() {
        let mut wm = manager();
        wm.open(WindowKind::Upload);
        let centered = wm.position(WindowKind::Upload);
        drag(&mut wm, WindowKind::Upload, -150.0, 120.0);
        assert_ne!(wm.position(WindowKind::Upload), centered);

        wm.close(WindowKind::Upload);
        assert_eq!(wm.position(WindowKind::Upload), None);

        wm.open(WindowKind::Upload);
        assert_eq!(wm.position(WindowKind::Upload), centered);
    }

    #[test]
    fn test_dragging_one_window_leaves_others() {
        let mut wm = manager();
        wm.open(WindowKind::About);
        let main_before = wm.position(WindowKind::Main);

        drag(&mut wm, WindowKind::About, 60.0, 60.0);

        assert_eq!(wm.position(WindowKind::Main), main_before);
        assert_eq!(wm.drag_state(WindowKind::Main), DragState::Idle);
    }

    #[test]
    fn test_opening_second_dialog_closes_first() {
        let mut wm = manager();
        wm.open(WindowKind::About);
        wm.open(WindowKind::Schema);

        assert!(!wm.is_open(WindowKind::About));
        assert_eq!(wm.position(WindowKind::About), None);
        assert!(!wm.listeners().is_listening(WindowKind::About));
        assert!(wm.listeners().is_listening(WindowKind::Schema));
    }

    #[test]
    fn test_close_mid_drag_releases_listeners() {
        let mut wm = manager();
        wm.open(WindowKind::About);
        let pos = wm.position(WindowKind::About).unwrap();
        wm.title_bar_pressed(WindowKind::About, &PointerEvent::down(pos.x + 5.0, pos.y + 5.0));
        assert_eq!(wm.drag_state(WindowKind::About), DragState::Dragging);

        wm.close(WindowKind::About);

        assert_eq!(wm.drag_state(WindowKind::About), DragState::Idle);
        assert!(!wm.listeners().is_listening(WindowKind::About));
        // Late move after close reaches nobody
        assert!(!wm.handle_global(&PointerEvent::moved(900.0, 700.0)));
    }

    #[test]
    fn test_drop_releases_every_subscription() {
        let listeners = {
            let mut wm = manager();
            wm.open(WindowKind::Schema);
            let listeners = wm.listeners().clone();
            assert_eq!(listeners.active_count(), 2);
            listeners
        };
        assert_eq!(listeners.active_count(), 0);
    }

    #[test]
    fn test_unmount_releases_every_subscription() {
        let mut wm = manager();
        wm.open(WindowKind::Upload);
        wm.unmount();
        assert_eq!(wm.listeners().active_count(), 0);
        assert!(!wm.is_open(WindowKind::Upload));
    }

    #[test]
    fn test_press_on_closed_dialog_does_not_drag() {
        let mut wm = manager();
        assert!(!wm.title_bar_pressed(WindowKind::About, &PointerEvent::down(10.0, 10.0)));
    }

    #[test]
    fn test_dropdown_closes_on_outside_press_only() {
        let mut wm = manager();
        let bounds = Rect::new(Pos::new(1000.0, 20.0), Size::new(200.0, 160.0));
        wm.menu_mut().open(bounds);

        assert!(!wm.handle_global(&PointerEvent::down(1100.0, 100.0)));
        assert!(wm.menu().is_open());

        assert!(wm.handle_global(&PointerEvent::down(50.0, 700.0)));
        assert!(!wm.menu().is_open());
    }

    #[test]
    fn test_shrinking_viewport_pulls_windows_back_inside() {
        let mut wm = manager();
        wm.open(WindowKind::About);
        assert_eq!(wm.position(WindowKind::About), Some(Pos::new(380.0, 220.0)));

        wm.set_viewport(Size::new(800.0, 600.0));

        assert_eq!(wm.position(WindowKind::About), Some(Pos::new(268.0, 220.0)));
        assert_eq!(wm.position(WindowKind::Main), Some(Pos::new(12.0, 12.0)));
        assert_eq!(wm.position(WindowKind::Schema), None);

        // Growing again leaves in-range positions alone
        wm.set_viewport(Size::new(1920.0, 1080.0));
        assert_eq!(wm.position(WindowKind::About), Some(Pos::new(268.0, 220.0)));
    }

    #[test]
    fn test_small_viewport_pins_dialog_at_margin() {
        let mut wm = WindowManager::new(Size::new(300.0, 200.0));
        wm.mount();
        wm.open(WindowKind::Schema);
        assert_eq!(wm.position(WindowKind::Schema), Some(Pos::new(12.0, 12.0)));

        drag(&mut wm, WindowKind::Schema, 50.0, 50.0);
        assert_eq!(wm.position(WindowKind::Schema), Some(Pos::new(12.0, 12.0)));
    }
}
