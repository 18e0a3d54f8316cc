//! Folds page visibility and window focus into one "attending the
//! campaign" signal.
//!
//! The host page being hidden, or losing focus while the campaign popup is
//! open, means the user is most likely looking at the popup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AttentionEvent {
    VisibilityChanged { hidden: bool },
    FocusGained,
    FocusLost,
    PointerMoved,
}

#[derive(Debug, Clone)]
pub struct AttentionSignal {
    page_hidden: bool,
    window_focused: bool,
    popup_open: bool,
    pointer_moves: u64,
}

impl Default for AttentionSignal {
    fn default() -> Self {
        Self {
            page_hidden: false,
            window_focused: true,
            popup_open: false,
            pointer_moves: 0,
        }
    }
}

impl AttentionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a host event; returns true when `attending()` changed.
    pub fn apply(&mut self, event: AttentionEvent) -> bool {
        let before = self.attending();
        match event {
            AttentionEvent::VisibilityChanged { hidden } => self.page_hidden = hidden,
            AttentionEvent::FocusGained => self.window_focused = true,
            AttentionEvent::FocusLost => self.window_focused = false,
            AttentionEvent::PointerMoved => {
                self.pointer_moves = self.pointer_moves.saturating_add(1);
            }
        }
        before != self.attending()
    }

    pub fn set_popup_open(&mut self, open: bool) -> bool {
        let before = self.attending();
        self.popup_open = open;
        before != self.attending()
    }

    pub fn attending(&self) -> bool {
        self.popup_open && (self.page_hidden || !self.window_focused)
    }

    pub fn popup_open(&self) -> bool {
        self.popup_open
    }

    pub fn pointer_moves(&self) -> u64 {
        self.pointer_moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_attention_without_popup() {
        let mut signal = AttentionSignal::new();
        signal.apply(AttentionEvent::VisibilityChanged { hidden: true });
        signal.apply(AttentionEvent::FocusLost);
        assert!(!signal.attending());
    }

    #[test]
    fn hidden_page_with_open_popup_attends() {
        let mut signal = AttentionSignal::new();
        signal.set_popup_open(true);
        assert!(!signal.attending());

        assert!(signal.apply(AttentionEvent::VisibilityChanged { hidden: true }));
        assert!(signal.attending());
    }

    #[test]
    fn blur_alone_counts_as_attending() {
        let mut signal = AttentionSignal::new();
        signal.set_popup_open(true);
        assert!(signal.apply(AttentionEvent::FocusLost));
        assert!(signal.attending());
        assert!(signal.apply(AttentionEvent::FocusGained));
        assert!(!signal.attending());
    }

    #[test]
    fn closing_popup_drops_attention() {
        let mut signal = AttentionSignal::new();
        signal.set_popup_open(true);
        signal.apply(AttentionEvent::FocusLost);
        assert!(signal.set_popup_open(false));
        assert!(!signal.attending());
    }

    #[test]
    fn pointer_moves_are_counted_without_changing_attention() {
        let mut signal = AttentionSignal::new();
        assert!(!signal.apply(AttentionEvent::PointerMoved));
        signal.apply(AttentionEvent::PointerMoved);
        assert_eq!(signal.pointer_moves(), 2);
    }
}
