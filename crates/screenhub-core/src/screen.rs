//! Screen domain type.

use chrono::{DateTime, Utc};

use crate::CanvasId;

/// One video output the emulator exposes, such as a VIC-II or VDC canvas.
///
/// UI clients will eventually subscribe to a screen; for now a screen is only
/// an advertised identity plus a name for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    canvas: CanvasId,
    name: String,
    registered_at: DateTime<Utc>,
}

impl Screen {
    /// Creates a screen for `canvas`.
    ///
    /// The name is diagnostic only. Surrounding whitespace is trimmed and a
    /// blank name falls back to the canvas id, so every canvas is accepted.
    pub fn new(canvas: CanvasId, name: &str) -> Self {
        let trimmed = name.trim();
        let name = if trimmed.is_empty() {
            canvas.to_string()
        } else {
            trimmed.to_string()
        };

        Self {
            canvas,
            name,
            registered_at: Utc::now(),
        }
    }

    pub fn canvas(&self) -> CanvasId {
        self.canvas
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_screen_trims_name() {
        let screen = Screen::new(CanvasId::new(1), "  VICII ");
        assert_eq!(screen.name(), "VICII");
        assert_eq!(screen.canvas(), CanvasId::new(1));
    }

    #[test]
    fn test_blank_name_falls_back_to_canvas_id() {
        assert_eq!(Screen::new(CanvasId::new(0xd000), "").name(), "0xd000");
        assert_eq!(Screen::new(CanvasId::new(1), "   ").name(), "0x1");
    }
}
