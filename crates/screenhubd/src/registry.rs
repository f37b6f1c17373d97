//! Screen registry.
//!
//! Holds one entry per video output the emulator has announced. Entries are
//! keyed by canvas identity and kept in registration order. There is no
//! removal: screens live until the server shuts down.

use thiserror::Error;
use tracing::{info, warn};

use screenhub_core::{CanvasId, Screen};

/// Registry of screens available to UI clients.
#[derive(Debug, Default)]
pub struct ScreenRegistry {
    screens: Vec<Screen>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the screen backed by `canvas`.
    ///
    /// Any name is accepted; a blank one is logged under the canvas id.
    ///
    /// # Errors
    /// `RegistryError::AlreadyRegistered` if `canvas` is already known; the
    /// registry is left unchanged.
    pub fn register(&mut self, canvas: CanvasId, name: &str) -> Result<(), RegistryError> {
        if let Some(existing) = self.get(canvas) {
            warn!(
                canvas = %canvas,
                name = %name,
                existing = %existing.name(),
                "Attempt to re-add screen"
            );
            return Err(RegistryError::AlreadyRegistered {
                canvas,
                existing: existing.name().to_string(),
            });
        }

        let screen = Screen::new(canvas, name);
        info!(canvas = %canvas, name = %screen.name(), "Adding screen");
        self.screens.push(screen);
        Ok(())
    }

    /// Looks up a screen by canvas identity.
    pub fn get(&self, canvas: CanvasId) -> Option<&Screen> {
        self.screens.iter().find(|s| s.canvas() == canvas)
    }

    /// Screens in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Screen> {
        self.screens.iter()
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    /// Drops every screen and releases the backing storage.
    pub fn clear(&mut self) {
        self.screens = Vec::new();
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A screen for this canvas already exists.
    #[error("screen already registered for canvas {canvas} (as {existing})")]
    AlreadyRegistered { canvas: CanvasId, existing: String },
}
