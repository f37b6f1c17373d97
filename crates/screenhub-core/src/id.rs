//! Identifiers for clients and canvases.

use std::fmt;

/// Server-assigned identifier of a connected UI client.
///
/// Issued from a counter that only ever moves forward, so an id is never
/// handed out twice during the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// The first id a fresh server hands out.
    pub const FIRST: ClientId = ClientId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one, or `None` past `u64::MAX`.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of an emulator canvas.
///
/// The server never looks behind it; two canvases are the same screen
/// exactly when their ids compare equal. Emulator code that owns its
/// canvases in memory can derive the id from the canvas address with
/// [`CanvasId::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanvasId(u64);

impl CanvasId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identity of a value by its address.
    ///
    /// Only meaningful while `canvas` stays at the same place in memory,
    /// which holds for canvases that live for the whole emulation run.
    pub fn of<T>(canvas: &T) -> Self {
        Self(canvas as *const T as usize as u64)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_next_is_strictly_greater() {
        let id = ClientId::FIRST;
        assert_eq!(id.get(), 0);
        let next = id.checked_next().unwrap();
        assert!(next > id);
        assert_eq!(next.get(), 1);
    }

    #[test]
    fn test_client_id_has_no_successor_at_max() {
        assert_eq!(ClientId::new(u64::MAX).checked_next(), None);
        assert_eq!(
            ClientId::new(u64::MAX - 1).checked_next(),
            Some(ClientId::new(u64::MAX))
        );
    }

    #[test]
    fn test_canvas_id_by_address() {
        let a = [0u8; 4];
        let b = [0u8; 4];
        assert_eq!(CanvasId::of(&a), CanvasId::of(&a));
        assert_ne!(CanvasId::of(&a), CanvasId::of(&b));
    }

    #[test]
    fn test_canvas_id_display_is_hex() {
        assert_eq!(CanvasId::new(255).to_string(), "0xff");
    }
}
