//! Host clipboard access behind a seam.
//!
//! The translator only needs to read text; the real implementation
//! wraps `arboard`, and an in-memory variant serves headless sessions
//! and tests.

use tracing::warn;

/// Read access to the host clipboard.
pub trait Clipboard: Send {
    /// Current clipboard text, or `None` when unavailable.
    fn get_text(&mut self) -> Option<String>;
}

/// System clipboard via `arboard`.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    /// Open the system clipboard; fails on display-less hosts.
    pub fn new() -> Option<Self> {
        match arboard::Clipboard::new() {
            Ok(inner) => Some(Self { inner }),
            Err(e) => {
                warn!("could not open the system clipboard: {e}");
                None
            }
        }
    }
}

impl Clipboard for SystemClipboard {
    fn get_text(&mut self) -> Option<String> {
        match self.inner.get_text() {
            Ok(text) => Some(text),
            Err(arboard::Error::ContentNotAvailable) => Some(String::new()),
            Err(e) => {
                warn!("could not get clipboard text: {e}");
                None
            }
        }
    }
}

/// Fixed-content clipboard for headless sessions and tests.
#[derive(Default)]
pub struct InMemoryClipboard {
    text: String,
}

impl InMemoryClipboard {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Clipboard for InMemoryClipboard {
    fn get_text(&mut self) -> Option<String> {
        Some(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_returns_its_text() {
        let mut clip = InMemoryClipboard::new("copied");
        assert_eq!(clip.get_text().as_deref(), Some("copied"));
    }

    #[test]
    fn in_memory_default_is_empty() {
        let mut clip = InMemoryClipboard::default();
        assert_eq!(clip.get_text().as_deref(), Some(""));
    }
}
