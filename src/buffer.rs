//! Render buffer: the text currently on the surface

use crate::session::ApplyMode;

#[derive(Debug, Default, Clone)]
pub struct RenderBuffer {
    text: String,
}

impl RenderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, fragment: &str, mode: ApplyMode) {
        match mode {
            ApplyMode::Replace => self.replace(fragment),
            ApplyMode::Append => self.append(fragment),
        }
    }

    /// Drop everything and start over from `fragment`
    pub fn replace(&mut self, fragment: &str) {
        self.text.clear();
        self.text.push_str(fragment);
    }

    pub fn append(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    /// Flattened view
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
