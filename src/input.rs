use std::collections::HashSet;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

/// Keys without a printable character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Space,
    Escape,
    Left,
    Right,
    Up,
    Down,
    LeftShift,
}

/// Set of keys currently held down, fed by the window event loop.
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_named_down(&self, key: NamedKey) -> bool {
        self.is_key_down(KeyCode::Named(key))
    }

    /// Letters are matched case-insensitively.
    pub fn is_char_down(&self, ch: char) -> bool {
        self.is_key_down(KeyCode::Character(ch.to_ascii_uppercase()))
    }

    /// Drops every held key, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
