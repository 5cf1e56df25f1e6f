//! Keybinding dispatch.
//!
//! A key event is normalized into a canonical chord string
//! (`Ctrl+Shift+S`), looked up in a registry, and the registered callback
//! runs if its guard clause holds for the current context. Single chords
//! only: no sequences, no timeout-based multi-key bindings.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChordParseError {
    #[error("chord is empty")]
    Empty,

    #[error("chord has modifiers but no key")]
    MissingKey,

    #[error("unknown modifier: {0}")]
    UnknownModifier(String),
}

//
// ─── CHORD ─────────────────────────────────────────────────────────────────────
//

/// A normalized key combination.
///
/// Single-character keys are stored uppercased so `ctrl+s` and `Ctrl+S`
/// are the same chord; named keys (`Enter`, `Escape`, `F5`) keep their
/// casing as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyChord {
    ctrl: bool,
    shift: bool,
    alt: bool,
    key: String,
}

impl KeyChord {
    /// Builds a chord from the raw parts of a key event.
    ///
    /// # Errors
    ///
    /// Returns `ChordParseError::MissingKey` if `key` is empty.
    pub fn from_parts(
        key: &str,
        ctrl: bool,
        shift: bool,
        alt: bool,
    ) -> Result<Self, ChordParseError> {
        if key.is_empty() {
            return Err(ChordParseError::MissingKey);
        }
        Ok(Self {
            ctrl,
            shift,
            alt,
            key: normalize_key(key),
        })
    }

    /// Builds an unmodified chord for a single key.
    ///
    /// # Errors
    ///
    /// Returns `ChordParseError::MissingKey` if `key` is empty.
    pub fn bare(key: &str) -> Result<Self, ChordParseError> {
        Self::from_parts(key, false, false, false)
    }

    #[must_use]
    pub fn ctrl(&self) -> bool {
        self.ctrl
    }

    #[must_use]
    pub fn shift(&self) -> bool {
        self.shift
    }

    #[must_use]
    pub fn alt(&self) -> bool {
        self.alt
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

fn normalize_key(key: &str) -> String {
    if key.chars().count() == 1 {
        key.to_uppercase()
    } else {
        key.to_string()
    }
}

impl fmt::Display for KeyChord {
    /// Canonical form: modifiers in `Ctrl+Shift+Alt` order, key last.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for KeyChord {
    type Err = ChordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ChordParseError::Empty);
        }

        let mut ctrl = false;
        let mut shift = false;
        let mut alt = false;
        let mut key = None;

        let parts: Vec<&str> = s.split('+').collect();
        let last = parts.len() - 1;
        for (index, part) in parts.iter().enumerate() {
            let part = part.trim();
            if index < last {
                match part.to_lowercase().as_str() {
                    "ctrl" | "control" => ctrl = true,
                    "shift" => shift = true,
                    "alt" | "option" => alt = true,
                    other => return Err(ChordParseError::UnknownModifier(other.to_string())),
                }
            } else if part.is_empty() {
                return Err(ChordParseError::MissingKey);
            } else {
                key = Some(part);
            }
        }

        let key = key.ok_or(ChordParseError::MissingKey)?;
        Self::from_parts(key, ctrl, shift, alt)
    }
}

//
// ─── GUARDS ────────────────────────────────────────────────────────────────────
//

/// UI state a guard clause can look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyContext {
    pub editor_focused: bool,
    pub modal_open: bool,
    pub runner_busy: bool,
}

/// The small fixed set of binding guards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WhenClause {
    #[default]
    Always,
    EditorFocused,
    NoModalOpen,
    RunnerIdle,
}

impl WhenClause {
    #[must_use]
    pub fn evaluate(self, ctx: &KeyContext) -> bool {
        match self {
            WhenClause::Always => true,
            WhenClause::EditorFocused => ctx.editor_focused,
            WhenClause::NoModalOpen => !ctx.modal_open,
            WhenClause::RunnerIdle => !ctx.runner_busy,
        }
    }
}

//
// ─── REGISTRY ──────────────────────────────────────────────────────────────────
//

struct Binding {
    when: WhenClause,
    action: Box<dyn Fn() + Send>,
}

/// Chord-to-callback registry.
///
/// Registering the same chord twice replaces the earlier binding.
#[derive(Default)]
pub struct Keybindings {
    bindings: HashMap<KeyChord, Binding>,
}

impl Keybindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for a chord, guarded by `when`.
    pub fn register(
        &mut self,
        chord: KeyChord,
        when: WhenClause,
        action: impl Fn() + Send + 'static,
    ) {
        self.bindings.insert(
            chord,
            Binding {
                when,
                action: Box::new(action),
            },
        );
    }

    #[must_use]
    pub fn contains(&self, chord: &KeyChord) -> bool {
        self.bindings.contains_key(chord)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Dispatches a chord: runs the bound callback if one exists and its
    /// guard holds. Returns whether the chord was handled.
    pub fn dispatch(&self, chord: &KeyChord, ctx: &KeyContext) -> bool {
        match self.bindings.get(chord) {
            Some(binding) if binding.when.evaluate(ctx) => {
                (binding.action)();
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Keybindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keybindings")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn chord_normalizes_letter_case() {
        let lower = KeyChord::from_parts("s", true, false, false).unwrap();
        let upper = KeyChord::from_parts("S", true, false, false).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), "Ctrl+S");
    }

    #[test]
    fn chord_display_parse_roundtrip() {
        for raw in ["Ctrl+Shift+S", "Alt+Enter", "Ctrl+Alt+F5", "Escape"] {
            let chord: KeyChord = raw.parse().unwrap();
            assert_eq!(chord.to_string(), raw);
        }
    }

    #[test]
    fn parse_accepts_modifier_aliases() {
        let chord: KeyChord = "control+shift+k".parse().unwrap();
        assert!(chord.ctrl() && chord.shift());
        assert_eq!(chord.key(), "K");
    }

    #[test]
    fn parse_rejects_bad_chords() {
        assert_eq!("".parse::<KeyChord>(), Err(ChordParseError::Empty));
        assert_eq!("Ctrl+".parse::<KeyChord>(), Err(ChordParseError::MissingKey));
        assert_eq!(
            "Hyper+K".parse::<KeyChord>(),
            Err(ChordParseError::UnknownModifier("hyper".to_string()))
        );
    }

    #[test]
    fn dispatch_runs_matching_binding() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bindings = Keybindings::new();
        let chord: KeyChord = "Ctrl+Enter".parse().unwrap();

        let hits = Arc::clone(&counter);
        bindings.register(chord.clone(), WhenClause::Always, move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bindings.dispatch(&chord, &KeyContext::default()));
        assert!(!bindings.dispatch(&"Ctrl+X".parse().unwrap(), &KeyContext::default()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_clause_blocks_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bindings = Keybindings::new();
        let chord: KeyChord = "Ctrl+R".parse().unwrap();

        let hits = Arc::clone(&counter);
        bindings.register(chord.clone(), WhenClause::RunnerIdle, move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        let busy = KeyContext {
            runner_busy: true,
            ..KeyContext::default()
        };
        assert!(!bindings.dispatch(&chord, &busy));

        assert!(bindings.dispatch(&chord, &KeyContext::default()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn re_registering_replaces_the_binding() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bindings = Keybindings::new();
        let chord: KeyChord = "Ctrl+S".parse().unwrap();

        bindings.register(chord.clone(), WhenClause::Always, || {});
        let hits = Arc::clone(&counter);
        bindings.register(chord.clone(), WhenClause::Always, move || {
            hits.fetch_add(10, Ordering::SeqCst);
        });

        assert_eq!(bindings.len(), 1);
        bindings.dispatch(&chord, &KeyContext::default());
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
