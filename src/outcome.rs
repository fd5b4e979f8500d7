//! Soft-fail return type.
//!
//! Several stages degrade instead of failing: an unparseable message becomes a
//! plain TTS segment, a broken conversion leaves the audio untouched. `Outcome`
//! carries the value that was actually produced together with the diagnostics
//! explaining any degradation, so callers can tell "worked" from "worked, but".

/// A value plus zero or more diagnostics describing how it was degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T, E> {
    value: T,
    diagnostics: Vec<E>,
}

impl<T, E> Outcome<T, E> {
    /// A value produced without any degradation.
    pub fn clean(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    /// A fallback value together with the reason the preferred path failed.
    pub fn degraded(value: T, diagnostic: E) -> Self {
        Self {
            value,
            diagnostics: vec![diagnostic],
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn diagnostics(&self) -> &[E] {
        &self.diagnostics
    }

    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn into_parts(self) -> (T, Vec<E>) {
        (self.value, self.diagnostics)
    }

    /// Records an additional diagnostic without changing the value.
    pub fn push_diagnostic(&mut self, diagnostic: E) {
        self.diagnostics.push(diagnostic);
    }

    /// Maps the value, keeping diagnostics.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U, E> {
        Outcome {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }
}
