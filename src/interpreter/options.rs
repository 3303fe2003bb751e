// File: src/interpreter/options.rs
//
// Interpreter configuration.
//
// Everything is enabled by default. The toggles are independent except that
// `refl` runs on the shared event loop, so disabling events disables it too.

use crate::ast::SourceParser;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Captured output of the `io` builtins
pub type OutputBuffer = Arc<Mutex<Vec<u8>>>;

#[derive(Clone)]
pub struct Options {
    events: bool,
    eval: bool,
    refl: bool,
    cancellation: Option<CancellationToken>,
    parser: Option<Arc<dyn SourceParser>>,
    output: Option<OutputBuffer>,
}

impl Default for Options {
    fn default() -> Self {
        Options { events: true, eval: true, refl: true, cancellation: None, parser: None, output: None }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run without an event loop; the `events` namespace is not registered
    pub fn disable_events(mut self) -> Self {
        self.events = false;
        self
    }

    pub fn disable_eval(mut self) -> Self {
        self.eval = false;
        self
    }

    pub fn disable_refl(mut self) -> Self {
        self.refl = false;
        self
    }

    /// Tie the run to a host token; cancelling it stops loops, sleeps and the event loop
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Parser used by `eval` and `refl`
    pub fn with_parser(mut self, parser: Arc<dyn SourceParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Send `io` output to `buffer` instead of stdout
    pub fn with_output(mut self, buffer: OutputBuffer) -> Self {
        self.output = Some(buffer);
        self
    }

    pub fn events_enabled(&self) -> bool {
        self.events
    }

    pub fn eval_enabled(&self) -> bool {
        self.eval
    }

    pub fn refl_enabled(&self) -> bool {
        self.refl && self.events
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn parser(&self) -> Option<&Arc<dyn SourceParser>> {
        self.parser.as_ref()
    }

    pub fn output(&self) -> Option<&OutputBuffer> {
        self.output.as_ref()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("events", &self.events)
            .field("eval", &self.eval)
            .field("refl", &self.refl_enabled())
            .field("cancellation", &self.cancellation.is_some())
            .field("parser", &self.parser.is_some())
            .field("captured_output", &self.output.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let options = Options::default();
        assert!(options.events_enabled());
        assert!(options.eval_enabled());
        assert!(options.refl_enabled());
        assert!(options.parser().is_none());
    }

    #[test]
    fn test_disabling_events_disables_refl() {
        let options = Options::new().disable_events();
        assert!(!options.events_enabled());
        assert!(!options.refl_enabled());
        assert!(options.eval_enabled());
    }

    #[test]
    fn test_toggles_are_independent() {
        let options = Options::new().disable_eval();
        assert!(options.events_enabled());
        assert!(options.refl_enabled());
        assert!(!options.eval_enabled());

        let options = Options::new().disable_refl();
        assert!(options.eval_enabled());
        assert!(!options.refl_enabled());
    }
}
