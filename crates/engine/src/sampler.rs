//! Stack capture used by the profilers

use tierscope_core::Trace;

/// Captures the current call stack of a trace's owning thread
///
/// The profilers call this from the timer thread; implementations must not
/// block on the traced thread.
pub trait StackSampler: Send + Sync + std::fmt::Debug {
    /// Frames, outermost first
    fn sample(&self, trace: &Trace) -> Vec<String>;
}

/// Samples the trace's open entry stack
///
/// Portable stand-in for a native thread dump: the frames are the messages
/// of the entries currently open, root first.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntryStackSampler;

impl StackSampler for EntryStackSampler {
    fn sample(&self, trace: &Trace) -> Vec<String> {
        trace.open_entry_stack()
    }
}
