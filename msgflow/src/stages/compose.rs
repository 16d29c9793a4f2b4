//! Folding an ordered stage list onto a terminal handler.

use super::{Continuation, SharedStage};

/// Composes `stages` around `terminal`.
///
/// The result is `S0.stitch(S1.stitch(... Sn-1.stitch(terminal)))`: stage
/// 0 sees the message first and completes last. An empty list returns
/// `terminal` itself.
pub fn compose(stages: &[SharedStage], terminal: Continuation) -> Continuation {
    let mut next = terminal;
    for stage in stages.iter().rev() {
        next = stage.stitch(next);
    }
    next
}
