use std::time::Duration;

use crate::{Cursor, TerminalReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch the page at `cursor`; `attempt` starts at 1.
    Fetch { cursor: Cursor, attempt: u32 },
    /// Sleep, then deliver `Msg::Wake`.
    Sleep { duration: Duration, reason: SleepReason },
    Finish(TerminalReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    Politeness,
    Retry,
}
