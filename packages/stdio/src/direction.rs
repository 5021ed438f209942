//! Direction-switch state machine.
//!
//! A stream that caches both directions remembers the direction of its
//! last completed operation. Every read, write, or repositioning call
//! looks up its transition here before touching the buffer.
//!
//! | last \ request | Read          | Write         | Reposition    |
//! |----------------|---------------|---------------|---------------|
//! | None           | -             | -             | -             |
//! | Read           | -             | discard+align | discard+align |
//! | Write          | drain         | -             | drain         |
//!
//! Reposition covers seek, flush, and set-buffer; all three leave the
//! stream with no last direction.

/// Direction of the last completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastOp {
    #[default]
    None,
    Read,
    Write,
}

/// What the caller is about to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    Read,
    Write,
    Reposition,
}

/// Work required before the request may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchAction {
    Proceed,
    /// Push buffered writes to the descriptor.
    DrainWrites,
    /// Drop unread read-ahead and move the descriptor back to the
    /// logical position.
    DiscardReadAhead,
}

/// Look up the action for `request` after `last`, and the state the
/// stream is in once the request completes.
pub(crate) fn transition(last: LastOp, request: Request) -> (SwitchAction, LastOp) {
    use SwitchAction::*;

    match (last, request) {
        (LastOp::None, Request::Read) => (Proceed, LastOp::Read),
        (LastOp::None, Request::Write) => (Proceed, LastOp::Write),
        (LastOp::None, Request::Reposition) => (Proceed, LastOp::None),

        (LastOp::Read, Request::Read) => (Proceed, LastOp::Read),
        (LastOp::Read, Request::Write) => (DiscardReadAhead, LastOp::Write),
        (LastOp::Read, Request::Reposition) => (DiscardReadAhead, LastOp::None),

        (LastOp::Write, Request::Read) => (DrainWrites, LastOp::Read),
        (LastOp::Write, Request::Write) => (Proceed, LastOp::Write),
        (LastOp::Write, Request::Reposition) => (DrainWrites, LastOp::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_direction_proceeds() {
        assert_eq!(
            transition(LastOp::Read, Request::Read),
            (SwitchAction::Proceed, LastOp::Read)
        );
        assert_eq!(
            transition(LastOp::Write, Request::Write),
            (SwitchAction::Proceed, LastOp::Write)
        );
    }

    #[test]
    fn write_then_read_drains() {
        assert_eq!(
            transition(LastOp::Write, Request::Read),
            (SwitchAction::DrainWrites, LastOp::Read)
        );
    }

    #[test]
    fn read_then_write_discards() {
        assert_eq!(
            transition(LastOp::Read, Request::Write),
            (SwitchAction::DiscardReadAhead, LastOp::Write)
        );
    }

    #[test]
    fn reposition_clears_direction() {
        for last in [LastOp::None, LastOp::Read, LastOp::Write] {
            let (_, next) = transition(last, Request::Reposition);
            assert_eq!(next, LastOp::None);
        }
    }

    #[test]
    fn fresh_stream_never_needs_work() {
        for request in [Request::Read, Request::Write, Request::Reposition] {
            let (action, _) = transition(LastOp::None, request);
            assert_eq!(action, SwitchAction::Proceed);
        }
    }
}
