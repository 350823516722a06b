//! Bolt protocol message types.
//!
//! Requests and responses for protocol versions 1 through 4, plus the
//! [`MessageCodec`] boundary that turns reassembled chunk payloads into
//! messages and back.

pub mod codec;
pub mod request;
pub mod response;

pub use codec::{MessageCodec, PackStreamCodec};
pub use request::*;
pub use response::*;

/// Bolt message tags.
pub mod tag {
    /// HELLO message tag (0x01); INIT before version 3
    pub const HELLO: u8 = 0x01;
    /// GOODBYE message tag (0x02)
    pub const GOODBYE: u8 = 0x02;
    /// RESET message tag (0x0F)
    pub const RESET: u8 = 0x0F;
    /// RUN message tag (0x10)
    pub const RUN: u8 = 0x10;
    /// BEGIN message tag (0x11)
    pub const BEGIN: u8 = 0x11;
    /// COMMIT message tag (0x12)
    pub const COMMIT: u8 = 0x12;
    /// ROLLBACK message tag (0x13)
    pub const ROLLBACK: u8 = 0x13;
    /// DISCARD message tag (0x2F); DISCARD_ALL before version 4
    pub const DISCARD: u8 = 0x2F;
    /// PULL message tag (0x3F); PULL_ALL before version 4
    pub const PULL: u8 = 0x3F;

    /// SUCCESS response tag (0x70)
    pub const SUCCESS: u8 = 0x70;
    /// RECORD response tag (0x71)
    pub const RECORD: u8 = 0x71;
    /// IGNORED response tag (0x7E)
    pub const IGNORED: u8 = 0x7E;
    /// FAILURE response tag (0x7F)
    pub const FAILURE: u8 = 0x7F;
}

/// Request kinds as seen by the state machine.
///
/// `Interrupt` has no wire form; it is raised by the connection when a RESET
/// is read ahead of the message currently being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Run,
    Begin,
    Commit,
    Rollback,
    PullAll,
    DiscardAll,
    Reset,
    Interrupt,
    Goodbye,
}

impl MessageKind {
    /// Every kind, in table order.
    pub const ALL: [MessageKind; 10] = [
        MessageKind::Hello,
        MessageKind::Run,
        MessageKind::Begin,
        MessageKind::Commit,
        MessageKind::Rollback,
        MessageKind::PullAll,
        MessageKind::DiscardAll,
        MessageKind::Reset,
        MessageKind::Interrupt,
        MessageKind::Goodbye,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Hello => "HELLO",
            MessageKind::Run => "RUN",
            MessageKind::Begin => "BEGIN",
            MessageKind::Commit => "COMMIT",
            MessageKind::Rollback => "ROLLBACK",
            MessageKind::PullAll => "PULL_ALL",
            MessageKind::DiscardAll => "DISCARD_ALL",
            MessageKind::Reset => "RESET",
            MessageKind::Interrupt => "INTERRUPT",
            MessageKind::Goodbye => "GOODBYE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tag::*;
    use super::*;

    #[test]
    fn test_request_tags() {
        assert_eq!(HELLO, 0x01);
        assert_eq!(GOODBYE, 0x02);
        assert_eq!(RESET, 0x0F);
        assert_eq!(RUN, 0x10);
        assert_eq!(BEGIN, 0x11);
        assert_eq!(COMMIT, 0x12);
        assert_eq!(ROLLBACK, 0x13);
        assert_eq!(DISCARD, 0x2F);
        assert_eq!(PULL, 0x3F);
    }

    #[test]
    fn test_kind_of_request() {
        assert_eq!(BoltRequest::Reset.kind(), MessageKind::Reset);
        assert_eq!(BoltRequest::PullAll.name(), "PULL_ALL");
        assert_eq!(BoltRequest::Run(RunMessage::new("RETURN 1")).kind(), MessageKind::Run);
    }
}
