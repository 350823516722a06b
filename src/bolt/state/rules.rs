//! Per-version message membership.

use crate::bolt::handshake::ProtocolVersion;
use crate::bolt::message::MessageKind;

/// Which request kinds a protocol version defines, and which of them a
/// `Failed` connection absorbs with IGNORED instead of treating as a
/// protocol violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRules {
    vocabulary: Vec<MessageKind>,
    failed_ignores: Vec<MessageKind>,
}

impl MessageRules {
    /// Build a rule set. `Interrupt` is always defined.
    pub fn new(vocabulary: &[MessageKind], failed_ignores: &[MessageKind]) -> Self {
        let mut vocabulary = vocabulary.to_vec();
        if !vocabulary.contains(&MessageKind::Interrupt) {
            vocabulary.push(MessageKind::Interrupt);
        }
        Self {
            vocabulary,
            failed_ignores: failed_ignores.to_vec(),
        }
    }

    /// Versions 1 and 2: auto-commit only.
    pub fn v1() -> Self {
        use MessageKind::*;
        Self::new(&[Hello, Run, PullAll, DiscardAll, Reset], &[Run, PullAll, DiscardAll])
    }

    /// Versions 3 and 4: explicit transactions and GOODBYE.
    pub fn v3() -> Self {
        use MessageKind::*;
        Self::new(
            &[Hello, Run, Begin, Commit, Rollback, PullAll, DiscardAll, Reset, Goodbye],
            &[Run, PullAll, DiscardAll, Commit, Rollback],
        )
    }

    /// Rules for a registered version.
    pub fn for_version(version: ProtocolVersion) -> Self {
        if version.has_explicit_transactions() {
            Self::v3()
        } else {
            Self::v1()
        }
    }

    pub fn defines(&self, kind: MessageKind) -> bool {
        self.vocabulary.contains(&kind)
    }

    pub fn ignored_when_failed(&self, kind: MessageKind) -> bool {
        self.failed_ignores.contains(&kind)
    }
}
