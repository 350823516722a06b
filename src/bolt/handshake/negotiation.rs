//! Bolt handshake negotiation.

use bytes::{Buf, BytesMut};

use super::{HandshakeError, ProtocolVersion, VersionProposal, BOLT_MAGIC, HANDSHAKE_SIZE};

/// What a call to [`HandshakeNegotiator::accumulate`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Fewer than 20 bytes seen so far; wait for more input.
    PartialHandshake,
    /// The preamble is not `0x6060B017`.
    InvalidHandshake,
    /// No proposed version is registered.
    NoApplicableProtocol,
    /// The first registered version in client preference order.
    ProtocolChosen(ProtocolVersion),
    /// Encryption is required but the transport is plaintext.
    InsecureHandshake,
}

impl HandshakeOutcome {
    /// Bytes the server must send back, if any.
    ///
    /// A chosen version is echoed; a rejection is four zero bytes; invalid
    /// and insecure handshakes are closed without a reply.
    pub fn reply(&self) -> Option<[u8; 4]> {
        match self {
            HandshakeOutcome::ProtocolChosen(v) => Some(v.to_bytes()),
            HandshakeOutcome::NoApplicableProtocol => Some([0; 4]),
            _ => None,
        }
    }

    /// Whether negotiation has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        !matches!(self, HandshakeOutcome::PartialHandshake)
    }
}

/// Accumulates the 20-byte client handshake across reads and picks a version.
///
/// The handshake buffer is private to one connection and dropped with the
/// negotiator once the outcome is known.
#[derive(Debug)]
pub struct HandshakeNegotiator {
    /// Versions this server can speak
    supported: Vec<ProtocolVersion>,
    /// Reject plaintext transports before reading anything
    encryption_required: bool,
    /// Transport underneath is TLS
    secure: bool,
    buffer: [u8; HANDSHAKE_SIZE],
    filled: usize,
    outcome: Option<HandshakeOutcome>,
    proposals: [u32; 4],
}

impl HandshakeNegotiator {
    /// Create a negotiator accepting the given versions.
    pub fn new(supported: Vec<ProtocolVersion>) -> Self {
        Self {
            supported,
            encryption_required: false,
            secure: false,
            buffer: [0; HANDSHAKE_SIZE],
            filled: 0,
            outcome: None,
            proposals: [0; 4],
        }
    }

    /// Refuse plaintext transports.
    pub fn require_encryption(mut self, required: bool) -> Self {
        self.encryption_required = required;
        self
    }

    /// Mark the transport as encrypted.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Consume handshake bytes from `src`.
    ///
    /// Takes at most the bytes still missing from the 20-byte handshake;
    /// anything after them stays in `src` for the negotiated protocol. Once
    /// an outcome is reached further calls return it without touching `src`.
    pub fn accumulate(&mut self, src: &mut BytesMut) -> HandshakeOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        if self.encryption_required && !self.secure {
            return self.finish(HandshakeOutcome::InsecureHandshake);
        }

        let take = (HANDSHAKE_SIZE - self.filled).min(src.len());
        self.buffer[self.filled..self.filled + take].copy_from_slice(&src[..take]);
        src.advance(take);
        self.filled += take;

        if self.filled < HANDSHAKE_SIZE {
            return HandshakeOutcome::PartialHandshake;
        }

        if self.buffer[..4] != BOLT_MAGIC {
            return self.finish(HandshakeOutcome::InvalidHandshake);
        }

        for (slot, chunk) in self.proposals.iter_mut().zip(self.buffer[4..].chunks_exact(4)) {
            *slot = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let outcome = match self.negotiate() {
            Some(version) => HandshakeOutcome::ProtocolChosen(version),
            None => HandshakeOutcome::NoApplicableProtocol,
        };
        self.finish(outcome)
    }

    /// First proposal (in client order) with a supported candidate.
    fn negotiate(&self) -> Option<ProtocolVersion> {
        self.proposals
            .iter()
            .map(|&raw| VersionProposal::new(raw))
            .filter(|p| !p.is_empty())
            .find_map(|p| p.candidates().find(|v| self.supported.contains(v)))
    }

    fn finish(&mut self, outcome: HandshakeOutcome) -> HandshakeOutcome {
        self.outcome = Some(outcome);
        outcome
    }

    /// Client proposals, available once all 20 bytes have arrived.
    pub fn proposals(&self) -> Option<[u32; 4]> {
        (self.filled == HANDSHAKE_SIZE).then_some(self.proposals)
    }

    /// Describe a failed outcome as an error.
    pub fn error(&self) -> Option<HandshakeError> {
        match self.outcome? {
            HandshakeOutcome::InvalidHandshake => {
                let mut received = [0u8; 4];
                received.copy_from_slice(&self.buffer[..4]);
                Some(HandshakeError::InvalidMagic {
                    expected: BOLT_MAGIC,
                    received,
                })
            }
            HandshakeOutcome::NoApplicableProtocol => Some(HandshakeError::NoCompatibleVersion {
                proposed: self.proposals,
            }),
            HandshakeOutcome::InsecureHandshake => Some(HandshakeError::Insecure),
            HandshakeOutcome::PartialHandshake | HandshakeOutcome::ProtocolChosen(_) => None,
        }
    }
}

/// Build a client handshake message.
///
/// This is mainly useful for testing.
pub fn build_client_handshake(versions: &[u32]) -> [u8; HANDSHAKE_SIZE] {
    let mut data = [0u8; HANDSHAKE_SIZE];
    data[0..4].copy_from_slice(&BOLT_MAGIC);
    for (i, version) in versions.iter().take(4).enumerate() {
        let offset = 4 + i * 4;
        data[offset..offset + 4].copy_from_slice(&version.to_be_bytes());
    }
    data
}
