use crate::close;

/// The closing-handshake lifecycle of an [`crate::endpoint::Endpoint`].
/// Transitions are monotonic: `Open` → `Closing` → `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Open,
    Closing,
    Closed,
}

impl Default for EndpointState {
    fn default() -> Self {
        EndpointState::Open
    }
}

impl EndpointState {
    pub fn is_closed(self) -> bool {
        matches!(self, EndpointState::Closed)
    }

    /// Given the peer's Close frame (`peer_code` if it carried one, and
    /// whether the trailing payload was valid UTF-8), compute the code this
    /// endpoint must echo back, per the table in the closing-handshake spec.
    pub fn echo_code(peer_code: Option<u16>, payload_is_valid_utf8: bool) -> u16 {
        match peer_code {
            None => close::NORMAL_CLOSURE,
            Some(code) if !close::is_valid(code) => close::PROTOCOL_ERROR,
            Some(_) if !payload_is_valid_utf8 => close::INVALID_PAYLOAD_DATA,
            Some(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_payload_echoes_normal_closure() {
        assert_eq!(EndpointState::echo_code(None, true), close::NORMAL_CLOSURE);
    }

    #[test]
    fn invalid_code_echoes_protocol_error() {
        assert_eq!(EndpointState::echo_code(Some(1), true), close::PROTOCOL_ERROR);
    }

    #[test]
    fn invalid_utf8_echoes_invalid_payload_data() {
        assert_eq!(
            EndpointState::echo_code(Some(1001), false),
            close::INVALID_PAYLOAD_DATA
        );
    }

    #[test]
    fn valid_code_and_payload_is_echoed_verbatim() {
        assert_eq!(EndpointState::echo_code(Some(1001), true), 1001);
    }
}
