/// Which side of the connection this endpoint is playing. Drives masking
/// direction (clients mask outbound frames, servers never do) and the
/// handshake path taken during construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn is_client(self) -> bool {
        matches!(self, Role::Client)
    }
}
