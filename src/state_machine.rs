#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Closed)
    }

    /// Holding a connection attempt or a live connection.
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle | Closed, Connecting)
                | (Connecting, Open)
                | (Connecting | Open, Closing)
                | (Closing, Closed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;

    #[test]
    fn lifecycle_edges() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Closed.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Closing));
        assert!(Open.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));

        assert!(!Idle.can_transition_to(Open));
        assert!(!Open.can_transition_to(Connecting));
        assert!(!Closed.can_transition_to(Closing));
    }

    #[test]
    fn live_states() {
        assert!(Connecting.is_live() && Open.is_live());
        assert!(!Idle.is_live() && !Closing.is_live() && !Closed.is_live());
        assert!(Idle.can_start() && Closed.can_start());
        assert!(!Open.can_start());
    }
}
