use serde::Serialize;

use schoolgate_auth::LeaveReason;

/// Broadcast to mounted protected views.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum NavigationSignal {
    /// Navigate away from any protected view now.
    LeaveProtectedView { reason: LeaveReason },
}

impl NavigationSignal {
    pub fn reason(&self) -> LeaveReason {
        match self {
            NavigationSignal::LeaveProtectedView { reason } => *reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_a_signal_tag() {
        let signal = NavigationSignal::LeaveProtectedView {
            reason: LeaveReason::ProviderSignedOut,
        };
        assert_eq!(
            serde_json::to_value(signal).unwrap(),
            serde_json::json!({"signal": "leave_protected_view", "reason": "provider_signed_out"})
        );
    }
}
