//! Wizard state machine: tracks which prompt the user is answering.

use serde::{Deserialize, Serialize};

use super::draft::SignalField;

/// What the next free-text message from a user means.
///
/// The signal wizard progresses linearly: AwaitingCredential → AwaitingSide →
/// AwaitingSymbol → AwaitingRisk → AwaitingStopPrice → AwaitingTakeProfit →
/// AwaitingComment, after which the signal is dispatched and the user goes
/// back to idle. The preset sub-flow is AwaitingPresetCredential →
/// AwaitingPresetName. Idle is represented by the absence of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    AwaitingCredential,
    AwaitingSide,
    AwaitingSymbol,
    AwaitingRisk,
    AwaitingStopPrice,
    AwaitingTakeProfit,
    AwaitingComment,
    AwaitingPresetCredential,
    AwaitingPresetName,
}

impl WizardState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WizardState) -> bool {
        use WizardState::*;
        matches!(
            (self, target),
            (AwaitingCredential, AwaitingSide)
                | (AwaitingSide, AwaitingSymbol)
                | (AwaitingSymbol, AwaitingRisk)
                | (AwaitingRisk, AwaitingStopPrice)
                | (AwaitingStopPrice, AwaitingTakeProfit)
                | (AwaitingTakeProfit, AwaitingComment)
                | (AwaitingPresetCredential, AwaitingPresetName)
        )
    }

    /// The next state in this state's flow. `None` means the flow ends and
    /// the user returns to idle.
    pub fn next(&self) -> Option<WizardState> {
        use WizardState::*;
        match self {
            AwaitingCredential => Some(AwaitingSide),
            AwaitingSide => Some(AwaitingSymbol),
            AwaitingSymbol => Some(AwaitingRisk),
            AwaitingRisk => Some(AwaitingStopPrice),
            AwaitingStopPrice => Some(AwaitingTakeProfit),
            AwaitingTakeProfit => Some(AwaitingComment),
            AwaitingComment => None,
            AwaitingPresetCredential => Some(AwaitingPresetName),
            AwaitingPresetName => None,
        }
    }

    /// The draft field collected in this state, if this is a signal-wizard state.
    pub fn field(&self) -> Option<SignalField> {
        use WizardState::*;
        match self {
            AwaitingCredential => Some(SignalField::Credential),
            AwaitingSide => Some(SignalField::TradeSide),
            AwaitingSymbol => Some(SignalField::Symbol),
            AwaitingRisk => Some(SignalField::Risk),
            AwaitingStopPrice => Some(SignalField::StopPrice),
            AwaitingTakeProfit => Some(SignalField::TakeProfit),
            AwaitingComment => Some(SignalField::Comment),
            AwaitingPresetCredential | AwaitingPresetName => None,
        }
    }

    /// Whether the user may press "Skip" in this state.
    pub fn is_skippable(&self) -> bool {
        self.field().is_some_and(|f| f.is_optional())
    }

    /// Whether this state belongs to the preset-management sub-flow.
    pub fn is_preset_flow(&self) -> bool {
        matches!(
            self,
            Self::AwaitingPresetCredential | Self::AwaitingPresetName
        )
    }
}

impl std::fmt::Display for WizardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingCredential => "awaiting_credential",
            Self::AwaitingSide => "awaiting_side",
            Self::AwaitingSymbol => "awaiting_symbol",
            Self::AwaitingRisk => "awaiting_risk",
            Self::AwaitingStopPrice => "awaiting_stop_price",
            Self::AwaitingTakeProfit => "awaiting_take_profit",
            Self::AwaitingComment => "awaiting_comment",
            Self::AwaitingPresetCredential => "awaiting_preset_credential",
            Self::AwaitingPresetName => "awaiting_preset_name",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [WizardState; 9] = [
        WizardState::AwaitingCredential,
        WizardState::AwaitingSide,
        WizardState::AwaitingSymbol,
        WizardState::AwaitingRisk,
        WizardState::AwaitingStopPrice,
        WizardState::AwaitingTakeProfit,
        WizardState::AwaitingComment,
        WizardState::AwaitingPresetCredential,
        WizardState::AwaitingPresetName,
    ];

    #[test]
    fn next_is_always_a_valid_transition() {
        for state in ALL {
            if let Some(next) = state.next() {
                assert!(
                    state.can_transition_to(next),
                    "{state} should transition to {next}"
                );
            }
        }
    }

    #[test]
    fn invalid_transitions() {
        use WizardState::*;
        // Skip steps
        assert!(!AwaitingCredential.can_transition_to(AwaitingSymbol));
        assert!(!AwaitingRisk.can_transition_to(AwaitingComment));
        // Go backward
        assert!(!AwaitingSymbol.can_transition_to(AwaitingSide));
        // Cross flows
        assert!(!AwaitingComment.can_transition_to(AwaitingPresetCredential));
        assert!(!AwaitingPresetName.can_transition_to(AwaitingSide));
        // Self-transition
        assert!(!AwaitingSide.can_transition_to(AwaitingSide));
    }

    #[test]
    fn wizard_walks_fields_in_order() {
        let mut state = WizardState::AwaitingCredential;
        let mut fields = vec![state.field().unwrap()];
        while let Some(next) = state.next() {
            fields.push(next.field().unwrap());
            state = next;
        }
        assert_eq!(fields, SignalField::ORDER.to_vec());
        assert_eq!(state, WizardState::AwaitingComment);
    }

    #[test]
    fn preset_flow_ends_after_name() {
        use WizardState::*;
        assert_eq!(AwaitingPresetCredential.next(), Some(AwaitingPresetName));
        assert_eq!(AwaitingPresetName.next(), None);
        assert!(AwaitingPresetName.is_preset_flow());
        assert!(AwaitingPresetName.field().is_none());
    }

    #[test]
    fn only_optional_steps_are_skippable() {
        use WizardState::*;
        let skippable: Vec<_> = ALL.into_iter().filter(|s| s.is_skippable()).collect();
        assert_eq!(
            skippable,
            vec![AwaitingStopPrice, AwaitingTakeProfit, AwaitingComment]
        );
    }

    #[test]
    fn display_matches_serde() {
        for state in ALL {
            let display = format!("{state}");
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(
                format!("\"{display}\""),
                json,
                "Display and serde should match for {state:?}"
            );
        }
    }
}
