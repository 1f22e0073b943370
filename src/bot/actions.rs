//! Button payloads: every action a keyboard button can carry.
//!
//! Argument-carrying actions are written `<tag>:<argument>`; everything after
//! the first `:` is the argument, so preset names may contain any character.

use crate::channels::Button;

/// Longest preset name accepted. Telegram limits callback data to 64 bytes
/// and the longest tag (`preset:`) plus the name must fit.
pub const MAX_PRESET_NAME_BYTES: usize = 48;

const SELECT_PRESET_TAG: &str = "preset";
const DELETE_TAG: &str = "delete";

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    NewSignal,
    SelectPreset(String),
    InputManually,
    ManagePresets,
    AddPreset,
    ListPresets,
    DeletePreset,
    Delete(String),
    BackToMain,
    SkipStopPrice,
    SkipTakeProfit,
    SkipComment,
    MainMenu,
}

impl ButtonAction {
    /// Payload string carried by the button.
    pub fn encode(&self) -> String {
        match self {
            Self::NewSignal => "new_signal".into(),
            Self::SelectPreset(name) => format!("{SELECT_PRESET_TAG}:{name}"),
            Self::InputManually => "input_manually".into(),
            Self::ManagePresets => "manage_presets".into(),
            Self::AddPreset => "add_preset".into(),
            Self::ListPresets => "list_presets".into(),
            Self::DeletePreset => "delete_preset".into(),
            Self::Delete(name) => format!("{DELETE_TAG}:{name}"),
            Self::BackToMain => "back_to_main".into(),
            Self::SkipStopPrice => "skip_sl".into(),
            Self::SkipTakeProfit => "skip_tp".into(),
            Self::SkipComment => "skip_comment".into(),
            Self::MainMenu => "main_menu".into(),
        }
    }

    /// Decode a payload. Unknown payloads yield `None`.
    pub fn parse(payload: &str) -> Option<ButtonAction> {
        if let Some((tag, arg)) = payload.split_once(':') {
            return match tag {
                SELECT_PRESET_TAG => Some(Self::SelectPreset(arg.to_string())),
                DELETE_TAG => Some(Self::Delete(arg.to_string())),
                _ => None,
            };
        }
        Some(match payload {
            "new_signal" => Self::NewSignal,
            "input_manually" => Self::InputManually,
            "manage_presets" => Self::ManagePresets,
            "add_preset" => Self::AddPreset,
            "list_presets" => Self::ListPresets,
            "delete_preset" => Self::DeletePreset,
            "back_to_main" => Self::BackToMain,
            "skip_sl" => Self::SkipStopPrice,
            "skip_tp" => Self::SkipTakeProfit,
            "skip_comment" => Self::SkipComment,
            "main_menu" => Self::MainMenu,
            _ => return None,
        })
    }

    /// A button labeled `label` that sends this action.
    pub fn button(&self, label: impl Into<String>) -> Button {
        Button {
            label: label.into(),
            payload: self.encode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_actions_use_fixed_payloads() {
        assert_eq!(ButtonAction::SkipStopPrice.encode(), "skip_sl");
        assert_eq!(ButtonAction::SkipTakeProfit.encode(), "skip_tp");
        assert_eq!(
            ButtonAction::parse("input_manually"),
            Some(ButtonAction::InputManually)
        );
        assert_eq!(ButtonAction::parse("main_menu"), Some(ButtonAction::MainMenu));
    }

    #[test]
    fn names_with_underscores_survive() {
        let action = ButtonAction::SelectPreset("my_main_key".into());
        assert_eq!(action.encode(), "preset:my_main_key");
        assert_eq!(ButtonAction::parse(&action.encode()), Some(action));
    }

    #[test]
    fn names_with_colons_survive() {
        let action = ButtonAction::Delete("acct:2:live".into());
        assert_eq!(action.encode(), "delete:acct:2:live");
        assert_eq!(ButtonAction::parse("delete:acct:2:live"), Some(action));
    }

    #[test]
    fn delete_preset_is_not_a_delete_with_argument() {
        assert_eq!(
            ButtonAction::parse("delete_preset"),
            Some(ButtonAction::DeletePreset)
        );
        assert_eq!(
            ButtonAction::parse("delete:preset"),
            Some(ButtonAction::Delete("preset".into()))
        );
    }

    #[test]
    fn unknown_payloads_are_rejected() {
        assert_eq!(ButtonAction::parse("preset_main"), None);
        assert_eq!(ButtonAction::parse("bogus:thing"), None);
        assert_eq!(ButtonAction::parse(""), None);
    }

    #[test]
    fn longest_name_fits_in_callback_data() {
        let name = "n".repeat(MAX_PRESET_NAME_BYTES);
        assert!(ButtonAction::SelectPreset(name.clone()).encode().len() <= 64);
        assert!(ButtonAction::Delete(name).encode().len() <= 64);
    }

    #[test]
    fn button_carries_encoded_payload() {
        let b = ButtonAction::Delete("x".into()).button("x");
        assert_eq!(b.label, "x");
        assert_eq!(b.payload, "delete:x");
    }
}
