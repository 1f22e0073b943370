//! Prompts and menus shown to the user.

use super::actions::{ButtonAction, MAX_PRESET_NAME_BYTES};
use crate::channels::Reply;
use crate::session::WizardState;

pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred. Please retry.";
pub const BUTTON_EXPIRED: &str = "This button has expired. Use /start to open the menu.";
pub const DRAFT_LOST: &str = "Something went wrong with your signal. Please start again with /newsignal.";
pub const PRESET_DELETE_MISSING: &str = "Error deleting preset. Preset does not exist.";

/// Top-level menu.
pub fn main_menu() -> Reply {
    Reply::text("Choose an option:")
        .with_row(vec![ButtonAction::NewSignal.button("New Signal")])
        .with_row(vec![
            ButtonAction::ManagePresets.button("Manage API Key Presets"),
        ])
}

/// Credential step: one button per saved preset plus manual entry.
pub fn preset_selection(names: &[String]) -> Reply {
    preset_selection_with_text("Select a preset or input the license manually:", names)
}

/// Re-offer the selection after the chosen preset vanished.
pub fn preset_missing(name: &str, names: &[String]) -> Reply {
    preset_selection_with_text(
        &format!("Preset '{name}' no longer exists. Select a preset or input the license manually:"),
        names,
    )
}

fn preset_selection_with_text(text: &str, names: &[String]) -> Reply {
    Reply::text(text)
        .with_row(
            names
                .iter()
                .map(|n| ButtonAction::SelectPreset(n.clone()).button(n.as_str()))
                .collect(),
        )
        .with_row(vec![ButtonAction::InputManually.button("Input manually")])
        .with_row(vec![ButtonAction::BackToMain.button("Back to Main")])
}

/// The prompt for the step the user is now at.
pub fn prompt_for(state: WizardState) -> Reply {
    match state {
        WizardState::AwaitingCredential => Reply::text("Enter API key:"),
        WizardState::AwaitingSide => Reply::text("Enter trade side (long/short):"),
        WizardState::AwaitingSymbol => Reply::text("Enter symbol:"),
        WizardState::AwaitingRisk => Reply::text("Enter risk:"),
        WizardState::AwaitingStopPrice => with_skip("Enter stop price:", ButtonAction::SkipStopPrice),
        WizardState::AwaitingTakeProfit => {
            with_skip("Enter take profit:", ButtonAction::SkipTakeProfit)
        }
        WizardState::AwaitingComment => with_skip("Enter comment:", ButtonAction::SkipComment),
        WizardState::AwaitingPresetCredential => Reply::text("Please enter the API Key:")
            .with_row(vec![ButtonAction::BackToMain.button("Back to Main")]),
        WizardState::AwaitingPresetName => {
            Reply::text("Please provide a friendly name for this API Key:")
        }
    }
}

fn with_skip(text: &str, skip: ButtonAction) -> Reply {
    Reply::text(text).with_row(vec![skip.button("Skip")])
}

/// Strict-number rejection: explain and ask again for the same step.
pub fn invalid_number(state: WizardState, reason: &str) -> Reply {
    let prompt = prompt_for(state);
    Reply {
        text: format!("Invalid number ({reason}). {}", prompt.text),
        keyboard: prompt.keyboard,
    }
}

/// Preset-management menu.
pub fn manage_presets() -> Reply {
    Reply::text("Manage your presets:")
        .with_row(vec![ButtonAction::AddPreset.button("Add New Preset")])
        .with_row(vec![ButtonAction::ListPresets.button("List Presets")])
        .with_row(vec![ButtonAction::DeletePreset.button("Delete Preset")])
        .with_row(vec![ButtonAction::BackToMain.button("Back to Main")])
}

pub fn preset_saved(name: &str) -> Reply {
    Reply::text(format!("API Key preset saved with name: {name}"))
}

pub fn preset_name_too_long() -> Reply {
    Reply::text(format!(
        "That name is too long (max {MAX_PRESET_NAME_BYTES} bytes). Please provide a shorter friendly name for this API Key:"
    ))
}

/// Every preset with its credential, shown to the owner.
pub fn preset_list<'a>(presets: impl IntoIterator<Item = (&'a String, &'a String)>) -> Reply {
    let mut text = String::from("Saved API Key Presets:");
    let mut empty = true;
    for (name, credential) in presets {
        text.push_str(&format!("\nName: {name}, API Key: {credential}"));
        empty = false;
    }
    if empty {
        text.push_str("\nNo presets saved yet.");
    }
    Reply::text(text).with_row(vec![back_to_manage()])
}

/// One button per preset, each deleting it.
pub fn delete_selection(names: &[String]) -> Reply {
    let mut reply = Reply::text("Select the preset you want to delete:");
    for name in names {
        reply = reply.with_row(vec![ButtonAction::Delete(name.clone()).button(name.as_str())]);
    }
    reply.with_row(vec![back_to_manage()])
}

pub fn preset_deleted(name: &str) -> Reply {
    Reply::text(format!("Preset '{name}' deleted."))
}

fn back_to_manage() -> crate::channels::Button {
    ButtonAction::ManagePresets.button("Back to Manage Presets")
}
