//! Line commands for the interactive host

use anyhow::{bail, Result};
use devsel_core::{SelectionController, TypeView};

/// A host UI event, as typed on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch type tab (`type all` for every device)
    Type(TypeView),
    /// Change the search keyword (`search` alone clears it)
    Search(String),
    /// Toggle one device
    Toggle { id: String, checked: bool },
    /// Replace the selection
    Select(Vec<String>),
    Clear,
    /// Check or uncheck every visible device
    SelectAll(bool),
    Show,
    Tabs,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  type <name|all>       switch device type tab
  search [text]         filter by name or id (empty clears)
  toggle <id> on|off    check or uncheck a device or group
  select <id,id,...>    replace the selection
  clear                 deselect everything
  all on|off            check or uncheck every visible device
  show                  print the tree
  tabs                  list type tabs
  quit";

/// Parse one input line; blank lines and `#` comments yield `None`
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "type" => {
            if rest.is_empty() {
                bail!("usage: type <name|all>");
            }
            if rest.eq_ignore_ascii_case("all") {
                Command::Type(TypeView::All)
            } else {
                Command::Type(TypeView::from_label(rest))
            }
        }
        "search" => Command::Search(rest.to_string()),
        "toggle" => {
            let mut parts = rest.split_whitespace();
            let (Some(id), Some(state), None) = (parts.next(), parts.next(), parts.next()) else {
                bail!("usage: toggle <id> on|off");
            };
            Command::Toggle {
                id: id.to_string(),
                checked: parse_switch(state)?,
            }
        }
        "select" => Command::Select(split_ids(rest)),
        "clear" => Command::Clear,
        "all" => Command::SelectAll(parse_switch(rest)?),
        "show" => Command::Show,
        "tabs" => Command::Tabs,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command: {}", other),
    };
    Ok(Some(command))
}

/// Split a comma separated ID list, dropping empty entries
pub fn split_ids(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `on|off` style switches
pub fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        other => bail!("expected on or off, got {:?}", other),
    }
}

/// Forward a mutating command into the controller
///
/// Returns `false` for commands the controller does not handle.
pub fn apply(controller: &mut SelectionController, command: &Command) -> bool {
    match command {
        Command::Type(view) => controller.set_device_type(view.clone()),
        Command::Search(text) => controller.set_search_text(text),
        Command::Toggle { id, checked } => {
            if !controller.on_item_toggled(id, *checked) {
                tracing::warn!(device = %id, "Device is not shown in the current view");
            }
        }
        Command::Select(ids) => controller.set_selected_devices(ids),
        Command::Clear => controller.clear_selection(),
        Command::SelectAll(checked) => controller.toggle_select_all(*checked),
        Command::Show | Command::Tabs | Command::Help | Command::Quit => return false,
    }
    true
}
