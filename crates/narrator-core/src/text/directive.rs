//! Inline stage directions.
//!
//! The model writes presentation changes inline, e.g.
//! `テキスト<setAvatar 喜び>です。`. Each `<name arg>` marker is removed from
//! the spoken text together with the whitespace around it and mapped to a
//! [`Command`]. Markers with an unknown name are dropped with a warning.

use tracing::warn;

use crate::avatar::DEFAULT_AVATAR;
use crate::domain::Command;

/// A fragment split into what is spoken and what is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Text with all markers removed.
    pub display_text: String,
    /// Commands in marker order.
    pub commands: Vec<Command>,
}

/// Remove every `<name arg>` marker from `fragment`.
///
/// A `<` without a closing `>` is ordinary text.
pub fn extract_directives(fragment: &str) -> Extracted {
    let mut display_text = String::with_capacity(fragment.len());
    let mut commands = Vec::new();
    let mut rest = fragment;

    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else {
            break;
        };
        let body = &after_open[..close];
        if body.is_empty() {
            // `<>` is not a marker; keep it verbatim.
            display_text.push_str(&rest[..open + 2]);
            rest = &after_open[1..];
            continue;
        }

        display_text.push_str(&rest[..open]);
        let trimmed_len = display_text.trim_end().len();
        display_text.truncate(trimmed_len);

        if let Some(command) = parse_marker(body) {
            commands.push(command);
        }

        rest = after_open[close + 1..].trim_start();
    }
    display_text.push_str(rest);

    Extracted {
        display_text,
        commands,
    }
}

/// Map a marker body (`name arg...`) to a command.
fn parse_marker(body: &str) -> Option<Command> {
    let body = body.trim();
    let (name, arg) = match body.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (body, ""),
    };

    match name {
        "setAvatar" => {
            let avatar = if arg.is_empty() { DEFAULT_AVATAR } else { arg };
            Some(Command::SetAvatar {
                avatar: avatar.to_string(),
            })
        }
        _ => {
            warn!(directive = %name, arg = %arg, "Unknown directive, dropping");
            None
        }
    }
}
