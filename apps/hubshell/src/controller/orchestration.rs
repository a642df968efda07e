//! Orchestration from typed terminal input to the backend command queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::BackendCommand;

pub const HELP: &str = "\
commands:
  open <address or search terms>   load content (bare input loads it too)
  select <menu> <n>                load the n-th link of a menu (1-based)
  menus                            list hub menus
  home | refresh                   load the home address or reload the current one
  mode <id> | next                 switch visual mode or cycle to the next one
  click <x> <y>                    deliver a click to the visual root
  reload                           re-read the hub document
  ticker                           refresh the news ticker now
  status                           show address, mode and active notice
  help | quit";

/// What one line of input asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Backend(BackendCommand),
    Menus,
    Status,
    Help,
    Quit,
    Nothing,
}

pub fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "" => Input::Nothing,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        "status" => Input::Status,
        "menus" => Input::Menus,
        "home" => Input::Backend(BackendCommand::Home),
        "refresh" => Input::Backend(BackendCommand::Refresh),
        "next" => Input::Backend(BackendCommand::CycleMode),
        "reload" => Input::Backend(BackendCommand::ReloadHub),
        "ticker" => Input::Backend(BackendCommand::RefreshTicker),
        "mode" => {
            if rest.is_empty() {
                return Err("usage: mode <id>".to_string());
            }
            Input::Backend(BackendCommand::SwitchMode {
                mode_id: rest.to_string(),
            })
        }
        "open" => Input::Backend(BackendCommand::Load {
            input: rest.to_string(),
        }),
        "select" => {
            let mut parts = rest.split_whitespace();
            let (Some(menu_id), Some(position), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err("usage: select <menu> <n>".to_string());
            };
            let index = match position.parse::<usize>() {
                Ok(n) if n >= 1 => n - 1,
                _ => return Err(format!("invalid menu position '{position}'")),
            };
            Input::Backend(BackendCommand::Select {
                menu_id: menu_id.to_string(),
                index,
            })
        }
        "click" => {
            let coords: Vec<f32> = rest
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| "usage: click <x> <y>".to_string())?;
            let &[x, y] = coords.as_slice() else {
                return Err("usage: click <x> <y>".to_string());
            };
            Input::Backend(BackendCommand::Click { x, y })
        }
        _ => Input::Backend(BackendCommand::Load {
            input: line.to_string(),
        }),
    };
    Ok(input)
}

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
    status: &mut String,
) {
    let cmd_name = cmd.name();
    match cmd_tx.try_send(cmd) {
        Ok(()) => tracing::debug!(command = cmd_name, "queued ui->backend command"),
        Err(TrySendError::Full(_)) => {
            *status = "Command queue is full; please retry".to_string();
        }
        Err(TrySendError::Disconnected(_)) => {
            *status =
                "Backend command processor disconnected (possible startup/runtime failure)"
                    .to_string();
        }
    }
}
