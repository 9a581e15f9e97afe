//! Line protocol spoken between the display server and its client.
//!
//! Requests are single lines:
//!
//! - `Open`, `Close`
//! - `ShowModalDialog|<DialogType>|<DialogStyle>|<base64 JSON options>`
//! - `ShowProgressDialog|<DialogStyle>|<base64 JSON options>`
//! - `UpdateProgressDialog|<base64 JSON update>`
//! - `ProgressDialogOpen`, `CloseProgressDialog`
//!
//! Responses are `True`/`False`, a base64 JSON payload, or `Error|<message>`.
//! The progress verbs answer with the dialog's open state, except
//! `CloseProgressDialog`, which answers `True` once the dialog is gone.

use crate::display::dialog::{
    DialogRequest, DialogResponse, DialogStyle, DialogType, ProgressDialogOptions, ProgressUpdate,
};
use crate::error::{DeployError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const SEPARATOR: char = '|';
const ERROR_PREFIX: &str = "Error|";

/// Message of the fault raised when the client stops answering.
pub const CLIENT_GONE_MESSAGE: &str = "The display client shut down outside of our control.";

/// A request sent from the server to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open,
    Close,
    ShowModalDialog {
        style: DialogStyle,
        request: DialogRequest,
    },
    ShowProgressDialog {
        style: DialogStyle,
        options: ProgressDialogOptions,
    },
    ProgressDialogOpen,
    UpdateProgressDialog(ProgressUpdate),
    CloseProgressDialog,
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Open => "Open",
            Command::Close => "Close",
            Command::ShowModalDialog { .. } => "ShowModalDialog",
            Command::ShowProgressDialog { .. } => "ShowProgressDialog",
            Command::ProgressDialogOpen => "ProgressDialogOpen",
            Command::UpdateProgressDialog(_) => "UpdateProgressDialog",
            Command::CloseProgressDialog => "CloseProgressDialog",
        }
    }

    /// Render the command as one protocol line, without the terminator.
    pub fn encode(&self) -> Result<String> {
        match self {
            Command::Open
            | Command::Close
            | Command::ProgressDialogOpen
            | Command::CloseProgressDialog => Ok(self.verb().to_string()),
            Command::ShowModalDialog { style, request } => {
                request.validate()?;
                Ok(format!(
                    "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
                    self.verb(),
                    request.dialog_type(),
                    style,
                    STANDARD.encode(request.to_json()?)
                ))
            }
            Command::ShowProgressDialog { style, options } => {
                options.validate()?;
                Ok(format!(
                    "{}{SEPARATOR}{}{SEPARATOR}{}",
                    self.verb(),
                    style,
                    STANDARD.encode(serde_json::to_string(options)?)
                ))
            }
            Command::UpdateProgressDialog(update) => {
                update.validate()?;
                Ok(format!(
                    "{}{SEPARATOR}{}",
                    self.verb(),
                    STANDARD.encode(serde_json::to_string(update)?)
                ))
            }
        }
    }

    /// Parse a request line. The dialog type token selects the options type.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(4, SEPARATOR);
        let verb = parts.next().unwrap_or_default();
        match verb {
            "Open" | "Close" | "ProgressDialogOpen" | "CloseProgressDialog"
                if parts.next().is_some() =>
            {
                Err(protocol(format!("{verb} takes no arguments")))
            }
            "Open" => Ok(Command::Open),
            "Close" => Ok(Command::Close),
            "ProgressDialogOpen" => Ok(Command::ProgressDialogOpen),
            "CloseProgressDialog" => Ok(Command::CloseProgressDialog),
            "ShowModalDialog" => {
                let (Some(dialog_type), Some(style), Some(payload)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(protocol("ShowModalDialog needs a type, a style and a payload"));
                };
                let dialog_type: DialogType = dialog_type.parse()?;
                let style: DialogStyle = style.parse()?;
                let json = decode_base64(payload)?;
                Ok(Command::ShowModalDialog {
                    style,
                    request: DialogRequest::from_json(dialog_type, &json)?,
                })
            }
            "ShowProgressDialog" => {
                let (Some(style), Some(payload), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(protocol("ShowProgressDialog needs a style and a payload"));
                };
                let style: DialogStyle = style.parse()?;
                let options: ProgressDialogOptions =
                    serde_json::from_str(&decode_base64(payload)?)?;
                options.validate()?;
                Ok(Command::ShowProgressDialog { style, options })
            }
            "UpdateProgressDialog" => {
                let (Some(payload), None) = (parts.next(), parts.next()) else {
                    return Err(protocol("UpdateProgressDialog needs exactly one payload"));
                };
                let update: ProgressUpdate = serde_json::from_str(&decode_base64(payload)?)?;
                update.validate()?;
                Ok(Command::UpdateProgressDialog(update))
            }
            other => Err(protocol(format!("unknown command: {other:?}"))),
        }
    }
}

/// Render a boolean response.
pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Render a dialog result as a base64 JSON payload.
pub fn encode_payload(response: &DialogResponse) -> Result<String> {
    Ok(STANDARD.encode(response.to_json()?))
}

/// Render an error response. Line breaks would split the frame, so they are
/// folded into spaces.
pub fn encode_error(message: &str) -> String {
    let flattened: String = message
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{ERROR_PREFIX}{flattened}")
}

/// Interpret a raw response line.
///
/// A missing or blank line means the client is gone. An `Error|` line
/// (prefix matched ignoring ASCII case) becomes [`DeployError::Remote`].
pub fn decode_response_line(line: Option<String>) -> Result<String> {
    let line = match line {
        Some(line) if !line.trim().is_empty() => line,
        _ => {
            return Err(DeployError::ChannelFault {
                message: CLIENT_GONE_MESSAGE.to_string(),
            })
        }
    };

    let has_error_prefix = line
        .get(..ERROR_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ERROR_PREFIX));
    if has_error_prefix {
        return Err(DeployError::Remote {
            message: line[ERROR_PREFIX.len()..].to_string(),
        });
    }
    Ok(line)
}

/// Parse a `True`/`False` response.
pub fn parse_bool(value: &str) -> Result<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(protocol(format!("expected True or False, got {value:?}")))
    }
}

impl DialogResponse {
    /// Decode a base64 JSON result payload for a dialog of `dialog_type`.
    pub fn decode(dialog_type: DialogType, payload: &str) -> Result<Self> {
        let json = decode_base64(payload)?;
        DialogResponse::from_json(dialog_type, &json)
    }
}

fn decode_base64(payload: &str) -> Result<String> {
    let bytes = STANDARD.decode(payload.trim())?;
    Ok(String::from_utf8(bytes)?)
}

fn protocol(message: impl Into<String>) -> DeployError {
    DeployError::ChannelFault {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::dialog::fixtures;
    use crate::display::dialog::{
        BaseDialogOptions, CloseAppsDialogOptions, CloseAppsDialogResult, DialogBoxOptions,
        DialogBoxResult, InputDialogOptions, InputDialogResult, MessageAlignment,
        RestartDialogOptions,
    };
    use std::time::Duration;

    fn round_trip(command: Command) {
        let line = command.encode().unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(Command::decode(&line).unwrap(), command);
    }

    #[test]
    fn test_plain_verbs() {
        assert_eq!(Command::Open.encode().unwrap(), "Open");
        assert_eq!(Command::decode("Close\r\n").unwrap(), Command::Close);
        assert!(Command::decode("Open|extra").is_err());
        assert!(Command::decode("open").is_err());
        assert!(Command::decode("").is_err());
    }

    #[test]
    fn test_show_modal_dialog_line_shape() {
        let command = Command::ShowModalDialog {
            style: DialogStyle::Fluent,
            request: DialogRequest::Custom(fixtures::custom()),
        };
        let line = command.encode().unwrap();
        let parts: Vec<_> = line.split('|').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "ShowModalDialog");
        assert_eq!(parts[1], "CustomDialog");
        assert_eq!(parts[2], "Fluent");
        assert!(STANDARD.decode(parts[3]).is_ok());
    }

    #[test]
    fn test_round_trip_with_every_optional_unset() {
        let request = DialogRequest::Restart(
            RestartDialogOptions::new(fixtures::base(), fixtures::restart_strings()).unwrap(),
        );
        round_trip(Command::ShowModalDialog {
            style: DialogStyle::Classic,
            request,
        });
    }

    #[test]
    fn test_round_trip_with_optionals_set() {
        let base = BaseDialogOptions::new("Contoso", "IT", "/opt/contoso/icon.png")
            .unwrap()
            .with_dark_icon("/opt/contoso/icon-dark.png")
            .with_banner("/opt/contoso/banner.png")
            .with_accent_color(0x0078D4)
            .with_expiry(Duration::from_secs(3600))
            .with_persist_interval(Duration::from_secs(60))
            .with_allow_move(false);
        let options = CloseAppsDialogOptions::new(base, fixtures::close_apps_strings())
            .unwrap()
            .with_deferrals_remaining(0)
            .with_custom_message("Save your documents | then close.")
            .with_countdown(Duration::from_secs(300))
            .unwrap();
        round_trip(Command::ShowModalDialog {
            style: DialogStyle::Fluent,
            request: DialogRequest::CloseApps(options),
        });

        round_trip(Command::ShowModalDialog {
            style: DialogStyle::Classic,
            request: DialogRequest::Input(
                InputDialogOptions::new(fixtures::custom())
                    .unwrap()
                    .with_initial_text("line one\nline two"),
            ),
        });
        round_trip(Command::ShowModalDialog {
            style: DialogStyle::Classic,
            request: DialogRequest::DialogBox(DialogBoxOptions::new("Contoso", "Retry?").unwrap()),
        });
    }

    #[test]
    fn test_progress_verbs() {
        assert_eq!(Command::ProgressDialogOpen.encode().unwrap(), "ProgressDialogOpen");
        assert_eq!(
            Command::decode("CloseProgressDialog").unwrap(),
            Command::CloseProgressDialog
        );
        assert!(Command::decode("ProgressDialogOpen|now").is_err());

        let show = Command::ShowProgressDialog {
            style: DialogStyle::Fluent,
            options: fixtures::progress().with_percentage(12.5).unwrap(),
        };
        let line = show.encode().unwrap();
        assert!(line.starts_with("ShowProgressDialog|Fluent|"));
        assert_eq!(line.split('|').count(), 3);
        round_trip(show);

        // Free text with separators and line breaks stays inside the payload.
        round_trip(Command::UpdateProgressDialog(
            ProgressUpdate::new()
                .with_message("Step 2 | 3")
                .with_detail("Copying\nfiles")
                .with_alignment(MessageAlignment::Right),
        ));
        round_trip(Command::UpdateProgressDialog(ProgressUpdate::new()));
    }

    #[test]
    fn test_progress_payloads_are_validated() {
        let mut options = fixtures::progress();
        options.progress_percentage = Some(250.0);
        let command = Command::ShowProgressDialog {
            style: DialogStyle::Classic,
            options: options.clone(),
        };
        assert!(matches!(command.encode(), Err(DeployError::Validation { .. })));

        let forged = format!(
            "ShowProgressDialog|Classic|{}",
            STANDARD.encode(serde_json::to_string(&options).unwrap())
        );
        assert!(matches!(Command::decode(&forged), Err(DeployError::Validation { .. })));
        assert!(Command::decode("ShowProgressDialog|Classic").is_err());
        assert!(Command::decode("UpdateProgressDialog|e30=|e30=").is_err());
        assert_eq!(
            Command::decode("UpdateProgressDialog|e30=").unwrap(),
            Command::UpdateProgressDialog(ProgressUpdate::new())
        );
    }

    #[test]
    fn test_encode_rejects_invalid_options() {
        let mut options = fixtures::custom();
        options.button_left_text = None;
        options.button_right_text = None;
        let command = Command::ShowModalDialog {
            style: DialogStyle::Fluent,
            request: DialogRequest::Custom(options),
        };
        assert!(matches!(command.encode(), Err(DeployError::Validation { .. })));
    }

    #[test]
    fn test_decode_rejects_bad_payload() {
        assert!(Command::decode("ShowModalDialog|CustomDialog|Fluent").is_err());
        assert!(Command::decode("ShowModalDialog|CustomDialog|Fluent|***").is_err());
        assert!(Command::decode("ShowModalDialog|ProgressDialog|Fluent|e30=").is_err());
    }

    #[test]
    fn test_missing_or_blank_response_is_a_fault() {
        for line in [None, Some(String::new()), Some("  \t".to_string())] {
            match decode_response_line(line) {
                Err(DeployError::ChannelFault { message }) => {
                    assert_eq!(message, CLIENT_GONE_MESSAGE)
                }
                other => panic!("expected channel fault, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_error_prefix_is_case_insensitive() {
        for line in ["Error|boom", "ERROR|boom", "error|boom"] {
            match decode_response_line(Some(line.to_string())) {
                Err(DeployError::Remote { message }) => assert_eq!(message, "boom"),
                other => panic!("expected remote error, got {other:?}"),
            }
        }
        assert_eq!(decode_response_line(Some("Errors".into())).unwrap(), "Errors");
    }

    #[test]
    fn test_error_encoding_flattens_lines() {
        let line = encode_error("first\r\nsecond\nthird");
        assert_eq!(line, "Error|first second third");
        match decode_response_line(Some(line)) {
            Err(DeployError::Remote { message }) => assert_eq!(message, "first second third"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(encode_bool(true)).unwrap());
        assert!(!parse_bool(" false ").unwrap());
        assert!(parse_bool("yes").is_err());
    }

    #[test]
    fn test_response_payloads() {
        for response in [
            DialogResponse::CloseApps(CloseAppsDialogResult::Defer),
            DialogResponse::Custom("Details".into()),
            DialogResponse::DialogBox(DialogBoxResult::Cancel),
            DialogResponse::Input(InputDialogResult {
                result: "OK".into(),
                text: Some("C:\\Temp".into()),
            }),
            DialogResponse::Restart("Restart Now".into()),
        ] {
            let payload = encode_payload(&response).unwrap();
            assert_eq!(
                DialogResponse::decode(response.dialog_type(), &payload).unwrap(),
                response
            );
        }
    }
}
