//! Typed dialog options and results exchanged with the display client.
//!
//! Every options type is validated when it is constructed and again when it
//! crosses the wire, so a malformed request is rejected on the server before
//! the client ever sees it. Payloads are camelCase JSON; durations travel as
//! whole milliseconds.

use crate::error::{DeployError, Result};
use crate::process::ProcessDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// The kind of dialog a request opens. The wire token is the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogType {
    CloseAppsDialog,
    CustomDialog,
    DialogBox,
    InputDialog,
    RestartDialog,
}

impl DialogType {
    pub const ALL: [DialogType; 5] = [
        DialogType::CloseAppsDialog,
        DialogType::CustomDialog,
        DialogType::DialogBox,
        DialogType::InputDialog,
        DialogType::RestartDialog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DialogType::CloseAppsDialog => "CloseAppsDialog",
            DialogType::CustomDialog => "CustomDialog",
            DialogType::DialogBox => "DialogBox",
            DialogType::InputDialog => "InputDialog",
            DialogType::RestartDialog => "RestartDialog",
        }
    }
}

impl fmt::Display for DialogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialogType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        DialogType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DeployError::validation("dialog type", format!("unknown dialog type: {s}")))
    }
}

/// Visual style the client renders a dialog in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogStyle {
    Classic,
    #[default]
    Fluent,
}

impl DialogStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogStyle::Classic => "Classic",
            DialogStyle::Fluent => "Fluent",
        }
    }
}

impl fmt::Display for DialogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialogStyle {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Classic" => Ok(DialogStyle::Classic),
            "Fluent" => Ok(DialogStyle::Fluent),
            other => Err(DeployError::validation(
                "dialog style",
                format!("unknown dialog style: {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogPosition {
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Icon shown beside a custom dialog's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogSystemIcon {
    Information,
    Question,
    Warning,
    Error,
    Shield,
}

// Duration fields travel as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DeployError::validation(field, "value cannot be blank"));
    }
    Ok(())
}

fn optional_text(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(text) => require_text(field, text),
        None => Ok(()),
    }
}

fn require_path(field: &str, value: &std::path::Path) -> Result<()> {
    if value.as_os_str().is_empty() {
        return Err(DeployError::validation(field, "path cannot be empty"));
    }
    Ok(())
}

fn percentage(field: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(p) if !(0.0..=100.0).contains(&p) => Err(DeployError::validation(
            field,
            format!("{p} is not a percentage between 0 and 100"),
        )),
        _ => Ok(()),
    }
}

fn positive(field: &str, value: Option<Duration>) -> Result<()> {
    if value.is_some_and(|d| d.is_zero()) {
        return Err(DeployError::validation(field, "duration must be greater than zero"));
    }
    Ok(())
}

/// Options shared by every branded dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseDialogOptions {
    pub app_title: String,
    pub subtitle: String,
    pub app_icon_image: PathBuf,
    pub app_icon_dark_image: Option<PathBuf>,
    pub app_banner_image: Option<PathBuf>,
    pub dialog_top_most: bool,
    /// BCP 47 language tag used for formatting.
    pub language: String,
    /// Accent colour as `0xRRGGBB`.
    pub fluent_accent_color: Option<u32>,
    pub dialog_position: Option<DialogPosition>,
    pub dialog_allow_move: Option<bool>,
    #[serde(default, with = "duration_ms::option")]
    pub dialog_expiry_duration: Option<Duration>,
    #[serde(default, with = "duration_ms::option")]
    pub dialog_persist_interval: Option<Duration>,
}

impl BaseDialogOptions {
    pub fn new(
        app_title: impl Into<String>,
        subtitle: impl Into<String>,
        app_icon_image: impl Into<PathBuf>,
    ) -> Result<Self> {
        let options = Self {
            app_title: app_title.into(),
            subtitle: subtitle.into(),
            app_icon_image: app_icon_image.into(),
            app_icon_dark_image: None,
            app_banner_image: None,
            dialog_top_most: true,
            language: "en-US".to_string(),
            fluent_accent_color: None,
            dialog_position: None,
            dialog_allow_move: None,
            dialog_expiry_duration: None,
            dialog_persist_interval: None,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_dark_icon(mut self, path: impl Into<PathBuf>) -> Self {
        self.app_icon_dark_image = Some(path.into());
        self
    }

    pub fn with_banner(mut self, path: impl Into<PathBuf>) -> Self {
        self.app_banner_image = Some(path.into());
        self
    }

    pub fn with_top_most(mut self, top_most: bool) -> Self {
        self.dialog_top_most = top_most;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_accent_color(mut self, rgb: u32) -> Self {
        self.fluent_accent_color = Some(rgb);
        self
    }

    pub fn with_position(mut self, position: DialogPosition) -> Self {
        self.dialog_position = Some(position);
        self
    }

    pub fn with_allow_move(mut self, allow: bool) -> Self {
        self.dialog_allow_move = Some(allow);
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.dialog_expiry_duration = Some(expiry);
        self
    }

    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.dialog_persist_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_text("appTitle", &self.app_title)?;
        require_text("subtitle", &self.subtitle)?;
        require_path("appIconImage", &self.app_icon_image)?;
        require_text("language", &self.language)?;
        if let Some(rgb) = self.fluent_accent_color {
            if rgb > 0x00FF_FFFF {
                return Err(DeployError::validation(
                    "fluentAccentColor",
                    format!("{rgb:#x} is not an RGB colour"),
                ));
            }
        }
        positive("dialogExpiryDuration", self.dialog_expiry_duration)?;
        positive("dialogPersistInterval", self.dialog_persist_interval)
    }
}

/// A branded dialog with a message and up to three buttons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDialogOptions {
    #[serde(flatten)]
    pub base: BaseDialogOptions,
    pub message_text: String,
    pub message_alignment: Option<MessageAlignment>,
    pub button_left_text: Option<String>,
    pub button_middle_text: Option<String>,
    pub button_right_text: Option<String>,
    pub icon: Option<DialogSystemIcon>,
    pub minimize_windows: bool,
}

impl CustomDialogOptions {
    /// At least one button must be set with [`with_buttons`](Self::with_buttons)
    /// before the options validate.
    pub fn new(base: BaseDialogOptions, message_text: impl Into<String>) -> Self {
        Self {
            base,
            message_text: message_text.into(),
            message_alignment: None,
            button_left_text: None,
            button_middle_text: None,
            button_right_text: None,
            icon: None,
            minimize_windows: false,
        }
    }

    pub fn with_buttons(
        mut self,
        left: Option<&str>,
        middle: Option<&str>,
        right: Option<&str>,
    ) -> Result<Self> {
        self.button_left_text = left.map(str::to_string);
        self.button_middle_text = middle.map(str::to_string);
        self.button_right_text = right.map(str::to_string);
        self.validate()?;
        Ok(self)
    }

    pub fn with_alignment(mut self, alignment: MessageAlignment) -> Self {
        self.message_alignment = Some(alignment);
        self
    }

    pub fn with_icon(mut self, icon: DialogSystemIcon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_minimize_windows(mut self, minimize: bool) -> Self {
        self.minimize_windows = minimize;
        self
    }

    /// Button captions in left, middle, right order.
    pub fn buttons(&self) -> impl Iterator<Item = &str> {
        [
            &self.button_left_text,
            &self.button_middle_text,
            &self.button_right_text,
        ]
        .into_iter()
        .filter_map(|b| b.as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        require_text("messageText", &self.message_text)?;
        optional_text("buttonLeftText", self.button_left_text.as_deref())?;
        optional_text("buttonMiddleText", self.button_middle_text.as_deref())?;
        optional_text("buttonRightText", self.button_right_text.as_deref())?;
        if self.buttons().next().is_none() {
            return Err(DeployError::validation(
                "buttons",
                "at least one button caption is required",
            ));
        }
        Ok(())
    }
}

/// A custom dialog that also collects a line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDialogOptions {
    #[serde(flatten)]
    pub custom: CustomDialogOptions,
    pub initial_input_text: Option<String>,
}

impl InputDialogOptions {
    pub fn new(custom: CustomDialogOptions) -> Result<Self> {
        custom.validate()?;
        Ok(Self {
            custom,
            initial_input_text: None,
        })
    }

    pub fn with_initial_text(mut self, text: impl Into<String>) -> Self {
        self.initial_input_text = Some(text.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.custom.validate()
    }
}

/// Localized captions of the restart prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartDialogStrings {
    pub title: String,
    pub message: String,
    pub message_time: String,
    pub message_restart: String,
    pub time_remaining: String,
    pub button_restart_now: String,
    pub button_restart_later: String,
}

impl RestartDialogStrings {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("strings.title", &self.title),
            ("strings.message", &self.message),
            ("strings.messageTime", &self.message_time),
            ("strings.messageRestart", &self.message_restart),
            ("strings.timeRemaining", &self.time_remaining),
            ("strings.buttonRestartNow", &self.button_restart_now),
            ("strings.buttonRestartLater", &self.button_restart_later),
        ] {
            require_text(field, value)?;
        }
        Ok(())
    }
}

/// Prompt asking the user to restart, optionally with a countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartDialogOptions {
    #[serde(flatten)]
    pub base: BaseDialogOptions,
    pub strings: RestartDialogStrings,
    #[serde(default, with = "duration_ms::option")]
    pub countdown_duration: Option<Duration>,
    /// Remaining time below which the dialog can no longer be minimized.
    #[serde(default, with = "duration_ms::option")]
    pub countdown_no_minimize_duration: Option<Duration>,
    pub custom_message_text: Option<String>,
}

impl RestartDialogOptions {
    pub fn new(base: BaseDialogOptions, strings: RestartDialogStrings) -> Result<Self> {
        let options = Self {
            base,
            strings,
            countdown_duration: None,
            countdown_no_minimize_duration: None,
            custom_message_text: None,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_countdown(mut self, countdown: Duration, no_minimize: Option<Duration>) -> Result<Self> {
        self.countdown_duration = Some(countdown);
        self.countdown_no_minimize_duration = no_minimize;
        self.validate()?;
        Ok(self)
    }

    pub fn with_custom_message(mut self, text: impl Into<String>) -> Self {
        self.custom_message_text = Some(text.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        self.strings.validate()?;
        positive("countdownDuration", self.countdown_duration)?;
        optional_text("customMessageText", self.custom_message_text.as_deref())?;
        match (self.countdown_duration, self.countdown_no_minimize_duration) {
            (None, Some(_)) => Err(DeployError::validation(
                "countdownNoMinimizeDuration",
                "requires a countdown duration",
            )),
            (Some(total), Some(no_minimize)) if no_minimize > total => Err(DeployError::validation(
                "countdownNoMinimizeDuration",
                "cannot exceed the countdown duration",
            )),
            _ => Ok(()),
        }
    }
}

/// Button sets of a plain message box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogBoxButtons {
    #[default]
    Ok,
    OkCancel,
    AbortRetryIgnore,
    YesNoCancel,
    YesNo,
    RetryCancel,
    CancelTryContinue,
}

impl DialogBoxButtons {
    /// Result of each button, left to right.
    pub fn results(&self) -> &'static [DialogBoxResult] {
        use DialogBoxResult as R;
        match self {
            DialogBoxButtons::Ok => &[R::Ok],
            DialogBoxButtons::OkCancel => &[R::Ok, R::Cancel],
            DialogBoxButtons::AbortRetryIgnore => &[R::Abort, R::Retry, R::Ignore],
            DialogBoxButtons::YesNoCancel => &[R::Yes, R::No, R::Cancel],
            DialogBoxButtons::YesNo => &[R::Yes, R::No],
            DialogBoxButtons::RetryCancel => &[R::Retry, R::Cancel],
            DialogBoxButtons::CancelTryContinue => &[R::Cancel, R::TryAgain, R::Continue],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogBoxDefaultButton {
    #[default]
    First,
    Second,
    Third,
}

impl DialogBoxDefaultButton {
    pub fn index(&self) -> usize {
        match self {
            DialogBoxDefaultButton::First => 0,
            DialogBoxDefaultButton::Second => 1,
            DialogBoxDefaultButton::Third => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogBoxIcon {
    #[default]
    None,
    Stop,
    Question,
    Exclamation,
    Information,
}

/// A plain system message box. Always rendered in the classic style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogBoxOptions {
    pub app_title: String,
    pub message_text: String,
    pub dialog_buttons: DialogBoxButtons,
    pub dialog_default_button: DialogBoxDefaultButton,
    pub dialog_icon: DialogBoxIcon,
    pub dialog_top_most: bool,
    #[serde(with = "duration_ms")]
    pub dialog_expiry_duration: Duration,
}

impl DialogBoxOptions {
    pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(55 * 60);

    pub fn new(app_title: impl Into<String>, message_text: impl Into<String>) -> Result<Self> {
        let options = Self {
            app_title: app_title.into(),
            message_text: message_text.into(),
            dialog_buttons: DialogBoxButtons::default(),
            dialog_default_button: DialogBoxDefaultButton::default(),
            dialog_icon: DialogBoxIcon::default(),
            dialog_top_most: true,
            dialog_expiry_duration: Self::DEFAULT_EXPIRY,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_buttons(
        mut self,
        buttons: DialogBoxButtons,
        default_button: DialogBoxDefaultButton,
    ) -> Result<Self> {
        self.dialog_buttons = buttons;
        self.dialog_default_button = default_button;
        self.validate()?;
        Ok(self)
    }

    pub fn with_icon(mut self, icon: DialogBoxIcon) -> Self {
        self.dialog_icon = icon;
        self
    }

    pub fn with_top_most(mut self, top_most: bool) -> Self {
        self.dialog_top_most = top_most;
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Result<Self> {
        self.dialog_expiry_duration = expiry;
        self.validate()?;
        Ok(self)
    }

    /// Result of the button that has focus when the box opens.
    pub fn default_result(&self) -> DialogBoxResult {
        let results = self.dialog_buttons.results();
        results[self.dialog_default_button.index().min(results.len() - 1)]
    }

    pub fn validate(&self) -> Result<()> {
        require_text("appTitle", &self.app_title)?;
        require_text("messageText", &self.message_text)?;
        positive("dialogExpiryDuration", Some(self.dialog_expiry_duration))?;
        if self.dialog_default_button.index() >= self.dialog_buttons.results().len() {
            return Err(DeployError::validation(
                "dialogDefaultButton",
                format!(
                    "{:?} has no {:?} button",
                    self.dialog_buttons, self.dialog_default_button
                ),
            ));
        }
        Ok(())
    }
}

/// Localized captions of the close-apps prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseAppsDialogStrings {
    pub welcome_message: String,
    pub close_apps_message: String,
    pub expiry_message: String,
    /// Caption for the deferral counter.
    pub deferrals_remaining: String,
    pub countdown_close: String,
    pub button_close: String,
    pub button_defer: String,
    pub button_continue: String,
}

impl CloseAppsDialogStrings {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("strings.welcomeMessage", &self.welcome_message),
            ("strings.closeAppsMessage", &self.close_apps_message),
            ("strings.expiryMessage", &self.expiry_message),
            ("strings.deferralsRemaining", &self.deferrals_remaining),
            ("strings.countdownClose", &self.countdown_close),
            ("strings.buttonClose", &self.button_close),
            ("strings.buttonDefer", &self.button_defer),
            ("strings.buttonContinue", &self.button_continue),
        ] {
            require_text(field, value)?;
        }
        Ok(())
    }
}

/// Prompt listing the applications that must close before installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseAppsDialogOptions {
    #[serde(flatten)]
    pub base: BaseDialogOptions,
    pub strings: CloseAppsDialogStrings,
    /// The client keeps the dialog's process list current by polling these.
    #[serde(default)]
    pub apps_to_close: Vec<ProcessDefinition>,
    pub deferrals_remaining: Option<u32>,
    #[serde(default, with = "duration_ms::option")]
    pub countdown_duration: Option<Duration>,
    pub custom_message_text: Option<String>,
}

impl CloseAppsDialogOptions {
    pub fn new(base: BaseDialogOptions, strings: CloseAppsDialogStrings) -> Result<Self> {
        let options = Self {
            base,
            strings,
            apps_to_close: Vec::new(),
            deferrals_remaining: None,
            countdown_duration: None,
            custom_message_text: None,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_apps(mut self, apps: Vec<ProcessDefinition>) -> Self {
        self.apps_to_close = apps;
        self
    }

    pub fn with_deferrals_remaining(mut self, deferrals: u32) -> Self {
        self.deferrals_remaining = Some(deferrals);
        self
    }

    pub fn with_countdown(mut self, countdown: Duration) -> Result<Self> {
        self.countdown_duration = Some(countdown);
        self.validate()?;
        Ok(self)
    }

    pub fn with_custom_message(mut self, text: impl Into<String>) -> Self {
        self.custom_message_text = Some(text.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        self.strings.validate()?;
        positive("countdownDuration", self.countdown_duration)?;
        optional_text("customMessageText", self.custom_message_text.as_deref())
    }
}

/// The non-modal progress dialog shown while an installation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDialogOptions {
    #[serde(flatten)]
    pub base: BaseDialogOptions,
    pub progress_message_text: String,
    pub progress_detail_message_text: String,
    /// Percent complete; `None` shows an indeterminate bar.
    pub progress_percentage: Option<f64>,
    pub message_alignment: Option<MessageAlignment>,
}

impl ProgressDialogOptions {
    pub fn new(
        base: BaseDialogOptions,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Result<Self> {
        let options = Self {
            base,
            progress_message_text: message.into(),
            progress_detail_message_text: detail.into(),
            progress_percentage: None,
            message_alignment: None,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_percentage(mut self, percentage: f64) -> Result<Self> {
        self.progress_percentage = Some(percentage);
        self.validate()?;
        Ok(self)
    }

    pub fn with_alignment(mut self, alignment: MessageAlignment) -> Self {
        self.message_alignment = Some(alignment);
        self
    }

    /// Fold an update into the options, leaving unset fields alone.
    pub fn apply(&mut self, update: &ProgressUpdate) {
        if let Some(message) = &update.message {
            self.progress_message_text = message.clone();
        }
        if let Some(detail) = &update.detail_message {
            self.progress_detail_message_text = detail.clone();
        }
        if update.percentage.is_some() {
            self.progress_percentage = update.percentage;
        }
        if update.message_alignment.is_some() {
            self.message_alignment = update.message_alignment;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        require_text("progressMessageText", &self.progress_message_text)?;
        require_text("progressDetailMessageText", &self.progress_detail_message_text)?;
        percentage("progressPercentage", self.progress_percentage)
    }
}

/// Changes to an open progress dialog. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub message: Option<String>,
    pub detail_message: Option<String>,
    pub percentage: Option<f64>,
    pub message_alignment: Option<MessageAlignment>,
}

impl ProgressUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail_message = Some(detail.into());
        self
    }

    pub fn with_percentage(mut self, value: f64) -> Result<Self> {
        self.percentage = Some(value);
        self.validate()?;
        Ok(self)
    }

    pub fn with_alignment(mut self, alignment: MessageAlignment) -> Self {
        self.message_alignment = Some(alignment);
        self
    }

    pub fn validate(&self) -> Result<()> {
        optional_text("message", self.message.as_deref())?;
        optional_text("detailMessage", self.detail_message.as_deref())?;
        percentage("percentage", self.percentage)
    }
}

/// Button pressed on a message box, or `Timeout` when it expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogBoxResult {
    Ok,
    Cancel,
    Abort,
    Retry,
    Ignore,
    Yes,
    No,
    Close,
    TryAgain,
    Continue,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDialogResult {
    /// Caption of the button that was pressed.
    pub result: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseAppsDialogResult {
    /// Close the listed applications and continue.
    Close,
    /// Nothing left to close; continue.
    Continue,
    Defer,
    Timeout,
}

/// A dialog request, one variant per [`DialogType`].
#[derive(Debug, Clone, PartialEq)]
pub enum DialogRequest {
    CloseApps(CloseAppsDialogOptions),
    Custom(CustomDialogOptions),
    DialogBox(DialogBoxOptions),
    Input(InputDialogOptions),
    Restart(RestartDialogOptions),
}

impl DialogRequest {
    pub fn dialog_type(&self) -> DialogType {
        match self {
            DialogRequest::CloseApps(_) => DialogType::CloseAppsDialog,
            DialogRequest::Custom(_) => DialogType::CustomDialog,
            DialogRequest::DialogBox(_) => DialogType::DialogBox,
            DialogRequest::Input(_) => DialogType::InputDialog,
            DialogRequest::Restart(_) => DialogType::RestartDialog,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            DialogRequest::CloseApps(options) => options.validate(),
            DialogRequest::Custom(options) => options.validate(),
            DialogRequest::DialogBox(options) => options.validate(),
            DialogRequest::Input(options) => options.validate(),
            DialogRequest::Restart(options) => options.validate(),
        }
    }

    /// Serialize the options alone; the type travels separately.
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            DialogRequest::CloseApps(options) => serde_json::to_string(options),
            DialogRequest::Custom(options) => serde_json::to_string(options),
            DialogRequest::DialogBox(options) => serde_json::to_string(options),
            DialogRequest::Input(options) => serde_json::to_string(options),
            DialogRequest::Restart(options) => serde_json::to_string(options),
        }?;
        Ok(json)
    }

    /// Parse and validate options of the given type.
    pub fn from_json(dialog_type: DialogType, json: &str) -> Result<Self> {
        let request = match dialog_type {
            DialogType::CloseAppsDialog => DialogRequest::CloseApps(serde_json::from_str(json)?),
            DialogType::CustomDialog => DialogRequest::Custom(serde_json::from_str(json)?),
            DialogType::DialogBox => DialogRequest::DialogBox(serde_json::from_str(json)?),
            DialogType::InputDialog => DialogRequest::Input(serde_json::from_str(json)?),
            DialogType::RestartDialog => DialogRequest::Restart(serde_json::from_str(json)?),
        };
        request.validate()?;
        Ok(request)
    }
}

/// A dialog result, one variant per [`DialogType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogResponse {
    CloseApps(CloseAppsDialogResult),
    Custom(String),
    DialogBox(DialogBoxResult),
    Input(InputDialogResult),
    Restart(String),
}

impl DialogResponse {
    pub fn dialog_type(&self) -> DialogType {
        match self {
            DialogResponse::CloseApps(_) => DialogType::CloseAppsDialog,
            DialogResponse::Custom(_) => DialogType::CustomDialog,
            DialogResponse::DialogBox(_) => DialogType::DialogBox,
            DialogResponse::Input(_) => DialogType::InputDialog,
            DialogResponse::Restart(_) => DialogType::RestartDialog,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            DialogResponse::CloseApps(result) => serde_json::to_string(result),
            DialogResponse::Custom(result) | DialogResponse::Restart(result) => {
                serde_json::to_string(result)
            }
            DialogResponse::DialogBox(result) => serde_json::to_string(result),
            DialogResponse::Input(result) => serde_json::to_string(result),
        }?;
        Ok(json)
    }

    pub fn from_json(dialog_type: DialogType, json: &str) -> Result<Self> {
        Ok(match dialog_type {
            DialogType::CloseAppsDialog => DialogResponse::CloseApps(serde_json::from_str(json)?),
            DialogType::CustomDialog => DialogResponse::Custom(serde_json::from_str(json)?),
            DialogType::DialogBox => DialogResponse::DialogBox(serde_json::from_str(json)?),
            DialogType::InputDialog => DialogResponse::Input(serde_json::from_str(json)?),
            DialogType::RestartDialog => DialogResponse::Restart(serde_json::from_str(json)?),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_dialog_type_tokens() {
        for dialog_type in DialogType::ALL {
            assert_eq!(dialog_type.as_str().parse::<DialogType>().unwrap(), dialog_type);
        }
        assert!("closeappsdialog".parse::<DialogType>().is_err());
        assert_eq!("Classic".parse::<DialogStyle>().unwrap(), DialogStyle::Classic);
        assert!("Modern".parse::<DialogStyle>().is_err());
    }

    #[test]
    fn test_base_requires_title_and_icon() {
        assert!(BaseDialogOptions::new(" ", "sub", "icon.png").is_err());
        assert!(BaseDialogOptions::new("title", "sub", "").is_err());

        let base = base().with_accent_color(0x1_000_000);
        assert!(base.validate().is_err());
    }

    #[test]
    fn test_custom_dialog_needs_a_button() {
        let options = CustomDialogOptions::new(base(), "Hello");
        assert!(options.validate().is_err());
        assert!(options.clone().with_buttons(None, None, None).is_err());
        assert!(options.clone().with_buttons(Some(""), None, None).is_err());

        let options = options.with_buttons(None, Some("Middle"), Some("Right")).unwrap();
        assert_eq!(options.buttons().collect::<Vec<_>>(), ["Middle", "Right"]);
    }

    #[test]
    fn test_restart_countdown_bounds() {
        let options = RestartDialogOptions::new(base(), restart_strings()).unwrap();
        assert!(options
            .clone()
            .with_countdown(Duration::from_secs(60), Some(Duration::from_secs(120)))
            .is_err());
        assert!(options
            .clone()
            .with_countdown(Duration::ZERO, None)
            .is_err());
        assert!(options
            .with_countdown(Duration::from_secs(600), Some(Duration::from_secs(60)))
            .is_ok());

        let mut strings = restart_strings();
        strings.button_restart_now = "\t".into();
        assert!(RestartDialogOptions::new(base(), strings).is_err());
    }

    #[test]
    fn test_dialog_box_default_button_must_exist() {
        let options = DialogBoxOptions::new("Contoso", "Proceed?").unwrap();
        assert_eq!(options.default_result(), DialogBoxResult::Ok);

        assert!(options
            .clone()
            .with_buttons(DialogBoxButtons::YesNo, DialogBoxDefaultButton::Third)
            .is_err());
        let options = options
            .with_buttons(DialogBoxButtons::YesNoCancel, DialogBoxDefaultButton::Second)
            .unwrap();
        assert_eq!(options.default_result(), DialogBoxResult::No);
    }

    #[test]
    fn test_json_uses_camel_case_and_millis() {
        let options = base().with_expiry(Duration::from_millis(1500));
        let value: serde_json::Value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["appTitle"], "Contoso Suite 4.2");
        assert_eq!(value["dialogExpiryDuration"], 1500);
        assert!(value["dialogPersistInterval"].is_null());
    }

    #[test]
    fn test_request_from_json_validates() {
        let mut options = custom();
        options.message_text = String::new();
        let json = serde_json::to_string(&options).unwrap();
        assert!(DialogRequest::from_json(DialogType::CustomDialog, &json).is_err());
    }

    #[test]
    fn test_request_json_picks_type_from_token() {
        let request = DialogRequest::Input(
            InputDialogOptions::new(custom())
                .unwrap()
                .with_initial_text("C:\\Data"),
        );
        let json = request.to_json().unwrap();
        let decoded = DialogRequest::from_json(DialogType::InputDialog, &json).unwrap();
        assert_eq!(decoded, request);

        // Input options do not satisfy the restart schema.
        assert!(DialogRequest::from_json(DialogType::RestartDialog, &json).is_err());
    }

    #[test]
    fn test_close_apps_carries_definitions() {
        let options = CloseAppsDialogOptions::new(base(), close_apps_strings())
            .unwrap()
            .with_apps(vec![ProcessDefinition::new("winword")
                .unwrap()
                .with_description("Microsoft Word")
                .unwrap()])
            .with_deferrals_remaining(2);
        let request = DialogRequest::CloseApps(options);
        let decoded =
            DialogRequest::from_json(DialogType::CloseAppsDialog, &request.to_json().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_response_json() {
        let response = DialogResponse::Input(InputDialogResult {
            result: "OK".into(),
            text: None,
        });
        let json = response.to_json().unwrap();
        assert_eq!(json, r#"{"result":"OK","text":null}"#);
        assert_eq!(DialogResponse::from_json(DialogType::InputDialog, &json).unwrap(), response);

        let json = DialogResponse::Custom("Details".into()).to_json().unwrap();
        assert_eq!(json, "\"Details\"");
        assert_eq!(
            DialogResponse::from_json(DialogType::DialogBox, "\"TryAgain\"").unwrap(),
            DialogResponse::DialogBox(DialogBoxResult::TryAgain)
        );
    }

    #[test]
    fn test_progress_options_validate() {
        assert!(ProgressDialogOptions::new(base(), "", "detail").is_err());
        assert!(ProgressDialogOptions::new(base(), "message", " ").is_err());
        assert!(progress().with_percentage(100.5).is_err());
        assert!(progress().with_percentage(f64::NAN).is_err());

        let options = progress().with_percentage(0.0).unwrap();
        let value: serde_json::Value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["progressMessageText"], "Installation in progress.");
        assert_eq!(value["progressPercentage"], 0.0);
        assert_eq!(value["appTitle"], "Contoso Suite 4.2");
    }

    #[test]
    fn test_progress_update_applies_set_fields_only() {
        let mut options = progress();
        options.apply(
            &ProgressUpdate::new()
                .with_detail("Registering components...")
                .with_percentage(40.0)
                .unwrap(),
        );
        assert_eq!(options.progress_message_text, "Installation in progress.");
        assert_eq!(options.progress_detail_message_text, "Registering components...");
        assert_eq!(options.progress_percentage, Some(40.0));

        options.apply(&ProgressUpdate::new().with_alignment(MessageAlignment::Center));
        assert_eq!(options.progress_percentage, Some(40.0));
        assert_eq!(options.message_alignment, Some(MessageAlignment::Center));

        assert!(ProgressUpdate::new().with_message("\t").validate().is_err());
        assert!(ProgressUpdate::new().with_percentage(-1.0).is_err());
    }
}
