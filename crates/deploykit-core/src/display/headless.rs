//! Renderer for unattended sessions: every dialog is answered immediately
//! with the choice a user who walked away would end up with.

use crate::display::client::{DialogContext, DialogRenderer};
use crate::display::dialog::{
    CloseAppsDialogOptions, CloseAppsDialogResult, CustomDialogOptions, DialogRequest,
    DialogResponse, DialogStyle, InputDialogResult, ProgressDialogOptions, ProgressUpdate,
};
use crate::error::{DeployError, Result};
use tracing::info;

/// Result reported for a restart prompt that nobody answered.
pub const RESTART_DEFERRED: &str = "Defer";

#[derive(Debug, Clone, Default)]
pub struct HeadlessRenderer {
    progress: Option<ProgressDialogOptions>,
    progress_updates: usize,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The progress dialog as it would currently be drawn.
    pub fn progress(&self) -> Option<&ProgressDialogOptions> {
        self.progress.as_ref()
    }

    /// Updates applied since the renderer was created.
    pub fn progress_updates(&self) -> usize {
        self.progress_updates
    }
}

impl DialogRenderer for HeadlessRenderer {
    fn show_modal(
        &self,
        style: DialogStyle,
        request: &DialogRequest,
        context: &DialogContext,
    ) -> Result<DialogResponse> {
        let response = match request {
            DialogRequest::DialogBox(options) => DialogResponse::DialogBox(options.default_result()),
            DialogRequest::Custom(options) => DialogResponse::Custom(first_button(options)?),
            DialogRequest::Input(options) => DialogResponse::Input(InputDialogResult {
                result: first_button(&options.custom)?,
                text: options.initial_input_text.clone(),
            }),
            DialogRequest::Restart(_) => DialogResponse::Restart(RESTART_DEFERRED.to_string()),
            DialogRequest::CloseApps(options) => {
                let running = context.processes_to_close().len();
                DialogResponse::CloseApps(close_apps_choice(options, running))
            }
        };
        info!(
            "Answered {} ({}) without a display: {:?}",
            request.dialog_type(),
            style,
            response
        );
        Ok(response)
    }

    fn show_progress(&mut self, style: DialogStyle, options: &ProgressDialogOptions) -> Result<()> {
        info!(
            "Progress ({}): {} {}",
            style, options.progress_message_text, options.progress_detail_message_text
        );
        self.progress = Some(options.clone());
        Ok(())
    }

    fn update_progress(&mut self, update: &ProgressUpdate) -> Result<()> {
        let progress = self
            .progress
            .as_mut()
            .ok_or_else(|| DeployError::invalid_state("no progress dialog is open"))?;
        progress.apply(update);
        self.progress_updates += 1;
        match progress.progress_percentage {
            Some(percent) => info!("Progress: {} ({:.0}%)", progress.progress_message_text, percent),
            None => info!("Progress: {}", progress.progress_message_text),
        }
        Ok(())
    }

    fn close_progress(&mut self) -> Result<()> {
        if self.progress.take().is_some() {
            info!("Progress dialog closed");
        }
        Ok(())
    }
}

fn first_button(options: &CustomDialogOptions) -> Result<String> {
    options
        .buttons()
        .next()
        .map(str::to_string)
        .ok_or_else(|| DeployError::validation("buttons", "dialog has no buttons"))
}

fn close_apps_choice(options: &CloseAppsDialogOptions, running: usize) -> CloseAppsDialogResult {
    if running == 0 {
        CloseAppsDialogResult::Continue
    } else if options.deferrals_remaining.is_some_and(|left| left > 0) {
        CloseAppsDialogResult::Defer
    } else {
        CloseAppsDialogResult::Close
    }
}
