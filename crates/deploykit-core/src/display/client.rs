//! Client side of a display session, run inside the companion process.

use crate::caller::CallerContext;
use crate::config::ProcessMonitorConfig;
use crate::display::channel::DuplexChannel;
use crate::display::codec::{self, Command};
use crate::display::dialog::{
    DialogRequest, DialogResponse, DialogStyle, ProgressDialogOptions, ProgressUpdate,
};
use crate::error::{DeployError, Result};
use crate::process::{ProcessSource, ProcessToClose, RunningProcessService, SystemProcessSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Renders dialogs for the client.
///
/// `show_modal` blocks until the dialog is answered or expires. The progress
/// methods return as soon as the window has been updated; the client only
/// calls `update_progress` and `close_progress` while a progress dialog is up.
pub trait DialogRenderer {
    fn show_modal(
        &self,
        style: DialogStyle,
        request: &DialogRequest,
        context: &DialogContext,
    ) -> Result<DialogResponse>;

    fn show_progress(&mut self, style: DialogStyle, options: &ProgressDialogOptions) -> Result<()>;

    fn update_progress(&mut self, update: &ProgressUpdate) -> Result<()>;

    fn close_progress(&mut self) -> Result<()>;
}

/// Live state available to a renderer while a dialog is up.
#[derive(Default)]
pub struct DialogContext {
    monitor: Option<Arc<RunningProcessService>>,
}

impl DialogContext {
    /// Context for dialogs that track no processes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_monitor(monitor: Arc<RunningProcessService>) -> Self {
        Self {
            monitor: Some(monitor),
        }
    }

    /// Applications that currently block the deployment.
    pub fn processes_to_close(&self) -> Arc<[ProcessToClose]> {
        match &self.monitor {
            Some(monitor) => monitor.processes_to_close(),
            None => Arc::from(Vec::new()),
        }
    }

    /// Change feed of the blocking applications, if this dialog tracks any.
    pub fn subscribe(&self) -> Option<watch::Receiver<Arc<[ProcessToClose]>>> {
        self.monitor.as_ref().map(|monitor| monitor.subscribe())
    }
}

/// Serves requests from a [`DisplayServer`](crate::display::DisplayServer)
/// until it closes the session or the channel.
pub struct DisplayClient<R> {
    channel: DuplexChannel,
    renderer: R,
    caller: CallerContext,
    process_source: Arc<dyn ProcessSource>,
    poll_interval: Duration,
    opened: bool,
    progress_open: bool,
}

impl<R: DialogRenderer> DisplayClient<R> {
    pub fn new(channel: DuplexChannel, renderer: R) -> Self {
        Self {
            channel,
            renderer,
            caller: CallerContext::current(),
            process_source: Arc::new(SystemProcessSource::new()),
            poll_interval: ProcessMonitorConfig::DEFAULT_POLL_INTERVAL,
            opened: false,
            progress_open: false,
        }
    }

    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }

    /// Process table used by close-apps dialogs.
    pub fn with_process_source(mut self, source: Arc<dyn ProcessSource>) -> Self {
        self.process_source = source;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Answer requests until `Close` or end of stream.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let Some(line) = self.channel.read_line()? else {
                info!("Display server closed the channel");
                break;
            };
            let (reply, done) = self.dispatch(&line);
            self.channel.write_line(&reply)?;
            if done {
                info!("Display session closed by server");
                break;
            }
        }
        self.channel.close();
        Ok(())
    }

    /// Handle one request line. Returns the response line and whether the
    /// session is over.
    fn dispatch(&mut self, line: &str) -> (String, bool) {
        let command = match Command::decode(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejecting request: {}", e);
                return (codec::encode_error(&e.to_string()), false);
            }
        };
        let verb = command.verb();
        debug!("Received {}", verb);

        match self.handle(command) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} failed: {}", verb, e);
                (codec::encode_error(&e.to_string()), false)
            }
        }
    }

    fn handle(&mut self, command: Command) -> Result<(String, bool)> {
        let flag = |value: bool| codec::encode_bool(value).to_string();
        match command {
            Command::Open => {
                self.opened = true;
                Ok((flag(true), false))
            }
            Command::Close => {
                if self.progress_open {
                    if let Err(e) = self.renderer.close_progress() {
                        warn!("Progress dialog did not close: {}", e);
                    }
                    self.progress_open = false;
                }
                Ok((flag(true), true))
            }
            Command::ShowModalDialog { style, request } => {
                let response = self.show(style, &request)?;
                Ok((codec::encode_payload(&response)?, false))
            }
            Command::ShowProgressDialog { style, options } => {
                self.require_opened()?;
                if self.progress_open {
                    return Err(DeployError::invalid_state(
                        "a progress dialog is already open; close it before opening a new one",
                    ));
                }
                self.renderer.show_progress(style, &options)?;
                self.progress_open = true;
                Ok((flag(true), false))
            }
            Command::ProgressDialogOpen => Ok((flag(self.progress_open), false)),
            Command::UpdateProgressDialog(update) => {
                self.require_progress()?;
                self.renderer.update_progress(&update)?;
                Ok((flag(true), false))
            }
            Command::CloseProgressDialog => {
                self.require_progress()?;
                self.renderer.close_progress()?;
                self.progress_open = false;
                Ok((flag(true), false))
            }
        }
    }

    fn require_opened(&self) -> Result<()> {
        if !self.opened {
            return Err(DeployError::invalid_state("display has not been opened"));
        }
        Ok(())
    }

    fn require_progress(&self) -> Result<()> {
        if !self.progress_open {
            return Err(DeployError::invalid_state("no progress dialog is open"));
        }
        Ok(())
    }

    fn show(&self, style: DialogStyle, request: &DialogRequest) -> Result<DialogResponse> {
        self.require_opened()?;

        let monitor = match request {
            DialogRequest::CloseApps(options) if !options.apps_to_close.is_empty() => {
                let service = RunningProcessService::with_source(
                    options.apps_to_close.clone(),
                    self.poll_interval,
                    self.caller.clone(),
                    self.process_source.clone(),
                )?;
                service.start()?;
                Some(Arc::new(service))
            }
            _ => None,
        };
        let context = match &monitor {
            Some(service) => DialogContext::with_monitor(service.clone()),
            None => DialogContext::empty(),
        };

        let response = self.renderer.show_modal(style, request, &context);
        if let Some(service) = monitor {
            drop(context);
            if let Err(e) = service.stop() {
                debug!("Process monitor already stopped: {}", e);
            }
        }

        let response = response?;
        if response.dialog_type() != request.dialog_type() {
            return Err(DeployError::Other(format!(
                "renderer answered a {} with a {} result",
                request.dialog_type(),
                response.dialog_type()
            )));
        }
        Ok(response)
    }
}
