use anyhow::{Context, Result};
use clap::Args;
use deploykit_core::display::{DisplayClient, DuplexChannel, HeadlessRenderer};
use tracing::info;

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Handle of the pipe to read requests from
    #[arg(long = "input-pipe", value_name = "HANDLE")]
    input_pipe: String,

    /// Handle of the pipe to write responses to
    #[arg(long = "output-pipe", value_name = "HANDLE")]
    output_pipe: String,
}

pub fn run(args: ClientArgs) -> Result<()> {
    let channel = DuplexChannel::from_client_args(&args.input_pipe, &args.output_pipe)
        .context("failed to open the display pipes")?;
    info!(
        "Serving display session (input {}, output {})",
        args.input_pipe, args.output_pipe
    );

    DisplayClient::new(channel, HeadlessRenderer::new()).run()?;
    Ok(())
}
