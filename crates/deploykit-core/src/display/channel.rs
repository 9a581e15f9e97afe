//! Duplex line channel over a pair of anonymous pipes.

use crate::error::{DeployError, Result};
use crate::platform::pipe::{anonymous_pipe, open_inherited, ChildEnd, ChildPipeEnd, RawPipeHandle};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use tracing::trace;

/// One side of the server/client pipe pair.
#[derive(Debug)]
pub struct DuplexChannel {
    reader: Option<BufReader<File>>,
    writer: Option<File>,
}

/// The client's ends of a freshly created channel.
///
/// The parent must drop (or [`release`](Self::release)) these right after
/// launching the client, otherwise end-of-stream is never observed when the
/// client exits.
#[derive(Debug)]
pub struct ClientPipeHandles {
    input: ChildPipeEnd,
    output: ChildPipeEnd,
}

impl ClientPipeHandles {
    /// Handle of the pipe the client reads, as a command-line value.
    pub fn input_arg(&self) -> String {
        self.input.to_arg()
    }

    /// Handle of the pipe the client writes, as a command-line value.
    pub fn output_arg(&self) -> String {
        self.output.to_arg()
    }

    /// Raw handles the client process has to inherit.
    pub fn raw_handles(&self) -> [RawPipeHandle; 2] {
        [self.input.raw(), self.output.raw()]
    }

    /// Split into the client's read and write ends, for running the client
    /// in-process.
    pub fn into_ends(self) -> (ChildPipeEnd, ChildPipeEnd) {
        (self.input, self.output)
    }

    /// Close the parent's copies of the client ends.
    pub fn release(self) {
        trace!("Releasing client pipe ends");
        drop(self);
    }
}

impl DuplexChannel {
    /// Allocate both pipes. Returns the server side and the client's ends.
    pub fn create() -> Result<(Self, ClientPipeHandles)> {
        let (to_client, client_input) = anonymous_pipe(ChildEnd::Read)?;
        let (from_client, client_output) = anonymous_pipe(ChildEnd::Write)?;
        let channel = Self {
            reader: Some(BufReader::new(from_client)),
            writer: Some(to_client),
        };
        Ok((
            channel,
            ClientPipeHandles {
                input: client_input,
                output: client_output,
            },
        ))
    }

    /// Open the client side from the handle values passed on its command line.
    pub fn from_client_args(input: &str, output: &str) -> Result<Self> {
        let reader = open_inherited(input)?;
        let writer = open_inherited(output)?;
        Ok(Self::from_files(reader, writer))
    }

    /// Wrap already-open pipe ends.
    pub fn from_files(reader: File, writer: File) -> Self {
        Self {
            reader: Some(BufReader::new(reader)),
            writer: Some(writer),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none() && self.writer.is_none()
    }

    /// Write `line` plus a newline and flush.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| fault("channel is closed"))?;
        let mut frame = String::with_capacity(line.len() + 1);
        frame.push_str(line);
        frame.push('\n');
        writer
            .write_all(frame.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| fault(format!("write failed: {e}")))?;
        trace!("-> {}", line);
        Ok(())
    }

    /// Block until a full line arrives. `None` means the peer closed its end.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| fault("channel is closed"))?;
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| fault(format!("read failed: {e}")))?;
        if read == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        trace!("<- {}", line);
        Ok(Some(line))
    }

    /// Close both directions. Safe to call more than once.
    pub fn close(&mut self) {
        self.writer.take();
        self.reader.take();
    }
}

fn fault(message: impl Into<String>) -> DeployError {
    DeployError::ChannelFault {
        message: message.into(),
    }
}
