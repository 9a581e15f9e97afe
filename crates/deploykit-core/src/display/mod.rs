//! Out-of-process dialog display.
//!
//! The deployment process runs a [`DisplayServer`]; the companion executable
//! runs a [`DisplayClient`]. They talk over a [`DuplexChannel`] (two anonymous
//! pipes) using the line protocol in [`codec`]:
//!
//! ```text
//! server                                  client
//!   Open                               ->
//!                                      <-  True
//!   ShowModalDialog|DialogBox|Classic|<base64 JSON options>
//!                                      ->
//!                                      <-  <base64 JSON result> | Error|<message>
//!   ShowProgressDialog|Fluent|<base64 JSON options>
//!                                      ->
//!                                      <-  True
//!   UpdateProgressDialog|<base64 JSON update>
//!                                      ->
//!                                      <-  True
//!   CloseProgressDialog                ->
//!                                      <-  True
//!   Close                              ->
//!                                      <-  True
//! ```
//!
//! The progress dialog is non-modal: the client answers as soon as it is
//! shown, and the server keeps issuing requests while it stays up.

mod channel;
mod client;
pub mod codec;
mod dialog;
mod headless;
mod server;

pub use channel::{ClientPipeHandles, DuplexChannel};
pub use client::{DialogContext, DialogRenderer, DisplayClient};
pub use codec::Command;
pub use dialog::{
    BaseDialogOptions, CloseAppsDialogOptions, CloseAppsDialogResult, CloseAppsDialogStrings,
    CustomDialogOptions, DialogBoxButtons, DialogBoxDefaultButton, DialogBoxIcon,
    DialogBoxOptions, DialogBoxResult, DialogPosition, DialogRequest, DialogResponse,
    DialogStyle, DialogSystemIcon, DialogType, InputDialogOptions, InputDialogResult,
    MessageAlignment, ProgressDialogOptions, ProgressUpdate, RestartDialogOptions,
    RestartDialogStrings,
};
pub use headless::{HeadlessRenderer, RESTART_DEFERRED};
pub use server::{DisplayServer, SessionState};
