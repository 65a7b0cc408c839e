//! Front-end command handling.
//!
//! Turns one decoded [`FrontEndCommand`] into work on the fan-out
//! coordinator and turns the per-device outcomes back into exactly one
//! [`ServerMessage`] reply.  Every command gets a reply; nothing is dropped
//! silently.
//!
//! # Reply rules
//!
//! | Command                        | Reply                                       |
//! |--------------------------------|---------------------------------------------|
//! | malformed JSON / unknown type  | `error` naming the decode failure           |
//! | `get_devices`                  | `devices` snapshot                          |
//! | `keyboard` with unknown key    | `ack` error, nothing is sent                |
//! | `keyboard`/`text` to a device  | `ack` success, or error with the reason     |
//! | `keyboard`/`text` to broadcast | `ack` success if every attempted device succeeded |

use tracing::{debug, info, warn};

use keyrelay_core::{Keystroke, Modifiers};

use crate::application::fanout::{DeviceOp, FanOut};
use crate::application::outcome::CommandOutcome;
use crate::domain::messages::{FrontEndCommand, ServerMessage, Target};

/// Stateless front-end command dispatcher.  Shared by every session.
#[derive(Clone)]
pub struct CommandHandler {
    fanout: FanOut,
}

impl CommandHandler {
    pub fn new(fanout: FanOut) -> Self {
        Self { fanout }
    }

    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    /// The current device list as a `devices` message.
    pub fn device_list(&self) -> ServerMessage {
        let snapshot: Vec<_> = self.fanout.registry().list().collect();
        ServerMessage::devices(&snapshot)
    }

    /// Decodes one text frame and handles it.
    ///
    /// A frame that does not decode produces an `error` reply; the caller
    /// keeps the session open.
    pub async fn handle_frame(&self, raw: &str) -> ServerMessage {
        match serde_json::from_str::<FrontEndCommand>(raw) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                warn!(error = %e, "undecodable front-end frame");
                ServerMessage::error(format!("Invalid JSON: {e}"))
            }
        }
    }

    pub async fn handle(&self, command: FrontEndCommand) -> ServerMessage {
        match command {
            FrontEndCommand::GetDevices => self.device_list(),
            FrontEndCommand::Keyboard {
                device,
                key,
                modifiers,
            } => self.handle_keyboard(&device, &key, modifiers).await,
            FrontEndCommand::Text { device, text } => self.handle_text(&device, &text).await,
        }
    }

    async fn handle_keyboard(
        &self,
        device: &str,
        key: &str,
        modifiers: Modifiers,
    ) -> ServerMessage {
        let stroke = match Keystroke::from_name(key, modifiers) {
            Ok(stroke) => stroke,
            Err(e) => {
                warn!(key, "rejected keyboard command: {e}");
                return ServerMessage::ack_error(e.to_string());
            }
        };
        let op = DeviceOp::key(stroke);
        let what = format!("key {}", key.to_ascii_uppercase());
        self.dispatch(device, &op, &what).await
    }

    async fn handle_text(&self, device: &str, text: &str) -> ServerMessage {
        let op = DeviceOp::text(text);
        let skipped = op.unmapped_chars();
        if !skipped.is_empty() {
            debug!(?skipped, "text contains characters with no key");
        }
        let what = format!("text ({} chars)", text.chars().count());
        match self.dispatch(device, &op, &what).await {
            ServerMessage::Ack { status, message } if !skipped.is_empty() => ServerMessage::Ack {
                status,
                message: format!("{message}; skipped {} unmapped char(s)", skipped.len()),
            },
            reply => reply,
        }
    }

    async fn dispatch(&self, device: &str, op: &DeviceOp, what: &str) -> ServerMessage {
        match Target::parse(device) {
            Target::Device(id) => {
                let outcome = self.fanout.dispatch_to_one(id, op).await;
                match outcome.error_detail() {
                    None => {
                        let label = self
                            .fanout
                            .registry()
                            .get(id)
                            .map(|s| s.label)
                            .unwrap_or_else(|| id.to_string());
                        info!(device = id, "sent {what}");
                        ServerMessage::ack_success(format!("Sent {what} to {label}"))
                    }
                    Some(reason) => ServerMessage::ack_error(reason),
                }
            }
            Target::Broadcast => {
                let outcomes = self.fanout.dispatch_to_all(op).await;
                summarize_broadcast(&outcomes, what)
            }
        }
    }
}

/// Folds broadcast outcomes into one acknowledgement.
///
/// Success means every attempted device succeeded, which holds trivially
/// when nothing was connected.  Skipped devices are listed in the message
/// but do not turn a success into an error.
pub fn summarize_broadcast(outcomes: &[CommandOutcome], what: &str) -> ServerMessage {
    let succeeded = outcomes.iter().filter(|o| o.success()).count();
    let all_attempted_ok = outcomes.iter().filter(|o| o.attempted).all(CommandOutcome::success);

    let mut message = format!(
        "Broadcast {what}: {succeeded}/{} devices succeeded",
        outcomes.len()
    );
    for outcome in outcomes {
        if let Some(reason) = outcome.error_detail() {
            message.push_str(&format!("; {}: {reason}", outcome.device_id));
        }
    }

    if all_attempted_ok {
        info!("{message}");
        ServerMessage::ack_success(message)
    } else {
        warn!("{message}");
        ServerMessage::ack_error(message)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
