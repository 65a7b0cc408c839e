//! The fan-out coordinator: plays one operation on one or many devices.
//!
//! A device operation is either a single keystroke (press, hold, release) or
//! a whole text string (one keystroke per mapped character with a pause in
//! between).  For a broadcast, each connected device gets its own tokio task,
//! so a slow or failing device never holds up the rest; the coordinator waits
//! for every task and returns one [`CommandOutcome`] per registered device.
//!
//! ```text
//!              ┌──────────────┐
//!  DeviceOp ──►│   FanOut     │──spawn──► device a: press ─ hold ─ release
//!              │              │──spawn──► device b: press ─ hold ─ release
//!              └──────┬───────┘    (c not connected: skipped)
//!                     ▼
//!        [ok(a), ok(b), not_connected(c)]
//! ```

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use keyrelay_core::protocol::text::unmapped_chars;
use keyrelay_core::{encode_text, DeviceId, KeyTiming, Keystroke};

use crate::application::link::{DeviceLink, LinkError};
use crate::application::outcome::{CommandOutcome, DispatchFailure};
use crate::application::registry::{DeviceRegistry, SharedLink};

/// What to play on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    Key(Keystroke),
    Text(Arc<str>),
}

/// One action plus optional timing overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOp {
    action: DeviceAction,
    timing: Option<KeyTiming>,
}

impl DeviceOp {
    pub fn key(stroke: Keystroke) -> Self {
        Self {
            action: DeviceAction::Key(stroke),
            timing: None,
        }
    }

    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self {
            action: DeviceAction::Text(text.into()),
            timing: None,
        }
    }

    /// Overrides the coordinator's default timing for this operation only.
    pub fn with_timing(mut self, timing: KeyTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn action(&self) -> &DeviceAction {
        &self.action
    }

    /// Characters of a text action that will be skipped.
    pub fn unmapped_chars(&self) -> Vec<char> {
        match &self.action {
            DeviceAction::Key(_) => Vec::new(),
            DeviceAction::Text(text) => unmapped_chars(text),
        }
    }
}

/// Dispatches [`DeviceOp`]s to devices in the registry.
#[derive(Clone)]
pub struct FanOut {
    registry: Arc<DeviceRegistry>,
    timing: KeyTiming,
}

impl FanOut {
    pub fn new(registry: Arc<DeviceRegistry>, timing: KeyTiming) -> Self {
        Self { registry, timing }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn timing(&self) -> KeyTiming {
        self.timing
    }

    /// Plays `op` on one device.
    ///
    /// Unknown and not-connected devices fail immediately without touching
    /// any connection.  If the device is already busy with another
    /// operation, this one waits its turn.
    pub async fn dispatch_to_one(&self, id: &str, op: &DeviceOp) -> CommandOutcome {
        let (id, link) = match self.registry.link_for(id) {
            Ok(found) => found,
            Err(failure) => {
                debug!(device = id, %failure, "device skipped");
                return CommandOutcome::skipped(DeviceId::new(id), failure);
            }
        };
        let handle = self.spawn_on(id.clone(), link, op);
        join_outcome(id, handle).await
    }

    /// Plays `op` on every connected device concurrently.
    ///
    /// Returns one outcome per registered device, in registration order.
    /// Devices that are not connected get an unattempted `NotConnected`
    /// outcome.
    pub async fn dispatch_to_all(&self, op: &DeviceOp) -> Vec<CommandOutcome> {
        enum Pending {
            Done(CommandOutcome),
            Running(DeviceId, JoinHandle<CommandOutcome>),
        }

        let pending: Vec<Pending> = self
            .registry
            .targets()
            .into_iter()
            .map(|(id, link)| match link {
                Some(link) => Pending::Running(id.clone(), self.spawn_on(id, link, op)),
                None => Pending::Done(CommandOutcome::skipped(
                    id.clone(),
                    DispatchFailure::NotConnected(id),
                )),
            })
            .collect();

        join_all(pending.into_iter().map(|p| async move {
            match p {
                Pending::Done(outcome) => outcome,
                Pending::Running(id, handle) => join_outcome(id, handle).await,
            }
        }))
        .await
    }

    fn spawn_on(
        &self,
        id: DeviceId,
        link: SharedLink,
        op: &DeviceOp,
    ) -> JoinHandle<CommandOutcome> {
        let registry = Arc::clone(&self.registry);
        let action = op.action.clone();
        let timing = op.timing.unwrap_or(self.timing);
        tokio::spawn(async move {
            let result = {
                // Held for the whole playback: commands for the same device
                // run one after another.
                let mut guard = link.lock().await;
                play(&mut **guard, &action, timing).await
            };
            match result {
                Ok(()) => CommandOutcome::succeeded(id),
                Err(err) => {
                    warn!(device = %id, error = %err, "send failed");
                    if err.is_connection_loss() {
                        registry.report_link_failure(&id, &link).await;
                    }
                    CommandOutcome::failed(id, true, DispatchFailure::Link(err))
                }
            }
        })
    }
}

async fn join_outcome(id: DeviceId, handle: JoinHandle<CommandOutcome>) -> CommandOutcome {
    match handle.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            warn!(device = %id, error = %join_err, "device task aborted");
            CommandOutcome::failed(id, true, DispatchFailure::Aborted(join_err.to_string()))
        }
    }
}

/// Plays one action on a link: press, hold, release for a key; one
/// keystroke per mapped character, separated by the inter-character delay,
/// for text.
pub async fn play(
    link: &mut dyn DeviceLink,
    action: &DeviceAction,
    timing: KeyTiming,
) -> Result<(), LinkError> {
    match action {
        DeviceAction::Key(stroke) => play_keystroke(link, stroke, timing).await,
        DeviceAction::Text(text) => {
            for (index, stroke) in encode_text(text).enumerate() {
                if index > 0 {
                    tokio::time::sleep(timing.char_delay).await;
                }
                play_keystroke(link, &stroke, timing).await?;
            }
            Ok(())
        }
    }
}

async fn play_keystroke(
    link: &mut dyn DeviceLink,
    stroke: &Keystroke,
    timing: KeyTiming,
) -> Result<(), LinkError> {
    link.send(&stroke.press).await?;
    tokio::time::sleep(timing.hold).await;
    link.send(&stroke.release).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::tests::{LinkProbe, RecordingLink, StubConnector};
    use keyrelay_core::{ConnectionState, KeyReport, Modifiers};
    use std::time::{Duration, Instant};

    const FAST: KeyTiming = KeyTiming {
        hold: Duration::from_millis(1),
        char_delay: Duration::from_millis(1),
    };
    const TIMEOUT: Duration = Duration::from_secs(1);

    fn stroke(name: &str) -> Keystroke {
        Keystroke::from_name(name, Modifiers::NONE).unwrap()
    }

    /// Builds a coordinator whose connector serves `ws://<id>:1` with the
    /// given link.  Devices without a link are refused on connect.
    async fn fanout_with(
        devices: Vec<(&str, Option<RecordingLink>)>,
    ) -> (FanOut, Arc<DeviceRegistry>) {
        let connector = devices
            .into_iter()
            .filter_map(|(id, link)| link.map(|link| (id, link)))
            .fold(StubConnector::default(), |connector, (id, link)| {
                connector.with_link(&format!("ws://{id}:1"), link)
            });
        let registry = Arc::new(DeviceRegistry::new(Arc::new(connector)));
        (FanOut::new(Arc::clone(&registry), FAST), registry)
    }

    async fn register(registry: &Arc<DeviceRegistry>, id: &str, connect: bool) {
        registry.add(id, id.to_uppercase(), format!("ws://{id}:1")).unwrap();
        if connect {
            registry.connect(id, TIMEOUT).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_key_on_one_device_sends_press_then_release() {
        // Arrange
        let probe = LinkProbe::default();
        let (fanout, registry) = fanout_with(vec![("a", Some(RecordingLink::new(&probe)))]).await;
        register(&registry, "a", true).await;

        // Act
        let outcome = fanout
            .dispatch_to_one("a", &DeviceOp::key(stroke("TAB")))
            .await;

        // Assert
        assert!(outcome.success());
        let sent = probe.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].keycode(), 0x2B);
        assert!(sent[1].is_release());
    }

    #[tokio::test]
    async fn test_unknown_device_fails_without_attempt() {
        let (fanout, _registry) = fanout_with(vec![]).await;

        let outcome = fanout
            .dispatch_to_one("ghost", &DeviceOp::key(stroke("A")))
            .await;

        assert!(!outcome.attempted);
        assert_eq!(
            outcome.failure,
            Some(DispatchFailure::NotFound(DeviceId::new("ghost")))
        );
    }

    #[tokio::test]
    async fn test_not_connected_device_fails_without_sending() {
        let (fanout, registry) = fanout_with(vec![("a", None)]).await;
        register(&registry, "a", false).await;

        let outcome = fanout.dispatch_to_one("a", &DeviceOp::key(stroke("A"))).await;

        assert!(!outcome.attempted);
        assert_eq!(
            outcome.failure,
            Some(DispatchFailure::NotConnected(DeviceId::new("a")))
        );
    }

    #[tokio::test]
    async fn test_text_sends_pair_per_mapped_char() {
        let probe = LinkProbe::default();
        let (fanout, registry) = fanout_with(vec![("a", Some(RecordingLink::new(&probe)))]).await;
        register(&registry, "a", true).await;

        let outcome = fanout.dispatch_to_one("a", &DeviceOp::text("HI!")).await;

        assert!(outcome.success());
        let codes: Vec<u8> = probe.sent().iter().map(KeyReport::keycode).collect();
        // '!' has no key and is skipped.
        assert_eq!(codes, vec![0x0B, 0x00, 0x0C, 0x00]);
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failing_device() {
        // Arrange: a and c healthy, b's transport is broken, d never connected
        let (pa, pb, pc) = (LinkProbe::default(), LinkProbe::default(), LinkProbe::default());
        let (fanout, registry) = fanout_with(vec![
            ("a", Some(RecordingLink::new(&pa))),
            (
                "b",
                Some(
                    RecordingLink::new(&pb)
                        .failing(LinkError::Transport("connection reset".to_string())),
                ),
            ),
            ("c", Some(RecordingLink::new(&pc))),
            ("d", None),
        ])
        .await;
        for id in ["a", "b", "c"] {
            register(&registry, id, true).await;
        }
        register(&registry, "d", false).await;

        // Act
        let outcomes = fanout.dispatch_to_all(&DeviceOp::key(stroke("ENTER"))).await;

        // Assert
        let ids: Vec<&str> = outcomes.iter().map(|o| o.device_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(outcomes[0].success());
        assert!(!outcomes[1].success() && outcomes[1].attempted);
        assert!(outcomes[2].success());
        assert!(!outcomes[3].attempted);
        assert_eq!(pa.sent().len(), 2);
        assert_eq!(pc.sent().len(), 2);
        assert!(pb.sent().is_empty());
        // The broken connection is dropped from the registry.
        assert_eq!(registry.get("b").unwrap().state, ConnectionState::Disconnected);
        assert!(pb.is_closed());
    }

    #[tokio::test]
    async fn test_broadcast_runs_devices_concurrently() {
        // Two devices each stall 200 ms per report (4 reports total).
        let (pa, pb) = (LinkProbe::default(), LinkProbe::default());
        let delay = Duration::from_millis(200);
        let (fanout, registry) = fanout_with(vec![
            ("a", Some(RecordingLink::new(&pa).slow(delay))),
            ("b", Some(RecordingLink::new(&pb).slow(delay))),
        ])
        .await;
        register(&registry, "a", true).await;
        register(&registry, "b", true).await;

        let started = Instant::now();
        let outcomes = fanout.dispatch_to_all(&DeviceOp::key(stroke("A"))).await;
        let elapsed = started.elapsed();

        assert!(outcomes.iter().all(CommandOutcome::success));
        // Sequential would be >= 800 ms.
        assert!(elapsed < Duration::from_millis(700), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_same_device_commands_do_not_interleave() {
        let probe = LinkProbe::default();
        let (fanout, registry) = fanout_with(vec![(
            "a",
            Some(RecordingLink::new(&probe).slow(Duration::from_millis(5))),
        )])
        .await;
        register(&registry, "a", true).await;

        let first = DeviceOp::text("AAAA");
        let second = DeviceOp::text("BBBB");
        let (o1, o2) = tokio::join!(
            fanout.dispatch_to_one("a", &first),
            fanout.dispatch_to_one("a", &second)
        );

        assert!(o1.success() && o2.success());
        let codes: Vec<u8> = probe
            .sent()
            .iter()
            .filter(|r| !r.is_release())
            .map(KeyReport::keycode)
            .collect();
        // Either order is fine, but each text must be contiguous.
        let a = 0x04;
        let b = 0x05;
        assert!(
            codes == vec![a, a, a, a, b, b, b, b] || codes == vec![b, b, b, b, a, a, a, a],
            "interleaved: {codes:?}"
        );
    }

    #[tokio::test]
    async fn test_hold_duration_applies_between_press_and_release() {
        let probe = LinkProbe::default();
        let (fanout, registry) = fanout_with(vec![("a", Some(RecordingLink::new(&probe)))]).await;
        register(&registry, "a", true).await;
        let op = DeviceOp::key(stroke("A")).with_timing(KeyTiming::from_millis(120, 0));

        let started = Instant::now();
        let outcome = fanout.dispatch_to_one("a", &op).await;

        assert!(outcome.success());
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_unmapped_chars_only_for_text() {
        assert!(DeviceOp::key(stroke("A")).unmapped_chars().is_empty());
        assert_eq!(DeviceOp::text("a-b").unmapped_chars(), vec!['-']);
    }
}
