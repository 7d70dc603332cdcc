// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-driven command aggregation.
//!
//! The bundler accepts one command at a time and decides batch boundaries
//! through three rule classes, evaluated in order with first-true-wins:
//!
//! - **before-rules**: a hit seals the *current* bundle without the incoming
//!   command, which is then re-added to the fresh bundle.
//! - **after-rules**: a hit seals the bundle *including* the command.
//! - the **time-window rule**: a single-shot timer per added command posts a
//!   fire token back to the bundler's owner; a token that still names the
//!   bundle's last command seals it (debounce -- earlier tokens are stale).
//!
//! Rules must be pure functions of (bundle, command), and before-rules must
//! return `false` for an empty bundle; this bounds the re-add recursion.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::bundle::CommandBundle;
use crate::client::ClientState;
use crate::command::TrackingCommand;

/// A synchronous bundle-boundary rule.
pub trait BundleRule: Send {
    fn evaluate(&self, bundle: &CommandBundle, command: &TrackingCommand) -> bool;
}

/// Before-rule: a visitor switch forces a new bundle.
pub struct VisitorBundleRule;

impl BundleRule for VisitorBundleRule {
    fn evaluate(&self, bundle: &CommandBundle, command: &TrackingCommand) -> bool {
        bundle
            .first()
            .is_some_and(|first| first.visitor_id != command.visitor_id)
    }
}

/// Before-rule: a scene or page-view switch forces a new bundle, keeping the
/// request grouping key uniform across a bundle.
pub struct SceneBundleRule;

impl BundleRule for SceneBundleRule {
    fn evaluate(&self, bundle: &CommandBundle, command: &TrackingCommand) -> bool {
        bundle.first().is_some_and(|first| {
            first.scene.scene_id != command.scene.scene_id
                || first.scene.pv_id != command.scene.pv_id
        })
    }
}

/// After-rule: seals once the bundle reaches `max` commands, bounding
/// request size.
pub struct CountBundleRule {
    max: usize,
}

impl CountBundleRule {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl BundleRule for CountBundleRule {
    fn evaluate(&self, bundle: &CommandBundle, _command: &TrackingCommand) -> bool {
        bundle.len() >= self.max
    }
}

/// A pending async-rule result, posted back to the bundler's owner.
#[derive(Debug)]
pub enum AsyncFire {
    TimeWindow { command_id: String },
}

/// The async time-window rule: debounced sealing after a quiet period.
///
/// Every added command schedules a fresh single-shot timer carrying that
/// command's id. When a timer fires, the bundle seals only if no newer
/// command superseded the token -- and only while the delivery client is
/// idle; a fire against a busy client reschedules itself, which is also how
/// the backlog drains when the client leaves the `Running` state.
pub struct TimeWindowRule {
    interval: Duration,
    client_state: watch::Receiver<ClientState>,
}

impl TimeWindowRule {
    pub fn new(interval: Duration, client_state: watch::Receiver<ClientState>) -> Self {
        Self {
            interval,
            client_state,
        }
    }

    fn schedule(&self, command_id: String, tx: mpsc::UnboundedSender<AsyncFire>) {
        let interval = self.interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            // The owner may be gone; a dead letter is fine.
            let _ = tx.send(AsyncFire::TimeWindow { command_id });
        });
    }

    /// Whether the token still names the bundle's last command.
    fn evaluate(&self, bundle: &CommandBundle, command_id: &str) -> bool {
        !bundle.is_frozen() && bundle.last().is_some_and(|last| last.identifier == command_id)
    }

    fn is_immediately_bundlable(&self) -> bool {
        *self.client_state.borrow() == ClientState::Waiting
    }
}

/// The rule-driven aggregator. Owned and driven by a single executor task.
pub struct CommandBundler {
    before_rules: Vec<Box<dyn BundleRule>>,
    after_rules: Vec<Box<dyn BundleRule>>,
    time_window: Option<TimeWindowRule>,
    bundle: CommandBundle,
    fire_tx: mpsc::UnboundedSender<AsyncFire>,
}

impl CommandBundler {
    /// Returns the bundler and the receiver its owner must drain, feeding
    /// each [`AsyncFire`] back through [`handle_fire`](Self::handle_fire).
    pub fn new(
        before_rules: Vec<Box<dyn BundleRule>>,
        after_rules: Vec<Box<dyn BundleRule>>,
        time_window: Option<TimeWindowRule>,
    ) -> (Self, mpsc::UnboundedReceiver<AsyncFire>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        (
            Self {
                before_rules,
                after_rules,
                time_window,
                bundle: CommandBundle::default(),
                fire_tx,
            },
            fire_rx,
        )
    }

    /// Add one command, returning every bundle sealed by rule evaluation --
    /// in seal order, each frozen, each handed out exactly once.
    pub fn add_command(&mut self, command: TrackingCommand) -> Vec<CommandBundle> {
        let mut sealed = Vec::new();
        self.add_inner(command, &mut sealed);
        sealed
    }

    fn add_inner(&mut self, command: TrackingCommand, sealed: &mut Vec<CommandBundle>) {
        if self
            .before_rules
            .iter()
            .any(|rule| rule.evaluate(&self.bundle, &command))
        {
            sealed.push(self.next_bundle());
            // Re-add the triggering command to the fresh bundle. Bounded:
            // before-rules are false on an empty bundle.
            return self.add_inner(command, sealed);
        }

        let command_id = command.identifier.clone();
        self.bundle.add_command(command);

        let after_hit = {
            let added = self.bundle.last().expect("command just added");
            self.after_rules
                .iter()
                .any(|rule| rule.evaluate(&self.bundle, added))
        };
        if after_hit {
            sealed.push(self.next_bundle());
            return;
        }

        if let Some(window) = &self.time_window {
            window.schedule(command_id, self.fire_tx.clone());
        }
    }

    /// Evaluate a posted async-rule fire against the current bundle.
    pub fn handle_fire(&mut self, fire: AsyncFire) -> Option<CommandBundle> {
        let AsyncFire::TimeWindow { command_id } = fire;
        let window = self.time_window.as_ref()?;

        if !window.evaluate(&self.bundle, &command_id) {
            return None;
        }
        if !window.is_immediately_bundlable() {
            // Client is busy (or offline); check again after another window.
            window.schedule(command_id, self.fire_tx.clone());
            return None;
        }
        Some(self.next_bundle())
    }

    fn next_bundle(&mut self) -> CommandBundle {
        let mut old = std::mem::take(&mut self.bundle);
        old.freeze();
        old
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::command;

    fn bundler(
        before: Vec<Box<dyn BundleRule>>,
        after: Vec<Box<dyn BundleRule>>,
    ) -> (CommandBundler, mpsc::UnboundedReceiver<AsyncFire>) {
        CommandBundler::new(before, after, None)
    }

    #[test]
    fn visitor_switch_seals_before_adding() {
        let (mut bundler, _rx) = bundler(vec![Box::new(VisitorBundleRule)], vec![]);

        assert!(bundler.add_command(command("vis-a", "s1", "pv1")).is_empty());
        let sealed = bundler.add_command(command("vis-b", "s1", "pv1"));
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 1);
        assert_eq!(sealed[0].commands()[0].visitor_id, "vis-a");

        assert!(bundler.add_command(command("vis-b", "s1", "pv1")).is_empty());
        let sealed = bundler.add_command(command("vis-c", "s1", "pv1"));
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 2);
        assert!(
            sealed[0]
                .commands()
                .iter()
                .all(|c| c.visitor_id == "vis-b")
        );
    }

    #[test]
    fn scene_switch_seals_on_pv_or_scene_change() {
        let (mut bundler, _rx) = bundler(vec![Box::new(SceneBundleRule)], vec![]);
        let sequence = [
            ("s1", "pv1"),
            ("s1", "pv2"),
            ("s1", "pv2"),
            ("s1", "pv3"),
            ("s2", "pv3"),
            ("s2", "pv3"),
            ("s1", "pv4"),
            ("s1", "pv5"),
        ];

        let mut sealed = Vec::new();
        for (scene_id, pv_id) in sequence {
            sealed.extend(bundler.add_command(command("v", scene_id, pv_id)));
        }

        let sizes: Vec<usize> = sealed.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1, 2, 1, 2, 1]);
        for bundle in &sealed {
            let first = bundle.first().unwrap();
            assert!(bundle.commands().iter().all(|c| c.scene == first.scene));
        }
    }

    #[test]
    fn count_threshold_seals_exactly_at_n() {
        let (mut bundler, _rx) = bundler(vec![], vec![Box::new(CountBundleRule::new(3))]);

        assert!(bundler.add_command(command("v", "s1", "pv1")).is_empty());
        assert!(bundler.add_command(command("v", "s1", "pv1")).is_empty());
        let sealed = bundler.add_command(command("v", "s1", "pv1"));
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 3);

        // The next command starts a new bundle.
        assert!(bundler.add_command(command("v", "s1", "pv1")).is_empty());
    }

    #[test]
    fn zero_async_rules_only_seal_on_switch() {
        // A rule set with no after/async rules closes bundles only on a
        // visitor switch; the trailing bundle stays open.
        let (mut bundler, _rx) = bundler(vec![Box::new(VisitorBundleRule)], vec![]);
        for _ in 0..5 {
            assert!(bundler.add_command(command("v", "s1", "pv1")).is_empty());
        }
        let sealed = bundler.add_command(command("w", "s1", "pv1"));
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn time_window_debounces_until_quiet() {
        let (_state_tx, state_rx) = watch::channel(ClientState::Waiting);
        let window = TimeWindowRule::new(Duration::from_millis(100), state_rx);
        let (mut bundler, mut fire_rx) = CommandBundler::new(vec![], vec![], Some(window));

        assert!(bundler.add_command(command("v", "s1", "pv1")).is_empty());
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(bundler.add_command(command("v", "s1", "pv1")).is_empty());

        // The first command's token fires at t=100 but is stale.
        let fire = fire_rx.recv().await.unwrap();
        assert!(bundler.handle_fire(fire).is_none());

        // The second command's token fires at t=150 and seals both.
        let fire = fire_rx.recv().await.unwrap();
        let bundle = bundler.handle_fire(fire).expect("quiet window elapsed");
        assert!(bundle.is_frozen());
        assert_eq!(bundle.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn time_window_reschedules_while_client_busy() {
        let (state_tx, state_rx) = watch::channel(ClientState::Running);
        let window = TimeWindowRule::new(Duration::from_millis(100), state_rx);
        let (mut bundler, mut fire_rx) = CommandBundler::new(vec![], vec![], Some(window));

        assert!(bundler.add_command(command("v", "s1", "pv1")).is_empty());

        // Busy client: the fire reschedules instead of sealing.
        let fire = fire_rx.recv().await.unwrap();
        assert!(bundler.handle_fire(fire).is_none());

        // Once the client drains, the rescheduled fire seals.
        state_tx.send(ClientState::Waiting).unwrap();
        let fire = fire_rx.recv().await.unwrap();
        let bundle = bundler.handle_fire(fire).expect("client now idle");
        assert_eq!(bundle.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fire_for_an_already_sealed_command_is_ignored() {
        let (_state_tx, state_rx) = watch::channel(ClientState::Waiting);
        let window = TimeWindowRule::new(Duration::from_millis(100), state_rx);
        let (mut bundler, mut fire_rx) =
            CommandBundler::new(vec![Box::new(VisitorBundleRule)], vec![], Some(window));

        assert!(bundler.add_command(command("vis-a", "s1", "pv1")).is_empty());
        tokio::time::advance(Duration::from_millis(10)).await;

        // The visitor switch seals [vis-a]; its pending token is now stale.
        let sealed = bundler.add_command(command("vis-b", "s1", "pv1"));
        assert_eq!(sealed.len(), 1);

        let fire = fire_rx.recv().await.unwrap();
        assert!(bundler.handle_fire(fire).is_none(), "stale token must not seal");

        let fire = fire_rx.recv().await.unwrap();
        let bundle = bundler.handle_fire(fire).expect("fresh token seals");
        assert_eq!(bundle.commands()[0].visitor_id, "vis-b");
    }
}
