//! Bounded-retry re-assertion
//!
//! A toggled control may be flipped back by the tree owner at any time.
//! Each re-asserting behavior runs this small state machine, driven by a
//! fixed-delay timer: while the governing flag stays on and the control
//! keeps re-appearing "on", the engine re-toggles it; the only
//! cancellation is the governing flag being false when a retry fires.
//! The transition function is pure so the schedule can be driven by a
//! test clock.

use super::BehaviorRuntime;
use crate::tree::{NodeId, ObservedTree};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Delay between re-assertion checks.
pub const REASSERT_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// No retry scheduled.
    Idle,
    /// A retry is scheduled but has not fired yet.
    Armed,
    /// At least one retry has fired and re-toggled the control.
    Retrying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// A reconciliation pass toggled the control and wants re-assertion.
    Arm,
    /// The scheduled delay elapsed. `enabled` is the governing flag and
    /// `reasserted` whether the control is back in its "on" state, both
    /// read at fire time.
    Fire { enabled: bool, reasserted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Schedule the first retry.
    Schedule,
    /// Re-toggle the control; another retry fires after the delay.
    Toggle,
    /// Stop; the loop is over until a pass arms it again.
    Stop,
    /// Nothing to do (already armed).
    None,
}

/// Pure transition function for the re-assertion machine.
pub fn step(state: RetryState, event: RetryEvent) -> (RetryState, RetryAction) {
    match (state, event) {
        (RetryState::Idle, RetryEvent::Arm) => (RetryState::Armed, RetryAction::Schedule),
        (state, RetryEvent::Arm) => (state, RetryAction::None),
        // Stray timer with nothing armed
        (RetryState::Idle, RetryEvent::Fire { .. }) => (RetryState::Idle, RetryAction::Stop),
        (_, RetryEvent::Fire { enabled: false, .. }) => (RetryState::Idle, RetryAction::Stop),
        (_, RetryEvent::Fire { reasserted: true, .. }) => (RetryState::Retrying, RetryAction::Toggle),
        (_, RetryEvent::Fire { reasserted: false, .. }) => (RetryState::Idle, RetryAction::Stop),
    }
}

/// Which behavior's retry cell and governing flag to drive.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ReassertTarget {
    Autoplay,
    Annotations,
}

impl ReassertTarget {
    fn cell<'a>(&self, runtime: &'a BehaviorRuntime) -> &'a Mutex<RetryState> {
        match self {
            ReassertTarget::Autoplay => &runtime.autoplay_retry,
            ReassertTarget::Annotations => &runtime.annotation_retry,
        }
    }

    fn enabled(&self, runtime: &BehaviorRuntime) -> bool {
        let flags = runtime.flags();
        match self {
            ReassertTarget::Autoplay => flags.hide_autoplay,
            ReassertTarget::Annotations => flags.hide_annotations,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReassertTarget::Autoplay => "autoplay",
            ReassertTarget::Annotations => "annotations",
        }
    }
}

/// Arm the re-assertion loop for `control`. No-op when already armed.
pub(crate) fn arm(
    tree: &ObservedTree,
    runtime: &Arc<BehaviorRuntime>,
    target: ReassertTarget,
    control: NodeId,
) {
    {
        let mut state = target.cell(runtime).lock().unwrap();
        let (next, action) = step(*state, RetryEvent::Arm);
        *state = next;
        if action != RetryAction::Schedule {
            return;
        }
    }

    let tree = tree.clone();
    let runtime = runtime.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REASSERT_DELAY).await;

            // Governing condition and control state read at fire time; an
            // in-flight timer is never aborted, only rendered a no-op here
            let enabled = target.enabled(&runtime);
            let reasserted = tree.is_alive(control)
                && tree.attribute(control, "aria-checked").as_deref() == Some("true");

            let action = {
                let mut state = target.cell(&runtime).lock().unwrap();
                let (next, action) = step(*state, RetryEvent::Fire { enabled, reasserted });
                *state = next;
                action
            };

            match action {
                RetryAction::Toggle => {
                    debug!("{}: control re-asserted, re-toggling", target.label());
                    tree.activate(control);
                }
                _ => break,
            }
        }
    });
}
