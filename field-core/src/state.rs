//! Binding lifecycle state machine for crud-field.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of a field binding. It takes events as input and produces a
//! new phase plus a list of actions to execute.
//!
//! The actual I/O (subscribing, reading, detaching listeners) is performed
//! by field-client, not by this module.

use crudfield_types::FieldError;

/// Lifecycle phase of a field binding - NO I/O, just transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingPhase {
    /// Binding is being set up.
    Constructing,
    /// Channel subscription requested, not yet confirmed.
    Subscribing,
    /// Channel subscribed; value tracks server pushes.
    Subscribed,
    /// Socket re-authenticated and re-subscription was requested.
    ///
    /// Not blocking: the value keeps reflecting the last known state until
    /// the next push or load.
    StaleOnReauth,
    /// Binding was destroyed; no further actions are produced.
    Destroyed,
}

impl BindingPhase {
    /// Create a new state machine in the Constructing phase.
    pub fn new() -> Self {
        Self::Constructing
    }

    /// Process an event and return the new phase plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (field-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Destroyed is terminal
            (Self::Destroyed, _) => (Self::Destroyed, vec![]),

            (Self::Constructing, Event::SubscribeRequested) => {
                (Self::Subscribing, vec![Action::Subscribe])
            }

            // Every confirmed subscription means the value may be stale
            (_, Event::ChannelSubscribed) => (Self::Subscribed, vec![Action::Load]),

            (phase, Event::SubscribeFailed { error }) => (phase, vec![Action::EmitError(error)]),

            (Self::Subscribed, Event::Authenticated) => {
                (Self::StaleOnReauth, vec![Action::Resubscribe])
            }
            (phase @ (Self::Subscribing | Self::StaleOnReauth), Event::Authenticated) => {
                (phase, vec![Action::Resubscribe])
            }

            (_, Event::DestroyRequested) => (Self::Destroyed, vec![Action::Detach]),

            // Invalid transitions - stay in current phase
            (phase, _) => (phase, vec![]),
        }
    }

    /// Check if the binding is still live.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Destroyed)
    }

    /// Check if the channel subscription is currently confirmed.
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

impl Default for BindingPhase {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the binding lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Construction finished wiring and asks for a subscription.
    SubscribeRequested,
    /// The channel reported a successful subscription.
    ChannelSubscribed,
    /// The channel reported a failed subscription.
    SubscribeFailed {
        /// Normalized failure.
        error: FieldError,
    },
    /// The socket (re-)authenticated.
    Authenticated,
    /// The application disposed of the binding.
    DestroyRequested,
}

/// Actions to be executed by the field-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Subscribe to the field channel.
    Subscribe,
    /// Subscribe to the field channel again.
    Resubscribe,
    /// Issue a `read` and apply the result.
    Load,
    /// Surface an error to the application.
    EmitError(FieldError),
    /// Remove listeners and watchers, releasing the channel if unused.
    Detach,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> FieldError {
        FieldError::Remote {
            message: "forbidden".into(),
        }
    }

    #[test]
    fn starts_constructing() {
        let phase = BindingPhase::new();
        assert!(matches!(phase, BindingPhase::Constructing));
        assert!(phase.is_active());
    }

    #[test]
    fn subscribe_request_transitions_to_subscribing() {
        let (phase, actions) = BindingPhase::Constructing.on_event(Event::SubscribeRequested);

        assert_eq!(phase, BindingPhase::Subscribing);
        assert_eq!(actions, vec![Action::Subscribe]);
    }

    #[test]
    fn subscription_confirmed_triggers_load() {
        let (phase, actions) = BindingPhase::Subscribing.on_event(Event::ChannelSubscribed);

        assert!(phase.is_subscribed());
        assert_eq!(actions, vec![Action::Load]);
    }

    #[test]
    fn subscribed_during_construction_triggers_load() {
        // Channel was already subscribed when the binding attached
        let (phase, actions) = BindingPhase::Constructing.on_event(Event::ChannelSubscribed);

        assert_eq!(phase, BindingPhase::Subscribed);
        assert_eq!(actions, vec![Action::Load]);
    }

    #[test]
    fn subscribe_failure_emits_error_and_keeps_phase() {
        let (phase, actions) = BindingPhase::Subscribing.on_event(Event::SubscribeFailed {
            error: failure(),
        });

        assert_eq!(phase, BindingPhase::Subscribing);
        assert_eq!(actions, vec![Action::EmitError(failure())]);
    }

    #[test]
    fn authentication_while_subscribed_marks_stale() {
        let (phase, actions) = BindingPhase::Subscribed.on_event(Event::Authenticated);

        assert_eq!(phase, BindingPhase::StaleOnReauth);
        assert_eq!(actions, vec![Action::Resubscribe]);
    }

    #[test]
    fn authentication_while_subscribing_resubscribes() {
        let (phase, actions) = BindingPhase::Subscribing.on_event(Event::Authenticated);

        assert_eq!(phase, BindingPhase::Subscribing);
        assert_eq!(actions, vec![Action::Resubscribe]);
    }

    #[test]
    fn stale_returns_to_subscribed_with_load() {
        let (phase, actions) = BindingPhase::StaleOnReauth.on_event(Event::ChannelSubscribed);

        assert_eq!(phase, BindingPhase::Subscribed);
        assert_eq!(actions, vec![Action::Load]);
    }

    #[test]
    fn destroy_detaches_once() {
        let (phase, actions) = BindingPhase::Subscribed.on_event(Event::DestroyRequested);
        assert_eq!(phase, BindingPhase::Destroyed);
        assert_eq!(actions, vec![Action::Detach]);

        let (phase, actions) = phase.on_event(Event::DestroyRequested);
        assert_eq!(phase, BindingPhase::Destroyed);
        assert!(actions.is_empty());
    }

    #[test]
    fn destroyed_ignores_everything() {
        for event in [
            Event::SubscribeRequested,
            Event::ChannelSubscribed,
            Event::SubscribeFailed { error: failure() },
            Event::Authenticated,
        ] {
            let (phase, actions) = BindingPhase::Destroyed.on_event(event);
            assert!(!phase.is_active());
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn repeated_subscribe_request_is_ignored() {
        let (phase, actions) = BindingPhase::Subscribed.on_event(Event::SubscribeRequested);
        assert_eq!(phase, BindingPhase::Subscribed);
        assert!(actions.is_empty());
    }
}
