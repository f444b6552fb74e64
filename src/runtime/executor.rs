//! Conversation runtime executor

use super::{Command, Disposition, EngineUpdate};
use crate::state_machine::{
    transition, ConvContext, ConversationView, Effect, EngineState, Event, Notice,
    TransitionError,
};
use crate::submit::{SubmitRequest, SubmitService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Cadence task serving one stream
struct RevealTask {
    stream_id: u64,
    cancel: CancellationToken,
}

/// Runs one reveal engine: applies events in order and executes the
/// resulting effects. Works with any submit service implementation.
pub struct ConversationRuntime<C>
where
    C: SubmitService + ?Sized + 'static,
{
    context: ConvContext,
    state: EngineState,
    client: Arc<C>,
    reveal_interval: Duration,
    /// Commands from handles
    command_rx: mpsc::Receiver<Command>,
    /// Results posted back by submission and cadence tasks
    internal_rx: mpsc::Receiver<Event>,
    internal_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<EngineUpdate>,
    view_tx: watch::Sender<ConversationView>,
    shutdown: CancellationToken,
    reveal_task: Option<RevealTask>,
}

impl<C> ConversationRuntime<C>
where
    C: SubmitService + ?Sized + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: ConvContext,
        state: EngineState,
        client: Arc<C>,
        reveal_interval: Duration,
        command_rx: mpsc::Receiver<Command>,
        broadcast_tx: broadcast::Sender<EngineUpdate>,
        view_tx: watch::Sender<ConversationView>,
        shutdown: CancellationToken,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::channel(64);
        Self {
            context,
            state,
            client,
            reveal_interval,
            command_rx,
            internal_rx,
            internal_tx,
            broadcast_tx,
            view_tx,
            shutdown,
            reveal_task: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(conv_id = %self.context.conversation_id, "Starting conversation runtime");
        self.publish_view();

        // All state changes are serialized through this loop
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                command = self.command_rx.recv() => {
                    let Some(Command { event, reply }) = command else { break };
                    let result = self.process_event(event);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }

                Some(event) = self.internal_rx.recv() => {
                    if let Err(e) = self.process_event(event) {
                        tracing::error!(error = %e, "Error handling internal event");
                    }
                }
            }
        }

        self.cancel_reveal_task();
        tracing::info!(conv_id = %self.context.conversation_id, "Conversation runtime stopped");
    }

    fn process_event(&mut self, event: Event) -> Result<Disposition, TransitionError> {
        let event_name = event.name();

        let result = match transition(&self.state, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                let update = match &e {
                    TransitionError::Validation(_) => EngineUpdate::Notice {
                        notice: Notice::EnterText,
                    },
                    TransitionError::InvalidTransition(_) => EngineUpdate::Error {
                        message: e.to_string(),
                    },
                };
                tracing::warn!(
                    conv_id = %self.context.conversation_id,
                    event = event_name,
                    error = %e,
                    "Event rejected"
                );
                let _ = self.broadcast_tx.send(update);
                return Err(e);
            }
        };

        if let Some(reason) = result.ignored {
            tracing::debug!(
                conv_id = %self.context.conversation_id,
                event = event_name,
                reason = reason.as_str(),
                "Event ignored"
            );
            return Ok(Disposition::Ignored(reason));
        }

        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect);
        }

        Ok(Disposition::Accepted)
    }

    /// Execute an effect. Long-running work is spawned and reports back
    /// through the internal channel.
    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::SendTurn {
                request_id,
                request,
            } => self.spawn_submission(request_id, request),

            Effect::StartReveal {
                turn_index,
                stream_id,
                len,
            } => {
                // At most one cadence task per conversation
                self.cancel_reveal_task();

                let cancel = CancellationToken::new();
                self.reveal_task = Some(RevealTask {
                    stream_id,
                    cancel: cancel.clone(),
                });

                tracing::debug!(turn_index, stream_id, len, "Starting reveal cadence");
                tokio::spawn(run_cadence(
                    self.internal_tx.clone(),
                    turn_index,
                    stream_id,
                    len,
                    self.reveal_interval,
                    cancel,
                ));
            }

            Effect::CancelReveal { stream_id } => {
                if self
                    .reveal_task
                    .as_ref()
                    .is_some_and(|t| t.stream_id == stream_id)
                {
                    self.cancel_reveal_task();
                }
            }

            Effect::PublishView => self.publish_view(),

            Effect::PublishReveal {
                turn_index,
                shown,
                complete,
            } => {
                self.view_tx.send_replace(self.state.view(&self.context));
                let _ = self.broadcast_tx.send(EngineUpdate::Reveal {
                    turn_index,
                    shown,
                    complete,
                });
            }

            Effect::Notify { notice } => {
                if let Notice::SubmissionFailed { message, retryable } = &notice {
                    tracing::warn!(
                        conv_id = %self.context.conversation_id,
                        error = %message,
                        retryable,
                        "Submission failed"
                    );
                }
                let _ = self.broadcast_tx.send(EngineUpdate::Notice { notice });
            }
        }
    }

    fn spawn_submission(&self, request_id: u64, request: SubmitRequest) {
        let client = self.client.clone();
        let event_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            tracing::info!(
                conv_id = %request.conversation_id,
                request_id,
                "Submitting user turn (background)"
            );

            let event = match client.submit(&request).await {
                Ok(reply) => Event::SubmitSucceeded {
                    request_id,
                    reply: reply.reply_text,
                },
                Err(e) => Event::SubmitFailed {
                    request_id,
                    message: e.message,
                    error_kind: e.kind,
                },
            };
            // The runtime may be gone; the result is then simply dropped
            let _ = event_tx.send(event).await;
        });
    }

    fn publish_view(&self) {
        let view = self.state.view(&self.context);
        self.view_tx.send_replace(view.clone());
        let _ = self.broadcast_tx.send(EngineUpdate::View { view });
    }

    fn cancel_reveal_task(&mut self) {
        if let Some(task) = self.reveal_task.take() {
            task.cancel.cancel();
        }
    }
}

/// Emit one tick per interval until the turn is fully revealed or the
/// stream is cancelled. A zero interval reveals the whole turn at once.
async fn run_cadence(
    event_tx: mpsc::Sender<Event>,
    turn_index: usize,
    stream_id: u64,
    len: usize,
    interval: Duration,
    cancel: CancellationToken,
) {
    if interval.is_zero() {
        let _ = event_tx
            .send(Event::RevealFlush {
                turn_index,
                stream_id,
            })
            .await;
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately
    ticker.tick().await;

    for _ in 0..len {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!(stream_id, "Reveal cadence cancelled");
                return;
            }

            _ = ticker.tick() => {}
        }

        let tick = Event::RevealTick {
            turn_index,
            stream_id,
        };
        if event_tx.send(tick).await.is_err() {
            return;
        }
    }
}
