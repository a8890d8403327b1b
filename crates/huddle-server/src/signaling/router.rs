use crate::signaling::aggregator::{AnswerAggregator, Flush, RecordOutcome};
use crate::signaling::meetings::MeetingStore;
use crate::signaling::registry::ConnectionRegistry;
use huddle_protocol::{ClientMessage, IceCandidate, ServerMessage, SessionDescription};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Faults surfaced to the sender as an `error` reply. None of them ever
/// terminate the connection or change its state.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("{0}")]
    Precondition(&'static str),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

/// Single entry point for inbound protocol messages.
///
/// Owns the registry, meeting store, and aggregator outright; the coordinator
/// task is the only caller, so every handler runs to completion with no
/// interleaving. The connection-local state machine (unregistered →
/// registered → joined) is derived from the registry bindings.
pub struct MessageRouter {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) meetings: MeetingStore,
    pub(crate) aggregator: AnswerAggregator,
    answer_window: Duration,
}

impl MessageRouter {
    pub fn new(answer_window: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            meetings: MeetingStore::new(),
            aggregator: AnswerAggregator::new(),
            answer_window,
        }
    }

    pub fn attach(&mut self, connection_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.registry.register(connection_id, sender);
    }

    pub fn touch(&mut self, connection_id: Uuid) {
        self.registry.touch(connection_id);
    }

    /// Parses and dispatches one inbound frame. Malformed frames, violated
    /// preconditions, and internal faults all come back as `error` replies.
    pub fn handle_frame(&mut self, connection_id: Uuid, frame: &str) {
        self.registry.touch(connection_id);

        let message = match serde_json::from_str::<ClientMessage>(frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Malformed frame on {}: {}", connection_id, e);
                self.registry.send_to(
                    connection_id,
                    &ServerMessage::Error {
                        message: format!("malformed message: {}", e),
                    },
                );
                return;
            }
        };

        if let Err(e) = self.dispatch(connection_id, message) {
            if let SignalError::Internal(ref fault) = e {
                tracing::error!("Handler fault on {}: {:?}", connection_id, fault);
            }
            self.registry.send_to(
                connection_id,
                &ServerMessage::Error {
                    message: e.to_string(),
                },
            );
        }
    }

    fn dispatch(
        &mut self,
        connection_id: Uuid,
        message: ClientMessage,
    ) -> Result<(), SignalError> {
        match message {
            ClientMessage::Register { user_id } => self.handle_register(connection_id, user_id),
            ClientMessage::Join { meeting_id } => self.handle_join(connection_id, meeting_id),
            ClientMessage::Offer {
                target_user_id,
                meeting_id,
                sdp,
            } => self.handle_offer(connection_id, target_user_id, meeting_id, sdp),
            ClientMessage::Answer {
                target_user_id,
                meeting_id,
                sdp,
                candidates,
            } => self.handle_answer(connection_id, target_user_id, meeting_id, sdp, candidates),
            ClientMessage::IceCandidate {
                target_user_id,
                meeting_id,
                candidate,
            } => self.handle_candidate(connection_id, target_user_id, meeting_id, candidate),
            ClientMessage::Leave => self.handle_leave(connection_id),
            ClientMessage::Ping => {
                self.registry.send_to(connection_id, &ServerMessage::Pong);
                Ok(())
            }
            // Activity was already recorded by handle_frame
            ClientMessage::Pong => Ok(()),
        }
    }

    /// Valid from any state. Re-registering rebinds latest-wins and leaves
    /// meeting membership untouched.
    fn handle_register(
        &mut self,
        connection_id: Uuid,
        user_id: String,
    ) -> Result<(), SignalError> {
        self.registry.bind_user(connection_id, &user_id);
        self.registry
            .send_to(connection_id, &ServerMessage::Registered { user_id: user_id.clone() });

        tracing::info!("Connection {} registered as {}", connection_id, user_id);
        Ok(())
    }

    fn handle_join(&mut self, connection_id: Uuid, meeting_id: String) -> Result<(), SignalError> {
        let (user_id, bound_meeting) = self.require_registered(connection_id)?;
        if bound_meeting.is_some() {
            return Err(SignalError::Precondition(
                "already in a meeting; leave before joining another",
            ));
        }

        // Hand-off state is captured before the joiner is added, so the
        // reply excludes the joiner themselves
        let participants = self.meetings.participants(&meeting_id);
        let meeting_state = self.meetings.snapshot(&meeting_id);

        self.meetings.add_participant(&meeting_id, &user_id);
        self.registry
            .bind_meeting(connection_id, Some(meeting_id.clone()));

        self.registry.send_to(
            connection_id,
            &ServerMessage::Joined {
                meeting_id: meeting_id.clone(),
                participants,
                meeting_state,
            },
        );

        self.broadcast(
            &meeting_id,
            &user_id,
            &ServerMessage::ParticipantJoined {
                user_id: user_id.clone(),
            },
        );

        tracing::info!("User {} joined meeting {}", user_id, meeting_id);
        Ok(())
    }

    fn handle_offer(
        &mut self,
        connection_id: Uuid,
        target_user_id: Option<String>,
        meeting_id: Option<String>,
        sdp: SessionDescription,
    ) -> Result<(), SignalError> {
        let (user_id, bound_meeting) = self.require_joined(connection_id)?;

        if let Some(target) = target_user_id {
            let delivered = self.registry.send_to_user(
                &target,
                &ServerMessage::Offer {
                    from_user_id: user_id,
                    meeting_id: None,
                    sdp,
                },
            );
            if !delivered {
                self.registry.send_to(
                    connection_id,
                    &ServerMessage::TargetUnreachable {
                        target_user_id: target,
                    },
                );
            }
            return Ok(());
        }

        let meeting = self.implied_meeting(meeting_id, &bound_meeting)?;
        self.meetings.set_sdp(&meeting, &user_id, sdp.clone());

        // Fan out one offer per existing participant; peers that cannot be
        // reached right now can never answer, so they are excluded from the
        // expected set up front instead of timing out
        let mut expected = HashSet::new();
        for peer in self.meetings.participants_except(&meeting, &user_id) {
            let delivered = self.registry.send_to_user(
                &peer,
                &ServerMessage::Offer {
                    from_user_id: user_id.clone(),
                    meeting_id: Some(meeting.clone()),
                    sdp: sdp.clone(),
                },
            );
            if delivered {
                expected.insert(peer);
            } else {
                tracing::debug!("Peer {} unreachable, excluded from fan-out", peer);
            }
        }

        let deadline = Instant::now() + self.answer_window;
        if let Some(flush) = self
            .aggregator
            .open(&meeting, &user_id, connection_id, expected, deadline)
        {
            self.deliver_flush(flush);
        }

        Ok(())
    }

    fn handle_answer(
        &mut self,
        connection_id: Uuid,
        target_user_id: Option<String>,
        meeting_id: Option<String>,
        sdp: SessionDescription,
        candidates: Option<Vec<IceCandidate>>,
    ) -> Result<(), SignalError> {
        let (user_id, bound_meeting) = self.require_joined(connection_id)?;

        if let Some(target) = target_user_id {
            let delivered = self.registry.send_to_user(
                &target,
                &ServerMessage::Answer {
                    from_user_id: user_id,
                    sdp,
                },
            );
            if !delivered {
                self.registry.send_to(
                    connection_id,
                    &ServerMessage::TargetUnreachable {
                        target_user_id: target,
                    },
                );
            }
            return Ok(());
        }

        let meeting = self.implied_meeting(meeting_id, &bound_meeting)?;
        self.meetings.set_sdp(&meeting, &user_id, sdp.clone());

        match self
            .aggregator
            .record_answer(&meeting, &user_id, sdp, candidates)
        {
            RecordOutcome::Complete(flush) => {
                self.deliver_flush(flush);
                Ok(())
            }
            RecordOutcome::Recorded => Ok(()),
            RecordOutcome::NoSession => Err(SignalError::Precondition(
                "no answer aggregation in progress; name a target user",
            )),
        }
    }

    fn handle_candidate(
        &mut self,
        connection_id: Uuid,
        target_user_id: Option<String>,
        meeting_id: Option<String>,
        candidate: IceCandidate,
    ) -> Result<(), SignalError> {
        let (user_id, bound_meeting) = self.require_joined(connection_id)?;

        if let Some(target) = target_user_id {
            let delivered = self.registry.send_to_user(
                &target,
                &ServerMessage::IceCandidate {
                    from_user_id: user_id,
                    candidate,
                },
            );
            if !delivered {
                self.registry.send_to(
                    connection_id,
                    &ServerMessage::TargetUnreachable {
                        target_user_id: target,
                    },
                );
            }
            return Ok(());
        }

        let meeting = self.implied_meeting(meeting_id, &bound_meeting)?;
        self.meetings.add_candidate(&meeting, &user_id, candidate);

        let sync = ServerMessage::IceSync {
            meeting_id: meeting.clone(),
            candidates: self.meetings.candidates(&meeting),
        };
        self.broadcast(&meeting, &user_id, &sync);

        Ok(())
    }

    fn handle_leave(&mut self, connection_id: Uuid) -> Result<(), SignalError> {
        let (user_id, bound_meeting) = self.require_joined(connection_id)?;
        let meeting = bound_meeting.ok_or(SignalError::Precondition("not in a meeting"))?;

        self.meetings.remove_participant(&meeting, &user_id);
        self.registry.bind_meeting(connection_id, None);

        self.broadcast(
            &meeting,
            &user_id,
            &ServerMessage::ParticipantLeft {
                user_id: user_id.clone(),
            },
        );

        tracing::info!("User {} left meeting {}", user_id, meeting);
        Ok(())
    }

    /// The one cleanup path for transport close and heartbeat eviction
    /// alike. Idempotent: a second call for the same connection is a no-op.
    pub fn teardown(&mut self, connection_id: Uuid) {
        let Some(meta) = self.registry.meta_of(connection_id) else {
            return;
        };

        if let (Some(user_id), Some(meeting_id)) = (&meta.user_id, &meta.meeting_id) {
            // Skip meeting cleanup if a later register superseded this
            // connection; the user is still live elsewhere
            if self.registry.connection_of(user_id) == Some(connection_id) {
                self.meetings.remove_participant(meeting_id, user_id);
                self.broadcast(
                    meeting_id,
                    user_id,
                    &ServerMessage::ParticipantLeft {
                        user_id: user_id.clone(),
                    },
                );
            }
        }

        // A joiner that is gone must never receive a flush
        self.aggregator.discard_joiner(connection_id);

        // A peer that is gone can no longer answer anyone else's fan-out
        if let Some(user_id) = &meta.user_id {
            if self.registry.connection_of(user_id) == Some(connection_id) {
                for flush in self.aggregator.drop_expected_peer(user_id) {
                    self.deliver_flush(flush);
                }
            }
        }

        self.registry.unregister(connection_id);
    }

    /// Flushes every aggregation session whose deadline has elapsed.
    pub fn flush_due(&mut self, now: Instant) {
        for flush in self.aggregator.flush_due(now) {
            self.deliver_flush(flush);
        }
    }

    pub fn next_flush_deadline(&mut self) -> Option<Instant> {
        self.aggregator.next_deadline()
    }

    fn deliver_flush(&mut self, flush: Flush) {
        tracing::debug!(
            "Flushing {} aggregated answers for meeting {}",
            flush.payload.answers.len(),
            flush.payload.meeting_id
        );
        self.registry.send_to(
            flush.joiner_connection,
            &ServerMessage::AggregatedAnswers(flush.payload),
        );
    }

    /// Sends to every participant of the meeting except `except_user`.
    fn broadcast(&self, meeting_id: &str, except_user: &str, message: &ServerMessage) {
        for peer in self.meetings.participants_except(meeting_id, except_user) {
            self.registry.send_to_user(&peer, message);
        }
    }

    fn require_registered(
        &self,
        connection_id: Uuid,
    ) -> Result<(String, Option<String>), SignalError> {
        let meta = self
            .registry
            .meta_of(connection_id)
            .ok_or(SignalError::Precondition("connection not attached"))?;
        let user_id = meta
            .user_id
            .ok_or(SignalError::Precondition("register before joining"))?;
        Ok((user_id, meta.meeting_id))
    }

    fn require_joined(
        &self,
        connection_id: Uuid,
    ) -> Result<(String, Option<String>), SignalError> {
        let (user_id, meeting_id) = self.require_registered(connection_id)?;
        if meeting_id.is_none() {
            return Err(SignalError::Precondition("join a meeting first"));
        }
        Ok((user_id, meeting_id))
    }

    /// Meeting context for targetless signaling: the explicit meeting id if
    /// it matches the sender's bound meeting, otherwise the bound meeting.
    fn implied_meeting(
        &self,
        explicit: Option<String>,
        bound: &Option<String>,
    ) -> Result<String, SignalError> {
        let bound = bound
            .clone()
            .ok_or(SignalError::Precondition("not in a meeting"))?;
        match explicit {
            Some(named) if named != bound => Err(SignalError::Precondition(
                "message names a meeting the sender has not joined",
            )),
            _ => Ok(bound),
        }
    }
}
