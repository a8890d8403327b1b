use huddle_protocol::{AggregatedAnswers, IceCandidate, SessionDescription};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio::time::Instant;
use uuid::Uuid;

/// `(meetingId, joinerUserId)`
type SessionKey = (String, String);

#[derive(Debug)]
struct AggregationSession {
    expected_peers: HashSet<String>,
    answers: HashMap<String, SessionDescription>,
    candidates: HashMap<String, Vec<IceCandidate>>,
    joiner_connection: Uuid,
    deadline: Instant,
}

/// A flush ready for delivery to the joiner. Produced exactly once per
/// session, either on completion or at the deadline.
#[derive(Debug)]
pub struct Flush {
    pub joiner_connection: Uuid,
    pub payload: AggregatedAnswers,
}

#[derive(Debug)]
pub enum RecordOutcome {
    /// Answer recorded; more expected peers outstanding
    Recorded,
    /// Answer recorded and the session completed
    Complete(Flush),
    /// No open session matched; the answer takes the direct path instead
    NoSession,
}

/// Collects answers to a joiner's offer fan-out behind a bounded deadline so
/// one unresponsive peer can never block the join.
///
/// Deadlines sit in a min-heap polled by the coordinator loop. Entries whose
/// session has already flushed (or been replaced) are skipped lazily, which
/// is what makes the single-flush guarantee cheap to keep.
pub struct AnswerAggregator {
    sessions: HashMap<SessionKey, AggregationSession>,
    deadlines: BinaryHeap<Reverse<(Instant, SessionKey)>>,
}

impl AnswerAggregator {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            deadlines: BinaryHeap::new(),
        }
    }

    /// Opens a session for a joiner's fan-out. Peers already known to be
    /// unreachable must be excluded by the caller before this point. An
    /// empty expected set flushes immediately without storing a session; a
    /// still-open session for the same key is replaced and never flushed.
    pub fn open(
        &mut self,
        meeting_id: &str,
        joiner: &str,
        joiner_connection: Uuid,
        expected_peers: HashSet<String>,
        deadline: Instant,
    ) -> Option<Flush> {
        let key = (meeting_id.to_string(), joiner.to_string());

        if expected_peers.is_empty() {
            self.sessions.remove(&key);
            return Some(Flush {
                joiner_connection,
                payload: AggregatedAnswers {
                    meeting_id: meeting_id.to_string(),
                    answers: HashMap::new(),
                    candidates: HashMap::new(),
                },
            });
        }

        self.sessions.insert(
            key.clone(),
            AggregationSession {
                expected_peers,
                answers: HashMap::new(),
                candidates: HashMap::new(),
                joiner_connection,
                deadline,
            },
        );
        self.deadlines.push(Reverse((deadline, key)));

        None
    }

    /// Records an answer (and any accompanying candidates) into the open
    /// session in this meeting that is still waiting on the answering peer.
    pub fn record_answer(
        &mut self,
        meeting_id: &str,
        from_user_id: &str,
        sdp: SessionDescription,
        candidates: Option<Vec<IceCandidate>>,
    ) -> RecordOutcome {
        let key = self.sessions.iter().find_map(|(key, session)| {
            if key.0 == meeting_id
                && session.expected_peers.contains(from_user_id)
                && !session.answers.contains_key(from_user_id)
            {
                Some(key.clone())
            } else {
                None
            }
        });

        let Some(key) = key else {
            return RecordOutcome::NoSession;
        };

        let session = match self.sessions.get_mut(&key) {
            Some(s) => s,
            None => return RecordOutcome::NoSession,
        };

        session.answers.insert(from_user_id.to_string(), sdp);
        if let Some(candidates) = candidates {
            session
                .candidates
                .entry(from_user_id.to_string())
                .or_default()
                .extend(candidates);
        }

        if session.answers.len() >= session.expected_peers.len() {
            let flush = self.close(&key);
            match flush {
                Some(flush) => RecordOutcome::Complete(flush),
                None => RecordOutcome::NoSession,
            }
        } else {
            RecordOutcome::Recorded
        }
    }

    /// Removes a peer that can no longer answer (disconnected mid-window)
    /// from every expected set; sessions that thereby complete are flushed.
    pub fn drop_expected_peer(&mut self, user_id: &str) -> Vec<Flush> {
        let mut completed = Vec::new();

        for (key, session) in self.sessions.iter_mut() {
            if session.expected_peers.remove(user_id)
                && session.answers.len() >= session.expected_peers.len()
            {
                completed.push(key.clone());
            }
        }

        completed.into_iter().filter_map(|key| self.close(&key)).collect()
    }

    /// Discards every pending session owned by a disconnecting joiner; no
    /// flush is sent for them.
    pub fn discard_joiner(&mut self, joiner_connection: Uuid) {
        self.sessions
            .retain(|_, session| session.joiner_connection != joiner_connection);
    }

    /// Earliest live deadline, if any. Skips stale heap entries.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, key))) = self.deadlines.peek() {
            match self.sessions.get(key) {
                Some(session) if session.deadline == *deadline => return Some(*deadline),
                _ => {
                    self.deadlines.pop();
                }
            }
        }
        None
    }

    /// Flushes every session whose deadline has elapsed, partial or not.
    pub fn flush_due(&mut self, now: Instant) -> Vec<Flush> {
        let mut flushes = Vec::new();

        while let Some(Reverse((deadline, _))) = self.deadlines.peek() {
            if *deadline > now {
                break;
            }
            let Some(Reverse((deadline, key))) = self.deadlines.pop() else {
                break;
            };
            let live = self
                .sessions
                .get(&key)
                .map(|s| s.deadline == deadline)
                .unwrap_or(false);
            if live {
                if let Some(flush) = self.close(&key) {
                    flushes.push(flush);
                }
            }
        }

        flushes
    }

    pub fn has_session(&self, meeting_id: &str, joiner: &str) -> bool {
        self.sessions
            .contains_key(&(meeting_id.to_string(), joiner.to_string()))
    }

    /// Deletes the session and builds its flush. The removal is what makes
    /// a second flush for the same session impossible.
    fn close(&mut self, key: &SessionKey) -> Option<Flush> {
        let session = self.sessions.remove(key)?;
        Some(Flush {
            joiner_connection: session.joiner_connection,
            payload: AggregatedAnswers {
                meeting_id: key.0.clone(),
                answers: session.answers,
                candidates: session.candidates,
            },
        })
    }
}

impl Default for AnswerAggregator {
    fn default() -> Self {
        Self::new()
    }
}
