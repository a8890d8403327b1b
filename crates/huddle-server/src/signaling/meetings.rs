use huddle_protocol::{IceCandidate, MeetingSnapshot, SessionDescription};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct Meeting {
    participants: HashSet<String>,
    ice_candidates: HashMap<String, Vec<IceCandidate>>,
    sdps: HashMap<String, SessionDescription>,
}

/// Per-meeting participant sets and cached signaling metadata.
///
/// Meetings are created lazily on first join and discarded as soon as the
/// participant set empties. Unknown meeting ids are empty results, never
/// errors.
pub struct MeetingStore {
    meetings: HashMap<String, Meeting>,
}

impl MeetingStore {
    pub fn new() -> Self {
        Self {
            meetings: HashMap::new(),
        }
    }

    pub fn add_participant(&mut self, meeting_id: &str, user_id: &str) {
        self.meetings
            .entry(meeting_id.to_string())
            .or_default()
            .participants
            .insert(user_id.to_string());
    }

    /// Removes the participant along with their cached ICE and SDP entries.
    /// An emptied meeting is deleted entirely.
    pub fn remove_participant(&mut self, meeting_id: &str, user_id: &str) {
        let Some(meeting) = self.meetings.get_mut(meeting_id) else {
            return;
        };

        meeting.participants.remove(user_id);
        meeting.ice_candidates.remove(user_id);
        meeting.sdps.remove(user_id);

        if meeting.participants.is_empty() {
            self.meetings.remove(meeting_id);
            tracing::debug!("Meeting {} emptied and discarded", meeting_id);
        }
    }

    pub fn participants(&self, meeting_id: &str) -> Vec<String> {
        self.meetings
            .get(meeting_id)
            .map(|m| m.participants.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn participants_except(&self, meeting_id: &str, user_id: &str) -> Vec<String> {
        self.meetings
            .get(meeting_id)
            .map(|m| {
                m.participants
                    .iter()
                    .filter(|p| p.as_str() != user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Full state hand-off for a newly joined peer.
    pub fn snapshot(&self, meeting_id: &str) -> MeetingSnapshot {
        self.meetings
            .get(meeting_id)
            .map(|m| MeetingSnapshot {
                participants: m.participants.iter().cloned().collect(),
                ice_candidates: m.ice_candidates.clone(),
                sdps: m.sdps.clone(),
            })
            .unwrap_or_default()
    }

    /// Appends to the user's candidate sequence, creating it if absent.
    pub fn add_candidate(&mut self, meeting_id: &str, user_id: &str, candidate: IceCandidate) {
        self.meetings
            .entry(meeting_id.to_string())
            .or_default()
            .ice_candidates
            .entry(user_id.to_string())
            .or_default()
            .push(candidate);
    }

    pub fn candidates(&self, meeting_id: &str) -> HashMap<String, Vec<IceCandidate>> {
        self.meetings
            .get(meeting_id)
            .map(|m| m.ice_candidates.clone())
            .unwrap_or_default()
    }

    /// Last-write-wins per user.
    pub fn set_sdp(&mut self, meeting_id: &str, user_id: &str, sdp: SessionDescription) {
        self.meetings
            .entry(meeting_id.to_string())
            .or_default()
            .sdps
            .insert(user_id.to_string(), sdp);
    }

    pub fn contains(&self, meeting_id: &str) -> bool {
        self.meetings.contains_key(meeting_id)
    }
}

impl Default for MeetingStore {
    fn default() -> Self {
        Self::new()
    }
}
