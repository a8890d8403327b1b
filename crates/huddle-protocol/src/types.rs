use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// SDP payload exchanged during connection setup.
///
/// The relay never parses the SDP body; it is an opaque string owned by the
/// browser peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescription {
    pub sdp: String,
    pub sdp_type: SdpType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Opaque ICE candidate. Appended to a per-user sequence, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

/// Full meeting state handed to a newly joined peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSnapshot {
    pub participants: Vec<String>,
    pub ice_candidates: HashMap<String, Vec<IceCandidate>>,
    pub sdps: HashMap<String, SessionDescription>,
}

/// Result of an answer-aggregation flush: everything collected from the
/// expected peers within the window, delivered to the joiner in one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAnswers {
    pub meeting_id: String,
    pub answers: HashMap<String, SessionDescription>,
    pub candidates: HashMap<String, Vec<IceCandidate>>,
}
