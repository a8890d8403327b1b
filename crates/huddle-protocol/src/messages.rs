use serde::{Deserialize, Serialize};

use crate::types::{AggregatedAnswers, IceCandidate, MeetingSnapshot, SessionDescription};

/// Messages sent from client to server via WebSocket.
///
/// Wire form is an envelope `{"type": ..., "data": {...}}`; unit messages
/// omit `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind a user identity to this connection (latest-wins per user)
    #[serde(rename_all = "camelCase")]
    Register { user_id: String },

    /// Join a meeting; requires a prior register
    #[serde(rename_all = "camelCase")]
    Join { meeting_id: String },

    /// SDP offer; direct when a target is named, otherwise fanned out to the
    /// bound meeting and answered through aggregation
    #[serde(rename_all = "camelCase")]
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meeting_id: Option<String>,
        sdp: SessionDescription,
    },

    /// SDP answer; direct when a target is named, otherwise recorded into the
    /// open aggregation session for the bound meeting
    #[serde(rename_all = "camelCase")]
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meeting_id: Option<String>,
        sdp: SessionDescription,
        /// Candidates gathered alongside the answer, aggregated with it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidates: Option<Vec<IceCandidate>>,
    },

    /// ICE candidate; direct when a target is named, otherwise appended to
    /// the meeting's candidate map and re-synced to the other participants
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meeting_id: Option<String>,
        candidate: IceCandidate,
    },

    /// Leave the bound meeting
    Leave,

    /// Liveness check from the client
    Ping,

    /// Reply to a server liveness probe
    Pong,
}

/// Messages sent from server to client via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Registration confirmed
    #[serde(rename_all = "camelCase")]
    Registered { user_id: String },

    /// Join confirmed: current participants (excluding the joiner) and the
    /// full meeting state
    #[serde(rename_all = "camelCase")]
    Joined {
        meeting_id: String,
        participants: Vec<String>,
        meeting_state: MeetingSnapshot,
    },

    /// A peer joined the meeting
    #[serde(rename = "participant-joined", rename_all = "camelCase")]
    ParticipantJoined { user_id: String },

    /// A peer left the meeting (explicit leave or disconnect)
    #[serde(rename = "participant-left", rename_all = "camelCase")]
    ParticipantLeft { user_id: String },

    /// Forwarded SDP offer
    #[serde(rename_all = "camelCase")]
    Offer {
        from_user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meeting_id: Option<String>,
        sdp: SessionDescription,
    },

    /// Forwarded SDP answer
    #[serde(rename_all = "camelCase")]
    Answer {
        from_user_id: String,
        sdp: SessionDescription,
    },

    /// Forwarded ICE candidate
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        from_user_id: String,
        candidate: IceCandidate,
    },

    /// The meeting's aggregate candidate map after a meeting-path candidate
    #[serde(rename = "ice-sync", rename_all = "camelCase")]
    IceSync {
        meeting_id: String,
        candidates: std::collections::HashMap<String, Vec<IceCandidate>>,
    },

    /// Aggregation flush delivered to a joiner
    #[serde(rename = "aggregated-answers")]
    AggregatedAnswers(AggregatedAnswers),

    /// A directly targeted peer is not connected
    #[serde(rename = "target-unreachable", rename_all = "camelCase")]
    TargetUnreachable { target_user_id: String },

    /// Protocol or internal error; the connection stays open
    Error { message: String },

    /// Liveness probe from the server
    Ping,

    /// Reply to a client ping
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SdpType;

    #[test]
    fn envelope_uses_type_and_data() {
        let msg = ClientMessage::Register {
            user_id: "u1".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&msg).unwrap())
            .unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["data"]["userId"], "u1");
    }

    #[test]
    fn unit_messages_omit_data() {
        let json = serde_json::to_string(&ClientMessage::Leave).unwrap();
        assert_eq!(json, r#"{"type":"leave"}"#);

        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Ping));
    }

    #[test]
    fn kebab_case_server_variants() {
        let msg = ServerMessage::ParticipantJoined {
            user_id: "u2".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&msg).unwrap())
            .unwrap();
        assert_eq!(json["type"], "participant-joined");

        let msg = ServerMessage::TargetUnreachable {
            target_user_id: "u9".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&msg).unwrap())
            .unwrap();
        assert_eq!(json["type"], "target-unreachable");
        assert_eq!(json["data"]["targetUserId"], "u9");
    }

    #[test]
    fn offer_round_trips_with_optional_target() {
        let raw = r#"{"type":"offer","data":{"meetingId":"m1","sdp":{"sdp":"v=0","sdpType":"offer"}}}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        match parsed {
            ClientMessage::Offer {
                target_user_id,
                meeting_id,
                sdp,
            } => {
                assert!(target_user_id.is_none());
                assert_eq!(meeting_id.as_deref(), Some("m1"));
                assert_eq!(sdp.sdp_type, SdpType::Offer);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn candidate_field_names_match_the_browser_api() {
        let cand = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.0.2.1 54400 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&cand).unwrap())
            .unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let err = serde_json::from_str::<ClientMessage>(r#"{"type":"shout","data":{}}"#);
        assert!(err.is_err());
    }
}
