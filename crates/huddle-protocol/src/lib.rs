mod messages;
mod types;

pub use messages::{ClientMessage, ServerMessage};
pub use types::{
    AggregatedAnswers, IceCandidate, MeetingSnapshot, SdpType, SessionDescription,
};
