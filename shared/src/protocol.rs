use serde::{Deserialize, Serialize};

/// Kind of a session description in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Session description exchanged with the viewer (`POST /offer` body and response)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// Error payload returned by every failing API call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Read-only view of a live session for the inspection API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: String,
    pub has_remote_offer: bool,
    pub has_local_answer: bool,
    #[serde(default)]
    pub track_id: Option<String>,
    /// RFC 3339 timestamp
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_wire_format() {
        let answer = SessionDescription::answer("v=0\r\n");
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["sdp"], "v=0\r\n");
    }

    #[test]
    fn test_offer_parses_from_browser_payload() {
        let offer: SessionDescription =
            serde_json::from_str(r#"{"sdp":"v=0...","type":"offer"}"#).unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert_eq!(offer.sdp, "v=0...");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed = serde_json::from_str::<SessionDescription>(r#"{"sdp":"v=0","type":"hello"}"#);
        assert!(parsed.is_err());
    }
}
