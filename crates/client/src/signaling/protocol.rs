//! JSON-RPC 2.0 frames and room protocol payloads

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client requests
pub mod methods {
    pub const JOIN_ROOM: &str = "joinRoom";
    pub const PUBLISH_VIDEO: &str = "publishVideo";
    pub const UNPUBLISH_VIDEO: &str = "unpublishVideo";
    pub const RECEIVE_VIDEO_FROM: &str = "receiveVideoFrom";
    pub const UNSUBSCRIBE_FROM_VIDEO: &str = "unsubscribeFromVideo";
    pub const LEAVE_ROOM: &str = "leaveRoom";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const ON_ICE_CANDIDATE: &str = "onIceCandidate";
    /// Reserved heartbeat method
    pub const PING: &str = "ping";
}

/// Server notifications
pub mod notifications {
    pub const PARTICIPANT_JOINED: &str = "participantJoined";
    pub const PARTICIPANT_PUBLISHED: &str = "participantPublished";
    pub const PARTICIPANT_UNPUBLISHED: &str = "participantUnpublished";
    pub const PARTICIPANT_LEFT: &str = "participantLeft";
    pub const PARTICIPANT_EVICTED: &str = "participantEvicted";
    pub const RECORDING_STARTED: &str = "recordingStarted";
    pub const RECORDING_STOPPED: &str = "recordingStopped";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const ICE_CANDIDATE: &str = "iceCandidate";
    pub const MEDIA_ERROR: &str = "mediaError";

    /// Every notification the session registers a handler for
    pub const ALL: [&str; 10] = [
        PARTICIPANT_JOINED,
        PARTICIPANT_PUBLISHED,
        PARTICIPANT_UNPUBLISHED,
        PARTICIPANT_LEFT,
        PARTICIPANT_EVICTED,
        RECORDING_STARTED,
        RECORDING_STOPPED,
        SEND_MESSAGE,
        ICE_CANDIDATE,
        MEDIA_ERROR,
    ];
}

/// Outbound JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A frame received from the server, classified
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingFrame {
    /// Answer to one of our requests
    Response {
        id: u64,
        outcome: std::result::Result<Value, JsonRpcErrorObject>,
    },
    /// Unsolicited server push
    Notification { method: String, params: Value },
}

impl IncomingFrame {
    /// Classify a text frame.
    ///
    /// Anything carrying a `method` is a notification; anything else must be a
    /// response with a numeric id and exactly one of `result`/`error`.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("Invalid JSON frame: {}", e)))?;

        let obj = value
            .as_object()
            .ok_or_else(|| Error::Protocol("Frame is not a JSON object".to_string()))?;

        if let Some(method) = obj.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| Error::Protocol("Notification method is not a string".to_string()))?;
            let params = obj.get("params").cloned().unwrap_or(Value::Null);
            return Ok(IncomingFrame::Notification {
                method: method.to_string(),
                params,
            });
        }

        let id = obj
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Protocol(format!("Response without numeric id: {}", text)))?;

        match (obj.get("result"), obj.get("error")) {
            (_, Some(error)) if !error.is_null() => {
                let error: JsonRpcErrorObject = serde_json::from_value(error.clone())
                    .map_err(|e| Error::Protocol(format!("Malformed error object: {}", e)))?;
                Ok(IncomingFrame::Response {
                    id,
                    outcome: Err(error),
                })
            }
            (Some(result), _) => Ok(IncomingFrame::Response {
                id,
                outcome: Ok(result.clone()),
            }),
            _ => Err(Error::Protocol(format!(
                "Response {} has neither result nor error",
                id
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// `joinRoom` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomParams {
    pub token: String,
    pub session: String,
    pub metadata: String,
    pub secret: String,
    pub recorder: bool,
    pub platform: String,
}

/// `joinRoom` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomResult {
    /// Local connection id
    pub id: String,
    #[serde(default)]
    pub metadata: Option<String>,
    /// Participants already in the room
    #[serde(default)]
    pub value: Vec<ParticipantInfo>,
}

/// One participant in a join snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

/// Published stream description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub id: String,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default = "default_true")]
    pub audio_active: bool,
    #[serde(default = "default_true")]
    pub video_active: bool,
    #[serde(default)]
    pub type_of_video: Option<String>,
    #[serde(default)]
    pub frame_rate: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl StreamInfo {
    pub fn is_screen_share(&self) -> bool {
        self.type_of_video.as_deref() == Some("SCREEN")
    }
}

/// `publishVideo` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishVideoParams {
    pub sdp_offer: String,
    pub do_loopback: bool,
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_active: bool,
    pub video_active: bool,
    pub type_of_video: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
}

/// `publishVideo` result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishVideoResult {
    /// Stream id assigned by the server
    pub id: String,
    pub sdp_answer: String,
}

/// `receiveVideoFrom` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveVideoParams {
    pub sender: String,
    pub sdp_offer: String,
}

/// `receiveVideoFrom` result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveVideoResult {
    pub sdp_answer: String,
}

/// ICE candidate as exchanged in `onIceCandidate` / `iceCandidate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

/// `onIceCandidate` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnIceCandidateParams {
    pub endpoint_name: String,
    #[serde(flatten)]
    pub candidate: IceCandidate,
}

/// Payload carried as a string inside `sendMessage` requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub to: Vec<String>,
    pub data: String,
    #[serde(rename = "type")]
    pub signal_type: String,
}

// ---------------------------------------------------------------------------
// Notification payloads
// ---------------------------------------------------------------------------

/// `participantJoined` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantJoinedParams {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<String>,
}

/// `participantPublished` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantPublishedParams {
    pub id: String,
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

/// `participantUnpublished` / `participantLeft` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantGoneParams {
    /// Connection id
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `participantEvicted` params
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantEvictedParams {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `recordingStarted` / `recordingStopped` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingParams {
    pub id: String,
}

/// `sendMessage` notification params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessageParams {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(rename = "type", default)]
    pub signal_type: String,
    #[serde(default)]
    pub data: String,
}

/// `iceCandidate` notification params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateNotification {
    #[serde(default)]
    pub sender_connection_id: Option<String>,
    pub endpoint_name: String,
    #[serde(flatten)]
    pub candidate: IceCandidate,
}

/// `mediaError` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaErrorParams {
    pub error: String,
}

/// Typed server notification
#[derive(Debug, Clone)]
pub enum ServerNotification {
    ParticipantJoined(ParticipantJoinedParams),
    ParticipantPublished(ParticipantPublishedParams),
    ParticipantUnpublished(ParticipantGoneParams),
    ParticipantLeft(ParticipantGoneParams),
    ParticipantEvicted(ParticipantEvictedParams),
    RecordingStarted(RecordingParams),
    RecordingStopped(RecordingParams),
    NewMessage(NewMessageParams),
    IceCandidate(IceCandidateNotification),
    MediaError(MediaErrorParams),
}

impl ServerNotification {
    /// Decode the params of a known notification method
    pub fn from_method(method: &str, params: Value) -> Result<Self> {
        fn decode<T: serde::de::DeserializeOwned>(method: &str, params: Value) -> Result<T> {
            serde_json::from_value(params)
                .map_err(|e| Error::Protocol(format!("Invalid {} params: {}", method, e)))
        }

        use notifications as n;
        let notification = match method {
            n::PARTICIPANT_JOINED => Self::ParticipantJoined(decode(method, params)?),
            n::PARTICIPANT_PUBLISHED => Self::ParticipantPublished(decode(method, params)?),
            n::PARTICIPANT_UNPUBLISHED => Self::ParticipantUnpublished(decode(method, params)?),
            n::PARTICIPANT_LEFT => Self::ParticipantLeft(decode(method, params)?),
            n::PARTICIPANT_EVICTED => {
                // Some servers push an empty or null params object
                if params.is_null() {
                    Self::ParticipantEvicted(ParticipantEvictedParams::default())
                } else {
                    Self::ParticipantEvicted(decode(method, params)?)
                }
            }
            n::RECORDING_STARTED => Self::RecordingStarted(decode(method, params)?),
            n::RECORDING_STOPPED => Self::RecordingStopped(decode(method, params)?),
            n::SEND_MESSAGE => Self::NewMessage(decode(method, params)?),
            n::ICE_CANDIDATE => Self::IceCandidate(decode(method, params)?),
            n::MEDIA_ERROR => Self::MediaError(decode(method, params)?),
            other => return Err(Error::Protocol(format!("Unknown notification: {}", other))),
        };
        Ok(notification)
    }

    /// Wire method name
    pub fn method(&self) -> &'static str {
        use notifications as n;
        match self {
            Self::ParticipantJoined(_) => n::PARTICIPANT_JOINED,
            Self::ParticipantPublished(_) => n::PARTICIPANT_PUBLISHED,
            Self::ParticipantUnpublished(_) => n::PARTICIPANT_UNPUBLISHED,
            Self::ParticipantLeft(_) => n::PARTICIPANT_LEFT,
            Self::ParticipantEvicted(_) => n::PARTICIPANT_EVICTED,
            Self::RecordingStarted(_) => n::RECORDING_STARTED,
            Self::RecordingStopped(_) => n::RECORDING_STOPPED,
            Self::NewMessage(_) => n::SEND_MESSAGE,
            Self::IceCandidate(_) => n::ICE_CANDIDATE,
            Self::MediaError(_) => n::MEDIA_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(3, methods::PING, json!({"interval": 5000}));
        let value: Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 3, "method": "ping", "params": {"interval": 5000}})
        );
    }

    #[test]
    fn test_parse_result_response() {
        let frame = IncomingFrame::parse(r#"{"jsonrpc":"2.0","id":4,"result":{"value":"pong"}}"#).unwrap();
        assert_eq!(
            frame,
            IncomingFrame::Response {
                id: 4,
                outcome: Ok(json!({"value": "pong"}))
            }
        );
    }

    #[test]
    fn test_parse_error_response() {
        let frame = IncomingFrame::parse(
            r#"{"jsonrpc":"2.0","id":9,"error":{"code":401,"message":"Token not valid"}}"#,
        )
        .unwrap();
        match frame {
            IncomingFrame::Response { id, outcome: Err(e) } => {
                assert_eq!(id, 9);
                assert_eq!(e.code, 401);
            }
            other => panic!("Expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_notification() {
        let frame = IncomingFrame::parse(
            r#"{"jsonrpc":"2.0","method":"participantLeft","params":{"name":"con_1","reason":"disconnect"}}"#,
        )
        .unwrap();
        assert!(matches!(frame, IncomingFrame::Notification { ref method, .. } if method == "participantLeft"));
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(IncomingFrame::parse("not json").is_err());
        assert!(IncomingFrame::parse("[1,2]").is_err());
        assert!(IncomingFrame::parse(r#"{"id":"abc","result":{}}"#).is_err());
        assert!(IncomingFrame::parse(r#"{"id":5}"#).is_err());
    }

    #[test]
    fn test_published_notification_decoding() {
        let n = ServerNotification::from_method(
            notifications::PARTICIPANT_PUBLISHED,
            json!({
                "id": "con_2",
                "streams": [{"id": "str_CAM_x", "hasAudio": true, "hasVideo": true, "typeOfVideo": "CAMERA"}]
            }),
        )
        .unwrap();
        match n {
            ServerNotification::ParticipantPublished(p) => {
                assert_eq!(p.streams.len(), 1);
                assert!(p.streams[0].audio_active);
                assert!(!p.streams[0].is_screen_share());
            }
            other => panic!("Unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_evicted_with_null_params() {
        let n = ServerNotification::from_method(notifications::PARTICIPANT_EVICTED, Value::Null).unwrap();
        assert!(matches!(n, ServerNotification::ParticipantEvicted(ref p) if p.connection_id.is_none()));
    }

    #[test]
    fn test_ice_candidate_flattening() {
        let params = OnIceCandidateParams {
            endpoint_name: "con_1".to_string(),
            candidate: IceCandidate {
                candidate: "candidate:1 1 UDP 2122252543 10.0.0.2 50000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            },
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["endpointName"], "con_1");
        assert_eq!(value["sdpMLineIndex"], 0);
        assert_eq!(value["sdpMid"], "0");
    }
}
