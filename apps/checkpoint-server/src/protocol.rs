//! Wire formats for the two websocket channels.
//!
//! The terminal channel speaks the terminado framing: every message is a JSON
//! array whose first element names the frame. The mission channel carries
//! tagged JSON objects and is server to client only.

use mission_core::{MissionState, MissionSummary};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a non-empty array with a string tag")]
    Shape,
    #[error("`{frame}` frame is missing a valid {field}")]
    Field {
        frame: &'static str,
        field: &'static str,
    },
}

/// Frames accepted from terminal clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Stdin(String),
    SetSize { rows: u16, cols: u16 },
    /// Well-formed frame with a tag this server does not act on.
    Unknown(String),
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let items = value.as_array().ok_or(ProtocolError::Shape)?;
        let tag = items
            .first()
            .and_then(Value::as_str)
            .ok_or(ProtocolError::Shape)?;
        match tag {
            "stdin" => {
                let payload = items.get(1).and_then(Value::as_str).ok_or(ProtocolError::Field {
                    frame: "stdin",
                    field: "payload",
                })?;
                Ok(ClientFrame::Stdin(payload.to_string()))
            }
            "set_size" => {
                let rows = dimension(items.get(1)).ok_or(ProtocolError::Field {
                    frame: "set_size",
                    field: "rows",
                })?;
                let cols = dimension(items.get(2)).ok_or(ProtocolError::Field {
                    frame: "set_size",
                    field: "cols",
                })?;
                Ok(ClientFrame::SetSize { rows, cols })
            }
            other => Ok(ClientFrame::Unknown(other.to_string())),
        }
    }
}

fn dimension(value: Option<&Value>) -> Option<u16> {
    value
        .and_then(Value::as_u64)
        .and_then(|n| u16::try_from(n).ok())
        .filter(|n| *n > 0)
}

/// Frames sent to terminal clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Setup,
    Stdout(String),
    Disconnect,
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        let value = match self {
            ServerFrame::Setup => json!(["setup", {}]),
            ServerFrame::Stdout(text) => json!(["stdout", text]),
            ServerFrame::Disconnect => json!(["disconnect", 1]),
        };
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionMessage {
    Init {
        #[serde(rename = "currentMission")]
        current_mission: usize,
        missions: Vec<MissionSummary>,
    },
    MissionComplete {
        #[serde(rename = "currentMission")]
        current_mission: usize,
        missions: Vec<MissionSummary>,
    },
}

impl MissionMessage {
    pub fn init(state: MissionState, missions: Vec<MissionSummary>) -> Self {
        MissionMessage::Init {
            current_mission: state.current_index,
            missions,
        }
    }

    pub fn mission_complete(state: MissionState, missions: Vec<MissionSummary>) -> Self {
        MissionMessage::MissionComplete {
            current_mission: state.current_index,
            missions,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stdin_and_resize() {
        assert_eq!(
            ClientFrame::parse(r#"["stdin", "ls\r"]"#).unwrap(),
            ClientFrame::Stdin("ls\r".into())
        );
        assert_eq!(
            ClientFrame::parse(r#"["set_size", 40, 120, 800, 600]"#).unwrap(),
            ClientFrame::SetSize { rows: 40, cols: 120 }
        );
        assert_eq!(
            ClientFrame::parse(r#"["ping"]"#).unwrap(),
            ClientFrame::Unknown("ping".into())
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            ClientFrame::parse("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"stdin": "x"}"#),
            Err(ProtocolError::Shape)
        ));
        assert!(matches!(ClientFrame::parse("[]"), Err(ProtocolError::Shape)));
        assert!(matches!(
            ClientFrame::parse(r#"["stdin", 7]"#),
            Err(ProtocolError::Field { frame: "stdin", .. })
        ));
        assert!(matches!(
            ClientFrame::parse(r#"["set_size", 0, 80]"#),
            Err(ProtocolError::Field { field: "rows", .. })
        ));
    }

    #[test]
    fn server_frames_use_terminado_shape() {
        assert_eq!(ServerFrame::Setup.to_json(), r#"["setup",{}]"#);
        assert_eq!(
            ServerFrame::Stdout("a\"b".into()).to_json(),
            r#"["stdout","a\"b"]"#
        );
        assert_eq!(ServerFrame::Disconnect.to_json(), r#"["disconnect",1]"#);
    }

    #[test]
    fn mission_messages_carry_type_and_index() {
        let summary = MissionSummary {
            title: "Say go".into(),
            prompt: "Type go".into(),
            description: String::new(),
        };
        let state = MissionState {
            current_index: 1,
            total: 1,
        };
        let raw = MissionMessage::mission_complete(state, vec![summary])
            .to_json()
            .unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "mission_complete");
        assert_eq!(value["currentMission"], 1);
        assert_eq!(value["missions"][0]["title"], "Say go");
        assert!(value["missions"][0].get("listener").is_none());

        let init = MissionMessage::init(
            MissionState {
                current_index: 0,
                total: 0,
            },
            Vec::new(),
        );
        let value: Value = serde_json::from_str(&init.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(value["missions"], json!([]));
    }
}
