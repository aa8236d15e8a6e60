use serde::Deserialize;

pub const WS_APP_PROTOCOL: &str = "docchat.v1";

/// Events a client can send over the session socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// Switch the active chat model by catalog label.
    SelectModel { model: String },
    /// Upload a document: file name plus base64-encoded bytes.
    Upload { name: String, data: String },
    /// Fetch a web page and index its text.
    UploadUrl { url: String },
    /// Ask a question about the current document.
    Chat { message: String },
    /// Clear the conversation transcript.
    Reset,
    /// Request the current transcript.
    History,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_events() {
        let event: WsIncoming =
            serde_json::from_str(r#"{"type": "select_model", "model": "Phi-3"}"#).unwrap();
        assert!(matches!(event, WsIncoming::SelectModel { model } if model == "Phi-3"));

        let event: WsIncoming = serde_json::from_str(r#"{"type": "reset"}"#).unwrap();
        assert!(matches!(event, WsIncoming::Reset));

        let event: WsIncoming =
            serde_json::from_str(r#"{"type": "upload", "name": "a.txt", "data": "aGV5"}"#).unwrap();
        assert!(matches!(event, WsIncoming::Upload { .. }));
    }

    #[test]
    fn unknown_event_types_fail_to_parse() {
        assert!(serde_json::from_str::<WsIncoming>(r#"{"type": "dance"}"#).is_err());
        assert!(serde_json::from_str::<WsIncoming>(r#"{"message": "no type"}"#).is_err());
    }
}
