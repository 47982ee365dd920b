use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "chunk")] Chunk {
        content: String,
    },
    #[serde(rename = "complete")] Complete {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_chat_round_trips() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"chat","content":"hello"}"#).unwrap();
        let ClientMessage::Chat { content } = msg;
        assert_eq!(content, "hello");
    }

    #[test]
    fn server_messages_are_tagged() {
        let chunk = serde_json::to_string(&ServerMessage::Chunk { content: "hi".into() }).unwrap();
        assert_eq!(chunk, r#"{"type":"chunk","content":"hi"}"#);

        let done = serde_json::to_string(&ServerMessage::Complete {
            content: "hi there".into(),
            timestamp: 1,
        })
        .unwrap();
        assert!(done.starts_with(r#"{"type":"complete""#));

        let err = serde_json::to_string(&ServerMessage::Error { message: "boom".into() }).unwrap();
        assert_eq!(err, r#"{"type":"error","message":"boom"}"#);
    }
}
