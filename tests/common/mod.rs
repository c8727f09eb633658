#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const AUTHOR_HEX: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";
pub const AUTHOR_NPUB: &str = "npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg";

pub fn post(id: &str, title: &str, content: &str) -> Value {
    json!({
        "id": id,
        "pubkey": AUTHOR_HEX,
        "created_at": 1_700_000_000u64,
        "kind": 30023,
        "tags": [["d", id], ["title", title]],
        "content": content,
        "sig": ""
    })
}

pub fn profile(created_at: u64, content: Value) -> Value {
    json!({
        "id": format!("profile-{created_at}"),
        "pubkey": AUTHOR_HEX,
        "created_at": created_at,
        "kind": 0,
        "tags": [],
        "content": content.to_string(),
        "sig": ""
    })
}

/// Start a relay that answers every `REQ` with the stored records of the
/// requested kind followed by `EOSE`. Returns its `ws://` URL.
pub async fn fake_relay(records: Vec<Value>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let records = records.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    if frame[0] != "REQ" {
                        continue;
                    }
                    let sub = frame[1].clone();
                    let kind = frame[2]["kinds"][0].clone();
                    for record in records.iter().filter(|r| r["kind"] == kind) {
                        let out = json!(["EVENT", sub, record]).to_string();
                        if ws.send(Message::Text(out)).await.is_err() {
                            return;
                        }
                    }
                    let eose = json!(["EOSE", sub]).to_string();
                    if ws.send(Message::Text(eose)).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    format!("ws://{addr}")
}
