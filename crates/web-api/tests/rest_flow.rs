mod support;

use serde_json::json;

#[tokio::test]
async fn send_requires_authentication() {
    let addr = support::spawn_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let missing = client
        .post(format!("{}/api/chat/send", base))
        .json(&json!({"content": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 401);

    let garbage = client
        .post(format!("{}/api/chat/send", base))
        .header("authorization", "Bearer garbage")
        .json(&json!({"content": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), 401);
}

#[tokio::test]
async fn send_trims_and_persists_with_identity_snapshot() {
    let addr = support::spawn_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);
    let token = support::token("u1", "Ada");

    let response = client
        .post(format!("{}/api/chat/send", base))
        .header("authorization", format!("Bearer {}", token))
        .json(&json!({"room": "global", "content": "  hello  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let message: serde_json::Value = response.json().await.unwrap();
    assert_eq!(message["content"], "hello");
    assert_eq!(message["userId"], "u1");
    assert_eq!(message["userName"], "Ada");
    assert!(message.get("createdAt").is_some());

    // 空正文且无附件：显式 400
    let empty = client
        .post(format!("{}/api/chat/send", base))
        .header("authorization", format!("Bearer {}", token))
        .json(&json!({"content": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
    let body: serde_json::Value = empty.json().await.unwrap();
    assert_eq!(body["code"], "EMPTY_MESSAGE");
}

#[tokio::test]
async fn attachment_only_messages_are_accepted() {
    let addr = support::spawn_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);
    let token = support::token("u1", "Ada");

    let response = client
        .post(format!("{}/api/chat/send", base))
        .header("authorization", format!("Bearer {}", token))
        .json(&json!({
            "room": "global",
            "attachment": {
                "url": "/uploads/report.pdf",
                "name": "report.pdf",
                "size": 2048,
                "mimeType": "application/pdf"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let message: serde_json::Value = response.json().await.unwrap();
    assert_eq!(message["content"], "");
    assert_eq!(message["attachment"]["name"], "report.pdf");
}

#[tokio::test]
async fn history_returns_the_recent_tail_oldest_first() {
    let addr = support::spawn_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);
    let token = support::token("u1", "Ada");

    for i in 0..5 {
        let response = client
            .post(format!("{}/api/chat/send", base))
            .header("authorization", format!("Bearer {}", token))
            .json(&json!({"content": format!("m{}", i)}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    let history: serde_json::Value = client
        .get(format!("{}/api/chat/messages?room=global&limit=2", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["content"], "m3");
    assert_eq!(history[1]["content"], "m4");
}

#[tokio::test]
async fn sixth_rapid_send_is_throttled() {
    let addr = support::spawn_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);
    let token = support::token("u1", "Ada");

    let mut statuses = Vec::new();
    for i in 0..6 {
        let response = client
            .post(format!("{}/api/chat/send", base))
            .header("authorization", format!("Bearer {}", token))
            .json(&json!({"content": format!("burst {}", i)}))
            .send()
            .await
            .unwrap();
        statuses.push(response.status().as_u16());
    }
    assert_eq!(statuses.iter().filter(|s| **s == 201).count(), 5);
    assert_eq!(statuses.iter().filter(|s| **s == 429).count(), 1);
}

#[tokio::test]
async fn unread_count_follows_the_read_marker() {
    let addr = support::spawn_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);
    let bob = support::token("u2", "Bob");
    let alice = support::token("u1", "Alice");

    for content in ["one", "two"] {
        client
            .post(format!("{}/api/chat/send", base))
            .header("authorization", format!("Bearer {}", bob))
            .json(&json!({"content": content}))
            .send()
            .await
            .unwrap();
    }
    // 自己的消息不计入自己的未读
    client
        .post(format!("{}/api/chat/send", base))
        .header("authorization", format!("Bearer {}", alice))
        .json(&json!({"content": "mine"}))
        .send()
        .await
        .unwrap();

    let unread: serde_json::Value = client
        .get(format!("{}/api/chat/unread?room=global", base))
        .header("authorization", format!("Bearer {}", alice))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unread["unread"], 2);

    let marked: serde_json::Value = client
        .post(format!("{}/api/chat/read", base))
        .header("authorization", format!("Bearer {}", alice))
        .json(&json!({"room": "global"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first_mark = marked["lastReadAt"].as_str().unwrap().to_owned();

    let unread: serde_json::Value = client
        .get(format!("{}/api/chat/unread?room=global", base))
        .header("authorization", format!("Bearer {}", alice))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unread["unread"], 0);
    assert_eq!(unread["lastReadAt"].as_str().unwrap(), first_mark);

    // 再次 mark 只会向前推进
    let marked_again: serde_json::Value = client
        .post(format!("{}/api/chat/read", base))
        .header("authorization", format!("Bearer {}", alice))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first = chrono::DateTime::parse_from_rfc3339(&first_mark).unwrap();
    let second =
        chrono::DateTime::parse_from_rfc3339(marked_again["lastReadAt"].as_str().unwrap()).unwrap();
    assert!(second >= first);

    let unauthenticated = client
        .get(format!("{}/api/chat/unread", base))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), 401);
}
