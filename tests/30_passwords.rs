mod common;

use anyhow::Result;
use reqwest::{Method, StatusCode};
use serde_json::json;

use common::{question, TestServer};

#[tokio::test]
async fn passwords_are_scoped_to_their_creator() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (alice, alice_id) = server.sign_up("alice", "pw-a").await?;
    let (bob, _) = server.sign_up("bob", "pw-b").await?;

    let (status, _) = server.get("/api/passwords", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, created) = server.post("/api/passwords", json!({"name": "bank"}), Some(&alice)).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["created_by_id"], alice_id);

    let (_, own) = server.get("/api/passwords", Some(&alice)).await?;
    assert_eq!(own.as_array().map(Vec::len), Some(1));
    let (_, foreign) = server.get("/api/passwords", Some(&bob)).await?;
    assert_eq!(foreign, json!([]));
    Ok(())
}

#[tokio::test]
async fn foreign_password_is_forbidden() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (alice, _) = server.sign_up("alice", "pw-a").await?;
    let (bob, _) = server.sign_up("bob", "pw-b").await?;
    let (_, created) = server.post("/api/passwords", json!({"name": "bank"}), Some(&alice)).await?;
    let path = format!("/api/passwords/{}", created["id"]);

    let (status, body) = server.get(&path, Some(&bob)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body[0]["code"], 9);
    assert_eq!(body[0]["context"], "unauthorized");

    let (status, _) = server.send(Method::DELETE, &path, None, Some(&bob)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.get(&path, Some(&alice)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "bank");

    let (status, _) = server.get("/api/passwords/999", Some(&alice)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn owner_updates_their_password() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (alice, _) = server.sign_up("alice", "pw-a").await?;
    let (_, created) = server.post("/api/passwords", json!({"name": "bank"}), Some(&alice)).await?;
    let path = format!("/api/passwords/{}", created["id"]);

    let (status, body) = server
        .send(Method::PUT, &path, Some(json!({"name": "mail"})), Some(&alice))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["name"], "mail");

    let (status, body) = server
        .send(Method::PUT, &path, Some(json!({"name": null})), Some(&alice))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body[0]["code"], 15);
    Ok(())
}

#[tokio::test]
async fn questions_attach_to_an_owned_password() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (alice, _) = server.sign_up("alice", "pw-a").await?;
    let (bob, _) = server.sign_up("bob", "pw-b").await?;
    let (_, password) = server.post("/api/passwords", json!({"name": "bank"}), Some(&alice)).await?;
    let (_, pet) = server.post("/api/questions", question("Pet"), None).await?;
    let path = format!("/api/passwords/{}/questions", password["id"]);

    let (status, body) = server
        .post(&path, json!({"question_id": pet["id"]}), Some(&alice))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["password_id"], password["id"]);

    let (status, body) = server
        .post(&path, json!({"question": question("Car")}), Some(&alice))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert!(body["question_id"].is_i64());

    let (status, listed) = server.get(&path, Some(&alice)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(2));

    let (status, _) = server.get(&path, Some(&bob)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn owner_generates_a_password_from_answers() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (alice, _) = server.sign_up("alice", "pw-a").await?;
    let (bob, _) = server.sign_up("bob", "pw-b").await?;
    let (_, password) = server.post("/api/passwords", json!({"name": "bank"}), Some(&alice)).await?;
    let (_, pet) = server.post("/api/questions", question("Pet"), None).await?;
    let questions = format!("/api/passwords/{}/questions", password["id"]);
    server.post(&questions, json!({"question_id": pet["id"]}), Some(&alice)).await?;

    let path = format!("/api/passwords/{}/generate", password["id"]);
    let answers = json!({"answers": [{"question_id": pet["id"], "answer": "Rex"}]});
    let (status, first) = server.post(&path, answers.clone(), Some(&alice)).await?;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["password"].as_str().map(str::len), Some(20));

    let (_, second) = server.post(&path, answers.clone(), Some(&alice)).await?;
    assert_eq!(first, second);

    let (status, _) = server.post(&path, answers, Some(&bob)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
