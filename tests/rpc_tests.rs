//! Integration tests for the smart-protocol endpoints and process cleanup.

mod common;

use std::io;
use std::time::Duration;

use async_compression::tokio::write::GzipEncoder;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use common::{assert_status, body_bytes, TestServer};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceExt;

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .unwrap()
}

async fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(data).await.unwrap();
    encoder.shutdown().await.unwrap();
    encoder.into_inner()
}

fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

async fn wait_for_file(path: &std::path::Path) -> String {
    for _ in 0..250 {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if !contents.trim().is_empty() {
                return contents;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never appeared", path.display());
}

async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..250 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_info_refs_advertisement() {
    let server = TestServer::new().await;
    server.seed_repo("team/app.git");

    let response = server
        .request("GET", "/team/app.git/info/refs?service=git-upload-pack")
        .await;
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-git-upload-pack-advertisement"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
    assert_eq!(
        body_bytes(response).await,
        b"001e# service=git-upload-pack\n0000refs:git-upload-pack\n"
    );
}

#[tokio::test]
async fn test_info_refs_unknown_service_is_not_found() {
    let server = TestServer::new().await;
    server.seed_repo("team/app.git");

    for uri in [
        "/team/app.git/info/refs",
        "/team/app.git/info/refs?service=git-upload-archive",
        "/team/app.git/info/refs?service=",
    ] {
        let response = server.request("GET", uri).await;
        assert_status(&response, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_info_refs_service_is_percent_decoded() {
    let server = TestServer::new().await;
    server.seed_repo("team/app.git");

    let response = server
        .request("GET", "/team/app.git/info/refs?service=git%2Dupload-pack")
        .await;
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        body_bytes(response).await,
        b"001e# service=git-upload-pack\n0000refs:git-upload-pack\n"
    );
}

#[tokio::test]
async fn test_upload_pack_round_trip() {
    let server = TestServer::new().await;
    server.seed_repo("team/app.git");

    let response = server
        .send(post("/team/app.git/git-upload-pack", "0032want deadbeef\n0000"))
        .await;
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-git-upload-pack-result"
    );
    assert_eq!(
        body_bytes(response).await,
        b"result:git-upload-pack:0032want deadbeef\n0000"
    );
}

#[tokio::test]
async fn test_receive_pack_round_trip() {
    let server = TestServer::new().await;
    server.seed_repo("a/b/c.git");

    let response = server
        .send(post("/a/b/c.git/git-receive-pack", "push-data"))
        .await;
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-git-receive-pack-result"
    );
    assert_eq!(
        body_bytes(response).await,
        b"result:git-receive-pack:push-data"
    );
}

#[tokio::test]
async fn test_gzip_request_body_is_decoded() {
    let server = TestServer::new().await;
    server.seed_repo("team/app.git");

    let payload = b"0032want cafebabe\n00000009done\n".repeat(64);
    let request = Request::builder()
        .method("POST")
        .uri("/team/app.git/git-upload-pack")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(gzip(&payload).await))
        .unwrap();

    let response = server.send(request).await;
    assert_status(&response, StatusCode::OK);

    let mut expected = b"result:git-upload-pack:".to_vec();
    expected.extend_from_slice(&payload);
    assert_eq!(body_bytes(response).await, expected);
}

#[tokio::test]
async fn test_corrupt_gzip_body_is_server_error() {
    let server = TestServer::new().await;
    server.seed_repo("team/app.git");

    let request = Request::builder()
        .method("POST")
        .uri("/team/app.git/git-upload-pack")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from("definitely not gzip"))
        .unwrap();

    let response = server.send(request).await;
    assert_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, b"Internal Server Error");
}

#[tokio::test]
async fn test_stderr_is_merged_into_body() {
    let server = TestServer::new().await;
    let repo = server.seed_repo("team/app.git");
    std::fs::write(repo.join("noisy"), "").unwrap();

    let response = server
        .request("GET", "/team/app.git/info/refs?service=git-upload-pack")
        .await;
    assert_status(&response, StatusCode::OK);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.starts_with("001e# service=git-upload-pack\n0000"));
    assert!(body.contains("stderr:git-upload-pack\n"));
    assert!(body.contains("refs:git-upload-pack\n"));
}

#[tokio::test]
async fn test_multi_chunk_response_streams_completely() {
    let server = TestServer::new().await;
    server.seed_repo("team/app.git");

    // The body is written in full before output is read, so the echo has to
    // fit in the pipe buffers.
    let payload: Vec<u8> = (0..48 * 1024).map(|i| (i % 251) as u8).collect();
    let response = server
        .send(post("/team/app.git/git-upload-pack", payload.clone()))
        .await;
    assert_status(&response, StatusCode::OK);

    let body = body_bytes(response).await;
    let prefix = b"result:git-upload-pack:";
    assert_eq!(&body[..prefix.len()], prefix);
    assert_eq!(&body[prefix.len()..], &payload[..]);
}

#[tokio::test]
async fn test_dropped_response_kills_process_group() {
    let server = TestServer::new().await;
    let repo = server.seed_repo("team/app.git");
    std::fs::write(repo.join("hang"), "").unwrap();

    let response = server
        .send(post("/team/app.git/git-upload-pack", "0000"))
        .await;
    assert_status(&response, StatusCode::OK);

    let pid: i32 = wait_for_file(&repo.join("sleeper.pid"))
        .await
        .trim()
        .parse()
        .unwrap();
    assert!(process_alive(pid));

    drop(response);

    assert!(
        wait_until_gone(pid).await,
        "background process {pid} survived the request"
    );
}

#[tokio::test]
async fn test_completed_response_kills_process_group() {
    let server = TestServer::new().await;
    let repo = server.seed_repo("team/app.git");
    std::fs::write(repo.join("detach"), "").unwrap();

    let response = server
        .send(post("/team/app.git/git-upload-pack", "ok"))
        .await;
    assert_status(&response, StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"result:git-upload-pack:ok");

    let pid: i32 = wait_for_file(&repo.join("child.pid"))
        .await
        .trim()
        .parse()
        .unwrap();
    assert!(
        wait_until_gone(pid).await,
        "detached process {pid} outlived a successful request"
    );
}

#[tokio::test]
async fn test_pre_stream_failure_kills_process_group() {
    let server = TestServer::new().await;
    let repo = server.seed_repo("team/app.git");
    std::fs::write(repo.join("record-pid"), "").unwrap();

    // Feed the body by hand so it can fail after git is known to be running.
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(4);
    let request = Request::builder()
        .method("POST")
        .uri("/team/app.git/git-upload-pack")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap();
    let pending = tokio::spawn(server.router.clone().oneshot(request));

    tx.send(Ok(Bytes::from_static(b"0032want"))).await.unwrap();
    let pid: i32 = wait_for_file(&repo.join("git.pid"))
        .await
        .trim()
        .parse()
        .unwrap();
    assert!(process_alive(pid));

    tx.send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")))
        .await
        .unwrap();
    let response = pending.await.unwrap().unwrap();
    assert_status(&response, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(
        wait_until_gone(pid).await,
        "git process {pid} outlived the failed request"
    );
}
