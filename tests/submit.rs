//! Submit and status round trips against a mock video vendor.

use std::time::Duration;

use ai_video_ads::api::video::VideoClient;
use ai_video_ads::imaging::EncodedImage;
use ai_video_ads::job::JobStatus;
use ai_video_ads::poller::{PollOutcome, PollPolicy, StatusPoller, StatusSource};
use ai_video_ads::submitter::{AspectRatio, JobSubmitter, Quality, SubmitRequest};
use ai_video_ads::JobError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBMIT: &str = "/v1/video/sora-video";
const STATUS: &str = "/v1/draw/result";

fn client(server: &MockServer) -> VideoClient {
    VideoClient::new(
        reqwest::Client::new(),
        "sk-test",
        &server.uri(),
        SUBMIT,
        STATUS,
        Duration::from_secs(5),
    )
}

fn request(image: Option<EncodedImage>) -> SubmitRequest {
    SubmitRequest {
        prompt: "Commercial product video for Mug. Language: English.".to_string(),
        model: "sora-2".to_string(),
        aspect_ratio: AspectRatio::Portrait,
        duration_secs: 10,
        quality: Quality::Standard,
        image,
    }
}

async fn submit_with_body(body: ResponseTemplate) -> Result<String, JobError> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SUBMIT))
        .respond_with(body)
        .mount(&server)
        .await;
    JobSubmitter::new(client(&server))
        .submit(&request(None))
        .await
        .map(|job| job.job_id)
}

#[tokio::test]
async fn test_all_reply_shapes_yield_same_id() {
    let flat = ResponseTemplate::new(200).set_body_json(json!({"id": "task-77", "status": "queued"}));
    let nested = ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": {"id": "task-77"}}));
    let streamed = ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string("data: {\"status\":\"accepted\"}\n\ndata: {\"id\":\"task-77\",\"progress\":0}\n\ndata: {\"progress\":5}\n\n");

    assert_eq!(submit_with_body(flat).await.unwrap(), "task-77");
    assert_eq!(submit_with_body(nested).await.unwrap(), "task-77");
    assert_eq!(submit_with_body(streamed).await.unwrap(), "task-77");
}

#[tokio::test]
async fn test_missing_id_is_protocol_error_with_raw_body() {
    let reply = ResponseTemplate::new(400).set_body_string(r#"{"error":"insufficient credits"}"#);
    let err = submit_with_body(reply).await.unwrap_err();
    match err {
        JobError::Protocol { raw, .. } => assert!(raw.contains("insufficient credits")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_submit_never_yields_request_id() {
    let body = r#"{"error":{"message":"insufficient credits","id":"req_9f"}}"#;

    let err = submit_with_body(ResponseTemplate::new(402).set_body_string(body))
        .await
        .unwrap_err();
    match err {
        JobError::Protocol { message, raw } => {
            assert!(message.contains("402"), "{message}");
            assert_eq!(raw, body);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = submit_with_body(ResponseTemplate::new(200).set_body_string(body))
        .await
        .unwrap_err();
    assert_eq!(err.raw_body(), Some(body));
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let server = MockServer::builder().start().await;
    let video = client(&server);
    drop(server);

    let err = JobSubmitter::new(video).submit(&request(None)).await.unwrap_err();
    assert!(matches!(err, JobError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_payload_sent_with_auth_and_verbatim_image() {
    let server = MockServer::start().await;
    let image = EncodedImage::from_jpeg(&(0u8..=255).collect::<Vec<_>>());
    Mock::given(method("POST"))
        .and(path(SUBMIT))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "sora-2",
            "aspect_ratio": "9:16",
            "duration": 10,
            "size": "small",
            "expand_prompt": true,
            "image": image.as_str(),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "img-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let job = JobSubmitter::new(client(&server))
        .submit(&request(Some(image)))
        .await
        .unwrap();
    assert_eq!(job.job_id, "img-1");
    assert_eq!(job.status, JobStatus::Submitted);
}

#[tokio::test]
async fn test_status_request_carries_job_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STATUS))
        .and(body_partial_json(json!({"id": "task-5"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"status": "running"}})))
        .mount(&server)
        .await;

    let value = client(&server).fetch_status("task-5").await.unwrap();
    assert_eq!(value["data"]["status"], "running");
}

#[tokio::test]
async fn test_poll_over_http_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"status": "running"}})))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"status": "SUCCESS", "results": [{"url": "https://cdn.example/final.mp4"}]}
        })))
        .mount(&server)
        .await;

    let policy = PollPolicy {
        interval: Duration::from_millis(5),
        max_attempts: 20,
        max_consecutive_errors: 2,
    };
    let poller = StatusPoller::new(client(&server), policy);
    let mut job = ai_video_ads::job::Job::new("task-9", "prompt");

    let outcome = poller.poll(&mut job, |_| {}).await.unwrap();

    assert_eq!(
        outcome,
        PollOutcome::Succeeded {
            artifact_url: "https://cdn.example/final.mp4".into()
        }
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}
