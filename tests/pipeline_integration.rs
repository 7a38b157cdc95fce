//! Integration tests for the signed request pipeline against a mock API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{any, body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};
use xhs_core::client::{ApiError, ErrorKind};
use xhs_core::proxy::ProxyPool;

use xhs_core::sign::{ExclusiveOracle, HttpMethod, SignatureEnvelopeBuilder};

use support::{
    FakeOracle, start_mock_server_or_skip, test_pipeline, test_pipeline_with_signer, test_session,
    test_signer,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Address nothing listens on.
const DEAD_ADDRESS: &str = "http://127.0.0.1:9";

// ==================== Classification Tests ====================

#[tokio::test]
async fn test_success_returns_data_payload() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/api/sns/web/v1/feed"))
        .and(body_json(json!({"source_note_id": "n1"})))
        .and(header_exists("x-s"))
        .and(header_exists("x-t"))
        .and(header_exists("x-s-common"))
        .and(header_exists("x-b3-traceid"))
        .and(header("cookie", "a1=A1VALUE; web_session=old-session"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": {"items": [1, 2]}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let oracle = Arc::new(FakeOracle::new());
    let pipeline = test_pipeline(&server.uri(), oracle.clone(), test_session(), 3, TIMEOUT);

    let data = pipeline
        .post("/api/sns/web/v1/feed", &json!({"source_note_id": "n1"}))
        .await
        .unwrap();
    assert_eq!(data, json!({"items": [1, 2]}));
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_get_sends_the_signed_query_string() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/sns/web/v2/comment/page"))
        .and(query_param("note_id", "n1"))
        .and(query_param("cursor", ""))
        .and(query_param("image_formats", "jpg,webp,avif"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = test_pipeline(
        &server.uri(),
        Arc::new(FakeOracle::new()),
        test_session(),
        1,
        TIMEOUT,
    );
    pipeline
        .get(
            "/api/sns/web/v2/comment/page",
            &json!({"note_id": "n1", "cursor": "", "image_formats": "jpg,webp,avif"}),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_status_461_is_session_expired_regardless_of_body() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(ResponseTemplate::new(461).set_body_json(json!({"success": true, "data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let oracle = Arc::new(FakeOracle::new());
    let pipeline = test_pipeline(&server.uri(), oracle.clone(), test_session(), 3, TIMEOUT);

    let err = pipeline.get("/api/x", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionExpired);
    assert!(err.kind().needs_reauth());
    assert_eq!(oracle.calls(), 1, "session expiry is not retried");
}

#[tokio::test]
async fn test_status_471_is_captcha_with_header_fields_and_not_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(471)
                .insert_header("Verifytype", "124")
                .insert_header("Verifyuuid", "uuid-1"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let oracle = Arc::new(FakeOracle::new());
    let pipeline = test_pipeline(&server.uri(), oracle.clone(), test_session(), 3, TIMEOUT);

    let err = pipeline.post("/api/x", &json!({})).await.unwrap_err();
    match err {
        ApiError::CaptchaRequired {
            verify_type,
            verify_uuid,
        } => {
            assert_eq!(verify_type.as_deref(), Some("124"));
            assert_eq!(verify_uuid.as_deref(), Some("uuid-1"));
        }
        other => panic!("expected captcha, got {other:?}"),
    }
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_ip_blocked_code_is_rate_limited() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "code": 300012, "msg": "blocked"})),
        )
        .mount(&server)
        .await;

    let pipeline = test_pipeline(
        &server.uri(),
        Arc::new(FakeOracle::new()),
        test_session(),
        3,
        TIMEOUT,
    );
    let err = pipeline.get("/api/x", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let pipeline = test_pipeline(
        &server.uri(),
        Arc::new(FakeOracle::new()),
        test_session(),
        3,
        TIMEOUT,
    );
    let err = pipeline.get("/api/x", &json!({})).await.unwrap_err();
    assert!(matches!(err, ApiError::MalformedResponse { status: 200, .. }));
}

// ==================== Retry Tests ====================

#[tokio::test]
async fn test_timeout_is_retried_with_fresh_signature() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": "slow"}))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": "ok"})))
        .mount(&server)
        .await;

    let oracle = Arc::new(FakeOracle::new());
    let pipeline = test_pipeline(
        &server.uri(),
        oracle.clone(),
        test_session(),
        3,
        Duration::from_millis(300),
    );

    let data = pipeline.get("/api/x", &json!({})).await.unwrap();
    assert_eq!(data, json!("ok"));
    assert_eq!(oracle.calls(), 2, "each attempt signs again");
}

#[tokio::test]
async fn test_transport_failure_surfaces_after_max_attempts() {
    let oracle = Arc::new(FakeOracle::new());
    let pipeline = test_pipeline(DEAD_ADDRESS, oracle.clone(), test_session(), 3, TIMEOUT);

    let err = pipeline.get("/api/x", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(oracle.calls(), 3);
}

#[tokio::test]
async fn test_signing_failure_sends_nothing() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = test_pipeline(
        &server.uri(),
        Arc::new(FakeOracle::unreachable()),
        test_session(),
        3,
        TIMEOUT,
    );
    let err = pipeline.get("/api/x", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SigningUnavailable);
}

// ==================== Oracle Serialization Tests ====================

#[tokio::test]
async fn test_concurrent_requests_never_overlap_in_the_oracle() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let oracle = Arc::new(FakeOracle::new());
    let pipeline = Arc::new(test_pipeline(
        &server.uri(),
        oracle.clone(),
        test_session(),
        1,
        TIMEOUT,
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            pipeline.get("/api/x", &json!({"i": i})).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!(true));
    }
    assert_eq!(oracle.calls(), 8);
    assert!(!oracle.overlapped());
}

#[tokio::test]
async fn test_builders_sharing_one_oracle_never_overlap() {
    let oracle = Arc::new(FakeOracle::new());
    let exclusive = Arc::new(ExclusiveOracle::new(oracle.clone()));
    let builders = [
        SignatureEnvelopeBuilder::new(Arc::clone(&exclusive)),
        SignatureEnvelopeBuilder::new(Arc::clone(&exclusive)),
    ];

    let mut handles = Vec::new();
    for i in 0..8 {
        let builder = builders[i % 2].clone();
        handles.push(tokio::spawn(async move {
            builder
                .build(&format!("/api/x/{i}"), HttpMethod::Get, &json!({}), "A1VALUE")
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(oracle.calls(), 8);
    assert!(!oracle.overlapped());
}

#[tokio::test]
async fn test_pipelines_sharing_one_signer_never_overlap() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let oracle = Arc::new(FakeOracle::new());
    let signer = test_signer(oracle.clone());
    let pipelines = [
        Arc::new(test_pipeline_with_signer(
            &server.uri(),
            signer.clone(),
            test_session(),
            1,
            TIMEOUT,
        )),
        Arc::new(test_pipeline_with_signer(
            &server.uri(),
            signer,
            test_session(),
            1,
            TIMEOUT,
        )),
    ];

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = Arc::clone(&pipelines[i % 2]);
        handles.push(tokio::spawn(async move {
            pipeline.get("/api/x", &json!({"i": i})).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!(true));
    }
    assert_eq!(oracle.calls(), 8);
    assert!(!oracle.overlapped());
}

// ==================== Proxy Tests ====================

#[tokio::test]
async fn test_dead_proxy_is_marked_failed() {
    let oracle = Arc::new(FakeOracle::new());
    let pool = Arc::new(ProxyPool::new([DEAD_ADDRESS]));
    let pipeline = test_pipeline("http://api.invalid", oracle, test_session(), 1, TIMEOUT)
        .with_proxy_pool(Arc::clone(&pool));

    let err = pipeline.get("/api/x", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(pool.stats().failed, 1);
}

#[tokio::test]
async fn test_retry_moves_to_the_next_proxy() {
    let Some(proxy) = start_mock_server_or_skip().await else {
        return;
    };
    // The mock server acts as a forwarding proxy that answers itself.
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": 7})))
        .expect(1)
        .mount(&proxy)
        .await;

    let pool = Arc::new(ProxyPool::new([DEAD_ADDRESS.to_string(), proxy.uri()]));
    let oracle = Arc::new(FakeOracle::new());
    let pipeline = test_pipeline("http://api.invalid", oracle.clone(), test_session(), 2, TIMEOUT)
        .with_proxy_pool(Arc::clone(&pool));

    let data = pipeline.get("/api/x", &json!({})).await.unwrap();
    assert_eq!(data, json!(7));
    assert_eq!(oracle.calls(), 2);

    let stats = pool.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.available, 1);
}

// ==================== Cookie Rotation Tests ====================

#[tokio::test]
async fn test_set_cookie_rotates_live_session() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "web_session=new-session; Path=/; HttpOnly")
                .append_header("set-cookie", "websectiga=abc; Path=/")
                .set_body_json(json!({"success": true})),
        )
        .mount(&server)
        .await;

    let session = test_session();
    let pipeline = test_pipeline(
        &server.uri(),
        Arc::new(FakeOracle::new()),
        Arc::clone(&session),
        1,
        TIMEOUT,
    );
    pipeline.get("/api/x", &json!({})).await.unwrap();

    let credentials = session.snapshot();
    assert_eq!(credentials.web_session(), Some("new-session"));
    assert_eq!(credentials.get("websectiga"), Some("abc"));
    assert_eq!(credentials.a1(), "A1VALUE");
}
