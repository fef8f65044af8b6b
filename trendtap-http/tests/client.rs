use serde_json::{Value, json};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use trendtap_http::{Auth, HttpClient, HttpError, RequestOpts};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_json_sends_bearer_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(query_param("q", "rust"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let got: Value = client
        .get_json(
            "v1/items",
            RequestOpts {
                auth: Some(Auth::Bearer(" tok ")),
                query: Some(vec![("q", "rust".into())]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(got["ok"], true);
}

#[tokio::test]
async fn too_many_requests_is_not_retried() {
    let server = MockServer::start().await;
    let reset_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 60;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-rate-limit-reset", reset_at.to_string().as_str())
                .set_body_json(json!({"title": "Too Many Requests", "detail": "Too Many Requests"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap().with_retries(3);
    let err = client
        .get_json::<Value>("limited", RequestOpts::default())
        .await
        .unwrap_err();
    match err {
        HttpError::RateLimited {
            reset_in, message, ..
        } => {
            let secs = reset_in.expect("reset header parsed").as_secs();
            assert!((58..=60).contains(&secs), "got {secs}");
            assert_eq!(message, "Too Many Requests");
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_retried_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"n": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap().with_retries(1);
    let got: Value = client
        .get_json("flaky", RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(got["n"], 2);
}

#[tokio::test]
async fn client_errors_surface_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("x-request-id", "abc-123")
                .set_body_json(json!({"errors": [{"message": "Unauthorized"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .get_json::<Value>("secure", RequestOpts::default())
        .await
        .unwrap_err();
    match err {
        HttpError::Api {
            status,
            message,
            request_id,
        } => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(message, "Unauthorized");
            assert_eq!(request_id, "abc-123");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn post_form_uses_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("authorization", "Basic a2V5OnNlY3JldA=="))
        .and(body_string("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "bearer",
            "access_token": "AAAA"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_secs(2));
    let got: Value = client
        .post_form(
            "oauth2/token",
            &[("grant_type", "client_credentials")],
            RequestOpts {
                auth: Some(Auth::Basic {
                    username: "key",
                    password: "secret",
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(got["access_token"], "AAAA");
}
