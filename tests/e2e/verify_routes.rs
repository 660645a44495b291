//! Upload and query flows through the HTTP surface.

use super::harness::PAYMENT_EMAIL;
use super::TestHarness;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

const NOT_VERIFIED_PROVER: &str = r#"
echo "Transaction ID: TX9"
echo "Paid to name: Dana"
echo "Extracted Amount: 3.50"
"#;

#[tokio::test]
async fn test_query_before_any_run_is_not_found() {
    let harness = TestHarness::setup();

    let (status, body) = harness.get("/get-verification-result").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No result found");
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_payment_email_is_verified_and_stored() {
    let harness = TestHarness::setup();

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(
        body,
        json!({
            "message": "DKIM Verification Result: Email is verified.",
            "transactionId": "TX123",
            "paidToName": "Alice",
            "amount": "10.00",
            "verified": true,
        })
    );

    let (status, stored) = harness.get("/get-verification-result").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        stored,
        json!({
            "transactionId": "TX123",
            "paidToName": "Alice",
            "amount": "10.00",
            "verified": true,
        })
    );

    assert!(
        harness.staged_files().is_empty(),
        "staging dir should be clean, found {:?}",
        harness.staged_files()
    );
}

#[tokio::test]
async fn test_missing_file_field_is_rejected() {
    let harness = TestHarness::setup();

    let (status, body) = harness
        .upload_field("attachment", "payment.eml", PAYMENT_EMAIL)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "missing_upload");
    assert_eq!(body["message"], "No file uploaded. Please upload a .eml file.");

    let request = Request::builder()
        .method("POST")
        .uri("/verify-dkim")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .expect("request");
    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "missing_upload");

    assert!(harness.store().read().is_none());
}

#[tokio::test]
async fn test_traversing_file_name_is_rejected() {
    let harness = TestHarness::setup();

    let (status, body) = harness.upload("../evil.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_upload");

    let parent = harness.script_dir().parent().expect("parent");
    assert!(!parent.join("evil.eml").exists());
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_upload_cannot_replace_toolchain_files() {
    let harness = TestHarness::setup();
    let prover = harness.script_dir().join("prove.sh");
    let original = std::fs::read(&prover).expect("prove.sh");

    let hostile = b"echo 'Transaction ID: PWNED'\necho 'Paid to name: attacker'\necho 'Extracted Amount: 1'\n";
    let (status, body) = harness.upload("prove.sh", hostile).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_upload");
    assert_eq!(std::fs::read(&prover).expect("prove.sh kept"), original);
    assert!(harness.store().read().is_none());

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["transactionId"], "TX123");
}

#[tokio::test]
async fn test_oversized_upload_is_payload_too_large() {
    let harness = TestHarness::builder().max_upload_bytes(1024).build();

    let (status, body) = harness.upload("payment.eml", &[b'a'; 8192]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["kind"], "payload_too_large");
    assert!(harness.store().read().is_none());
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_build_failure_keeps_previous_result() {
    let harness = TestHarness::setup();
    let (status, _) = harness.upload("first.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::OK);

    harness.set_build_script("echo 'error[E0425]: cannot find value' >&2\nexit 101\n");
    let (status, body) = harness.upload("second.eml", PAYMENT_EMAIL).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "build_failed");
    let message = body["message"].as_str().expect("message");
    assert!(message.starts_with("Error building Rust project"), "{message}");
    assert!(message.contains("cannot find value"), "{message}");

    let (_, stored) = harness.get("/get-verification-result").await;
    assert_eq!(stored["transactionId"], "TX123");
    assert_eq!(harness.store().runs(), 1);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_prover_failure_reports_stderr() {
    let harness = TestHarness::builder()
        .prove_script("echo 'network prover rejected request' >&2\nexit 1\n")
        .build();

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "prove_failed");
    let message = body["message"].as_str().expect("message");
    assert!(message.starts_with("Error during DKIM verification"), "{message}");
    assert!(message.contains("network prover rejected request"), "{message}");
    assert!(harness.store().read().is_none());
}

#[tokio::test]
async fn test_external_normalizer_failure_stops_the_chain() {
    let harness = TestHarness::builder()
        .normalize_command(&["sh", "-c", "echo 'dos2unix: Binary symbol found' >&2; exit 2", "normalize"])
        .build();
    harness.set_build_script("touch built\n");

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "normalize_failed");
    let message = body["message"].as_str().expect("message");
    assert!(message.starts_with("Error converting file line endings"), "{message}");

    let program_dir = harness.script_dir().parent().expect("parent").join("program");
    assert!(!program_dir.join("built").exists(), "build must not run");
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_missing_prover_field_is_extraction_failure() {
    let harness = TestHarness::builder()
        .prove_script("echo 'Transaction ID: TX1'\necho 'Extracted Amount: 1'\n")
        .build();

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "extraction_failed");
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("Paid to name:"));
    assert!(harness.store().read().is_none());
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_prover_timeout_is_gateway_timeout() {
    let harness = TestHarness::builder()
        .prove_script("sleep 10\n")
        .prove_timeout_secs(1)
        .build();

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["kind"], "stage_timeout");
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_prover_timeout_kills_its_helpers() {
    let harness = TestHarness::builder()
        .prove_script("(sleep 2; touch \"$PWD/orphan_marker\")\n")
        .prove_timeout_secs(1)
        .build();

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["kind"], "stage_timeout");

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    assert!(
        !harness.script_dir().join("orphan_marker").exists(),
        "prover helper outlived the timeout"
    );
}

#[tokio::test]
async fn test_missing_markers_give_not_verified_message() {
    let harness = TestHarness::builder()
        .prove_script(NOT_VERIFIED_PROVER)
        .build();

    let (status, body) = harness.upload("payment.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "DKIM Verification Result: Email is not verified."
    );
    assert_eq!(body["verified"], true);
}

#[tokio::test]
async fn test_latest_run_replaces_stored_result() {
    let harness = TestHarness::setup();
    let (status, _) = harness.upload("first.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::OK);

    harness.set_prove_script(NOT_VERIFIED_PROVER);
    let (status, _) = harness.upload("second.eml", PAYMENT_EMAIL).await;
    assert_eq!(status, StatusCode::OK);

    let (_, stored) = harness.get("/get-verification-result").await;
    assert_eq!(stored["transactionId"], "TX9");
    assert_eq!(stored["paidToName"], "Dana");

    let (status, health) = harness.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["runs"], 2);
    assert!(health["lastUpdated"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_json_not_found() {
    let harness = TestHarness::setup();

    let (status, body) = harness.get("/verify").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}
