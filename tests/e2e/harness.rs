//! Test harness wiring the router to a fake toolchain.
//!
//! Layout of the temporary workspace:
//!
//! ```text
//! <tmp>/program/build.sh   build step   (cwd = program)
//! <tmp>/script/prove.sh    prover       (cwd = script, also the staging dir)
//! ```

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use dkim_verify::api::{self, AppState};
use dkim_verify::config::SecretString;
use dkim_verify::event::create_event_channel;
use dkim_verify::{Pipeline, ServiceConfig, TokioRunner, VerificationStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Private key the fake prover expects.
pub const TEST_PRIVATE_KEY: &str = "0xtest";

/// Prover that checks its environment and the normalized artifact, then
/// prints the payment fields.
pub const VERIFYING_PROVER: &str = r#"
if [ "$SP1_PROVER" != "mock" ] || [ "$SP1_PRIVATE_KEY" != "0xtest" ] || [ "$RUST_LOG" != "info" ]; then
  echo "unexpected prover environment" >&2
  exit 1
fi
if grep -q "$(printf '\r')" ./*.eml; then
  echo "artifact still has CRLF line endings" >&2
  exit 1
fi
echo "Transaction ID: TX123"
echo "Paid to name: Alice"
echo "Extracted Amount: 10.00"
echo "Extracted Transaction ID: TX123"
"#;

/// A sample payment email with CRLF line endings.
pub const PAYMENT_EMAIL: &[u8] =
    b"From: noreply@phonepe.com\r\nSubject: Paid to Alice\r\n\r\nTxn. ID\r\n: T1\r\n";

const BOUNDARY: &str = "dkim-verify-test-boundary";

/// Builder for [`TestHarness`].
pub struct HarnessBuilder {
    build_script: String,
    prove_script: String,
    normalize_command: Vec<String>,
    prove_timeout_secs: u64,
    max_upload_bytes: Option<usize>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            build_script: "exit 0".to_string(),
            prove_script: VERIFYING_PROVER.to_string(),
            normalize_command: Vec::new(),
            prove_timeout_secs: 30,
            max_upload_bytes: None,
        }
    }
}

impl HarnessBuilder {
    /// Replace the build script.
    pub fn build_script(mut self, script: &str) -> Self {
        self.build_script = script.to_string();
        self
    }

    /// Replace the prover script.
    pub fn prove_script(mut self, script: &str) -> Self {
        self.prove_script = script.to_string();
        self
    }

    /// Use an external normalizer instead of the built-in one.
    pub fn normalize_command(mut self, argv: &[&str]) -> Self {
        self.normalize_command = argv.iter().map(ToString::to_string).collect();
        self
    }

    /// Prover timeout.
    pub fn prove_timeout_secs(mut self, secs: u64) -> Self {
        self.prove_timeout_secs = secs;
        self
    }

    /// Request body limit.
    pub fn max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = Some(limit);
        self
    }

    /// Create the workspace and router.
    pub fn build(self) -> TestHarness {
        let dir = tempfile::tempdir().expect("tempdir");
        let script_dir = dir.path().join("script");
        let program_dir = dir.path().join("program");
        std::fs::create_dir_all(&script_dir).expect("mkdir script");
        std::fs::create_dir_all(&program_dir).expect("mkdir program");
        std::fs::write(program_dir.join("build.sh"), &self.build_script).expect("build.sh");
        std::fs::write(script_dir.join("prove.sh"), &self.prove_script).expect("prove.sh");

        let mut config = ServiceConfig::default();
        config.pipeline.staging_dir = script_dir.clone();
        config.pipeline.project_dir = script_dir.clone();
        config.pipeline.build_dir = program_dir.clone();
        config.pipeline.normalize_command = self.normalize_command;
        config.pipeline.build_command = vec!["sh".into(), "build.sh".into()];
        config.pipeline.prove_command = vec!["sh".into(), "prove.sh".into()];
        config.pipeline.prove_timeout_secs = self.prove_timeout_secs;
        config.prover.mode = "mock".to_string();
        config.prover.private_key = Some(SecretString::new(TEST_PRIVATE_KEY));
        if let Some(limit) = self.max_upload_bytes {
            config.server.max_upload_bytes = limit;
        }

        let store = VerificationStore::new();
        let (events_tx, _) = create_event_channel();
        let pipeline = Arc::new(Pipeline::new(
            &config,
            Arc::new(TokioRunner::new()),
            store.clone(),
            events_tx,
        ));
        let router = api::router(AppState::new(pipeline), config.server.max_upload_bytes);

        TestHarness {
            _dir: dir,
            script_dir,
            program_dir,
            router,
            store,
        }
    }
}

/// Router plus fake toolchain workspace.
pub struct TestHarness {
    _dir: TempDir,
    script_dir: PathBuf,
    program_dir: PathBuf,
    router: Router,
    store: VerificationStore,
}

impl TestHarness {
    /// Harness with a succeeding build and the verifying prover.
    pub fn setup() -> Self {
        HarnessBuilder::default().build()
    }

    /// Customizable harness.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Staging and prover directory.
    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Shared result store.
    pub fn store(&self) -> &VerificationStore {
        &self.store
    }

    /// Rewrite the build script between requests.
    pub fn set_build_script(&self, script: &str) {
        std::fs::write(self.program_dir.join("build.sh"), script).expect("build.sh");
    }

    /// Rewrite the prover script between requests.
    pub fn set_prove_script(&self, script: &str) {
        std::fs::write(self.script_dir.join("prove.sh"), script).expect("prove.sh");
    }

    /// Files in the staging directory other than the prover script.
    pub fn staged_files(&self) -> Vec<String> {
        std::fs::read_dir(&self.script_dir)
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .filter(|name| name != "prove.sh")
            .collect()
    }

    /// POST an upload under the `email_file` field.
    pub async fn upload(&self, file_name: &str, contents: &[u8]) -> (StatusCode, Value) {
        self.upload_field("email_file", file_name, contents).await
    }

    /// POST an upload under an arbitrary field name.
    pub async fn upload_field(
        &self,
        field: &str,
        file_name: &str,
        contents: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: message/rfc822\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/verify-dkim")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        self.send(request).await
    }

    /// Issue a GET request.
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    /// Send any request through the router.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}
