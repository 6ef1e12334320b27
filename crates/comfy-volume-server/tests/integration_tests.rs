//! Integration tests for the comfy-volume binary.
//!
//! The server is started as a child process on port 0; a small axum app in the
//! test process stands in for the inference engine.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

const WORKFLOW: &str = r#"{
  "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "", "clip": ["4", 1]}},
  "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI", "images": ["8", 0]}}
}"#;

/// Cache and runtime roots in one temporary directory.
struct TestEnv {
    _dir: TempDir,
    cache: PathBuf,
    runtime: PathBuf,
    workflow: PathBuf,
}

fn create_test_env() -> TestEnv {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let cache = dir.path().join("cache");
    let runtime = dir.path().join("runtime");
    std::fs::create_dir_all(&cache).unwrap();
    std::fs::create_dir_all(runtime.join("models")).unwrap();
    std::fs::create_dir_all(runtime.join("custom_nodes")).unwrap();
    let workflow = dir.path().join("workflow_api.json");
    TestEnv {
        _dir: dir,
        cache,
        runtime,
        workflow,
    }
}

fn write_model(cache: &Path, category: &str, name: &str) {
    let dir = cache.join(category);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), b"weights").unwrap();
}

fn binary_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_comfy-volume") {
        return PathBuf::from(path);
    }
    let current_exe = std::env::current_exe().expect("current_exe");
    let target_debug_dir = current_exe
        .parent()
        .and_then(|p| p.parent())
        .expect("target/debug directory");
    let mut fallback = target_debug_dir.join("comfy-volume");
    if cfg!(target_os = "windows") {
        fallback.set_extension("exe");
    }
    fallback
}

fn base_command(env: &TestEnv) -> tokio::process::Command {
    let mut command = tokio::process::Command::new(binary_path());
    command
        .arg("--cache-root")
        .arg(&env.cache)
        .arg("--runtime-root")
        .arg(&env.runtime)
        .env_remove("COMFY_VOLUME_CONFIG")
        .env_remove("COMFY_VOLUME_CACHE_ROOT")
        .env_remove("COMFY_VOLUME_RUNTIME_ROOT")
        .env_remove("COMFY_VOLUME_RELOAD_URL")
        .env_remove("COMFY_VOLUME_REFRESH_CMD")
        .env_remove("COMFY_VOLUME_UPSTREAM_URL");
    command
}

// =============================================================================
// Fake upstream engine
// =============================================================================

#[derive(Clone, Default)]
struct UpstreamState {
    prompts: Arc<Mutex<Vec<Value>>>,
}

async fn fake_system_stats() -> Json<Value> {
    Json(json!({"system": {"os": "posix"}, "devices": []}))
}

async fn fake_prompt(State(state): State<UpstreamState>, Json(body): Json<Value>) -> Json<Value> {
    state.prompts.lock().unwrap().push(body);
    Json(json!({"prompt_id": "p-1", "number": 0, "node_errors": {}}))
}

async fn fake_queue() -> Json<Value> {
    Json(json!({"queue_running": [], "queue_pending": []}))
}

async fn start_fake_upstream() -> (String, UpstreamState) {
    let state = UpstreamState::default();
    let app = Router::new()
        .route("/system_stats", get(fake_system_stats))
        .route("/prompt", post(fake_prompt))
        .route("/queue", get(fake_queue))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

/// URL of a port nothing listens on.
async fn dead_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

// =============================================================================
// Server process
// =============================================================================

async fn check_health(port: u16) -> bool {
    let client = reqwest::Client::new();
    if let Ok(response) = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        if let Ok(json) = response.json::<Value>().await {
            return json.get("status").and_then(|v| v.as_str()) == Some("ok");
        }
    }
    false
}

async fn wait_for_server(port: u16, timeout_secs: u64) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        if check_health(port).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

struct ServerHandle {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

/// Start `comfy-volume serve` and wait until `/health` is ready.
async fn start_server(env: &TestEnv, upstream_url: &str) -> Result<ServerHandle, String> {
    let mut child = base_command(env)
        .arg("serve")
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--upstream-url")
        .arg(upstream_url)
        .arg("--workflow")
        .arg(&env.workflow)
        .arg("--no-link")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn comfy-volume: {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture stdout".to_string())?;
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut discovered_port: Option<u16> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("COMFY_VOLUME_PORT=") {
                    let parsed = value
                        .trim()
                        .parse::<u16>()
                        .map_err(|e| format!("invalid port value '{value}': {e}"))?;
                    discovered_port = Some(parsed);
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(format!("failed to read stdout: {err}")),
            Err(_) => continue,
        }
    }

    let port = discovered_port.ok_or_else(|| "port line not emitted".to_string())?;
    if !wait_for_server(port, 15).await {
        return Err(format!("comfy-volume failed health check on port {port}"));
    }

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(ServerHandle {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    })
}

/// Run a one-shot CLI command and return (exit code, parsed stdout).
async fn run_cli(env: &TestEnv, args: &[&str]) -> (i32, Option<Value>) {
    let output = base_command(env)
        .args(args)
        .stderr(Stdio::null())
        .output()
        .await
        .expect("failed to run comfy-volume");
    let stdout = String::from_utf8_lossy(&output.stdout);
    (
        output.status.code().unwrap_or(-1),
        serde_json::from_str(&stdout).ok(),
    )
}

// =============================================================================
// HTTP surface
// =============================================================================

#[tokio::test]
async fn test_reload_links_new_assets_once() {
    let env = create_test_env();
    let (upstream, _) = start_fake_upstream().await;
    let server = start_server(&env, &upstream).await.unwrap();

    write_model(&env.cache, "loras", "a.safetensors");
    write_model(&env.cache, "vae", "b.safetensors");

    let client = reqwest::Client::new();
    let first: Value = client
        .post(server.url("/reload"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["linked_count"], 2);

    let link = env.runtime.join("models/loras/a.safetensors");
    assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        env.cache.join("loras/a.safetensors")
    );
    assert!(env.runtime.join("models/vae/b.safetensors").exists());

    let second: Value = client
        .post(server.url("/reload"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["linked_count"], 0);
    assert_eq!(second["models"]["skipped"], 2);

    server.stop().await;
}

#[tokio::test]
async fn test_reload_leaves_existing_runtime_files() {
    let env = create_test_env();
    let (upstream, _) = start_fake_upstream().await;
    let server = start_server(&env, &upstream).await.unwrap();

    write_model(&env.cache, "checkpoints", "sd.safetensors");
    let existing = env.runtime.join("models/checkpoints/sd.safetensors");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"local copy").unwrap();

    let body: Value = reqwest::Client::new()
        .post(server.url("/reload"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["linked_count"], 0);
    assert_eq!(std::fs::read(&existing).unwrap(), b"local copy");

    server.stop().await;
}

#[tokio::test]
async fn test_models_and_nodes_listing() {
    let env = create_test_env();
    let (upstream, _) = start_fake_upstream().await;
    write_model(&env.cache, "loras", "a.safetensors");
    write_model(&env.cache, "vae", "b.safetensors");
    let node = env.cache.join("custom_nodes/ComfyUI-Impact");
    std::fs::create_dir_all(&node).unwrap();
    std::fs::write(node.join("__init__.py"), b"").unwrap();

    let server = start_server(&env, &upstream).await.unwrap();

    let models: Value = reqwest::get(server.url("/models"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["total"], 2);
    assert_eq!(models["models"]["loras"][0]["name"], "a.safetensors");
    assert_eq!(models["models"]["vae"][0]["size_bytes"], 7);

    let nodes: Value = reqwest::get(server.url("/nodes"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodes["nodes"][0]["name"], "ComfyUI-Impact");
    assert_eq!(nodes["nodes"][0]["valid"], true);

    server.stop().await;
}

#[tokio::test]
async fn test_api_missing_workflow_is_404() {
    let env = create_test_env();
    let (upstream, state) = start_fake_upstream().await;
    let server = start_server(&env, &upstream).await.unwrap();

    let response = reqwest::Client::new()
        .post(server.url("/api"))
        .json(&json!({"prompt": "a cat"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("workflow"));
    assert!(state.prompts.lock().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_api_requires_prompt() {
    let env = create_test_env();
    std::fs::write(&env.workflow, WORKFLOW).unwrap();
    let (upstream, _) = start_fake_upstream().await;
    let server = start_server(&env, &upstream).await.unwrap();

    let response = reqwest::Client::new()
        .post(server.url("/api"))
        .json(&json!({"steps": 20}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_api_submits_prepared_workflow() {
    let env = create_test_env();
    std::fs::write(&env.workflow, WORKFLOW).unwrap();
    let (upstream, state) = start_fake_upstream().await;
    let server = start_server(&env, &upstream).await.unwrap();

    let response = reqwest::Client::new()
        .post(server.url("/api"))
        .json(&json!({"prompt": "a lighthouse at dusk"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["prompt_id"], "p-1");
    let client_id = body["client_id"].as_str().unwrap().to_string();
    assert_eq!(client_id.len(), 32);

    let prompts = state.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0]["client_id"], client_id.as_str());
    let workflow = &prompts[0]["prompt"];
    assert_eq!(workflow["6"]["inputs"]["text"], "a lighthouse at dusk");
    assert_eq!(workflow["9"]["inputs"]["filename_prefix"], client_id.as_str());
    assert_eq!(workflow["6"]["inputs"]["clip"], json!(["4", 1]));

    server.stop().await;
}

#[tokio::test]
async fn test_raw_forwarding() {
    let env = create_test_env();
    let (upstream, _) = start_fake_upstream().await;
    let server = start_server(&env, &upstream).await.unwrap();

    let response = reqwest::get(server.url("/api/raw/queue")).await.unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["queue_running"], json!([]));

    let missing = reqwest::get(server.url("/api/raw/does-not-exist")).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_unhealthy_upstream_drains_and_exits() {
    let env = create_test_env();
    std::fs::write(&env.workflow, WORKFLOW).unwrap();
    let upstream = dead_upstream().await;
    let mut server = start_server(&env, &upstream).await.unwrap();

    let response = reqwest::Client::new()
        .post(server.url("/api"))
        .json(&json!({"prompt": "a cat"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let status = tokio::time::timeout(Duration::from_secs(15), server.child.wait())
        .await
        .expect("server should shut down after draining")
        .unwrap();
    assert!(status.success());
}

// =============================================================================
// One-shot commands
// =============================================================================

#[tokio::test]
async fn test_link_dry_run_and_apply() {
    let env = create_test_env();
    write_model(&env.cache, "loras", "a.safetensors");
    write_model(&env.cache, "unknown_category", "x.bin");

    let (code, output) = run_cli(&env, &["link", "--dry-run"]).await;
    assert_eq!(code, 0);
    let output = output.unwrap();
    assert_eq!(output["dry_run"], true);
    assert_eq!(output["would_link"], 1);
    assert!(!env.runtime.join("models/loras/a.safetensors").exists());

    let (code, output) = run_cli(&env, &["link"]).await;
    assert_eq!(code, 0);
    assert_eq!(output.unwrap()["linked_count"], 1);
    assert!(env.runtime.join("models/loras/a.safetensors").exists());
    assert!(!env.runtime.join("models/unknown_category").exists());
}

#[tokio::test]
async fn test_manage_list_and_diagnose() {
    let env = create_test_env();
    write_model(&env.cache, "vae", "b.safetensors");

    let (code, output) = run_cli(&env, &["manage", "--action", "list"]).await;
    assert_eq!(code, 0);
    assert_eq!(output.unwrap()["models"]["vae"][0]["name"], "b.safetensors");

    let (code, output) = run_cli(&env, &["manage", "--action", "diagnose"]).await;
    assert_eq!(code, 0);
    let output = output.unwrap();
    assert_eq!(output["models"]["total"], 1);
    assert_eq!(output["runtime_nodes"], json!([]));
}

#[tokio::test]
async fn test_manage_missing_flag_is_usage_error() {
    let env = create_test_env();
    let (code, output) = run_cli(&env, &["manage", "--action", "hf", "--type", "loras"]).await;
    assert_eq!(code, 2);
    assert!(output.is_none());
}

#[tokio::test]
async fn test_manage_delete_missing_model_fails() {
    let env = create_test_env();
    let (code, output) = run_cli(
        &env,
        &[
            "manage",
            "--action",
            "delete",
            "--type",
            "loras",
            "--filename",
            "nope.safetensors",
        ],
    )
    .await;
    assert_eq!(code, 1);
    assert_eq!(output.unwrap()["success"], false);
}

#[tokio::test]
async fn test_manage_import_then_list() {
    let env = create_test_env();
    let source = env.workflow.with_file_name("local.safetensors");
    std::fs::write(&source, b"weights").unwrap();
    let source_arg = source.to_string_lossy().into_owned();

    let import = [
        "manage", "--action", "import", "--type", "loras", "--path", source_arg.as_str(),
    ];
    let (code, output) = run_cli(&env, &import).await;
    assert_eq!(code, 0);
    assert_eq!(output.unwrap()["action"], "imported");
    assert!(env.cache.join("loras/local.safetensors").is_file());

    let (code, output) = run_cli(&env, &import).await;
    assert_eq!(code, 0);
    assert_eq!(output.unwrap()["action"], "exists");

    let (_, output) = run_cli(&env, &["manage", "--action", "list"]).await;
    assert_eq!(output.unwrap()["models"]["loras"][0]["name"], "local.safetensors");
}
