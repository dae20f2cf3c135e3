use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use solbench::BenchError;
use solbench::backend::{BackendConfig, GenerationBackend, OllamaBackend};

#[derive(Debug, Clone)]
struct ScriptedResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl ScriptedResponse {
    fn json(body: Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    fn text(body: &str) -> Self {
        Self::status(200, body)
    }
}

#[derive(Debug, Clone)]
struct TranscriptEntry {
    method: String,
    path: String,
    body: String,
}

struct ServerHarness {
    endpoint: String,
    transcripts: Arc<Mutex<Vec<TranscriptEntry>>>,
    stop: Arc<AtomicBool>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl ServerHarness {
    fn transcripts(&self) -> Vec<TranscriptEntry> {
        self.transcripts.lock().expect("transcript lock").clone()
    }

    fn backend(&self) -> OllamaBackend {
        OllamaBackend::new(&BackendConfig {
            endpoint: self.endpoint.clone(),
            timeout_seconds: 5,
        })
        .expect("backend")
    }
}

impl Drop for ServerHarness {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(
            self.endpoint
                .strip_prefix("http://")
                .unwrap_or_default()
                .trim_end_matches('/'),
        );
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|window| window == b"\r\n\r\n")
}

fn parse_request(stream: &mut TcpStream) -> Option<TranscriptEntry> {
    let mut bytes = Vec::new();
    let mut buf = [0_u8; 4096];
    let mut content_length = 0_usize;
    let mut header_end = None;

    stream.set_read_timeout(Some(Duration::from_secs(2))).ok()?;

    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => {
                bytes.extend_from_slice(&buf[..read]);

                if header_end.is_none()
                    && let Some(pos) = find_header_end(&bytes)
                {
                    header_end = Some(pos + 4);
                    let header_text = String::from_utf8_lossy(&bytes[..pos]).to_string();
                    for line in header_text.lines() {
                        let lower = line.to_ascii_lowercase();
                        if lower.starts_with("content-length:")
                            && let Some(value) = line.split(':').nth(1)
                        {
                            content_length = value.trim().parse::<usize>().unwrap_or(0);
                        }
                    }
                }

                if let Some(end) = header_end
                    && bytes.len() >= end + content_length
                {
                    break;
                }
            }
            Err(error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(_) => return None,
        }
    }

    let end = header_end?;
    if bytes.len() < end + content_length {
        return None;
    }

    let header_text = String::from_utf8_lossy(&bytes[..end]).to_string();
    let request_line = header_text.lines().next()?.to_string();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("GET").to_string();
    let path = parts.next().unwrap_or("/").to_string();
    let body = String::from_utf8_lossy(&bytes[end..end + content_length]).to_string();

    Some(TranscriptEntry { method, path, body })
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

fn write_response(stream: &mut TcpStream, response: &ScriptedResponse) {
    let payload = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len(),
        response.body
    );
    let _ = stream.write_all(payload.as_bytes());
    let _ = stream.flush();
}

/// Serves `responses` in order, repeating the last one.
fn start_scripted_server(responses: Vec<ScriptedResponse>) -> ServerHarness {
    assert!(!responses.is_empty(), "script at least one response");

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    listener
        .set_nonblocking(true)
        .expect("set nonblocking listener");

    let endpoint = format!("http://{}/", listener.local_addr().expect("local addr"));
    let stop = Arc::new(AtomicBool::new(false));
    let transcripts = Arc::new(Mutex::new(Vec::new()));
    let queue = Arc::new(Mutex::new(VecDeque::from(responses)));

    let stop_clone = Arc::clone(&stop);
    let transcripts_clone = Arc::clone(&transcripts);
    let queue_clone = Arc::clone(&queue);

    let join_handle = thread::spawn(move || {
        loop {
            if stop_clone.load(Ordering::SeqCst) {
                break;
            }

            match listener.accept() {
                Ok((mut stream, _addr)) => {
                    if let Some(entry) = parse_request(&mut stream) {
                        let response = {
                            let mut guard = queue_clone.lock().expect("queue lock");
                            if guard.len() > 1 {
                                guard.pop_front().expect("queued response")
                            } else {
                                guard.front().expect("fallback response").clone()
                            }
                        };
                        transcripts_clone
                            .lock()
                            .expect("transcript lock")
                            .push(entry);
                        write_response(&mut stream, &response);
                    }
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });

    ServerHarness {
        endpoint,
        transcripts,
        stop,
        join_handle: Some(join_handle),
    }
}

fn free_port_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

#[test]
fn generate_posts_ollama_payload_and_strips_context() {
    let server = start_scripted_server(vec![ScriptedResponse::json(json!({
        "model": "llama3",
        "created_at": "2026-10-17T00:00:00Z",
        "response": "```solidity\ncontract Token {}\n```",
        "done": true,
        "context": [1, 2, 3],
        "total_duration": 4_000_000_000_u64,
        "eval_count": 128,
    }))]);

    let generated = server
        .backend()
        .generate("llama3", "Write an ERC20 token.", 0.2)
        .expect("generation should succeed");

    assert_eq!(generated.response, "```solidity\ncontract Token {}\n```");
    assert!(!generated.prompt_infos.contains_key("context"));
    assert!(!generated.prompt_infos.contains_key("model"));
    assert_eq!(generated.prompt_infos["eval_count"], 128);
    assert_eq!(generated.total_duration_ns(), 4_000_000_000);

    let transcripts = server.transcripts();
    assert_eq!(transcripts.len(), 1);
    assert_eq!(transcripts[0].method, "POST");
    assert_eq!(transcripts[0].path, "/api/generate");
    let request: Value = serde_json::from_str(&transcripts[0].body).expect("request json");
    assert_eq!(
        request,
        json!({
            "model": "llama3",
            "prompt": "Write an ERC20 token.",
            "stream": false,
            "options": { "temperature": 0.2 },
        })
    );
}

#[test]
fn generate_maps_http_errors_to_generation_failures() {
    let server = start_scripted_server(vec![ScriptedResponse::status(
        500,
        "model 'nope' not found",
    )]);

    let error = server
        .backend()
        .generate("nope", "prompt", 0.2)
        .expect_err("HTTP 500 must fail");
    match error {
        BenchError::Generation { model, message } => {
            assert_eq!(model, "nope");
            assert!(message.contains("500"), "unexpected message: {message}");
            assert!(message.contains("not found"), "unexpected message: {message}");
        }
        other => panic!("expected Generation, got {other}"),
    }
}

#[test]
fn generate_rejects_bodies_without_response_text() {
    let server = start_scripted_server(vec![
        ScriptedResponse::json(json!({ "done": true, "total_duration": 1 })),
        ScriptedResponse::text("this is not json"),
    ]);
    let backend = server.backend();

    let error = backend
        .generate("gemma", "prompt", 0.2)
        .expect_err("missing response field must fail");
    assert!(error.to_string().contains("missing `response`"));

    let error = backend
        .generate("gemma", "prompt", 0.2)
        .expect_err("non-JSON body must fail");
    assert!(error.to_string().contains("non-JSON body"));
    assert_eq!(server.transcripts().len(), 2);
}

#[test]
fn generate_reports_unreachable_backend_as_generation_failure() {
    let backend = OllamaBackend::new(&BackendConfig {
        endpoint: free_port_endpoint(),
        timeout_seconds: 2,
    })
    .expect("backend");

    let error = backend
        .generate("mistral", "prompt", 0.2)
        .expect_err("closed port must fail");
    assert!(matches!(error, BenchError::Generation { model, .. } if model == "mistral"));
}

#[test]
fn ping_queries_model_listing() {
    let server = start_scripted_server(vec![
        ScriptedResponse::json(json!({ "models": [] })),
        ScriptedResponse::status(404, "not found"),
    ]);
    let backend = server.backend();

    backend.ping().expect("first ping succeeds");
    let error = backend.ping().expect_err("404 must fail");
    assert!(error.to_string().contains("404"));

    let transcripts = server.transcripts();
    assert_eq!(transcripts[0].method, "GET");
    assert_eq!(transcripts[0].path, "/api/tags");
}
