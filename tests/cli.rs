use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn planner(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("planner-sync").expect("bin");
    cmd.env("PLANNER_SYNC_HOME", home)
        .env_remove("PLANNER_SYNC_API_URL")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

/// Answer `count` requests with a fixed status and body.
fn serve(status_line: &'static str, body: &'static str, count: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");

    thread::spawn(move || {
        for stream in listener.incoming().take(count) {
            let mut stream = stream.expect("accept");
            read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write");
        }
    });

    format!("http://{addr}")
}

fn read_request(stream: &mut impl Read) {
    let mut raw = Vec::new();
    let mut buf = [0_u8; 1024];
    loop {
        let n = stream.read(&mut buf).expect("read");
        if n == 0 {
            return;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= split + 4 + length {
                return;
            }
        }
    }
}

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    planner(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("enqueue"))
        .stdout(predicate::str::contains("conflicts"));
}

#[test]
fn enqueue_then_list() {
    let home = TempDir::new().unwrap();

    let queued = json_output(planner(home.path()).args([
        "enqueue",
        "task",
        "create",
        "--payload",
        r#"{"title":"Buy milk"}"#,
        "-o",
        "json",
    ]));
    assert_eq!(queued["status"], "pending");
    assert_eq!(queued["attempts"], 0);

    let listed = json_output(planner(home.path()).args(["list", "-o", "json"]));
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["items"][0]["id"], queued["id"]);
    assert_eq!(listed["items"][0]["payload"]["title"], "Buy milk");

    assert!(home.path().join("planner-sync.db").exists());
}

#[test]
fn enqueue_update_without_id_fails() {
    let home = TempDir::new().unwrap();
    planner(home.path())
        .args(["enqueue", "task", "update", "--payload", r#"{"title":"x"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must include an id"));
}

#[test]
fn run_offline_sends_nothing() {
    let home = TempDir::new().unwrap();
    planner(home.path())
        .args(["enqueue", "event", "delete", "--id", "evt-1"])
        .assert()
        .success();

    planner(home.path())
        .args(["run", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Offline"));

    let stats = json_output(planner(home.path()).args(["status", "-o", "json"]));
    assert_eq!(stats["pending"], 1);
}

#[test]
fn run_success_empties_queue() {
    let home = TempDir::new().unwrap();
    let api = serve("201 Created", r#"{"id":1}"#, 1);
    planner(home.path())
        .args(["enqueue", "task", "create", "--payload", r#"{"title":"Milk"}"#])
        .assert()
        .success();

    let outcome = json_output(planner(home.path()).args(["--api-url", &api, "run", "-o", "json"]));
    assert_eq!(outcome["outcome"], "completed");
    assert_eq!(outcome["report"]["succeeded"], 1);

    let stats = json_output(planner(home.path()).args(["status", "-o", "json"]));
    assert_eq!(stats["total"], 0);
}

#[test]
fn unreachable_api_schedules_retry() {
    let home = TempDir::new().unwrap();
    // Nothing listens on a freshly released port.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let api = format!("http://127.0.0.1:{port}");
    planner(home.path())
        .args(["enqueue", "task", "create", "--payload", "{}"])
        .assert()
        .success();

    let outcome = json_output(planner(home.path()).args(["--api-url", &api, "run", "-o", "json"]));
    assert_eq!(outcome["report"]["retried"], 1);

    let listed = json_output(planner(home.path()).args(["list", "-o", "json"]));
    assert_eq!(listed["items"][0]["status"], "retry");
    assert_eq!(listed["items"][0]["attempts"], 1);

    let eligible = json_output(planner(home.path()).args(["list", "--eligible", "-o", "json"]));
    assert_eq!(eligible["count"], 0);

    let reset = json_output(planner(home.path()).args(["retry", "--all", "-o", "json"]));
    assert_eq!(reset["rescheduled"], 1);

    let eligible = json_output(planner(home.path()).args(["list", "--eligible", "-o", "json"]));
    assert_eq!(eligible["count"], 1);
}

#[test]
fn conflict_round_trip() {
    let home = TempDir::new().unwrap();
    let api = serve("409 Conflict", r#"{"id":5,"title":"Remote Title"}"#, 1);
    planner(home.path())
        .args(["enqueue", "task", "update", "--id", "5", "--payload", r#"{"title":"Local"}"#])
        .assert()
        .success();

    let outcome = json_output(planner(home.path()).args(["--api-url", &api, "run", "-o", "json"]));
    assert_eq!(outcome["report"]["conflicted"], 1);

    let conflicts = json_output(planner(home.path()).args(["conflicts", "list", "-o", "json"]));
    assert_eq!(conflicts["count"], 1);
    assert_eq!(conflicts["items"][0]["remote_data"]["title"], "Remote Title");
    let conflict_id = conflicts["items"][0]["id"].as_str().unwrap().to_string();

    planner(home.path())
        .args(["conflicts", "show", &conflict_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Remote Title"));

    planner(home.path())
        .args(["conflicts", "remove", &conflict_id, "--drop-action"])
        .assert()
        .success();

    let stats = json_output(planner(home.path()).args(["status", "-o", "json"]));
    assert_eq!(stats["total"], 0);
    assert_eq!(stats["conflict_records"], 0);
}

#[test]
fn config_init_and_path() {
    let home = TempDir::new().unwrap();
    planner(home.path())
        .args(["config", "init"])
        .assert()
        .success();
    assert!(home.path().join("config.yaml").exists());

    planner(home.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    planner(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yaml"));
}

#[test]
fn broken_config_is_reported() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.yaml"), "sync:\n  periodic_interval_secs: soon\n").unwrap();

    planner(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[test]
fn completions_generate() {
    let home = TempDir::new().unwrap();
    planner(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("planner-sync"));
}
