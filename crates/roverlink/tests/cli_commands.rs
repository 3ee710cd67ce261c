#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::net::TcpListener;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn free_ports() -> (u16, u16) {
    let a = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
    let b = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
    (
        a.local_addr().expect("addr").port(),
        b.local_addr().expect("addr").port(),
    )
}

fn roverlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_roverlink"));
    cmd.args(["--log-level", "error"]);
    cmd
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("child status") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("child did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

struct Executor {
    child: Child,
    ports: (u16, u16),
}

impl Executor {
    fn start() -> Self {
        let ports = free_ports();
        let child = roverlink()
            .args(["serve", "--bind", "127.0.0.1", "--telemetry-interval", "0.2"])
            .args(["--port-a", &ports.0.to_string(), "--port-b", &ports.1.to_string()])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");
        let executor = Self { child, ports };
        executor.wait_until_listening();
        executor
    }

    fn wait_until_listening(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        for port in [self.ports.0, self.ports.1] {
            while std::net::TcpStream::connect(("127.0.0.1", port)).is_err() {
                assert!(Instant::now() < deadline, "executor never listened on {port}");
                thread::sleep(Duration::from_millis(25));
            }
        }
    }

    fn send(&self, args: &[&str]) -> Output {
        roverlink()
            .args(["--format", "json", "send", "--host", "127.0.0.1"])
            .args(["--port-a", &self.ports.0.to_string()])
            .args(["--port-b", &self.ports.1.to_string()])
            .args(args)
            .output()
            .expect("send should run")
    }

    fn finish(mut self, timeout: Duration) -> (ExitStatus, String) {
        let status = wait_with_timeout(&mut self.child, timeout);
        let mut stdout = String::new();
        if let Some(mut out) = self.child.stdout.take() {
            use std::io::Read;
            let _ = out.read_to_string(&mut stdout);
        }
        (status, stdout)
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn version_prints_name_and_build_info() {
    let out = roverlink()
        .args(["version", "--extended"])
        .output()
        .expect("version should run");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("roverlink "), "{stdout}");
    assert!(stdout.contains("default ports: channel A 2001, channel B 2000"));
}

#[test]
fn invalid_config_exits_with_config_code() {
    let path = std::env::temp_dir().join(format!("roverlink-bad-{}.toml", std::process::id()));
    std::fs::write(&path, "[link]\nalive_after = 0.5\n").expect("write config");

    let out = roverlink()
        .args(["send", "--config"])
        .arg(&path)
        .arg("ping:ping")
        .output()
        .expect("send should run");
    let _ = std::fs::remove_file(&path);

    assert_eq!(out.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&out.stderr).contains("alive_after"));
}

#[test]
fn refused_connection_is_a_transport_error() {
    let (port_a, port_b) = free_ports();
    let out = roverlink()
        .args(["send", "--host", "127.0.0.1"])
        .args(["--port-a", &port_a.to_string(), "--port-b", &port_b.to_string()])
        .arg("gear:3")
        .output()
        .expect("send should run");
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn channel_b_streams_telemetry_and_echoes_pings() {
    let executor = Executor::start();

    let out = executor.send(&["--channel", "b", "--wait", "--count", "4", "ping:ok"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 4);
    assert!(lines.iter().all(|l| l["kind"] == "record" && l["channel"] == "B"));
    let names: Vec<&str> = lines.iter().filter_map(|l| l["name"].as_str()).collect();
    assert!(names.contains(&"ir"), "{names:?}");
    assert!(names.contains(&"power"), "{names:?}");
    assert!(
        lines.iter().any(|l| l["name"] == "ping" && l["value"] == "ok"),
        "{lines:?}"
    );
}

#[test]
fn channel_a_only_echoes_pings() {
    let executor = Executor::start();

    let out = executor.send(&["--channel", "a", "--wait", "led:green", "ping:ping"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let line: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&out.stdout).trim()).expect("json");
    assert_eq!(line["channel"], "A");
    assert_eq!(line["name"], "ping");
}

#[test]
fn wait_without_replies_times_out() {
    let executor = Executor::start();

    let out = executor.send(&[
        "--channel",
        "a",
        "--wait",
        "--wait-timeout",
        "300ms",
        "led:red",
    ]);
    assert_eq!(out.status.code(), Some(124));
}

#[test]
fn shutdown_command_stops_executor_cleanly() {
    let executor = Executor::start();

    let out = executor.send(&["--channel", "b", "shutdown"]);
    assert!(out.status.success());

    let (status, stdout) = executor.finish(Duration::from_secs(5));
    assert_eq!(status.code(), Some(0));
    assert!(stdout.contains("shutdown"), "{stdout}");
}

#[test]
fn update_command_exits_with_update_code() {
    let executor = Executor::start();

    let out = executor.send(&["--channel", "b", "update"]);
    assert!(out.status.success());

    let (status, _) = executor.finish(Duration::from_secs(5));
    assert_eq!(status.code(), Some(10));
}

#[test]
fn drive_delivers_script_and_prints_summary() {
    let executor = Executor::start();

    let mut child = roverlink()
        .args(["--format", "json", "drive", "--host", "127.0.0.1"])
        .args(["--port-a", &executor.ports.0.to_string()])
        .args(["--port-b", &executor.ports.1.to_string()])
        .args(["--linger", "5"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("drive should start");

    {
        let mut stdin = child.stdin.take().expect("stdin");
        stdin
            .write_all(b"# test drive\nb gear:5\na led:orange\nnot a command\n")
            .expect("write script");
    }

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success());

    let mut stdout = String::new();
    use std::io::Read;
    child
        .stdout
        .take()
        .expect("stdout")
        .read_to_string(&mut stdout)
        .expect("read stdout");

    let summary: serde_json::Value = stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find(|v| v["kind"] == "summary")
        .expect("summary line");
    assert_eq!(summary["sent"], 2);
    assert_eq!(summary["records_written"], 2);
    assert_eq!(summary["dropped_at_shutdown"], 0);
    assert!(stdout.contains("\"kind\":\"status\""));
}
