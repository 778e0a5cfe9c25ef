use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use scriptdap_config::load_config;
use scriptdap_dap::protocol::LaunchRequestArguments;
use scriptdap_dap::{
    DapServer, DebugAdapter, Debugger, DebuggerError, FsProjectPaths, ServerOptions,
    TracingEditor,
};
use serde_json::{json, Value};

struct Idle;

impl Debugger for Idle {
    fn is_paused(&self) -> bool {
        false
    }
    fn is_session_active(&self) -> bool {
        false
    }
    fn launch(&mut self, _args: &LaunchRequestArguments) -> Result<(), DebuggerError> {
        Ok(())
    }
    fn stop(&mut self) {}
    fn request_break(&mut self) {}
    fn request_continue(&mut self) {}
    fn request_next(&mut self) {}
    fn request_step(&mut self) {}
    fn set_breakpoint(&mut self, _path: &str, _line: i64, _enabled: bool) {}
    fn request_stack_frame_vars(&mut self, _frame: i64) {}
}

fn frame(value: &Value) -> Vec<u8> {
    let body = value.to_string();
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

/// Poll the server until `count` complete messages arrived on `stream`.
fn collect(server: &mut DapServer, stream: &mut TcpStream, count: usize) -> Vec<Value> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut bytes = Vec::new();
    let mut messages = Vec::new();
    while messages.len() < count {
        assert!(Instant::now() < deadline, "timed out, got {messages:?}");
        server.poll();
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk) {
            Ok(0) => panic!("server closed the connection"),
            Ok(n) => bytes.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => panic!("read failed: {e}"),
        }
        while let Some(end) = bytes.windows(4).position(|w| w == b"\r\n\r\n") {
            let header = String::from_utf8_lossy(&bytes[..end]).to_string();
            let length: usize = header
                .trim_start_matches("Content-Length:")
                .trim()
                .parse()
                .unwrap();
            if bytes.len() < end + 4 + length {
                break;
            }
            let body: Vec<u8> = bytes.drain(..end + 4 + length).skip(end + 4).collect();
            messages.push(serde_json::from_slice(&body).unwrap());
        }
    }
    messages
}

#[test]
fn configured_server_answers_over_tcp() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let project = tmp.path().join("game");
    std::fs::create_dir_all(project.join(".scriptdap")).unwrap();
    std::fs::write(
        project.join(".scriptdap").join("config.toml"),
        "[server]\nmax_clients = 2\n",
    )
    .unwrap();
    std::fs::write(project.join("main.gd"), "extends Node\n").unwrap();

    let config = load_config(&config_dir, Some(&project)).unwrap();
    assert_eq!(config.server.max_clients, 2);

    let adapter = DebugAdapter::new(
        Box::new(Idle),
        Box::new(TracingEditor::default()),
        Box::new(FsProjectPaths::new(&project)),
    );
    let options = ServerOptions {
        max_clients: config.server.max_clients,
        max_buffer_size: config.server.max_buffer_size,
    };
    let mut server = DapServer::new(adapter, options);
    server.start(0, config.server.bind_ip().unwrap()).unwrap();
    let addr = server.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    client.set_nonblocking(true).unwrap();
    client
        .write_all(&frame(&json!({
            "seq": 1, "type": "request", "command": "initialize",
            "arguments": {"clientID": "it", "linesStartAt1": true},
        })))
        .unwrap();

    let messages = collect(&mut server, &mut client, 2);
    assert_eq!(messages[0]["command"], "initialize");
    assert_eq!(messages[0]["success"], true);
    assert_eq!(messages[1]["event"], "initialized");

    let source = project.join("main.gd").to_string_lossy().to_string();
    client
        .write_all(&frame(&json!({
            "seq": 2, "type": "request", "command": "setBreakpoints",
            "arguments": {"source": {"path": source}, "breakpoints": [{"line": 1}]},
        })))
        .unwrap();

    let messages = collect(&mut server, &mut client, 1);
    let breakpoint = &messages[0]["body"]["breakpoints"][0];
    assert_eq!(breakpoint["id"], 0);
    assert_eq!(breakpoint["verified"], true);
    let checksums = breakpoint["source"]["checksums"].as_array().unwrap();
    assert_eq!(checksums.len(), 2);
    assert_eq!(checksums[0]["algorithm"], "MD5");

    server.stop();
}
