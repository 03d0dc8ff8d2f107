#![cfg(feature = "cli")]

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use commlink::frame::{FrameReader, FrameWriter};
use serde_json::{json, Value};

const WAIT: Duration = Duration::from_secs(5);

fn commlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_commlink"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().unwrap().port().to_string();
    (listener, port)
}

fn accept_within(listener: &TcpListener, timeout: Duration) -> TcpStream {
    listener.set_nonblocking(true).unwrap();
    let start = Instant::now();
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).unwrap();
                stream.set_read_timeout(Some(WAIT)).unwrap();
                return stream;
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                assert!(start.elapsed() < timeout, "client never connected");
                thread::sleep(Duration::from_millis(20));
            }
            Err(err) => panic!("accept failed: {err}"),
        }
    }
}

fn split(stream: TcpStream) -> (FrameReader<TcpStream>, FrameWriter<TcpStream>) {
    let reader = FrameReader::new(stream.try_clone().unwrap());
    (reader, FrameWriter::new(stream))
}

fn next_json(reader: &mut FrameReader<TcpStream>) -> Value {
    let frame = reader.read_frame().expect("frame should arrive");
    serde_json::from_slice(&frame).expect("frame should be json")
}

fn wait_exit(child: &mut Child) -> i32 {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status.code().unwrap_or(-1);
        }
        if start.elapsed() > WAIT {
            let _ = child.kill();
            panic!("commlink did not exit");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn version_prints_name_and_version() {
    let output = commlink().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("commlink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn send_delivers_envelope_and_prints_reply() {
    let (listener, port) = listen();

    let server = thread::spawn(move || {
        let stream = accept_within(&listener, WAIT);
        let (mut reader, mut writer) = split(stream);
        let received = next_json(&mut reader);
        writer.send(b"pong").unwrap();
        received
    });

    let output = commlink()
        .args(["--format", "json", "send", "127.0.0.1", "--port", &port])
        .args(["--data", "ping", "--wait", "--poll-interval", "50ms"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        server.join().unwrap(),
        json!({"action": "data", "data": "ping"})
    );

    let line: Value = serde_json::from_slice(&output.stdout).expect("stdout should be json");
    assert_eq!(line["channel"], "tcp");
    assert_eq!(line["payload"], "pong");
    assert_eq!(line["payload_size"], 4);
}

#[test]
fn send_without_reply_times_out() {
    let (listener, port) = listen();
    let server = thread::spawn(move || {
        let stream = accept_within(&listener, WAIT);
        let (mut reader, _writer) = split(stream);
        next_json(&mut reader);
        thread::sleep(Duration::from_millis(500));
    });

    let output = commlink()
        .args(["send", "127.0.0.1", "--port", &port, "--data", "x"])
        .args(["--wait", "--wait-timeout", "200ms", "--poll-interval", "50ms"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(124));
    server.join().unwrap();
}

#[test]
fn send_to_closed_port_fails() {
    let (listener, port) = listen();
    drop(listener);

    let output = commlink()
        .args(["send", "127.0.0.1", "--port", &port, "--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn connect_maps_input_lines_to_actions() {
    let (listener, port) = listen();
    let mut child = commlink()
        .args(["--format", "json", "connect", "127.0.0.1", "--port", &port])
        .args(["--poll-interval", "50ms", "--user", r#"{"name":"ana"}"#])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("connect should start");

    let stream = accept_within(&listener, WAIT);
    let (mut reader, mut writer) = split(stream);
    assert_eq!(
        next_json(&mut reader),
        json!({"action": "update_user", "data": "{\"name\":\"ana\"}"})
    );

    writer.send(b"Welcome!").unwrap();

    let mut stdin = child.stdin.take().unwrap();
    stdin
        .write_all(b"hello\n\ntotcp:everyone\nlist\n")
        .unwrap();

    assert_eq!(next_json(&mut reader), json!({"action": "data", "data": "hello"}));
    assert_eq!(
        next_json(&mut reader),
        json!({"action": "broadcast", "data": "totcp:everyone"})
    );
    assert_eq!(next_json(&mut reader), json!({"action": "list_clients", "data": ""}));

    stdin.write_all(b"quit\n").unwrap();
    assert_eq!(wait_exit(&mut child), 0);

    let mut stdout = String::new();
    child.stdout.take().unwrap().read_to_string(&mut stdout).unwrap();
    assert!(stdout.contains("Welcome!"), "stdout: {stdout}");
}

#[test]
fn connect_opens_udp_channel_on_request() {
    let (listener, port) = listen();
    let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
    udp.set_read_timeout(Some(WAIT)).unwrap();
    let udp_port = udp.local_addr().unwrap().port();

    let mut child = commlink()
        .args(["--format", "json", "connect", "127.0.0.1", "--port", &port])
        .args(["--udp", "--poll-interval", "50ms"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("connect should start");

    let stream = accept_within(&listener, WAIT);
    let (mut reader, mut writer) = split(stream);
    assert_eq!(
        next_json(&mut reader),
        json!({"action": "create_udp_channel", "data": ""})
    );
    let announce = json!({"action": "create_udp_channel", "data": udp_port.to_string()});
    writer.send(announce.to_string().as_bytes()).unwrap();

    let mut buf = [0u8; 2048];
    let (n, client_addr) = udp.recv_from(&mut buf).expect("bootstrap should arrive");
    assert_eq!(&buf[..n], b"010011000111");

    udp.send_to(b"over udp", client_addr).unwrap();

    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"toudp:fast\n").unwrap();
    let (n, _) = udp.recv_from(&mut buf).expect("datagram should arrive");
    assert_eq!(&buf[..n], b"toudp:fast");

    stdin.write_all(b"quit\n").unwrap();
    assert_eq!(wait_exit(&mut child), 0);

    let mut stdout = String::new();
    child.stdout.take().unwrap().read_to_string(&mut stdout).unwrap();
    let udp_line = stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find(|value| value["channel"] == "udp")
        .expect("udp payload should be printed");
    assert_eq!(udp_line["payload"], "over udp");
}

#[test]
fn connect_exits_when_server_goes_away() {
    let (listener, port) = listen();
    let mut child = commlink()
        .args(["connect", "127.0.0.1", "--port", &port, "--poll-interval", "50ms"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("connect should start");

    let stream = accept_within(&listener, WAIT);
    drop(stream);

    assert_eq!(wait_exit(&mut child), 1);
    let mut stderr = String::new();
    child.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();
    assert!(stderr.contains("connection to 127.0.0.1"), "stderr: {stderr}");
    drop(child.stdin.take());
}
