use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use commlink_client::{Handlers, Transport};
use tracing::{debug, warn};

use crate::cmd::{require_json, ConnectArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_payload, Channel, OutputFormat};

/// How often the input loop checks that the reliable channel is alive.
const LIVENESS_INTERVAL: Duration = Duration::from_millis(200);

const TCP_PREFIX: &str = "totcp:";
const UDP_PREFIX: &str = "toudp:";

const HELP: &str = "\
commands:
  quit            close the connection and exit
  help            show this message
  list            ask the server for its client list
  totcp:<text>    broadcast the line to other clients
  toudp:<text>    send the line over the udp channel
  <text>          send the line as data";

enum Event {
    Received(Channel, Bytes),
    Line(String),
    InputClosed,
    Interrupted,
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Help,
    List,
    Broadcast(&'a str),
    Udp(&'a str),
    Data(&'a str),
}

fn parse_line(line: &str) -> Option<Input<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    Some(match line.trim() {
        "quit" => Input::Quit,
        "help" => Input::Help,
        "list" => Input::List,
        _ if line.starts_with(TCP_PREFIX) => Input::Broadcast(line),
        _ if line.starts_with(UDP_PREFIX) => Input::Udp(line),
        _ => Input::Data(line),
    })
}

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.server.transport_config()?;
    let endpoint = args.server.endpoint();
    if let Some(user) = &args.user {
        require_json("--user", user)?;
    }
    if let Some(status) = &args.status {
        require_json("--status", status)?;
    }

    let (events, inbox) = mpsc::channel();
    let transport = Transport::new(endpoint.clone(), config, handlers(&events));
    transport
        .connect()
        .map_err(|err| client_error("connect failed", err))?;

    if let Some(user) = &args.user {
        transport
            .update_user(user)
            .map_err(|err| client_error("update_user failed", err))?;
    }
    if let Some(status) = &args.status {
        transport
            .update_status(status)
            .map_err(|err| client_error("update_status failed", err))?;
    }
    if args.udp {
        transport
            .request_udp_channel()
            .map_err(|err| client_error("udp channel request failed", err))?;
    }

    install_ctrlc_handler(events.clone())?;
    spawn_stdin_reader(events)?;

    let peer = endpoint.to_string();
    let code = input_loop(&transport, &inbox, &peer, format);
    transport.close();
    Ok(code)
}

fn handlers(events: &Sender<Event>) -> Handlers {
    let tcp = events.clone();
    let udp = events.clone();
    Handlers::new()
        .on_data(move |payload| {
            let _ = tcp.send(Event::Received(Channel::Tcp, payload));
        })
        .on_datagram(move |payload| {
            let _ = udp.send(Event::Received(Channel::Udp, payload));
        })
}

fn input_loop(
    transport: &Transport,
    inbox: &Receiver<Event>,
    peer: &str,
    format: OutputFormat,
) -> i32 {
    loop {
        if !transport.is_connected() {
            drain_received(inbox, peer, format);
            eprintln!("connection to {peer} lost");
            return FAILURE;
        }

        let event = match inbox.recv_timeout(LIVENESS_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return SUCCESS,
        };

        match event {
            Event::Received(channel, payload) => print_payload(channel, peer, &payload, format),
            Event::Line(line) => {
                if !handle_line(transport, &line) {
                    return SUCCESS;
                }
            }
            Event::InputClosed => {
                debug!("stdin closed");
                return SUCCESS;
            }
            Event::Interrupted => {
                debug!("interrupted");
                return SUCCESS;
            }
        }
    }
}

/// Act on one input line. Returns `false` when the user asked to quit.
fn handle_line(transport: &Transport, line: &str) -> bool {
    let Some(input) = parse_line(line) else {
        return true;
    };

    let result = match input {
        Input::Quit => return false,
        Input::Help => {
            println!("{HELP}");
            return true;
        }
        Input::List => transport.list_clients(),
        Input::Broadcast(text) => transport.broadcast(text),
        Input::Udp(text) => {
            if !transport.has_udp_channel() {
                eprintln!("no udp channel (start with --udp)");
            }
            transport.send_udp(text.as_bytes())
        }
        Input::Data(text) => transport.send_data(text),
    };

    if let Err(err) = result {
        warn!(error = %err, "send failed");
    }
    true
}

fn drain_received(inbox: &Receiver<Event>, peer: &str, format: OutputFormat) {
    while let Ok(event) = inbox.try_recv() {
        if let Event::Received(channel, payload) = event {
            print_payload(channel, peer, &payload, format);
        }
    }
}

fn spawn_stdin_reader(events: Sender<Event>) -> CliResult<()> {
    thread::Builder::new()
        .name("commlink-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if events.send(Event::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = events.send(Event::InputClosed);
        })
        .map(|_| ())
        .map_err(|err| CliError::new(INTERNAL, format!("stdin reader spawn failed: {err}")))
}

fn install_ctrlc_handler(events: Sender<Event>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = events.send(Event::Interrupted);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
