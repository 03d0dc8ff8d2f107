//! Connect, ask for a UDP channel, say hello on both channels, then close.
//!
//! Run against a server on 127.0.0.1:2021:
//! `cargo run -p commlink --example chat-client -- 127.0.0.1 2021`

use std::thread;
use std::time::Duration;

use commlink::client::{ClientError, Endpoint, Handlers, Transport, TransportConfig};

fn main() -> Result<(), ClientError> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(2021);

    let handlers = Handlers::new()
        .on_data(|msg| println!("tcp <- {}", String::from_utf8_lossy(&msg)))
        .on_datagram(|pkt| println!("udp <- {}", String::from_utf8_lossy(&pkt)));
    let transport = Transport::new(Endpoint::new(host, port), TransportConfig::default(), handlers);

    transport.connect()?;
    transport.request_udp_channel()?;
    transport.send_data("hello over tcp")?;

    for _ in 0..20 {
        if transport.udp_is_open() {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    if transport.udp_is_open() {
        transport.send_udp(b"hello over udp")?;
    } else {
        println!("server did not open a udp channel");
    }

    thread::sleep(Duration::from_secs(1));
    transport.close();
    Ok(())
}
