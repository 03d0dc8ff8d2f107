use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use bytes::Bytes;
use commlink_client::{ControlEnvelope, Handlers, Transport};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_payload, Channel, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.server.transport_config()?;
    let endpoint = args.server.endpoint();

    let (replies_tx, replies) = mpsc::channel();
    let handlers = Handlers::new().on_data(move |payload| {
        let _ = replies_tx.send(payload);
    });
    let transport = Transport::new(endpoint.clone(), config, handlers);
    transport
        .connect()
        .map_err(|err| client_error("connect failed", err))?;

    let envelope = ControlEnvelope::new(args.action, args.data);
    transport
        .send_envelope(&envelope)
        .map_err(|err| client_error("send failed", err))?;

    let outcome = if args.wait {
        wait_for_reply(&replies, wait_timeout)
            .map(|reply| print_payload(Channel::Tcp, &endpoint.to_string(), &reply, format))
    } else {
        Ok(())
    };

    transport.close();
    outcome.map(|()| SUCCESS)
}

fn wait_for_reply(replies: &Receiver<Bytes>, timeout: Duration) -> CliResult<Bytes> {
    replies.recv_timeout(timeout).map_err(|_| {
        CliError::new(
            TIMEOUT,
            format!("no reply within {}ms", timeout.as_millis()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_reply_returns_first_message() {
        let (tx, rx) = mpsc::channel();
        tx.send(Bytes::from_static(b"first")).unwrap();
        tx.send(Bytes::from_static(b"second")).unwrap();

        let reply = wait_for_reply(&rx, Duration::from_millis(10)).unwrap();
        assert_eq!(reply.as_ref(), b"first");
    }

    #[test]
    fn wait_for_reply_times_out() {
        let (_tx, rx) = mpsc::channel::<Bytes>();
        let err = wait_for_reply(&rx, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }
}
