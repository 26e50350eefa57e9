use rstest::{fixture, rstest};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::*;
use crate::{
    codec::{Outbound, ProtocolCodec},
    connection::Command,
    envelope::UserName,
};

struct Peer {
    handle: ConnectionHandle,
    rx: UnboundedReceiver<Command>,
}

impl Peer {
    fn new(addr: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: ConnectionHandle::new(addr, tx),
            rx,
        }
    }

    fn drain(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    fn envelopes(&mut self) -> Vec<Envelope> {
        self.drain()
            .into_iter()
            .filter_map(|cmd| match cmd {
                Command::Send(Outbound::Payload(bytes)) => {
                    Some(Envelope::from_slice(&bytes).expect("valid envelope"))
                }
                _ => None,
            })
            .collect()
    }
}

fn http(request: &str) -> HttpMessage {
    HttpCodec::new()
        .decode(request.as_bytes())
        .expect("valid request")
}

fn raw_text(cmd: &Command) -> String {
    match cmd {
        Command::Send(Outbound::Raw(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
        other => panic!("expected raw bytes, got {other:?}"),
    }
}

#[fixture]
fn gateway() -> Gateway { Gateway::new(GatewayConfig::default()) }

fn register(gateway: &Gateway, provider: &mut Peer, routes: &[&str]) {
    let data = serde_json::json!({ "name": "user", "route": routes }).to_string();
    gateway.handle_inner(&provider.handle, Envelope::request("", ACTION_REGISTER, data));
    let replies = provider.envelopes();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].data, REGISTER_OK);
}

#[rstest]
fn registration_is_acknowledged(gateway: Gateway) {
    let mut provider = Peer::new("10.0.0.2:6000");
    let data = r#"{"name":"user","route":["/api/user_name","/api/user_level"]}"#;
    gateway.handle_inner(
        &provider.handle,
        Envelope::request("", ACTION_REGISTER, data),
    );

    let replies = provider.envelopes();
    assert_eq!(
        replies,
        [Envelope::response("", ACTION_REGISTER, REGISTER_OK)]
    );
    assert_eq!(
        gateway.registry().providers("/api/user_level"),
        ["10.0.0.2:6000"]
    );
    assert_eq!(gateway.registry().provider_count(), 1);
}

#[rstest]
#[case("not an object")]
#[case(r#"{"name":"user","route":[]}"#)]
fn unusable_registration_is_refused_and_closed(gateway: Gateway, #[case] data: &str) {
    let mut provider = Peer::new("10.0.0.2:6000");
    gateway.handle_inner(
        &provider.handle,
        Envelope::request("", ACTION_REGISTER, data),
    );

    let commands = provider.drain();
    assert_eq!(commands.len(), 2);
    let Command::Send(Outbound::Payload(bytes)) = &commands[0] else {
        panic!("expected an envelope reply");
    };
    let reply = Envelope::from_slice(bytes).expect("envelope");
    assert_eq!(reply.kind, EnvelopeType::Response);
    assert!(reply.data.starts_with("registration err"));
    assert!(matches!(commands[1], Command::Close));
    assert_eq!(gateway.registry().provider_count(), 0);
}

#[rstest]
fn request_round_trips_through_a_provider(gateway: Gateway) {
    let mut provider = Peer::new("10.0.0.2:6000");
    register(&gateway, &mut provider, &["/api/user_name"]);

    let mut external = Peer::new("192.168.1.7:5123");
    gateway.handle_open(
        &external.handle,
        &http("GET /api/user_name?id=1 HTTP/1.1\r\nHost: x\r\n\r\n"),
    );
    assert_eq!(gateway.registry().open_count(), 1);

    let forwarded = provider.envelopes();
    assert_eq!(forwarded.len(), 1);
    let request = &forwarded[0];
    assert_eq!(request.id, "192.168.1.7:5123");
    assert_eq!(request.kind, EnvelopeType::Request);
    assert_eq!(request.action, "/api/user_name");
    assert_eq!(request.data, r#"{"id":1}"#);

    let answer = UserName {
        id: 1,
        name: "aaa".into(),
    };
    let data = serde_json::to_string(&answer).expect("encode");
    gateway.handle_inner(
        &provider.handle,
        request.clone().into_response(data.clone()),
    );

    let commands = external.drain();
    assert_eq!(commands.len(), 2);
    let reply = raw_text(&commands[0]);
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(reply.ends_with(&data));
    assert!(matches!(commands[1], Command::Close));
    assert_eq!(gateway.registry().open_count(), 0);
}

#[rstest]
fn unknown_route_gets_400_and_close(gateway: Gateway) {
    let mut external = Peer::new("192.168.1.7:5123");
    gateway.handle_open(&external.handle, &http("GET /nope HTTP/1.1\r\n\r\n"));

    let commands = external.drain();
    assert_eq!(commands.len(), 2);
    let reply = raw_text(&commands[0]);
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(reply.ends_with(ROUTE_NOT_FOUND_BODY));
    assert!(matches!(commands[1], Command::Close));
    assert_eq!(gateway.registry().open_count(), 0);
}

#[rstest]
fn vanished_provider_gets_500(gateway: Gateway) {
    let mut provider = Peer::new("10.0.0.2:6000");
    register(&gateway, &mut provider, &["/r"]);
    drop(provider);

    let mut external = Peer::new("192.168.1.7:5123");
    gateway.handle_open(&external.handle, &http("GET /r HTTP/1.1\r\n\r\n"));

    let commands = external.drain();
    assert!(raw_text(&commands[0]).starts_with("HTTP/1.1 500 "));
    assert_eq!(gateway.registry().open_count(), 0);
}

#[rstest]
fn uncorrelated_responses_are_ignored(gateway: Gateway) {
    assert!(!gateway.correlate(&Envelope::response("nobody", "/r", "{}")));
}

#[rstest]
fn pong_is_not_correlated(gateway: Gateway) {
    let mut external = Peer::new("10.0.0.2:6000");
    gateway
        .registry()
        .track_open("10.0.0.2:6000", external.handle.clone());
    let provider = Peer::new("10.0.0.2:6000");
    gateway.handle_inner(
        &provider.handle,
        Envelope::response("10.0.0.2:6000", ACTION_PONG, "1"),
    );
    assert!(external.drain().is_empty());
    assert_eq!(gateway.registry().open_count(), 1);
}

#[test]
fn query_values_keep_their_json_kind() {
    let msg = http("GET /q?id=7&name=bob&neg=-3 HTTP/1.1\r\n\r\n");
    assert_eq!(query_data(&msg), r#"{"id":7,"name":"bob","neg":-3}"#);
}

#[test]
fn request_without_query_sends_empty_object() {
    assert_eq!(query_data(&http("GET /q HTTP/1.1\r\n\r\n")), "{}");
}
