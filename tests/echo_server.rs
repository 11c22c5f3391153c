use riptide::{Buffer, Protocol, Server, ServerConfig, ServerHandle, Trigger};

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread::JoinHandle;
use std::time::Duration;

/// Minimal protocol collaborator: echo everything back, keep the connection.
struct Echo;

impl Protocol for Echo {
    fn process(&mut self, input: &mut Buffer, output: &mut Buffer) -> bool {
        let data = input.peek().to_vec();
        input.retrieve(data.len());
        output.append(&data);
        true
    }
}

fn start(config: ServerConfig) -> (ServerHandle, u16, JoinHandle<()>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut server = Server::new(config, |_peer| Box::new(Echo)).expect("server setup");
    let port = server.local_port().expect("local port");
    let handle = server.handle();
    let join = std::thread::spawn(move || {
        server.run().expect("event loop");
    });
    (handle, port, join)
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    stream
}

#[test]
fn echoes_a_small_request() {
    let (handle, port, join) = start(ServerConfig::new());

    let mut client = connect(port);
    client.write_all(b"hello").expect("write");

    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).expect("read echo");
    assert_eq!(&buf, b"hello");

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn echoes_a_payload_larger_than_the_initial_buffer() {
    let (handle, port, join) = start(ServerConfig::new());

    // 10 KiB against the 1 KiB initial read buffer exercises the vectored
    // overflow path end to end.
    let payload: Vec<u8> = (0..10 * 1024).map(|i| (i % 239) as u8).collect();

    let mut client = connect(port);
    client.write_all(&payload).expect("write payload");

    let mut got = vec![0u8; payload.len()];
    client.read_exact(&mut got).expect("read echo");
    assert_eq!(got, payload);

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn active_connection_survives_the_idle_reaper() {
    let config = ServerConfig::new().idle_timeout(Duration::from_millis(400));
    let (handle, port, join) = start(config);

    let mut client = connect(port);

    // Touch the connection every timeout/2: the sliding window must keep it
    // alive well past several timeout intervals.
    for _ in 0..6 {
        std::thread::sleep(Duration::from_millis(200));
        client.write_all(b"X").expect("heartbeat write");
        let mut byte = [0u8; 1];
        client.read_exact(&mut byte).expect("heartbeat echo");
        assert_eq!(&byte, b"X");
    }

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn silent_connection_is_reaped() {
    let config = ServerConfig::new().idle_timeout(Duration::from_millis(300));
    let (handle, port, join) = start(config);

    let mut client = connect(port);
    client.write_all(b"warmup").expect("write");
    let mut buf = [0u8; 6];
    client.read_exact(&mut buf).expect("echo");

    // Stay silent past the timeout: the server must close the socket, which
    // the client observes as a clean EOF.
    let mut rest = Vec::new();
    let n = client.read_to_end(&mut rest).expect("read until close");
    assert_eq!(n, 0);

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn serves_many_concurrent_clients() {
    let (handle, port, join) = start(ServerConfig::new().workers(4));

    let clients: Vec<JoinHandle<()>> = (0..8)
        .map(|i| {
            std::thread::spawn(move || {
                let mut client = connect(port);
                for round in 0..20 {
                    let msg = format!("client-{i}-round-{round}");
                    client.write_all(msg.as_bytes()).expect("write");
                    let mut got = vec![0u8; msg.len()];
                    client.read_exact(&mut got).expect("read");
                    assert_eq!(got, msg.as_bytes());
                }
            })
        })
        .collect();

    for c in clients {
        c.join().unwrap();
    }

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn inline_processing_without_workers() {
    let (handle, port, join) = start(ServerConfig::new().workers(0));

    let mut client = connect(port);
    client.write_all(b"inline").expect("write");
    let mut buf = [0u8; 6];
    client.read_exact(&mut buf).expect("read echo");
    assert_eq!(&buf, b"inline");

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn level_triggered_mode_round_trips() {
    let config = ServerConfig::new()
        .listen_trigger(Trigger::Level)
        .conn_trigger(Trigger::Level);
    let (handle, port, join) = start(config);

    let mut client = connect(port);
    client.write_all(b"level").expect("write");
    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).expect("read echo");
    assert_eq!(&buf, b"level");

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn shutdown_stops_the_loop_and_closes_connections() {
    let (handle, port, join) = start(ServerConfig::new());

    let mut client = connect(port);
    client.write_all(b"bye").expect("write");
    let mut buf = [0u8; 3];
    client.read_exact(&mut buf).expect("read echo");

    handle.shutdown();
    join.join().unwrap();

    // The server closed its end on the way out.
    let mut rest = Vec::new();
    let n = client.read_to_end(&mut rest).unwrap_or(0);
    assert_eq!(n, 0);
}
