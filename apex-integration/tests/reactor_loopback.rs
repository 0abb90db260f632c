use apex_integration::reactor::{Reactor, TcpConnection};
use parking_lot::Mutex;
use std::{
    sync::{mpsc, Arc},
    time::Duration,
};

/// Accept one connection, echo frames back, exercise read/write/EOF paths end to end over
/// loopback sockets.
#[test]
fn test_connect_write_read_eof_round_trip() {
    let reactor = Reactor::new().unwrap();

    let server_conn: Arc<Mutex<Option<TcpConnection>>> = Arc::new(Mutex::new(None));
    let (accept_tx, accept_rx) = mpsc::channel();

    let server_conn_store = Arc::clone(&server_conn);
    let listener = reactor
        .listen("127.0.0.1", 0, move |conn| {
            // echo everything until EOF
            let echo = conn.clone();
            conn.start_read(move |result| {
                if let Ok(bytes) = result {
                    if !bytes.is_empty() {
                        let _ = echo.write(&bytes);
                    }
                }
            })
            .unwrap();

            *server_conn_store.lock() = Some(conn);
            accept_tx.send(()).unwrap();
        })
        .unwrap();

    let port = listener.local_addr().port();

    let (connect_tx, connect_rx) = mpsc::channel();
    reactor.connect("127.0.0.1", port, Duration::from_secs(3), move |result| {
        connect_tx.send(result).unwrap();
    });

    let client = connect_rx
        .recv_timeout(Duration::from_secs(5))
        .unwrap()
        .unwrap();
    accept_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (read_tx, read_rx) = mpsc::channel();
    client
        .start_read(move |result| {
            read_tx.send(result.map(|b| b.to_vec())).unwrap();
        })
        .unwrap();

    client.write(b"hello reactor").unwrap();

    let mut echoed = Vec::new();
    while echoed.len() < 13 {
        let chunk = read_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .unwrap();
        echoed.extend_from_slice(&chunk);
    }
    assert_eq!(&echoed, b"hello reactor");

    // server closes: client observes EOF as an empty chunk
    server_conn.lock().as_ref().unwrap().close();
    let eof = read_rx
        .recv_timeout(Duration::from_secs(5))
        .unwrap()
        .unwrap();
    assert!(eof.is_empty());
    assert!(client.is_closed());

    reactor.sync_stop();
}

#[test]
fn test_connect_failure_reports_error() {
    let reactor = Reactor::new().unwrap();

    // bind then drop a listener so the port is very likely closed
    let closed_port = {
        let probe = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        probe.local_addr().unwrap().port()
    };

    let (tx, rx) = mpsc::channel();
    reactor.connect(
        "127.0.0.1",
        closed_port,
        Duration::from_secs(1),
        move |result| {
            tx.send(result.is_err()).unwrap();
        },
    );

    assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    reactor.sync_stop();
}
