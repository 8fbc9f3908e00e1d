use std::{net::Ipv6Addr, time::Duration};

use tokio::time::timeout;
use wisock::{
    Error, RemoteAddress, SocketKind, SocketState,
    registry::{Notice, Registry, StackEvent, render_socket_table},
    service::SocketService,
    stack::{StackOp, Status, mock::MockStack},
};

fn peer() -> Ipv6Addr {
    "2001:db8::1".parse().unwrap()
}

#[tokio::test]
async fn commands_and_events_share_one_queue() {
    let _ = env_logger::builder().is_test(true).try_init();

    let stack = MockStack::new();
    let (hdl, mut notices, join) = SocketService::spawn(Registry::<_, 4>::new(stack.clone()));

    let srv = hdl.tcp_server(5002).await.unwrap();
    assert_eq!(srv.state, SocketState::Listening);

    stack.queue_accept(peer(), 40_001);
    hdl.deliver(StackEvent::ConnectionAvailable { id: srv.id })
        .await
        .unwrap();
    // the event was queued before this command, so it has been handled
    let list = hdl.list().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[1].kind, SocketKind::TcpClient);
    let peer_id = list[1].id;

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.to_string(), "[Accepted 2001:db8::1 (40001): 2]");

    hdl.deliver(StackEvent::Data {
        id: peer_id,
        remote_address: peer(),
        remote_port: 40_001,
        data: b"hello".to_vec(),
    })
    .await
    .unwrap();
    assert_eq!(
        notices.recv().await.unwrap().to_string(),
        "[Data from 2001:db8::1 (40001): 2,5\nhello]"
    );

    assert_eq!(hdl.write(peer_id, b"world").await, Ok(5));
    assert_eq!(
        hdl.write(srv.id, b"x").await,
        Err(Error::NotWritable(SocketKind::TcpServer))
    );

    drop(hdl);
    let reg = join.await.unwrap();
    assert_eq!(reg.list().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handles_from_many_tasks() {
    let _ = env_logger::builder().is_test(true).try_init();

    let stack = MockStack::new();
    let (hdl, _notices, join) = SocketService::spawn(Registry::<_, 8>::new(stack.clone()));

    let mut tasks = Vec::new();
    for port in 1..=12u16 {
        let hdl = hdl.clone();
        tasks.push(tokio::spawn(async move { hdl.udp_server(port).await }));
    }

    let mut opened = 0;
    let mut full = 0;
    for t in tasks {
        match t.await.unwrap() {
            Ok(_) => opened += 1,
            Err(Error::RegistryFull) => full += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(opened, 8);
    assert_eq!(full, 4);
    assert_eq!(stack.open_sockets().len(), 8);

    let table = render_socket_table(&hdl.list().await.unwrap());
    assert_eq!(table.lines().count(), 10);

    drop(hdl);
    timeout(Duration::from_secs(5), join)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn errors_cross_the_channel() {
    let stack = MockStack::new();
    let (hdl, mut notices, _join) = SocketService::spawn(Registry::<_, 2>::new(stack.clone()));

    let Err(refused) = Status::from_raw(0x4F) else {
        panic!("0x4F is an error code");
    };
    stack.fail_next(StackOp::Connect, refused);
    let err = hdl
        .udp_client(RemoteAddress::Literal(peer()), 9)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unable to connect a socket: 79");
    assert!(stack.open_sockets().is_empty());

    let c = hdl
        .tcp_client(RemoteAddress::Literal(peer()), 9)
        .await
        .unwrap();
    hdl.deliver(StackEvent::Connected {
        id: c.id,
        status: Err(Status::Timeout),
    })
    .await
    .unwrap();
    assert_eq!(notices.recv().await, Some(Notice::OpenFailed(Status::Timeout)));
    assert!(hdl.list().await.unwrap().is_empty());

    assert_eq!(
        hdl.set_option(c.id, "event_mode", "polling").await,
        Err(Error::UnknownSocket(c.id))
    );
    assert_eq!(hdl.option_names().count(), 4);
}
