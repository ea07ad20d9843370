use amqp_clients::{Connector, ObjectControl, OpenCounters};
use amqp_engine::{ConnectionDetails, Message};

use crate::helper::{Behaviour, Call, MockFactory};
use crate::{config, millis};

fn flags(s: &str) -> ObjectControl {
    s.parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn opens_and_closes_connections_only() {
    let mut factory = MockFactory::new(Behaviour::default());
    let mut connector = Connector::new(config(|c| {
        c.count = 5;
        c.timeout = millis(1000);
    }));

    let results = connector.run(&mut factory).await.unwrap();

    assert_eq!(results.connections, OpenCounters { open: 5, error: 0 });
    assert_eq!(results.senders, OpenCounters::default());
    assert_eq!(results.receivers, OpenCounters::default());
    assert_eq!(factory.handles.len(), 5);

    for handle in &factory.handles {
        assert_eq!(handle.closes(), 1);
        assert_eq!(handle.count(|c| matches!(c, Call::OpenSender(..) | Call::OpenReceiver(..))), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn links_send_and_receive_on_every_connection() {
    let mut factory = MockFactory::new(Behaviour {
        sender_credit: 1,
        queue: vec![Message::from("queued")],
        ..Default::default()
    });
    let mut connector = Connector::new(config(|c| {
        c.count = 2;
        c.timeout = millis(1000);
        c.connector.obj_ctrl = flags("CSR");
    }));

    let results = connector.run(&mut factory).await.unwrap();

    assert_eq!(results.connections.open, 2);
    assert_eq!(results.senders.open, 2);
    assert_eq!(results.receivers.open, 2);
    assert_eq!(results.sent, 2);
    assert_eq!(results.received, 2);
    assert_eq!(connector.results(), &results);

    for handle in &factory.handles {
        assert_eq!(handle.count(|c| matches!(c, Call::Accept(_))), 1);
        assert_eq!(handle.count(|c| matches!(c, Call::Detach(_))), 2);
        assert_eq!(handle.closes(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn links_stay_open_without_their_flags() {
    let mut factory = MockFactory::new(Behaviour::default());
    let mut connector = Connector::new(config(|c| {
        c.count = 1;
        c.timeout = millis(500);
        c.connector.obj_ctrl = flags("SR");
    }));

    let results = connector.run(&mut factory).await.unwrap();
    let handle = &factory.handles[0];

    assert_eq!(results.senders.open, 1);
    assert_eq!(results.receivers.open, 1);
    assert_eq!(handle.count(|c| matches!(c, Call::Detach(_))), 2);
    assert_eq!(handle.closes(), 0);
}

#[tokio::test(start_paused = true)]
async fn container_failure_is_counted() {
    let mut factory = MockFactory::new(Behaviour::default());
    factory.fail_at = Some(1);

    let mut connector = Connector::new(config(|c| {
        c.count = 3;
        c.timeout = millis(100);
    }));

    let results = connector.run(&mut factory).await.unwrap();

    assert_eq!(results.connections, OpenCounters { open: 2, error: 1 });
    assert_eq!(factory.handles.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sender_failure_is_counted() {
    let mut factory = MockFactory::new(Behaviour {
        fail_open_sender: true,
        ..Default::default()
    });
    let mut connector = Connector::new(config(|c| {
        c.count = 2;
        c.timeout = millis(100);
        c.connector.obj_ctrl = flags("CS");
    }));

    let results = connector.run(&mut factory).await.unwrap();

    assert_eq!(results.connections.open, 2);
    assert_eq!(results.senders, OpenCounters { open: 0, error: 2 });
}

#[tokio::test(start_paused = true)]
async fn infinite_send_sends_every_second() {
    let mut factory = MockFactory::new(Behaviour {
        sender_credit: 100,
        ..Default::default()
    });
    let mut connector = Connector::new(config(|c| {
        c.count = 1;
        c.timeout = millis(3500);
        c.connector.obj_ctrl = flags("CS");
        c.connector.infinite_send = true;
    }));

    let results = connector.run(&mut factory).await.unwrap();

    // One on attach, then at 1s, 2s and 3s.
    assert_eq!(results.sent, 4);
    assert_eq!(factory.handles[0].sent_messages()[3].body, Message::from("test message 3").body);
}

#[tokio::test(start_paused = true)]
async fn disconnects_move_to_the_next_failover_host() {
    let mut factory = MockFactory::new(Behaviour {
        disconnects: 2,
        ..Default::default()
    });
    let mut connector = Connector::new(config(|c| {
        c.count = 1;
        c.timeout = millis(100);
        c.connection.broker = "a:5672".into();
        c.connection.conn_urls = Some("b:5673,c:5674".into());
        c.connection.reconnect.limit = Some(3);
    }));

    let results = connector.run(&mut factory).await.unwrap();
    let handle = &factory.handles[0];

    let ConnectionDetails::Failover(resolver) = handle.params().remove(0).details else {
        panic!("not a failover target");
    };

    assert_eq!(resolver().host, "c");
    assert_eq!(results.connections, OpenCounters { open: 1, error: 0 });
    assert_eq!(handle.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_limit_gives_up_one_connection() {
    let mut factory = MockFactory::new(Behaviour {
        disconnects: 2,
        ..Default::default()
    });
    let mut connector = Connector::new(config(|c| {
        c.count = 2;
        c.timeout = millis(100);
        c.connection.reconnect.limit = Some(2);
        c.connector.obj_ctrl = flags("CS");
    }));

    let results = connector.run(&mut factory).await.unwrap();

    assert_eq!(results.connections, OpenCounters { open: 2, error: 2 });

    for handle in &factory.handles {
        // Closed when given up, nothing left to tear down at the deadline.
        assert_eq!(handle.closes(), 1);
        assert_eq!(handle.count(|c| matches!(c, Call::Detach(_))), 0);
    }
}
