use amqp_clients::{ErrorKind, Sender};
use amqp_engine::{ConnectionDetails, ErrorCondition, Event};
use tokio::time::{sleep, Instant};

use crate::helper::{container, to_client_error, Behaviour, Call, MockHandle};
use crate::{config, millis};

fn disconnect(handle: &MockHandle) {
    handle.emit(Event::Disconnected {
        connection: handle.connection(),
        error: Some(ErrorCondition::new("amqp:connection:framing-error", "connection reset")),
    });
}

#[tokio::test(start_paused = true)]
async fn gives_up_when_limit_is_reached() {
    let (mut container, handle) = container(Behaviour::default());
    let mut sender = Sender::new(config(|c| {
        c.count = 5;
        c.connection.reconnect.limit = Some(3);
    }));

    let script = async {
        for _ in 0..2 {
            sleep(millis(100)).await;
            disconnect(&handle);
        }

        sleep(millis(100)).await;

        assert_eq!(handle.closes(), 0);

        disconnect(&handle);
    };

    let (result, _) = tokio::join!(sender.run(&mut container), script);

    assert_eq!(to_client_error(result).kind, ErrorKind::ReconnectLimit);
    assert_eq!(handle.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn failover_follows_disconnects_and_reattach_rearms_timeout() {
    let (mut container, handle) = container(Behaviour::default());
    let mut sender = Sender::new(config(|c| {
        c.count = 5;
        c.timeout = millis(1000);
        c.connection.broker = "a:5672".into();
        c.connection.conn_urls = Some("b:5673,c:5674".into());
    }));

    let start = Instant::now();

    let script = async {
        sleep(millis(100)).await;

        let ConnectionDetails::Failover(resolver) = handle.params().remove(0).details else {
            panic!("not a failover target");
        };

        assert_eq!(resolver().host, "a");

        disconnect(&handle);
        sleep(millis(2000)).await;

        // Disconnect cancelled the idle timeout.
        assert_eq!(handle.closes(), 0);
        assert_eq!(resolver().host, "b");
        assert_eq!(resolver().port, 5673);

        handle.emit(Event::SenderOpen {
            connection: handle.connection(),
            link: handle.sender_link(),
        });
    };

    let (result, _) = tokio::join!(sender.run(&mut container), script);

    result.unwrap();

    let closed = handle.times(|c| matches!(c, Call::Close(_)));

    assert_eq!(closed.len(), 1);
    assert!(closed[0] - start >= millis(3100));
    assert!(closed[0] - start < millis(3102));
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_close_grace_still_closes() {
    let (mut container, handle) = container(Behaviour {
        sender_credit: 10,
        ..Default::default()
    });
    let mut sender = Sender::new(config(|c| {
        c.count = 1;
        c.close_sleep = millis(500);
    }));

    let start = Instant::now();

    let script = async {
        sleep(millis(100)).await;
        disconnect(&handle);

        // The engine reconnects and the link comes back with fresh credit.
        handle.emit(Event::SenderOpen {
            connection: handle.connection(),
            link: handle.sender_link(),
        });
        handle.grant(handle.sender_link(), 10);
    };

    let (result, _) = tokio::join!(sender.run(&mut container), script);

    result.unwrap();

    let closed = handle.times(|c| matches!(c, Call::Close(_)));

    assert_eq!(handle.sent_messages().len(), 1);
    assert_eq!(closed.len(), 1);
    assert!(closed[0] - start >= millis(500));
    assert!(closed[0] - start < millis(502));
}

#[tokio::test(start_paused = true)]
async fn disconnect_without_reconnect_finishes() {
    let (mut container, handle) = container(Behaviour::default());
    let mut sender = Sender::new(config(|c| {
        c.count = 5;
        c.connection.reconnect.enabled = false;
    }));

    let script = async {
        sleep(millis(100)).await;
        disconnect(&handle);
    };

    let (result, _) = tokio::join!(sender.run(&mut container), script);

    result.unwrap();

    assert!(handle.sent_messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn forced_close_is_tolerated_other_errors_are_fatal() {
    let (mut container, handle) = container(Behaviour::default());
    let mut sender = Sender::new(config(|c| c.count = 5));

    let script = async {
        sleep(millis(100)).await;

        handle.emit(Event::ConnectionError {
            connection: handle.connection(),
            error: ErrorCondition::new("amqp:connection:forced", "broker shutdown"),
        });

        sleep(millis(100)).await;

        assert_eq!(handle.closes(), 0);

        handle.emit(Event::ConnectionError {
            connection: handle.connection(),
            error: ErrorCondition::new("amqp:unauthorized-access", "not authorized"),
        });
    };

    let (result, _) = tokio::join!(sender.run(&mut container), script);

    let err = to_client_error(result);

    assert_eq!(err.kind, ErrorKind::Connection);
    assert!(err.message.contains("not authorized"));
    assert_eq!(handle.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn protocol_error_is_fatal() {
    let (mut container, handle) = container(Behaviour::default());
    let mut sender = Sender::new(config(|c| c.count = 5));

    let script = async {
        sleep(millis(100)).await;

        handle.emit(Event::ProtocolError {
            connection: Some(handle.connection()),
            description: "unexpected frame".into(),
        });
    };

    let (result, _) = tokio::join!(sender.run(&mut container), script);

    let err = to_client_error(result);

    assert_eq!(err.kind, ErrorKind::Protocol);
    assert_eq!(handle.closes(), 1);
}
