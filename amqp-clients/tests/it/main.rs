mod connector;
mod helper;
mod reconnect;

use std::sync::Arc;
use std::time::Duration;

use amqp_clients::ClientConfiguration;

pub fn config<F: FnOnce(&mut ClientConfiguration)>(f: F) -> Arc<ClientConfiguration> {
    let mut config = ClientConfiguration {
        address: "test_queue".to_owned(),
        ..Default::default()
    };

    f(&mut config);

    Arc::new(config)
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
