use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::Arc,
};

use parking_lot::Mutex;
use strand::{
    ThreadState, WorkerError,
    communication::{Message, MessageKind},
    logger::{LogSettings, LoggerWorker},
    registry,
    shutdown::{request_shutdown, shutdown_signalled},
    supervisor::{
        self, ThreadConfig, Worker, WorkerContext, WorkerSpec, service_queue, start_threads,
    },
    timing::{Instant, Millis},
    utils::Label,
};
use strand_network::{ClientConnector, ClientSettings};

const PORT: u16 = 47917;

struct Collector {
    seen: Arc<Mutex<Vec<Message>>>,
}

impl Worker for Collector {
    fn run(&mut self, cx: &WorkerContext) -> Result<(), WorkerError> {
        while !shutdown_signalled() {
            service_queue(self, cx)?;
            cx.idle();
        }
        Ok(())
    }

    fn on_message(&mut self, msg: &Message) -> Result<(), WorkerError> {
        self.seen.lock().push(*msg);
        Ok(())
    }
}

fn wait_for<F: Fn() -> bool>(budget: Millis, cond: F) -> bool {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    false
}

#[test]
fn client_relays_and_reconnects() {
    let settings = LogSettings { screen: false, ..LogSettings::default() };
    strand::logger::init(&settings).unwrap();
    supervisor::register_current("MAIN").unwrap();

    let listener = TcpListener::bind(("127.0.0.1", PORT)).unwrap();

    let sink = Label::new("CLIENT.SINK").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client_settings = ClientSettings {
        hostname: "127.0.0.1".to_string(),
        port: PORT,
        backoff_initial: Millis(100),
        backoff_max: Millis::from_secs(2),
        retry_limit: 0,
        thread_wait: Millis::from_secs(2),
        io_timeout: Millis(100),
        relay_enabled: true,
        peer_queue: Some(sink),
    };

    start_threads(
        vec![
            LoggerWorker::spec(settings),
            WorkerSpec::new(
                Collector { seen: seen.clone() },
                ThreadConfig::new("CLIENT.SINK").unwrap(),
            ),
            ClientConnector::spec(client_settings),
        ],
        &[],
    )
    .unwrap();

    // First connection: traffic flows both ways through the duplex pair.
    let (mut served, _) = listener.accept().unwrap();
    served.write_all(b"from-the-server").unwrap();
    assert!(wait_for(Millis::from_secs(5), || !seen.lock().is_empty()));
    assert_eq!(seen.lock()[0].content(), b"from-the-server");
    assert_eq!(seen.lock()[0].kind(), MessageKind::Relay);

    let send_label = Label::new("CLIENT.SEND").unwrap();
    assert!(wait_for(Millis::from_secs(2), || {
        registry().get_state(send_label) == ThreadState::Running
    }));
    let msg = Message::new(MessageKind::Data, b"hi").unwrap();
    registry().push_message(send_label, &msg, Millis::from_secs(1)).unwrap();
    let mut buf = [0u8; 8];
    served.set_read_timeout(Some(std::time::Duration::from_secs(5))).unwrap();
    let n = served.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hi");

    // Dropping the served end forces a reconnect; the next session's
    // workers come up under the indexed labels.
    drop(served);
    let (_served2, _) = listener.accept().unwrap();
    let send2 = Label::new("CLIENT.SEND.1").unwrap();
    assert!(wait_for(Millis::from_secs(5), || {
        registry().get_state(send2) == ThreadState::Running
    }));

    request_shutdown();
    registry().wait_others(Millis::from_secs(5)).unwrap();
    supervisor::deregister_current();
}
