use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use onion_binary_io::ToBytes;
use onion_core::config::*;
use onion_core::net::client::{self, ClientError};
use onion_core::net::server::{self, Service};
use onion_core::network::Network;
use onion_core::registry::RegistryClient;
use onion_crypto::RelayKeyPair;
use onion_packet::*;
use rand::thread_rng;
use tokio::sync::RwLock;

fn config(registry_port: u16, base_relay_port: u16, base_user_port: u16) -> NetworkConfig {
    NetworkConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ports: PortLayout { registry_port, base_relay_port, base_user_port },
        hop_timeout: Duration::from_secs(5),
    }
}

const TIMEOUT: Duration = Duration::from_secs(10);

/// Relay counters summed over the whole network: forwarded, delivered and
/// failed.
fn totals(network: &Network) -> (u64, u64, u64) {
    network.relays().iter().fold((0, 0, 0), |(forwarded, delivered, failed), relay| {
        let counters = &relay.stats().counters;
        (forwarded + counters.forwarded(), delivered + counters.delivered(), failed + counters.failed())
    })
}

/// Wait until the relays have passed every accepted layer on.
async fn wait_totals(network: &Network, expected: (u64, u64, u64)) {
    let start = Instant::now();
    while totals(network) != expected {
        assert!(start.elapsed() < TIMEOUT, "relay counters are {:?}, expected {:?}", totals(network), expected);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn send_message_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = config(18081, 14000, 13000);
    let network = Network::launch(config, 4, 2).await.unwrap();
    assert_eq!(network.registry().len().await, 4);

    for port in [18081, 14000, 14001, 14002, 14003, 13000, 13001] {
        let response = client::request(config.addr(port), Request::Status, TIMEOUT).await.unwrap();
        assert_eq!(response, Response::Live);
    }

    let request = Request::SendMessage { message: "hi".to_owned(), destination_user_id: 1 };
    let response = client::request(config.user_addr(0).unwrap(), request, TIMEOUT).await.unwrap();
    assert_eq!(response, Response::Sent);

    wait_totals(&network, (2, 1, 0)).await;

    let receiver = client::request(config.user_addr(1).unwrap(), Request::GetDiagnostics, TIMEOUT).await.unwrap();
    match receiver {
        Response::Diagnostics(snapshot) => assert_eq!(snapshot.last_received_message, Some("hi".to_owned())),
        response => panic!("Unexpected response: {:?}", response),
    }
    let sender = network.users()[0].diagnostics().snapshot().await;
    assert_eq!(sender.last_sent_message, Some("hi".to_owned()));
    assert_eq!(sender.last_received_message, None);

    // exactly one relay saw the plaintext next to the user port
    let mut exits = 0;
    for relay in network.relays() {
        let snapshot = relay.diagnostics().snapshot().await;
        if snapshot.last_destination == Some(13001) {
            assert_eq!(snapshot.last_received_decrypted, Some(b"hi".to_vec()));
            exits += 1;
        }
    }
    assert_eq!(exits, 1);
}

#[tokio::test]
async fn duplicate_registration_and_wrong_key() {
    let config = config(18082, 16000, 15000);
    let network = Network::launch(config, 3, 1).await.unwrap();

    let registry = RegistryClient::new(config.registry_addr(), TIMEOUT);
    let pk = RelayKeyPair::generate(&mut thread_rng()).pk;
    let error = registry.register(NodeRecord::new(1, pk)).await.unwrap_err();
    assert!(matches!(error, ClientError::Remote { kind: ErrorKind::DuplicateNode, .. }));
    assert_eq!(registry.list_nodes().await.unwrap().len(), 3);

    let stranger = RelayKeyPair::generate(&mut thread_rng());
    let layer = LayerPayload { inner: b"hi".to_vec(), destination: Destination(15000) };
    let message = WrappedMessage::new(&mut thread_rng(), &stranger.pk, &layer).unwrap();
    let request = Request::OnionMessage { payload: message.to_vec() };
    let error = client::request(config.relay_addr(0).unwrap(), request, TIMEOUT).await.unwrap_err();
    match error {
        ClientError::Remote { kind, message } => {
            assert_eq!(kind, ErrorKind::CryptoFailure);
            assert_eq!(message, "crypto failure");
        },
        error => panic!("Unexpected error: {:?}", error),
    }

    let relay = &network.relays()[0];
    assert_eq!(relay.stats().counters.failed(), 1);
    assert_eq!(relay.stats().counters.forwarded() + relay.stats().counters.delivered(), 0);
    assert_eq!(network.users()[0].diagnostics().snapshot().await.last_received_message, None);
}

#[tokio::test]
async fn insufficient_nodes() {
    let config = config(18083, 20000, 19000);
    let _network = Network::launch(config, 2, 2).await.unwrap();

    let request = Request::SendMessage { message: "hi".to_owned(), destination_user_id: 1 };
    let error = client::request(config.user_addr(0).unwrap(), request, TIMEOUT).await.unwrap_err();
    assert!(matches!(error, ClientError::Remote { kind: ErrorKind::InsufficientNodes, .. }));
}

#[tokio::test]
async fn exit_failure_stays_at_exit() {
    let config = config(18084, 22000, 21000);
    let network = Network::launch(config, 3, 1).await.unwrap();

    // nobody listens on the port of user 5
    let request = Request::SendMessage { message: "lost".to_owned(), destination_user_id: 5 };
    let response = client::request(config.user_addr(0).unwrap(), request, config.send_timeout()).await.unwrap();
    assert_eq!(response, Response::Sent);

    wait_totals(&network, (2, 0, 1)).await;

    let mut exits = 0;
    for relay in network.relays() {
        let snapshot = relay.diagnostics().snapshot().await;
        if relay.stats().counters.failed() == 1 {
            assert_eq!(snapshot.last_destination, Some(21005));
            assert_eq!(relay.stats().counters.forwarded(), 0);
            exits += 1;
        } else {
            assert_eq!(relay.stats().counters.forwarded(), 1);
        }
    }
    assert_eq!(exits, 1);
    assert_eq!(network.users()[0].diagnostics().snapshot().await.last_sent_message, Some("lost".to_owned()));
}

/// Recipient that answers only after `delay`.
#[derive(Clone)]
struct SlowRecipient {
    delay: Duration,
    received: Arc<RwLock<Option<String>>>,
}

impl Service for SlowRecipient {
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        let recipient = self.clone();
        async move {
            tokio::time::sleep(recipient.delay).await;
            match request {
                Request::DeliverMessage { message } => {
                    *recipient.received.write().await = Some(message);
                    Response::Received
                },
                request => server::unsupported(&request),
            }
        }.boxed()
    }
}

#[tokio::test]
async fn slow_hops_stay_within_hop_timeout() {
    let config = NetworkConfig {
        hop_timeout: Duration::from_secs(2),
        ..config(18085, 26000, 25000)
    };
    let network = Network::launch(config, 3, 1).await.unwrap();

    let recipient = SlowRecipient {
        delay: Duration::from_millis(1500),
        received: Arc::new(RwLock::new(None)),
    };
    let listener = server::bind(config.user_addr(1).unwrap()).await.unwrap();
    tokio::spawn(server::serve(listener, recipient.clone(), config.hop_timeout));

    let start = Instant::now();
    network.users()[0].send_message("slow".to_owned(), 1).await.unwrap();
    assert!(start.elapsed() < recipient.delay);

    wait_totals(&network, (2, 1, 0)).await;
    assert_eq!(*recipient.received.read().await, Some("slow".to_owned()));
}
