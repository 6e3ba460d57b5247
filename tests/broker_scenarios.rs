//! End-to-end scenarios: a running broker with several connected contexts.

use futures::{Stream, StreamExt};
use intent_broker::broker::{Broker, BrokerHandle, InboundFrame};
use intent_broker::client::{IntentSelector, MessageClient};
use intent_broker::core::{ApplicationConfig, BrokerConfig, ClientConfig};
use intent_broker::manifest::{CapabilityDescriptor, IntentionDescriptor, ManifestObjectFilter};
use intent_broker::qualifier::Qualifier;
use intent_broker::transport::{headers, ChannelTransport, Envelope, IntentMessage, Payload, TopicMessage};
use intent_broker::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const HOST: &str = "https://host.example";
const APP_A: &str = "https://a.example";
const APP_B: &str = "https://b.example";
const DEVTOOLS: &str = "https://devtools.example";
const WAIT: Duration = Duration::from_secs(2);

fn config() -> BrokerConfig {
    BrokerConfig::with_applications(vec![
        ApplicationConfig::new("host", HOST),
        ApplicationConfig::new("app-a", APP_A),
        ApplicationConfig::new("app-b", APP_B).with_intention_register_api(),
        ApplicationConfig::new("devtools", DEVTOOLS)
            .with_scope_check_disabled()
            .with_intention_register_api(),
    ])
}

fn start() -> BrokerHandle {
    let (broker, handle) = Broker::new(config());
    broker.spawn();
    handle.signal_startup_completed().unwrap();
    handle
}

fn client_config(handle: &BrokerHandle) -> ClientConfig {
    handle.client_config().with_delivery_timeout(WAIT)
}

async fn connect(handle: &BrokerHandle, app: &str, origin: &str) -> MessageClient {
    MessageClient::connect(handle.attach(origin).unwrap(), app, client_config(handle))
        .await
        .unwrap()
}

async fn next<S: Stream + Unpin>(stream: &mut S) -> S::Item {
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("no message within timeout")
        .expect("stream ended")
}

fn entity(value: &str) -> Qualifier {
    Qualifier::empty().with("entity", value)
}

#[tokio::test]
async fn test_news_fan_out_and_unsubscribe() {
    let handle = start();
    let publisher = connect(&handle, "host", HOST).await;
    let a = connect(&handle, "app-a", APP_A).await;
    let b = connect(&handle, "app-b", APP_B).await;

    let mut a_news = a.observe("news").await.unwrap();
    let mut b_news = b.observe("news").await.unwrap();

    assert_ok!(publisher.publish(TopicMessage::new("news").with_body("hello")).await);
    for stream in [&mut a_news, &mut b_news] {
        let message = next(stream).await;
        assert_eq!(message.topic, "news");
        assert_eq!(message.body, Some("hello".into()));
        assert_eq!(message.header_str(headers::APP_SYMBOLIC_NAME), Some("host"));
    }

    b_news.unsubscribe().await;
    let mut counts = publisher.subscriber_count("news").await.unwrap();
    assert_eq!(counts.next_as::<usize>().await.unwrap().unwrap(), 1);

    assert_ok!(publisher.publish(TopicMessage::new("news").with_body("second")).await);
    assert_eq!(next(&mut a_news).await.body, Some("second".into()));
}

#[tokio::test]
async fn test_messages_arrive_in_publish_order() {
    let handle = start();
    let publisher = connect(&handle, "host", HOST).await;
    let a = connect(&handle, "app-a", APP_A).await;
    let mut ticks = a.observe("ticks").await.unwrap();

    for i in 0..10 {
        assert_ok!(publisher.publish(TopicMessage::new("ticks").with_body(i)).await);
    }
    for i in 0..10 {
        assert_eq!(next(&mut ticks).await.body, Some(i.into()));
    }
}

#[tokio::test]
async fn test_request_reply() {
    let handle = start();
    let caller = connect(&handle, "host", HOST).await;
    let replier = connect(&handle, "app-a", APP_A).await;

    let err = caller
        .request(TopicMessage::new("echo").with_body("ping"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::NoReplier(_)));

    let mut requests = replier.observe("echo").await.unwrap();
    let responder = tokio::spawn(async move {
        let request = next(&mut requests).await;
        let reply_to = request.reply_to.clone().unwrap();
        replier.reply(&reply_to, "pong").await.unwrap();
        request
    });

    let mut replies = caller
        .request(TopicMessage::new("echo").with_body("ping"))
        .await
        .unwrap();
    let reply = next(&mut replies).await.unwrap();
    assert_eq!(reply.body, Some("pong".into()));

    let request = responder.await.unwrap();
    assert_eq!(request.body, Some("ping".into()));
    assert_eq!(request.reply_to.as_deref(), Some(replies.reply_to()));
}

#[tokio::test]
async fn test_error_reply_ends_reply_stream() {
    let handle = start();
    let caller = connect(&handle, "host", HOST).await;
    let replier = connect(&handle, "app-a", APP_A).await;

    let mut requests = replier.observe("lookup/person").await.unwrap();
    tokio::spawn(async move {
        let request = next(&mut requests).await;
        let reply_to = request.reply_to.clone().unwrap();
        let error = Error::NullCapabilityProvider("no such person".into());
        replier.reply_error(&reply_to, &error).await.unwrap();
    });

    let mut replies = caller.request(TopicMessage::new("lookup/person")).await.unwrap();
    assert!(matches!(next(&mut replies).await, Err(Error::NullCapabilityProvider(_))));
    assert!(replies.next().await.is_none());
}

#[tokio::test]
async fn test_view_intent_reaches_provider() {
    let handle = start();
    let a = connect(&handle, "app-a", APP_A).await;
    let b = connect(&handle, "app-b", APP_B).await;

    assert_ok!(
        a.manifest()
            .register_capability(CapabilityDescriptor::new("view").with_qualifier(entity("*")).public())
            .await
    );
    assert_ok!(
        b.manifest()
            .register_intention(IntentionDescriptor::new("view").with_qualifier(entity("*")))
            .await
    );

    let mut intents = a.handle_intent(IntentSelector::new().of_type("view"));
    assert_ok!(
        b.issue_intent(IntentMessage::new("view").with_qualifier(entity("person")).with_body("42"))
            .await
    );

    let intent = next(&mut intents).await;
    assert_eq!(intent.intent_type, "view");
    assert_eq!(intent.qualifier, Some(entity("person")));
    assert_eq!(intent.body, Some("42".into()));
    assert_eq!(intent.header_str(headers::APP_SYMBOLIC_NAME), Some("app-b"));
}

#[tokio::test]
async fn test_request_by_intent() {
    let handle = start();
    let a = connect(&handle, "app-a", APP_A).await;
    let b = connect(&handle, "app-b", APP_B).await;

    a.manifest()
        .register_capability(CapabilityDescriptor::new("resolve").public())
        .await
        .unwrap();
    b.manifest()
        .register_intention(IntentionDescriptor::new("resolve"))
        .await
        .unwrap();

    let mut intents = a.handle_intent(IntentSelector::new().of_type("resolve"));
    let provider = a.clone();
    tokio::spawn(async move {
        let intent = next(&mut intents).await;
        let reply_to = intent.reply_to.clone().unwrap();
        provider.reply(&reply_to, "resolved").await.unwrap();
    });

    let mut replies = b.request_by_intent(IntentMessage::new("resolve")).await.unwrap();
    assert_eq!(replies.next_as::<String>().await.unwrap().unwrap(), "resolved");
}

#[tokio::test]
async fn test_intent_dispatch_failures() {
    let handle = start();
    let a = connect(&handle, "app-a", APP_A).await;
    let b = connect(&handle, "app-b", APP_B).await;
    a.manifest()
        .register_capability(CapabilityDescriptor::new("edit").public())
        .await
        .unwrap();

    let err = assert_err!(b.issue_intent(IntentMessage::new("")).await);
    assert!(matches!(err, Error::IntentDispatch(_)));

    let err = assert_err!(b.issue_intent(IntentMessage::new("edit")).await);
    assert!(matches!(err, Error::NotQualified(_)));

    b.manifest()
        .register_intention(IntentionDescriptor::new("print"))
        .await
        .unwrap();
    let err = assert_err!(b.issue_intent(IntentMessage::new("print")).await);
    assert!(matches!(err, Error::NullCapabilityProvider(_)));

    // Intention registration is opt-in per application
    let err = assert_err!(a.manifest().register_intention(IntentionDescriptor::new("print")).await);
    assert!(matches!(err, Error::IntentionRegister(_)));
}

#[tokio::test]
async fn test_private_capability_visibility() {
    let handle = start();
    let a = connect(&handle, "app-a", APP_A).await;
    let b = connect(&handle, "app-b", APP_B).await;
    let devtools = connect(&handle, "devtools", DEVTOOLS).await;

    a.manifest()
        .register_capability(CapabilityDescriptor::new("secret").with_description("internal only"))
        .await
        .unwrap();

    let filter = ManifestObjectFilter::new().by_type("secret");
    assert!(b.manifest().lookup_capabilities(filter.clone()).await.unwrap().is_empty());
    assert_eq!(a.manifest().lookup_capabilities(filter.clone()).await.unwrap().len(), 1);
    let seen = devtools.manifest().lookup_capabilities(filter).await.unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].description.as_deref(), Some("internal only"));
}

#[tokio::test]
async fn test_registration_is_idempotent_and_removal_exact() {
    let handle = start();
    let a = connect(&handle, "app-a", APP_A).await;
    let manifest = a.manifest();

    let first = manifest
        .register_capability(CapabilityDescriptor::new("view").with_qualifier(entity("test")))
        .await
        .unwrap();
    let second = manifest
        .register_capability(CapabilityDescriptor::new("view").with_qualifier(entity("test")))
        .await
        .unwrap();
    assert_eq!(first, second);

    let removed = manifest
        .unregister_capabilities(ManifestObjectFilter::new().by_qualifier(Qualifier::any()))
        .await
        .unwrap();
    assert!(removed.is_empty());

    let removed = manifest
        .unregister_capabilities(ManifestObjectFilter::new().by_qualifier(entity("test")))
        .await
        .unwrap();
    assert_eq!(removed, vec![first]);

    let err = assert_err!(
        manifest
            .register_capability(CapabilityDescriptor::new("view").with_qualifier(Qualifier::any()))
            .await
    );
    assert!(matches!(err, Error::CapabilityRegister(_)));
}

#[tokio::test]
async fn test_live_capability_lookup() {
    let handle = start();
    let a = connect(&handle, "app-a", APP_A).await;
    let b = connect(&handle, "app-b", APP_B).await;

    let mut lookup = b
        .manifest()
        .observe_capabilities(ManifestObjectFilter::new().by_type("map"))
        .await
        .unwrap();
    assert!(next(&mut lookup).await.unwrap().is_empty());

    let id = a
        .manifest()
        .register_capability(CapabilityDescriptor::new("map").public())
        .await
        .unwrap();
    let found = next(&mut lookup).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].metadata.id, id);
    assert_eq!(found[0].metadata.app_symbolic_name, "app-a");

    a.manifest()
        .unregister_capabilities(ManifestObjectFilter::new().by_id(&id))
        .await
        .unwrap();
    assert!(next(&mut lookup).await.unwrap().is_empty());
    lookup.close().await;
}

#[tokio::test]
async fn test_subscriber_count_follows_subscriptions() {
    let handle = start();
    let host = connect(&handle, "host", HOST).await;
    let a = connect(&handle, "app-a", APP_A).await;

    let mut counts = host.subscriber_count("weather").await.unwrap();
    assert_eq!(counts.next_as::<usize>().await.unwrap().unwrap(), 0);

    let weather = a.observe("weather").await.unwrap();
    assert_eq!(counts.next_as::<usize>().await.unwrap().unwrap(), 1);

    weather.unsubscribe().await;
    assert_eq!(counts.next_as::<usize>().await.unwrap().unwrap(), 0);
    counts.close().await;
}

#[tokio::test]
async fn test_retained_message_and_topic_params() {
    let handle = start();
    let host = connect(&handle, "host", HOST).await;
    let a = connect(&handle, "app-a", APP_A).await;

    assert_ok!(
        host.publish(TopicMessage::new("status/host").with_body("ready").retained())
            .await
    );

    let mut status = a.observe("status/:app").await.unwrap();
    let message = next(&mut status).await;
    assert_eq!(message.body, Some("ready".into()));
    assert_eq!(message.params.get("app").map(String::as_str), Some("host"));
}

#[tokio::test]
async fn test_connect_rejections() {
    let handle = start();
    let config = client_config(&handle);

    for (app, origin) in [("", APP_A), ("ghost", APP_A), ("app-a", APP_B)] {
        let result = MessageClient::connect(handle.attach(origin).unwrap(), app, config.clone()).await;
        assert!(matches!(result.err(), Some(Error::Connect(_))), "{} from {}", app, origin);
    }
}

#[tokio::test]
async fn test_origin_cannot_change_mid_session() {
    let handle = start();
    let (port, mut frames) = ChannelTransport::pair();
    let transport = handle.attach_port(Arc::new(port)).unwrap();

    let connect = Envelope::connect("app-a");
    handle
        .submit(InboundFrame {
            handle: transport,
            origin: APP_A.to_string(),
            envelope: connect,
        })
        .unwrap();
    let ack = tokio::time::timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert!(matches!(ack.message, Payload::Status(ref status) if status.ok));

    handle
        .submit(InboundFrame {
            handle: transport,
            origin: "https://evil.example".to_string(),
            envelope: Envelope::publish(TopicMessage::new("news")),
        })
        .unwrap();
    let ack = tokio::time::timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    match ack.message {
        Payload::Status(status) => assert!(matches!(status.into_result(), Err(Error::MessageDispatch(_)))),
        other => panic!("expected status, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_ends_session() {
    let handle = start();
    let host = connect(&handle, "host", HOST).await;
    let a = connect(&handle, "app-a", APP_A).await;

    let _news = a.observe("news").await.unwrap();
    let mut counts = host.subscriber_count("news").await.unwrap();
    assert_eq!(counts.next_as::<usize>().await.unwrap().unwrap(), 1);

    assert_ok!(a.disconnect().await);
    assert_eq!(counts.next_as::<usize>().await.unwrap().unwrap(), 0);

    let err = assert_err!(a.publish(TopicMessage::new("news")).await);
    assert!(matches!(err, Error::MessageDispatch(_)));
}

#[tokio::test]
async fn test_requests_wait_for_host_startup() {
    let (broker, handle) = Broker::new(config());
    broker.spawn();

    let replier = MessageClient::connect(
        handle.attach(APP_A).unwrap(),
        "app-a",
        client_config(&handle).with_await_startup(false),
    )
    .await
    .unwrap();
    let mut requests = replier.observe("echo").await.unwrap();
    tokio::spawn(async move {
        while let Some(request) = requests.next().await {
            if let Some(reply_to) = request.reply_to {
                let _ = replier.reply(&reply_to, "pong").await;
            }
        }
    });

    let caller = connect(&handle, "host", HOST).await;
    let pending = tokio::spawn(async move {
        let mut replies = caller.request(TopicMessage::new("echo")).await?;
        replies.next_as::<String>().await.unwrap_or_else(|| Err(Error::Internal("no reply".into())))
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished());

    handle.signal_startup_completed().unwrap();
    let reply = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert_eq!(reply.unwrap(), "pong");
}
