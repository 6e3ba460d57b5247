//! Broker event loop.
//!
//! A single task owns every piece of broker state and handles one event per
//! turn. Deliveries leave through the contexts' ports and are processed by
//! the receiving context on its own task, never inline during the turn that
//! produced them.

use crate::application::ApplicationRegistry;
use crate::broker::connection::ConnectionRegistry;
use crate::broker::handle::{BrokerEvent, BrokerHandle, InboundFrame};
use crate::broker::intent::{IntentRouter, RouterMetrics};
use crate::broker::manifest_service::ManifestService;
use crate::broker::topic::{validate_topic, TopicRoute, TopicRouter};
use crate::broker::topics;
use crate::core::{BrokerConfig, Error, Result, TransportHandle};
use crate::manifest::{IdGenerator, ManifestRegistry};
use crate::transport::{headers, DeliveryStatus, Direction, Envelope, IntentMessage, Payload, TopicMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// The intent broker.
pub struct Broker {
    applications: Arc<ApplicationRegistry>,
    connections: ConnectionRegistry,
    topics: TopicRouter,
    intents: IntentRouter,
    manifest: ManifestService,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl Broker {
    /// Create a broker and the handle used to feed it.
    pub fn new(config: BrokerConfig) -> (Self, BrokerHandle) {
        let applications = Arc::new(ApplicationRegistry::from_config(&config.applications));
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Self {
            manifest: ManifestService::new(ManifestRegistry::new(applications.clone())),
            applications,
            connections: ConnectionRegistry::new(),
            topics: TopicRouter::new(),
            intents: IntentRouter::new(),
            events: rx,
        };
        (broker, BrokerHandle::new(tx, config.client_config()))
    }

    /// Use a custom manifest id generator. Must be called before any
    /// registration.
    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.manifest = ManifestService::new(ManifestRegistry::with_id_generator(
            self.applications.clone(),
            id_generator,
        ));
        self
    }

    /// Spawn the event loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shut down or until every handle is gone.
    pub async fn run(mut self) {
        info!(applications = self.applications.len(), "broker started");
        while let Some(event) = self.events.recv().await {
            if let BrokerEvent::Shutdown = event {
                break;
            }
            self.handle_event(event);
            self.refresh_watchers();
        }
        info!(connections = self.connections.len(), "broker stopped");
    }

    /// Intent routing metrics.
    pub fn intent_metrics(&self) -> &RouterMetrics {
        self.intents.metrics()
    }

    fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Attach { handle, port } => {
                debug!(%handle, "transport attached");
                self.connections.attach(handle, port);
            }
            BrokerEvent::Frame(frame) => self.handle_frame(frame),
            BrokerEvent::Detach { handle } => {
                if self.connections.detach(handle).is_some() {
                    info!(%handle, "transport detached while connected");
                }
                self.topics.remove_connection(handle);
            }
            BrokerEvent::StartupCompleted => {
                info!("host startup completed");
                let signal = TopicMessage::new(topics::STARTUP_COMPLETED).with_body(true).retained();
                self.topics.retain(&signal);
                self.deliver(&signal);
            }
            BrokerEvent::Shutdown => {}
        }
    }

    /// Handle a frame and acknowledge it.
    fn handle_frame(&mut self, frame: InboundFrame) {
        let InboundFrame {
            handle,
            origin,
            envelope,
        } = frame;
        trace!(%handle, message_id = %envelope.message_id, channel = ?envelope.channel, "frame received");

        let result = if envelope.transport != Direction::ContextToBroker {
            Err(Error::MessageDispatch("frame travels in the wrong direction".into()))
        } else if !envelope.is_on_channel() {
            Err(Error::MessageDispatch(format!(
                "{:?} payload sent on the {:?} channel",
                envelope.message.channel(),
                envelope.channel
            )))
        } else if let Payload::Connect { symbolic_app_name } = &envelope.message {
            self.connect(handle, &origin, symbolic_app_name)
        } else {
            match self.connections.verify(handle, &origin) {
                Ok(connection) => {
                    let app = connection.app_symbolic_name.clone();
                    self.dispatch(handle, &app, &envelope.message)
                }
                Err(e) => Err(e),
            }
        };

        let status = match &result {
            Ok(()) => DeliveryStatus::ok(),
            Err(e) => {
                warn!(%handle, message_id = %envelope.message_id, error = %e, "frame rejected");
                DeliveryStatus::failed(e)
            }
        };
        self.send_to(handle, envelope.acknowledge(status));
    }

    /// Handshake. A failed handshake also ends any existing connection of
    /// the handle.
    fn connect(&mut self, handle: TransportHandle, origin: &str, app: &str) -> Result<()> {
        let replaced = self.connections.get(handle).is_some();
        let result = self
            .connections
            .connect(handle, origin, app, &self.applications)
            .map(|_| ());
        if result.is_err() && replaced {
            self.connections.disconnect(handle);
        }
        if replaced {
            self.topics.remove_connection(handle);
        }
        result
    }

    fn dispatch(&mut self, handle: TransportHandle, app: &str, payload: &Payload) -> Result<()> {
        match payload {
            Payload::Disconnect => {
                self.connections.disconnect(handle);
                self.topics.remove_connection(handle);
                Ok(())
            }
            Payload::Topic(message) => self.publish(app, message.clone()),
            Payload::Subscribe { topic, subscriber_id } => {
                let retained = self.topics.subscribe(topic, subscriber_id, handle)?;
                for (message, route) in retained {
                    self.deliver_to(&message, vec![route]);
                }
                Ok(())
            }
            Payload::Unsubscribe { subscriber_id } => {
                self.topics.unsubscribe(subscriber_id, handle);
                Ok(())
            }
            Payload::Intent(intent) => self.issue_intent(app, intent.clone()),
            Payload::Connect { .. } | Payload::Status(_) => Err(Error::MessageDispatch(
                "unexpected frame on an established connection".into(),
            )),
        }
    }

    fn publish(&mut self, app: &str, mut message: TopicMessage) -> Result<()> {
        validate_topic(&message.topic, false)?;

        match message.topic.as_str() {
            topics::STARTUP_COMPLETED => {
                return Err(Error::Topic(format!("'{}' is reserved for the host", message.topic)));
            }
            topics::SUBSCRIBER_COUNT => {
                let reply_to = Self::reply_topic(&message)?;
                let watched = message
                    .body_as::<String>()
                    .and_then(|watched| self.topics.watch_count(&watched, &reply_to));
                if let Err(e) = watched {
                    self.deliver(&TopicMessage::error_reply(&reply_to, &e));
                }
                return Ok(());
            }
            topic if ManifestService::handles(topic) => {
                let reply_to = Self::reply_topic(&message)?;
                for reply in self.manifest.handle_request(app, &message, &reply_to) {
                    self.deliver(&reply);
                }
                return Ok(());
            }
            _ => {}
        }

        message
            .headers
            .insert(headers::APP_SYMBOLIC_NAME.to_string(), app.into());
        if message.retain {
            self.topics.retain(&message);
        }

        let routes = self.topics.resolve(&message.topic);
        if routes.is_empty() && message.reply_to.is_some() && !message.retain {
            return Err(Error::NoReplier(format!("nobody is observing '{}'", message.topic)));
        }
        debug!(topic = %message.topic, app = %app, subscribers = routes.len(), "message published");
        self.deliver_to(&message, routes);
        Ok(())
    }

    fn reply_topic(message: &TopicMessage) -> Result<String> {
        match &message.reply_to {
            Some(reply_to) => {
                validate_topic(reply_to, false)?;
                Ok(reply_to.clone())
            }
            None => Err(Error::Topic(format!("'{}' requires a reply topic", message.topic))),
        }
    }

    fn issue_intent(&mut self, app: &str, mut intent: IntentMessage) -> Result<()> {
        let route = self
            .intents
            .route(self.manifest.registry(), &self.connections, app, &intent)?;

        intent
            .headers
            .insert(headers::APP_SYMBOLIC_NAME.to_string(), app.into());
        info!(
            intent_type = %intent.intent_type,
            app = %app,
            connections = route.handles.len(),
            "intent dispatched"
        );
        for handle in route.handles {
            self.send_to(handle, Envelope::deliver_intent(intent.clone()));
        }
        Ok(())
    }

    /// Deliver to every current subscriber of the message's topic.
    fn deliver(&self, message: &TopicMessage) {
        let routes = self.topics.resolve(&message.topic);
        self.deliver_to(message, routes);
    }

    fn deliver_to(&self, message: &TopicMessage, routes: Vec<TopicRoute>) {
        for route in routes {
            let mut delivery = message.clone();
            delivery.params = route.params;
            delivery.headers.insert(
                headers::SUBSCRIBER_ID.to_string(),
                route.subscriber.subscriber_id.into(),
            );
            self.send_to(route.subscriber.handle, Envelope::deliver_topic(delivery));
        }
    }

    fn send_to(&self, handle: TransportHandle, envelope: Envelope) {
        let Some(port) = self.connections.port(handle) else {
            debug!(%handle, "no port attached, frame dropped");
            return;
        };
        if let Err(e) = port.send(envelope) {
            debug!(%handle, error = %e, "context unreachable, frame dropped");
        }
    }

    /// Publish the subscriber counts and lookup results that changed during
    /// the last turn.
    fn refresh_watchers(&mut self) {
        let router = &self.topics;
        self.manifest.prune(|reply_to| router.subscriber_count(reply_to) > 0);

        let mut updates = self.manifest.refresh();
        updates.extend(self.topics.count_updates());
        for update in updates {
            self.deliver(&update);
        }
    }
}
