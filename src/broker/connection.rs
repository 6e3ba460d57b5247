//! Connection registry.
//!
//! Tracks the transport ports attached by the hosting environment and the
//! connections established over them. A port stays attached across
//! connect/disconnect cycles; a connection exists only after a successful
//! handshake.

use crate::application::ApplicationRegistry;
use crate::core::{now, Error, Result, Timestamp, TransportHandle};
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// An established connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    /// Transport handle
    pub handle: TransportHandle,
    /// Application the context authenticated as
    pub app_symbolic_name: String,
    /// Origin verified at handshake
    pub origin: String,
    /// Handshake time
    pub connected_at: Timestamp,
}

/// Registry of attached ports and established connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    ports: HashMap<TransportHandle, Arc<dyn Transport>>,
    connections: HashMap<TransportHandle, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the broker-to-context port of a transport.
    pub fn attach(&mut self, handle: TransportHandle, port: Arc<dyn Transport>) {
        self.ports.insert(handle, port);
    }

    /// Detach a transport, dropping its connection if any.
    pub fn detach(&mut self, handle: TransportHandle) -> Option<Connection> {
        self.ports.remove(&handle);
        self.disconnect(handle)
    }

    /// Authenticate a context and establish its connection.
    ///
    /// Replaces any previous connection of the same transport.
    pub fn connect(
        &mut self,
        handle: TransportHandle,
        origin: &str,
        app_symbolic_name: &str,
        applications: &ApplicationRegistry,
    ) -> Result<&Connection> {
        if app_symbolic_name.is_empty() {
            return Err(Error::Connect("no application identity supplied".into()));
        }
        let application = applications.get(app_symbolic_name).ok_or_else(|| {
            Error::Connect(format!("unknown application '{}'", app_symbolic_name))
        })?;
        if application.origin != origin {
            warn!(app = %app_symbolic_name, expected = %application.origin, actual = %origin, "origin mismatch");
            return Err(Error::Connect(format!(
                "origin '{}' does not match the origin of application '{}'",
                origin, app_symbolic_name
            )));
        }

        let connection = Connection {
            handle,
            app_symbolic_name: app_symbolic_name.to_string(),
            origin: origin.to_string(),
            connected_at: now(),
        };
        if let Some(previous) = self.connections.insert(handle, connection) {
            info!(%handle, app = %previous.app_symbolic_name, "connection replaced");
        }
        info!(%handle, app = %app_symbolic_name, "context connected");
        Ok(&self.connections[&handle])
    }

    /// Drop the connection of a transport, keeping the port attached.
    pub fn disconnect(&mut self, handle: TransportHandle) -> Option<Connection> {
        let connection = self.connections.remove(&handle)?;
        info!(%handle, app = %connection.app_symbolic_name, "context disconnected");
        Some(connection)
    }

    /// Check that a frame comes from an established connection and its
    /// recorded origin.
    pub fn verify(&self, handle: TransportHandle, origin: &str) -> Result<&Connection> {
        let connection = self
            .connections
            .get(&handle)
            .ok_or_else(|| Error::MessageDispatch(format!("{} is not connected", handle)))?;
        if connection.origin != origin {
            return Err(Error::MessageDispatch(format!(
                "{} changed origin from '{}' to '{}'",
                handle, connection.origin, origin
            )));
        }
        Ok(connection)
    }

    /// Get a connection.
    pub fn get(&self, handle: TransportHandle) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    /// Port of an attached transport.
    pub fn port(&self, handle: TransportHandle) -> Option<&Arc<dyn Transport>> {
        self.ports.get(&handle)
    }

    /// Handles of every connection of an application, in handle order.
    pub fn handles_of(&self, app_symbolic_name: &str) -> Vec<TransportHandle> {
        let mut handles: Vec<TransportHandle> = self
            .connections
            .values()
            .filter(|c| c.app_symbolic_name == app_symbolic_name)
            .map(|c| c.handle)
            .collect();
        handles.sort();
        handles
    }

    /// Number of established connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is established.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
