//! Hub
//!
//! Single task that owns every [`ClientManager`] and [`RoomManager`] state.
//! Connection handlers talk to it through a cloneable [`HubHandle`]; domain
//! events reach it through an event bus subscription. All mutations happen
//! inside [`Hub::listen`], so no locking is involved.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::application::dto::actions::{ActionError, ActionMessage};
use crate::application::event_bus::{BusError, EventBus, Subscription};
use crate::application::services::{CommandService, RelationQuery};
use crate::domain::events::{
    ErrorRaised, Event, EventKind, EventPayload, RoomCreated, RoomDeleted, RoomRemovedMember,
    TypingEnded, TypingStarted,
};
use crate::domain::Room;
use crate::infrastructure::metrics;

use super::client_manager::{ClientManager, Connected};
use super::conn::Conn;
use super::error::HubError;
use super::room_manager::RoomManager;

/// Event kinds the hub fans out to clients.
const SUBSCRIBED_KINDS: [EventKind; 7] = [
    EventKind::MessageCreated,
    EventKind::RoomMessagesReadByUser,
    EventKind::RoomCreated,
    EventKind::RoomDeleted,
    EventKind::RoomAddedMember,
    EventKind::RoomRemovedMember,
    EventKind::UserAddedFriend,
];

struct ConnectRequest {
    conn: Arc<dyn Conn>,
    reply: oneshot::Sender<Result<(), HubError>>,
}

enum Inbound {
    Action {
        conn: Arc<dyn Conn>,
        action: ActionMessage,
    },
    Invalid {
        conn: Arc<dyn Conn>,
        error: ActionError,
    },
}

/// Cloneable entry point into a running hub.
#[derive(Clone)]
pub struct HubHandle {
    connect_tx: mpsc::Sender<ConnectRequest>,
    disconnect_tx: mpsc::Sender<Arc<dyn Conn>>,
    inbound_tx: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
}

impl HubHandle {
    /// Register a connection and wait until the hub has accepted it.
    ///
    /// On error the connection was not registered; the caller should close it.
    pub async fn connect(&self, conn: Arc<dyn Conn>) -> Result<(), HubError> {
        let (reply, rx) = oneshot::channel();
        self.connect_tx
            .send(ConnectRequest { conn, reply })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Unregister a connection. Unknown connections are ignored.
    pub async fn disconnect(&self, conn: Arc<dyn Conn>) {
        if self.disconnect_tx.send(conn).await.is_err() {
            tracing::debug!("Disconnect after hub shutdown");
        }
    }

    /// Submit a decoded action from `conn`.
    pub async fn send(&self, conn: Arc<dyn Conn>, action: ActionMessage) -> Result<(), HubError> {
        self.inbound_tx
            .send(Inbound::Action { conn, action })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Report a frame from `conn` that could not be decoded.
    pub async fn report_error(&self, conn: Arc<dyn Conn>, error: ActionError) -> Result<(), HubError> {
        self.inbound_tx
            .send(Inbound::Invalid { conn, error })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Ask the hub to stop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// The hub task state.
pub struct Hub {
    commands: Arc<CommandService>,
    relations: Arc<dyn RelationQuery>,
    clients: ClientManager,
    rooms: RoomManager,
    bus: Arc<EventBus>,
    subscription: Subscription,
    connect_rx: mpsc::Receiver<ConnectRequest>,
    disconnect_rx: mpsc::Receiver<Arc<dyn Conn>>,
    inbound_rx: mpsc::Receiver<Inbound>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Build a hub and its handle. The bus subscription is taken here, so no
    /// event published after this returns is missed.
    pub fn new(
        commands: Arc<CommandService>,
        relations: Arc<dyn RelationQuery>,
        bus: Arc<EventBus>,
        channel_capacity: usize,
    ) -> Result<(Self, HubHandle), BusError> {
        let subscription = bus.subscribe(&SUBSCRIBED_KINDS)?;
        let capacity = channel_capacity.max(1);

        let (connect_tx, connect_rx) = mpsc::channel(capacity);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();

        let hub = Self {
            commands,
            clients: ClientManager::new(relations.clone()),
            relations,
            rooms: RoomManager::new(),
            bus,
            subscription,
            connect_rx,
            disconnect_rx,
            inbound_rx,
            shutdown: shutdown.clone(),
        };
        let handle = HubHandle {
            connect_tx,
            disconnect_tx,
            inbound_tx,
            shutdown,
        };
        Ok((hub, handle))
    }

    /// Run until `cancel` fires, [`HubHandle::shutdown`] is called, or the bus
    /// shuts down. Every registered connection is closed on exit.
    ///
    /// Bus events are drained before inbound actions, so the events a command
    /// publishes are fanned out before the next action is dispatched.
    pub async fn listen(mut self, cancel: CancellationToken) {
        tracing::info!("Hub started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = self.shutdown.cancelled() => break,

                Some(conn) = self.disconnect_rx.recv() => self.handle_disconnect(conn),

                Some(request) = self.connect_rx.recv() => {
                    let result = self.handle_connect(request.conn.clone()).await;
                    if request.reply.send(result).is_err() {
                        // The handler gave up waiting; undo the registration.
                        self.handle_disconnect(request.conn);
                    }
                }

                event = self.subscription.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        if !self.resubscribe() {
                            break;
                        }
                    }
                },

                Some(inbound) = self.inbound_rx.recv() => self.handle_inbound(inbound).await,
            }
        }

        self.shutdown.cancel();
        self.subscription.unsubscribe();
        self.clients.close_all();
        self.rooms = RoomManager::new();
        metrics::ACTIVE_ROOMS.set(0);
        tracing::info!("Hub stopped");
    }

    /// Replace a subscription the bus detached. Returns `false` once the bus
    /// itself is shut down.
    fn resubscribe(&mut self) -> bool {
        if self.bus.is_closed() {
            tracing::warn!("Event bus closed, stopping hub");
            return false;
        }
        match self.bus.subscribe(&SUBSCRIBED_KINDS) {
            Ok(subscription) => {
                tracing::warn!(
                    detached = self.subscription.id(),
                    subscription_id = subscription.id(),
                    "Hub subscription was detached by the event bus, resubscribed"
                );
                self.subscription = subscription;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Event bus closed, stopping hub");
                false
            }
        }
    }

    async fn handle_connect(&mut self, conn: Arc<dyn Conn>) -> Result<(), HubError> {
        let user_id = conn.user_id();
        match self.clients.connect(conn).await {
            Ok(Connected::Activated { rooms }) => {
                self.rooms.connect_client(user_id, &rooms);
                Ok(())
            }
            Ok(Connected::Attached) => Ok(()),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Connection rejected");
                Err(e)
            }
        }
    }

    fn handle_disconnect(&mut self, conn: Arc<dyn Conn>) {
        conn.close();
        if let Some(client) = self.clients.disconnect(conn.as_ref()) {
            self.rooms
                .disconnect_client(client.user_id, client.room_ids.iter().copied());
        }
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Action { conn, action } => {
                let name = action.name();
                let result = self.dispatch(conn.as_ref(), &action).await;
                metrics::record_inbound(name, result.is_ok());

                if let Err(e) = result {
                    tracing::debug!(
                        user_id = conn.user_id(),
                        conn_id = %conn.id(),
                        action = name,
                        error = %e,
                        "Action failed"
                    );
                    self.report(conn.as_ref(), e.client_message(), Some(action.to_value()));
                }
            }
            Inbound::Invalid { conn, error } => {
                metrics::record_inbound("invalid", false);
                let cause = match &error {
                    ActionError::UnknownAction(tag) => Some(serde_json::json!({ "action": tag })),
                    ActionError::Malformed(_) => None,
                };
                self.report(conn.as_ref(), error.to_string(), cause);
            }
        }
    }

    async fn dispatch(&mut self, conn: &dyn Conn, action: &ActionMessage) -> Result<(), HubError> {
        let user_id = conn.user_id();
        match action.room_id() {
            Some(room_id) => self
                .clients
                .validate_client_has_room(conn.id(), user_id, room_id)?,
            None => {
                self.clients.validate_conn(conn.id(), user_id)?;
            }
        }

        match action {
            ActionMessage::ChatMessage(a) => {
                self.commands.post_room_message(user_id, a).await?;
            }
            ActionMessage::ReadMessage(a) => {
                self.commands.read_room_messages(user_id, a).await?;
            }
            ActionMessage::CreateRoom(a) => {
                self.commands.create_room(user_id, a).await?;
            }
            ActionMessage::DeleteRoom(a) => {
                self.commands.delete_room(user_id, a).await?;
            }
            ActionMessage::AddRoomMember(a) => {
                self.commands.add_room_member(user_id, a).await?;
            }
            ActionMessage::RemoveRoomMember(a) => {
                self.commands.remove_room_member(user_id, a).await?;
            }
            ActionMessage::AddFriend(a) => {
                self.commands.add_friend(user_id, a).await?;
            }
            ActionMessage::TypeStart(a) => {
                let event = Event::new(TypingStarted {
                    room_id: a.room_id,
                    user_id,
                });
                self.broadcast_to_room_except(a.room_id, user_id, &event);
            }
            ActionMessage::TypeEnd(a) => {
                let event = Event::new(TypingEnded {
                    room_id: a.room_id,
                    user_id,
                });
                self.broadcast_to_room_except(a.room_id, user_id, &event);
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: Event) {
        match event.payload() {
            EventPayload::MessageCreated(e) => {
                self.broadcast_to_room(e.room_id, &event).await;
            }
            EventPayload::RoomMessagesReadByUser(e) => {
                self.broadcast_to_room(e.room_id, &event).await;
            }
            EventPayload::RoomAddedMember(e) => {
                match self.relations.find_room(e.room_id).await {
                    Ok(room) => {
                        if self.clients.join_room(e.user_id, room.id) {
                            self.rooms.join_room(&room, e.user_id);
                        } else {
                            self.rooms.add_member(room.id, e.user_id);
                        }
                        self.clients
                            .broadcast_to_users(room.member_ids.iter().copied(), &event);
                    }
                    Err(err) => {
                        tracing::warn!(room_id = e.room_id, error = %err, "Room of added member not found")
                    }
                }
            }
            EventPayload::RoomRemovedMember(e) => self.on_member_removed(e, &event).await,
            EventPayload::RoomCreated(e) => self.on_room_created(e, &event),
            EventPayload::RoomDeleted(e) => self.on_room_deleted(e, &event),
            EventPayload::UserAddedFriend(e) => {
                self.clients.add_friend(e.user_id, e.friend_id);
                self.clients
                    .broadcast_to_users([e.user_id, e.friend_id], &event);
            }
            other => tracing::debug!(kind = %other.kind(), "Ignoring event"),
        }
    }

    async fn on_member_removed(&mut self, e: &RoomRemovedMember, event: &Event) {
        self.clients.leave_room(e.user_id, e.room_id);

        let remaining = match self.relations.find_room(e.room_id).await {
            Ok(room) => room.member_ids.into_iter().collect(),
            Err(err) => {
                tracing::debug!(room_id = e.room_id, error = %err, "Falling back to cached members");
                self.rooms.room_member_ids(e.room_id)
            }
        };
        self.rooms.leave_room(e.room_id, e.user_id);

        let recipients = remaining.into_iter().chain(std::iter::once(e.user_id));
        self.clients.broadcast_to_users(recipients, event);
    }

    fn on_room_created(&mut self, e: &RoomCreated, event: &Event) {
        let room = Room::from_parts(
            e.room_id,
            e.name.clone(),
            e.is_talk_room,
            e.created_by,
            e.member_ids.iter().copied().collect(),
            event.occurs_at(),
        );
        for &member_id in &e.member_ids {
            if self.clients.join_room(member_id, room.id) {
                self.rooms.join_room(&room, member_id);
            }
        }
        self.clients
            .broadcast_to_users(e.member_ids.iter().copied(), event);
    }

    fn on_room_deleted(&mut self, e: &RoomDeleted, event: &Event) {
        self.clients
            .broadcast_to_users(e.member_ids.iter().copied(), event);
        for &member_id in &e.member_ids {
            self.clients.leave_room(member_id, e.room_id);
        }
        self.rooms.remove_room(e.room_id);
    }

    async fn broadcast_to_room(&self, room_id: u64, event: &Event) {
        match self.relations.find_room(room_id).await {
            Ok(room) => self
                .clients
                .broadcast_to_users(room.member_ids.iter().copied(), event),
            Err(e) => tracing::warn!(room_id, error = %e, kind = %event.kind(), "Dropping room event"),
        }
    }

    fn broadcast_to_room_except(&self, room_id: u64, sender_id: u64, event: &Event) {
        let recipients = self
            .rooms
            .room_member_ids(room_id)
            .into_iter()
            .filter(|&id| id != sender_id);
        self.clients.broadcast_to_users(recipients, event);
    }

    fn report(&self, conn: &dyn Conn, error: String, cause: Option<serde_json::Value>) {
        let event = Event::new(ErrorRaised { error, cause });
        self.clients.send_to_conn(conn, &event);
    }
}
