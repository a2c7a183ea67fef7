use super::machine::{ChannelCommand, ChannelEvent, ChannelMachine, ConnectionState, ReconnectPolicy};
use super::{PushStream, PushTransport};
use menu_proto::PushMessage;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

#[derive(Debug)]
enum Control {
    Restart,
    Teardown,
}

/// Handle to the background task that keeps the push subscription alive.
///
/// Decoded [`PushMessage`]s fan out over a broadcast channel; connection
/// state is observable through a watch channel. Dropping the handle aborts
/// the task.
pub struct PushChannel {
    events: Mutex<Option<broadcast::Sender<PushMessage>>>,
    state: watch::Receiver<ConnectionState>,
    control: mpsc::UnboundedSender<Control>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PushChannel {
    /// Starts connecting immediately.
    pub fn spawn(transport: Arc<dyn PushTransport>, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (control, control_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            machine: ChannelMachine::new(policy),
            transport,
            stream: None,
            events: events.clone(),
            state: state_tx,
            control: control_rx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            events: Mutex::new(Some(events)),
            state,
            control,
            task: Mutex::new(Some(task)),
        }
    }

    /// After teardown the returned receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        match self.events.lock().as_ref() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).0.subscribe(),
        }
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Leaves `Failed` (or cuts a pending retry delay short) with a fresh
    /// attempt budget.
    pub fn restart(&self) {
        let _ = self.control.send(Control::Restart);
    }

    /// Closes the transport and stops the task. No message is delivered
    /// after this returns; subscribers observe a closed channel.
    pub async fn teardown(&self) {
        let _ = self.control.send(Control::Teardown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.events.lock().take();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

struct Driver {
    machine: ChannelMachine,
    transport: Arc<dyn PushTransport>,
    stream: Option<Box<dyn PushStream>>,
    events: broadcast::Sender<PushMessage>,
    state: watch::Sender<ConnectionState>,
    control: mpsc::UnboundedReceiver<Control>,
}

impl Driver {
    async fn run(mut self) {
        let mut command = self.machine.handle(ChannelEvent::Start);
        loop {
            self.publish_state();
            command = match command {
                ChannelCommand::Connect => self.connect().await,
                ChannelCommand::RetryAfter(delay) => {
                    debug!(?delay, "Push channel retry scheduled");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            self.machine.handle(ChannelEvent::RetryTimerFired)
                        }
                        control = self.control.recv() => self.on_control(control, command),
                    }
                }
                ChannelCommand::Idle if self.machine.state() == ConnectionState::Connected => {
                    self.read().await
                }
                ChannelCommand::Idle => {
                    let control = self.control.recv().await;
                    self.on_control(control, ChannelCommand::Idle)
                }
                ChannelCommand::Close => {
                    if let Some(mut stream) = self.stream.take() {
                        stream.close().await;
                    }
                    self.publish_state();
                    info!("Push channel closed");
                    break;
                }
            };
        }
    }

    async fn connect(&mut self) -> ChannelCommand {
        let timeout = self.machine.policy().handshake_timeout;
        let transport = Arc::clone(&self.transport);
        tokio::select! {
            result = tokio::time::timeout(timeout, transport.connect()) => match result {
                Ok(Ok(stream)) => {
                    info!("Push channel connected");
                    self.stream = Some(stream);
                    self.machine.handle(ChannelEvent::HandshakeSucceeded)
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Push channel handshake failed");
                    self.machine.handle(ChannelEvent::HandshakeFailed(e.to_string()))
                }
                Err(_) => {
                    warn!(?timeout, "Push channel handshake timed out");
                    self.machine
                        .handle(ChannelEvent::HandshakeFailed("handshake timed out".into()))
                }
            },
            control = self.control.recv() => self.on_control(control, ChannelCommand::Connect),
        }
    }

    async fn read(&mut self) -> ChannelCommand {
        let Some(stream) = self.stream.as_mut() else {
            return self
                .machine
                .handle(ChannelEvent::Dropped("no open stream".into()));
        };
        tokio::select! {
            frame = stream.next_message() => match frame {
                Ok(Some(frame)) => {
                    self.dispatch(&frame);
                    ChannelCommand::Idle
                }
                Ok(None) => {
                    warn!("Push channel closed by server");
                    self.stream = None;
                    self.machine.handle(ChannelEvent::Dropped("closed by server".into()))
                }
                Err(e) => {
                    warn!(error = %e, "Push channel dropped");
                    self.stream = None;
                    self.machine.handle(ChannelEvent::Dropped(e.to_string()))
                }
            },
            control = self.control.recv() => self.on_control(control, ChannelCommand::Idle),
        }
    }

    /// `resume` is what the loop was doing when the control message arrived.
    fn on_control(&mut self, control: Option<Control>, resume: ChannelCommand) -> ChannelCommand {
        match control {
            Some(Control::Restart) => match self.machine.state() {
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    info!("Push channel restart requested");
                    self.machine.handle(ChannelEvent::Start)
                }
                _ => resume,
            },
            // Every handle is gone: nobody can observe the channel anymore.
            Some(Control::Teardown) | None => self.machine.handle(ChannelEvent::Teardown),
        }
    }

    fn dispatch(&self, frame: &str) {
        match PushMessage::decode(frame) {
            Ok(PushMessage::Ignored { kind }) => debug!(%kind, "Ignoring push message"),
            Ok(message) => {
                debug!(?message, "Push message received");
                // No receivers is fine: nothing is subscribed yet.
                let _ = self.events.send(message);
            }
            Err(e) => warn!(error = %e, "Dropping undecodable push frame"),
        }
    }

    fn publish_state(&self) {
        let next = self.machine.state();
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(from = current.label(), to = next.label(), "Push channel state");
            *current = next;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::FakeHub;
    use std::time::Duration;

    const CHANGED_1: &str = r#"{"type":"menu-changed","data":"1"}"#;
    const CHANGED_2: &str = r#"{"type":"menu-changed","data":"2"}"#;
    const CHANGED_3: &str = r#"{"type":"menu-updated","data":{"restaurantId":"3"}}"#;

    async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
        rx.wait_for(|s| *s == want).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_only_flow_while_connected() {
        let hub = Arc::new(FakeHub::default());
        let channel = PushChannel::spawn(hub.clone(), ReconnectPolicy::default());
        let mut events = channel.subscribe();
        let mut state = channel.state();

        wait_for(&mut state, ConnectionState::Connected).await;
        assert!(hub.publish(CHANGED_1));

        hub.drop_connection();
        wait_for(&mut state, ConnectionState::Disconnected).await;
        assert!(!hub.publish(CHANGED_2));

        wait_for(&mut state, ConnectionState::Connected).await;
        assert!(hub.publish(CHANGED_3));

        assert_eq!(events.recv().await.unwrap(), PushMessage::menu_changed("1"));
        assert_eq!(events.recv().await.unwrap(), PushMessage::menu_changed("3"));
        assert!(events.try_recv().is_err());
        assert_eq!(hub.connect_count(), 2);

        channel.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_fails_until_restart() {
        let hub = Arc::new(FakeHub::default());
        hub.refuse_connections(true);
        let channel = PushChannel::spawn(hub.clone(), ReconnectPolicy::default());
        let mut state = channel.state();

        wait_for(&mut state, ConnectionState::Failed).await;
        assert_eq!(hub.connect_count(), 5);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(hub.connect_count(), 5);
        assert_eq!(channel.connection_state(), ConnectionState::Failed);

        hub.refuse_connections(false);
        channel.restart();
        wait_for(&mut state, ConnectionState::Connected).await;
        assert_eq!(hub.connect_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_delivery() {
        let hub = Arc::new(FakeHub::default());
        let channel = PushChannel::spawn(hub.clone(), ReconnectPolicy::default());
        let mut events = channel.subscribe();
        let mut state = channel.state();
        wait_for(&mut state, ConnectionState::Connected).await;

        channel.teardown().await;
        assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
        assert!(!hub.publish(CHANGED_1));
        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(matches!(
            channel.subscribe().recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
