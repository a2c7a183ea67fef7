//! Push-invalidation channel: a reconnecting subscription that tells the
//! client which menus changed remotely.

pub mod driver;
pub mod event_stream;
pub mod machine;

pub use driver::PushChannel;
pub use event_stream::EventStreamTransport;
pub use machine::{ChannelCommand, ChannelEvent, ChannelMachine, ConnectionState, ReconnectPolicy};

use crate::error::ClientResult;
use async_trait::async_trait;

/// Opens one connection. Returning `Ok` means the handshake completed.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> ClientResult<Box<dyn PushStream>>;
}

/// One live connection yielding raw frames.
#[async_trait]
pub trait PushStream: Send {
    /// `Ok(None)` when the server closed the connection.
    async fn next_message(&mut self) -> ClientResult<Option<String>>;

    async fn close(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::ClientError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// In-process stand-in for the push server. Frames published while no
    /// client is connected are lost, like on the real server.
    #[derive(Default)]
    pub struct FakeHub {
        current: Mutex<Option<mpsc::UnboundedSender<String>>>,
        refuse: Mutex<bool>,
        pub connects: AtomicUsize,
    }

    impl FakeHub {
        pub fn publish(&self, frame: &str) -> bool {
            match self.current.lock().as_ref() {
                Some(tx) => tx.send(frame.to_string()).is_ok(),
                None => false,
            }
        }

        pub fn drop_connection(&self) {
            self.current.lock().take();
        }

        pub fn refuse_connections(&self, refuse: bool) {
            *self.refuse.lock() = refuse;
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    pub struct FakeStream {
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl PushTransport for FakeHub {
        async fn connect(&self) -> ClientResult<Box<dyn PushStream>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if *self.refuse.lock() {
                return Err(ClientError::ChannelDisconnected("connection refused".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.current.lock() = Some(tx);
            Ok(Box::new(FakeStream { rx }))
        }
    }

    #[async_trait]
    impl PushStream for FakeStream {
        async fn next_message(&mut self) -> ClientResult<Option<String>> {
            Ok(self.rx.recv().await)
        }

        async fn close(&mut self) {
            self.rx.close();
        }
    }
}
