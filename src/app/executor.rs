use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;

use super::events::Event;

/// A deferred, possibly-blocking unit of work. It has no access to core
/// state; on completion it resolves to exactly one [`Event`] which re-enters
/// the dispatcher's queue.
pub struct AsyncCommand {
    fut: BoxFuture<'static, Event>,
}

impl AsyncCommand {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Event> + Send + 'static,
    {
        Self { fut: fut.boxed() }
    }

    /// A command that resolves immediately; used for events the dispatcher
    /// wants delivered on a later tick rather than handled inline.
    pub fn ready(event: Event) -> Self {
        Self::new(async move { event })
    }
}

impl std::fmt::Debug for AsyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AsyncCommand")
    }
}

/// Schedules async commands onto the runtime and feeds their single result
/// event back through the serialized queue.
///
/// The dispatcher never polls or blocks on a scheduled command; the event
/// channel is the only synchronization point.
#[derive(Clone)]
pub struct CommandExecutor {
    events: UnboundedSender<Event>,
}

impl CommandExecutor {
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self { events }
    }

    pub fn schedule(&self, command: AsyncCommand) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let event = command.fut.await;
            // Receiver gone means the loop is shutting down; nothing to do.
            let _ = tx.send(event);
        });
    }
}
