use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::error;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinSet};

const ACTOR_CHANNEL_SIZE: usize = 8;

#[async_trait]
pub trait Actor: Sized + Send + 'static {
    type Message: Send + 'static;
    type Options: Send;

    fn name() -> &'static str;

    fn new(options: Self::Options) -> Self;

    /// One-time setup before the first message is processed.
    async fn start(&mut self, _ctx: &mut ActorContext<Self>) {}

    /// Process one message and return the next action.
    /// Messages are processed sequentially, so this method must not block,
    /// otherwise the actor event loop would be stalled.
    /// If the actor needs to perform async operations, it should spawn tasks
    /// via [`ActorContext::spawn`].
    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction;

    /// One-time cleanup after the last message has been processed.
    async fn stop(self, _ctx: &mut ActorContext<Self>) {}
}

pub enum ActorAction {
    Continue,
    Stop,
}

pub struct ActorContext<T: Actor> {
    handle: ActorHandle<T>,
    /// Messages the actor sent to itself.
    /// They are delivered in order before any further external messages.
    queue: VecDeque<T::Message>,
    /// A set of tasks spawned by the actor when processing messages.
    /// All these tasks will be aborted when the context is dropped.
    tasks: JoinSet<()>,
}

impl<T: Actor> ActorContext<T> {
    fn new(handle: &ActorHandle<T>) -> Self {
        Self {
            handle: handle.clone(),
            queue: VecDeque::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn handle(&self) -> &ActorHandle<T> {
        &self.handle
    }

    /// Enqueue a message for this actor.
    /// The message is processed after the current handler returns,
    /// before any message from the external inbox.
    pub fn send(&mut self, message: T::Message) {
        self.queue.push_back(message);
    }

    /// Deliver a message to this actor after a delay.
    /// The delivery order among messages with equal deadlines is unspecified,
    /// and delayed messages are never cancelled. A message whose precondition
    /// may no longer hold when it fires must carry its own validation data
    /// and be verified against the actor state at that time.
    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = handle.send(message).await;
        });
    }

    /// Spawn a task and save the handle in the context.
    /// When the task outcome matters to the actor, the task should report it
    /// by sending a message to the actor handle.
    pub fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) -> AbortHandle {
        self.tasks.spawn(task)
    }

    /// Join tasks that have completed and log panics.
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("failed to join task spawned by the {} actor: {e}", T::name());
                }
            }
        }
    }
}

pub struct ActorHandle<T: Actor> {
    sender: mpsc::Sender<T::Message>,
    stopped: watch::Receiver<bool>,
}

impl<T: Actor> Clone for ActorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T: Actor> ActorHandle<T> {
    pub async fn send(
        &self,
        message: T::Message,
    ) -> Result<(), mpsc::error::SendError<T::Message>> {
        self.sender.send(message).await
    }

    pub async fn wait_for_stop(mut self) {
        // We ignore the receiver error since the sender must have been dropped
        // in this case, which means the actor has stopped.
        let _ = self.stopped.wait_for(|x| *x).await;
    }
}

/// A collection of actors spawned into detached event loop tasks.
/// The system can be joined to wait for all its actors to stop.
pub struct ActorSystem {
    tasks: JoinSet<()>,
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSystem {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<T: Actor>(&mut self, options: T::Options) -> ActorHandle<T> {
        let (tx, rx) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let handle = ActorHandle {
            sender: tx,
            stopped: stopped_rx,
        };
        let runner = ActorRunner {
            actor: T::new(options),
            ctx: ActorContext::new(&handle),
            receiver: rx,
            stopped: stopped_tx,
        };
        self.tasks.spawn(runner.run());
        handle
    }

    /// Wait for all actors in the system to stop.
    pub async fn join(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}

struct ActorRunner<T: Actor> {
    actor: T,
    ctx: ActorContext<T>,
    receiver: mpsc::Receiver<T::Message>,
    stopped: watch::Sender<bool>,
}

impl<T: Actor> ActorRunner<T> {
    async fn run(mut self) {
        self.actor.start(&mut self.ctx).await;
        'event: loop {
            while let Some(message) = self.ctx.queue.pop_front() {
                match self.actor.receive(&mut self.ctx, message) {
                    ActorAction::Continue => {}
                    ActorAction::Stop => break 'event,
                }
            }
            self.ctx.reap();
            let Some(message) = self.receiver.recv().await else {
                break;
            };
            match self.actor.receive(&mut self.ctx, message) {
                ActorAction::Continue => {}
                ActorAction::Stop => break,
            }
        }
        let Self {
            actor,
            mut ctx,
            receiver,
            stopped,
        } = self;
        drop(receiver);
        actor.stop(&mut ctx).await;
        let _ = stopped.send(true);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    struct TestActor {
        seen: Vec<String>,
    }

    enum TestMessage {
        Note {
            value: String,
        },
        Fanout,
        Later {
            value: String,
            delay: Duration,
        },
        Read {
            reply: oneshot::Sender<Vec<String>>,
        },
        Stop,
    }

    impl Actor for TestActor {
        type Message = TestMessage;
        type Options = ();

        fn name() -> &'static str {
            "TestActor"
        }

        fn new(_options: Self::Options) -> Self {
            Self { seen: vec![] }
        }

        fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction {
            match message {
                TestMessage::Note { value } => {
                    self.seen.push(value);
                    ActorAction::Continue
                }
                TestMessage::Fanout => {
                    ctx.send(TestMessage::Note {
                        value: "first".to_string(),
                    });
                    ctx.send(TestMessage::Note {
                        value: "second".to_string(),
                    });
                    ActorAction::Continue
                }
                TestMessage::Later { value, delay } => {
                    ctx.send_with_delay(TestMessage::Note { value }, delay);
                    ActorAction::Continue
                }
                TestMessage::Read { reply } => {
                    let _ = reply.send(self.seen.clone());
                    ActorAction::Continue
                }
                TestMessage::Stop => ActorAction::Stop,
            }
        }
    }

    async fn read(handle: &ActorHandle<TestActor>) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        handle
            .send(TestMessage::Read { reply: tx })
            .await
            .expect("the actor should be running");
        rx.await.expect("the actor should reply")
    }

    #[tokio::test]
    async fn test_actor_processes_messages_in_order() {
        let mut system = ActorSystem::new();
        let handle: ActorHandle<TestActor> = system.spawn(());
        for value in ["a", "b", "c"] {
            handle
                .send(TestMessage::Note {
                    value: value.to_string(),
                })
                .await
                .unwrap();
        }
        assert_eq!(read(&handle).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_actor_internal_sends_precede_external_messages() {
        let mut system = ActorSystem::new();
        let handle: ActorHandle<TestActor> = system.spawn(());
        handle.send(TestMessage::Fanout).await.unwrap();
        handle
            .send(TestMessage::Note {
                value: "third".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(read(&handle).await, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actor_delayed_send() {
        let mut system = ActorSystem::new();
        let handle: ActorHandle<TestActor> = system.spawn(());
        handle
            .send(TestMessage::Later {
                value: "tick".to_string(),
                delay: Duration::from_secs(60),
            })
            .await
            .unwrap();
        assert_eq!(read(&handle).await, Vec::<String>::new());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(read(&handle).await, vec!["tick"]);
    }

    #[tokio::test]
    async fn test_actor_stop() {
        let mut system = ActorSystem::new();
        let handle: ActorHandle<TestActor> = system.spawn(());
        handle.send(TestMessage::Stop).await.unwrap();
        handle.clone().wait_for_stop().await;
        system.join().await;
    }
}
