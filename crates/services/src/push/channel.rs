use std::collections::VecDeque;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Sleep, sleep, timeout};
use url::Url;

use roadmap_core::model::UserId;

use crate::error::PushError;

use super::handler::PushEventHandler;
use super::message::ClientMessage;
use super::reconnect::{ChannelState, Directive, ReconnectPolicy, ReconnectionManager};
use super::transport::{Frame, PushConnection, PushTransport};

#[derive(Debug)]
enum Command {
    Login(UserId),
    Logout,
    Connect,
    Disconnect,
    Shutdown,
}

type Opening = Pin<Box<dyn Future<Output = Result<Box<dyn PushConnection>, PushError>> + Send>>;

/// Handle to the push channel supervisor task.
///
/// The task owns the connection, any in-flight connect, the reconnect timer and
/// the `ReconnectionManager`; this handle only sends commands and observes state.
pub struct PushChannel {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Start the supervisor on the current tokio runtime. Nothing connects
    /// until an identity is set.
    #[must_use]
    pub fn spawn(
        url: Url,
        policy: ReconnectPolicy,
        transport: Arc<dyn PushTransport>,
        handler: PushEventHandler,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChannelState::Disconnected);
        let supervisor = Supervisor {
            url,
            connect_timeout: policy.connect_timeout,
            manager: ReconnectionManager::new(policy),
            transport,
            handler,
            commands: rx,
            state: state_tx,
            conn: None,
            opening: None,
            timer: None,
            opened_before: false,
        };
        let task = tokio::spawn(supervisor.run());
        Self {
            commands,
            state,
            task,
        }
    }

    /// `Some` logs a user in (switching users reconnects); `None` logs out.
    pub fn set_identity(&self, user: Option<UserId>) {
        self.send(match user {
            Some(user) => Command::Login(user),
            None => Command::Logout,
        });
    }

    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Close with 1000 and stay down until `connect` or a new login.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Close the connection, cancel any pending reconnect and wait for the task.
    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "push supervisor ended abnormally");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("push supervisor already stopped");
        }
    }
}

struct Supervisor {
    url: Url,
    connect_timeout: Duration,
    manager: ReconnectionManager,
    transport: Arc<dyn PushTransport>,
    handler: PushEventHandler,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ChannelState>,
    conn: Option<Box<dyn PushConnection>>,
    /// Connect plus authenticate in flight; dropping it abandons the attempt.
    opening: Option<Opening>,
    timer: Option<Pin<Box<Sleep>>>,
    /// Any open after the first follows a gap in which events were missed.
    opened_before: bool,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            let directives = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Login(user)) => self.manager.login(user),
                    Some(Command::Logout) => self.manager.logout(),
                    Some(Command::Connect) => self.manager.connect(),
                    Some(Command::Disconnect) => self.manager.disconnect(),
                    Some(Command::Shutdown) | None => break,
                },
                opened = connecting(&mut self.opening) => {
                    self.opening = None;
                    match opened {
                        Ok(conn) => self.on_open(conn).await,
                        Err(err) => {
                            tracing::warn!(error = %err, "push channel connect failed");
                            self.manager.on_connect_failed()
                        }
                    }
                },
                frame = next_frame(&mut self.conn) => match frame {
                    Frame::Text(text) => {
                        self.handler.handle_text(&text).await;
                        Vec::new()
                    }
                    Frame::Closed(code) => {
                        tracing::info!(code, "push channel closed");
                        self.conn = None;
                        self.manager.on_close(code)
                    }
                },
                () = fire(&mut self.timer) => {
                    self.timer = None;
                    tracing::debug!("reconnect timer fired");
                    self.manager.on_timer_fired()
                }
            };
            self.execute(directives).await;
        }

        let directives = self.manager.teardown();
        self.execute(directives).await;
        tracing::debug!("push supervisor stopped");
    }

    async fn on_open(&mut self, conn: Box<dyn PushConnection>) -> Vec<Directive> {
        tracing::info!(url = %self.url, "push channel open");
        self.conn = Some(conn);
        if self.opened_before {
            self.handler.resync().await;
        }
        self.opened_before = true;
        self.manager.on_open()
    }

    async fn execute(&mut self, directives: Vec<Directive>) {
        let mut queue = VecDeque::from(directives);
        while let Some(directive) = queue.pop_front() {
            match directive {
                Directive::Connect(user) => {
                    let attempt = open(Arc::clone(&self.transport), self.url.clone(), user);
                    let limit = self.connect_timeout;
                    let opening: Opening = Box::pin(async move {
                        timeout(limit, attempt).await.map_err(|_| {
                            PushError::Connect(format!("no answer within {}ms", limit.as_millis()))
                        })?
                    });
                    self.opening = Some(opening);
                }
                Directive::Close(code) => {
                    if self.opening.take().is_some() {
                        tracing::debug!("pending connect abandoned");
                    }
                    if let Some(mut conn) = self.conn.take() {
                        conn.close(code).await;
                    }
                }
                Directive::ScheduleReconnect(delay) => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    tracing::info!(delay_ms, "reconnect scheduled");
                    self.timer = Some(Box::pin(sleep(delay)));
                }
                Directive::CancelReconnect => {
                    self.timer = None;
                }
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.state.send_replace(self.manager.state());
    }
}

// The authenticate message goes out before anything else on a new socket.
async fn open(
    transport: Arc<dyn PushTransport>,
    url: Url,
    user: UserId,
) -> Result<Box<dyn PushConnection>, PushError> {
    let mut conn = transport.connect(&url).await?;
    let hello = ClientMessage::Authenticate { user_id: user }.encode()?;
    conn.send_text(hello).await?;
    Ok(conn)
}

async fn connecting(opening: &mut Option<Opening>) -> Result<Box<dyn PushConnection>, PushError> {
    match opening {
        Some(opening) => opening.as_mut().await,
        None => future::pending().await,
    }
}

async fn next_frame(conn: &mut Option<Box<dyn PushConnection>>) -> Frame {
    match conn {
        Some(conn) => conn.next_frame().await,
        None => future::pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => future::pending().await,
    }
}
