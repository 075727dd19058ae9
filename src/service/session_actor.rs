use crate::error::PlanetaeError;
use crate::logging::LogSink;
use crate::port::{Connection, RowSet, Statement};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, warn};

/// Messages handled by a session actor. One message is processed at a time,
/// which serializes every statement sent to the underlying connection.
#[derive(Debug)]
pub enum SessionMessage {
    /// Run a row-returning statement.
    Fetch(Statement, RpcReplyPort<Result<RowSet, PlanetaeError>>),
    /// Run a statement for its effect; replies with rows affected.
    Execute(Statement, RpcReplyPort<Result<u64, PlanetaeError>>),
    /// Close the connection and stop the actor.
    Close(RpcReplyPort<Result<(), PlanetaeError>>),
}

/// Handle to the actor owning one live connection.
#[derive(Clone)]
pub struct SessionHandle {
    actor: ActorRef<SessionMessage>,
}

impl SessionHandle {
    pub async fn fetch(&self, statement: Statement) -> Result<RowSet, PlanetaeError> {
        ractor::call!(self.actor, SessionMessage::Fetch, statement)?
    }

    pub async fn execute(&self, statement: Statement) -> Result<u64, PlanetaeError> {
        ractor::call!(self.actor, SessionMessage::Execute, statement)?
    }

    /// Close the connection. The actor stops afterwards, so every later call fails.
    pub async fn close(&self) -> Result<(), PlanetaeError> {
        ractor::call!(self.actor, SessionMessage::Close)?
    }

    /// Stop without a graceful close; `post_stop` releases the connection.
    pub fn abort(&self) {
        self.actor.stop(None);
    }
}

struct SessionState {
    conn: Option<Box<dyn Connection>>,
    log: LogSink,
}

impl SessionState {
    fn conn(&mut self) -> Result<&mut Box<dyn Connection>, PlanetaeError> {
        self.conn
            .as_mut()
            .ok_or_else(|| PlanetaeError::Connection("connection already closed".to_string()))
    }
}

struct SessionActor;

#[ractor::async_trait]
impl Actor for SessionActor {
    type Msg = SessionMessage;
    type State = SessionState;
    type Arguments = (Box<dyn Connection>, LogSink);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        arguments: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (conn, log) = arguments;
        Ok(SessionState {
            conn: Some(conn),
            log,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SessionMessage::Fetch(statement, rp) => {
                state.log.scope(|| {
                    debug!(sql = %statement.sql, params = statement.params.len(), "fetch")
                });
                let result = match state.conn() {
                    Ok(conn) => conn.fetch(&statement).await,
                    Err(e) => Err(e),
                };
                let _ = rp.send(result);
            }
            SessionMessage::Execute(statement, rp) => {
                state.log.scope(|| {
                    debug!(sql = %statement.sql, params = statement.params.len(), "execute")
                });
                let result = match state.conn() {
                    Ok(conn) => conn.execute(&statement).await,
                    Err(e) => Err(e),
                };
                let _ = rp.send(result);
            }
            SessionMessage::Close(rp) => {
                let result = match state.conn.take() {
                    Some(conn) => conn.close().await,
                    None => Ok(()),
                };
                let _ = rp.send(result);
                myself.stop(None);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(conn) = state.conn.take()
            && let Err(e) = conn.close().await
        {
            state
                .log
                .scope(|| warn!("closing abandoned connection failed: {}", e));
        }
        Ok(())
    }
}

/// Spawn a session actor that takes ownership of `conn`.
pub async fn spawn(conn: Box<dyn Connection>, log: LogSink) -> Result<SessionHandle, PlanetaeError> {
    let (actor, _jh) = Actor::spawn(None, SessionActor, (conn, log))
        .await
        .map_err(|e| PlanetaeError::Connection(format!("failed to spawn session actor: {e}")))?;
    Ok(SessionHandle { actor })
}

/// Connection lifecycle of a client or database: idle until first use,
/// open while a session actor owns the connection, closed for good after
/// an explicit close.
pub enum Link {
    Idle,
    Open(SessionHandle),
    Closed,
}

impl Link {
    /// The live session; never connects on its own.
    pub fn handle(&self) -> Result<SessionHandle, PlanetaeError> {
        match self {
            Link::Open(handle) => Ok(handle.clone()),
            Link::Idle => Err(PlanetaeError::Connection("not connected".to_string())),
            Link::Closed => Err(PlanetaeError::Connection("connection closed".to_string())),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Link::Open(_))
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Link::Open(handle) = self {
            handle.abort();
        }
    }
}
