//! The Command Dispatcher: a registry of named handlers plus the six
//! built-in commands (grounded on `original_source/commands.go`).

use crate::persist::Spooler;
use crate::topic::{Router, BASIC_TOPIC};
use broker_protocol::{Command, CommandTag};
use broker_std::errors::{HandlerError, Result};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The collaborators a handler may call into: `Broadcast` (Publish to
/// `basic`), `Respond` (Unicast to the command's source), and `Persist`.
pub struct Collaborators {
    pub router: Arc<Router>,
    pub spooler: Spooler,
}

impl Collaborators {
    async fn broadcast(&self, command: &Command) -> Result<()> {
        let bytes = broker_protocol::encode(command)?;
        self.router.publish(BASIC_TOPIC, &bytes).await
    }

    async fn respond(&self, command: &Command) -> Result<()> {
        let Some(source) = command.source else {
            return Ok(());
        };
        let bytes = broker_protocol::encode(command)?;
        self.router.unicast(source, &bytes).await
    }

    fn persist(&self, command: &Command) -> Result<()> {
        let Some(source) = command.source else {
            return Ok(());
        };
        let bytes = broker_protocol::encode(command)?;
        self.spooler.add_entry(&source.as_key(), &bytes);
        Ok(())
    }
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
type HandlerFn = Arc<dyn for<'a> Fn(&'a mut Command, &'a Collaborators) -> HandlerFuture<'a> + Send + Sync>;

/// Looks up a handler by `command.command`, returning `NoHandler` if the tag
/// was never registered. Re-registering a tag replaces its handler.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<CommandTag, HandlerFn>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// `handler` is a plain function (not `async fn`) that boxes its own
    /// async body — the usual shape for a dyn-compatible async handler
    /// table, since a single associated `Future` type can't vary with the
    /// borrowed lifetime the way a generic `async fn` parameter would need.
    pub fn register<F>(&mut self, tag: CommandTag, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Command, &'a Collaborators) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handlers.insert(tag, Arc::new(handler));
        self
    }

    pub async fn handle(&self, command: &mut Command, collaborators: &Collaborators) -> Result<()> {
        let handler = self
            .handlers
            .get(&command.command)
            .ok_or_else(|| HandlerError::NoHandler(command.command.to_string()))?
            .clone();
        handler(command, collaborators).await.map_err(|e| {
            HandlerError::Failed(command.command.to_string(), e.to_string()).into()
        })
    }

    pub fn registered_tags(&self) -> Vec<String> {
        self.handlers.keys().map(CommandTag::to_string).collect()
    }
}

/// Registers the six built-in command handlers.
pub fn register_builtins(dispatcher: &mut Dispatcher) {
    dispatcher
        .register(CommandTag::Echo, echo)
        .register(CommandTag::Shutdown, shutdown)
        .register(CommandTag::Disconnect, disconnect)
        .register(CommandTag::Get, get)
        .register(CommandTag::Set, set_update_msg)
        .register(CommandTag::Update, set_update_msg)
        .register(CommandTag::Msg, set_update_msg);
}

fn echo<'a>(command: &'a mut Command, collab: &'a Collaborators) -> HandlerFuture<'a> {
    Box::pin(async move {
        command.update_timestamp();
        collab.broadcast(command).await
    })
}

fn set_update_msg<'a>(command: &'a mut Command, collab: &'a Collaborators) -> HandlerFuture<'a> {
    Box::pin(async move {
        collab.persist(command)?;
        collab.broadcast(command).await
    })
}

fn disconnect<'a>(command: &'a mut Command, collab: &'a Collaborators) -> HandlerFuture<'a> {
    Box::pin(async move {
        if let Some(source) = command.source {
            collab.router.unsubscribe(BASIC_TOPIC, source).await;
        }
        Ok(())
    })
}

fn shutdown<'a>(_command: &'a mut Command, collab: &'a Collaborators) -> HandlerFuture<'a> {
    Box::pin(async move {
        // Routed through the same graceful Close path used by Ctrl-C; the
        // net::NetworkManager observes the router's closed flag and
        // unwinds the ingest/egress loops.
        collab.router.close().await;
        Ok(())
    })
}

/// `get`'s two known params, `help` and `clients`. If both are given, the
/// second clobbers `payload.response` and each still triggers its own
/// `Respond` — the original's last-writer-wins quirk, intentionally
/// retained rather than silently fixed.
fn get<'a>(command: &'a mut Command, collab: &'a Collaborators) -> HandlerFuture<'a> {
    Box::pin(async move {
        command.update_timestamp();

        for param in command.params() {
            match param.as_str() {
                "help" => {
                    command.set_response(json!(help_list()));
                    collab.respond(command).await?;
                }
                "clients" => {
                    command.set_response(json!(collab.router.client_addresses().await));
                    collab.respond(command).await?;
                }
                _ => {}
            }
        }

        Ok(())
    })
}

fn help_list() -> Vec<&'static str> {
    CommandTag::ALL.iter().map(CommandTag::as_str).collect()
}
