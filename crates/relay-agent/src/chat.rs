//! `relay chat`: terminal client over the reconnect supervisor.

use anyhow::{Context, Result};
use clap::Args;
use relay_client::{
    ChatState, Outbox, ReconnectSupervisor, SupervisorConfig, SupervisorHandler, WsConnector,
};
use relay_core::constants::DEFAULT_ROOM;
use relay_core::{ClientAction, ControlEvent, ServerEvent};
use relay_settings::RelaySettings;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Args, Debug)]
pub(crate) struct ChatArgs {
    /// Display name.
    #[arg(long)]
    username: String,

    /// Room to join on connect.
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,

    /// Server URL (overrides settings).
    #[arg(long)]
    url: Option<String>,
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Say(String),
    Join(String),
    History(Option<i64>),
    Reconnect,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Input::Say(line.to_owned()));
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("join"), Some(room)) => Some(Input::Join(room.to_owned())),
        (Some("history"), limit) => Some(Input::History(limit.and_then(|l| l.parse().ok()))),
        (Some("reconnect"), None) => Some(Input::Reconnect),
        (Some("quit"), None) => Some(Input::Quit),
        _ => {
            eprintln!("commands: /join ROOM, /history [LIMIT], /reconnect, /quit");
            None
        }
    }
}

/// Prints events and re-identifies on every open.
struct Printer {
    username: String,
    room: String,
    state: ChatState,
}

impl SupervisorHandler for Printer {
    fn on_open(&mut self, outbox: &Outbox) {
        let room = self
            .state
            .conversation_id()
            .map_or_else(|| self.room.clone(), str::to_owned);
        let _ = outbox.send(&ClientAction::Identify {
            user_id: None,
            username: Some(self.username.clone()),
        });
        let _ = outbox.send(&ClientAction::Join {
            conversation_id: Some(room),
        });
    }

    fn on_event(&mut self, event: ServerEvent, _outbox: &Outbox) {
        self.state.apply(&event);
        match &event {
            ServerEvent::Chat(m) if m.is_system() => println!("* {}", m.content),
            ServerEvent::Chat(m) => println!("<{}> {}", m.username, m.content),
            ServerEvent::Control(ControlEvent::Joined { conversation_id }) => {
                println!("-- joined #{conversation_id}");
            }
            ServerEvent::Control(ControlEvent::History { messages, .. }) => {
                for m in messages {
                    println!("  [{}] <{}> {}", m.timestamp.format("%H:%M"), m.username, m.content);
                }
            }
            ServerEvent::Control(ControlEvent::Typing {
                username, is_typing, ..
            }) if *is_typing => println!("  ({username} is typing)"),
            ServerEvent::Control(ControlEvent::Error { message }) => eprintln!("! {message}"),
            ServerEvent::Control(_) => {}
        }
    }

    fn on_close(&mut self) {
        self.state.reset_connection();
        eprintln!("-- disconnected");
    }

    fn on_error(&mut self, reason: &str) {
        eprintln!("-- connection error: {reason}");
    }
}

pub(crate) async fn run(settings: &RelaySettings, args: ChatArgs) -> Result<()> {
    let url = args.url.unwrap_or_else(|| settings.client.url.clone());
    tracing::info!(%url, username = %args.username, room = %args.room, "starting chat client");

    let printer = Printer {
        username: args.username,
        room: args.room,
        state: ChatState::new(),
    };
    let handle = ReconnectSupervisor::spawn(
        WsConnector::new(url),
        printer,
        SupervisorConfig::from(&settings.client),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match parse_input(&line) {
                    Some(Input::Say(content)) => handle.send(ClientAction::Message { content }),
                    Some(Input::Join(room)) => handle.send(ClientAction::Join {
                        conversation_id: Some(room),
                    }),
                    Some(Input::History(limit)) => handle.send(ClientAction::History {
                        conversation_id: None,
                        limit,
                        offset: None,
                    }),
                    Some(Input::Reconnect) => handle.reconnect(),
                    Some(Input::Quit) => break,
                    None => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await.context("Chat client did not stop cleanly")?;
    Ok(())
}
