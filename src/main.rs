//! Interactive room chat client
//!
//! Thin terminal front end over the `roomchat` library: sign in, pick a
//! room, then stream messages while sending text and attachments.

use anyhow::{bail, Context, Result};
use clap::Parser;
use roomchat::{
    AuthUser, ChannelState, ChatClient, ChatMessage, ClientConfig, MessageContent, RoomClient,
    RoomSession,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser, Debug)]
#[command(name = "roomchat", about = "Room chat client", version)]
struct Cli {
    /// Server base URL
    #[arg(short, long, env = "ROOMCHAT_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Data directory override (defaults to the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "roomchat=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_url(&cli.server)?;

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roomchat")
    });

    let client = ChatClient::new(config, &data_dir).context("failed to open data directory")?;
    let mut input = BufReader::new(stdin()).lines();

    let user = match client.restore_session().await? {
        Some(user) => user,
        None => auth_flow(&client, &mut input).await?,
    };
    println!("Signed in as {} ({})", user.display_name(), user.username);

    dashboard(&client, &mut input).await
}

async fn prompt(input: &mut Input, label: &str) -> Result<String> {
    print!("{}: ", label);
    std::io::stdout().flush()?;
    match input.next_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => bail!("input closed"),
    }
}

async fn auth_flow(client: &ChatClient, input: &mut Input) -> Result<AuthUser> {
    loop {
        let choice = prompt(input, "[s]ign in or [r]egister").await?;
        let result = match choice.as_str() {
            "s" | "signin" => {
                let name = prompt(input, "Username or email").await?;
                let password = prompt(input, "Password").await?;
                client.sign_in(&name, &password).await
            }
            "r" | "register" => {
                let username = prompt(input, "Username").await?;
                let email = prompt(input, "Email").await?;
                let password = prompt(input, "Password").await?;
                let full_name = prompt(input, "Full name").await?;
                client.sign_up(&username, &email, &password, &full_name).await
            }
            _ => continue,
        };
        match result {
            Ok(user) => return Ok(user),
            Err(e) => println!("! {}", e),
        }
    }
}

async fn dashboard(client: &ChatClient, input: &mut Input) -> Result<()> {
    println!("Commands: rooms | create <name> [password] | join <id> [password] | logout | quit");
    loop {
        let line = prompt(input, ">").await?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("rooms") => match client.rooms().await {
                Ok(rooms) if rooms.is_empty() => println!("No rooms yet"),
                Ok(rooms) => {
                    for room in rooms {
                        println!(
                            "  {}  {}",
                            room.room_id,
                            room.room_name.as_deref().unwrap_or("(unnamed)")
                        );
                    }
                }
                Err(e) => println!("! {}", e),
            },
            Some("create") => {
                let Some(name) = parts.next() else {
                    println!("usage: create <name> [password]");
                    continue;
                };
                match client.create_room(name, parts.next()).await {
                    Ok(room_id) => println!("Created room {}", room_id),
                    Err(e) => println!("! {}", e),
                }
            }
            Some("join") => {
                let Some(room_id) = parts.next() else {
                    println!("usage: join <id> [password]");
                    continue;
                };
                if let Err(e) = client.join_room(room_id, parts.next()).await {
                    println!("! {}", e);
                    continue;
                }
                let mut room = match client.enter_room(room_id) {
                    Ok(room) => room,
                    Err(e) => {
                        println!("! {}", e);
                        continue;
                    }
                };
                chat_loop(&mut room, input).await?;
            }
            Some("logout") => {
                client.logout()?;
                println!("Signed out");
                let user = auth_flow(client, input).await?;
                println!("Signed in as {} ({})", user.display_name(), user.username);
            }
            Some("quit") | Some("exit") => return Ok(()),
            Some(other) => println!("unknown command: {}", other),
            None => {}
        }
    }
}

async fn chat_loop(room: &mut RoomClient, input: &mut Input) -> Result<()> {
    println!("In room. /file <path> uploads, /leave returns to the dashboard.");
    let mut printed = 0usize;
    let mut last_state = room.connection_state();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                room.process_events().await;

                let state = room.connection_state();
                if state != last_state {
                    match state {
                        ChannelState::Connected => {
                            let session = room.session();
                            println!(
                                "* connected to {} ({} online)",
                                session.room_name().unwrap_or(session.room_id()),
                                session.online_users()
                            );
                            // History is re-fetched on every (re)connect.
                            printed = 0;
                        }
                        ChannelState::Disconnected => println!("* connection lost, reconnecting..."),
                        _ => {}
                    }
                    last_state = state;
                }

                let session = room.session();
                let messages = session.messages();
                if messages.len() < printed {
                    printed = 0;
                }
                while printed < messages.len() {
                    let msg = &messages[printed];
                    if printed == 0 || !messages[printed - 1].same_day(msg) {
                        println!("--- {} ---", msg.day_label());
                    }
                    print_message(session, msg);
                    printed += 1;
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    room.close();
                    return Ok(());
                };
                let trimmed = line.trim();
                if trimmed == "/leave" {
                    room.close();
                    println!("Left room");
                    return Ok(());
                }
                if let Some(path) = trimmed.strip_prefix("/file ") {
                    match room.send_attachment_path(Path::new(path.trim())).await {
                        Ok(()) => println!("* uploaded"),
                        Err(e) => println!("! {}", e),
                    }
                    continue;
                }
                match room.send_text(&line) {
                    Ok(true) => {}
                    Ok(false) => {
                        if !room.is_connected() {
                            println!("* not connected yet; message not sent");
                        }
                    }
                    Err(e) => println!("! {}", e),
                }
            }
        }
    }
}

fn print_message(session: &RoomSession, msg: &ChatMessage) {
    let who = if msg.sender == session.current_user() {
        "You"
    } else {
        session.display_name(msg)
    };
    let when = msg.time_label();
    match msg.body() {
        MessageContent::Text(text) => println!("[{}] {}: {}", when, who, text),
        MessageContent::Image { url, name } => {
            println!("[{}] {}: [image] {} ({})", when, who, name, url)
        }
        MessageContent::Video { url, name } => {
            println!("[{}] {}: [video] {} ({})", when, who, name, url)
        }
        MessageContent::Audio { url, name } => {
            println!("[{}] {}: [audio] {} ({})", when, who, name, url)
        }
        MessageContent::File { url, name } => {
            println!("[{}] {}: [file] {} ({})", when, who, name, url)
        }
    }
}
