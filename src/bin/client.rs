//! Chat Client - Entry Point
//!
//! Connects to a server, runs the login/register prompt loop, then forwards
//! stdin lines while printing everything the server relays.

use std::env;
use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tracing_subscriber::EnvFilter;

use broadcast_chat::{AppError, AuthMode, AuthReply, ClientConfig, ClientSession, SenderExit, ServerEvent};

const UNREACHABLE: &str = "Server is unreachable.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig::from_args(env::args().skip(1));
    let mut input = BufReader::new(tokio::io::stdin());

    let addr = match config.addr.clone() {
        Some(addr) => addr,
        None => {
            println!("Please provide host:port:");
            prompt_line(&mut input).await?.trim().to_string()
        }
    };

    let mut session = match ClientSession::connect(&addr, config.write_timeout).await {
        Ok(session) => session,
        Err(e) => {
            println!("{}", e);
            return Ok(());
        }
    };

    if let Err(e) = authenticate(&mut session, &mut input).await {
        // Local input ending is not a server problem
        if e.downcast_ref::<AppError>().is_some() {
            println!("{}", UNREACHABLE);
        }
        return Ok(());
    }

    let (mut sender, mut receiver) = session.split();

    tokio::spawn(async move {
        if sender.forward(input).await == SenderExit::Unreachable {
            println!("{}", UNREACHABLE);
        }
    });

    loop {
        match receiver.next_event().await {
            ServerEvent::Line(line) => println!("{}", line),
            ServerEvent::Shutdown => {
                println!("Server has shut down.");
                break;
            }
            ServerEvent::Disconnect => {
                println!("Disconnecting...");
                break;
            }
            ServerEvent::Unreachable => {
                println!("{}", UNREACHABLE);
                break;
            }
        }
    }

    // Stdin reads cannot be cancelled; leave without waiting on them
    std::process::exit(0);
}

async fn prompt_line(input: &mut BufReader<Stdin>) -> std::io::Result<String> {
    std::io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Prompt for mode, then for credentials until the server accepts them
async fn authenticate(
    session: &mut ClientSession,
    input: &mut BufReader<Stdin>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Hello! Would you like to log in or register a new account?\n1)Log in\n2)Register");
    let mode = loop {
        match AuthMode::parse(&prompt_line(input).await?) {
            Some(mode) => break mode,
            None => println!("Please enter 1 or 2."),
        }
    };
    session.select_mode(mode).await?;

    loop {
        print!("Username: ");
        let username = prompt_line(input).await?;
        print!("Password: ");
        let password = prompt_line(input).await?;

        match session.submit_credentials(&username, &password).await? {
            AuthReply::Success => {
                println!("Welcome, {}!\nType \"DISCONNECT\" to exit.", username);
                return Ok(());
            }
            AuthReply::Failure => println!("{}", mode.failure_message()),
        }
    }
}
