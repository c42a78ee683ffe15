//! Interactive command-line client for the BandHub server
//!
//! Provides a line-oriented interface mirroring the server commands

use bandhub::{BandDraft, Client, Command, Credentials, Payload, Request, Response};
use clap::Parser;
use std::io::{self, Write};

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive BandHub client", long_about = None)]
struct Args {
    /// Address of the server to connect to
    #[arg(long, default_value = "127.0.0.1:8080")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to BandHub server at {}...", args.server);
    let mut client = Client::connect(&args.server).await?;
    println!("Connected! Type 'help' for available commands or 'quit' to exit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_help();
            }
            _ => {
                if let Err(e) = handle_command(&mut client, input).await {
                    println!("Error: {}", e);
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

async fn handle_command(client: &mut Client, input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    let response = match parts.as_slice() {
        ["login", username, password] => client.login(username, password).await?,
        ["register", username, password] => client.register(username, password).await?,
        ["execute_script", path] => {
            let script = std::fs::read_to_string(path)?;
            let requests = parse_script(&script)?;
            client
                .request(Command::ExecuteScript { requests })
                .await?
        }
        _ => match parse_request(&parts) {
            Ok(request) => client.request(request.command).await?,
            Err(usage) => {
                println!("{}", usage);
                return Ok(());
            }
        },
    };

    print_response(&response, 0);
    Ok(())
}

/// Turn a script file into requests, one per non-empty, non-comment line
fn parse_script(script: &str) -> Result<Vec<Request>, String> {
    script
        .lines()
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            parse_request(&parts).map_err(|usage| format!("line {}: {}", number + 1, usage))
        })
        .collect()
}

fn parse_request(parts: &[&str]) -> Result<Request, String> {
    let command = match parts {
        ["login", username, password] => {
            return Ok(Request::authenticated(
                Command::Login,
                Credentials::new(*username, *password),
            ))
        }
        ["register", username, password] => {
            return Ok(Request::authenticated(
                Command::Register,
                Credentials::new(*username, *password),
            ))
        }
        ["load"] => Command::Load,
        ["info"] => Command::Info,
        ["clear"] => Command::Clear,
        ["add", band @ ..] => Command::Add {
            band: parse_band(band)?,
        },
        ["add_if_min", band @ ..] => Command::AddIfMin {
            band: parse_band(band)?,
        },
        ["add_if_max", band @ ..] => Command::AddIfMax {
            band: parse_band(band)?,
        },
        ["insert_at", index, band @ ..] => Command::InsertAt {
            index: index.parse().map_err(|_| "index must be an integer")?,
            band: parse_band(band)?,
        },
        ["update", id, band @ ..] => Command::Update {
            id: id.parse().map_err(|_| "id must be an integer")?,
            band: parse_band(band)?,
        },
        ["remove", id] => Command::Remove {
            id: id.parse().map_err(|_| "id must be an integer")?,
        },
        ["count_lesser_genre", genre] => Command::CountLesserGenre {
            genre: genre.to_string(),
        },
        _ => return Err(format!("Unknown command: {}. Type 'help' for usage.", parts.join(" "))),
    };
    Ok(Request::new(command))
}

/// <name> <x> <y> <participants> <albums> [genre]
fn parse_band(parts: &[&str]) -> Result<BandDraft, String> {
    const USAGE: &str = "expected: <name> <x> <y> <participants> <albums> [genre]";
    let (name, x, y, participants, albums, genre) = match parts {
        [name, x, y, participants, albums] => (name, x, y, participants, albums, None),
        [name, x, y, participants, albums, genre] => {
            (name, x, y, participants, albums, Some(genre.to_string()))
        }
        _ => return Err(USAGE.to_string()),
    };

    let number = |s: &str| s.parse::<f64>().map_err(|_| USAGE.to_string());
    let integer = |s: &str| s.parse::<i64>().map_err(|_| USAGE.to_string());
    let mut draft = BandDraft::new(
        *name,
        number(*x)?,
        number(*y)?,
        integer(*participants)?,
        integer(*albums)?,
    );
    draft.genre = genre;
    Ok(draft)
}

fn print_response(response: &Response, indent: usize) {
    let pad = " ".repeat(indent);
    println!("{}[{:?}] {}", pad, response.status, response.message);
    match &response.payload {
        Some(Payload::Collection(bands)) => {
            for band in bands {
                println!(
                    "{}  #{} {} ({} members, {} albums, genre {}) owned by {}",
                    pad,
                    band.id,
                    band.name,
                    band.number_of_participants,
                    band.albums_count,
                    band.genre.map(|g| g.as_str()).unwrap_or("-"),
                    band.owner_username
                );
            }
        }
        Some(Payload::Count(count)) => println!("{}  {}", pad, count),
        Some(Payload::Id(id)) => println!("{}  id {}", pad, id),
        Some(Payload::Info(info)) => {
            println!("{}  type: {}", pad, info.element_type);
            println!("{}  size: {}", pad, info.size);
            println!("{}  initialized: {}", pad, info.initialized_at);
            match info.last_modified {
                Some(at) => println!("{}  last modified: {}", pad, at),
                None => println!("{}  last modified: never", pad),
            }
        }
        Some(Payload::Script(responses)) => {
            for response in responses {
                print_response(response, indent + 2);
            }
        }
        None => {}
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  register <user> <password>   - Create an account and log in");
    println!("  login <user> <password>      - Log in");
    println!("  load                         - Show the whole collection");
    println!("  info                         - Show collection metadata");
    println!("  add <band>                   - Add a band");
    println!("  insert_at <index> <band>     - Insert a band at a position");
    println!("  update <id> <band>           - Replace one of your bands");
    println!("  remove <id>                  - Remove one of your bands");
    println!("  clear                        - Remove all of your bands");
    println!("  add_if_min <band>            - Add if smaller than every band");
    println!("  add_if_max <band>            - Add if greater than every band");
    println!("  count_lesser_genre <genre>   - Count bands with an earlier genre");
    println!("  execute_script <file>        - Run commands from a file");
    println!("  help                         - Show this help");
    println!("  quit/exit                    - Exit the client");
    println!();
    println!("<band> is: <name> <x> <y> <participants> <albums> [genre]");
    println!("genres: PROGRESSIVE_ROCK HIP_HOP PSYCHEDELIC_CLOUD_RAP SOUL POST_PUNK");
}
