// Quiz Live CLI Validation Tool
// Mints test credentials, joins rooms interactively and replays the live-session
// scenarios against a running server.

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Parser)]
#[command(name = "quiz-cli")]
#[command(about = "Quiz Live Server CLI Validation Tool", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// HS256 secret used to mint credentials (must match AUTH_JWT_SECRET)
    #[arg(long, default_value = "dev-secret-change-me")]
    secret: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Show live room and connection counts
    Stats,

    /// Mint a signed session credential
    Token {
        /// User id claim (omit for an anonymous guest)
        #[arg(short, long)]
        user_id: Option<String>,

        /// Role claim
        #[arg(short, long, default_value = "student")]
        role: String,

        /// School id claim
        #[arg(long)]
        school_id: Option<String>,
    },

    /// Join a room and stream its events; type commands to interact
    Join {
        /// Room (game session) id
        #[arg(short, long)]
        room_id: String,

        /// User id claim for the minted credential
        #[arg(short, long)]
        user_id: Option<String>,

        /// Role claim for the minted credential
        #[arg(long, default_value = "student")]
        role: String,
    },

    /// Run automated validation scenarios
    Validate {
        /// Run all validation tests
        #[arg(short, long)]
        all: bool,

        /// Test specific scenario
        #[arg(short, long)]
        scenario: Option<String>,
    },
}

const SCENARIOS: [(&str, &str); 6] = [
    ("auth", "Upgrade without a credential is refused"),
    ("join", "First join creates the room with an empty chat history"),
    ("answer", "A submitted answer is pending and listed"),
    ("validate", "Validating with 15 points updates the score to 15"),
    ("disconnect", "Dropping a connection broadcasts userLeft"),
    ("concurrent-join", "Two simultaneous joins share one room"),
];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Stats => {
            check_stats(&cli.server).await;
        }
        Commands::Token { user_id, role, school_id } => {
            let token = mint_token(&cli.secret, user_id.as_deref(), role, school_id.as_deref());
            println!("{}", token);
        }
        Commands::Join { room_id, user_id, role } => {
            join_room(&cli, room_id, user_id.as_deref(), role).await;
        }
        Commands::Validate { all, scenario } => {
            if *all {
                run_all_validations(&cli).await;
            } else if let Some(s) = scenario {
                run_scenario(&cli, s).await;
            } else {
                println!("{}", "Use --all or --scenario <name>".yellow());
                list_scenarios();
            }
        }
    }
}

fn mint_token(secret: &str, user_id: Option<&str>, role: &str, school_id: Option<&str>) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        + 3600;

    let mut claims = json!({ "role": role, "exp": exp });
    if let Some(id) = user_id {
        claims["id"] = json!(id);
    }
    if let Some(school) = school_id {
        claims["schoolId"] = json!(school);
    }

    match encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())) {
        Ok(token) => token,
        Err(e) => {
            println!("{} Failed to sign credential: {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
}

fn ws_url(server: &str, token: &str) -> String {
    format!("ws://{}/game?token={}", server, urlencoding::encode(token))
}

async fn connect_as(cli: &Cli, user_id: &str, role: &str) -> Option<Socket> {
    let token = mint_token(&cli.secret, Some(user_id), role, None);
    match connect_async(ws_url(&cli.server, &token)).await {
        Ok((ws_stream, _)) => Some(ws_stream),
        Err(e) => {
            println!("{} Connection failed for {}: {}", "✗".red(), user_id, e);
            None
        }
    }
}

async fn send_event(socket: &mut Socket, event: Value) -> bool {
    socket.send(Message::Text(event.to_string())).await.is_ok()
}

/// Reads events until `name` arrives or three seconds pass.
async fn wait_for(socket: &mut Socket, name: &str) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(event) = serde_json::from_str::<Value>(&text) {
                    if event["event"] == name {
                        return Some(event);
                    }
                }
            }
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/game/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_stats(server: &str) {
    println!("{}", "Fetching live statistics...".cyan());

    let url = format!("http://{}/game/stats", server);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(body) => {
                println!("  Rooms: {}", body["rooms"].to_string().green());
                println!("  Connections: {}", body["connections"].to_string().green());
            }
            Err(e) => println!("{} Unexpected response body: {}", "✗".red(), e),
        },
        Ok(resp) => println!("{} Stats request failed: {}", "✗".red(), resp.status()),
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

async fn join_room(cli: &Cli, room_id: &str, user_id: Option<&str>, role: &str) {
    println!("{}", "Joining room...".cyan());
    println!("  Room ID: {}", room_id);
    println!("  User: {}", user_id.unwrap_or("(guest)"));

    let token = mint_token(&cli.secret, user_id, role, None);
    let socket = match connect_async(ws_url(&cli.server, &token)).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            return;
        }
    };
    let (mut write, mut read) = socket.split();

    if write
        .send(Message::Text(json!({ "event": "joinGame", "data": room_id }).to_string()))
        .await
        .is_err()
    {
        println!("{} Failed to send joinGame", "✗".red());
        return;
    }
    println!("{} Joined {}", "✓".green(), room_id.green().bold());
    print_join_help();

    let receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                println!("\n{} {}", "◀".green(), text.bright_white());
            }
        }
    });

    loop {
        print!("{} ", "►".cyan());
        if io::stdout().flush().is_err() {
            break;
        }

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            println!("Goodbye!");
            break;
        }
        if input == "help" {
            print_join_help();
            continue;
        }

        let Some(event) = parse_command(room_id, input) else {
            println!("{} Unknown command. Type 'help' for usage.", "✗".yellow());
            continue;
        };
        if write.send(Message::Text(event.to_string())).await.is_err() {
            println!("{} Failed to send message", "✗".red());
            break;
        }
    }

    receive_task.abort();
}

/// Maps a shell command to a client event for `room_id`.
fn parse_command(room_id: &str, input: &str) -> Option<Value> {
    let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
    let rest = rest.trim();

    let event = match command {
        "answer" => json!({ "event": "sendAnswer", "data": { "gameId": room_id, "answer": rest } }),
        "say" => json!({ "event": "sendMessage", "data": { "gameId": room_id, "content": rest } }),
        "typing" => json!({ "event": "typing", "data": { "gameId": room_id } }),
        "stop" => json!({ "event": "stopTyping", "data": { "gameId": room_id } }),
        "leave" => json!({ "event": "leaveGame", "data": room_id }),
        "read" => json!({ "event": "markMessageAsRead", "data": { "gameId": room_id, "messageId": rest } }),
        "correct" | "wrong" => {
            let mut parts = rest.split_whitespace();
            let answer_id = parts.next()?;
            let mut data = json!({
                "gameId": room_id,
                "answerId": answer_id,
                "isCorrect": command == "correct",
            });
            if let Some(points) = parts.next() {
                data["points"] = json!(points.parse::<i64>().ok()?);
            }
            json!({ "event": "validateAnswer", "data": data })
        }
        "score" => {
            let mut parts = rest.split_whitespace();
            let user_id = parts.next()?;
            let delta = parts.next()?.parse::<i64>().ok()?;
            json!({ "event": "updateScore", "data": { "gameId": room_id, "userId": user_id, "score": delta } })
        }
        "raw" => serde_json::from_str(rest).ok()?,
        _ => return None,
    };
    Some(event)
}

fn print_join_help() {
    println!("\n{}", "Room Commands".bold());
    println!("{}", "─".repeat(60));
    println!("  {} <text>              submit an answer", "answer".cyan());
    println!("  {} <answerId> [points] mark an answer correct", "correct".cyan());
    println!("  {} <answerId>            mark an answer incorrect", "wrong".cyan());
    println!("  {} <userId> <delta>      adjust a score directly", "score".cyan());
    println!("  {} <text>                 send a chat message", "say".cyan());
    println!("  {} <messageId>           mark a message read", "read".cyan());
    println!("  {} / {}              typing indicator", "typing".cyan(), "stop".cyan());
    println!("  {}                      leave the room", "leave".cyan());
    println!("  {} <json>                 send a raw event", "raw".cyan());
    println!("  {}: help, quit\n", "Commands".bold());
}

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    for (name, description) in SCENARIOS {
        println!("  {} - {}", name.cyan(), description);
    }
    println!("\nExample: quiz-cli validate --scenario join");
}

async fn run_named(cli: &Cli, scenario: &str) -> Option<bool> {
    let result = match scenario {
        "auth" => validate_auth(cli).await,
        "join" => validate_join(cli).await,
        "answer" => validate_answer(cli).await,
        "validate" => validate_scoring(cli).await,
        "disconnect" => validate_disconnect(cli).await,
        "concurrent-join" => validate_concurrent_join(cli).await,
        _ => return None,
    };
    Some(result)
}

async fn run_scenario(cli: &Cli, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    match run_named(cli, scenario).await {
        Some(true) => println!("\n{} Scenario passed", "✓".green().bold()),
        Some(false) => println!("\n{} Scenario failed", "✗".red().bold()),
        None => {
            println!("{} Unknown scenario: {}", "✗".red(), scenario);
            list_scenarios();
        }
    }
}

async fn run_all_validations(cli: &Cli) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let mut passed = 0;
    let mut failed = 0;

    for (scenario, _) in SCENARIOS {
        println!("\n{} Testing: {}", "▶".cyan(), scenario.bold());
        println!("{}", "─".repeat(60));

        if run_named(cli, scenario).await == Some(true) {
            passed += 1;
            println!("{} {}", "✓".green(), "PASSED".green());
        } else {
            failed += 1;
            println!("{} {}", "✗".red(), "FAILED".red());
        }
    }

    println!("\n{}", "═".repeat(60).green());
    println!("  {} Passed: {}", "✓".green(), passed.to_string().green());
    println!("  {} Failed: {}", "✗".red(), failed.to_string().red());
    println!("  Total: {}", passed + failed);

    if failed == 0 {
        println!("\n{}", "All validations passed! 🎉".green().bold());
    } else {
        println!("\n{}", "Some validations failed. Check output above.".yellow());
    }
}

fn unique_room(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{}-{:x}", prefix, nanos)
}

async fn validate_auth(cli: &Cli) -> bool {
    match connect_async(format!("ws://{}/game", cli.server)).await {
        Ok(_) => {
            println!("{} Server accepted an unauthenticated upgrade", "✗".red());
            false
        }
        Err(e) => {
            println!("{} Unauthenticated upgrade refused: {}", "✓".green(), e);
            true
        }
    }
}

async fn validate_join(cli: &Cli) -> bool {
    let room_id = unique_room("join");
    let Some(mut socket) = connect_as(cli, "validator-student", "student").await else {
        return false;
    };

    if !send_event(&mut socket, json!({ "event": "joinGame", "data": room_id })).await {
        return false;
    }

    match wait_for(&mut socket, "chatHistory").await {
        Some(history) if history["data"] == json!([]) => {
            println!("{} Room {} created with empty chat history", "✓".green(), room_id);
            true
        }
        Some(history) => {
            println!("{} Unexpected chat history: {}", "✗".yellow(), history["data"]);
            false
        }
        None => {
            println!("{} No chatHistory received", "✗".red());
            false
        }
    }
}

async fn validate_answer(cli: &Cli) -> bool {
    let room_id = unique_room("answer");
    let Some(mut socket) = connect_as(cli, "validator-student", "student").await else {
        return false;
    };

    send_event(&mut socket, json!({ "event": "joinGame", "data": room_id })).await;
    wait_for(&mut socket, "chatHistory").await;
    send_event(
        &mut socket,
        json!({ "event": "sendAnswer", "data": { "gameId": room_id, "answer": "42" } }),
    )
    .await;

    let Some(answer) = wait_for(&mut socket, "newAnswer").await else {
        println!("{} No newAnswer received", "✗".red());
        return false;
    };
    if answer["data"]["status"] != "pending" {
        println!("{} Answer status is {}", "✗".red(), answer["data"]["status"]);
        return false;
    }
    match wait_for(&mut socket, "answersList").await {
        Some(list) if list["data"].as_array().map(|a| a.len()) == Some(1) => {
            println!("{} Pending answer {} listed", "✓".green(), answer["data"]["id"]);
            true
        }
        _ => {
            println!("{} answersList did not contain exactly one answer", "✗".red());
            false
        }
    }
}

async fn validate_scoring(cli: &Cli) -> bool {
    let room_id = unique_room("score");
    let (Some(mut student), Some(mut teacher)) = (
        connect_as(cli, "validator-student", "student").await,
        connect_as(cli, "validator-teacher", "teacher").await,
    ) else {
        return false;
    };

    println!("  Step 1: Student joins and answers...");
    send_event(&mut student, json!({ "event": "joinGame", "data": room_id })).await;
    wait_for(&mut student, "chatHistory").await;
    send_event(
        &mut student,
        json!({ "event": "sendAnswer", "data": { "gameId": room_id, "answer": "42" } }),
    )
    .await;
    let Some(answer) = wait_for(&mut student, "newAnswer").await else {
        println!("{} No newAnswer received", "✗".red());
        return false;
    };

    println!("  Step 2: Teacher validates for 15 points...");
    send_event(&mut teacher, json!({ "event": "joinGame", "data": room_id })).await;
    wait_for(&mut teacher, "chatHistory").await;
    send_event(
        &mut teacher,
        json!({
            "event": "validateAnswer",
            "data": { "gameId": room_id, "answerId": answer["data"]["id"], "isCorrect": true, "points": 15 }
        }),
    )
    .await;

    match wait_for(&mut student, "scoreUpdated").await {
        Some(update) if update["data"]["totalScore"] == 15 => {
            println!("{} Score updated to 15", "✓".green());
            true
        }
        Some(update) => {
            println!("{} Unexpected score update: {}", "✗".red(), update["data"]);
            false
        }
        None => {
            println!("{} No scoreUpdated received", "✗".red());
            false
        }
    }
}

async fn validate_disconnect(cli: &Cli) -> bool {
    let room_id = unique_room("disconnect");
    let (Some(mut leaver), Some(mut observer)) = (
        connect_as(cli, "validator-leaver", "student").await,
        connect_as(cli, "validator-observer", "student").await,
    ) else {
        return false;
    };

    send_event(&mut leaver, json!({ "event": "joinGame", "data": room_id })).await;
    wait_for(&mut leaver, "chatHistory").await;
    send_event(&mut observer, json!({ "event": "joinGame", "data": room_id })).await;
    wait_for(&mut observer, "chatHistory").await;

    println!("  Dropping connection without leaveGame...");
    drop(leaver);

    match wait_for(&mut observer, "userLeft").await {
        Some(left) if left["data"]["userId"] == "validator-leaver" => {
            println!("{} userLeft broadcast for validator-leaver", "✓".green());
            true
        }
        _ => {
            println!("{} No userLeft received", "✗".red());
            false
        }
    }
}

async fn validate_concurrent_join(cli: &Cli) -> bool {
    let room_id = unique_room("concurrent");
    let (Some(mut first), Some(mut second)) = (
        connect_as(cli, "validator-a", "student").await,
        connect_as(cli, "validator-b", "student").await,
    ) else {
        return false;
    };

    let join = json!({ "event": "joinGame", "data": room_id });
    let (a, b) = tokio::join!(send_event(&mut first, join.clone()), send_event(&mut second, join));
    if !(a && b) {
        return false;
    }

    // The later joiner's snapshot lists both connections.
    for socket in [&mut first, &mut second] {
        while let Some(list) = wait_for(socket, "participantsList").await {
            if list["data"].as_array().map(|p| p.len()) == Some(2) {
                println!("{} Both connections listed in {}", "✓".green(), room_id);
                return true;
            }
        }
    }
    println!("{} Never observed both participants", "✗".red());
    false
}
