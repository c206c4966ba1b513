// cloud-capture CLI
// Drives the recorder daemon through its control API

use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{json, Value};
use std::io::{self, Write};
use tokio::time::{sleep, Duration};

#[derive(Parser)]
#[command(name = "cloud-capture-cli")]
#[command(about = "Control the cloud-capture recorder daemon", long_about = None)]
struct Cli {
    /// Daemon address (default: 127.0.0.1:8787)
    #[arg(short, long, default_value = "127.0.0.1:8787")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check daemon health endpoint
    Health,

    /// Show recorder status and elapsed time
    Status,

    /// Start recording the screen and microphone
    Start,

    /// Pause the current recording
    Pause,

    /// Resume a paused recording
    Resume,

    /// Stop recording and keep the result for saving
    Stop,

    /// Save the stopped recording
    Save {
        /// Display name (defaults to the current date and time)
        #[arg(short, long, default_value = "")]
        name: String,

        /// Preferred destination: drive or local
        #[arg(long)]
        storage: Option<String>,
    },

    /// Throw away the stopped recording
    Discard,

    /// List saved recordings, newest first
    List,

    /// Rename a saved recording
    Rename {
        /// Recording id
        id: String,

        /// New display name
        name: String,
    },

    /// Delete a saved recording
    Delete {
        /// Recording id
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Connect to Google Drive, or disconnect with --sign-out
    Auth {
        #[arg(long)]
        sign_out: bool,
    },

    /// Follow the recorder status live (press Ctrl+C to exit)
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.server);

    match &cli.command {
        Commands::Health => check_health(&api).await,
        Commands::Status => show_status(&api).await,
        Commands::Start => recorder_command(&api, "start").await,
        Commands::Pause => recorder_command(&api, "pause").await,
        Commands::Resume => recorder_command(&api, "resume").await,
        Commands::Stop => recorder_command(&api, "stop").await,
        Commands::Discard => recorder_command(&api, "discard").await,
        Commands::Save { name, storage } => save(&api, name, storage.as_deref()).await,
        Commands::List => list_recordings(&api).await,
        Commands::Rename { id, name } => rename(&api, id, name).await,
        Commands::Delete { id, yes } => delete(&api, id, *yes).await,
        Commands::Auth { sign_out } => {
            if *sign_out {
                sign_out_drive(&api).await
            } else {
                connect_drive(&api).await
            }
        }
        Commands::Watch => watch(&api).await,
    }
}

struct ApiClient {
    base: String,
    client: reqwest::Client,
}

impl ApiClient {
    fn new(server: &str) -> Self {
        Self {
            base: format!("http://{}", server),
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Option<Value> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                println!("{} Cannot connect to daemon: {}", "✗".red(), e);
                println!("  Make sure cloud-capture is running on {}", self.base);
                return None;
            }
        };

        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        if status.is_success() {
            return Some(body);
        }

        println!(
            "{} {} ({})",
            "✗".red(),
            body["message"].as_str().unwrap_or("Request failed"),
            body["code"].as_str().unwrap_or(status.as_str())
        );
        if let Some(remediation) = body["remediation"].as_str() {
            println!("  {}", remediation.yellow());
        }
        None
    }

    async fn get(&self, path: &str) -> Option<Value> {
        self.send(reqwest::Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Option<Value> {
        self.send(reqwest::Method::POST, path, body).await
    }
}

fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn format_size(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MB {
        format!("{:.1} MB", bytes as f64 / MB)
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

fn colored_status(status: &str) -> ColoredString {
    match status {
        "recording" => status.red().bold(),
        "paused" => status.yellow(),
        "stopped" => status.green(),
        _ => status.normal(),
    }
}

fn colored_connectivity(snapshot: &Value) -> ColoredString {
    if snapshot["online"].as_bool().unwrap_or(true) {
        "online".green()
    } else {
        "offline".yellow()
    }
}

fn print_snapshot(snapshot: &Value) {
    let status = snapshot["status"].as_str().unwrap_or("unknown");
    let elapsed = snapshot["elapsedSeconds"].as_u64().unwrap_or(0);
    println!("  Status:  {}", colored_status(status));
    println!("  Elapsed: {}", format_elapsed(elapsed));
    println!("  Network: {}", colored_connectivity(snapshot));
    if snapshot["isProcessing"].as_bool().unwrap_or(false) {
        println!("  {}", "Saving...".cyan());
    }
    if let Some(name) = snapshot["lastSavedName"].as_str() {
        println!("  Last saved: {}", name);
    }
}

async fn check_health(api: &ApiClient) {
    println!("{}", "Checking daemon health...".cyan());

    if let Some(body) = api.get("/health").await {
        println!("{} Health check passed", "✓".green());
        println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
        println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
        println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
    }
}

async fn show_status(api: &ApiClient) {
    if let Some(snapshot) = api.get("/recorder").await {
        print_snapshot(&snapshot);
    }
    if let Some(auth) = api.get("/auth/drive").await {
        let drive = if auth["authenticated"].as_bool().unwrap_or(false) {
            "connected".green()
        } else {
            "not connected".yellow()
        };
        println!("  Google Drive: {}", drive);
    }
}

async fn recorder_command(api: &ApiClient, action: &str) {
    if let Some(snapshot) = api.post(&format!("/recorder/{}", action), None).await {
        println!("{} {}", "✓".green(), action);
        print_snapshot(&snapshot);
    }
}

async fn save(api: &ApiClient, name: &str, storage: Option<&str>) {
    println!("{}", "Saving recording...".cyan());

    let body = json!({ "name": name, "storage": storage });
    let Some(outcome) = api.post("/recorder/save", Some(body)).await else {
        return;
    };

    let recording = &outcome["recording"];
    let destination = outcome["destination"].as_str().unwrap_or("unknown");
    println!(
        "{} Saved \"{}\" to {}",
        "✓".green(),
        recording["name"].as_str().unwrap_or(""),
        destination
    );
    println!("  Id: {}", recording["id"].as_str().unwrap_or(""));
    if outcome["requested"] != outcome["destination"] {
        println!(
            "  {}",
            "Google Drive was unavailable, so the recording was saved locally.".yellow()
        );
    }
}

async fn list_recordings(api: &ApiClient) {
    let Some(body) = api.get("/recordings").await else {
        return;
    };
    let recordings = body.as_array().cloned().unwrap_or_default();

    if recordings.is_empty() {
        println!("{}", "No recordings yet".yellow());
        return;
    }

    println!("{}", format!("Recordings ({})", recordings.len()).bold());
    for recording in &recordings {
        let storage = match recording["storageType"].as_str() {
            Some("drive") => "drive".blue(),
            _ => "local".normal(),
        };
        println!(
            "  {}  {}  [{}]  {}",
            recording["id"].as_str().unwrap_or("").dimmed(),
            recording["name"].as_str().unwrap_or(""),
            storage,
            format_size(recording["sizeBytes"].as_u64().unwrap_or(0))
        );
    }
}

async fn rename(api: &ApiClient, id: &str, name: &str) {
    let path = format!("/recordings/{}", urlencoding::encode(id));
    if let Some(recording) = api
        .send(reqwest::Method::PATCH, &path, Some(json!({ "name": name })))
        .await
    {
        println!(
            "{} Renamed to \"{}\"",
            "✓".green(),
            recording["name"].as_str().unwrap_or(name)
        );
    }
}

async fn delete(api: &ApiClient, id: &str, yes: bool) {
    if !yes {
        print!("Delete recording {}? [y/N] ", id);
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() || !answer.trim().eq_ignore_ascii_case("y") {
            println!("{}", "Cancelled".yellow());
            return;
        }
    }

    let path = format!("/recordings/{}", urlencoding::encode(id));
    if let Some(recording) = api.send(reqwest::Method::DELETE, &path, None).await {
        println!(
            "{} Deleted \"{}\"",
            "✓".green(),
            recording["name"].as_str().unwrap_or(id)
        );
    }
}

async fn connect_drive(api: &ApiClient) {
    println!("{}", "Connecting to Google Drive...".cyan());

    let Some(prompt) = api.post("/auth/drive", None).await else {
        return;
    };
    println!(
        "  Open {} and enter the code {}",
        prompt["verificationUrl"].as_str().unwrap_or("").underline(),
        prompt["userCode"].as_str().unwrap_or("").bold()
    );

    loop {
        sleep(Duration::from_secs(2)).await;
        let Some(status) = api.get("/auth/drive").await else {
            return;
        };

        if status["authenticated"].as_bool().unwrap_or(false) {
            println!("{} Connected to Google Drive", "✓".green());
            return;
        }
        if let Some(error) = status["lastError"].as_object() {
            println!(
                "{} {}",
                "✗".red(),
                error.get("message").and_then(Value::as_str).unwrap_or("Authorization failed")
            );
            if let Some(remediation) = error.get("remediation").and_then(Value::as_str) {
                println!("  {}", remediation.yellow());
            }
            return;
        }
        if status["pending"].is_null() {
            println!("{}", "Authorization was not completed".yellow());
            return;
        }
    }
}

async fn sign_out_drive(api: &ApiClient) {
    if api
        .send(reqwest::Method::DELETE, "/auth/drive", None)
        .await
        .is_some()
    {
        println!("{} Disconnected from Google Drive", "✓".green());
    }
}

async fn watch(api: &ApiClient) {
    println!("{}", "Watching recorder (Ctrl+C to exit)".cyan());
    let mut last_line = String::new();

    loop {
        let Some(snapshot) = api.get("/recorder").await else {
            return;
        };
        let status = snapshot["status"].as_str().unwrap_or("unknown");
        let elapsed = format_elapsed(snapshot["elapsedSeconds"].as_u64().unwrap_or(0));
        let online = snapshot["online"].as_bool().unwrap_or(true);
        let line = format!("{}  {}  {}", elapsed, status, online);
        if line != last_line {
            print!(
                "\r{}  {}  {}   ",
                elapsed,
                colored_status(status),
                colored_connectivity(&snapshot)
            );
            let _ = io::stdout().flush();
            last_line = line;
        }
        sleep(Duration::from_millis(500)).await;
    }
}
