use desk_pet::animation::{AnimationBindings, AnimationDriver, Point, Rect, Size};
use desk_pet::conversation::{ConversationBuffer, DEFAULT_HISTORY_CAP};
use desk_pet::host::{HostOutput, PetEvent, PetHost};
use desk_pet::paths::{get_assets_dir, get_config_dir, get_greetings_path, get_log_path};
use desk_pet::prompts::{load_greetings, DEFAULT_SYSTEM_PROMPT};
use desk_pet::providers::{load_provider, ChatBackend, ProviderKind};
use desk_pet::store::{FileStore, SettingsStore};
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

const SCREEN: Rect = Rect::new(0, 0, 1920, 1080);
const PET_SIZE: Size = Size::new(200, 200);

const HELP: &str = "\
Type a message to chat with the pet, or a command:
  /click                 click the pet
  /drag X Y              drag the pet to X,Y
  /release               let go after a drag
  /dblclick              toggle input mode
  /provider [name|N]     show or pick the chat provider
  /config key=value ...  edit the provider settings
  /models                list models offered by the provider
  /anim on|off           random animations
  /greet on|off          greetings
  /rest on|off           rest reminder
  /clock on|off          clock display
  /countdown MINUTES     start a countdown
  /status                show the pet state
  /stall                 report that the animation loop stopped
  /quit                  exit";

// ============ Logging ============

fn init_logging() {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();

    match open_log_file() {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => eprintln!("{}, logging to stderr", e),
    }
    let _ = builder.try_init();
}

fn open_log_file() -> Result<std::fs::File, String> {
    let path = get_log_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("Failed to create log directory: {}", e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

// ============ Command parsing ============

fn parse_switch(arg: Option<&str>) -> Result<bool, String> {
    match arg {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err("expected 'on' or 'off'".to_string()),
    }
}

/// Turns one typed line into host events
fn parse_command(line: &str) -> Result<Vec<PetEvent>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    if !line.starts_with('/') {
        return Ok(vec![PetEvent::Submit(line.to_string())]);
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let events = match command {
        "/click" => vec![PetEvent::PointerDown, PetEvent::PointerUp],
        "/drag" => {
            let mut coord = || -> Result<i32, String> {
                parts
                    .next()
                    .ok_or_else(|| "usage: /drag X Y".to_string())?
                    .parse()
                    .map_err(|e| format!("Invalid coordinate: {}", e))
            };
            let x = coord()?;
            let y = coord()?;
            vec![PetEvent::PointerDown, PetEvent::PointerMove(Point::new(x, y))]
        }
        "/release" => vec![PetEvent::PointerUp],
        "/dblclick" => vec![PetEvent::DoubleClick],
        "/provider" => match parts.next() {
            Some(answer) => {
                let rest: Vec<&str> = std::iter::once(answer).chain(parts).collect();
                vec![PetEvent::SelectProvider(Some(rest.join(" ")))]
            }
            None => vec![PetEvent::ShowProviders],
        },
        "/config" => {
            let fields = parts
                .map(|pair| {
                    pair.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .ok_or_else(|| format!("Expected key=value, got '{}'", pair))
                })
                .collect::<Result<Vec<_>, String>>()?;
            if fields.is_empty() {
                return Err("usage: /config key=value ...".to_string());
            }
            vec![PetEvent::Configure(fields)]
        }
        "/models" => vec![PetEvent::ListModels],
        "/anim" => vec![PetEvent::ToggleAnimations(parse_switch(parts.next())?)],
        "/greet" => vec![PetEvent::ToggleGreetings(parse_switch(parts.next())?)],
        "/rest" => vec![PetEvent::ToggleRestReminder(parse_switch(parts.next())?)],
        "/clock" => vec![PetEvent::ToggleClock(parse_switch(parts.next())?)],
        "/countdown" => {
            let minutes = parts
                .next()
                .ok_or_else(|| "usage: /countdown MINUTES".to_string())?
                .parse()
                .map_err(|e| format!("Invalid minutes: {}", e))?;
            vec![PetEvent::StartCountdown(minutes)]
        }
        "/status" => vec![PetEvent::Status],
        "/stall" => vec![PetEvent::LoopStalled],
        "/quit" | "/exit" => vec![PetEvent::Shutdown],
        "/help" => return Err(HELP.to_string()),
        other => return Err(format!("Unknown command '{}', try /help", other)),
    };
    Ok(events)
}

// ============ Front end ============

fn render(output: HostOutput) -> Option<String> {
    let text = match output {
        HostOutput::Thinking => "(thinking...)".to_string(),
        HostOutput::Reply(reply) => format!("pet> {}", reply),
        HostOutput::Error(e) => format!("error: {}", e),
        HostOutput::ConfigRequired(kind) => format!(
            "{} is not configured. Use /config {}",
            kind,
            match kind {
                ProviderKind::Spark => "api_key=.. api_secret=.. app_id=..",
                ProviderKind::OpenRouter => "api_key=.. model=..",
            }
        ),
        HostOutput::ConfigSaved(kind) => format!("{} settings saved", kind),
        HostOutput::ProviderMenu(lines) => format!("Choose a provider with /provider N\n{}", lines.join("\n")),
        HostOutput::ProviderSelected(kind) => format!("Using {}", kind),
        HostOutput::Models(models) if models.is_empty() => "No chat models found".to_string(),
        HostOutput::Models(models) => models.join("\n"),
        HostOutput::Greeting(text) => format!("pet> {}", text),
        HostOutput::RestReminder(text) => format!("[rest] {}", text),
        // The wall clock changes every second; only countdown alerts are printed.
        HostOutput::Clock(clock) if clock.urgent => format!("[clock] {}", clock.text.replace('\n', " ")),
        HostOutput::Clock(_) => return None,
        HostOutput::AnimationChanged(state) => format!("[pet is {}]", state),
        HostOutput::InputMode(on) => format!("[input mode {}]", if on { "on" } else { "off" }),
        HostOutput::Status(status) => format!(
            "provider: {} ({})\nstate: {} at ({}, {})\nanimations: {}, greetings: {}, rest reminder: {}, clock: {}\ninput mode: {}, thinking: {}, history: {} messages",
            status.provider,
            if status.configured { "configured" } else { "not configured" },
            status.state,
            status.position.x,
            status.position.y,
            status.settings.animations_enabled,
            status.settings.greetings_enabled,
            status.settings.rest_reminder_enabled,
            status.settings.time_display_enabled,
            status.input_mode,
            status.thinking,
            status.history_len,
        ),
    };
    Some(text)
}

async fn print_outputs(mut outputs: UnboundedReceiver<HostOutput>) {
    while let Some(output) = outputs.recv().await {
        if let Some(text) = render(output) {
            println!("{}", text);
        }
    }
}

async fn read_commands(events: UnboundedSender<PetEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("[main] Failed to read stdin: {}", e);
                break;
            }
        };
        match parse_command(&line) {
            Ok(parsed) => {
                let quit = parsed.iter().any(|e| matches!(e, PetEvent::Shutdown));
                for event in parsed {
                    if events.send(event).is_err() {
                        return;
                    }
                }
                if quit {
                    return;
                }
            }
            Err(message) => println!("{}", message),
        }
    }
    let _ = events.send(PetEvent::Shutdown);
}

/// Prefers the first provider that already has usable settings
fn initial_provider(store: &dyn SettingsStore) -> ProviderKind {
    ProviderKind::ALL
        .into_iter()
        .find(|kind| load_provider(*kind, store).validate())
        .unwrap_or(ProviderKind::ALL[0])
}

async fn run() -> Result<(), String> {
    let config_dir = get_config_dir()?;
    info!("[main] Config dir: {}", config_dir.display());
    let store: Arc<dyn SettingsStore> = Arc::new(FileStore::new(&config_dir));

    let assets_dir = get_assets_dir()?;
    let bindings = AnimationBindings::from_dir(&assets_dir);
    for missing in bindings.missing() {
        warn!("[main] {}", missing);
    }
    let greetings = load_greetings(&get_greetings_path()?);

    let kind = initial_provider(store.as_ref());
    let backend = ChatBackend::new(
        load_provider(kind, store.as_ref()),
        ConversationBuffer::new(DEFAULT_SYSTEM_PROMPT, DEFAULT_HISTORY_CAP),
    );
    let driver = AnimationDriver::new(bindings, SCREEN, PET_SIZE);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let host = PetHost::new(driver, backend, store, greetings, event_tx.clone(), output_tx);

    println!("Desk Pet is awake. Type /help for commands.");
    let host_task = tokio::spawn(host.run(event_rx));
    let printer = tokio::spawn(print_outputs(output_rx));

    read_commands(event_tx).await;
    host_task
        .await
        .map_err(|e| format!("Host task failed: {}", e))?;
    let _ = printer.await;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();
    info!("[main] Desk Pet {} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("[main] {}", e);
        eprintln!("desk-pet: {}", e);
        std::process::exit(1);
    }
}
