//! Integration tests for the console dispatcher

use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use relayconsole::console::ConsoleMode;
use relayconsole::relay::SessionOutcome;
use relayconsole::{ActivityLog, Config, Console, Interrupt, InterruptCoordinator, OperatorInput};

struct Harness {
    dir: TempDir,
    tx: mpsc::Sender<Bytes>,
    console: Console<Vec<u8>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.console.show_banner = false;
        config.console.history_file = dir.path().join("history");
        config.console.activity_log = dir.path().join("activity.log");
        config.listener.bind_host = Ipv4Addr::LOCALHOST.into();
        config.listener.accept_poll_interval = Duration::from_millis(50);
        adjust(&mut config);

        let activity = ActivityLog::open(&config.console.activity_log).unwrap();
        let (tx, input) = OperatorInput::channel(32);
        let console = Console::new(
            config,
            input,
            Vec::new(),
            activity,
            InterruptCoordinator::new(),
        )
        .unwrap();

        Self { dir, tx, console }
    }

    async fn type_lines(&self, lines: &[&str]) {
        for line in lines {
            self.tx.send(Bytes::from(format!("{}\n", line))).await.unwrap();
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_help_unknown_and_exit() {
    let mut h = Harness::new();
    h.type_lines(&["help", "launch", "exit"]).await;

    timeout(Duration::from_secs(2), h.console.run())
        .await
        .unwrap()
        .unwrap();

    let history_path = h.path("history");
    let log = read(&h.path("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();

    assert!(shown.contains("reverse: Start a reverse shell listener\n"));
    assert!(shown.contains("launch: command not found.\nType 'help' for available commands.\n"));
    assert!(shown.ends_with("bye!\n"));

    assert!(log.contains("Info: Displayed help menu"));
    assert!(log.contains("Error: Unknown command: launch"));
    assert!(log.contains("Success: Command history saved"));
    assert!(log.contains("Success: Shell exited"));

    assert_eq!(read(&history_path), "help\nlaunch\nexit\n");
}

#[tokio::test]
async fn test_invalid_ports_never_listen() {
    let mut h = Harness::new();
    h.type_lines(&["reverse", "reverse 0", "reverse -1", "reverse 99999", "exit"])
        .await;

    timeout(Duration::from_secs(2), h.console.run())
        .await
        .unwrap()
        .unwrap();

    let log = read(&h.path("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();

    assert_eq!(shown.matches("Usage: reverse <port>\n").count(), 4);
    assert!(!shown.contains("Listening on port"));
    assert_eq!(log.matches("Invalid port for reverse listener").count(), 4);
    assert!(!log.contains("Started listener"));
}

#[tokio::test]
async fn test_transfer_usage() {
    let mut h = Harness::new();
    h.type_lines(&["put 10.0.0.5", "get", "exit"]).await;

    timeout(Duration::from_secs(2), h.console.run())
        .await
        .unwrap()
        .unwrap();

    let shown = String::from_utf8(h.console.into_display()).unwrap();
    assert!(shown.contains("Usage: put <target> <username>\n"));
    assert!(shown.contains("Usage: get <target> <username>\n"));
}

#[tokio::test]
async fn test_end_of_input_exits() {
    let mut h = Harness::new();
    h.type_lines(&["history"]).await;
    let Harness { dir, tx, mut console } = h;
    drop(tx);

    timeout(Duration::from_secs(2), console.run())
        .await
        .unwrap()
        .unwrap();

    let shown = String::from_utf8(console.into_display()).unwrap();
    assert!(shown.contains("    1  history\n"));
    assert!(shown.ends_with("bye!\n"));
    assert_eq!(read(&dir.path().join("history")), "history\n");
}

#[tokio::test]
async fn test_tab_completion_request() {
    let mut h = Harness::new();
    h.type_lines(&["re\t", "exit"]).await;

    timeout(Duration::from_secs(2), h.console.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.console.mode(), ConsoleMode::Home);
    // Completion requests are not commands
    let entries: Vec<&str> = h.console.history().entries().collect();
    assert_eq!(entries, vec!["exit"]);

    let shown = String::from_utf8(h.console.into_display()).unwrap();
    assert!(shown.contains("reverse\n"));
    assert!(!shown.contains("command not found"));
}

#[tokio::test]
async fn test_interrupt_at_prompt_prints_hint() {
    let mut h = Harness::new();
    let notifier = h.console.interrupts().notifier();
    let tx = h.tx.clone();

    let typist = async move {
        sleep(Duration::from_millis(100)).await;
        notifier.notify(Interrupt::Cancel);
        sleep(Duration::from_millis(100)).await;
        tx.send(Bytes::from_static(b"exit\n")).await.unwrap();
    };

    let (result, ()) = timeout(Duration::from_secs(2), async {
        tokio::join!(h.console.run(), typist)
    })
    .await
    .unwrap();
    result.unwrap();

    let log = read(&h.dir.path().join("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();
    assert!(shown.contains("\nUse 'exit' to quit.\n"));
    assert!(log.contains("Warning: Shell interrupted by user"));
}

#[tokio::test]
async fn test_interrupt_cancels_waiting_listener() {
    let mut h = Harness::new();
    let notifier = h.console.interrupts().notifier();
    let port = free_port();

    let interrupter = async move {
        sleep(Duration::from_millis(150)).await;
        notifier.notify(Interrupt::Cancel);
    };

    let (result, ()) = timeout(Duration::from_secs(2), async {
        tokio::join!(h.console.reverse(port), interrupter)
    })
    .await
    .expect("listener should stop after the interrupt");

    let outcome = result.unwrap().expect("listener should have started");
    assert!(matches!(outcome, SessionOutcome::Cancelled(_)));

    let log = read(&h.path("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();
    assert!(shown.contains(&format!("Listening on port {}", port)));
    assert!(shown.contains("Listener interrupted. Closing listener."));
    assert!(log.contains("Warning: Listener interrupted by user"));
}

#[tokio::test]
async fn test_bind_failure_returns_to_prompt() {
    let mut h = Harness::new();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let command = format!("reverse {}", port);
    h.type_lines(&[command.as_str(), "exit"]).await;
    timeout(Duration::from_secs(2), h.console.run())
        .await
        .unwrap()
        .unwrap();

    let log = read(&h.path("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();
    assert!(shown.contains("Error in listener: Failed to bind listener"));
    assert!(shown.ends_with("bye!\n"));
    assert!(log.contains("Error: Error in listener"));
    drop(occupied);
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_mode_round_trip() {
    let mut h = Harness::new();
    h.type_lines(&["shell", "echo from-the-shell", "exit", "exit"])
        .await;

    timeout(Duration::from_secs(5), h.console.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.console.mode(), ConsoleMode::Home);

    let log = read(&h.path("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();
    assert!(shown.contains("Entering shell mode..."));
    assert!(shown.contains("$ from-the-shell\n"));
    assert!(shown.contains("Exiting shell mode..."));
    assert!(log.contains("Info: Entered shell mode"));
    assert!(log.contains("Success: Executed command: echo from-the-shell"));
    assert!(log.contains("Info: Exited shell mode"));
}

#[tokio::test]
async fn test_terminate_ends_console_with_connected_peer() {
    let mut h = Harness::new();
    let notifier = h.console.interrupts().notifier();
    let port = free_port();

    let command = format!("reverse {}", port);
    h.type_lines(&[command.as_str()]).await;

    let silent_peer = async move {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let mut connected = None;
        for _ in 0..50 {
            if let Ok(stream) = TcpStream::connect(addr).await {
                connected = Some(stream);
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        let stream = connected.expect("listener should accept the peer");

        sleep(Duration::from_millis(100)).await;
        notifier.notify(Interrupt::Terminate);
        // Returned so the peer stays connected until the console is done
        stream
    };

    let (result, stream) = timeout(Duration::from_secs(2), async {
        tokio::join!(h.console.run(), silent_peer)
    })
    .await
    .expect("SIGTERM should end the console while a peer is connected");
    result.unwrap();
    drop(stream);

    let log = read(&h.path("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();
    assert!(shown.contains("Session terminated. Closing connection."));
    assert!(shown.ends_with("bye!\n"));
    assert!(log.contains("closed on termination request"));
    assert!(log.contains("Success: Shell exited"));
}

#[tokio::test]
async fn test_password_is_not_displayed_or_recorded() {
    let ssh_port = free_port();
    let mut h = Harness::with_config(|config| config.transfer.ssh_port = ssh_port);
    h.type_lines(&["put 127.0.0.1 operator", "hunter2", "exit"]).await;

    timeout(Duration::from_secs(5), h.console.run())
        .await
        .unwrap()
        .unwrap();

    let history_path = h.path("history");
    let log = read(&h.path("activity.log"));
    let shown = String::from_utf8(h.console.into_display()).unwrap();

    assert!(shown.contains("Enter password: "));
    assert!(shown.contains("SSH transfer error: Failed to connect to 127.0.0.1"));
    assert!(shown.contains("Closing connection\n"));
    assert!(!shown.contains("hunter2"));
    assert!(!log.contains("hunter2"));
    assert_eq!(read(&history_path), "put 127.0.0.1 operator\nexit\n");
}
