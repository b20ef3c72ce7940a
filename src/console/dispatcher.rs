//! Console Dispatcher

use anyhow::Context;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info};

use super::command::{Command, RESERVED_COMMANDS};
use super::completion::{complete, completion_prefix, directory_entries, ConsoleMode};
use super::history::History;
use super::secret::EchoGuard;
use crate::activity::ActivityLog;
use crate::config::Config;
use crate::error::{TransferError, UsageError};
use crate::relay::{OperatorInput, RelayControl, RelayEngine, SessionOutcome};
use crate::shell::{LocalShell, ShellCommand};
use crate::shutdown::{Interrupt, InterruptCoordinator};
use crate::transfer::{SftpClient, TransferDirection, TransferTarget};
use crate::Result;

const BANNER: &str = r#"
   ___      __               _____                   __
  / _ \___ / /__ ___ __ __  / ___/__  ___  ___ ___  / /__
 / , _/ -_) / _ `/ // / / /__/ _ \/ _ \(_-</ _ \/ / -_)
/_/|_|\__/_/\_,_/\_, /  \___/\___/_//_/___/\___/_/\__/
                /___/
            type 'help' to view list of commands
"#;

const SHELL_PROMPT: &str = "$ ";

/// What a prompt produced
enum PromptInput {
    Line(String),
    Interrupted,
    Terminated,
    EndOfInput,
}

/// Interactive operator console
///
/// Owns the operator display and input; each command runs to completion
/// before the next prompt, so at most one relay session exists at a time.
pub struct Console<W> {
    config: Config,
    input: OperatorInput,
    display: W,
    activity: ActivityLog,
    history: History,
    interrupts: InterruptCoordinator,
    interrupt_rx: broadcast::Receiver<Interrupt>,
    engine: RelayEngine,
    shell: LocalShell,
    mode: ConsoleMode,
    terminating: bool,
}

impl<W> Console<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        config: Config,
        input: OperatorInput,
        display: W,
        activity: ActivityLog,
        interrupts: InterruptCoordinator,
    ) -> Result<Self> {
        let history = History::load(&config.console.history_file, config.console.history_limit)?;
        let engine = RelayEngine::from_config(&config, activity.clone());
        let shell = LocalShell::new(activity.clone());
        let interrupt_rx = interrupts.subscribe();

        Ok(Self {
            config,
            input,
            display,
            activity,
            history,
            interrupts,
            interrupt_rx,
            engine,
            shell,
            mode: ConsoleMode::Home,
            terminating: false,
        })
    }

    pub fn mode(&self) -> ConsoleMode {
        self.mode
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn interrupts(&self) -> &InterruptCoordinator {
        &self.interrupts
    }

    pub fn into_display(self) -> W {
        self.display
    }

    /// Prompt loop; returns after `exit`, end-of-input or SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        if self.config.console.show_banner {
            self.write(BANNER).await?;
        }

        loop {
            let prompt = self.config.console.prompt.clone();
            match self.prompt_line(&prompt).await? {
                PromptInput::Line(line) => {
                    if let Some(partial) = line.strip_suffix('\t') {
                        self.show_completions(partial).await?;
                        continue;
                    }

                    self.history.push(&line);
                    let keep_going = self.execute(&line).await?;
                    self.drain_interrupts();

                    if !keep_going {
                        return Ok(());
                    }
                    if self.terminating {
                        return self.exit().await;
                    }
                }
                PromptInput::Interrupted => {
                    self.write("\nUse 'exit' to quit.\n").await?;
                    self.activity.warning("Shell interrupted by user");
                }
                PromptInput::Terminated => return self.exit().await,
                PromptInput::EndOfInput => {
                    self.write("\n").await?;
                    return self.exit().await;
                }
            }
        }
    }

    /// Run one home-prompt line; returns false once the console should exit
    pub async fn execute(&mut self, line: &str) -> Result<bool> {
        match Command::parse(line) {
            Command::Empty => {}
            Command::Help => self.help().await?,
            Command::Shell => self.shell_mode().await?,
            Command::Reverse(port) => {
                self.reverse(port).await?;
            }
            Command::Invalid(UsageError::InvalidPort) => {
                self.write(&format!("{}\n\n", UsageError::InvalidPort)).await?;
                self.activity.error("Invalid port for reverse listener");
            }
            Command::Invalid(usage) => {
                self.write(&format!("{}\n\n", usage)).await?;
            }
            Command::Transfer {
                direction,
                target,
                user,
            } => self.transfer(direction, &target, &user).await?,
            Command::History => self.show_history().await?,
            Command::Exit => {
                self.exit().await?;
                return Ok(false);
            }
            Command::Unknown(cmd) => {
                self.write(&format!(
                    "{}: command not found.\nType 'help' for available commands.\n\n",
                    cmd
                ))
                .await?;
                self.activity.error(format!("Unknown command: {}", cmd));
            }
        }

        Ok(true)
    }

    /// Run one reverse-listener session on `port`
    ///
    /// Ctrl+C cancels the listener while it waits for a peer; SIGTERM also
    /// ends a connected session. Listener failures are reported to the
    /// operator and logged, never returned.
    pub async fn reverse(&mut self, port: u16) -> Result<Option<SessionOutcome>> {
        let control = RelayControl::default();
        let _cancel_watch = self.interrupts.cancel_on_interrupt(control.cancel.clone());
        let _terminate_watch = self
            .interrupts
            .cancel_on_terminate(control.terminate.clone());

        let result = self
            .engine
            .start(port, &self.input, &mut self.display, control)
            .await;

        match result {
            Ok(outcome) => {
                let summary = outcome.summary();
                info!(
                    port,
                    peer = ?summary.peer_addr,
                    bytes_from_peer = summary.bytes_from_peer,
                    bytes_to_peer = summary.bytes_to_peer,
                    "Reverse session ended"
                );
                Ok(Some(outcome))
            }
            Err(e) => {
                let message = format!("Error in listener: {}", e);
                self.write(&format!("{}\n", message)).await?;
                self.activity.error(message);
                Ok(None)
            }
        }
    }

    async fn help(&mut self) -> Result<()> {
        let mut text = String::from("\n");
        for (name, description) in RESERVED_COMMANDS {
            text.push_str(&format!("{}: {}\n", name, description));
        }
        text.push('\n');

        self.write(&text).await?;
        self.activity.info("Displayed help menu");
        Ok(())
    }

    async fn show_history(&mut self) -> Result<()> {
        let text: String = self
            .history
            .entries()
            .enumerate()
            .map(|(i, entry)| format!("{:>5}  {}\n", i + 1, entry))
            .collect();
        self.write(&text).await
    }

    async fn shell_mode(&mut self) -> Result<()> {
        self.write("\nEntering shell mode...\n\n").await?;
        self.activity.info("Entered shell mode");
        self.mode = ConsoleMode::Shell;

        loop {
            match self.prompt_line(SHELL_PROMPT).await? {
                PromptInput::Line(line) => {
                    if let Some(partial) = line.strip_suffix('\t') {
                        self.show_completions(partial).await?;
                        continue;
                    }

                    if !self.run_shell_line(&line).await? {
                        self.activity.info("Exited shell mode");
                        break;
                    }
                }
                PromptInput::Interrupted => {
                    self.write("\nUse 'exit' to quit.\n").await?;
                    self.activity.warning("Shell mode interrupted by user");
                }
                PromptInput::Terminated | PromptInput::EndOfInput => break,
            }
        }

        self.mode = ConsoleMode::Home;
        self.write("\nExiting shell mode...\n\n").await
    }

    /// Returns false on `exit`
    async fn run_shell_line(&mut self, line: &str) -> Result<bool> {
        match ShellCommand::parse(line) {
            ShellCommand::Empty => {}
            ShellCommand::Exit => return Ok(false),
            ShellCommand::ChangeDirectory(path) => {
                let message = match self.shell.change_directory(&path) {
                    Ok(cwd) => format!("Changed directory to {}", cwd.display()),
                    Err(message) => message,
                };
                self.write(&format!("{}\n", message)).await?;
            }
            ShellCommand::Clear => self.shell.clear_screen().await,
            ShellCommand::Run(cmd) => match self.shell.execute(&cmd).await {
                Ok(output) => {
                    self.display.write_all(&output.stdout).await?;
                    self.display.flush().await?;
                    if !output.stderr.is_empty() {
                        let mut stderr = tokio::io::stderr();
                        stderr.write_all(&output.stderr).await?;
                        stderr.flush().await?;
                    }
                }
                Err(message) => self.write(&format!("{}\n", message)).await?,
            },
        }

        Ok(true)
    }

    async fn transfer(
        &mut self,
        direction: TransferDirection,
        host: &str,
        user: &str,
    ) -> Result<()> {
        let Some(password) = self.prompt_secret("Enter password: ").await? else {
            return Ok(());
        };

        let target = TransferTarget::new(host, self.config.transfer.ssh_port, user);
        let timeout = self.config.transfer.connect_timeout;

        let connect_target = target.clone();
        let connected = tokio::task::spawn_blocking(move || {
            SftpClient::connect(&connect_target, &password, timeout)
        })
        .await
        .context("SSH connect task failed")?;

        let client = match connected {
            Ok(client) => client,
            Err(e) => {
                self.report_transfer_error(&e).await?;
                return self.write("Closing connection\n").await;
            }
        };

        self.write("Connection successful!\n").await?;
        self.activity
            .success(format!("Connected to {} via SSH as {}", target.host, target.user));

        let paths = match self
            .prompt_value("Enter local file path with file name: ")
            .await?
        {
            Some(local) => self
                .prompt_value("Enter remote file path with file name: ")
                .await?
                .map(|remote| (local, remote)),
            None => None,
        };

        let client = match paths {
            Some((local, remote)) => {
                let (client, result) = {
                    let (local, remote) = (local.clone(), remote.clone());
                    tokio::task::spawn_blocking(move || {
                        let result =
                            client.transfer(direction, Path::new(&local), Path::new(&remote));
                        (client, result)
                    })
                    .await
                    .context("SFTP transfer task failed")?
                };

                match result {
                    Ok(bytes) => {
                        debug!("Transferred {} bytes", bytes);
                        self.report_transfer_success(direction, &target, &local, &remote)
                            .await?;
                    }
                    Err(e) => self.report_transfer_error(&e).await?,
                }
                client
            }
            None => client,
        };

        self.write("Closing connection\n").await?;
        tokio::task::spawn_blocking(move || client.close())
            .await
            .context("SSH disconnect task failed")?;
        Ok(())
    }

    async fn report_transfer_success(
        &mut self,
        direction: TransferDirection,
        target: &TransferTarget,
        local: &str,
        remote: &str,
    ) -> Result<()> {
        let (shown, logged) = match direction {
            TransferDirection::Upload => (
                format!("{} uploaded successfully to {} at {}", local, target.host, remote),
                format!("File uploaded via SSH from {} to {}", local, remote),
            ),
            TransferDirection::Download => (
                format!("{}:{} downloaded successfully to {}", target.host, remote, local),
                format!("File downloaded via SSH from {} to {}", remote, local),
            ),
        };
        self.write(&format!("{}\n", shown)).await?;
        self.activity.success(logged);
        Ok(())
    }

    async fn report_transfer_error(&mut self, e: &TransferError) -> Result<()> {
        let message = format!("SSH transfer error: {}", e);
        self.write(&format!("{}\n", message)).await?;
        self.activity.error(message);
        Ok(())
    }

    async fn show_completions(&mut self, partial: &str) -> Result<()> {
        let prefix = completion_prefix(partial);
        let entries = match self.mode {
            ConsoleMode::Home => Vec::new(),
            ConsoleMode::Shell => std::env::current_dir()
                .and_then(|cwd| directory_entries(&cwd))
                .unwrap_or_default(),
        };

        let options = complete(self.mode, prefix, &entries);
        if options.is_empty() {
            return Ok(());
        }
        self.write(&format!("{}\n", options.join("  "))).await
    }

    async fn exit(&mut self) -> Result<()> {
        self.write("bye!\n").await?;

        match self.history.save() {
            Ok(()) => self.activity.success("Command history saved"),
            Err(e) => {
                let message = format!("Error saving history: {:#}", e);
                self.write(&format!("{}\n", message)).await?;
                self.activity.error(message);
            }
        }

        self.activity.success("Shell exited");
        Ok(())
    }

    /// Prompt for a value; `None` when the operator interrupts or input ends
    async fn prompt_value(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.prompt_line(prompt).await? {
            PromptInput::Line(line) => Ok(Some(line.trim().to_string())),
            PromptInput::Interrupted => {
                self.write("\nTransfer cancelled.\n").await?;
                self.activity.warning("Transfer cancelled by user");
                Ok(None)
            }
            PromptInput::Terminated | PromptInput::EndOfInput => Ok(None),
        }
    }

    /// Like [`Self::prompt_value`] with terminal echo turned off
    async fn prompt_secret(&mut self, prompt: &str) -> Result<Option<String>> {
        let echo = EchoGuard::disable();
        let value = self.prompt_value(prompt).await;

        // The operator's Enter was not echoed either
        if echo.is_some() {
            drop(echo);
            self.write("\n").await?;
        }
        value
    }

    async fn prompt_line(&mut self, prompt: &str) -> Result<PromptInput> {
        self.write(prompt).await?;

        let received = tokio::select! {
            line = self.input.read_line() => match line {
                Some(line) => PromptInput::Line(line),
                None => PromptInput::EndOfInput,
            },
            interrupt = self.interrupt_rx.recv() => match interrupt {
                Ok(Interrupt::Cancel) | Err(RecvError::Lagged(_)) => PromptInput::Interrupted,
                Ok(Interrupt::Terminate) | Err(RecvError::Closed) => PromptInput::Terminated,
            },
        };

        if matches!(received, PromptInput::Terminated) {
            self.terminating = true;
        }
        Ok(received)
    }

    /// Forget interrupts delivered while a command was running
    fn drain_interrupts(&mut self) {
        loop {
            match self.interrupt_rx.try_recv() {
                Ok(Interrupt::Terminate) => self.terminating = true,
                Ok(Interrupt::Cancel) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.display.write_all(text.as_bytes()).await?;
        self.display.flush().await?;
        Ok(())
    }
}
