use std::sync::mpsc::{Receiver, Sender};

use tokio::sync::oneshot;
use tracing::warn;

pub trait Command: Send + 'static {
    type Response: Send;
    type Error: std::error::Error + Send + 'static;
    type Handler: DeviceHandler<Command = Self>;

    fn execute(self, handler: &mut Self::Handler) -> Result<Self::Response, Self::Error>;
}

pub trait DeviceHandler {
    type Command: Command<Handler = Self>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError<E: std::error::Error + 'static> {
    #[error("command executor is not running")]
    Stopped,
    #[error(transparent)]
    Command(E),
}

type CommandOutcome<C> = Result<<C as Command>::Response, <C as Command>::Error>;

enum Message<C: Command> {
    Run(GenericCommand<C>),
    Stop,
}

struct GenericCommand<C: Command> {
    command: C,
    response_ch: oneshot::Sender<CommandOutcome<C>>,
}

impl<C: Command> GenericCommand<C> {
    fn new(command: C, response_ch: oneshot::Sender<CommandOutcome<C>>) -> Self {
        Self {
            command,
            response_ch,
        }
    }

    fn execute(self, handler: &mut C::Handler) {
        let result = self.command.execute(handler);

        if let Err(e) = &result {
            warn!(error = %e, "command failed");
        }

        // The caller may have given up waiting.
        let _ = self.response_ch.send(result);
    }
}

/// Runs device commands one at a time on a dedicated blocking thread.
///
/// The handler, and with it the device link, is only ever touched from that
/// thread, so at most one transaction is in flight.
pub struct CommandExecutor<H: DeviceHandler + Send + 'static> {
    handler: H,
    commands_ch: Receiver<Message<H::Command>>,
    sender: Sender<Message<H::Command>>,
}

impl<H: DeviceHandler + Send + 'static> CommandExecutor<H> {
    pub fn new(handler: H) -> Self {
        let (sender, commands_ch) = std::sync::mpsc::channel();

        Self {
            handler,
            commands_ch,
            sender,
        }
    }

    pub fn sender(&self) -> CommandSender<H::Command> {
        CommandSender::new(self.sender.clone())
    }

    /// Blocks until a sender asks to stop or every sender has been dropped.
    pub fn run(self) -> H {
        let Self {
            mut handler,
            commands_ch,
            sender,
        } = self;
        drop(sender);

        while let Ok(Message::Run(command)) = commands_ch.recv() {
            command.execute(&mut handler);
        }

        handler
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<H> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

pub struct CommandSender<C: Command> {
    commands_ch: Sender<Message<C>>,
}

impl<C: Command> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self {
            commands_ch: self.commands_ch.clone(),
        }
    }
}

impl<C: Command> CommandSender<C> {
    fn new(commands_ch: Sender<Message<C>>) -> Self {
        Self { commands_ch }
    }

    /// Makes the executor return once the commands queued so far have run.
    pub fn stop(&self) {
        let _ = self.commands_ch.send(Message::Stop);
    }

    pub async fn send_command(&self, command: C) -> Result<C::Response, ExecutorError<C::Error>> {
        let (response_ch, response_rx) = oneshot::channel();
        let command = GenericCommand::new(command, response_ch);

        self.commands_ch
            .send(Message::Run(command))
            .map_err(|_| ExecutorError::Stopped)?;

        response_rx
            .await
            .map_err(|_| ExecutorError::Stopped)?
            .map_err(ExecutorError::Command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("refused")
        }
    }

    impl std::error::Error for Refused {}

    #[derive(Default)]
    struct Counter {
        log: Vec<u32>,
    }

    impl DeviceHandler for Counter {
        type Command = Push;
    }

    struct Push(u32);

    impl Command for Push {
        type Response = usize;
        type Error = Refused;
        type Handler = Counter;

        fn execute(self, handler: &mut Counter) -> Result<usize, Refused> {
            if self.0 == 0 {
                return Err(Refused);
            }
            handler.log.push(self.0);
            Ok(handler.log.len())
        }
    }

    #[tokio::test]
    async fn commands_run_in_order() {
        let executor = CommandExecutor::new(Counter::default());
        let sender = executor.sender();
        let handle = executor.spawn();

        assert_eq!(sender.send_command(Push(7)).await.unwrap(), 1);
        assert_eq!(sender.send_command(Push(9)).await.unwrap(), 2);

        drop(sender);
        let handler = handle.await.unwrap();
        assert_eq!(handler.log, vec![7, 9]);
    }

    #[tokio::test]
    async fn command_error_reaches_caller() {
        let executor = CommandExecutor::new(Counter::default());
        let sender = executor.sender();
        let _handle = executor.spawn();

        let err = sender.send_command(Push(0)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Command(Refused)));
        assert_eq!(sender.send_command(Push(3)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stop_ends_worker() {
        let executor = CommandExecutor::new(Counter::default());
        let sender = executor.sender();
        let handle = executor.spawn();

        assert_eq!(sender.send_command(Push(4)).await.unwrap(), 1);
        sender.stop();

        let handler = handle.await.unwrap();
        assert_eq!(handler.log, vec![4]);
        assert!(matches!(
            sender.send_command(Push(5)).await,
            Err(ExecutorError::Stopped)
        ));
    }

    #[tokio::test]
    async fn stopped_executor_is_reported() {
        let executor = CommandExecutor::new(Counter::default());
        let sender = executor.sender();
        drop(executor);

        let err = sender.send_command(Push(1)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Stopped));
    }
}
