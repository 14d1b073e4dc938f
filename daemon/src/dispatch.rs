use shared::EventKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::command::{Command, CommandReceiver};
use crate::events::EventHub;
use crate::output::OutputRouter;
use crate::rate_limit::Cooldown;

/// Single consumer of the command queue. Applies the global cooldown and
/// hands each surviving command to the output router.
pub struct CommandDispatcher {
    rx: CommandReceiver,
    stop_rx: watch::Receiver<bool>,
    cooldown: Cooldown,
    router: OutputRouter,
    hub: EventHub,
}

impl CommandDispatcher {
    pub fn new(
        rx: CommandReceiver,
        stop_rx: watch::Receiver<bool>,
        cooldown: Cooldown,
        router: OutputRouter,
        hub: EventHub,
    ) -> Self {
        Self {
            rx,
            stop_rx,
            cooldown,
            router,
            hub,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(
            "Command dispatcher started (cooldown {:?})",
            self.cooldown.window()
        );

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            let command = tokio::select! {
                changed = self.stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                command = self.rx.recv() => command,
            };

            let Some(command) = command else {
                debug!("Command queue closed");
                break;
            };

            self.handle(command).await;
        }

        info!("Command dispatcher stopped");
    }

    async fn handle(&self, command: Command) {
        if !self.cooldown.try_acquire() {
            debug!(
                "Dropping '{}' from {}: cooldown active",
                command.action, command.source
            );
            return;
        }

        let router = self.router.clone();
        let action = command.action.clone();
        let outcome = tokio::task::spawn_blocking(move || router.send(&action)).await;

        let sink = match outcome {
            Ok((sink, Ok(()))) => {
                info!("{} -> {}", sink.as_str().to_uppercase(), command.action);
                sink
            }
            Ok((sink, Err(e))) => {
                error!("Failed to dispatch '{}': {}", command.action, e);
                sink
            }
            Err(e) => {
                error!("Dispatch task for '{}' failed: {}", command.action, e);
                return;
            }
        };

        self.hub
            .publish(command.event(EventKind::Dispatched, Some(sink.as_str())));
    }
}
