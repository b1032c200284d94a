use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use engine::{AudioChannel, Command, Engine, EngineErrorEvent, Event, ProjectRemote, TimeSource};
use tracing::debug;

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 8;
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Sender used by the front end to dispatch commands to the engine thread.
pub type EngineCommandSender = mpsc::SyncSender<Command>;

/// Receiver used by the front end to read events emitted by the engine thread.
pub type EngineEventReceiver = mpsc::Receiver<Event>;

/// Spawns a thread that owns `engine`, applies incoming commands and runs its
/// timers between them.
///
/// The thread exits and disposes the engine once the command sender is
/// dropped or the event receiver goes away.
pub fn spawn_engine_bridge<R, A, T>(
    mut engine: Engine<R, A, T>,
) -> (EngineCommandSender, EngineEventReceiver)
where
    R: ProjectRemote + Send + 'static,
    A: AudioChannel + Send + 'static,
    T: TimeSource + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::sync_channel::<Command>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);

    thread::spawn(move || {
        loop {
            let wait = engine.time_until_next_task().unwrap_or(IDLE_WAIT);
            let events = match command_rx.recv_timeout(wait) {
                Ok(command) => match engine.handle_command(command) {
                    Ok(events) => events,
                    Err(error) => vec![Event::Error(EngineErrorEvent::from_error(&error))],
                },
                Err(RecvTimeoutError::Timeout) => Vec::new(),
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if forward(&event_tx, events).is_err() {
                break;
            }
            if forward(&event_tx, engine.run_due_tasks()).is_err() {
                break;
            }
        }
        engine.dispose();
        debug!("engine bridge stopped");
    });

    (command_tx, event_rx)
}

fn forward(event_tx: &mpsc::SyncSender<Event>, events: Vec<Event>) -> Result<(), ()> {
    for event in events {
        event_tx.send(event).map_err(|_| ())?;
    }
    Ok(())
}
