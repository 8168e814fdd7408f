use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyboardEnhancementFlags},
    execute, terminal,
};

use crate::output::Output;

/// Capacity of the channel between the terminal thread and the CPU.
pub const EVENT_QUEUE_LEN: usize = 64;

/// How often the listener thread checks whether it should stop.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Keys the CPU cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Shift,
    /// Stops the run.
    Escape,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// A key-down or key-up notification with the shift modifier state at that moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub action: KeyAction,
    pub shift: bool,
}

impl KeyEvent {
    pub fn press(key: Key) -> Self {
        KeyEvent {
            key,
            action: KeyAction::Press,
            shift: false,
        }
    }

    pub fn release(key: Key) -> Self {
        KeyEvent {
            key,
            action: KeyAction::Release,
            shift: false,
        }
    }

    pub fn with_shift(self, shift: bool) -> Self {
        KeyEvent { shift, ..self }
    }
}

impl TryFrom<Event> for KeyEvent {
    type Error = ();
    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if let Event::Key(event) = event {
            return event.try_into();
        }
        Err(())
    }
}

impl TryFrom<event::KeyEvent> for KeyEvent {
    type Error = ();
    fn try_from(event: event::KeyEvent) -> Result<Self, Self::Error> {
        use event::{KeyCode, KeyEventKind, KeyModifiers as Mod, ModifierKeyCode};

        let action = match event.kind {
            KeyEventKind::Press => KeyAction::Press,
            KeyEventKind::Release => KeyAction::Release,
            // Held keys deliver once
            KeyEventKind::Repeat => return Err(()),
        };

        let key = match (event.modifiers, event.code) {
            // Raw mode swallows the signal, so treat Ctrl+C as a stop request
            (Mod::CONTROL, KeyCode::Char('c')) => Key::Escape,
            (_, KeyCode::Esc) => Key::Escape,
            (_, KeyCode::Modifier(ModifierKeyCode::LeftShift | ModifierKeyCode::RightShift)) => {
                Key::Shift
            }
            (_, KeyCode::Enter) => Key::Char('\n'),
            (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => Key::Char(ch),
            _ => return Err(()),
        };

        Ok(KeyEvent {
            key,
            action,
            shift: event.modifiers.contains(Mod::SHIFT),
        })
    }
}

/// Terminal keyboard listener running on its own thread.
///
/// Holds the terminal in raw mode for as long as it lives. Events are forwarded over a bounded
/// channel; the CPU drains it between cycles.
pub struct Keyboard {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    enhanced: bool,
}

impl Keyboard {
    /// Must only be called if terminal is NOT in raw mode.
    pub fn spawn() -> io::Result<(Self, Receiver<KeyEvent>)> {
        let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_LEN);

        terminal::enable_raw_mode()?;
        Output::set_raw(true);

        // Release events are only reported by terminals supporting the enhancement protocol
        let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            execute!(
                io::stdout(),
                event::PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                        | KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                )
            )?;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("keyboard".into())
                .spawn(move || listen(tx, stop))?
        };

        Ok((
            Keyboard {
                stop,
                handle: Some(handle),
                enhanced,
            },
            rx,
        ))
    }
}

fn listen(tx: SyncSender<KeyEvent>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => (),
            Ok(false) => continue,
            Err(_) => break,
        }
        let Ok(event) = event::read() else {
            break;
        };
        let Ok(key) = KeyEvent::try_from(event) else {
            continue;
        };
        // Receiver gone: the CPU has stopped
        if tx.send(key).is_err() {
            break;
        }
    }
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if self.enhanced {
            let _ = execute!(io::stdout(), event::PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
        Output::set_raw(false);
    }
}
