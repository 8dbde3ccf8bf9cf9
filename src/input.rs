use std::{
    io,
    panic,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use tracing::{debug, info};

/// Everything the monitor reacts to on the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    MoveUp,
    MoveDown,
    Select,
    Exit,
    /// Ctrl+C or a termination signal: leave from any view.
    Interrupt,
    Refresh,
    None,
}

/// Map a decoded key event onto an action. Escape sequences (arrows, bare
/// ESC) are already split apart by crossterm's parser, so a lone ESC and an
/// arrow key never collide here.
pub fn decode_key(key: KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') => KeyAction::Interrupt,
            _ => KeyAction::None,
        };
    }
    match key.code {
        KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('w') | KeyCode::Char('W') => KeyAction::MoveUp,
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('s') | KeyCode::Char('S') => KeyAction::MoveDown,
        KeyCode::Enter | KeyCode::Char('\n') | KeyCode::Char('\r') => KeyAction::Select,
        KeyCode::Esc | KeyCode::Char('q') => KeyAction::Exit,
        KeyCode::Char('r') => KeyAction::Refresh,
        _ => KeyAction::None,
    }
}

/// Switches the terminal in and out of the exclusive mode the monitor needs.
pub trait TerminalMode: Send + 'static {
    fn enter(&mut self) -> io::Result<()>;
    fn leave(&mut self) -> io::Result<()>;
}

/// Raw input plus the alternate screen, via crossterm.
pub struct CrosstermMode;

impl TerminalMode for CrosstermMode {
    fn enter(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)
    }

    fn leave(&mut self) -> io::Result<()> {
        let raw = disable_raw_mode();
        execute!(io::stdout(), LeaveAlternateScreen, cursor::Show)?;
        raw
    }
}

/// Owns the terminal mode for a session. The previous mode is restored
/// exactly once: on `restore`, on drop, or from the panic hook, whichever
/// comes first.
pub struct RawModeGuard<M: TerminalMode> {
    mode: Arc<Mutex<Option<M>>>,
}

impl<M: TerminalMode> RawModeGuard<M> {
    pub fn acquire(mut mode: M) -> io::Result<Self> {
        if let Err(err) = mode.enter() {
            // Half-entered modes (raw on, screen switch failed) still need undoing.
            let _ = mode.leave();
            return Err(err);
        }
        debug!("terminal mode acquired");
        Ok(RawModeGuard {
            mode: Arc::new(Mutex::new(Some(mode))),
        })
    }

    /// Returns `Ok(true)` if this call performed the restoration.
    pub fn restore(&self) -> io::Result<bool> {
        restore_shared(&self.mode)
    }

    pub fn is_active(&self) -> bool {
        self.mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Restore the terminal before the default hook prints the panic message.
    pub fn install_panic_hook(&self) {
        let mode = Arc::clone(&self.mode);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let _ = restore_shared(&mode);
            previous(info);
        }));
    }
}

impl<M: TerminalMode> Drop for RawModeGuard<M> {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

fn restore_shared<M: TerminalMode>(mode: &Mutex<Option<M>>) -> io::Result<bool> {
    let taken = mode.lock().unwrap_or_else(PoisonError::into_inner).take();
    match taken {
        Some(mut mode) => {
            mode.leave()?;
            info!("terminal mode restored");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Where the main loop gets its keys from, and how it hands the terminal back.
pub trait InputSource {
    /// Wait at most `timeout` for a key and decode it. Timeouts and
    /// non-key events yield `KeyAction::None`.
    fn read_key(&mut self, timeout: Duration) -> io::Result<KeyAction>;

    /// Restore the terminal mode. Returns `Ok(true)` only the first time.
    fn restore(&mut self) -> io::Result<bool>;
}

/// Keyboard reader bound to an acquired terminal mode.
pub struct InputReader<M: TerminalMode = CrosstermMode> {
    guard: RawModeGuard<M>,
}

impl InputReader<CrosstermMode> {
    pub fn open() -> io::Result<Self> {
        Self::with_mode(CrosstermMode)
    }
}

impl InputSource for InputReader<CrosstermMode> {
    fn read_key(&mut self, timeout: Duration) -> io::Result<KeyAction> {
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                return Ok(decode_key(key));
            }
        }
        Ok(KeyAction::None)
    }

    fn restore(&mut self) -> io::Result<bool> {
        self.guard.restore()
    }
}

impl<M: TerminalMode> InputReader<M> {
    pub fn with_mode(mode: M) -> io::Result<Self> {
        Ok(InputReader {
            guard: RawModeGuard::acquire(mode)?,
        })
    }

    pub fn guard(&self) -> &RawModeGuard<M> {
        &self.guard
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    pub(crate) struct Counters {
        pub entered: Arc<AtomicUsize>,
        pub left: Arc<AtomicUsize>,
    }

    pub(crate) struct FakeMode {
        counters: Counters,
        fail_enter: bool,
    }

    impl TerminalMode for FakeMode {
        fn enter(&mut self) -> io::Result<()> {
            self.counters.entered.fetch_add(1, Ordering::SeqCst);
            if self.fail_enter {
                Err(io::Error::new(io::ErrorKind::Other, "not a tty"))
            } else {
                Ok(())
            }
        }

        fn leave(&mut self) -> io::Result<()> {
            self.counters.left.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn fake(counters: &Counters) -> FakeMode {
        FakeMode {
            counters: counters.clone(),
            fail_enter: false,
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_arrow_keys_navigate() {
        assert_eq!(decode_key(press(KeyCode::Up)), KeyAction::MoveUp);
        assert_eq!(decode_key(press(KeyCode::Down)), KeyAction::MoveDown);
        assert_eq!(decode_key(press(KeyCode::Char('w'))), KeyAction::MoveUp);
        assert_eq!(decode_key(press(KeyCode::Char('s'))), KeyAction::MoveDown);
    }

    #[test]
    fn test_bare_escape_exits() {
        assert_eq!(decode_key(press(KeyCode::Esc)), KeyAction::Exit);
    }

    #[test]
    fn test_enter_selects() {
        assert_eq!(decode_key(press(KeyCode::Enter)), KeyAction::Select);
    }

    #[test]
    fn test_ctrl_c_interrupts() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(decode_key(key), KeyAction::Interrupt);
    }

    #[test]
    fn test_unrecognized_keys_do_nothing() {
        assert_eq!(decode_key(press(KeyCode::Char('x'))), KeyAction::None);
        assert_eq!(decode_key(press(KeyCode::F(5))), KeyAction::None);
        assert_eq!(decode_key(press(KeyCode::Left)), KeyAction::None);
        let ctrl_x = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL);
        assert_eq!(decode_key(ctrl_x), KeyAction::None);
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut key = press(KeyCode::Enter);
        key.kind = KeyEventKind::Release;
        assert_eq!(decode_key(key), KeyAction::None);
    }

    #[test]
    fn test_guard_restores_once_on_drop() {
        let counters = Counters::default();
        {
            let guard = RawModeGuard::acquire(fake(&counters)).unwrap();
            assert!(guard.is_active());
        }
        assert_eq!(counters.entered.load(Ordering::SeqCst), 1);
        assert_eq!(counters.left.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_restore_then_drop_restores_once() {
        let counters = Counters::default();
        let guard = RawModeGuard::acquire(fake(&counters)).unwrap();
        assert!(guard.restore().unwrap());
        assert!(!guard.restore().unwrap());
        assert!(!guard.is_active());
        drop(guard);
        assert_eq!(counters.left.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_restores_when_unwinding() {
        let counters = Counters::default();
        let inner = counters.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = RawModeGuard::acquire(fake(&inner)).unwrap();
            panic!("render failed");
        });
        assert!(result.is_err());
        assert_eq!(counters.left.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_acquire_undoes_partial_mode() {
        let counters = Counters::default();
        let mode = FakeMode {
            counters: counters.clone(),
            fail_enter: true,
        };
        assert!(InputReader::with_mode(mode).is_err());
        assert_eq!(counters.left.load(Ordering::SeqCst), 1);
    }
}
