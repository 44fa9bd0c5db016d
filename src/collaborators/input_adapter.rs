//! Real `Automation` backed by [`enigo`], the prior system's own
//! mouse/keyboard crate (see `input/mod.rs` there). Gated behind the
//! `input` feature: disabled by default, since this is the one
//! collaborator that actually drives the real desktop — its actions are
//! never sandboxed.

use super::{Automation, CollaboratorError, Primitive};
use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use std::sync::Mutex;

/// Canonical key name -> `enigo::Key`. Only the names the step executor's
/// key-name table can ever produce reach this adapter; anything else
/// would already have been dropped upstream, so an unmapped name here is
/// folded into a best-effort `Key::Unicode` rather than failing the step.
fn enigo_key(name: &str) -> enigo::Key {
    use enigo::Key;
    match name {
        "enter" => Key::Return,
        "escape" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "ctrl" => Key::Control,
        "cmd" => Key::Meta,
        "shift" => Key::Shift,
        "alt" => Key::Alt,
        "delete" => Key::Delete,
        "backspace" => Key::Backspace,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        other => other
            .chars()
            .next()
            .map(Key::Unicode)
            .unwrap_or(Key::Unicode(' ')),
    }
}

/// Runs an `Automate(primitive program)` call against the real desktop.
/// One `Enigo` instance is reused across calls; `enigo` itself is not
/// `Send`-friendly across an `.await`, so the whole program runs inside
/// one `spawn_blocking` call rather than awaiting between primitives.
pub struct EnigoAutomation {
    enigo: Mutex<Option<Enigo>>,
}

impl EnigoAutomation {
    pub fn new() -> Result<Self, CollaboratorError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
        Ok(Self {
            enigo: Mutex::new(Some(enigo)),
        })
    }
}

fn run_program(enigo: &mut Enigo, program: &[Primitive]) -> Result<(), CollaboratorError> {
    for primitive in program {
        match primitive {
            Primitive::Move { x, y } => enigo
                .move_mouse(*x as i32, *y as i32, Coordinate::Abs)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?,
            Primitive::Click => enigo
                .button(Button::Left, Direction::Click)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?,
            Primitive::DoubleClick => {
                enigo
                    .button(Button::Left, Direction::Click)
                    .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
                std::thread::sleep(std::time::Duration::from_millis(50));
                enigo
                    .button(Button::Left, Direction::Click)
                    .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
            }
            Primitive::RightClick => enigo
                .button(Button::Right, Direction::Click)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?,
            Primitive::Type(text) => enigo
                .text(text)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?,
            Primitive::Press(key) => enigo
                .key(enigo_key(key), Direction::Click)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?,
            Primitive::Scroll { dx, dy } => {
                if *dx != 0 {
                    enigo
                        .scroll(*dx, enigo::Axis::Horizontal)
                        .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
                }
                if *dy != 0 {
                    enigo
                        .scroll(*dy, enigo::Axis::Vertical)
                        .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
                }
            }
            Primitive::Sleep(seconds) => {
                std::thread::sleep(std::time::Duration::from_secs_f64(*seconds));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Automation for EnigoAutomation {
    async fn run(&self, program: &[Primitive]) -> Result<(), CollaboratorError> {
        let program = program.to_vec();
        // `Enigo` is taken out of the mutex for the duration of the
        // blocking call and put back after, so the async `run` signature
        // never holds a non-`Send` guard across an await point.
        let mut enigo = self
            .enigo
            .lock()
            .expect("enigo lock poisoned")
            .take()
            .ok_or_else(|| CollaboratorError::Failed("automation not initialized".to_string()))?;

        let (enigo, result) = tokio::task::spawn_blocking(move || {
            let result = run_program(&mut enigo, &program);
            (enigo, result)
        })
        .await
        .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        *self.enigo.lock().expect("enigo lock poisoned") = Some(enigo);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enigo_key_maps_known_synonym_canonical_names() {
        assert!(matches!(enigo_key("enter"), enigo::Key::Return));
        assert!(matches!(enigo_key("escape"), enigo::Key::Escape));
    }

    #[test]
    fn enigo_key_falls_back_to_unicode_for_unknown_name() {
        assert!(matches!(enigo_key("z"), enigo::Key::Unicode('z')));
    }
}
