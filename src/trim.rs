//! Context-window trimming.
//!
//! Pure reduction of a message history to the bounded window actually sent
//! to the model. Trimming never touches the persisted history; it only
//! shapes the per-call view, for token-cost control.

use crate::message::{Message, Role};

/// Keeps every system message (in original order) plus the most recent
/// `window_size` non-system messages, preserving conversation order.
///
/// Idempotent: trimming an already-trimmed history returns it unchanged.
///
/// # Examples
///
/// ```
/// use colloquy::message::Message;
/// use colloquy::trim::trim_window;
///
/// let history = vec![
///     Message::system("You are a document assistant."),
///     Message::user("old question"),
///     Message::assistant("old answer"),
///     Message::user("new question"),
/// ];
/// let window = trim_window(&history, 2);
/// assert_eq!(window.len(), 3); // system + last two non-system
/// assert_eq!(window[0].content, "You are a document assistant.");
/// assert_eq!(window[1].content, "old answer");
/// ```
#[must_use]
pub fn trim_window(history: &[Message], window_size: usize) -> Vec<Message> {
    let non_system = history
        .iter()
        .filter(|m| !m.has_role(Role::System))
        .count();
    if non_system <= window_size {
        return history.to_vec();
    }

    let mut skip = non_system - window_size;
    let mut window = Vec::with_capacity(history.len() - skip);
    for message in history {
        if message.has_role(Role::System) {
            window.push(message.clone());
        } else if skip > 0 {
            skip -= 1;
        } else {
            window.push(message.clone());
        }
    }
    window
}
