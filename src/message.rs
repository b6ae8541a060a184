//! Message formatting
//!
//! Pure functions that turn chat content into wire-ready text. User messages
//! are tagged with the sender's address and name; server notices are wrapped
//! in a banner so clients can tell them apart from user content.

use std::net::SocketAddr;

/// Opening line of a server notice
pub const NOTICE_HEADER: &str = "=== Server ===";

/// Closing line of a server notice
pub const NOTICE_FOOTER: &str = "==============";

/// Roster text when nobody else is connected
pub const EMPTY_ROSTER: &str = "None is here.";

/// Join notice body
pub const CONNECTED: &str = "Has connected!";

/// Leave notice body
pub const DISCONNECTED: &str = "Has disconnected!";

/// Tag `text` with its sender: `[<ip>:<port> | <name>] <text>`
pub fn user_message(addr: SocketAddr, name: &str, text: &str) -> String {
    format!("[{} | {}] {}", addr, name, text)
}

/// Wrap `text` in the server notice banner
pub fn server_notice(text: &str) -> String {
    format!("{}\n{}\n{}\n", NOTICE_HEADER, text, NOTICE_FOOTER)
}

/// Describe who is in the chat
///
/// Returns `"A, B are in the chat."`, or [`EMPTY_ROSTER`] for no names.
pub fn roster<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    if names.is_empty() {
        EMPTY_ROSTER.to_string()
    } else {
        format!("{} are in the chat.", names.join(", "))
    }
}

/// Encode `text` for the wire, newline-terminated exactly once
pub fn frame(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    if !text.ends_with('\n') {
        bytes.push(b'\n');
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            user_message(addr(), "Alice", "hello"),
            "[127.0.0.1:40000 | Alice] hello"
        );
    }

    #[test]
    fn test_server_notice() {
        let notice = server_notice(&user_message(addr(), "Alice", CONNECTED));
        assert_eq!(
            notice,
            "=== Server ===\n[127.0.0.1:40000 | Alice] Has connected!\n==============\n"
        );
    }

    #[test]
    fn test_roster_empty() {
        assert_eq!(roster(Vec::new()), "None is here.");
    }

    #[test]
    fn test_roster_names() {
        assert_eq!(roster(["Alice"]), "Alice are in the chat.");
        assert_eq!(roster(["Alice", "Bob"]), "Alice, Bob are in the chat.");
    }

    #[test]
    fn test_frame_appends_newline() {
        assert_eq!(frame("hello"), b"hello\n".to_vec());
    }

    #[test]
    fn test_frame_is_idempotent() {
        assert_eq!(frame("hello\n"), b"hello\n".to_vec());
        let once = frame("hello");
        let twice = frame(std::str::from_utf8(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_frame_notice_not_doubled() {
        let notice = server_notice(EMPTY_ROSTER);
        assert_eq!(frame(&notice), notice.into_bytes());
    }
}
