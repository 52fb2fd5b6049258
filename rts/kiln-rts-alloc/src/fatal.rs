//! The runtime's process-fatal panic primitive.
//!
//! Conditions that correct generated code can never reach (an unknown type
//! name, a corrupted heap ledger, an error with no slot at the C ABI) end
//! the process here instead of unwinding: the location and every message
//! are printed to stdout, stdout is flushed, and the process exits with
//! status 1.

use std::io::Write;

/// Exit status used by every fatal path.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Render a fatal diagnostic the way [`fatal_bytes`] prints it, without
/// the trailing newline.
#[must_use]
pub fn render(location: &[u8], messages: &[&[u8]]) -> Vec<u8> {
    let mut line = Vec::with_capacity(location.len() + messages.iter().map(|m| m.len()).sum::<usize>());
    line.extend_from_slice(location);
    for message in messages {
        line.extend_from_slice(message);
    }
    line
}

/// Print `location` followed by every message, flush, and exit with status 1.
pub fn fatal(location: &str, messages: &[&str]) -> ! {
    let messages: Vec<&[u8]> = messages.iter().map(|m| m.as_bytes()).collect();
    fatal_bytes(location.as_bytes(), &messages)
}

/// [`fatal`] for diagnostics that are byte strings. The bytes reach stdout
/// unchanged.
pub fn fatal_bytes(location: &[u8], messages: &[&[u8]]) -> ! {
    let line = render(location, messages);
    tracing::error!("fatal runtime error: {}", String::from_utf8_lossy(&line));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    // Nothing useful can be done if stdout is gone; exit regardless.
    let _ = out.write_all(&line);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
    drop(out);

    std::process::exit(FATAL_EXIT_CODE)
}

/// Call [`fatal`] with the current source location as the location string.
///
/// Each argument may be anything that implements `AsRef<str>`.
#[macro_export]
macro_rules! fatal {
    ($($msg:expr),+ $(,)?) => {
        $crate::fatal::fatal(
            concat!(file!(), ":", line!(), ": "),
            &[$(::core::convert::AsRef::<str>::as_ref(&$msg)),+],
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_concatenates_location_and_messages() {
        let line = render(b"core.rs:10: ", &[b"Vec.push: ", b"capacity exceeded"]);
        assert_eq!(line, b"core.rs:10: Vec.push: capacity exceeded");
    }

    #[test]
    fn test_render_empty_location() {
        assert_eq!(render(b"", &[b"boom"]), b"boom");
        assert!(render(b"", &[]).is_empty());
    }

    #[test]
    fn test_render_keeps_non_utf8_bytes() {
        assert_eq!(render(b"\xfe: ", &[b"\xff"]), b"\xfe: \xff");
    }
}
