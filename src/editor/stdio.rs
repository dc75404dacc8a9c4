//! JSON-lines editor adapter.
//!
//! One [`EditorEvent`] per line on stdin, one [`EditorRequest`] per line on
//! stdout. Logging goes to stderr, so stdout carries nothing else.

use std::io::{self, BufRead, Write};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

use super::{EditorEvent, EditorHandle, EditorRequest};

/// Read events from stdin on a background thread. End of input requests
/// shutdown.
pub fn spawn_reader(handle: EditorHandle) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        read_events(stdin.lock(), &handle);
        crate::debug!("editor"; "stdin closed");
        handle.shutdown();
        crate::core::request_shutdown();
    })
}

/// Write requests to stdout on a background thread until the channel closes.
pub fn spawn_writer(rx: mpsc::UnboundedReceiver<EditorRequest>) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = write_requests(rx, io::stdout()) {
            crate::log!("editor"; "stdout closed: {}", e);
        }
    })
}

/// Parse each line of `reader` and forward it. Blank lines are skipped and
/// malformed lines are reported, neither stops the loop.
pub fn read_events(reader: impl BufRead, handle: &EditorHandle) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<EditorEvent>(line) {
            Ok(event) => {
                if !handle.send(event) {
                    break;
                }
            }
            Err(e) => crate::log!("editor"; "ignoring malformed event: {}", e),
        }
    }
}

pub fn write_requests(
    mut rx: mpsc::UnboundedReceiver<EditorRequest>,
    mut out: impl Write,
) -> io::Result<()> {
    while let Some(request) = rx.blocking_recv() {
        serde_json::to_writer(&mut out, &request)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::messages::CoordinatorMsg;
    use std::path::PathBuf;

    #[test]
    fn test_read_events_skips_bad_lines() {
        let input = concat!(
            r#"{"event":"opened","path":"/p/main.tex"}"#,
            "\n\n",
            "garbage\n",
            r#"{"event":"saved","path":"/p/main.tex"}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        read_events(input.as_bytes(), &EditorHandle::new(tx));

        let mut events = Vec::new();
        while let Ok(CoordinatorMsg::Editor(event)) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            [
                EditorEvent::Opened {
                    path: PathBuf::from("/p/main.tex")
                },
                EditorEvent::Saved {
                    path: PathBuf::from("/p/main.tex")
                },
            ]
        );
    }

    #[test]
    fn test_write_requests_one_per_line() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(EditorRequest::Navigate {
            path: PathBuf::from("/p/a.tex"),
            line: 4,
        })
        .unwrap();
        tx.send(EditorRequest::Message {
            level: super::super::MessageLevel::Info,
            text: "hi".into(),
        })
        .unwrap();
        drop(tx);

        let mut out = Vec::new();
        write_requests(rx, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                r#"{"request":"navigate","path":"/p/a.tex","line":4}"#,
                r#"{"request":"message","level":"info","text":"hi"}"#,
            ]
        );
    }
}
