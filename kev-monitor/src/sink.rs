//! Console sink: writes each event as one line of text or JSON.

use std::io::{self, Stdout, Write};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use kev_client::{KeyEvent, NotifySink};

use crate::config::OutputFormat;

pub struct ConsoleSink<W> {
    format: OutputFormat,
    out: Mutex<W>,
}

impl ConsoleSink<Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        ConsoleSink {
            format,
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> NotifySink for ConsoleSink<W> {
    fn notify(&self, event: KeyEvent) -> anyhow::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = match self.format {
            OutputFormat::Text => writeln!(out, "Received event: {}", event),
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, &event).context("encoding event")?;
                writeln!(out)
            }
        };
        written.context("writing event")?;
        out.flush().context("flushing event")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(value: Option<&str>) -> KeyEvent {
        KeyEvent {
            message_type: "pmessage".into(),
            pattern: "__keyevent@*:*".into(),
            channel: "__keyevent@0__:set".into(),
            key: "foo".into(),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn writes_text_lines() {
        let sink = ConsoleSink::new(OutputFormat::Text, Vec::new());
        sink.notify(event(Some("bar"))).unwrap();
        sink.notify(event(None)).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            [
                "Received event: Type=pmessage, Pattern=__keyevent@*:*, Channel=__keyevent@0__:set, Key=foo, Value=bar",
                "Received event: Type=pmessage, Pattern=__keyevent@*:*, Channel=__keyevent@0__:set, Key=foo, Value=",
            ]
        );
    }

    #[test]
    fn writes_json_lines() {
        let sink = ConsoleSink::new(OutputFormat::Json, Vec::new());
        sink.notify(event(Some("bar"))).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let decoded: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
        assert_eq!(decoded["key"], "foo");
        assert_eq!(decoded["value"], "bar");
        assert_eq!(decoded["channel"], "__keyevent@0__:set");
    }
}
