//! Event-stream interpretation.
//!
//! Consumes decoded lines of a `text/event-stream` body, accumulates field
//! values, and produces a [`DispatchableEvent`] whenever a blank line
//! terminates an event that carries data.

use std::time::Duration;

use herald_types::DispatchableEvent;
use herald_types::util::is_ascii_digits;

use crate::retry::RetryState;

/// Per-event accumulation state.
///
/// `last_event_id` is the committed id sent as `Last-Event-ID` on reconnect.
/// It only changes when an event is dispatched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventStreamBuffers {
    data: String,
    event_type: String,
    last_event_id_buffer: String,
    last_event_id: String,
}

impl EventStreamBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id committed at the most recent dispatch.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Interpret one line. Returns an event when the line completes one.
    pub fn process_line(
        &mut self,
        line: &str,
        origin: &str,
        retry: &mut RetryState,
    ) -> Option<DispatchableEvent> {
        if line.is_empty() {
            return self.dispatch(origin);
        }
        if line.starts_with(':') {
            return None;
        }

        match line.split_once(':') {
            Some((field, value)) => {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.process_field(field, value, retry);
            }
            None => self.process_field(line, "", retry),
        }
        None
    }

    fn process_field(&mut self, field: &str, value: &str, retry: &mut RetryState) {
        match field {
            "event" => value.clone_into(&mut self.event_type),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => value.clone_into(&mut self.last_event_id_buffer),
            "retry" => {
                if !value.is_empty() && is_ascii_digits(value) {
                    if let Ok(ms) = value.parse::<u64>() {
                        retry.set_reconnection_time(Duration::from_millis(ms));
                    }
                }
            }
            _ => tracing::trace!(field, "Ignoring unknown event-stream field"),
        }
    }

    /// Dispatch the buffered event. A payload that is empty once its final
    /// newline is dropped produces nothing.
    fn dispatch(&mut self, origin: &str) -> Option<DispatchableEvent> {
        self.last_event_id.clone_from(&self.last_event_id_buffer);

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        if data.is_empty() {
            self.event_type.clear();
            return None;
        }

        let event_type = std::mem::take(&mut self.event_type);
        Some(DispatchableEvent::new(data, event_type, origin.to_string()))
    }

    /// Drop a half-received event. Ids survive so the next connection can
    /// resume from them.
    pub fn discard_pending(&mut self) {
        self.data.clear();
        self.event_type.clear();
    }
}
