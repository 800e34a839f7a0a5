//! Surfacing pod events while waiting.

use skiff_core::Event;

/// Remembers how many events of a list were already shown.
///
/// Event lists come back oldest first, so anything past the cursor is new.
/// If the list shrinks (events expired server side) the cursor starts over.
#[derive(Debug, Default)]
pub struct EventCursor {
    seen: usize,
}

impl EventCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events not returned by a previous call.
    pub fn fresh<'a>(&mut self, events: &'a [Event]) -> &'a [Event] {
        if events.len() < self.seen {
            self.seen = 0;
        }
        let fresh = &events[self.seen..];
        self.seen = events.len();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(reason: &str) -> Event {
        Event {
            reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn only_new_events_are_returned() {
        let mut cursor = EventCursor::new();
        let first = vec![event("Scheduled")];
        assert_eq!(cursor.fresh(&first).len(), 1);
        assert!(cursor.fresh(&first).is_empty());

        let second = vec![event("Scheduled"), event("Pulling"), event("Pulled")];
        let fresh = cursor.fresh(&second);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].reason.as_deref(), Some("Pulling"));
    }

    #[test]
    fn shrinking_list_resets() {
        let mut cursor = EventCursor::new();
        cursor.fresh(&[event("a"), event("b")]);
        assert_eq!(cursor.fresh(&[event("c")]).len(), 1);
    }
}
