/// Append-only log of error strings, insertion order significant.
/// Never truncated during a session; the overlay renders newest-first.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.entries.push(message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest entry first, for display.
    pub fn newest_first(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let log = ErrorLog::new();
        assert!(log.is_empty());
    }

    #[test]
    fn preserves_insertion_order_and_reverses_for_display() {
        let mut log = ErrorLog::new();
        log.push("first");
        log.push("second");
        log.push("third");

        let displayed: Vec<&str> = log.newest_first().collect();
        assert_eq!(
            displayed,
            vec!["third", "second", "first"],
            "newest_first: display order should be reverse insertion order"
        );
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn never_truncates() {
        let mut log = ErrorLog::new();
        for i in 0..1000 {
            log.push(format!("error {}", i));
        }
        assert_eq!(log.len(), 1000, "push: log must never drop entries");
    }
}
