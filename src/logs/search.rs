/// Case-insensitive search over the lines of one log tab.
#[derive(Debug, Clone, Default)]
pub struct LogSearch {
    query: Option<String>,
    /// `(line, occurrence within line)` for every match, in document order.
    occurrences: Vec<(usize, usize)>,
    active: usize,
}

impl LogSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds every occurrence of `query` in `lines` and activates the first one.
    /// An empty query resets the search.
    pub fn search<S: AsRef<str>>(&mut self, lines: &[S], query: &str) {
        if query.is_empty() {
            self.reset();
            return;
        }

        let needle = query.to_lowercase();
        self.occurrences = lines
            .iter()
            .enumerate()
            .flat_map(|(line, text)| {
                let count = text.as_ref().to_lowercase().matches(needle.as_str()).count();
                (0..count).map(move |occurrence| (line, occurrence))
            })
            .collect();
        self.query = Some(query.to_owned());
        self.active = 0;
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn total_found(&self) -> usize {
        self.occurrences.len()
    }

    /// Index of the active occurrence.
    pub fn active_index(&self) -> Option<usize> {
        (!self.occurrences.is_empty()).then_some(self.active)
    }

    /// Line holding the active occurrence, for scrolling it into view.
    pub fn active_line(&self) -> Option<usize> {
        self.occurrences.get(self.active).map(|&(line, _)| line)
    }

    /// Whether the given occurrence within `line` is the active one.
    pub fn is_active_overlay(&self, line: usize, occurrence: usize) -> bool {
        self.occurrences.get(self.active) == Some(&(line, occurrence))
    }

    /// Activates the next occurrence, wrapping to the first.
    pub fn next(&mut self) -> Option<usize> {
        if self.occurrences.is_empty() {
            return None;
        }
        self.active = (self.active + 1) % self.occurrences.len();
        self.active_line()
    }

    /// Activates the previous occurrence, wrapping to the last.
    pub fn previous(&mut self) -> Option<usize> {
        if self.occurrences.is_empty() {
            return None;
        }
        self.active = self
            .active
            .checked_sub(1)
            .unwrap_or(self.occurrences.len() - 1);
        self.active_line()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
