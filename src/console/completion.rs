//! Tab completion with cycling

/// Tab completion state
pub struct Completer {
    /// What the user typed before the first Tab
    prefix: String,
    /// Last completion handed out
    last: String,
    /// Current match index for cycling
    match_idx: usize,
    /// Whether we're actively cycling
    cycling: bool,
}

impl Completer {
    /// Create new completer
    pub const fn new() -> Self {
        Self {
            prefix: String::new(),
            last: String::new(),
            match_idx: 0,
            cycling: false,
        }
    }

    /// Complete `word`, cycling through matches on repeated calls.
    ///
    /// While cycling, `word` is the previous completion and the original
    /// prefix is matched again. Returns `None` if nothing matches.
    pub fn complete<'a, I>(&mut self, word: &str, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.cycling && word == self.last {
            self.match_idx += 1;
        } else {
            self.prefix.clear();
            self.prefix.push_str(word);
            self.match_idx = 0;
        }

        let matches: Vec<&'a str> = candidates
            .into_iter()
            .filter(|c| c.starts_with(self.prefix.as_str()))
            .collect();
        if matches.is_empty() {
            self.reset();
            return None;
        }

        self.match_idx %= matches.len();
        let pick = matches[self.match_idx];
        self.last.clear();
        self.last.push_str(pick);
        self.cycling = true;
        Some(pick)
    }

    /// Reset completion state (call when user types non-tab)
    pub fn reset(&mut self) {
        self.cycling = false;
        self.match_idx = 0;
    }
}

impl Default for Completer {
    fn default() -> Self {
        Self::new()
    }
}
