//! Process hold counting.

/// Proof of one outstanding hold. Only [`HoldCount::release`] consumes it, so
/// every acquire is matched by at most one release.
#[must_use = "a dropped hold keeps the process alive forever"]
#[derive(Debug)]
pub struct Hold {
    _private: (),
}

#[derive(Debug, Default)]
pub struct HoldCount {
    outstanding: usize,
    ever_held: bool,
}

impl HoldCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self) -> Hold {
        self.outstanding += 1;
        self.ever_held = true;
        Hold { _private: () }
    }

    pub fn release(&mut self, hold: Hold) {
        let Hold { _private: () } = hold;
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    pub fn count(&self) -> usize {
        self.outstanding
    }

    /// True once the count has returned to zero after having been non-zero.
    pub fn is_released(&self) -> bool {
        self.ever_held && self.outstanding == 0
    }
}
