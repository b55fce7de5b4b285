//! Deferred side effects bound to a ledger write.
//!
//! Actions registered with [`AfterCommit::on_commit`] run only when the caller
//! reports that the write committed; a rolled-back or dropped unit discards them.

type Deferred<T> = Box<dyn FnOnce(&T) + Send + 'static>;

pub struct AfterCommit<T> {
    actions: Vec<Deferred<T>>,
}

impl<T> Default for AfterCommit<T> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<T> AfterCommit<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_commit(&mut self, action: impl FnOnce(&T) + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every action, in registration order, against the committed value.
    pub fn committed(self, value: &T) {
        for action in self.actions {
            action(value);
        }
    }

    pub fn rolled_back(self) {
        if !self.actions.is_empty() {
            tracing::debug!("Discarding {} deferred action(s)", self.actions.len());
        }
    }
}
