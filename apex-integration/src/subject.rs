use parking_lot::Mutex;

/// Listener callback registered with a [`Subject`].
pub type Listener<T> = Box<dyn FnMut(&T) + Send>;

/// Minimal observable: a list of callbacks invoked in subscription order on every
/// [`Subject::next`].
///
/// Listeners may subscribe from any thread, including from within a listener callback; such
/// late subscribers start receiving from the following `next`.
pub struct Subject<T> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subject<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: impl FnMut(&T) + Send + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Notify all listeners. The listener list is released during callbacks so that a
    /// listener may itself subscribe without deadlocking.
    pub fn next(&self, value: &T) {
        let mut active = std::mem::take(&mut *self.listeners.lock());

        for listener in active.iter_mut() {
            listener(value);
        }

        let mut guard = self.listeners.lock();
        let added_during_notify = std::mem::replace(&mut *guard, active);
        guard.extend(added_during_notify);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}
