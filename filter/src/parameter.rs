use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Dirty flag plus modification counter shared between a filter and its parameters.
///
/// The epoch only ever grows; caches inside a filter remember the epoch they
/// were built at and compare it against the current one.
#[derive(Debug, Default)]
pub(crate) struct ChangeSignal {
    changed: AtomicBool,
    epoch: AtomicU64,
}

impl ChangeSignal {
    pub(crate) fn mark(&self) {
        self.changed.store(true, Ordering::Relaxed);
        self.epoch.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn changed(&self) -> bool {
        self.changed.load(Ordering::Relaxed)
    }

    pub(crate) fn set_changed(&self, b: bool) {
        if b {
            self.mark();
        } else {
            self.changed.store(false, Ordering::Relaxed);
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }
}

/// Non-owning handle a parameter uses to flag its filter as changed.
///
/// Holding a notifier does not keep the filter alive; notifying after the
/// filter is gone is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier(Weak<ChangeSignal>);

impl ChangeNotifier {
    pub(crate) fn new(signal: &Arc<ChangeSignal>) -> Self {
        Self(Arc::downgrade(signal))
    }

    pub fn notify(&self) {
        if let Some(signal) = self.0.upgrade() {
            signal.mark();
        }
    }
}

/// A typed, bounded filter setting.
///
/// `minimum` and `maximum` describe the range a user interface should offer.
/// They are never enforced: `set_value` stores whatever it is given.
#[derive(Debug, Clone)]
pub struct Parameter<T> {
    value: T,
    minimum: T,
    maximum: T,
    changed: bool,
    owner: ChangeNotifier,
}

impl<T: Clone + PartialEq + Default> Parameter<T> {
    /// A parameter reporting changes to the filter behind `owner`.
    pub fn new(owner: ChangeNotifier) -> Self {
        Self {
            value: T::default(),
            minimum: T::default(),
            maximum: T::default(),
            changed: false,
            owner,
        }
    }

    /// A parameter without an owning filter.
    pub fn detached() -> Self {
        Self::new(ChangeNotifier::default())
    }

    /// Construct with bounds and an initial value, the way filters set up
    /// their parameters. The initial value counts as a change.
    pub fn with_range(owner: ChangeNotifier, minimum: T, maximum: T, value: T) -> Self {
        let mut param = Self::new(owner);
        param.set_minimum(minimum);
        param.set_maximum(maximum);
        param.set_value(value);
        param
    }

    pub fn value(&self) -> T {
        self.value.clone()
    }

    pub fn set_value(&mut self, value: T) {
        if value != self.value {
            self.value = value;
            self.set_changed(true);
        }
    }

    pub fn minimum(&self) -> T {
        self.minimum.clone()
    }

    pub fn set_minimum(&mut self, minimum: T) {
        self.minimum = minimum;
    }

    pub fn maximum(&self) -> T {
        self.maximum.clone()
    }

    pub fn set_maximum(&mut self, maximum: T) {
        self.maximum = maximum;
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Set this parameter's own flag. Raising it also flags the owning filter;
    /// lowering it leaves the filter alone.
    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
        if changed {
            self.owner.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Settings {
        state: i32,
    }

    fn owner() -> (Arc<ChangeSignal>, ChangeNotifier) {
        let signal = Arc::new(ChangeSignal::default());
        let notifier = ChangeNotifier::new(&signal);
        (signal, notifier)
    }

    #[test]
    fn fresh_parameters_hold_defaults() {
        let (signal, notifier) = owner();
        let d = Parameter::<f64>::new(notifier.clone());
        assert_eq!((d.value(), d.minimum(), d.maximum()), (0.0, 0.0, 0.0));
        let i = Parameter::<i32>::new(notifier.clone());
        assert_eq!((i.value(), i.minimum(), i.maximum()), (0, 0, 0));
        let b = Parameter::<bool>::new(notifier.clone());
        assert_eq!((b.value(), b.minimum(), b.maximum()), (false, false, false));
        let s = Parameter::<Settings>::new(notifier);
        assert_eq!(s.value(), Settings::default());
        assert!(!s.changed());
        assert!(!signal.changed());
    }

    #[test]
    fn setting_a_new_value_notifies_owner() {
        let (signal, notifier) = owner();
        let mut param = Parameter::<Settings>::new(notifier);
        param.set_value(Settings { state: 10 });
        assert_eq!(param.value(), Settings { state: 10 });
        assert!(param.changed());
        assert!(signal.changed());
        assert_eq!(signal.epoch(), 1);
    }

    #[test]
    fn setting_the_same_value_is_silent() {
        let (signal, notifier) = owner();
        let mut param = Parameter::<i32>::new(notifier);
        param.set_value(0);
        assert!(!param.changed());
        assert!(!signal.changed());
        assert_eq!(signal.epoch(), 0);
    }

    #[test]
    fn each_change_notifies_once() {
        let (signal, notifier) = owner();
        let mut param = Parameter::<i32>::new(notifier);
        param.set_value(1);
        param.set_value(2);
        param.set_value(2);
        assert_eq!(signal.epoch(), 2);
    }

    #[test]
    fn bounds_are_not_enforced() {
        let (_signal, notifier) = owner();
        let mut param = Parameter::with_range(notifier, -100.0, 100.0, 0.0);
        param.set_value(250.0);
        assert_eq!(param.value(), 250.0);
        param.set_maximum(10.0);
        assert_eq!(param.value(), 250.0);
        assert_eq!(param.maximum(), 10.0);
        assert_eq!(param.minimum(), -100.0);
    }

    #[test]
    fn raising_own_flag_notifies_owner_once() {
        let (signal, notifier) = owner();
        let mut param = Parameter::<f64>::new(notifier);
        param.set_changed(true);
        assert!(param.changed());
        assert!(signal.changed());
        assert_eq!(signal.epoch(), 1);
        assert_eq!(param.value(), 0.0);
    }

    #[test]
    fn clearing_own_flag_leaves_owner_dirty() {
        let (signal, notifier) = owner();
        let mut param = Parameter::<bool>::new(notifier);
        param.set_value(true);
        param.set_changed(false);
        assert!(!param.changed());
        assert!(signal.changed());
    }

    #[test]
    fn detached_and_orphaned_parameters() {
        let mut detached = Parameter::<i32>::detached();
        detached.set_value(3);
        assert!(detached.changed());

        let (signal, notifier) = owner();
        let mut orphan = Parameter::<i32>::new(notifier);
        drop(signal);
        orphan.set_value(5);
        assert_eq!(orphan.value(), 5);
        assert!(orphan.changed());
    }
}
