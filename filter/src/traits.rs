use std::sync::Arc;

use pedtrack_common::Frame;

use crate::error::FilterError;
use crate::parameter::{ChangeNotifier, ChangeSignal};

/// State every filter carries: the enable / on-copy switches, the change
/// signal its parameters report to, and the last produced image.
#[derive(Debug)]
pub struct FilterCore {
    enabled: bool,
    on_copy: bool,
    signal: Arc<ChangeSignal>,
    last_result: Option<Frame>,
}

impl Default for FilterCore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCore {
    pub fn new() -> Self {
        Self {
            enabled: true,
            on_copy: true,
            signal: Arc::new(ChangeSignal::default()),
            last_result: None,
        }
    }

    /// Handle for parameters owned by this filter.
    pub fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier::new(&self.signal)
    }

    pub fn changed(&self) -> bool {
        self.signal.changed()
    }

    pub fn set_changed(&self, changed: bool) {
        self.signal.set_changed(changed);
    }

    /// Counter bumped on every change notification.
    pub fn epoch(&self) -> u64 {
        self.signal.epoch()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.signal.mark();
    }

    pub fn on_copy(&self) -> bool {
        self.on_copy
    }

    pub fn set_on_copy(&mut self, on_copy: bool) {
        self.on_copy = on_copy;
        self.signal.mark();
    }

    pub fn last_result(&self) -> Option<&Frame> {
        self.last_result.as_ref()
    }

    fn store_result(&mut self, frame: Frame) -> &Frame {
        self.last_result.insert(frame)
    }
}

/// A stateful image transform.
///
/// Implementors provide `act`; `apply` decides whether to call it on a fresh
/// buffer, on the input itself, or not at all, and caches the outcome.
pub trait Filter: Send {
    fn core(&self) -> &FilterCore;

    fn core_mut(&mut self) -> &mut FilterCore;

    /// Transform `img` into `res`. `res` arrives zeroed with the shape of
    /// `img`; filters that change the shape replace it.
    fn act(&mut self, img: &Frame, res: &mut Frame) -> Result<(), FilterError>;

    /// Transform `img` in place. Filters that can work without a scratch
    /// buffer override this.
    fn act_in_place(&mut self, img: &mut Frame) -> Result<(), FilterError> {
        let src = img.clone();
        self.act(&src, img)
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }

    /// Run the filter and cache the result.
    ///
    /// A disabled filter passes `img` through untouched. In every successful
    /// branch the changed flag is cleared.
    fn apply(&mut self, img: Frame) -> Result<&Frame, FilterError> {
        let result = if !self.core().enabled() {
            img
        } else if self.core().on_copy() {
            let mut res = Frame::blank_like(&img);
            self.act(&img, &mut res)?;
            res
        } else {
            let mut img = img;
            self.act_in_place(&mut img)?;
            img
        };
        let core = self.core_mut();
        core.set_changed(false);
        Ok(core.store_result(result))
    }

    /// The most recent output of `apply`, valid until the next call.
    fn last_result(&self) -> Option<&Frame> {
        self.core().last_result()
    }

    fn changed(&self) -> bool {
        self.core().changed()
    }

    fn set_changed(&mut self, changed: bool) {
        self.core().set_changed(changed);
    }

    /// Counter that moves on every change, for invalidating derived state.
    fn change_epoch(&self) -> u64 {
        self.core().epoch()
    }

    fn enabled(&self) -> bool {
        self.core().enabled()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.core_mut().set_enabled(enabled);
    }

    fn enable(&mut self) {
        self.set_enabled(true);
    }

    fn disable(&mut self) {
        self.set_enabled(false);
    }

    fn on_copy(&self) -> bool {
        self.core().on_copy()
    }

    fn set_on_copy(&mut self, on_copy: bool) {
        self.core_mut().set_on_copy(on_copy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;

    /// Adds the parameter value to every sample and records how it was called.
    struct OffsetFilter {
        core: FilterCore,
        offset: Parameter<i32>,
        copies: u32,
        in_place: u32,
    }

    impl OffsetFilter {
        fn new() -> Self {
            let core = FilterCore::new();
            let offset = Parameter::new(core.notifier());
            Self {
                core,
                offset,
                copies: 0,
                in_place: 0,
            }
        }
    }

    impl Filter for OffsetFilter {
        fn core(&self) -> &FilterCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut FilterCore {
            &mut self.core
        }
        fn act(&mut self, img: &Frame, res: &mut Frame) -> Result<(), FilterError> {
            self.copies += 1;
            let offset = self.offset.value();
            for (dst, src) in res.data_mut().iter_mut().zip(img.data()) {
                *dst = (*src as i32 + offset).clamp(0, 255) as u8;
            }
            Ok(())
        }
        fn act_in_place(&mut self, img: &mut Frame) -> Result<(), FilterError> {
            self.in_place += 1;
            let offset = self.offset.value();
            for v in img.data_mut() {
                *v = (*v as i32 + offset).clamp(0, 255) as u8;
            }
            Ok(())
        }
    }

    fn gray(value: u8) -> Frame {
        Frame::filled(2, 2, 1, value).unwrap()
    }

    #[test]
    fn defaults() {
        let filter = OffsetFilter::new();
        assert!(filter.enabled());
        assert!(filter.on_copy());
        assert!(!filter.changed());
        assert!(filter.last_result().is_none());
    }

    #[test]
    fn parameter_change_marks_filter() {
        let mut filter = OffsetFilter::new();
        filter.offset.set_value(20);
        assert!(filter.changed());
        let out = filter.apply(gray(10)).unwrap();
        assert!(out.data().iter().all(|&v| v == 30));
        assert!(!filter.changed());
    }

    #[test]
    fn on_copy_uses_act() {
        let mut filter = OffsetFilter::new();
        filter.offset.set_value(1);
        filter.apply(gray(1)).unwrap();
        assert_eq!((filter.copies, filter.in_place), (1, 0));

        filter.set_on_copy(false);
        filter.apply(gray(1)).unwrap();
        assert_eq!((filter.copies, filter.in_place), (1, 1));
    }

    #[test]
    fn disabled_filter_passes_through_and_clears_flag() {
        let mut filter = OffsetFilter::new();
        filter.offset.set_value(50);
        filter.disable();
        assert!(filter.changed());
        let out = filter.apply(gray(7)).unwrap().clone();
        assert_eq!(out, gray(7));
        assert!(!filter.changed());
        assert_eq!(filter.last_result(), Some(&gray(7)));
        assert_eq!(filter.copies + filter.in_place, 0);
    }

    #[test]
    fn switches_always_mark_changed() {
        let mut filter = OffsetFilter::new();
        filter.enable();
        assert!(filter.changed());
        filter.apply(gray(0)).unwrap();
        filter.set_on_copy(true);
        assert!(filter.changed());
        filter.apply(gray(0)).unwrap();
        filter.set_enabled(true);
        assert!(filter.changed());
    }

    #[test]
    fn epoch_moves_on_every_change() {
        let mut filter = OffsetFilter::new();
        let start = filter.change_epoch();
        filter.offset.set_value(1);
        filter.offset.set_value(2);
        assert_eq!(filter.change_epoch(), start + 2);
        filter.apply(gray(0)).unwrap();
        filter.set_changed(false);
        assert_eq!(filter.change_epoch(), start + 2);
    }

    #[test]
    fn explicit_flag_is_kept_without_parameters() {
        let mut filter = OffsetFilter::new();
        filter.set_changed(true);
        assert!(filter.changed());
        filter.set_changed(false);
        assert!(!filter.changed());
    }

    #[test]
    fn last_result_tracks_latest_apply() {
        let mut filter = OffsetFilter::new();
        filter.apply(gray(3)).unwrap();
        filter.apply(gray(4)).unwrap();
        assert_eq!(filter.last_result(), Some(&gray(4)));
    }
}
