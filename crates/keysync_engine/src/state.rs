//! Attachment state.

use crate::error::StoreError;

/// Coarse phase of an attachment's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The initial load has not settled yet.
    Loading,
    /// A value (possibly absent) is available.
    Ready,
    /// The last load, broadcast or mutation failed.
    Faulted,
}

/// What a consumer observes for one attached key.
///
/// `is_loading` is true only until the first load settles and never becomes
/// true again. `value` of `None` means the key is absent, which is distinct
/// from "not yet loaded".
#[derive(Debug, Clone)]
pub struct AttachmentState<T> {
    /// True until the initial load has settled.
    pub is_loading: bool,
    /// The most recent fault, cleared by the next successful update.
    pub error: Option<StoreError>,
    /// The current value.
    pub value: Option<T>,
}

impl<T> AttachmentState<T> {
    /// The state of a freshly attached key.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            error: None,
            value: None,
        }
    }

    /// Returns the current phase.
    ///
    /// Errors take precedence: a mutation that failed while the initial load
    /// was still in flight reports [`Phase::Faulted`].
    pub fn phase(&self) -> Phase {
        if self.error.is_some() {
            Phase::Faulted
        } else if self.is_loading {
            Phase::Loading
        } else {
            Phase::Ready
        }
    }

    /// Replaces the value and clears any error.
    pub(crate) fn set_ready(&mut self, value: Option<T>) {
        self.value = value;
        self.error = None;
    }

    /// Records a fault and clears the value.
    pub(crate) fn set_faulted(&mut self, error: StoreError) {
        self.value = None;
        self.error = Some(error);
    }
}

impl<T> Default for AttachmentState<T> {
    fn default() -> Self {
        Self::loading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn starts_loading() {
        let state: AttachmentState<u32> = AttachmentState::default();
        assert!(state.is_loading);
        assert_eq!(state.phase(), Phase::Loading);
        assert!(state.value.is_none());
    }

    #[test]
    fn ready_clears_error() {
        let mut state = AttachmentState::loading();
        state.is_loading = false;
        state.set_faulted(StoreError::new(ErrorKind::Read, "k", "offline"));
        assert_eq!(state.phase(), Phase::Faulted);

        state.set_ready(Some(3));
        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.value, Some(3));
    }

    #[test]
    fn faulted_clears_value() {
        let mut state = AttachmentState::loading();
        state.set_ready(Some("x"));
        state.set_faulted(StoreError::new(ErrorKind::Parse, "k", "bad json"));
        assert!(state.value.is_none());
        assert_eq!(state.error.as_ref().map(StoreError::kind), Some(ErrorKind::Parse));
    }
}
