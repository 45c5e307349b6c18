//! Exactly-once ownership of native engine handles

use crate::engine::{Engine, EngineResult, HandleKind, RawHandle};
use crate::error::{Error, Result, native};
use std::fmt;
use std::rc::Rc;
use whereat::at;

/// Owns one native handle and releases it exactly once.
///
/// Release happens on [`ScopedHandle::release`] or on drop, whichever
/// comes first. The handle keeps its engine alive, so a wrapper can
/// outlive the container that created it.
///
/// Outside this crate, handles enter a wrapper only through
/// [`ScopedHandle::acquire`]. An existing handle cannot be wrapped again:
///
/// ```compile_fail
/// use std::num::NonZeroU64;
/// use zenheif::ScopedHandle;
/// use zenheif::engine::{HandleKind, RawHandle};
///
/// let engine = zenheif::default_engine();
/// let raw = RawHandle::from_raw(NonZeroU64::MIN);
/// let _twice = ScopedHandle::adopt(&engine, HandleKind::Image, raw);
/// ```
pub struct ScopedHandle {
    engine: Rc<dyn Engine>,
    raw: Option<RawHandle>,
    kind: HandleKind,
}

impl ScopedHandle {
    /// Run a native constructor and take ownership of what it returns.
    ///
    /// A failing constructor produced nothing to release; its error is
    /// translated at this call site.
    #[track_caller]
    pub fn acquire(
        engine: &Rc<dyn Engine>,
        kind: HandleKind,
        ctor: impl FnOnce(&dyn Engine) -> EngineResult<RawHandle>,
    ) -> Result<Self> {
        let raw = ctor(engine.as_ref()).map_err(native)?;
        log::trace!("acquired {kind:?} handle {}", raw.get());
        Ok(Self {
            engine: Rc::clone(engine),
            raw: Some(raw),
            kind,
        })
    }

    /// Take ownership of a handle the engine already returned
    pub(crate) fn adopt(engine: &Rc<dyn Engine>, kind: HandleKind, raw: RawHandle) -> Self {
        log::trace!("acquired {kind:?} handle {}", raw.get());
        Self {
            engine: Rc::clone(engine),
            raw: Some(raw),
            kind,
        }
    }

    /// The native handle, or a usage error once released
    pub fn raw(&self) -> Result<RawHandle> {
        self.raw.ok_or_else(|| {
            at(Error::usage(format!(
                "{:?} handle used after release",
                self.kind
            )))
        })
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_none()
    }

    pub fn engine(&self) -> &Rc<dyn Engine> {
        &self.engine
    }

    /// Release the native handle now; later calls do nothing
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            log::trace!("releasing {:?} handle {}", self.kind, raw.get());
            self.engine.release(raw, self.kind);
        }
    }
}

impl Drop for ScopedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ScopedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .finish()
    }
}
