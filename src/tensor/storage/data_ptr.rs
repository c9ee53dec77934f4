use std::ffi::c_void;
use std::ptr::NonNull;

use crate::tensor::Device;

/// Release action for a context object handed over by the owner of a buffer.
pub type ContextDeleter = unsafe fn(*mut c_void);

/// Opaque owner object whose lifetime keeps a buffer alive.
///
/// Dropping the context runs its deleter exactly once.
pub struct Context {
    ptr: NonNull<c_void>,
    deleter: ContextDeleter,
}

// SAFETY: `from_box` requires `T: Send`; `new` makes the caller promise the
// context may be released from any thread.
unsafe impl Send for Context {}

impl Context {
    /// Take ownership of a raw context together with its release action.
    ///
    /// # Safety
    ///
    /// - `deleter(ptr)` must be sound to call exactly once, from any thread.
    /// - nothing else may release `ptr`.
    pub unsafe fn new(ptr: NonNull<c_void>, deleter: ContextDeleter) -> Self {
        Self { ptr, deleter }
    }

    /// Move a Rust value in as the context; it is dropped on release.
    pub fn from_box<T: Send + 'static>(value: Box<T>) -> Self {
        unsafe fn drop_box<T>(ptr: *mut c_void) {
            // SAFETY: `ptr` came from `Box::into_raw` in `from_box::<T>`.
            drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
        }

        let ptr = NonNull::from(Box::leak(value)).cast::<c_void>();
        Self {
            ptr,
            deleter: drop_box::<T>,
        }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // SAFETY: the constructor contract makes the deleter valid for this
        // pointer and `drop` runs once.
        unsafe { (self.deleter)(self.ptr.as_ptr()) }
    }
}

/// How the memory behind a [`DataPtr`] is given back.
pub enum Release {
    /// Memory is owned elsewhere and outlives every view.
    None,
    /// Callback receiving the raw address.
    ByCallback(Box<dyn FnOnce(*mut u8) + Send>),
    /// Owner object released by its own deleter.
    ByContext(Context),
}

impl std::fmt::Debug for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Release::None => write!(f, "None"),
            Release::ByCallback(_) => write!(f, "ByCallback"),
            Release::ByContext(ctx) => write!(f, "ByContext({:p})", ctx.as_ptr()),
        }
    }
}

/// Raw address paired with the action that frees it.
#[derive(Debug)]
pub struct DataPtr {
    ptr: *mut u8,
    release: Release,
    device: Device,
}

// SAFETY: the address is only dereferenced through `Storage`, whose users
// serialise writes themselves. `release` is consumed in `drop`, which has
// exclusive access.
unsafe impl Send for DataPtr {}
unsafe impl Sync for DataPtr {}

impl DataPtr {
    pub fn new(ptr: *mut u8, release: Release, device: Device) -> Self {
        Self {
            ptr,
            release,
            device,
        }
    }

    /// Wrap a callback so that it is bound to this address and needs no arguments at release.
    pub fn from_deleter(
        ptr: *mut u8,
        deleter: impl FnOnce(*mut u8) + Send + 'static,
        device: Device,
    ) -> Self {
        Self::new(ptr, Release::ByCallback(Box::new(deleter)), device)
    }

    pub fn from_context(ptr: *mut u8, context: Context, device: Device) -> Self {
        Self::new(ptr, Release::ByContext(context), device)
    }

    /// Non-owning pointer; nothing runs on drop.
    pub fn borrowed(ptr: *mut u8, device: Device) -> Self {
        Self::new(ptr, Release::None, device)
    }

    pub fn get(&self) -> *mut u8 {
        self.ptr
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// The owner object, if this pointer was built from one
    pub fn context(&self) -> Option<*mut c_void> {
        match &self.release {
            Release::ByContext(ctx) => Some(ctx.as_ptr()),
            _ => None,
        }
    }

    pub fn release(&self) -> &Release {
        &self.release
    }
}

impl Drop for DataPtr {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.release, Release::None) {
            Release::None => {}
            Release::ByCallback(deleter) => deleter(self.ptr),
            Release::ByContext(ctx) => drop(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flag(Arc<AtomicUsize>);

    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deleter_gets_address_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut buf = [0u8; 8];
        let addr = buf.as_mut_ptr();

        let seen_cb = Arc::clone(&seen);
        let ptr = DataPtr::from_deleter(
            addr,
            move |p| seen_cb.store(p as usize, Ordering::SeqCst),
            Device::cpu(),
        );
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        drop(ptr);
        assert_eq!(seen.load(Ordering::SeqCst), addr as usize);
    }

    #[test]
    fn test_context_released_on_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = Context::from_box(Box::new(Flag(Arc::clone(&drops))));
        let ptr = DataPtr::from_context(std::ptr::null_mut(), ctx, Device::cpu());

        assert!(ptr.context().is_some());
        drop(ptr);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_borrowed_has_no_context() {
        let ptr = DataPtr::borrowed(std::ptr::null_mut(), Device::cpu());
        assert!(ptr.context().is_none());
        assert!(matches!(ptr.release(), Release::None));
    }
}
