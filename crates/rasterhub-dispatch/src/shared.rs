// this_file: crates/rasterhub-dispatch/src/shared.rs

//! Process-wide streaming session used by the `session` engine.
//!
//! The slot is created lazily, torn down when the instance pool is cleared,
//! and may be re-created afterwards.

use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};
use rasterhub_core::Result;
use rasterhub_render::StreamingSession;

use crate::config;

static SHARED: Mutex<Option<Arc<StreamingSession>>> = const_mutex(None);

fn open(cache_size: usize) -> Result<Arc<StreamingSession>> {
    let session = StreamingSession::open(cache_size)?;
    if let Err(e) = session.warm_up() {
        log::debug!("Shared session warm-up failed: {}", e);
    }
    Ok(Arc::new(session))
}

/// Replace the shared session with a fresh one of `cache_size`.
///
/// A previous session is closed first.
pub fn init(cache_size: usize) -> Result<Arc<StreamingSession>> {
    let session = open(cache_size)?;
    let previous = SHARED.lock().replace(Arc::clone(&session));
    if let Some(previous) = previous {
        previous.close();
    }
    log::debug!("Shared session initialised with cache size {}", cache_size);
    Ok(session)
}

/// The shared session, opened with the configured cache size when absent.
pub fn get_or_init() -> Result<Arc<StreamingSession>> {
    let mut slot = SHARED.lock();
    if let Some(session) = slot.as_ref().filter(|s| !s.is_closed()) {
        return Ok(Arc::clone(session));
    }
    let session = open(config::global().cache_size)?;
    *slot = Some(Arc::clone(&session));
    Ok(session)
}

/// The shared session if one is open.
pub fn get() -> Option<Arc<StreamingSession>> {
    SHARED.lock().as_ref().filter(|s| !s.is_closed()).cloned()
}

/// Close and drop the shared session. Safe to call at any time.
pub fn teardown() {
    let previous = SHARED.lock().take();
    if let Some(session) = previous {
        session.close();
        log::debug!("Shared session torn down");
    }
}
