use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CopyError, Result};

/// Cooperative cancellation flag shared between a running copy and its owner.
///
/// Cloning shares the flag. The copy checks it before every file and every
/// buffered chunk, so a cancelled copy stops with `CopyError::Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CopyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(observer.check().is_ok());

        token.cancel();
        assert!(observer.is_cancelled());
        assert!(observer.check().unwrap_err().is_cancelled());
    }
}
