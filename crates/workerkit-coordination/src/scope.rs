//! Cleanup that runs on every exit path of an async body.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// Run `body`, then `cleanup`, even if `body` panics.
///
/// A panic from `body` is resumed once `cleanup` has finished. Returns the
/// outputs of both.
pub(crate) async fn run_then<B, C, CFut>(body: B, cleanup: C) -> (B::Output, CFut::Output)
where
    B: Future,
    C: FnOnce() -> CFut,
    CFut: Future,
{
    let result = AssertUnwindSafe(body).catch_unwind().await;
    let cleaned = cleanup().await;
    match result {
        Ok(output) => (output, cleaned),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cleanup_after_success() {
        let (value, cleaned) = run_then(async { 7 }, || async { "done" }).await;
        assert_eq!(value, 7);
        assert_eq!(cleaned, "done");
    }

    #[tokio::test]
    async fn test_cleanup_after_panic() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();

        let handle = tokio::spawn(async move {
            run_then(async { panic!("body failed") }, || async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert!(cleaned.load(Ordering::SeqCst));
    }
}
