//! Scheduling priorities for remote work.

use serde::{Deserialize, Serialize};
use std::future::Future;

tokio::task_local! {
    static CONTEXT_PRIORITY: Priority;
}

/// Scheduling hint for work queued on a worker.
///
/// Larger values run first. Work with equal priority runs in submission
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub i64);

impl Priority {
    /// Lowest representable priority
    pub const LOWEST: Priority = Priority(i64::MIN);

    /// Priority of ordinary work
    pub const NORMAL: Priority = Priority(0);

    /// Default priority for singleton creation: ahead of ordinary work
    pub const SINGLETON: Priority = Priority(1_000_000);

    /// Run `fut` with `self` installed as the contextual default priority.
    ///
    /// # Examples
    ///
    /// ```
    /// use singleton_fabric::Priority;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let seen = Priority(-1).scope(async { Priority::current() }).await;
    /// assert_eq!(seen, Some(Priority(-1)));
    /// assert_eq!(Priority::current(), None);
    /// # }
    /// ```
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CONTEXT_PRIORITY.scope(self, fut).await
    }

    /// The contextual default priority, if one is installed for this task.
    pub fn current() -> Option<Priority> {
        CONTEXT_PRIORITY.try_with(|p| *p).ok()
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Priority::SINGLETON > Priority::NORMAL);
        assert!(Priority::NORMAL > Priority(-1));
        assert!(Priority(-1) > Priority::LOWEST);
        assert_eq!(Priority::default(), Priority::NORMAL);
    }

    #[tokio::test]
    async fn test_scope_nesting() {
        let (outer, inner) = Priority(5)
            .scope(async {
                let inner = Priority(7).scope(async { Priority::current() }).await;
                (Priority::current(), inner)
            })
            .await;

        assert_eq!(outer, Some(Priority(5)));
        assert_eq!(inner, Some(Priority(7)));
    }
}
