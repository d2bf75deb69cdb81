use time::OffsetDateTime;
use uuid::Uuid;

/// Time and identity source consumed by feed operations.
pub trait Environment {
    /// Epoch milliseconds.
    fn now_millis(&self) -> i64;
    fn fresh_id(&self) -> String;
}

impl<T: Environment + ?Sized> Environment for &T {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    fn fresh_id(&self) -> String {
        (**self).fresh_id()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn now_millis(&self) -> i64 {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }

    fn fresh_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::Environment;

    /// Manually driven clock with sequential ids (`item-1`, `item-2`, ...).
    #[derive(Debug)]
    pub struct TestEnvironment {
        now: Cell<i64>,
        next_id: Cell<u64>,
        scripted_ids: RefCell<VecDeque<String>>,
    }

    impl TestEnvironment {
        pub fn at(now: i64) -> Self {
            Self {
                now: Cell::new(now),
                next_id: Cell::new(1),
                scripted_ids: RefCell::new(VecDeque::new()),
            }
        }

        pub fn advance(&self, millis: i64) {
            self.now.set(self.now.get() + millis);
        }

        /// Ids handed out before falling back to the counter.
        pub fn script_ids<I, S>(&self, ids: I)
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.scripted_ids
                .borrow_mut()
                .extend(ids.into_iter().map(Into::into));
        }
    }

    impl Environment for TestEnvironment {
        fn now_millis(&self) -> i64 {
            self.now.get()
        }

        fn fresh_id(&self) -> String {
            if let Some(id) = self.scripted_ids.borrow_mut().pop_front() {
                return id;
            }
            let n = self.next_id.get();
            self.next_id.set(n + 1);
            format!("item-{n}")
        }
    }
}
