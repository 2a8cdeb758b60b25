//! Run hooks.
//!
//! Handlers run synchronously in registration order. A failing handler stops
//! the remaining ones and fails the run.

use anyhow::Result;

type BeforeRun = Box<dyn Fn() -> Result<()> + Send + Sync>;
type AfterRun = Box<dyn Fn(&[String]) -> Result<()> + Send + Sync>;

/// Ordered before-run and after-run handlers.
#[derive(Default)]
pub struct RunHooks {
    before_run: Vec<BeforeRun>,
    after_run: Vec<AfterRun>,
}

impl RunHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler called before a run fetches anything.
    pub fn before_run<F>(mut self, handler: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.before_run.push(Box::new(handler));
        self
    }

    /// Register a handler called after a run committed, with every item id
    /// the run touched.
    pub fn after_run<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[String]) -> Result<()> + Send + Sync + 'static,
    {
        self.after_run.push(Box::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before_run.is_empty() && self.after_run.is_empty()
    }

    pub(crate) fn fire_before_run(&self) -> Result<()> {
        self.before_run.iter().try_for_each(|handler| handler())
    }

    pub(crate) fn fire_after_run(&self, touched_ids: &[String]) -> Result<()> {
        self.after_run
            .iter()
            .try_for_each(|handler| handler(touched_ids))
    }
}

impl std::fmt::Debug for RunHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHooks")
            .field("before_run", &self.before_run.len())
            .field("after_run", &self.after_run.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_handlers_run_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (calls.clone(), calls.clone(), calls.clone());

        let hooks = RunHooks::new()
            .before_run(move || {
                a.lock().unwrap().push("first".to_string());
                Ok(())
            })
            .before_run(move || {
                b.lock().unwrap().push("second".to_string());
                Ok(())
            })
            .after_run(move |ids| {
                c.lock().unwrap().push(ids.join(","));
                Ok(())
            });

        hooks.fire_before_run().unwrap();
        hooks
            .fire_after_run(&["A".to_string(), "B".to_string()])
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "A,B"]);
    }

    #[test]
    fn test_failing_handler_stops_the_rest() {
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();

        let hooks = RunHooks::new()
            .before_run(|| anyhow::bail!("cache unavailable"))
            .before_run(move || {
                *flag.lock().unwrap() = true;
                Ok(())
            });

        assert!(hooks.fire_before_run().is_err());
        assert!(!*called.lock().unwrap());
    }
}
