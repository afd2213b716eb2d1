use crate::common::Named;
use std::fmt::{Debug, Formatter};
use std::panic::AssertUnwindSafe;

/// A business task executed by the worker pool.
#[allow(clippy::type_complexity)]
pub struct BusinessTask {
    name: String,
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl Debug for BusinessTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Named for BusinessTask {
    fn get_name(&self) -> &str {
        &self.name
    }
}

impl BusinessTask {
    /// Create a new `BusinessTask` instance.
    pub fn new(name: String, func: impl FnOnce() + Send + 'static) -> Self {
        BusinessTask {
            name,
            func: Box::new(func),
        }
    }

    /// exec the task, a panic is caught and returned as the error message.
    pub fn run(self) -> (String, Result<(), String>) {
        let BusinessTask { name, func } = self;
        let result = std::panic::catch_unwind(AssertUnwindSafe(func)).map_err(|e| {
            let message = e
                .downcast_ref::<&str>()
                .map(|message| (*message).to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| String::from("task failed without message"));
            crate::error!("task:{name} finish with error:{message}");
            message
        });
        (name, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test() {
        let task = BusinessTask::new(String::from("test"), || println!("hello"));
        assert_eq!("test", task.get_name());
        assert_eq!((String::from("test"), Ok(())), task.run());
    }

    #[test]
    fn test_panic() {
        let task = BusinessTask::new(String::from("test"), || panic!("no"));
        assert_eq!((String::from("test"), Err(String::from("no"))), task.run());
    }

    #[test]
    fn test_panic_formatted() {
        let code = 7;
        let task = BusinessTask::new(String::from("test"), move || panic!("code {code}"));
        assert_eq!(
            (String::from("test"), Err(String::from("code 7"))),
            task.run()
        );
    }
}
