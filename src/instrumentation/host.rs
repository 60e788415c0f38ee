//! Starts and stops instrumentation as a unit.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::error::InstrumentationError;
use crate::instrumentation::Instrumentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    Idle,
    Running,
    Stopped,
}

pub struct InstrumentationHost {
    instrumentations: Vec<Arc<dyn Instrumentation>>,
    state: Mutex<HostState>,
}

impl InstrumentationHost {
    pub fn new(instrumentations: Vec<Arc<dyn Instrumentation>>) -> Self {
        Self {
            instrumentations,
            state: Mutex::new(HostState::Idle),
        }
    }

    /// Start every instrumentation in registration order. On the first
    /// failure the ones already started are stopped again and the error is
    /// returned.
    pub fn start(&self) -> Result<(), InstrumentationError> {
        let mut state = self.state.lock();
        if *state == HostState::Running {
            return Ok(());
        }

        for (i, instrumentation) in self.instrumentations.iter().enumerate() {
            if let Err(e) = instrumentation.start() {
                tracing::error!(
                    instrumentation = %instrumentation.name(),
                    error = %e,
                    "Instrumentation failed to start"
                );
                for started in self.instrumentations[..i].iter().rev() {
                    started.stop();
                }
                *state = HostState::Stopped;
                return Err(e);
            }
        }

        *state = HostState::Running;
        tracing::info!(count = self.instrumentations.len(), "Instrumentation host started");
        Ok(())
    }

    /// Stop every instrumentation. Idempotent; handlers are not invoked
    /// after this returns.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == HostState::Stopped {
            return;
        }

        for instrumentation in &self.instrumentations {
            instrumentation.stop();
        }
        *state = HostState::Stopped;
        tracing::info!("Instrumentation host stopped");
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == HostState::Running
    }

    pub fn len(&self) -> usize {
        self.instrumentations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrumentations.is_empty()
    }
}

impl fmt::Debug for InstrumentationHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.instrumentations.iter().map(|i| i.name()).collect();
        f.debug_struct("InstrumentationHost")
            .field("instrumentations", &names)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Component {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Component {
        fn new(name: &'static str, fail: bool, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Instrumentation> {
            Arc::new(Self {
                name,
                fail,
                log: log.clone(),
            })
        }
    }

    impl Instrumentation for Component {
        fn name(&self) -> &str {
            self.name
        }

        fn start(&self) -> Result<(), InstrumentationError> {
            self.log.lock().push(format!("start {}", self.name));
            if self.fail {
                return Err(InstrumentationError::Start {
                    name: self.name.to_string(),
                    reason: "refused".to_string(),
                });
            }
            Ok(())
        }

        fn stop(&self) {
            self.log.lock().push(format!("stop {}", self.name));
        }
    }

    #[test]
    fn test_start_and_stop_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let host = InstrumentationHost::new(vec![Component::new("a", false, &log), Component::new("b", false, &log)]);

        host.start().unwrap();
        host.start().unwrap();
        assert!(host.is_running());
        host.stop();
        host.stop();
        assert!(!host.is_running());

        assert_eq!(*log.lock(), vec!["start a", "start b", "stop a", "stop b"]);
    }

    #[test]
    fn test_failed_start_rolls_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let host = InstrumentationHost::new(vec![
            Component::new("a", false, &log),
            Component::new("b", true, &log),
            Component::new("c", false, &log),
        ]);

        let err = host.start().unwrap_err();
        assert!(matches!(err, InstrumentationError::Start { ref name, .. } if name == "b"));
        assert_eq!(*log.lock(), vec!["start a", "start b", "stop a"]);
        assert!(!host.is_running());
    }

    #[test]
    fn test_empty_host() {
        let host = InstrumentationHost::new(Vec::new());
        assert!(host.is_empty());
        host.start().unwrap();
        host.stop();
    }
}
