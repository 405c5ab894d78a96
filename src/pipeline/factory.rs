//! Stage factory for creating stage instances from registry names.

use super::registry::{Inlet, Outlet, StagePorts, StageRegistry};
use super::tracker::CompletionHandle;
use crate::element::Stage;
use crate::error::{Error, Result};

/// Instantiates registered stages and binds them to their ports.
///
/// Every stage, whatever its element types, is built from the same
/// `(input, output, completion)` triple.
#[derive(Debug, Clone, Copy)]
pub struct StageFactory<'r> {
    registry: &'r StageRegistry,
}

impl<'r> StageFactory<'r> {
    /// Create a factory over `registry`.
    pub fn new(registry: &'r StageRegistry) -> Self {
        Self { registry }
    }

    /// Build one instance of the stage registered as `name`.
    ///
    /// `instance` is the task name, which differs from `name` for replicas.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownStage`] if `name` is not registered
    /// - [`Error::SourceUnavailable`] if a source cannot open its input
    /// - [`Error::InstantiationFailure`] for any other constructor failure
    pub fn build(
        &self,
        name: &str,
        instance: impl Into<String>,
        input: Inlet,
        output: Outlet,
        completion: CompletionHandle,
    ) -> Result<Box<dyn Stage>> {
        let constructor = self
            .registry
            .constructor(name)
            .ok_or_else(|| Error::UnknownStage {
                name: name.to_string(),
            })?;

        let instance = instance.into();
        tracing::trace!("instantiating '{}' as '{}'", name, instance);
        let ports = StagePorts {
            name: instance.clone(),
            input,
            output,
            completion,
        };
        constructor(ports).map_err(|e| match e {
            e @ (Error::SourceUnavailable { .. } | Error::InstantiationFailure { .. }) => e,
            other => Error::InstantiationFailure {
                name: instance,
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CancelToken;
    use crate::element::{Output, StageKind, Transform};
    use crate::pipeline::{CompletionTracker, SourceInput};

    struct Echo;

    impl Transform for Echo {
        type Input = String;
        type Output = String;

        fn transform(&mut self, item: String) -> Result<Output<String>> {
            Ok(Output::single(item))
        }
    }

    fn ports(cancel: &CancelToken) -> (Inlet, Outlet) {
        let (tx_in, rx_in) = crate::element::DataType::of::<String>().link(1, cancel);
        let (tx_out, _rx_out) = crate::element::DataType::of::<String>().link(1, cancel);
        drop(tx_in);
        (Inlet::Link(rx_in), Outlet::Link(tx_out))
    }

    #[test]
    fn test_unknown_stage() {
        let registry = StageRegistry::new();
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (input, output) = ports(&cancel);
        let err = StageFactory::new(&registry)
            .build(
                "nope",
                "nope",
                input,
                output,
                tracker.handle("nope", StageKind::Transform).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownStage { ref name } if name == "nope"));
    }

    #[test]
    fn test_constructor_failure_wrapped() {
        let mut registry = StageRegistry::new();
        registry
            .register_transform("failing", || -> Result<Echo> {
                Err(Error::processing("missing dictionary"))
            })
            .unwrap();
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (input, output) = ports(&cancel);
        let err = StageFactory::new(&registry)
            .build(
                "failing",
                "failing[2]",
                input,
                output,
                tracker.handle("failing[2]", StageKind::Transform).unwrap(),
            )
            .unwrap_err();
        match err {
            Error::InstantiationFailure { name, reason } => {
                assert_eq!(name, "failing[2]");
                assert!(reason.contains("missing dictionary"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builds_transform() {
        let mut registry = StageRegistry::new();
        registry.register_transform("pass", || Ok(Echo)).unwrap();
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (input, output) = ports(&cancel);
        let stage = StageFactory::new(&registry)
            .build(
                "pass",
                "pass",
                input,
                output,
                tracker.handle("pass", StageKind::Transform).unwrap(),
            )
            .unwrap();
        assert_eq!(stage.name(), "pass");
        assert_eq!(stage.kind(), StageKind::Transform);
    }

    #[test]
    fn test_wrong_inlet_is_instantiation_failure() {
        let mut registry = StageRegistry::new();
        registry.register_transform("pass", || Ok(Echo)).unwrap();
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (_, output) = ports(&cancel);
        let err = StageFactory::new(&registry)
            .build(
                "pass",
                "pass",
                Inlet::External(SourceInput::text("x")),
                output,
                tracker.handle("pass", StageKind::Transform).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InstantiationFailure { .. }));
    }
}
