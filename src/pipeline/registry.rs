//! Registry of named stage constructors.
//!
//! Pipeline assemblies refer to stages by name. The registry maps each name
//! to a [`StageDescriptor`] (role, element types, parallelism) and a
//! constructor that binds a fresh stage instance to its ports.

use super::collector::{Collector, ResultTarget};
use super::tracker::CompletionHandle;
use crate::element::{
    DataType, Sink, SinkStage, Source, SourceStage, Stage, Transform, TransformStage, TypeTag,
};
use crate::error::{Error, Result};
use crate::link::{AnyReceiver, AnySender};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

/// Role of a registered stage within an assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    /// First stage; reads the external input.
    Source,
    /// Middle stage.
    Transform,
    /// Last stage; writes the result container.
    Sink,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Transform => f.write_str("transform"),
            Self::Sink => f.write_str("sink"),
        }
    }
}

/// What the registry knows about a stage without constructing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    /// Unique registry key.
    pub name: String,
    /// Position the stage may take in an assembly.
    pub role: StageRole,
    /// Element type read (`None` for sources).
    pub input: Option<DataType>,
    /// Element type written (`None` for sinks).
    pub output: Option<DataType>,
    /// Result container type (sinks only).
    pub container: Option<TypeTag>,
    /// Whether parallel mode may replicate the stage.
    pub parallelizable: bool,
    /// Degree of parallelism pinned by the stage, overriding the
    /// configured default.
    pub degree: Option<NonZeroUsize>,
}

impl StageDescriptor {
    /// Describe a source producing `O`.
    pub fn source<O: Send + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: StageRole::Source,
            input: None,
            output: Some(DataType::of::<O>()),
            container: None,
            parallelizable: false,
            degree: None,
        }
    }

    /// Describe a transform from `I` to `O`.
    pub fn transform<I: Send + 'static, O: Send + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: StageRole::Transform,
            input: Some(DataType::of::<I>()),
            output: Some(DataType::of::<O>()),
            container: None,
            parallelizable: false,
            degree: None,
        }
    }

    /// Describe a sink consuming `I` into a container `C`.
    pub fn sink<I: Send + 'static, C: 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: StageRole::Sink,
            input: Some(DataType::of::<I>()),
            output: None,
            container: Some(TypeTag::of::<C>()),
            parallelizable: false,
            degree: None,
        }
    }

    /// Mark the stage as parallelizable, optionally pinning its degree.
    pub fn parallelizable(mut self, degree: Option<NonZeroUsize>) -> Self {
        self.parallelizable = true;
        self.degree = degree;
        self
    }
}

/// External input handed to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    /// Read from a file.
    File(PathBuf),
    /// Read from an in-memory string.
    Text(String),
}

impl SourceInput {
    /// Input read from a file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Input read from `text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Where a stage instance reads from.
#[derive(Debug)]
pub enum Inlet {
    /// The pipeline's external input (sources).
    External(SourceInput),
    /// An upstream channel.
    Link(AnyReceiver),
}

/// Where a stage instance writes to.
#[derive(Debug)]
pub enum Outlet {
    /// A downstream channel.
    Link(AnySender),
    /// The caller's result container (sinks).
    Container(ResultTarget),
}

/// Everything a constructor binds a new stage instance to.
#[derive(Debug)]
pub struct StagePorts {
    /// Instance name (`name`, or `name[j]` for replicas).
    pub name: String,
    /// Input side.
    pub input: Inlet,
    /// Output side.
    pub output: Outlet,
    /// The task's completion handle.
    pub completion: CompletionHandle,
}

impl StagePorts {
    /// Take the external input, failing if the inlet is a channel.
    pub fn external_input(input: Inlet, name: &str) -> Result<SourceInput> {
        match input {
            Inlet::External(input) => Ok(input),
            Inlet::Link(_) => Err(Error::InvalidAssembly(format!(
                "source '{name}' must be wired to the external input"
            ))),
        }
    }

    /// Take the upstream channel, failing if the inlet is external.
    pub fn link_input(input: Inlet, name: &str) -> Result<AnyReceiver> {
        match input {
            Inlet::Link(rx) => Ok(rx),
            Inlet::External(_) => Err(Error::InvalidAssembly(format!(
                "stage '{name}' cannot read the external input"
            ))),
        }
    }

    /// Take the downstream channel, failing if the outlet is a container.
    pub fn link_output(output: Outlet, name: &str) -> Result<AnySender> {
        match output {
            Outlet::Link(tx) => Ok(tx),
            Outlet::Container(_) => Err(Error::InvalidAssembly(format!(
                "stage '{name}' cannot write the result container"
            ))),
        }
    }

    /// Take the result container, failing if the outlet is a channel.
    pub fn container_output(output: Outlet, name: &str) -> Result<ResultTarget> {
        match output {
            Outlet::Container(target) => Ok(target),
            Outlet::Link(_) => Err(Error::InvalidAssembly(format!(
                "sink '{name}' must be wired to the result container"
            ))),
        }
    }
}

/// Builds a stage instance bound to its ports.
pub type StageConstructor = Arc<dyn Fn(StagePorts) -> Result<Box<dyn Stage>> + Send + Sync>;

struct RegistryEntry {
    descriptor: StageDescriptor,
    constructor: StageConstructor,
}

/// Registry of stage constructors, keyed by name.
///
/// Populate it once at startup; the composer only reads it.
///
/// # Example
///
/// ```rust
/// use filterflow::element::{Output, Transform};
/// use filterflow::pipeline::StageRegistry;
/// use filterflow::Result;
///
/// struct Upper;
///
/// impl Transform for Upper {
///     type Input = String;
///     type Output = String;
///
///     fn transform(&mut self, item: String) -> Result<Output<String>> {
///         Ok(Output::single(item.to_uppercase()))
///     }
/// }
///
/// let mut registry = StageRegistry::new();
/// registry.register_transform("upper", || Ok(Upper)).unwrap();
/// assert!(registry.contains("upper"));
/// assert!(registry.register_transform("upper", || Ok(Upper)).is_err());
/// ```
#[derive(Default)]
pub struct StageRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl StageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in text stage with default
    /// options.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        crate::elements::text::register_builtins(
            &mut registry,
            &crate::elements::text::TextOptions::default(),
        )?;
        Ok(registry)
    }

    /// Register a stage under `descriptor.name`.
    ///
    /// Fails with [`Error::DuplicateStage`] if the name is taken.
    pub fn register(
        &mut self,
        descriptor: StageDescriptor,
        constructor: StageConstructor,
    ) -> Result<()> {
        if self.entries.contains_key(&descriptor.name) {
            return Err(Error::DuplicateStage {
                name: descriptor.name,
            });
        }
        tracing::trace!("registered {} stage '{}'", descriptor.role, descriptor.name);
        self.entries.insert(
            descriptor.name.clone(),
            RegistryEntry {
                descriptor,
                constructor,
            },
        );
        Ok(())
    }

    /// Register a source. `create` opens the external input.
    pub fn register_source<S, F>(&mut self, name: &str, create: F) -> Result<()>
    where
        S: Source,
        F: Fn(&SourceInput) -> Result<S> + Send + Sync + 'static,
    {
        let descriptor = StageDescriptor::source::<S::Output>(name);
        self.register(
            descriptor,
            Arc::new(move |ports: StagePorts| {
                let input = StagePorts::external_input(ports.input, &ports.name)?;
                let output = StagePorts::link_output(ports.output, &ports.name)?
                    .downcast::<S::Output>()?;
                let source = create(&input)?;
                Ok(Box::new(SourceStage::new(
                    ports.name,
                    source,
                    output,
                    ports.completion,
                )) as Box<dyn Stage>)
            }),
        )
    }

    /// Register a transform that always runs as a single instance.
    pub fn register_transform<T, F>(&mut self, name: &str, create: F) -> Result<()>
    where
        T: Transform,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let descriptor = StageDescriptor::transform::<T::Input, T::Output>(name);
        self.register(descriptor, transform_constructor(create))
    }

    /// Register a transform that parallel mode may replicate.
    ///
    /// `create` is called once per replica. `degree` pins the number of
    /// replicas; `None` uses the pipeline's configured parallelism.
    pub fn register_parallel_transform<T, F>(
        &mut self,
        name: &str,
        degree: Option<NonZeroUsize>,
        create: F,
    ) -> Result<()>
    where
        T: Transform,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let descriptor =
            StageDescriptor::transform::<T::Input, T::Output>(name).parallelizable(degree);
        self.register(descriptor, transform_constructor(create))
    }

    /// Register a sink writing into a container of type `C`.
    pub fn register_sink<K, C, F>(&mut self, name: &str, create: F) -> Result<()>
    where
        K: Sink,
        C: Send + 'static,
        F: Fn(Collector<C>) -> Result<K> + Send + Sync + 'static,
    {
        let descriptor = StageDescriptor::sink::<K::Input, C>(name);
        self.register(
            descriptor,
            Arc::new(move |ports: StagePorts| {
                let input = StagePorts::link_input(ports.input, &ports.name)?
                    .downcast::<K::Input>()?;
                let collector = StagePorts::container_output(ports.output, &ports.name)?
                    .downcast::<C>()?;
                let sink = create(collector)?;
                Ok(Box::new(SinkStage::new(ports.name, sink, input, ports.completion))
                    as Box<dyn Stage>)
            }),
        )
    }

    /// Look up a stage's descriptor.
    pub fn descriptor(&self, name: &str) -> Option<&StageDescriptor> {
        self.entries.get(name).map(|entry| &entry.descriptor)
    }

    /// Check if a stage name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn constructor(&self, name: &str) -> Option<&StageConstructor> {
        self.entries.get(name).map(|entry| &entry.constructor)
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}

fn transform_constructor<T, F>(create: F) -> StageConstructor
where
    T: Transform,
    F: Fn() -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |ports: StagePorts| {
        let input = StagePorts::link_input(ports.input, &ports.name)?.downcast::<T::Input>()?;
        let output = StagePorts::link_output(ports.output, &ports.name)?.downcast::<T::Output>()?;
        let transform = create()?;
        Ok(Box::new(TransformStage::new(
            ports.name,
            transform,
            input,
            output,
            ports.completion,
        )) as Box<dyn Stage>)
    })
}
