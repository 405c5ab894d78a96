//! Pipeline composer.
//!
//! Turns an ordered list of stage names into a validated, fully wired
//! [`Pipeline`]. Serial and parallel mode share one realization path: in
//! serial mode no stage is expanded, in parallel mode every parallelizable
//! stage is replaced by a fan-out, K replicas and a fan-in.
//!
//! # Example
//!
//! ```rust
//! use filterflow::pipeline::{
//!     Collector, PipelineBuilder, PipelineConfig, SourceInput, StageRegistry,
//! };
//! use std::collections::HashMap;
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() -> filterflow::Result<()> {
//! let registry = StageRegistry::with_builtins()?;
//! let counts: Collector<HashMap<String, usize>> = Collector::default();
//!
//! let pipeline = PipelineBuilder::new(&registry)
//!     .config(PipelineConfig::parallel())
//!     .stages(["text-streamer", "tokenizer", "term-counter"])
//!     .build(SourceInput::text("the cat sat on the mat"), counts.clone())?;
//! pipeline.run().await?;
//!
//! assert_eq!(counts.lock()["the"], 2);
//! # Ok(())
//! # }
//! ```

use super::collector::{Collector, ResultTarget};
use super::config::{ExecutionMode, PipelineConfig};
use super::events::EventSender;
use super::executor::{LinkInfo, Pipeline};
use super::factory::StageFactory;
use super::registry::{Inlet, Outlet, SourceInput, StageDescriptor, StageRegistry, StageRole};
use super::tracker::CompletionTracker;
use crate::cancel::CancelToken;
use crate::element::{DataType, Stage, StageKind, TypeTag};
use crate::error::{Error, Result};
use crate::link::AnyReceiver;

/// Builds a [`Pipeline`] from registered stage names.
#[derive(Debug, Clone)]
pub struct PipelineBuilder<'r> {
    registry: &'r StageRegistry,
    config: PipelineConfig,
    stages: Vec<String>,
}

impl<'r> PipelineBuilder<'r> {
    /// Start an empty assembly over `registry`.
    pub fn new(registry: &'r StageRegistry) -> Self {
        Self {
            registry,
            config: PipelineConfig::default(),
            stages: Vec::new(),
        }
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Append one stage name.
    pub fn stage(mut self, name: impl Into<String>) -> Self {
        self.stages.push(name.into());
        self
    }

    /// Append several stage names, in order.
    pub fn stages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages.extend(names.into_iter().map(Into::into));
        self
    }

    /// Validate the assembly for a result container of type `C` without
    /// creating anything.
    pub fn validate<C: 'static>(&self) -> Result<()> {
        self.check(TypeTag::of::<C>()).map(|_| ())
    }

    /// Validate, then create every channel and stage instance.
    ///
    /// Nothing runs until [`Pipeline::run`] or [`Pipeline::start`].
    pub fn build<C: Send + 'static>(
        self,
        input: SourceInput,
        collector: Collector<C>,
    ) -> Result<Pipeline> {
        let descriptors = self.check(TypeTag::of::<C>())?;
        let degrees: Vec<Option<usize>> = descriptors.iter().map(|d| self.degree(d)).collect();
        let task_count: usize = degrees.iter().map(|k| k.map_or(1, |k| k + 2)).sum();

        tracing::debug!(
            "composing {} pipeline: {} stages, {} tasks",
            self.config.mode,
            descriptors.len(),
            task_count
        );

        let cancel = CancelToken::new();
        let events = EventSender::new(self.config.event_capacity);
        let tracker = CompletionTracker::with_events(task_count, cancel.clone(), events.clone());
        let factory = StageFactory::new(self.registry);

        let mut realized = Realization {
            config: &self.config,
            factory,
            tracker: &tracker,
            cancel: &cancel,
            tasks: Vec::with_capacity(task_count),
            links: Vec::new(),
        };

        let last = descriptors.len() - 1;
        let mut input = Some(input);
        let mut collector = Some(collector);
        let mut upstream: Option<AnyReceiver> = None;

        for (i, descriptor) in descriptors.iter().enumerate() {
            let inlet = match (upstream.take(), input.take()) {
                (Some(rx), _) => Inlet::Link(rx),
                (None, Some(input)) => Inlet::External(input),
                (None, None) => {
                    return Err(Error::InvalidAssembly(format!(
                        "stage '{}' has no input",
                        descriptor.name
                    )));
                }
            };

            let outlet = if i == last {
                let collector = collector.take().ok_or_else(|| {
                    Error::InvalidAssembly("result container already bound".into())
                })?;
                Outlet::Container(ResultTarget::new(collector))
            } else {
                let boundary = is_fanned(degrees[i]) || is_fanned(degrees[i + 1]);
                let capacity = if boundary {
                    self.config.fan_capacity()
                } else {
                    self.config.channel_capacity
                };
                let data_type = output_type(descriptor)?;
                let (tx, rx) = data_type.link(capacity, &cancel);
                realized.links.push(LinkInfo {
                    from: descriptor.name.clone(),
                    to: descriptors[i + 1].name.clone(),
                    data_type,
                    capacity,
                });
                upstream = Some(rx);
                Outlet::Link(tx)
            };

            match degrees[i] {
                None => realized.single(descriptor, inlet, outlet)?,
                Some(k) => realized.replicated(descriptor, k, inlet, outlet)?,
            }
        }

        let Realization { tasks, links, .. } = realized;
        Ok(Pipeline::new(tasks, links, tracker, cancel, events))
    }

    /// Run every build-time check, in order, and return the descriptors.
    fn check(&self, container: TypeTag) -> Result<Vec<&'r StageDescriptor>> {
        self.config.validate()?;

        if self.stages.len() < 2 {
            return Err(Error::InvalidAssembly(format!(
                "an assembly needs at least a source and a sink, got {} stage(s)",
                self.stages.len()
            )));
        }

        let descriptors = self
            .stages
            .iter()
            .map(|name| {
                self.registry
                    .descriptor(name)
                    .ok_or_else(|| Error::UnknownStage { name: name.clone() })
            })
            .collect::<Result<Vec<_>>>()?;

        let last = descriptors.len() - 1;
        for (i, descriptor) in descriptors.iter().enumerate() {
            let expected = match i {
                0 => StageRole::Source,
                i if i == last => StageRole::Sink,
                _ => StageRole::Transform,
            };
            if descriptor.role != expected {
                return Err(Error::InvalidAssembly(format!(
                    "'{}' is a {} but position {} requires a {}",
                    descriptor.name, descriptor.role, i, expected
                )));
            }
            if descriptor.parallelizable && descriptor.role != StageRole::Transform {
                return Err(Error::InvalidAssembly(format!(
                    "'{}' is a {} and cannot be parallelized",
                    descriptor.name, descriptor.role
                )));
            }
        }

        for pair in descriptors.windows(2) {
            let (upstream, downstream) = (pair[0], pair[1]);
            let produced = output_type(upstream)?;
            let expected = downstream.input.ok_or_else(|| {
                Error::InvalidAssembly(format!("'{}' declares no input type", downstream.name))
            })?;
            if produced != expected {
                return Err(Error::TypeMismatch {
                    upstream: upstream.name.clone(),
                    produced: produced.name(),
                    downstream: downstream.name.clone(),
                    expected: expected.name(),
                });
            }
        }

        let sink = descriptors[last];
        if sink.container != Some(container) {
            return Err(Error::InvalidAssembly(format!(
                "sink '{}' writes {} but the result container is {}",
                sink.name,
                sink.container.map_or("nothing", |tag| tag.name()),
                container.name()
            )));
        }

        Ok(descriptors)
    }

    /// Replica count for a stage, or `None` if it runs as one task.
    fn degree(&self, descriptor: &StageDescriptor) -> Option<usize> {
        (self.config.mode == ExecutionMode::Parallel && descriptor.parallelizable).then(|| {
            descriptor
                .degree
                .map_or(self.config.parallelism, |degree| degree.get())
        })
    }
}

fn is_fanned(degree: Option<usize>) -> bool {
    degree.is_some_and(|k| k > 1)
}

fn output_type(descriptor: &StageDescriptor) -> Result<DataType> {
    descriptor.output.ok_or_else(|| {
        Error::InvalidAssembly(format!("'{}' declares no output type", descriptor.name))
    })
}

fn kind_of(role: StageRole) -> StageKind {
    match role {
        StageRole::Source => StageKind::Source,
        StageRole::Transform => StageKind::Transform,
        StageRole::Sink => StageKind::Sink,
    }
}

/// Accumulates the tasks and channels of a pipeline under construction.
struct Realization<'a, 'r> {
    config: &'a PipelineConfig,
    factory: StageFactory<'r>,
    tracker: &'a CompletionTracker,
    cancel: &'a CancelToken,
    tasks: Vec<Box<dyn Stage>>,
    links: Vec<LinkInfo>,
}

impl Realization<'_, '_> {
    fn single(&mut self, descriptor: &StageDescriptor, inlet: Inlet, outlet: Outlet) -> Result<()> {
        let name = descriptor.name.as_str();
        let handle = self.tracker.handle(name, kind_of(descriptor.role))?;
        let stage = self.factory.build(name, name, inlet, outlet, handle)?;
        self.tasks.push(stage);
        Ok(())
    }

    fn replicated(
        &mut self,
        descriptor: &StageDescriptor,
        k: usize,
        inlet: Inlet,
        outlet: Outlet,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        let (Inlet::Link(input), Outlet::Link(output)) = (inlet, outlet) else {
            return Err(Error::InvalidAssembly(format!(
                "parallel stage '{name}' must sit between two channels"
            )));
        };
        let in_type = input.data_type();
        let out_type = output.data_type();
        let capacity = self.config.channel_capacity;

        let mut branch_inputs = Vec::with_capacity(k);
        let mut branch_outputs = Vec::with_capacity(k);
        let mut replicas = Vec::with_capacity(k);
        for j in 0..k {
            let instance = format!("{name}[{j}]");
            let (in_tx, in_rx) = in_type.link(capacity, self.cancel);
            let (out_tx, out_rx) = out_type.link(capacity, self.cancel);
            self.links.push(LinkInfo {
                from: format!("{name}/parallelizer"),
                to: instance.clone(),
                data_type: in_type,
                capacity,
            });
            self.links.push(LinkInfo {
                from: instance.clone(),
                to: format!("{name}/serializer"),
                data_type: out_type,
                capacity,
            });

            let handle = self.tracker.handle(&instance, StageKind::Transform)?;
            replicas.push(self.factory.build(
                name,
                instance,
                Inlet::Link(in_rx),
                Outlet::Link(out_tx),
                handle,
            )?);
            branch_inputs.push(in_tx);
            branch_outputs.push(out_rx);
        }

        let fan_out = format!("{name}/parallelizer");
        let handle = self.tracker.handle(&fan_out, StageKind::FanOut)?;
        self.tasks
            .push(in_type.fan_out(fan_out, input, branch_inputs, handle)?);
        self.tasks.extend(replicas);

        let fan_in = format!("{name}/serializer");
        let handle = self.tracker.handle(&fan_in, StageKind::FanIn)?;
        self.tasks
            .push(out_type.fan_in(fan_in, branch_outputs, output, handle)?);

        tracing::debug!("expanded '{}' into {} replicas", name, k);
        Ok(())
    }
}
