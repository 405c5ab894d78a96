//! Runtime descriptors for the element types flowing through channels.
//!
//! The registry only sees stages through their descriptors, so adjacent-type
//! checks and the wiring of channels and fan-out/fan-in adapters go through
//! [`DataType`], which carries the operations that need the concrete type.

use crate::cancel::CancelToken;
use crate::element::Stage;
use crate::elements::flow::{Parallelizer, Serializer};
use crate::error::Result;
use crate::link::{AnyReceiver, AnySender, Channel};
use crate::pipeline::CompletionHandle;
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

type LinkFn = fn(usize, &CancelToken) -> (AnySender, AnyReceiver);
type FanOutFn = fn(String, AnyReceiver, Vec<AnySender>, CompletionHandle) -> Result<Box<dyn Stage>>;
type FanInFn = fn(String, Vec<AnyReceiver>, AnySender, CompletionHandle) -> Result<Box<dyn Stage>>;

/// The element type of a channel.
///
/// Two data types are equal when they describe the same Rust type.
#[derive(Clone, Copy)]
pub struct DataType {
    id: TypeId,
    name: &'static str,
    link: LinkFn,
    fan_out: FanOutFn,
    fan_in: FanInFn,
}

impl DataType {
    /// Describe `T`.
    pub fn of<T: Send + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
            link: make_link::<T>,
            fan_out: make_fan_out::<T>,
            fan_in: make_fan_in::<T>,
        }
    }

    /// Readable type name, without module paths.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether this describes `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Create a bounded channel of this type.
    pub fn link(&self, capacity: usize, cancel: &CancelToken) -> (AnySender, AnyReceiver) {
        (self.link)(capacity, cancel)
    }

    /// Create a round-robin fan-out adapter of this type.
    pub fn fan_out(
        &self,
        name: String,
        input: AnyReceiver,
        outputs: Vec<AnySender>,
        completion: CompletionHandle,
    ) -> Result<Box<dyn Stage>> {
        (self.fan_out)(name, input, outputs, completion)
    }

    /// Create a merging fan-in adapter of this type.
    pub fn fan_in(
        &self,
        name: String,
        inputs: Vec<AnyReceiver>,
        output: AnySender,
        completion: CompletionHandle,
    ) -> Result<Box<dyn Stage>> {
        (self.fan_in)(name, inputs, output, completion)
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DataType {}

impl Hash for DataType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.name)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn make_link<T: Send + 'static>(capacity: usize, cancel: &CancelToken) -> (AnySender, AnyReceiver) {
    let (tx, rx) = Channel::bounded::<T>(capacity, cancel);
    (AnySender::new(tx), AnyReceiver::new(rx))
}

fn make_fan_out<T: Send + 'static>(
    name: String,
    input: AnyReceiver,
    outputs: Vec<AnySender>,
    completion: CompletionHandle,
) -> Result<Box<dyn Stage>> {
    let input = input.downcast::<T>()?;
    let outputs = outputs
        .into_iter()
        .map(AnySender::downcast::<T>)
        .collect::<Result<Vec<_>>>()?;
    Ok(Box::new(Parallelizer::new(name, input, outputs, completion)?))
}

fn make_fan_in<T: Send + 'static>(
    name: String,
    inputs: Vec<AnyReceiver>,
    output: AnySender,
    completion: CompletionHandle,
) -> Result<Box<dyn Stage>> {
    let inputs = inputs
        .into_iter()
        .map(AnyReceiver::downcast::<T>)
        .collect::<Result<Vec<_>>>()?;
    let output = output.downcast::<T>()?;
    Ok(Box::new(Serializer::new(name, inputs, output, completion)?))
}

/// Identity of a sink's result container type.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Describe `C`.
    pub fn of<C: 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: short_type_name(std::any::type_name::<C>()),
        }
    }

    /// Readable type name, without module paths.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

/// Strip the module path of the outermost type. Generic arguments are left
/// as they are.
fn short_type_name(full: &'static str) -> &'static str {
    match full.find('<') {
        None => full.rsplit("::").next().unwrap_or(full),
        Some(open) => {
            let head = &full[..open];
            match head.rfind("::") {
                Some(sep) => &full[sep + 2..],
                None => full,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_type() {
        assert_eq!(DataType::of::<String>(), DataType::of::<String>());
        assert_ne!(DataType::of::<String>(), DataType::of::<u64>());
        assert!(DataType::of::<String>().is::<String>());
    }

    #[test]
    fn test_short_names() {
        assert_eq!(DataType::of::<String>().name(), "String");
        assert_eq!(DataType::of::<u64>().name(), "u64");
        assert_eq!(TypeTag::of::<Vec<u8>>().name(), "Vec<u8>");
    }

    #[test]
    fn test_type_tag_equality() {
        assert_eq!(TypeTag::of::<Vec<u8>>(), TypeTag::of::<Vec<u8>>());
        assert_ne!(TypeTag::of::<Vec<u8>>(), TypeTag::of::<Vec<u16>>());
    }

    #[tokio::test]
    async fn test_link_creates_typed_channel() {
        let cancel = CancelToken::new();
        let (tx, rx) = DataType::of::<u32>().link(3, &cancel);
        let tx = tx.downcast::<u32>().unwrap();
        let rx = rx.downcast::<u32>().unwrap();
        assert_eq!(tx.capacity(), 3);
        tx.put(crate::link::Message::Item(9)).await.unwrap();
        assert_eq!(rx.take().await.unwrap().into_item(), Some(9));
    }
}
