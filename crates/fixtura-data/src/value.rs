//! Attribute values and lazy producers.
//!
//! An attribute is either a literal JSON value or a [`Producer`] evaluated
//! once when the owning record is materialized. Producers are shared handles,
//! so one producer used as a group default hands successive values to
//! successive records.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

/// Resolved attribute mapping of a record, in resolution order.
pub type Attributes = IndexMap<String, Value>;

type ProducerFn = dyn FnMut() -> Value + Send;

/// Zero-argument value generator.
///
/// Cloning a producer shares its state: every clone advances the same
/// underlying closure.
#[derive(Clone)]
pub struct Producer(Arc<Mutex<Box<ProducerFn>>>);

impl Producer {
	/// Wraps a closure as a producer.
	///
	/// # Example
	///
	/// ```
	/// use fixtura_data::value::Producer;
	///
	/// let mut n = 0;
	/// let producer = Producer::new(move || {
	///     n += 1;
	///     format!("Body {}", n)
	/// });
	/// assert_eq!(producer.produce(), "Body 1");
	/// assert_eq!(producer.produce(), "Body 2");
	/// ```
	pub fn new<F, V>(mut f: F) -> Self
	where
		F: FnMut() -> V + Send + 'static,
		V: Into<Value>,
	{
		Self(Arc::new(Mutex::new(Box::new(move || f().into()))))
	}

	/// Invokes the producer once and returns the produced value.
	pub fn produce(&self) -> Value {
		let mut f = self.0.lock();
		(*f)()
	}
}

impl fmt::Debug for Producer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Producer(..)")
	}
}

/// Source value of one attribute.
#[derive(Clone, Debug)]
pub enum AttrValue {
	/// A fixed value.
	Literal(Value),
	/// A value produced on materialization.
	Lazy(Producer),
}

impl AttrValue {
	/// Creates a literal attribute value.
	pub fn literal(value: impl Into<Value>) -> Self {
		Self::Literal(value.into())
	}

	/// Creates a lazy attribute value backed by `producer`.
	pub fn lazy(producer: Producer) -> Self {
		Self::Lazy(producer)
	}

	/// Returns true if the value is produced on materialization.
	pub fn is_lazy(&self) -> bool {
		matches!(self, Self::Lazy(_))
	}

	/// Resolves the value, invoking the producer if there is one.
	pub(crate) fn resolve(self) -> Value {
		match self {
			Self::Literal(value) => value,
			Self::Lazy(producer) => producer.produce(),
		}
	}
}

/// Auto-incrementing value generator with a `{n}` placeholder.
///
/// # Example
///
/// ```
/// use fixtura_data::value::Sequence;
///
/// let seq = Sequence::new("user_{n}");
/// assert_eq!(seq.next_value(), "user_1");
/// assert_eq!(seq.next_value(), "user_2");
/// ```
#[derive(Debug, Clone)]
pub struct Sequence {
	format: String,
	counter: Arc<AtomicI64>,
}

impl Sequence {
	/// Creates a sequence starting at 1.
	pub fn new(format: impl Into<String>) -> Self {
		Self::starting_at(format, 1)
	}

	/// Creates a sequence starting at `start`.
	pub fn starting_at(format: impl Into<String>, start: i64) -> Self {
		Self {
			format: format.into(),
			counter: Arc::new(AtomicI64::new(start)),
		}
	}

	/// Returns the next formatted value.
	pub fn next_value(&self) -> String {
		let n = self.counter.fetch_add(1, Ordering::SeqCst);
		self.format.replace("{n}", &n.to_string())
	}

	/// Converts the sequence into a producer of string values.
	pub fn into_producer(self) -> Producer {
		Producer::new(move || self.next_value())
	}
}

/// Returns a producer of formatted sequence values starting at 1.
pub fn sequence(format: impl Into<String>) -> Producer {
	Sequence::new(format).into_producer()
}

/// Returns a producer of integers counting up from `start`.
pub fn counter(start: i64) -> Producer {
	let next = AtomicI64::new(start);
	Producer::new(move || next.fetch_add(1, Ordering::SeqCst))
}
