//! Structured event emission.
//!
//! One event is emitted per stage transition and per remote call attempt.
//! The sink implementation is the embedder's concern; the core only requires
//! [`EventSink`]. Sinks are threaded through the run context explicitly, so
//! there is no ambient global sink and concurrent runs cannot interleave.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
