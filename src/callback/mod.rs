// Push delivery of admitted changes to callback sinks

mod dispatcher;

pub use dispatcher::{CallbackDispatcher, CallbackSink, ChannelSink};
