//! Collaborators shared by the theater engine: the in-process message bus and
//! logging initialisation.

pub mod bus;
pub mod logging;

pub use bus::{
    ActionHandler, Bus, BusError, FnRequestHandler, Message, MessageHandler, Request,
    RequestHandler,
};
pub use logging::{init_logging, init_test_logging, LoggingConfig};
