//! Command handlers for the docstream CLI.

pub mod ask;
pub mod corpus;
pub mod serve;

pub use ask::AskCommand;
pub use corpus::CorpusCommand;
pub use serve::ServeCommand;
