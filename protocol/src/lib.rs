mod codec;
mod command;
mod endpoint;

pub use codec::*;
pub use command::*;
pub use endpoint::*;
