mod client;
mod coordinator;
mod error;
mod portal;
mod protocol;
mod types;

pub use client::{ClimoteClient, ClimoteClientBuilder};
pub use error::{Error, Result};
pub use portal::{HttpPortal, Portal};
pub use types::*;
