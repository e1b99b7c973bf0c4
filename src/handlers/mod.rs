pub mod config;  // GET/PUT runtime configuration
pub mod twiml;   // Call instructions for the telephony platform

pub use config::*;
pub use twiml::*;
