//! Test utilities: scripted engine mocks and a UDP test sender

pub mod mock_engine;
pub mod sender;

pub use mock_engine::{MockChannelHandle, MockEngine};
pub use sender::TestSender;
