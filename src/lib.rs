// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # height-client
//! height-client asks a remote slstudio height analysis service for a height map and saves the
//! images it returns.
//!
//! ## Design
//! The library is divided into the control flow and the transport it runs on:
//! * [client](`crate::client`) - [`HeightAnalysisClient`] runs the optional setup call, submits
//! the analysis goal, waits for the result and writes the returned images.
//! * [transport](`crate::transport`) - the [`AnalysisTransport`] trait and [`BridgeTransport`],
//! its implementation over the TCP protocol of the slstudio bridge.
//! * [config](`crate::config`) - [`ClientConfig`] holds everything that used to be a fixed
//! literal: endpoint names, shutter speed, camera ids and output paths.
//!
//! # Example:
//!```no_run
//! use height_client::{BridgeTransport, ClientConfig, ClientResult, HeightAnalysisClient, InterruptFlag};
//! fn main() -> ClientResult<()> {
//!     let config = ClientConfig::default();
//!     let interrupt = InterruptFlag::from_signals()?;
//!     let transport = BridgeTransport::new(&config, interrupt);
//!     let mut client = HeightAnalysisClient::new(config, transport)?;
//!     let outcome = client.run()?;
//!     std::process::exit(outcome.exit_code() as i32);
//! }
//!```
//! Both waits, for the bridge to come up and for the result, have no timeout. They end early
//! only when the [`InterruptFlag`] is raised, e.g. by Ctrl-C, in which case `run` returns
//! [`Outcome::Interrupted`].
pub mod client;
pub mod config;
pub mod exception;
pub mod image_bridge;
pub mod interrupt;
pub mod messages;
mod network;
pub mod transport;

pub use client::{AnalysisResult, HeightAnalysisClient, Outcome};
pub use config::ClientConfig;
pub use exception::{ClientException, ClientResult};
pub use interrupt::InterruptFlag;
pub use messages::{AnalysisGoal, ImageMessage, SetupRequest};
pub use transport::{AnalysisTransport, BridgeTransport};
