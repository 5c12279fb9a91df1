// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! The narrow interface between the client control flow and the remote runtime.
use image::RgbImage;
use log::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::client::AnalysisResult;
use crate::config::{ClientConfig, ServerConfig};
use crate::exception::{ClientException, ClientResult};
use crate::image_bridge;
use crate::interrupt::InterruptFlag;
use crate::messages::{
    AnalysisGoal, AnalysisResultMessage, Command, ConnectRequest, ConnectResponse, ConnectStatus,
    GoalResponse, GoalStatus, GoalWithEndpoint, ImageMessage, SetupRequest,
    SetupRequestWithEndpoint, SetupResponse, SetupStatus, PROTOCOL_VERSION,
};
use crate::network::Network;

/// Everything [`HeightAnalysisClient`](`crate::client::HeightAnalysisClient`) needs from the
/// outside world.
#[cfg_attr(test, automock)]
pub trait AnalysisTransport {
    /// Calls the setup service once and blocks until it answers.
    /// # Errors
    /// * [`SetupException`](`crate::exception::ClientException::SetupException`) if the service
    /// is unavailable or rejects the request.
    /// * [`Interrupted`](`crate::exception::ClientException::Interrupted`) if the operator interrupts the wait.
    fn call_setup(&mut self, request: &SetupRequest) -> ClientResult<()>;

    /// Submits `goal` to the action server and blocks without timeout until its result arrives.
    /// # Errors
    /// * [`Interrupted`](`crate::exception::ClientException::Interrupted`) if the operator interrupts the wait.
    /// * [`GoalRejected`](`crate::exception::ClientException::GoalRejected`) if the server refuses the goal.
    fn submit_and_await_analysis(&mut self, goal: &AnalysisGoal) -> ClientResult<AnalysisResult>;

    /// Converts an image payload into a bitmap in `encoding`.
    /// # Errors
    /// * [`ImageConversionException`](`crate::exception::ClientException::ImageConversionException`) for malformed payloads.
    fn decode_image(&self, image: &ImageMessage, encoding: &str) -> ClientResult<RgbImage>;
}

/// [`AnalysisTransport`] talking to the slstudio bridge over TCP.
///
/// The connection is opened on first use, so the wait for the server happens inside the
/// first remote call and can be interrupted like any other wait.
pub struct BridgeTransport {
    server: ServerConfig,
    action_name: String,
    setup_service: Option<String>,
    interrupt: InterruptFlag,
    network: Option<Network>,
    ri_version: Option<u16>,
}

impl BridgeTransport {
    pub fn new(config: &ClientConfig, interrupt: InterruptFlag) -> BridgeTransport {
        BridgeTransport {
            server: config.server.clone(),
            action_name: config.action_name.clone(),
            setup_service: config.setup.as_ref().map(|setup| setup.service_name.clone()),
            interrupt,
            network: None,
            ri_version: None,
        }
    }

    /// Returns the protocol version reported by the bridge, once connected.
    pub fn server_version(&self) -> Option<u16> {
        self.ri_version
    }

    fn network(&mut self) -> ClientResult<&mut Network> {
        if self.network.is_none() {
            let mut network = Network::new(
                &self.server.address,
                self.server.port,
                self.server.retry_interval(),
                self.interrupt.clone(),
            )?;
            let version = connect_bridge(&mut network)?;
            info!(
                "connected to {}:{} (protocol version {})",
                self.server.address, self.server.port, version
            );
            self.ri_version = Some(version);
            self.network = Some(network);
        }
        self.network
            .as_mut()
            .ok_or_else(|| ClientException::NetworkException {
                message: "height-client: no connection to the bridge".to_string(),
            })
    }
}

fn connect_bridge(network: &mut Network) -> ClientResult<u16> {
    let command_id = network.tcp_send_request(Command::Connect, &ConnectRequest::new())?;
    let connect_response: ConnectResponse =
        network.tcp_blocking_receive_response(Command::Connect, command_id)?;
    match connect_response.status {
        ConnectStatus::Success => Ok(connect_response.version),
        _ => Err(ClientException::IncompatibleLibraryVersionError {
            server_version: connect_response.version,
            library_version: PROTOCOL_VERSION,
        }),
    }
}

impl AnalysisTransport for BridgeTransport {
    fn call_setup(&mut self, request: &SetupRequest) -> ClientResult<()> {
        let endpoint = self
            .setup_service
            .clone()
            .unwrap_or_else(|| crate::config::DEFAULT_SETUP_SERVICE.to_string());
        let network = self.network()?;
        let command = SetupRequestWithEndpoint {
            endpoint,
            request: request.clone(),
        };
        let command_id = network.tcp_send_request(Command::Setup, &command)?;
        let response: SetupResponse =
            network.tcp_blocking_receive_response(Command::Setup, command_id)?;
        handle_setup_status(&command.endpoint, response)
    }

    fn submit_and_await_analysis(&mut self, goal: &AnalysisGoal) -> ClientResult<AnalysisResult> {
        let endpoint = self.action_name.clone();
        let network = self.network()?;
        let command = GoalWithEndpoint {
            endpoint,
            goal: *goal,
        };
        let command_id = network.tcp_send_request(Command::SendGoal, &command)?;
        let response: GoalResponse =
            network.tcp_blocking_receive_response(Command::SendGoal, command_id)?;
        if response.status != GoalStatus::Accepted {
            return Err(ClientException::GoalRejected {
                message: response.message,
            });
        }
        debug!("goal {} accepted by {}", command_id, command.endpoint);
        let result: AnalysisResultMessage =
            network.tcp_blocking_receive_response(Command::Result, command_id)?;
        Ok(result.into())
    }

    fn decode_image(&self, image: &ImageMessage, encoding: &str) -> ClientResult<RgbImage> {
        image_bridge::to_rgb_image(image, encoding)
    }
}

fn handle_setup_status(endpoint: &str, response: SetupResponse) -> ClientResult<()> {
    match response.status {
        SetupStatus::Success => Ok(()),
        SetupStatus::Rejected => Err(ClientException::SetupException {
            message: format!("{} rejected the request: {}", endpoint, response.message),
        }),
        SetupStatus::ServiceUnavailable => Err(ClientException::SetupException {
            message: format!("{} is unavailable: {}", endpoint, response.message),
        }),
    }
}
