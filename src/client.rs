// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`HeightAnalysisClient`] type.
use std::path::PathBuf;

use image::ImageFormat;
use log::{error, info, warn};

use crate::config::ClientConfig;
use crate::exception::{ClientException, ClientResult};
use crate::image_bridge::BGR8;
use crate::messages::{AnalysisResultMessage, ImageMessage};
use crate::transport::AnalysisTransport;

/// Result of a height analysis, independent of the protocol shape it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub success: bool,
    pub color_map: Option<ImageMessage>,
    pub image_on: Option<ImageMessage>,
}

impl From<AnalysisResultMessage> for AnalysisResult {
    fn from(message: AnalysisResultMessage) -> Self {
        match message {
            AnalysisResultMessage::Direct { success, color_map } => AnalysisResult {
                success,
                color_map: Some(color_map),
                image_on: None,
            },
            AnalysisResultMessage::Nested { success, response } => AnalysisResult {
                success,
                color_map: Some(response.color_map),
                image_on: Some(response.image_on),
            },
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The analysis succeeded, `written` lists the files that were saved.
    Completed { written: Vec<PathBuf> },
    /// The operator interrupted one of the blocking waits.
    Interrupted,
    /// The server finished the analysis but reported it as unsuccessful.
    Unsuccessful,
    /// The setup service failed, the analysis was not attempted.
    SetupFailed { message: String },
}

impl Outcome {
    /// Process exit status belonging to this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Completed { .. } | Outcome::Interrupted => 0,
            Outcome::Unsuccessful => 1,
            Outcome::SetupFailed { .. } => 2,
        }
    }
}

/// Drives one end-to-end height analysis: optional setup, goal submission, blocking wait and
/// persistence of the returned images.
pub struct HeightAnalysisClient<T: AnalysisTransport> {
    config: ClientConfig,
    transport: T,
}

impl<T: AnalysisTransport> HeightAnalysisClient<T> {
    /// # Errors
    /// * [`ConfigException`](`crate::exception::ClientException::ConfigException`) if `config` is invalid.
    pub fn new(config: ClientConfig, transport: T) -> ClientResult<Self> {
        config.validate()?;
        Ok(HeightAnalysisClient { config, transport })
    }

    /// Runs setup (if configured), the analysis and the persistence step in this order.
    ///
    /// Setup faults, an unsuccessful result and operator interrupts are reported through the
    /// returned [`Outcome`].
    /// # Errors
    /// Every other failure of the transport, e.g. a lost connection, is returned unchanged.
    pub fn run(&mut self) -> ClientResult<Outcome> {
        match self.setup() {
            Ok(()) => {}
            Err(ClientException::Interrupted) => return Ok(Outcome::Interrupted),
            Err(ClientException::SetupException { message }) => {
                error!("setup failed: {}", message);
                return Ok(Outcome::SetupFailed { message });
            }
            Err(e) => return Err(e),
        }
        let result = match self.run_analysis(self.config.shutter_speed_in_ms) {
            Ok(result) => result,
            Err(ClientException::Interrupted) => return Ok(Outcome::Interrupted),
            Err(e) => return Err(e),
        };
        if !result.success {
            warn!("height analysis reported failure");
            return Ok(Outcome::Unsuccessful);
        }
        let written = self.persist_result(&result);
        info!("Done.");
        Ok(Outcome::Completed { written })
    }

    /// Calls the setup service once if the configuration asks for it.
    pub fn setup(&mut self) -> ClientResult<()> {
        match self.config.setup_request() {
            Some(request) => {
                info!(
                    "setting up {} camera(s) with {}",
                    request.camera_ids.len(),
                    request.calibration_file
                );
                self.transport.call_setup(&request)
            }
            None => Ok(()),
        }
    }

    /// Sends one goal with `shutter_speed_in_ms` and blocks until its result is available.
    pub fn run_analysis(&mut self, shutter_speed_in_ms: u32) -> ClientResult<AnalysisResult> {
        let mut goal = self.config.goal();
        goal.shutter_speed_in_ms = shutter_speed_in_ms;
        info!("send goal");
        info!("{:?}", goal);
        info!("wait");
        let result = self.transport.submit_and_await_analysis(&goal)?;
        info!("done");
        Ok(result)
    }

    /// Converts and saves every image `result` carries. Images that cannot be converted or
    /// written are logged and skipped.
    /// # Return
    /// Paths of the files that were written.
    pub fn persist_result(&self, result: &AnalysisResult) -> Vec<PathBuf> {
        let targets = [
            ("color map", result.color_map.as_ref(), &self.config.output.color_map),
            ("image on", result.image_on.as_ref(), &self.config.output.image_on),
        ];
        let mut written = Vec::new();
        for (name, image, path) in targets {
            let image = match image {
                Some(image) => image,
                None => continue,
            };
            let bitmap = match self.transport.decode_image(image, BGR8) {
                Ok(bitmap) => bitmap,
                Err(e) => {
                    error!("{}: {}", name, e);
                    continue;
                }
            };
            match bitmap.save_with_format(path, ImageFormat::Png) {
                Ok(()) => {
                    info!("wrote {} to {}", name, path.display());
                    written.push(path.clone());
                }
                Err(e) => error!("could not write {} to {}: {}", name, path.display(), e),
            }
        }
        written
    }
}
