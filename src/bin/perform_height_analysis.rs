// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use height_client::config::SetupConfig;
use height_client::{
    BridgeTransport, ClientConfig, ClientResult, HeightAnalysisClient, InterruptFlag, Outcome,
};

/// Sends one height analysis goal to the slstudio bridge and saves the returned images.
#[derive(Parser, Debug)]
#[clap(author, version, name = "perform_height_analysis")]
struct CommandLineArguments {
    /// JSON configuration file, the options below override its values
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// IP-Address or hostname of the bridge
    #[clap(long)]
    pub server: Option<String>,
    /// TCP port of the bridge
    #[clap(long)]
    pub port: Option<u16>,
    /// Shutter speed in milliseconds
    #[clap(long)]
    pub shutter_ms: Option<u32>,
    /// Calibration file on the server, enables the setup call
    #[clap(long)]
    pub calibration_file: Option<String>,
    /// Camera id for the setup call, repeat for several cameras
    #[clap(long = "camera")]
    pub camera_ids: Vec<String>,
    /// Where to write the color map
    #[clap(long)]
    pub color_map: Option<PathBuf>,
    /// Where to write the image-on frame
    #[clap(long)]
    pub image_on: Option<PathBuf>,
}

impl CommandLineArguments {
    fn into_config(self) -> ClientResult<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        if let Some(server) = self.server {
            config.server.address = server;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(shutter_ms) = self.shutter_ms {
            config.shutter_speed_in_ms = shutter_ms;
        }
        if let Some(calibration_file) = self.calibration_file {
            config.setup.get_or_insert_with(SetupConfig::default).calibration_file =
                calibration_file;
        }
        if !self.camera_ids.is_empty() {
            config.setup.get_or_insert_with(SetupConfig::default).camera_ids = self.camera_ids;
        }
        if let Some(color_map) = self.color_map {
            config.output.color_map = color_map;
        }
        if let Some(image_on) = self.image_on {
            config.output.image_on = image_on;
        }
        Ok(config)
    }
}

fn run(args: CommandLineArguments) -> ClientResult<Outcome> {
    let config = args.into_config()?;
    let interrupt = InterruptFlag::from_signals()?;
    let transport = BridgeTransport::new(&config, interrupt);
    let mut client = HeightAnalysisClient::new(config, transport)?;
    client.run()
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let args: CommandLineArguments = CommandLineArguments::parse();
    match run(args) {
        Ok(Outcome::Interrupted) => {
            eprintln!("program interrupted before completion");
            ExitCode::SUCCESS
        }
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use clap::Parser;
    use height_client::ClientException;

    use crate::CommandLineArguments;

    fn parse(args: &[&str]) -> CommandLineArguments {
        let mut argv = vec!["perform_height_analysis"];
        argv.extend_from_slice(args);
        CommandLineArguments::parse_from(argv)
    }

    #[test]
    fn no_options_keep_the_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config, height_client::ClientConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn options_override_the_defaults() {
        let config = parse(&[
            "--server",
            "bridge.local",
            "--port",
            "9000",
            "--shutter-ms",
            "80",
            "--color-map",
            "/data/cm.png",
            "--image-on",
            "/data/on.png",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.server.address, "bridge.local");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.shutter_speed_in_ms, 80);
        assert_eq!(config.output.color_map, PathBuf::from("/data/cm.png"));
        assert_eq!(config.output.image_on, PathBuf::from("/data/on.png"));
        assert!(config.setup.is_none());
    }

    #[test]
    fn setup_options_enable_the_setup_call() {
        let config = parse(&[
            "--calibration-file",
            "/srv/calib.xml",
            "--camera",
            "CAM_A",
            "--camera",
            "CAM_B",
        ])
        .into_config()
        .unwrap();
        config.validate().unwrap();
        let request = config.setup_request().unwrap();
        assert_eq!(request.calibration_file, "/srv/calib.xml");
        assert_eq!(request.camera_ids, vec!["CAM_A", "CAM_B"]);
        assert_eq!(request.shutter_speed_in_ms, config.shutter_speed_in_ms);
    }

    #[test]
    fn camera_without_calibration_file_is_invalid() {
        let config = parse(&["--camera", "CAM_A"]).into_config().unwrap();
        match config.validate() {
            Err(ClientException::ConfigException { message }) => {
                assert!(message.contains("calibration_file"))
            }
            other => panic!("Expected ConfigException but found {:?}", other),
        }
    }

    #[test]
    fn options_win_over_the_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"shutter_speed_in_ms": 80, "server": {{"address": "10.0.0.2"}}}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let config = parse(&["--config", &path, "--shutter-ms", "120"])
            .into_config()
            .unwrap();
        assert_eq!(config.shutter_speed_in_ms, 120);
        assert_eq!(config.server.address, "10.0.0.2");
    }

    #[test]
    fn missing_config_file_is_reported() {
        match parse(&["--config", "/nonexistent/height.json"]).into_config() {
            Err(ClientException::ConfigException { .. }) => {}
            other => panic!("Expected ConfigException but found {:?}", other),
        }
    }
}
