// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Records exchanged with the slstudio bridge.
use std::fmt::Debug;

use serde::Deserialize;
use serde::Serialize;
use serde_repr::{Deserialize_repr, Serialize_repr};

pub static PROTOCOL_VERSION: u16 = 1;
pub static COMMAND_PORT: u16 = 11411;

/// Serialized size of [`CommandHeader`]: u16 command, u32 id, u32 size.
pub const HEADER_SIZE: usize = 10;

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    Connect,
    Setup,
    SendGoal,
    Result,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct CommandHeader {
    pub command: Command,
    pub command_id: u32,
    /// Size of the whole frame in bytes, header included.
    pub size: u32,
}

impl CommandHeader {
    pub fn new(command: Command, command_id: u32, size: u32) -> CommandHeader {
        CommandHeader {
            command,
            command_id,
            size,
        }
    }
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum ConnectStatus {
    Success,
    IncompatibleLibraryVersion,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum SetupStatus {
    Success,
    Rejected,
    ServiceUnavailable,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum GoalStatus {
    Accepted,
    Rejected,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectRequest {
    pub version: u16,
}

impl ConnectRequest {
    pub fn new() -> Self {
        ConnectRequest {
            version: PROTOCOL_VERSION,
        }
    }
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectResponse {
    pub status: ConnectStatus,
    pub version: u16,
}

/// Goal of the `heightAnalysis` action.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct AnalysisGoal {
    pub shutter_speed_in_ms: u32,
}

/// Request of the `setupSlstudio` service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    pub calibration_file: String,
    pub shutter_speed_in_ms: u32,
    pub camera_ids: Vec<String>,
    /// Forwarded verbatim, never interpreted by the client.
    pub auxiliary: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetupRequestWithEndpoint {
    pub endpoint: String,
    pub request: SetupRequest,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetupResponse {
    pub status: SetupStatus,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GoalWithEndpoint {
    pub endpoint: String,
    pub goal: AnalysisGoal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GoalResponse {
    pub status: GoalStatus,
    pub message: String,
}

/// Raw image as published by the camera pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageMessage {
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    /// Length of a full row in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl ImageMessage {
    /// Creates a tightly packed image, `step` is derived from the width and the channel count.
    pub fn new(width: u32, height: u32, encoding: &str, channels: u32, data: Vec<u8>) -> Self {
        ImageMessage {
            height,
            width,
            encoding: encoding.to_string(),
            is_bigendian: 0,
            step: width * channels,
            data,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeightAnalysisResponse {
    pub color_map: ImageMessage,
    pub image_on: ImageMessage,
}

/// Result of the `heightAnalysis` action in both protocol shapes the bridge may send.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum AnalysisResultMessage {
    /// Earliest shape: only the color map, next to the flag.
    Direct {
        success: bool,
        color_map: ImageMessage,
    },
    /// Both images nested under a response record.
    Nested {
        success: bool,
        response: HeightAnalysisResponse,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_matches_encoding() {
        let header = CommandHeader::new(Command::Result, 7, 42);
        let encoded = bincode::serialize(&header).unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(&encoded[0..2], &[3, 0]);
        let decoded: CommandHeader = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn image_step_is_derived_from_channels() {
        let image = ImageMessage::new(4, 2, "bgr8", 3, vec![0; 24]);
        assert_eq!(image.step, 12);
        assert_eq!(image.is_bigendian, 0);
    }
}
