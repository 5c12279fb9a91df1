// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Conversion of [`ImageMessage`] payloads into bitmaps which can be written to disk.
use image::RgbImage;

use crate::exception::{create_conversion_exception, ClientException, ClientResult};
use crate::messages::ImageMessage;

pub const BGR8: &str = "bgr8";
pub const RGB8: &str = "rgb8";
pub const BGRA8: &str = "bgra8";
pub const RGBA8: &str = "rgba8";
pub const MONO8: &str = "mono8";

/// Byte order of a supported source encoding.
#[derive(Debug, Copy, Clone, PartialEq)]
enum Layout {
    Bgr,
    Rgb,
    Bgra,
    Rgba,
    Mono,
}

impl Layout {
    fn from_encoding(encoding: &str) -> Option<Layout> {
        match encoding {
            BGR8 => Some(Layout::Bgr),
            RGB8 => Some(Layout::Rgb),
            BGRA8 => Some(Layout::Bgra),
            RGBA8 => Some(Layout::Rgba),
            MONO8 => Some(Layout::Mono),
            _ => None,
        }
    }

    fn channels(self) -> usize {
        match self {
            Layout::Bgr | Layout::Rgb => 3,
            Layout::Bgra | Layout::Rgba => 4,
            Layout::Mono => 1,
        }
    }

    fn to_rgb(self, pixel: &[u8]) -> [u8; 3] {
        match self {
            Layout::Bgr | Layout::Bgra => [pixel[2], pixel[1], pixel[0]],
            Layout::Rgb | Layout::Rgba => [pixel[0], pixel[1], pixel[2]],
            Layout::Mono => [pixel[0], pixel[0], pixel[0]],
        }
    }
}

/// Converts `message` into a three-channel bitmap.
///
/// `desired_encoding` has to be a three-channel color encoding (`bgr8` or `rgb8`). The returned
/// bitmap always stores its channels in RGB order, which is what the PNG encoder expects, so the
/// colors come out the same for both targets.
///
/// # Errors
/// * [`ImageConversionException`](`crate::exception::ClientException::ImageConversionException`)
/// if an encoding is unsupported or the buffer is too small for the announced geometry.
pub fn to_rgb_image(message: &ImageMessage, desired_encoding: &str) -> ClientResult<RgbImage> {
    if desired_encoding != BGR8 && desired_encoding != RGB8 {
        return Err(ClientException::ImageConversionException {
            message: format!("cannot convert to target encoding {:?}", desired_encoding),
        });
    }
    let layout = Layout::from_encoding(&message.encoding).ok_or_else(|| {
        ClientException::ImageConversionException {
            message: format!("unsupported source encoding {:?}", message.encoding),
        }
    })?;
    if message.width == 0 || message.height == 0 {
        return Err(create_conversion_exception("image has no pixels"));
    }
    let width = message.width as usize;
    let height = message.height as usize;
    let step = message.step as usize;
    let row_length = width * layout.channels();
    if step < row_length {
        return Err(ClientException::ImageConversionException {
            message: format!(
                "row step {} is shorter than {} pixels of {}",
                step, width, message.encoding
            ),
        });
    }
    let required = step * (height - 1) + row_length;
    if message.data.len() < required {
        return Err(ClientException::ImageConversionException {
            message: format!(
                "image data has {} bytes but {}x{} {} needs {}",
                message.data.len(),
                width,
                height,
                message.encoding,
                required
            ),
        });
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in message.data.chunks(step).take(height) {
        for pixel in row[..row_length].chunks_exact(layout.channels()) {
            rgb.extend_from_slice(&layout.to_rgb(pixel));
        }
    }
    RgbImage::from_raw(message.width, message.height, rgb)
        .ok_or_else(|| create_conversion_exception("pixel buffer does not match image size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ClientException;

    #[test]
    fn bgr_channels_are_swapped() {
        let message = ImageMessage::new(2, 1, BGR8, 3, vec![1, 2, 3, 10, 20, 30]);
        let image = to_rgb_image(&message, BGR8).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(image.get_pixel(1, 0).0, [30, 20, 10]);
    }

    #[test]
    fn padded_rows_are_skipped() {
        // two rows of one rgba pixel, each padded to 6 bytes
        let mut message = ImageMessage::new(1, 2, RGBA8, 4, vec![9, 8, 7, 255, 0, 0, 1, 2, 3, 255]);
        message.step = 6;
        let image = to_rgb_image(&message, BGR8).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [9, 8, 7]);
        assert_eq!(image.get_pixel(0, 1).0, [1, 2, 3]);
    }

    #[test]
    fn mono_is_replicated() {
        let message = ImageMessage::new(1, 1, MONO8, 1, vec![42]);
        let image = to_rgb_image(&message, RGB8).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [42, 42, 42]);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let truncated = ImageMessage::new(4, 4, BGR8, 3, vec![0; 10]);
        let unknown = ImageMessage::new(1, 1, "32FC1", 4, vec![0; 4]);
        let empty = ImageMessage::default();
        for message in [truncated, unknown, empty] {
            match to_rgb_image(&message, BGR8) {
                Err(ClientException::ImageConversionException { .. }) => {}
                other => panic!("Expected ImageConversionException but found {:?}", other),
            }
        }
    }

    #[test]
    fn one_pixel_of_each_layout_converts() {
        for (encoding, channels) in [(BGR8, 3), (RGB8, 3), (BGRA8, 4), (RGBA8, 4), (MONO8, 1)] {
            let layout = Layout::from_encoding(encoding).unwrap();
            assert_eq!(layout.channels(), channels as usize);
            let message = ImageMessage::new(1, 1, encoding, channels, vec![5; channels as usize]);
            let image = to_rgb_image(&message, BGR8).unwrap();
            assert_eq!(image.get_pixel(0, 0).0, layout.to_rgb(&[5, 5, 5, 5]));
        }
    }

    #[test]
    fn unsupported_target_is_rejected() {
        let message = ImageMessage::new(1, 1, BGR8, 3, vec![0; 3]);
        assert!(to_rgb_image(&message, MONO8).is_err());
    }
}
