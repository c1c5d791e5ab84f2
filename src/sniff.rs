//! Content-type sniffing for attachment payloads.

use image::ImageFormat;

/// Classifies raw bytes and maps MIME types to file extensions.
pub trait MediaSniffer {
    /// MIME type detected from the payload's magic bytes.
    fn sniff_mime(&self, data: &[u8]) -> Option<String>;

    /// Conventional file extension for `mime`, without the leading dot.
    fn extension_for(&self, mime: &str) -> Option<String>;
}

/// [`MediaSniffer`] backed by the `image` crate's format detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSniffer;

impl MediaSniffer for ImageSniffer {
    fn sniff_mime(&self, data: &[u8]) -> Option<String> {
        image::guess_format(data)
            .ok()
            .map(|format| format.to_mime_type().to_string())
    }

    fn extension_for(&self, mime: &str) -> Option<String> {
        ImageFormat::from_mime_type(mime)?
            .extensions_str()
            .first()
            .map(|ext| ext.to_string())
    }
}
