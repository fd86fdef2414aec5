//! Magic-byte detection and decompression for fetched payloads
//!
//! Guide feeds are routinely published gzip- or zip-wrapped regardless of the
//! URL extension, so detection works on content, not on names.

use std::io::Read;

use anyhow::{Context, Result};
use bytes::Bytes;
use flate2::read::GzDecoder;
use zip::read::ZipArchive;

/// Supported compression formats detected by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Zip,
    Uncompressed,
}

/// Magic-byte detection and decompression utility
pub struct DecompressionService;

impl DecompressionService {
    /// Detect compression format using magic bytes
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        if data.len() >= 2 && data[0..2] == [0x1f, 0x8b] {
            return CompressionFormat::Gzip;
        }
        if data.len() >= 4 && data[0..4] == [b'P', b'K', 0x03, 0x04] {
            return CompressionFormat::Zip;
        }
        CompressionFormat::Uncompressed
    }

    /// Decompress data based on detected format
    pub fn decompress(data: Bytes) -> Result<Vec<u8>> {
        match Self::detect_compression_format(&data) {
            CompressionFormat::Gzip => Self::decompress_gzip(data),
            CompressionFormat::Zip => Self::decompress_zip(data),
            CompressionFormat::Uncompressed => Ok(data.to_vec()),
        }
    }

    fn decompress_gzip(data: Bytes) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data.as_ref());
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .context("Failed to decompress gzip data")?;
        Ok(decompressed)
    }

    /// Decompress zip data (extracts the first file in the archive)
    fn decompress_zip(data: Bytes) -> Result<Vec<u8>> {
        let cursor = std::io::Cursor::new(data);
        let mut archive = ZipArchive::new(cursor).context("Failed to read zip archive")?;

        if archive.is_empty() {
            anyhow::bail!("Zip archive is empty");
        }

        let mut file = archive
            .by_index(0)
            .context("Failed to get first file from zip archive")?;

        let mut decompressed = Vec::new();
        file.read_to_end(&mut decompressed)
            .context("Failed to read file from zip archive")?;

        Ok(decompressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_gzip_detection_and_round_trip() {
        let original = "#EXTM3U\n#EXTINF:-1,Test\nhttp://example.com/1";

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(
            DecompressionService::detect_compression_format(&compressed),
            CompressionFormat::Gzip
        );

        let decompressed = DecompressionService::decompress(Bytes::from(compressed)).unwrap();
        assert_eq!(String::from_utf8(decompressed).unwrap(), original);
    }

    #[test]
    fn test_zip_detection_and_round_trip() {
        let original = "<tv></tv>";

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("epg.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(original.as_bytes()).unwrap();
        let compressed = writer.finish().unwrap().into_inner();

        assert_eq!(
            DecompressionService::detect_compression_format(&compressed),
            CompressionFormat::Zip
        );

        let decompressed = DecompressionService::decompress(Bytes::from(compressed)).unwrap();
        assert_eq!(String::from_utf8(decompressed).unwrap(), original);
    }

    #[test]
    fn test_plain_content_passes_through() {
        let data = Bytes::from_static(b"plain text content");
        assert_eq!(
            DecompressionService::detect_compression_format(&data),
            CompressionFormat::Uncompressed
        );
        assert_eq!(
            DecompressionService::decompress(data.clone()).unwrap(),
            data.to_vec()
        );
    }

    #[test]
    fn test_short_data_is_uncompressed() {
        assert_eq!(
            DecompressionService::detect_compression_format(&[0x1f]),
            CompressionFormat::Uncompressed
        );
    }
}
